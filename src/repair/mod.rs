//! Syntax repair engine.
//!
//! `validate(path, content)` classifies the file and runs an ordered list of
//! conservative passes over it, each guarded by its own detection so a clean
//! file comes back byte-identical. Every pass is fail-open: an `Err` keeps the
//! pre-pass content and records a `RepairFailed` diagnostic.

mod component;
mod entry;
mod manifest;

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::config::{Config, ReconstructPolicy};
use crate::error::RepairError;
use crate::grammar::{fence_open, is_fence_close, is_language_tag};
use crate::reconstruct;
use crate::types::{file_name, Diagnostic, DiagnosticKind, Validation};

pub use entry::canonical_entry_point;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    Manifest,
    EntryPoint,
    Component,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairEngine {
    manifest_path: String,
    entry_points: Vec<String>,
    component_extensions: Vec<String>,
    baseline: BTreeMap<String, String>,
    policy: ReconstructPolicy,
}

impl Default for RepairEngine {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl RepairEngine {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            manifest_path: cfg.manifest_path.clone(),
            entry_points: cfg.entry_points.clone(),
            component_extensions: cfg.component_extensions.clone(),
            baseline: cfg.baseline_dependencies.clone(),
            policy: cfg.reconstruct,
        }
    }

    pub fn with_policy(mut self, policy: ReconstructPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> ReconstructPolicy {
        self.policy
    }

    pub fn classify(&self, path: &str) -> FileClass {
        if path == self.manifest_path {
            return FileClass::Manifest;
        }
        if self.entry_points.iter().any(|e| e == path) {
            return FileClass::EntryPoint;
        }
        let ext = file_name(path)
            .rsplit_once('.')
            .map(|(_, e)| e.to_ascii_lowercase());
        match ext {
            Some(e) if self.component_extensions.iter().any(|c| c.eq_ignore_ascii_case(&e)) => {
                FileClass::Component
            }
            _ => FileClass::Other,
        }
    }

    /// Repair `content` for `path`. Never fails.
    pub fn validate(&self, path: &str, content: &str) -> Validation {
        let class = self.classify(path);
        let mut diags = Vec::new();

        let mut text = if path.ends_with(".md") {
            content.to_string()
        } else {
            strip_fence_artifacts(content, &mut diags)
        };

        text = match class {
            FileClass::Manifest => {
                let pass = manifest::repair(&text, &self.baseline, &mut diags);
                fail_open(path, text, pass, &mut diags)
            }
            FileClass::EntryPoint => entry::check(path, text, &mut diags),
            FileClass::Component => self.repair_component(path, text, &mut diags),
            FileClass::Other => text,
        };

        if !diags.is_empty() {
            debug!("{path}: {} diagnostic(s)", diags.len());
        }
        Validation {
            content: text,
            diagnostics: diags,
        }
    }

    fn repair_component(&self, path: &str, text: String, diags: &mut Vec<Diagnostic>) -> String {
        if self.policy == ReconstructPolicy::Always && reconstruct::is_reconstructed(&text) {
            return text;
        }
        let outcome = match component::repair(path, &text, diags) {
            Ok(o) => o,
            Err(e) => {
                warn!("{path}: component repair failed: {e}");
                diags.push(Diagnostic::unfixed(DiagnosticKind::RepairFailed, e.to_string()));
                component::Outcome::unrepaired(&text)
            }
        };

        let rebuild = match self.policy {
            ReconstructPolicy::OnStructuralFailure => !outcome.is_valid(),
            ReconstructPolicy::Always => true,
            ReconstructPolicy::Never => false,
        };
        if !rebuild {
            return outcome.content;
        }

        let name = outcome
            .name
            .unwrap_or_else(|| reconstruct::pascal_case(component::file_stem(path)));
        let rebuilt = reconstruct::rebuild(&text, &name);
        warn!("{path}: reconstructed from template ({})", rebuilt.summary());
        diags.push(Diagnostic::fixed(DiagnosticKind::Reconstructed, rebuilt.summary()));
        rebuilt.content
    }
}

fn fail_open(
    path: &str,
    before: String,
    pass: Result<String, RepairError>,
    diags: &mut Vec<Diagnostic>,
) -> String {
    match pass {
        Ok(after) => after,
        Err(e) => {
            warn!("{path}: repair pass failed, keeping content: {e}");
            diags.push(Diagnostic::unfixed(DiagnosticKind::RepairFailed, e.to_string()));
            before
        }
    }
}

/// Drop leftover language-tag/fence lines at the top and fence lines at the
/// bottom, however many are stacked.
fn strip_fence_artifacts(content: &str, diags: &mut Vec<Diagnostic>) -> String {
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let mut drop = vec![false; lines.len()];

    let mut head = 0;
    for (i, l) in lines.iter().enumerate() {
        let l = l.trim();
        if l.is_empty() {
            continue;
        }
        if !(is_language_tag(l) || fence_open(l).is_some()) {
            break;
        }
        drop[i] = true;
        head += 1;
    }
    let mut tail = 0;
    for (i, l) in lines.iter().enumerate().rev() {
        let l = l.trim();
        if drop[i] {
            break;
        }
        if l.is_empty() {
            continue;
        }
        if !is_fence_close(l) {
            break;
        }
        drop[i] = true;
        tail += 1;
    }
    if head == 0 && tail == 0 {
        return content.to_string();
    }

    let out: String = lines
        .iter()
        .zip(&drop)
        .filter(|(_, d)| !**d)
        .map(|(l, _)| *l)
        .collect();
    let what = match (head > 0, tail > 0) {
        (true, true) => "removed leading language tag and trailing fence",
        (true, false) => "removed leading language tag",
        _ => "removed trailing fence",
    };
    diags.push(Diagnostic::fixed(DiagnosticKind::LanguageTag, what));
    out
}

#[cfg(test)]
mod tests;
