//! Runtime configuration: JSON file, then `STITCH_*` environment overrides.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::grammar::DEFAULT_EXTENSIONS;

/// When the template reconstructor may replace a component body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReconstructPolicy {
    /// Only when repair leaves the file structurally broken.
    #[default]
    OnStructuralFailure,
    /// Every component file, regardless of repair outcome.
    Always,
    /// Keep best-effort repaired content even when still broken.
    Never,
}

/// What the end-of-stream reconciliation pass does with a path the
/// incremental pass already captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReconcilePolicy {
    #[default]
    SkipExisting,
    Overwrite,
}

impl FromStr for ReconstructPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on-structural-failure" | "on-failure" => Ok(Self::OnStructuralFailure),
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            _ => Err(()),
        }
    }
}

impl FromStr for ReconcilePolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip-existing" | "skip" => Ok(Self::SkipExisting),
            "overwrite" => Ok(Self::Overwrite),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run budget when a request carries none.
    pub timeout_ms: u64,
    pub manifest_path: String,
    pub entry_points: Vec<String>,
    pub component_extensions: Vec<String>,
    pub allowed_extensions: Vec<String>,
    pub baseline_dependencies: BTreeMap<String, String>,
    /// Fallback context for error-fix runs.
    pub bootstrap_files: Vec<String>,
    pub reconstruct: ReconstructPolicy,
    pub reconcile: ReconcilePolicy,
    /// Write in-progress content on every chunk (best effort).
    pub persist_partial: bool,
}

impl Default for Config {
    fn default() -> Self {
        let strings = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            timeout_ms: 120_000,
            manifest_path: "package.json".into(),
            entry_points: strings(&["src/main.jsx", "src/main.tsx", "src/index.jsx", "src/index.tsx"]),
            component_extensions: strings(&["jsx", "tsx"]),
            allowed_extensions: strings(DEFAULT_EXTENSIONS),
            baseline_dependencies: [("react", "^18.2.0"), ("react-dom", "^18.2.0")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            bootstrap_files: strings(&["index.html", "src/main.jsx", "src/App.jsx", "vite.config.js"]),
            reconstruct: ReconstructPolicy::default(),
            reconcile: ReconcilePolicy::default(),
            persist_partial: false,
        }
    }
}

impl Config {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Apply `STITCH_*` overrides from the process environment.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_vars(|k| std::env::var(k).ok())
    }

    pub fn with_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(v) = lookup("STITCH_TIMEOUT_MS") {
            self.timeout_ms = v.trim().parse().map_err(|_| ConfigError::Env {
                var: "STITCH_TIMEOUT_MS",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("STITCH_RECONSTRUCT") {
            self.reconstruct = v.parse().map_err(|_| ConfigError::Env {
                var: "STITCH_RECONSTRUCT",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("STITCH_RECONCILE") {
            self.reconcile = v.parse().map_err(|_| ConfigError::Env {
                var: "STITCH_RECONCILE",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("STITCH_PERSIST_PARTIAL") {
            self.persist_partial = match v.trim() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(ConfigError::Env {
                        var: "STITCH_PERSIST_PARTIAL",
                        value: v,
                    })
                }
            };
        }
        Ok(self)
    }
}
