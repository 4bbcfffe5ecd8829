//! Which file an error description is about.
//!
//! Heuristics run in order and the first hit wins:
//! 1. a quoted path literal (`"src/App.jsx"`),
//! 2. a path followed by `:line[:col]`,
//! 3. the specifier of a "module not found" style message,
//! 4. a capitalised identifier guessed as a component file.
//!
//! With a file listing, candidates are snapped to real project paths
//! (component names fuzzily, by edit distance).

use once_cell::sync::Lazy;
use regex::Regex;
use strsim::damerau_levenshtein;

use crate::grammar::is_safe_path;

const EXT: &str = r"(?:jsx|tsx|js|ts|mjs|cjs|css|scss|json|html)";
const MAX_DIST: usize = 2;

static QUOTED_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r#"["'`]((?:[A-Za-z]:)?[\w@./\\-]*[\w@-]\.{EXT})["'`]"#)).unwrap()
});

static LINE_COL_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"([\w@./\\-]*[\w@-]\.{EXT}):\d+(?::\d+)?")).unwrap());

static MODULE_NOT_FOUND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)module not found|cannot find module|can't resolve|failed to resolve import|could not resolve",
    )
    .unwrap()
});

static QUOTED_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r#"["'`]([^"'`\s]+)["'`]"#).unwrap());

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z][a-z0-9]+(?:[A-Z][A-Za-z0-9]*)*)\b").unwrap());

/// Capitalised words error messages use that are never component names.
const NOT_COMPONENTS: &[&str] = &[
    "Error", "TypeError", "ReferenceError", "SyntaxError", "RangeError", "Uncaught", "Cannot",
    "Failed", "Module", "Warning", "The", "This", "Unexpected", "Element", "Invalid", "Check",
    "Objects", "Each", "React", "Did", "You", "Expected", "Maximum", "Internal", "Plugin", "Vite",
    "Node", "Undefined", "Null", "Please", "See", "At", "In", "Line", "Unterminated", "Missing",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heuristic {
    QuotedPath,
    LineColumn,
    ModuleNotFound,
    ComponentName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixTarget {
    pub path: String,
    pub heuristic: Heuristic,
}

/// Project-relative form: `/home/u/app/src/App.jsx` → `src/App.jsx`.
pub fn normalize(raw: &str) -> String {
    let p = raw.trim().replace('\\', "/");
    let p = match p.find("/src/") {
        Some(i) => p[i + 1..].to_string(),
        None => p,
    };
    let mut s = p.as_str();
    loop {
        if let Some(rest) = s.strip_prefix("./") {
            s = rest;
        } else if let Some(rest) = s.strip_prefix("../") {
            s = rest;
        } else if let Some(rest) = s.strip_prefix('/') {
            s = rest;
        } else {
            break;
        }
    }
    s.to_string()
}

fn snap<S: AsRef<str>>(path: String, files: &[S]) -> String {
    files
        .iter()
        .map(AsRef::as_ref)
        .find(|f| *f == path || f.ends_with(&format!("/{path}")))
        .map(str::to_string)
        .unwrap_or(path)
}

fn stem(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.split('.').next().unwrap_or(name)
}

fn without_ext(path: &str) -> &str {
    match path.rsplit_once('.') {
        Some((head, ext)) if !ext.contains('/') => head,
        _ => path,
    }
}

fn from_specifier<S: AsRef<str>>(module: &str, files: &[S]) -> Option<String> {
    // bare package imports (`react-router-dom`) are not project files
    if !(module.starts_with('.') || module.starts_with('/') || module.starts_with("src/")) {
        return None;
    }
    let rel = normalize(module);
    if rel.is_empty() {
        return None;
    }
    let want = without_ext(&rel).to_string();
    if let Some(hit) = files
        .iter()
        .map(AsRef::as_ref)
        .find(|f| without_ext(f) == want || without_ext(f).ends_with(&format!("/{want}")))
    {
        return Some(hit.to_string());
    }
    let rel = if rel.starts_with("src/") { rel } else { format!("src/{rel}") };
    if rel.rsplit('/').next().unwrap_or(&rel).contains('.') {
        Some(rel)
    } else {
        Some(format!("{rel}.jsx"))
    }
}

fn from_identifier<S: AsRef<str>>(error: &str, files: &[S]) -> Option<String> {
    let names: Vec<&str> = IDENTIFIER
        .captures_iter(error)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .filter(|n| !NOT_COMPONENTS.contains(n))
        .collect();

    let listed: Vec<&str> = files
        .iter()
        .map(AsRef::as_ref)
        .filter(|f| f.ends_with(".jsx") || f.ends_with(".tsx"))
        .collect();
    if !listed.is_empty() {
        let best = names
            .iter()
            .flat_map(|n| listed.iter().map(move |f| (damerau_levenshtein(n, stem(f)), *f)))
            .filter(|(d, _)| *d <= MAX_DIST)
            .min_by_key(|(d, _)| *d);
        if let Some((_, f)) = best {
            return Some(f.to_string());
        }
    }
    names.first().map(|n| format!("src/components/{n}.jsx"))
}

/// Best guess at the file `error` refers to.
pub fn find_target<S: AsRef<str>, A: AsRef<str>>(
    error: &str,
    files: &[S],
    allowed: &[A],
) -> Option<FixTarget> {
    let candidates = [
        (
            Heuristic::QuotedPath,
            QUOTED_PATH
                .captures(error)
                .and_then(|c| c.get(1))
                .map(|m| snap(normalize(m.as_str()), files)),
        ),
        (
            Heuristic::LineColumn,
            LINE_COL_PATH
                .captures(error)
                .and_then(|c| c.get(1))
                .map(|m| snap(normalize(m.as_str()), files)),
        ),
        (
            Heuristic::ModuleNotFound,
            MODULE_NOT_FOUND
                .find(error)
                .and_then(|m| QUOTED_TOKEN.captures(&error[m.end()..]))
                .and_then(|c| c.get(1))
                .and_then(|m| from_specifier(m.as_str(), files)),
        ),
        (Heuristic::ComponentName, from_identifier(error, files)),
    ];
    candidates.into_iter().find_map(|(heuristic, path)| {
        path.filter(|p| is_safe_path(p, allowed))
            .map(|path| FixTarget { path, heuristic })
    })
}
