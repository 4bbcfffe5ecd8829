use once_cell::sync::Lazy;
use regex::Regex;

use crate::balance::check_brackets;
use crate::lexer::mask_literals;
use crate::types::{Diagnostic, DiagnosticKind};

static CREATE_ROOT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bcreateRoot\s*\(").unwrap());
static RENDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.\s*render\s*\(").unwrap());

/// The bootstrap file every project gets when the model's one is unusable.
pub fn canonical_entry_point(path: &str) -> String {
    let root = if path.ends_with(".tsx") {
        "document.getElementById('root')!"
    } else {
        "document.getElementById('root')"
    };
    format!(
        "import React from 'react';\n\
         import ReactDOM from 'react-dom/client';\n\
         import App from './App';\n\
         \n\
         ReactDOM.createRoot({root}).render(\n\
         \x20 <React.StrictMode>\n\
         \x20   <App />\n\
         \x20 </React.StrictMode>,\n\
         );\n"
    )
}

fn mounts_root(content: &str) -> bool {
    let masked = mask_literals(content);
    match CREATE_ROOT.find(&masked) {
        Some(m) => RENDER.is_match(&masked[m.end()..]) && check_brackets(content).balanced,
        None => false,
    }
}

/// Keep the entry point only if it still mounts the app.
pub(super) fn check(path: &str, content: String, diags: &mut Vec<Diagnostic>) -> String {
    if mounts_root(&content) {
        return content;
    }
    diags.push(Diagnostic::fixed(
        DiagnosticKind::EntryPointReplaced,
        "entry point did not mount the app; replaced with the standard bootstrap",
    ));
    canonical_entry_point(path)
}
