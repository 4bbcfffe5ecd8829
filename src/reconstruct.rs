//! Template reconstruction: rebuild a component that is valid by
//! construction from whatever can be salvaged out of a malformed original.
//!
//! Salvaged verbatim: import statements and `useState` declarations (each only
//! if it is balanced on its own). Handler names survive but their bodies are
//! re-synthesised. Everything else is dropped, so callers must surface the
//! [`DiagnosticKind::Reconstructed`](crate::types::DiagnosticKind) diagnostic.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::balance::{check_brackets, check_tags};
use crate::lexer::mask_literals;

/// First line of every reconstructed file.
pub const MARKER: &str = "// Reconstructed: the generated body could not be repaired.";

static STATE_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^const\s*\[\s*([A-Za-z_$][\w$]*)\s*,\s*(set[\w$]*)\s*\]\s*=\s*(React\.)?useState\s*(<[^>]*>)?\s*\(",
    )
    .unwrap()
});

static HANDLER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"\b(?:const|let|var)\s+((?:handle|on)[A-Z][\w$]*)\s*=",
        r"|\bfunction\s+((?:handle|on)[A-Z][\w$]*)\s*\(",
        r"|=\{\s*(handle[A-Z][\w$]*)\s*\}",
    ))
    .unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq)]
struct StateDecl {
    line: String,
    setter: String,
    initial: String,
}

/// What the reconstructor kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rebuilt {
    pub content: String,
    pub imports: usize,
    pub state: usize,
    pub handlers: Vec<String>,
}

impl Rebuilt {
    pub fn summary(&self) -> String {
        format!(
            "body rebuilt from template; kept {} import(s), {} state declaration(s), handlers [{}]",
            self.imports,
            self.state,
            self.handlers.join(", ")
        )
    }
}

pub fn is_reconstructed(content: &str) -> bool {
    content.starts_with(MARKER)
}

fn self_contained(text: &str) -> bool {
    check_brackets(text).balanced && check_tags(text).closed
}

/// Import statements, possibly spanning lines, kept only when balanced.
fn extract_imports(src: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut lines = src.lines();
    while let Some(line) = lines.next() {
        let t = line.trim();
        if !(t.starts_with("import ") || t.starts_with("import{") || t.starts_with("import'") || t.starts_with("import\"")) {
            continue;
        }
        let mut stmt = t.to_string();
        // `import {\n  a,\n  b\n} from 'x'`
        while !check_brackets(&stmt).balanced {
            match lines.next() {
                Some(next) => {
                    stmt.push('\n');
                    stmt.push_str(next.trim_end());
                }
                None => break,
            }
        }
        if self_contained(&stmt) && !out.contains(&stmt) {
            out.push(stmt);
        }
    }
    out
}

fn extract_state(src: &str) -> Vec<StateDecl> {
    let mut out = Vec::new();
    for line in src.lines() {
        let t = line.trim();
        let masked = mask_literals(t);
        let Some(caps) = STATE_DECL.captures(&masked) else {
            continue;
        };
        if !self_contained(t) {
            continue;
        }
        let (Some(setter), Some(whole)) = (caps.get(2), caps.get(0)) else {
            continue;
        };
        // initial value: everything inside the useState( … ) call
        let open = whole.end() - 1;
        let mut depth = 0usize;
        let mut close = None;
        for (i, b) in masked.bytes().enumerate().skip(open) {
            match b {
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }
        let Some(close) = close else { continue };
        let initial = t[open + 1..close].trim();
        out.push(StateDecl {
            line: t.to_string(),
            setter: setter.as_str().to_string(),
            initial: if initial.is_empty() {
                "undefined".to_string()
            } else {
                initial.to_string()
            },
        });
    }
    out
}

fn extract_handlers(src: &str) -> Vec<String> {
    let masked = mask_literals(src);
    let mut names: Vec<String> = Vec::new();
    for caps in HANDLER.captures_iter(&masked) {
        let name = (1..=3).find_map(|i| caps.get(i)).map(|m| m.as_str().to_string());
        if let Some(name) = name {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

fn synthesize_handler(name: &str, state: &[StateDecl]) -> String {
    let lower = name.to_ascii_lowercase();
    if lower.contains("change") {
        let update = state
            .iter()
            .find(|s| s.initial.starts_with('{'))
            .map(|s| {
                format!(
                    "    {}((prev) => ({{ ...prev, [name]: type === 'checkbox' ? checked : value }}));\n",
                    s.setter
                )
            })
            .unwrap_or_else(|| {
                "    console.log('field updated', name, type === 'checkbox' ? checked : value);\n"
                    .to_string()
            });
        format!(
            "  const {name} = (event) => {{\n    const {{ name, value, type, checked }} = event.target;\n{update}  }};\n"
        )
    } else if lower.contains("submit") {
        format!(
            "  const {name} = (event) => {{\n    event.preventDefault();\n    console.log('{name}');\n  }};\n"
        )
    } else if lower.contains("reset") {
        let body: String = if state.is_empty() {
            format!("    console.log('{name}');\n")
        } else {
            state
                .iter()
                .map(|s| format!("    {}({});\n", s.setter, s.initial))
                .collect()
        };
        format!("  const {name} = () => {{\n{body}  }};\n")
    } else {
        format!("  const {name} = (...args) => {{\n    console.log('{name}', ...args);\n  }};\n")
    }
}

/// `TodoList` → `todo-list`
fn kebab(name: &str) -> String {
    let mut out = String::new();
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// `todo-list.item` → `TodoListItem`; always a valid identifier.
pub fn pascal_case(stem: &str) -> String {
    let mut out: String = stem
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| {
            let mut cs = s.chars();
            match cs.next() {
                Some(f) => f.to_ascii_uppercase().to_string() + cs.as_str(),
                None => String::new(),
            }
        })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert_str(0, "Component");
    }
    out
}

/// Build the replacement component.
pub fn rebuild(original: &str, name: &str) -> Rebuilt {
    let imports = extract_imports(original);
    let state = extract_state(original);
    let handlers = extract_handlers(original);

    let mut out = String::new();
    out.push_str(MARKER);
    out.push('\n');
    for imp in &imports {
        out.push_str(imp);
        out.push('\n');
    }
    let needs_use_state = !state.is_empty()
        && state.iter().any(|s| !s.line.contains("React.useState"))
        && !imports.iter().any(|i| i.contains("useState"));
    if needs_use_state {
        out.push_str("import { useState } from 'react';\n");
    }

    out.push_str(&format!("\nfunction {name}() {{\n"));
    for s in &state {
        out.push_str(&format!("  {}\n", s.line));
    }
    if !state.is_empty() {
        out.push('\n');
    }
    for h in &handlers {
        out.push_str(&synthesize_handler(h, &state));
        out.push('\n');
    }
    out.push_str(&format!(
        "  return (\n    <div className=\"{}\">\n      <h2>{name}</h2>\n    </div>\n  );\n}}\n\nexport default {name};\n",
        kebab(name)
    ));

    Rebuilt {
        content: out,
        imports: imports.len() + usize::from(needs_use_state),
        state: state.len(),
        handlers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BROKEN: &str = r#"import React, { useState } from 'react';
import {
  Card,
  Button,
} from './ui';
import './Form.css';

export default function ContactForm() {
  const [form, setForm] = useState({ name: '', email: '' });
  const [sent, setSent] = useState(false);
  const handleChange = (e) => setForm({ ...form, [e.target.name]: e.target.value });
  function handleSubmit(e) {
    e.preventDefault(
  return (
    <Card>
      <form onSubmit={handleSubmit} onReset={handleReset}>
        <input name="name" onChange={handleChange} />
        <Button onClick={onCancel}>Cancel</Button>
"#;

    #[test]
    fn keeps_imports_state_and_handlers() {
        let r = rebuild(BROKEN, "ContactForm");
        assert!(is_reconstructed(&r.content));
        assert_eq!(r.imports, 3);
        assert!(r.content.contains("import {\n  Card,\n  Button,\n} from './ui';"));
        assert!(r.content.contains("import './Form.css';"));
        assert_eq!(r.state, 2);
        assert!(r.content.contains("  const [sent, setSent] = useState(false);"));
        assert_eq!(r.handlers, vec!["handleChange", "handleSubmit", "handleReset"]);
        assert!(r.content.contains("setForm((prev) => ({ ...prev, [name]:"));
        assert!(r.content.contains("event.preventDefault();"));
        assert!(r.content.contains("    setForm({ name: '', email: '' });\n    setSent(false);"));
        assert!(r.content.ends_with("export default ContactForm;\n"));
    }

    #[test]
    fn output_is_structurally_valid() {
        let r = rebuild(BROKEN, "ContactForm");
        assert!(check_brackets(&r.content).balanced);
        assert!(check_tags(&r.content).closed);
        assert!(r.content.contains("<div className=\"contact-form\">"));
    }

    #[test]
    fn rebuild_is_a_fixed_point() {
        let once = rebuild(BROKEN, "ContactForm");
        let twice = rebuild(&once.content, "ContactForm");
        assert_eq!(once.content, twice.content);
    }

    #[test]
    fn adds_use_state_import_when_missing() {
        let r = rebuild("const [n, setN] = useState(0);\nreturn (<div>", "Counter");
        assert!(r.content.contains("import { useState } from 'react';"));
        let again = rebuild(&r.content, "Counter");
        assert_eq!(r.content, again.content);
    }

    #[test]
    fn unknown_handler_gets_logging_stub() {
        let r = rebuild("<X onClick={handleOpen} />", "Thing");
        assert!(r.content.contains("const handleOpen = (...args) => {\n    console.log('handleOpen', ...args);"));
    }

    #[test]
    fn unbalanced_state_line_is_dropped() {
        let r = rebuild("const [a, setA] = useState({ x: 1;\n", "A");
        assert_eq!(r.state, 0);
        assert!(!r.content.contains("setA"));
    }

    #[test]
    fn names() {
        assert_eq!(pascal_case("todo-list.item"), "TodoListItem");
        assert_eq!(pascal_case("404"), "Component404");
        assert_eq!(kebab("TodoList"), "todo-list");
    }
}
