use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::balance::check_brackets_masked;
use crate::error::RepairError;
use crate::lexer::{count_outside_literals, mask_literals};
use crate::types::{Diagnostic, DiagnosticKind};

/// Parse, recover if needed, ensure baseline dependencies, re-serialise.
///
/// Output is always pretty-printed with sorted keys so a second run is a
/// no-op. Content that cannot be recovered at all is returned untouched with
/// an unfixed diagnostic.
pub(super) fn repair(
    content: &str,
    baseline: &BTreeMap<String, String>,
    diags: &mut Vec<Diagnostic>,
) -> Result<String, RepairError> {
    let value = match serde_json::from_str::<Value>(content) {
        Ok(v) => v,
        Err(first) => match recover(content) {
            Some(v) => {
                diags.push(Diagnostic::fixed(
                    DiagnosticKind::ManifestParseError,
                    format!("recovered malformed manifest ({first})"),
                ));
                v
            }
            None => {
                diags.push(Diagnostic::unfixed(
                    DiagnosticKind::ManifestParseError,
                    first.to_string(),
                ));
                return Ok(content.to_string());
            }
        },
    };

    let Value::Object(mut root) = value else {
        return Err(RepairError::ManifestNotObject);
    };

    let deps = root
        .entry("dependencies")
        .or_insert_with(|| Value::Object(Map::new()));
    if !deps.is_object() {
        *deps = Value::Object(Map::new());
        diags.push(Diagnostic::fixed(
            DiagnosticKind::ManifestParseError,
            "`dependencies` was not an object",
        ));
    }
    if let Value::Object(map) = deps {
        let mut added = Vec::new();
        for (name, version) in baseline {
            if !map.contains_key(name) {
                map.insert(name.clone(), Value::String(version.clone()));
                added.push(name.as_str());
            }
        }
        if !added.is_empty() {
            diags.push(Diagnostic::fixed(
                DiagnosticKind::BaselineDependency,
                format!("added {}", added.join(", ")),
            ));
        }
    }

    let mut out = serde_json::to_string_pretty(&Value::Object(root))
        .map_err(|e| RepairError::ManifestSerialize(e.to_string()))?;
    out.push('\n');
    Ok(out)
}

/// Trailing commas out, then missing closers in.
fn recover(content: &str) -> Option<Value> {
    let cleaned = strip_trailing_commas(content);
    if let Ok(v) = serde_json::from_str(&cleaned) {
        return Some(v);
    }

    let report = check_brackets_masked(&mask_literals(&cleaned));
    let suffix = if report.only_missing() {
        report.missing_closers
    } else {
        let open = count_outside_literals(&cleaned, '{');
        let close = count_outside_literals(&cleaned, '}');
        "}".repeat(open.saturating_sub(close))
    };
    if suffix.is_empty() {
        return None;
    }
    let mut candidate = strip_trailing_commas(cleaned.trim_end());
    // `{"a": 1,` truncated right after a comma
    if candidate.ends_with(',') {
        candidate.pop();
    }
    candidate.push_str(&suffix);
    serde_json::from_str(&candidate).ok()
}

/// Remove `,` that is followed (past whitespace) by `}` or `]` outside strings.
fn strip_trailing_commas(src: &str) -> String {
    let masked = mask_literals(src);
    let mb = masked.as_bytes();
    let mut drop = Vec::new();
    for (i, &b) in mb.iter().enumerate() {
        if b != b',' {
            continue;
        }
        let next = mb[i + 1..].iter().find(|c| !c.is_ascii_whitespace());
        if matches!(next, Some(b'}') | Some(b']')) {
            drop.push(i);
        }
    }
    if drop.is_empty() {
        return src.to_string();
    }
    let mut out = String::with_capacity(src.len());
    let mut last = 0;
    for i in drop {
        out.push_str(&src[last..i]);
        last = i + 1;
    }
    out.push_str(&src[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_commas() {
        assert_eq!(
            strip_trailing_commas(r#"{"a": [1, 2,], "b": ",}",}"#),
            r#"{"a": [1, 2], "b": ",}"}"#
        );
    }

    #[test]
    fn recovers_truncated_after_comma() {
        let v = recover("{\"name\": \"app\",\n  \"dependencies\": {\"vite\": \"^5\",\n").unwrap();
        assert_eq!(v["dependencies"]["vite"], "^5");
    }

    #[test]
    fn hopeless_input_is_none() {
        assert!(recover("name = app").is_none());
    }
}
