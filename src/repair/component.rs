//! Component passes, in order:
//! complete missing closers, strip stray `)` after a closing tag, collapse
//! duplicated closing tags, wrap sibling roots of a `return`, add the
//! default export.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::balance::{
    check_brackets, check_brackets_masked, check_tags, check_tags_masked, is_tag_start, scan_tag,
    TagKind,
};
use crate::error::RepairError;
use crate::lexer::mask_literals;
use crate::reconstruct::pascal_case;
use crate::types::{Diagnostic, DiagnosticKind};

static RETURN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\breturn\b").unwrap());

static DEFAULT_EXPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bexport\s+default\b|\bexport\s*\{[^}]*\bas\s+default\b").unwrap()
});

static COMPONENT_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"\bfunction\s+([A-Z][\w$]*)\s*[(<]",
        r"|\b(?:const|let|var)\s+([A-Z][\w$]*)\s*(?::[^=]*)?=\s*(?:async\s*)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*(?::[^=]*)?=>",
        r"|\b(?:const|let|var)\s+([A-Z][\w$]*)\s*=\s*(?:React\.)?(?:memo|forwardRef)\s*\(",
        r"|\bclass\s+([A-Z][\w$]*)\s+extends\b",
    ))
    .unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Outcome {
    pub content: String,
    /// Discovered component name.
    pub name: Option<String>,
    pub structural: bool,
    pub exported: bool,
}

impl Outcome {
    fn assess(content: String, name: Option<String>) -> Self {
        let masked = mask_literals(&content);
        let structural = check_brackets_masked(&masked).balanced && check_tags_masked(&masked).closed;
        let exported = DEFAULT_EXPORT.is_match(&masked);
        Self {
            content,
            name,
            structural,
            exported,
        }
    }

    pub fn unrepaired(content: &str) -> Self {
        let name = component_name(&mask_literals(content), "");
        Self::assess(content.to_string(), name)
    }

    pub fn is_valid(&self) -> bool {
        self.structural && self.exported
    }
}

/// `src/components/TodoList.test.jsx` → `TodoList`
pub(super) fn file_stem(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.split('.').next().unwrap_or(name)
}

fn splice(src: &str, range: Range<usize>, with: &str) -> Result<String, RepairError> {
    if range.start > range.end
        || range.end > src.len()
        || !src.is_char_boundary(range.start)
        || !src.is_char_boundary(range.end)
    {
        return Err(RepairError::OutOfBounds {
            offset: range.end,
            len: src.len(),
        });
    }
    let mut out = String::with_capacity(src.len() + with.len());
    out.push_str(&src[..range.start]);
    out.push_str(with);
    out.push_str(&src[range.end..]);
    Ok(out)
}

pub(super) fn repair(
    path: &str,
    text: &str,
    diags: &mut Vec<Diagnostic>,
) -> Result<Outcome, RepairError> {
    let mut text = complete_missing(text, diags);
    let mut touched = false;
    if let Some(t) = strip_stray_parens(&text, diags)? {
        text = t;
        touched = true;
    }
    if let Some(t) = collapse_duplicate_closers(&text, diags)? {
        text = t;
        touched = true;
    }
    if touched {
        text = complete_missing(&text, diags);
    }
    if let Some(t) = wrap_multiple_roots(&text, diags)? {
        text = t;
    }

    let masked = mask_literals(&text);
    let name = component_name(&masked, path);
    if !DEFAULT_EXPORT.is_match(&masked) {
        match &name {
            Some(n) => {
                text = format!("{}\n\nexport default {n};\n", text.trim_end());
                diags.push(Diagnostic::fixed(
                    DiagnosticKind::MissingExport,
                    format!("appended `export default {n};`"),
                ));
            }
            None => diags.push(Diagnostic::unfixed(
                DiagnosticKind::MissingExport,
                "no default export and no component declaration found",
            )),
        }
    }

    let brackets = check_brackets(&text);
    if !brackets.balanced {
        diags.push(Diagnostic::unfixed(
            DiagnosticKind::UnbalancedBrackets,
            match brackets.unmatched_closer {
                Some(off) => format!("unmatched closer at byte {off}"),
                None => format!("missing `{}`", brackets.missing_closers),
            },
        ));
    }
    let tags = check_tags(&text);
    if !tags.closed {
        let mut names: Vec<&str> = tags.unclosed.iter().map(String::as_str).collect();
        names.extend(tags.stray.iter().map(|(n, _)| n.as_str()));
        diags.push(Diagnostic::unfixed(
            DiagnosticKind::UnclosedTag,
            format!("tags still unbalanced: {}", names.join(", ")),
        ));
    }

    Ok(Outcome::assess(text, name))
}

/*──────────────────────────── closers ────────────────────────────────*/

enum Open {
    Bracket(u8),
    Tag(String),
}

fn closer(open: u8) -> u8 {
    match open {
        b'(' => b')',
        b'[' => b']',
        _ => b'}',
    }
}

/// Closers for everything still open at end of input, tags and brackets
/// interleaved innermost first. `None` when anything mismatches earlier,
/// which means the damage is not a plain truncation.
fn completion_suffix(masked: &str) -> Option<String> {
    let bytes = masked.as_bytes();
    let mut stack: Vec<Open> = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b @ (b'(' | b'[' | b'{') => stack.push(Open::Bracket(b)),
            b @ (b')' | b']' | b'}') => match stack.pop() {
                Some(Open::Bracket(o)) if closer(o) == b => {}
                _ => return None,
            },
            b'<' => {
                let in_children = matches!(stack.last(), Some(Open::Tag(_)));
                if is_tag_start(masked, i, in_children) {
                    if let Some(tok) = scan_tag(masked, i) {
                        if !tok.terminated {
                            return None;
                        }
                        match tok.kind {
                            TagKind::SelfClosing => {}
                            _ if tok.is_void() => {}
                            TagKind::Open => stack.push(Open::Tag(tok.name)),
                            TagKind::Close => match stack.pop() {
                                Some(Open::Tag(n)) if n == tok.name => {}
                                _ => return None,
                            },
                        }
                        i = tok.end;
                        continue;
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }
    if stack.is_empty() {
        return None;
    }
    Some(
        stack
            .iter()
            .rev()
            .map(|o| match o {
                Open::Bracket(b) => (closer(*b) as char).to_string(),
                Open::Tag(n) => format!("</{n}>"),
            })
            .collect(),
    )
}

fn complete_missing(text: &str, diags: &mut Vec<Diagnostic>) -> String {
    let masked = mask_literals(text);
    if let Some(suffix) = completion_suffix(&masked) {
        if suffix.contains("</") {
            diags.push(Diagnostic::fixed(
                DiagnosticKind::UnclosedTag,
                format!("closed tags left open at end of file: `{suffix}`"),
            ));
        }
        if suffix.contains(|c: char| matches!(c, ')' | ']' | '}')) {
            diags.push(Diagnostic::fixed(
                DiagnosticKind::UnbalancedBrackets,
                format!("appended `{suffix}`"),
            ));
        }
        return format!("{}\n{suffix}\n", text.trim_end());
    }
    let report = check_brackets_masked(&masked);
    if report.only_missing() {
        diags.push(Diagnostic::fixed(
            DiagnosticKind::UnbalancedBrackets,
            format!("appended `{}`", report.missing_closers),
        ));
        return format!("{}\n{}\n", text.trim_end(), report.missing_closers);
    }
    text.to_string()
}

/*──────────────────────────── stray closers ──────────────────────────*/

fn follows_closing_tag(before: &str) -> bool {
    let t = before.trim_end();
    if t.ends_with("/>") {
        return true;
    }
    match t.rfind('<') {
        Some(lt) => t[lt..].starts_with("</") && t.ends_with('>'),
        None => false,
    }
}

/// `</div>)` with nothing left to close: drop the `)`.
fn strip_stray_parens(text: &str, diags: &mut Vec<Diagnostic>) -> Result<Option<String>, RepairError> {
    let mut text = text.to_string();
    let mut removed = 0usize;
    loop {
        let masked = mask_literals(&text);
        let Some(off) = check_brackets_masked(&masked).unmatched_closer else {
            break;
        };
        if masked.as_bytes()[off] != b')' || !follows_closing_tag(&masked[..off]) {
            break;
        }
        text = splice(&text, off..off + 1, "")?;
        removed += 1;
    }
    if removed == 0 {
        return Ok(None);
    }
    diags.push(Diagnostic::fixed(
        DiagnosticKind::StrayParen,
        format!("removed {removed} stray `)` after a closing tag"),
    ));
    Ok(Some(text))
}

/// `</p></p>` where the second one closes nothing.
fn collapse_duplicate_closers(
    text: &str,
    diags: &mut Vec<Diagnostic>,
) -> Result<Option<String>, RepairError> {
    let masked = mask_literals(text);
    let report = check_tags_masked(&masked);
    if report.stray.is_empty() {
        return Ok(None);
    }
    let mut out = text.to_string();
    let mut removed = Vec::new();
    for (name, off) in report.stray.iter().rev() {
        let Some(tok) = scan_tag(&masked, *off) else {
            continue;
        };
        let before = masked[..*off].trim_end();
        if before.ends_with(&format!("</{name}>")) {
            out = splice(&out, before.len()..tok.end, "")?;
            removed.push(format!("</{name}>"));
        }
    }
    if removed.is_empty() {
        return Ok(None);
    }
    removed.reverse();
    diags.push(Diagnostic::fixed(
        DiagnosticKind::DuplicateClosingTag,
        format!("collapsed duplicated {}", removed.join(", ")),
    ));
    Ok(Some(out))
}

/*──────────────────────────── multiple roots ─────────────────────────*/

fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

fn skip_braces(bytes: &[u8], at: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, &b) in bytes.iter().enumerate().skip(at) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// One past the end of the element starting at `at`.
fn skip_element(masked: &str, at: usize) -> Option<usize> {
    let first = scan_tag(masked, at)?;
    if !first.terminated {
        return None;
    }
    match first.kind {
        TagKind::SelfClosing => return Some(first.end),
        TagKind::Close => return None,
        TagKind::Open if first.is_void() => return Some(first.end),
        TagKind::Open => {}
    }
    let bytes = masked.as_bytes();
    let mut depth = 1usize;
    let mut braces = 0usize;
    let mut i = first.end;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => braces += 1,
            b'}' => braces = braces.saturating_sub(1),
            b'<' if is_tag_start(masked, i, braces == 0) => {
                if let Some(tok) = scan_tag(masked, i) {
                    if !tok.terminated {
                        return None;
                    }
                    match tok.kind {
                        TagKind::Open if !tok.is_void() => depth += 1,
                        TagKind::Close => {
                            depth -= 1;
                            if depth == 0 {
                                return Some(tok.end);
                            }
                        }
                        _ => {}
                    }
                    i = tok.end;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn starts_element(masked: &str, i: usize) -> bool {
    let bytes = masked.as_bytes();
    bytes.get(i) == Some(&b'<') && bytes.get(i + 1) != Some(&b'/') && is_tag_start(masked, i, true)
}

/// Span covering every sibling after `return` when there is more than one.
fn sibling_roots(masked: &str, after_return: usize) -> Option<Range<usize>> {
    let bytes = masked.as_bytes();
    let mut i = skip_ws(bytes, after_return);
    if bytes.get(i) == Some(&b'(') {
        i = skip_ws(bytes, i + 1);
    }
    if !starts_element(masked, i) {
        return None;
    }
    let start = i;
    let mut end = i;
    let mut count = 0;
    loop {
        let next = if starts_element(masked, i) {
            skip_element(masked, i)?
        } else if count > 0 && bytes.get(i) == Some(&b'{') {
            skip_braces(bytes, i)?
        } else {
            break;
        };
        count += 1;
        end = next;
        i = skip_ws(bytes, next);
    }
    (count > 1).then_some(start..end)
}

fn wrap_multiple_roots(
    text: &str,
    diags: &mut Vec<Diagnostic>,
) -> Result<Option<String>, RepairError> {
    let mut text = text.to_string();
    let mut wrapped = 0usize;
    let mut from = 0;
    loop {
        let masked = mask_literals(&text);
        let Some(m) = RETURN.find_at(&masked, from) else {
            break;
        };
        from = m.end();
        if let Some(span) = sibling_roots(&masked, m.end()) {
            text = splice(&text, span.end..span.end, "</div>")?;
            text = splice(&text, span.start..span.start, "<div>")?;
            wrapped += 1;
            from = span.end + "<div></div>".len();
        }
    }
    if wrapped == 0 {
        return Ok(None);
    }
    diags.push(Diagnostic::fixed(
        DiagnosticKind::MultipleRoots,
        format!("wrapped sibling JSX roots in <div> ({wrapped} return statement(s))"),
    ));
    Ok(Some(text))
}

/*──────────────────────────── naming ─────────────────────────────────*/

/// Declared component names, preferring the one matching the file name.
fn component_name(masked: &str, path: &str) -> Option<String> {
    let names: Vec<&str> = COMPONENT_DECL
        .captures_iter(masked)
        .filter_map(|c| (1..=4).find_map(|i| c.get(i)).map(|m| m.as_str()))
        .collect();
    let wanted = pascal_case(file_stem(path));
    names
        .iter()
        .find(|n| **n == wanted)
        .or_else(|| names.first())
        .map(|n| n.to_string())
}
