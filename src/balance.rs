//! Bracket and tag balance checks over literal-masked source.
//!
//! Both checkers are pure: they mask string/comment literals first (see
//! [`crate::lexer`]) and then walk a stack. A buffer is balanced/closed only
//! when the stack is empty exactly at the end of input.

use crate::lexer::mask_literals;

/// HTML void elements never take a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BracketReport {
    pub balanced: bool,
    /// Closers that would close every still-open bracket, innermost first.
    pub missing_closers: String,
    /// Byte offset of the first closer with no matching opener.
    pub unmatched_closer: Option<usize>,
}

impl BracketReport {
    /// Nothing but missing closers at the end.
    pub fn only_missing(&self) -> bool {
        self.unmatched_closer.is_none() && !self.missing_closers.is_empty()
    }
}

fn closer_for(open: u8) -> u8 {
    match open {
        b'(' => b')',
        b'[' => b']',
        _ => b'}',
    }
}

pub fn check_brackets(src: &str) -> BracketReport {
    check_brackets_masked(&mask_literals(src))
}

pub fn check_brackets_masked(masked: &str) -> BracketReport {
    let mut stack: Vec<u8> = Vec::new();
    let mut unmatched = None;

    for (i, b) in masked.bytes().enumerate() {
        match b {
            b'(' | b'[' | b'{' => stack.push(b),
            b')' | b']' | b'}' => {
                if stack.last().map(|&o| closer_for(o)) == Some(b) {
                    stack.pop();
                } else if unmatched.is_none() {
                    unmatched = Some(i);
                }
            }
            _ => {}
        }
    }

    let missing_closers = stack.iter().rev().map(|&o| closer_for(o) as char).collect();
    BracketReport {
        balanced: stack.is_empty() && unmatched.is_none(),
        missing_closers,
        unmatched_closer: unmatched,
    }
}

/*──────────────────────────── tags ───────────────────────────────────*/

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Open,
    Close,
    SelfClosing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagToken {
    pub kind: TagKind,
    pub name: String, // "" for fragments
    pub start: usize, // offset of '<'
    pub end: usize,   // one past '>' (or buffer end when unterminated)
    pub terminated: bool,
}

impl TagToken {
    pub fn is_void(&self) -> bool {
        VOID_ELEMENTS.contains(&self.name.as_str())
    }
}

#[inline]
fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b':' | b'-' | b'$')
}

#[inline]
fn blocks_tag_start(prev: u8) -> bool {
    prev.is_ascii_alphanumeric() || matches!(prev, b'_' | b'$' | b')' | b']')
}

/// Could a tag start at `at`? `</` always can; `<x`/`<>` only in expression
/// position (or directly inside element children).
pub fn is_tag_start(masked: &str, at: usize, in_children: bool) -> bool {
    let bytes = masked.as_bytes();
    if bytes.get(at) != Some(&b'<') {
        return false;
    }
    match bytes.get(at + 1) {
        Some(b'/') => true,
        Some(&b) if b.is_ascii_alphabetic() || b == b'>' => {
            in_children || at == 0 || !blocks_tag_start(bytes[at - 1])
        }
        _ => false,
    }
}

/// Tokenise one tag at `at` (which must hold '<').
pub fn scan_tag(masked: &str, at: usize) -> Option<TagToken> {
    let bytes = masked.as_bytes();
    if bytes.get(at) != Some(&b'<') {
        return None;
    }
    let mut i = at + 1;
    let closing = bytes.get(i) == Some(&b'/');
    if closing {
        i += 1;
    }
    while i < bytes.len() && bytes[i].is_ascii_whitespace() && closing {
        i += 1;
    }
    let name_start = i;
    while i < bytes.len() && is_name_byte(bytes[i]) {
        i += 1;
    }
    let name = masked[name_start..i].to_string();

    let mut depth = 0usize;
    let mut last_sig = 0u8;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            b'>' if depth == 0 => {
                let kind = if closing {
                    TagKind::Close
                } else if last_sig == b'/' {
                    TagKind::SelfClosing
                } else {
                    TagKind::Open
                };
                return Some(TagToken {
                    kind,
                    name,
                    start: at,
                    end: i + 1,
                    terminated: true,
                });
            }
            // a bare '<' inside a tag head means this was never a tag
            b'<' if depth == 0 => return None,
            _ => {}
        }
        if !b.is_ascii_whitespace() {
            last_sig = b;
        }
        i += 1;
    }

    Some(TagToken {
        kind: if closing { TagKind::Close } else { TagKind::Open },
        name,
        start: at,
        end: bytes.len(),
        terminated: false,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TagReport {
    pub closed: bool,
    /// Open tags never closed, outermost first.
    pub unclosed: Vec<String>,
    /// Closing tags with no matching opener: `(name, offset)`.
    pub stray: Vec<(String, usize)>,
    /// A tag head ran into end of input.
    pub unterminated: bool,
}

pub fn check_tags(src: &str) -> TagReport {
    check_tags_masked(&mask_literals(src))
}

pub fn check_tags_masked(masked: &str) -> TagReport {
    let bytes = masked.as_bytes();
    let mut stack: Vec<(String, i64)> = Vec::new();
    let mut report = TagReport::default();
    let mut brace_depth: i64 = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' => brace_depth += 1,
            b'}' => brace_depth -= 1,
            b'<' => {
                let in_children = stack.last().map_or(false, |(_, d)| *d == brace_depth);
                if is_tag_start(masked, i, in_children) {
                    if let Some(tok) = scan_tag(masked, i) {
                        if !tok.terminated {
                            report.unterminated = true;
                        }
                        match tok.kind {
                            TagKind::SelfClosing => {}
                            _ if tok.is_void() => {}
                            TagKind::Open => stack.push((tok.name.clone(), brace_depth)),
                            TagKind::Close => {
                                match stack.iter().rposition(|(n, _)| *n == tok.name) {
                                    Some(pos) => {
                                        for (n, _) in stack.drain(pos + 1..) {
                                            report.unclosed.push(n);
                                        }
                                        stack.pop();
                                    }
                                    None => report.stray.push((tok.name.clone(), tok.start)),
                                }
                            }
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

    report.unclosed.extend(stack.into_iter().map(|(n, _)| n));
    report.closed = report.unclosed.is_empty() && report.stray.is_empty() && !report.unterminated;
    report
}
