//! Line-level grammar for file blocks in model output.
//!
//! ````text
//! File: src/components/Foo.jsx
//! ```jsx
//! …body…
//! ```
//! ````
//!
//! Every parser here sees exactly one line with its terminator removed.

use nom::{
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{space0, space1},
    combinator::{all_consuming, opt, recognize},
    multi::many0_count,
    sequence::{delimited, preceded, terminated, tuple},
    IResult,
};

/// Extensions a generated file may carry.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "js", "jsx", "ts", "tsx", "css", "scss", "json", "html", "md", "svg", "mjs", "cjs",
];

#[inline]
fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | '@')
}

/// Path charset, no absolute paths, no `..`/empty segments, allowed extension.
pub fn is_safe_path<S: AsRef<str>>(path: &str, allowed: &[S]) -> bool {
    if path.is_empty() || path.starts_with('/') || !path.chars().all(is_path_char) {
        return false;
    }
    if path
        .split('/')
        .any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        return false;
    }
    let file = path.rsplit('/').next().unwrap_or(path);
    match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => allowed
            .iter()
            .any(|a| a.as_ref().eq_ignore_ascii_case(ext)),
        _ => false,
    }
}

fn path_token(input: &str) -> IResult<&str, &str> {
    take_while1(is_path_char)(input)
}

fn strict_header(input: &str) -> IResult<&str, &str> {
    all_consuming(delimited(
        tuple((space0, tag("File:"), space1)),
        path_token,
        space0,
    ))(input)
}

/// `File: <path>`, the only header the incremental pass trusts.
pub fn parse_header<S: AsRef<str>>(line: &str, allowed: &[S]) -> Option<String> {
    let (_, path) = strict_header(line).ok()?;
    let path = path.strip_prefix("./").unwrap_or(path);
    is_safe_path(path, allowed).then(|| path.to_string())
}

fn decoration(input: &str) -> IResult<&str, &str> {
    take_while(|c: char| c == '*' || c == '`')(input)
}

fn heading_marks(input: &str) -> IResult<&str, &str> {
    terminated(recognize(many0_count(tag("#"))), space0)(input)
}

/// `### `**src/App.jsx**`` and friends: markdown decoration around a bare
/// path (optionally still prefixed by `File:`).
fn loose_header(input: &str) -> IResult<&str, &str> {
    all_consuming(delimited(
        tuple((space0, heading_marks, decoration, opt(tuple((tag("File:"), space0))))),
        path_token,
        tuple((decoration, opt(tag(":")), space0)),
    ))(input)
}

/// Strict header, or the looser variant used during reconciliation.
pub fn parse_loose_header<S: AsRef<str>>(line: &str, allowed: &[S]) -> Option<String> {
    if let Some(p) = parse_header(line, allowed) {
        return Some(p);
    }
    let (_, path) = loose_header(line).ok()?;
    let path = path.strip_prefix("./").unwrap_or(path);
    is_safe_path(path, allowed).then(|| path.to_string())
}

fn fence_open_parser(input: &str) -> IResult<&str, &str> {
    all_consuming(delimited(
        tuple((space0, tag("```"), take_while(|c: char| c == '`'))),
        take_while(|c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+')),
        space0,
    ))(input)
}

/// An opening fence; yields the (possibly empty) language tag.
pub fn fence_open(line: &str) -> Option<&str> {
    fence_open_parser(line).ok().map(|(_, lang)| lang)
}

/// A closing fence: backticks only.
pub fn is_fence_close(line: &str) -> bool {
    let parsed: IResult<&str, &str> = all_consuming(preceded(
        space0,
        terminated(recognize(tuple((tag("```"), take_while(|c: char| c == '`')))), space0),
    ))(line);
    parsed.is_ok()
}

/// Leftover language-tag line at the top of a body (`jsx`, `javascript` …).
pub fn is_language_tag(line: &str) -> bool {
    matches!(
        line.trim().to_ascii_lowercase().as_str(),
        "js" | "jsx"
            | "javascript"
            | "ts"
            | "tsx"
            | "typescript"
            | "json"
            | "css"
            | "scss"
            | "html"
            | "markdown"
            | "md"
    )
}
