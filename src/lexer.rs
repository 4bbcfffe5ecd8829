//! `lexer` – literal-aware masking for JS/JSX-ish source.
//
//  Everything inside a string literal or comment is overwritten with spaces
//  (newlines survive), so the masked buffer has exactly the same byte length
//  and line layout as the input. Structural scanners then work on the mask
//  and can use its offsets directly against the original text.

#[derive(Debug, Clone, Copy, PartialEq)]
enum LState {
    Code,
    InString {
        quote: char,  // ' " or `
        escape: bool, // last char was '\\'
    },
    InLineComment,
    InBlockComment {
        star: bool, // saw ‘*’ last char?
    },
}

#[inline]
fn blank(out: &mut String, c: char) {
    if c == '\n' {
        out.push('\n');
    } else {
        for _ in 0..c.len_utf8() {
            out.push(' ');
        }
    }
}

/// Replace string and comment literals by spaces, keeping byte offsets.
///
/// JSX text makes a pure JS lexer misfire, so three heuristics apply:
/// * an apostrophe right after an alphanumeric char (`don't`) is text,
/// * `//` right after `:` (`https://…`) is not a comment,
/// * `'` and `"` strings stop at an unescaped newline.
pub fn mask_literals(src: &str) -> String {
    use LState::*;

    let mut out = String::with_capacity(src.len());
    let mut state = Code;
    let mut prev: Option<char> = None;
    let mut chars = src.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            Code => match c {
                '\'' if prev.map_or(false, |p| p.is_alphanumeric()) => out.push(c),
                '"' | '\'' | '`' => {
                    state = InString {
                        quote: c,
                        escape: false,
                    };
                    out.push(' ');
                }
                '/' if chars.peek() == Some(&'/') && prev != Some(':') => {
                    chars.next();
                    state = InLineComment;
                    out.push_str("  ");
                    prev = Some('/');
                    continue;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = InBlockComment { star: false };
                    out.push_str("  ");
                    prev = Some('*');
                    continue;
                }
                _ => out.push(c),
            },
            InString { quote, escape } => {
                blank(&mut out, c);
                if escape {
                    state = InString {
                        quote,
                        escape: false,
                    };
                } else if c == '\\' {
                    state = InString {
                        quote,
                        escape: true,
                    };
                } else if c == quote || (c == '\n' && quote != '`') {
                    state = Code;
                }
            }
            InLineComment => {
                blank(&mut out, c);
                if c == '\n' {
                    state = Code;
                }
            }
            InBlockComment { star } => {
                blank(&mut out, c);
                if star && c == '/' {
                    state = Code;
                } else {
                    state = InBlockComment { star: c == '*' };
                }
            }
        }
        prev = Some(c);
    }
    out
}

/// Count `ch` in code positions only.
pub fn count_outside_literals(src: &str, ch: char) -> usize {
    mask_literals(src).chars().filter(|&c| c == ch).count()
}
