//! Prompt construction for both run modes.
//!
//! Prompts are small `{{var}}` / `{{#each list}}…{{/each}}` templates rendered
//! against a `serde_json::Value` context.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_until1},
    character::complete::multispace0,
    combinator::{map, rest, verify},
    multi::many0,
    sequence::{delimited, preceded, terminated},
    IResult,
};
use serde_json::{json, Value};

/// What is sent to the completion source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// A project file shown to the model in fix-error mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextFile {
    pub path: String,
    pub content: String,
}

const SYSTEM: &str = "You build complete React single-page apps with Vite.
Emit every file exactly like this:

File: <relative path>
```<language>
<entire file content>
```

Rules:
- One block per file, always the full content, never placeholders.
- Paths are relative to the project root; allowed extensions: {{extensions}}.
- package.json lists every package you import.
- Every component file ends with a default export.
";

const GENERATE: &str = "{{prompt}}
{{#each preferences}}- {{key}}: {{value}}
{{/each}}";

const FIX: &str = "The running app reports this error:

{{error}}
{{#each target}}
The error most likely comes from {{.}}.
{{/each}}
{{#each files}}File: {{path}}
```{{lang}}
{{content}}
```

{{/each}}Return only the files that must change, each one in full.
";

/*──────────────────────────── templates ──────────────────────────────*/

#[derive(Debug, PartialEq)]
enum Segment {
    Text(String),
    Variable(String),
    Each { path: String, body: Vec<Segment> },
}

fn parse_variable(input: &str) -> IResult<&str, Segment> {
    map(
        delimited(
            tag("{{"),
            preceded(multispace0, terminated(take_until("}}"), multispace0)),
            tag("}}"),
        ),
        |var: &str| Segment::Variable(var.trim().to_string()),
    )(input)
}

fn parse_each(input: &str) -> IResult<&str, Segment> {
    let (input, _) = tag("{{")(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = tag("#each")(input)?;
    let (input, _) = multispace0(input)?;
    let (input, path) = take_until("}}")(input)?;
    let (input, _) = tag("}}")(input)?;
    let (input, body) = take_until("{{/each}}")(input)?;
    let (input, _) = tag("{{/each}}")(input)?;

    let (_, body) = parse_template(body)?;
    Ok((
        input,
        Segment::Each {
            path: path.trim().to_string(),
            body,
        },
    ))
}

fn parse_text(input: &str) -> IResult<&str, Segment> {
    map(
        alt((take_until1("{{"), verify(rest, |s: &str| !s.is_empty()))),
        |t: &str| Segment::Text(t.to_string()),
    )(input)
}

fn parse_template(input: &str) -> IResult<&str, Vec<Segment>> {
    many0(alt((parse_each, parse_variable, parse_text)))(input)
}

/// `a.b.c` inside `scope`, then inside `root`; `.` is the scope itself.
fn lookup<'v>(path: &str, scope: &'v Value, root: &'v Value) -> Option<&'v Value> {
    if path == "." {
        return Some(scope);
    }
    let walk = |start: &'v Value| {
        path.split('.')
            .try_fold(start, |v, key| v.get(key))
    };
    walk(scope).or_else(|| walk(root))
}

fn display(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_segments(segs: &[Segment], scope: &Value, root: &Value, out: &mut String) {
    for seg in segs {
        match seg {
            Segment::Text(t) => out.push_str(t),
            Segment::Variable(v) => {
                if let Some(val) = lookup(v, scope, root) {
                    out.push_str(&display(val));
                }
            }
            Segment::Each { path, body } => match lookup(path, scope, root) {
                Some(Value::Array(items)) => {
                    for item in items {
                        render_segments(body, item, root, out);
                    }
                }
                Some(Value::Null) | None => {}
                Some(single) => render_segments(body, single, root, out),
            },
        }
    }
}

/// Render `template` against `ctx`. Missing variables render empty.
pub fn render(template: &str, ctx: &Value) -> String {
    match parse_template(template) {
        Ok((_, segs)) => {
            let mut out = String::with_capacity(template.len());
            render_segments(&segs, ctx, ctx, &mut out);
            out
        }
        Err(_) => template.to_string(),
    }
}

/*──────────────────────────── prompts ────────────────────────────────*/

fn system_prompt<S: AsRef<str>>(allowed: &[S]) -> String {
    let extensions = allowed
        .iter()
        .map(|e| format!(".{}", e.as_ref()))
        .collect::<Vec<_>>()
        .join(", ");
    render(SYSTEM, &json!({ "extensions": extensions }))
}

/// Preferences as `key: value` pairs; a bare string becomes one `style` entry.
fn preference_items(preferences: Option<&Value>) -> Value {
    match preferences {
        Some(Value::Object(map)) => Value::Array(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| json!({ "key": k, "value": display(v) }))
                .collect(),
        ),
        Some(Value::String(s)) if !s.trim().is_empty() => json!([{ "key": "style", "value": s }]),
        _ => json!([]),
    }
}

pub fn generate_prompt<S: AsRef<str>>(
    prompt: &str,
    preferences: Option<&Value>,
    allowed: &[S],
) -> Prompt {
    let ctx = json!({
        "prompt": prompt.trim(),
        "preferences": preference_items(preferences),
    });
    Prompt {
        system: system_prompt(allowed),
        user: render(GENERATE, &ctx),
    }
}

fn fence_lang(path: &str) -> &str {
    match path.rsplit_once('.').map(|(_, e)| e) {
        Some("js" | "mjs" | "cjs") => "javascript",
        Some(ext) => ext,
        None => "",
    }
}

pub fn fix_prompt<S: AsRef<str>>(
    error: &str,
    target: Option<&str>,
    files: &[ContextFile],
    allowed: &[S],
) -> Prompt {
    let files: Vec<Value> = files
        .iter()
        .map(|f| {
            json!({
                "path": f.path,
                "lang": fence_lang(&f.path),
                "content": f.content.trim_end(),
            })
        })
        .collect();
    let ctx = json!({
        "error": error.trim(),
        "target": target.map(|t| vec![t]).unwrap_or_default(),
        "files": files,
    });
    Prompt {
        system: system_prompt(allowed),
        user: render(FIX, &ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demux::{Demuxer, Grammar};
    use crate::grammar::DEFAULT_EXTENSIONS;
    use crate::types::FileEvent;

    #[test]
    fn parse_variable_and_each() {
        let (rest, segs) = parse_template("Hello {{user.name}}! {{#each hobbies}}* {{.}}{{/each}}").unwrap();
        assert_eq!(rest, "");
        assert_eq!(
            segs,
            vec![
                Segment::Text("Hello ".into()),
                Segment::Variable("user.name".into()),
                Segment::Text("! ".into()),
                Segment::Each {
                    path: "hobbies".into(),
                    body: vec![Segment::Text("* ".into()), Segment::Variable(".".into())],
                },
            ]
        );
    }

    #[test]
    fn trailing_text_and_unterminated_braces() {
        let (rest, segs) = parse_template("a {{b}} c {{ d").unwrap();
        assert_eq!(rest, "");
        assert_eq!(segs.last(), Some(&Segment::Text("{{ d".into())));
    }

    #[test]
    fn render_resolves_scope_then_root() {
        let ctx = json!({"sep": "/", "xs": [{"n": 1}, {"n": 2}], "user": {"name": "ada"}});
        assert_eq!(render("{{#each xs}}{{n}}{{sep}}{{/each}}", &ctx), "1/2/");
        assert_eq!(render("hi {{user.name}}{{missing}}", &ctx), "hi ada");
    }

    #[test]
    fn generate_lists_preferences() {
        let prefs = json!({"styling": "tailwind", "dark": true, "skip": null});
        let p = generate_prompt("  a todo app ", Some(&prefs), DEFAULT_EXTENSIONS);
        assert_eq!(p.user, "a todo app\n- dark: true\n- styling: tailwind\n");
        assert!(p.system.contains("File: <relative path>"));
        assert!(p.system.contains(".jsx, .ts, .tsx"));
    }

    #[test]
    fn fix_prompt_is_demuxable() {
        let files = vec![ContextFile {
            path: "src/App.jsx".into(),
            content: "export default function App() {}\n".into(),
        }];
        let p = fix_prompt(
            "TypeError: x is undefined",
            Some("src/App.jsx"),
            &files,
            DEFAULT_EXTENSIONS,
        );
        assert!(p.user.contains("most likely comes from src/App.jsx."));

        // the context blocks use the same format the model must answer in
        let mut d = Demuxer::new(DEFAULT_EXTENSIONS, Grammar::Strict);
        let mut events = d.push(&p.user);
        events.extend(d.finish());
        let completed: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                FileEvent::Completed { path, content, .. } => Some((path.as_str(), content.as_str())),
                _ => None,
            })
            .collect();
        assert_eq!(completed, vec![("src/App.jsx", "export default function App() {}\n")]);
    }
}
