use crate::balance::{check_brackets, check_tags};
use crate::repair::RepairEngine;
use crate::types::DiagnosticKind;

fn fix(path: &str, src: &str) -> crate::types::Validation {
    RepairEngine::default().validate(path, src)
}

#[test]
fn three_sibling_roots_are_wrapped() {
    let src = "export default function App() {
  return (
    <h1>A</h1>
    <p>B</p>
    <p>C</p>
  );
}
";
    let v = fix("src/App.jsx", src);
    assert!(v.has(DiagnosticKind::MultipleRoots));
    assert!(v
        .content
        .contains("<div><h1>A</h1>\n    <p>B</p>\n    <p>C</p></div>"));
    assert!(!v.reconstructed());
}

#[test]
fn bare_return_siblings_are_wrapped() {
    let v = fix(
        "src/components/Pair.jsx",
        "const Pair = () => {\n  return <Left />{sep}<Right />;\n};\nexport default Pair;\n",
    );
    assert!(v.content.contains("return <div><Left />{sep}<Right /></div>;"));
}

#[test]
fn single_root_with_nested_map_is_left_alone() {
    let src = "export default function L({ items }) {
  return (
    <ul>
      {items.map((i) => <li key={i}>{i}</li>)}
    </ul>
  );
}
";
    let v = fix("src/components/L.jsx", src);
    assert_eq!(v.content, src);
}

#[test]
fn truncated_component_is_completed() {
    let v = fix(
        "src/components/Hero.jsx",
        "export default function Hero() {\n  return (\n    <section>\n      <h1>Welcome",
    );
    assert!(!v.reconstructed());
    assert!(v.content.ends_with("<h1>Welcome\n</h1></section>)}\n"));
    assert!(v.has(DiagnosticKind::UnclosedTag));
    assert!(v.has(DiagnosticKind::UnbalancedBrackets));
    assert!(check_brackets(&v.content).balanced);
    assert!(check_tags(&v.content).closed);
}

#[test]
fn missing_brace_only() {
    let v = fix(
        "src/components/Tiny.jsx",
        "export default function Tiny() {\n  return <p>tiny</p>;\n",
    );
    assert_eq!(
        v.content,
        "export default function Tiny() {\n  return <p>tiny</p>;\n}\n"
    );
}

#[test]
fn stray_paren_after_closing_tag() {
    let v = fix(
        "src/components/Card.jsx",
        "const Card = () => {\n  return <div>card</div>);\n};\nexport default Card;\n",
    );
    assert_eq!(
        v.content,
        "const Card = () => {\n  return <div>card</div>;\n};\nexport default Card;\n"
    );
    assert!(v.has(DiagnosticKind::StrayParen));
}

#[test]
fn stray_paren_elsewhere_is_not_touched() {
    // not after a tag: left for reconstruction
    let v = fix(
        "src/components/Calc.jsx",
        "export default function Calc() {\n  const x = f(1));\n  return <p>{x}</p>;\n}\n",
    );
    assert!(!v.has(DiagnosticKind::StrayParen));
    assert!(v.reconstructed());
}

#[test]
fn duplicated_closing_tag_collapses() {
    let v = fix(
        "src/components/List.jsx",
        "export default function List() {\n  return (\n    <ul>\n      <li>a</li></li>\n    </ul>\n  );\n}\n",
    );
    assert!(v.has(DiagnosticKind::DuplicateClosingTag));
    assert!(v.content.contains("<li>a</li>\n    </ul>"));
    assert!(!v.reconstructed());
}

#[test]
fn arrow_component_gets_export() {
    let v = fix(
        "src/components/Badge.tsx",
        "type Props = { label: string };\nconst Badge = ({ label }: Props) => <span>{label}</span>;\n",
    );
    assert!(v.content.ends_with("\n\nexport default Badge;\n"));
}

#[test]
fn apostrophes_in_jsx_text_are_not_strings() {
    let src = "export default function Note() {\n  return <p>Don't forget it's due</p>;\n}\n";
    assert_eq!(fix("src/components/Note.jsx", src).content, src);
}

#[test]
fn leading_language_tag_and_trailing_fence() {
    let v = fix(
        "src/components/Foo.jsx",
        "jsx\nexport default function Foo() {\n  return <div />;\n}\n```\n",
    );
    assert_eq!(
        v.content,
        "export default function Foo() {\n  return <div />;\n}\n"
    );
    assert!(v.has(DiagnosticKind::LanguageTag));
}
