use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::*;
use crate::error::SourceError;
use crate::sink::CollectSink;
use crate::source::{DeltaStream, ReplaySource, ThrottledSource};
use crate::store::MemoryStore;

/* -------------- helpers -------------------------------------------------- */

const FENCE: &str = "```";

fn block(path: &str, lang: &str, body: &str) -> String {
    format!("File: {path}\n{FENCE}{lang}\n{body}{FENCE}\n")
}

fn app_transcript() -> String {
    let mut s = String::from("Here is your app.\n\n");
    s += &block("package.json", "json", "{\"name\": \"todo\", \"dependencies\": {}\n");
    s += "\n";
    s += &block("src/App.jsx", "jsx", "function App() {\n  return <h1>Todo</h1>;\n}\n");
    s += "\n";
    s += &block("src/index.css", "css", "body { margin: 0; }\n");
    s += "Done.";
    s
}

fn orchestrator(
    source: Arc<dyn CompletionSource>,
    store: Arc<MemoryStore>,
) -> (Orchestrator, Arc<CollectSink>) {
    let sink = Arc::new(CollectSink::new());
    let orch = Orchestrator::new(source, store, sink.clone(), Config::default());
    (orch, sink)
}

fn replay(transcript: &str, chunk: usize) -> Arc<dyn CompletionSource> {
    Arc::new(ReplaySource::new(transcript, chunk))
}

/// Everything except chunks, for order assertions.
fn skeleton(events: &[StreamEvent]) -> Vec<StreamEvent> {
    events
        .iter()
        .filter(|e| !matches!(e, StreamEvent::FileChunk { .. }))
        .cloned()
        .collect()
}

fn started(path: &str) -> StreamEvent {
    StreamEvent::FileStarted {
        path: path.into(),
        name: crate::types::file_name(path),
    }
}

fn completed(path: &str) -> StreamEvent {
    StreamEvent::FileCompleted { path: path.into() }
}

#[derive(Default)]
struct Recording {
    transcript: String,
    prompts: Mutex<Vec<Prompt>>,
}

#[async_trait]
impl CompletionSource for Recording {
    async fn stream(&self, prompt: &Prompt) -> Result<DeltaStream, SourceError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        ReplaySource::new(self.transcript.clone(), 5).stream(prompt).await
    }
}

/* -------------- tests ---------------------------------------------------- */

#[test]
fn run_state_transitions() {
    assert!(RunState::Idle.can_become(RunState::Running));
    assert!(RunState::Running.can_become(RunState::TimedOut));
    assert!(!RunState::Idle.can_become(RunState::Completed));
    assert!(!RunState::Completed.can_become(RunState::Running));
    let mut s = RunState::Failed;
    assert!(matches!(
        s.advance(RunState::Running),
        Err(RunError::Transition { from: RunState::Failed, to: RunState::Running })
    ));
    assert!(RunState::TimedOut.is_terminal());
}

#[test]
fn project_locks_release_on_drop() {
    let locks = ProjectLocks::new();
    let g = locks.try_lock("p").unwrap();
    assert!(locks.try_lock("p").is_none());
    assert!(locks.try_lock("q").is_some());
    drop(g);
    assert!(!locks.is_locked("p"));
    assert!(locks.try_lock("p").is_some());
}

#[tokio::test]
async fn generate_run_persists_repaired_files_in_order() {
    let store = Arc::new(MemoryStore::new());
    let (orch, sink) = orchestrator(replay(&app_transcript(), 7), store.clone());

    let report = orch.run("p1", GenerationRequest::generate("a todo app")).await.unwrap();
    assert_eq!(report.state, RunState::Completed);
    assert!(report.error.is_none());
    assert_eq!(report.artifacts.len(), 3);
    assert!(report.recovered.is_empty());

    let events = sink.events();
    assert_eq!(
        skeleton(&events),
        vec![
            started("package.json"),
            completed("package.json"),
            started("src/App.jsx"),
            completed("src/App.jsx"),
            started("src/index.css"),
            completed("src/index.css"),
            StreamEvent::GenerationComplete,
        ]
    );

    // chunks carry the raw stream, the store gets the repaired file
    let streamed: String = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::FileChunk { path, text } if path == "src/App.jsx" => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(streamed, "function App() {\n  return <h1>Todo</h1>;\n}\n");
    let app = store.get("src/App.jsx").await.unwrap();
    assert!(app.ends_with("export default App;\n"));

    let manifest: Value = serde_json::from_str(&store.get("package.json").await.unwrap()).unwrap();
    assert_eq!(
        manifest,
        json!({"name": "todo", "dependencies": {"react": "^18.2.0", "react-dom": "^18.2.0"}})
    );
    assert_eq!(store.get("src/index.css").await.as_deref(), Some("body { margin: 0; }\n"));
    assert!(!orch.locks().is_locked("p1"));
}

#[tokio::test]
async fn truncated_stream_completes_once() {
    let transcript = "File: src/App.jsx\n```jsx\nexport default function App() {\n  return <p>hi</p>;\n";
    let store = Arc::new(MemoryStore::new());
    let (orch, sink) = orchestrator(replay(transcript, 4), store.clone());

    let report = orch.run("p", GenerationRequest::generate("x")).await.unwrap();
    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.artifacts.len(), 1);
    assert!(report.artifacts[0].truncated);
    let completions = sink
        .events()
        .iter()
        .filter(|e| matches!(e, StreamEvent::FileCompleted { .. }))
        .count();
    assert_eq!(completions, 1);
    assert_eq!(
        store.get("src/App.jsx").await.as_deref(),
        Some("export default function App() {\n  return <p>hi</p>;\n}\n")
    );
}

#[tokio::test]
async fn loose_headers_are_recovered_at_stream_end() {
    let mut transcript = block(
        "src/App.jsx",
        "jsx",
        "export default function App() { return <p>hi</p>; }\n",
    );
    transcript += "\n**src/utils/math.js**\n```js\nexport const add = (a, b) => a + b;\n```\n";
    let store = Arc::new(MemoryStore::new());
    let (orch, sink) = orchestrator(replay(&transcript, 9), store.clone());

    let report = orch.run("p", GenerationRequest::generate("x")).await.unwrap();
    assert_eq!(report.recovered, vec!["src/utils/math.js".to_string()]);
    assert_eq!(
        store.get("src/utils/math.js").await.as_deref(),
        Some("export const add = (a, b) => a + b;\n")
    );
    let events = skeleton(&sink.events());
    assert_eq!(
        &events[2..],
        &[
            started("src/utils/math.js"),
            completed("src/utils/math.js"),
            StreamEvent::GenerationComplete,
        ]
    );
}

#[tokio::test]
async fn source_error_keeps_streamed_files() {
    let mut transcript = block("src/a.js", "js", "export const a = 1;\n");
    transcript += "File: src/b.js\n```js\nexport const b =";
    let source = Arc::new(ReplaySource::new(transcript, 0).failing_after(1));
    let store = Arc::new(MemoryStore::new());
    let (orch, sink) = orchestrator(source, store.clone());

    let report = orch.run("p", GenerationRequest::generate("x")).await.unwrap();
    assert_eq!(report.state, RunState::Failed);
    assert!(report.error.unwrap().contains("replay cut off"));
    assert_eq!(store.get("src/a.js").await.as_deref(), Some("export const a = 1;\n"));
    assert_eq!(store.get("src/b.js").await.as_deref(), Some("export const b ="));

    let events = skeleton(&sink.events());
    assert!(matches!(events.last(), Some(StreamEvent::GenerationError { .. })));
    assert!(events.contains(&completed("src/b.js")));
    assert!(!events.contains(&StreamEvent::GenerationComplete));
}

#[tokio::test]
async fn store_failure_is_terminal() {
    let store = Arc::new(MemoryStore::new().failing_on("src/App.jsx"));
    let (orch, sink) = orchestrator(replay(&app_transcript(), 16), store.clone());

    let report = orch.run("p", GenerationRequest::generate("x")).await.unwrap();
    assert_eq!(report.state, RunState::Failed);
    assert!(report.error.unwrap().contains("write refused"));
    assert!(store.get("package.json").await.is_some());
    assert!(store.get("src/index.css").await.is_none());

    let events = skeleton(&sink.events());
    assert!(!events.contains(&completed("src/App.jsx")));
    assert!(!events.contains(&started("src/index.css")));
    assert!(matches!(events.last(), Some(StreamEvent::GenerationError { .. })));
}

#[tokio::test(start_paused = true)]
async fn timeout_emits_error_then_complete() {
    let source = Arc::new(ThrottledSource::new(
        ReplaySource::new(app_transcript(), 10),
        Duration::from_millis(100),
    ));
    let store = Arc::new(MemoryStore::new());
    let (orch, sink) = orchestrator(source, store);

    let report = orch
        .run("p", GenerationRequest::generate("x").with_timeout_ms(350))
        .await
        .unwrap();
    assert_eq!(report.state, RunState::TimedOut);
    let events = sink.events();
    let n = events.len();
    assert!(n >= 2);
    assert!(matches!(events[n - 2], StreamEvent::GenerationError { .. }));
    assert_eq!(events[n - 1], StreamEvent::GenerationComplete);
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 2);
    assert!(!orch.locks().is_locked("p"));
}

#[tokio::test]
async fn overlapping_run_is_rejected() {
    let (orch, sink) = orchestrator(replay(&app_transcript(), 7), Arc::new(MemoryStore::new()));
    let locks = orch.locks();
    let _held = locks.try_lock("busy").unwrap();

    let err = orch.run("busy", GenerationRequest::generate("x")).await.unwrap_err();
    assert!(matches!(err, RunError::AlreadyRunning(p) if p == "busy"));
    assert!(sink.events().is_empty());

    let err = orch.run("idle", GenerationRequest::generate("   ")).await.unwrap_err();
    assert!(matches!(err, RunError::EmptyPrompt));
}

#[tokio::test]
async fn fix_error_sends_target_file_as_context() {
    let store = Arc::new(MemoryStore::with_files([
        (
            "src/components/TodoList.jsx",
            "export default function TodoList({ items }) { return <ul>{items.map((i) => <li>{i}</li>)}</ul>; }\n",
        ),
        ("package.json", "{}\n"),
    ]));
    let fixed = block(
        "src/components/TodoList.jsx",
        "jsx",
        "export default function TodoList({ items = [] }) {\n  return <ul>{items.map((i) => <li key={i}>{i}</li>)}</ul>;\n}\n",
    );
    let source = Arc::new(Recording {
        transcript: fixed,
        ..Recording::default()
    });
    let (orch, _sink) = orchestrator(source.clone(), store.clone());

    let report = orch
        .run(
            "p",
            GenerationRequest::fix_error(
                "TypeError: Cannot read properties of undefined (reading 'map') in TodoList",
            ),
        )
        .await
        .unwrap();
    assert_eq!(report.state, RunState::Completed);

    let prompts = source.prompts.lock().unwrap().clone();
    assert_eq!(prompts.len(), 1);
    let user = &prompts[0].user;
    assert!(user.contains("most likely comes from src/components/TodoList.jsx"));
    assert!(user.contains("File: src/components/TodoList.jsx\n```jsx\nexport default function TodoList({ items })"));
    assert!(!user.contains("File: package.json"));
    assert!(store
        .get("src/components/TodoList.jsx")
        .await
        .unwrap()
        .contains("items = []"));
}

#[tokio::test]
async fn fix_error_falls_back_to_bootstrap_bundle() {
    let store = Arc::new(MemoryStore::with_files([
        ("package.json", "{\"name\": \"app\"}\n"),
        ("index.html", "<div id=\"root\"></div>\n"),
        ("src/App.jsx", "export default function App() { return null; }\n"),
        ("src/utils/x.js", "export const x = 1;\n"),
    ]));
    let source = Arc::new(Recording::default());
    let (orch, sink) = orchestrator(source.clone(), store);

    let report = orch.run("p", GenerationRequest::fix_error("something broke")).await.unwrap();
    assert_eq!(report.state, RunState::Completed);
    assert!(report.artifacts.is_empty());
    assert_eq!(sink.events(), vec![StreamEvent::GenerationComplete]);

    let user = source.prompts.lock().unwrap()[0].user.clone();
    let order: Vec<usize> = ["File: package.json", "File: index.html", "File: src/App.jsx"]
        .iter()
        .map(|h| user.find(h).unwrap())
        .collect();
    assert!(order.windows(2).all(|w| w[0] < w[1]));
    assert!(!user.contains("src/utils/x.js"));
    assert!(!user.contains("most likely"));
}

#[tokio::test]
async fn repeated_block_replaces_earlier_artifact() {
    let mut transcript = block("src/a.js", "js", "export const a = 1;\n");
    transcript += &block("src/a.js", "js", "export const a = 2;\n");
    let store = Arc::new(MemoryStore::new());
    let (orch, _sink) = orchestrator(replay(&transcript, 3), store.clone());

    let report = orch.run("p", GenerationRequest::generate("x")).await.unwrap();
    assert_eq!(report.artifacts.len(), 1);
    assert_eq!(report.artifacts[0].content, "export const a = 2;\n");
    assert_eq!(store.get("src/a.js").await.as_deref(), Some("export const a = 2;\n"));
}

#[tokio::test]
async fn generate_run_passes_preferences_to_the_prompt() {
    let source = Arc::new(Recording {
        transcript: block("src/index.css", "css", "body { color: red; }\n"),
        ..Recording::default()
    });
    let store = Arc::new(MemoryStore::new());
    let (orch, _sink) = orchestrator(source.clone(), store.clone());

    let request = GenerationRequest::generate("a landing page")
        .with_preferences(json!({"styling": "tailwind", "theme": null}));
    let report = orch.run("p", request).await.unwrap();
    assert_eq!(report.state, RunState::Completed);

    let user = source.prompts.lock().unwrap()[0].user.clone();
    assert_eq!(user, "a landing page\n- styling: tailwind\n");
    let files: Vec<(String, String)> = store.snapshot().await.into_iter().collect();
    assert_eq!(
        files,
        vec![("src/index.css".to_string(), "body { color: red; }\n".to_string())]
    );
}
