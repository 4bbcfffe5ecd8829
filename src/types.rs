use serde::{Deserialize, Serialize};

use crate::error::ArtifactError;
use crate::repair::RepairEngine;

/*──────────────────────────── requests ───────────────────────────────*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    #[default]
    Generate,
    FixError,
}

/// One external trigger. `timeout_ms == 0` falls back to the configured
/// default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<serde_json::Value>,
    #[serde(default)]
    pub timeout_ms: u64,
}

impl GenerationRequest {
    pub fn generate(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            mode: Mode::Generate,
            preferences: None,
            timeout_ms: 0,
        }
    }

    pub fn fix_error(description: impl Into<String>) -> Self {
        Self {
            mode: Mode::FixError,
            ..Self::generate(description)
        }
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    pub fn with_preferences(mut self, preferences: serde_json::Value) -> Self {
        self.preferences = Some(preferences);
        self
    }
}

/*──────────────────────────── diagnostics ────────────────────────────*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticKind {
    LanguageTag,
    UnbalancedBrackets,
    UnclosedTag,
    StrayParen,
    DuplicateClosingTag,
    MultipleRoots,
    MissingExport,
    ManifestParseError,
    BaselineDependency,
    EntryPointReplaced,
    Reconstructed,
    RepairFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub fixed: bool,
}

impl Diagnostic {
    pub fn fixed(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            fixed: true,
        }
    }

    pub fn unfixed(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            fixed: false,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = if self.fixed { "fixed" } else { "unfixed" };
        write!(f, "[{:?}/{}] {}", self.kind, tag, self.message)
    }
}

/// Output of the repair engine: new content plus what happened to it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Validation {
    pub content: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl Validation {
    pub fn has(&self, kind: DiagnosticKind) -> bool {
        self.diagnostics.iter().any(|d| d.kind == kind)
    }

    pub fn reconstructed(&self) -> bool {
        self.has(DiagnosticKind::Reconstructed)
    }
}

/*──────────────────────────── artifacts ──────────────────────────────*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactState {
    Pending,
    Streaming,
    Completed,
    Validated,
}

/// Last path segment, used as the display name in `file-started`.
pub fn file_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

/// One file reconstructed from the stream. The captured `content` only ever
/// grows and is frozen on completion; validation output is kept beside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileArtifact {
    pub path: String,
    pub content: String,
    pub state: ArtifactState,
    /// Stream ended before the closing fence.
    pub truncated: bool,
    pub validation: Option<Validation>,
}

impl FileArtifact {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: String::new(),
            state: ArtifactState::Pending,
            truncated: false,
            validation: None,
        }
    }

    pub fn name(&self) -> String {
        file_name(&self.path)
    }

    fn invalid(&self, action: &'static str) -> ArtifactError {
        ArtifactError::InvalidState {
            path: self.path.clone(),
            state: self.state,
            action,
        }
    }

    pub fn append(&mut self, text: &str) -> Result<(), ArtifactError> {
        match self.state {
            ArtifactState::Pending | ArtifactState::Streaming => {
                self.state = ArtifactState::Streaming;
                self.content.push_str(text);
                Ok(())
            }
            _ => Err(self.invalid("append to")),
        }
    }

    pub fn complete(&mut self, truncated: bool) -> Result<(), ArtifactError> {
        match self.state {
            ArtifactState::Pending | ArtifactState::Streaming => {
                self.state = ArtifactState::Completed;
                self.truncated = truncated;
                Ok(())
            }
            _ => Err(self.invalid("complete")),
        }
    }

    /// Run the engine over the frozen content. The original stays untouched
    /// so diagnostics can be reproduced from it.
    pub fn validate_with(&mut self, engine: &RepairEngine) -> Result<&Validation, ArtifactError> {
        if self.state != ArtifactState::Completed {
            return Err(self.invalid("validate"));
        }
        let validation = engine.validate(&self.path, &self.content);
        self.state = ArtifactState::Validated;
        Ok(&*self.validation.insert(validation))
    }

    /// What should be persisted: validated content once available.
    pub fn final_content(&self) -> &str {
        self.validation
            .as_ref()
            .map(|v| v.content.as_str())
            .unwrap_or(&self.content)
    }
}

/*──────────────────────────── events ─────────────────────────────────*/

/// Demuxer output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Started { path: String, name: String },
    Chunk { path: String, text: String },
    Completed {
        path: String,
        content: String,
        truncated: bool,
    },
}

impl FileEvent {
    pub fn path(&self) -> &str {
        match self {
            FileEvent::Started { path, .. }
            | FileEvent::Chunk { path, .. }
            | FileEvent::Completed { path, .. } => path,
        }
    }
}

/// Broadcast contract, serialised as `{"event": "file-started", …}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum StreamEvent {
    FileStarted { path: String, name: String },
    FileChunk { path: String, text: String },
    FileCompleted { path: String },
    GenerationComplete,
    GenerationError { message: String },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::GenerationComplete | StreamEvent::GenerationError { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_wire_shape() {
        let req: GenerationRequest = serde_json::from_value(json!({
            "prompt": "fix it",
            "mode": "fix-error",
            "timeoutMs": 5000
        }))
        .unwrap();
        assert_eq!(req.mode, Mode::FixError);
        assert_eq!(req.timeout_ms, 5000);
        assert!(req.preferences.is_none());

        let req: GenerationRequest = serde_json::from_value(json!({"prompt": "todo app"})).unwrap();
        assert_eq!(req.mode, Mode::Generate);
    }

    #[test]
    fn event_wire_shape() {
        let ev = StreamEvent::FileStarted {
            path: "src/App.jsx".into(),
            name: "App.jsx".into(),
        };
        assert_eq!(
            serde_json::to_value(&ev).unwrap(),
            json!({"event": "file-started", "path": "src/App.jsx", "name": "App.jsx"})
        );
        assert_eq!(
            serde_json::to_value(StreamEvent::GenerationComplete).unwrap(),
            json!({"event": "generation-complete"})
        );
    }

    #[test]
    fn artifact_lifecycle() {
        let mut a = FileArtifact::new("src/App.jsx");
        assert_eq!(a.state, ArtifactState::Pending);
        a.append("a").unwrap();
        a.append("b\n").unwrap();
        assert_eq!(a.state, ArtifactState::Streaming);
        a.complete(false).unwrap();
        assert!(a.append("late").is_err());
        assert_eq!(a.content, "ab\n");
        assert_eq!(a.name(), "App.jsx");
    }

    #[test]
    fn validation_keeps_original() {
        let engine = RepairEngine::default();
        let mut a = FileArtifact::new("src/components/Foo.jsx");
        a.append("function Foo() { return <div>Hi</div>; }\n").unwrap();
        assert!(a.validate_with(&engine).is_err());
        a.complete(false).unwrap();
        let v = a.validate_with(&engine).unwrap().clone();
        assert!(v.content.contains("export default Foo"));
        assert!(!a.content.contains("export default"));
        assert_eq!(a.final_content(), v.content);
        assert_eq!(a.state, ArtifactState::Validated);
    }
}
