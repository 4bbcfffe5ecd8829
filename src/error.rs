use thiserror::Error;

use crate::types::ArtifactState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtifactError {
    #[error("cannot {action} `{path}` while it is {state:?}")]
    InvalidState {
        path: String,
        state: ArtifactState,
        action: &'static str,
    },
}

/// A repair pass that could not run to completion. Never fatal: the engine
/// keeps the pre-pass content and records a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepairError {
    #[error("manifest is not a JSON object")]
    ManifestNotObject,
    #[error("manifest serialisation failed: {0}")]
    ManifestSerialize(String),
    #[error("offset {offset} is outside the {len}-byte buffer")]
    OutOfBounds { offset: usize, len: usize },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("refusing unsafe path `{0}`")]
    UnsafePath(String),
    #[error("i/o error on `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("background write task failed: {0}")]
    Join(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("completion request failed: {0}")]
    Request(String),
    #[error("completion stream broke: {0}")]
    Stream(String),
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("a run is already active for project `{0}`")]
    AlreadyRunning(String),
    #[error("request prompt is empty")]
    EmptyPrompt,
    #[error("illegal run transition {from:?} -> {to:?}")]
    Transition {
        from: crate::orchestrator::RunState,
        to: crate::orchestrator::RunState,
    },
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value `{value}` for {var}")]
    Env { var: &'static str, value: String },
}
