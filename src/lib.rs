//! Turns a streamed model response into a project on disk: the response is
//! split into files as it arrives, each finished file is repaired, and the
//! result is persisted and broadcast.

pub mod balance;
pub mod config;
pub mod demux;
pub mod error;
pub mod fix_target;
pub mod grammar;
pub mod lexer;
mod logging;
pub mod orchestrator;
pub mod prompt;
pub mod reconstruct;
pub mod repair;
pub mod sink;
pub mod source;
pub mod store;
pub mod types;

#[cfg(feature = "python")]
mod python;

pub use config::{Config, ReconcilePolicy, ReconstructPolicy};
pub use demux::{reconcile, Demuxer, Grammar, Recovered};
pub use error::{ArtifactError, ConfigError, RepairError, RunError, SourceError, StoreError};
pub use logging::init_logging;
pub use orchestrator::{Orchestrator, ProjectLocks, RunReport, RunState};
pub use repair::{FileClass, RepairEngine};
pub use sink::{ChannelSink, CollectSink, EventSink, LogSink};
pub use source::{CompletionSource, DeltaStream, ReplaySource};
pub use store::{FileStore, FsStore, MemoryStore};
pub use types::{
    Diagnostic, DiagnosticKind, FileArtifact, FileEvent, GenerationRequest, Mode, StreamEvent,
    Validation,
};
