//! One generation run: prompt → stream → demux → repair → persist → broadcast.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use log::{debug, info, warn};
use serde::Serialize;

use crate::config::Config;
use crate::demux::{reconcile, Demuxer, Grammar};
use crate::error::RunError;
use crate::fix_target::find_target;
use crate::prompt::{fix_prompt, generate_prompt, ContextFile, Prompt};
use crate::repair::RepairEngine;
use crate::sink::EventSink;
use crate::source::CompletionSource;
use crate::store::FileStore;
use crate::types::{FileArtifact, FileEvent, GenerationRequest, Mode, StreamEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }

    pub fn can_become(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::TimedOut)
        )
    }

    fn advance(&mut self, next: RunState) -> Result<(), RunError> {
        if !self.can_become(next) {
            return Err(RunError::Transition { from: *self, to: next });
        }
        *self = next;
        Ok(())
    }
}

/*──────────────────────────── project locks ──────────────────────────*/

/// At most one active run per project.
#[derive(Debug, Default)]
pub struct ProjectLocks {
    active: Mutex<HashSet<String>>,
}

/// Released on drop.
#[derive(Debug)]
pub struct ProjectGuard {
    locks: Arc<ProjectLocks>,
    project: String,
}

impl ProjectLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn try_lock(self: &Arc<Self>, project: &str) -> Option<ProjectGuard> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(project.to_string()) {
            return None;
        }
        Some(ProjectGuard {
            locks: Arc::clone(self),
            project: project.to_string(),
        })
    }

    pub fn is_locked(&self, project: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(project)
    }
}

impl Drop for ProjectGuard {
    fn drop(&mut self) {
        self.locks
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.project);
    }
}

/*──────────────────────────── run ────────────────────────────────────*/

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub project: String,
    pub state: RunState,
    pub artifacts: Vec<FileArtifact>,
    /// Paths persisted by the end-of-stream reconciliation pass.
    pub recovered: Vec<String>,
    pub error: Option<String>,
}

struct RunCtx {
    demux: Demuxer,
    artifacts: Vec<FileArtifact>,
    recovered: Vec<String>,
}

impl RunCtx {
    /// The open artifact for `path`, created if the demuxer skipped `Started`.
    fn open(&mut self, path: &str) -> &mut FileArtifact {
        let idx = self
            .artifacts
            .iter()
            .rposition(|a| a.path == path && a.state != crate::types::ArtifactState::Validated);
        let idx = match idx {
            Some(i) => i,
            None => {
                self.artifacts.push(FileArtifact::new(path));
                self.artifacts.len() - 1
            }
        };
        &mut self.artifacts[idx]
    }
}

pub struct Orchestrator {
    source: Arc<dyn CompletionSource>,
    store: Arc<dyn FileStore>,
    sink: Arc<dyn EventSink>,
    engine: Arc<RepairEngine>,
    config: Config,
    locks: Arc<ProjectLocks>,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn CompletionSource>,
        store: Arc<dyn FileStore>,
        sink: Arc<dyn EventSink>,
        config: Config,
    ) -> Self {
        Self {
            source,
            store,
            sink,
            engine: Arc::new(RepairEngine::from_config(&config)),
            config,
            locks: ProjectLocks::new(),
        }
    }

    /// Share one engine with the store so both repair identically.
    pub fn with_engine(mut self, engine: Arc<RepairEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_locks(mut self, locks: Arc<ProjectLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn engine(&self) -> Arc<RepairEngine> {
        Arc::clone(&self.engine)
    }

    pub fn locks(&self) -> Arc<ProjectLocks> {
        Arc::clone(&self.locks)
    }

    /// Execute one request for `project`. Errors are returned only when the
    /// run never started; everything after that is reported in the
    /// [`RunReport`] and through the sink.
    pub async fn run(&self, project: &str, request: GenerationRequest) -> Result<RunReport, RunError> {
        if request.prompt.trim().is_empty() {
            return Err(RunError::EmptyPrompt);
        }
        let _guard = self
            .locks
            .try_lock(project)
            .ok_or_else(|| RunError::AlreadyRunning(project.to_string()))?;

        let mut state = RunState::Idle;
        state.advance(RunState::Running)?;
        let budget = match request.timeout_ms {
            0 => self.config.timeout_ms,
            ms => ms,
        };
        info!("{project}: {:?} run started (budget {budget} ms)", request.mode);

        let mut ctx = RunCtx {
            demux: Demuxer::new(&self.config.allowed_extensions, Grammar::Strict),
            artifacts: Vec::new(),
            recovered: Vec::new(),
        };
        let outcome =
            tokio::time::timeout(Duration::from_millis(budget), self.drive(&request, &mut ctx)).await;

        let error = match outcome {
            Ok(Ok(())) => {
                state.advance(RunState::Completed)?;
                self.sink.emit(StreamEvent::GenerationComplete);
                None
            }
            Ok(Err(e)) => {
                state.advance(RunState::Failed)?;
                let message = e.to_string();
                warn!("{project}: run failed: {message}");
                self.sink.emit(StreamEvent::GenerationError {
                    message: message.clone(),
                });
                Some(message)
            }
            Err(_) => {
                state.advance(RunState::TimedOut)?;
                let message = format!("generation timed out after {budget} ms");
                warn!("{project}: {message}");
                self.sink.emit(StreamEvent::GenerationError {
                    message: message.clone(),
                });
                self.sink.emit(StreamEvent::GenerationComplete);
                Some(message)
            }
        };
        info!(
            "{project}: run {:?}, {} file(s), {} recovered",
            state,
            ctx.artifacts.len(),
            ctx.recovered.len()
        );

        Ok(RunReport {
            project: project.to_string(),
            state,
            artifacts: ctx.artifacts,
            recovered: ctx.recovered,
            error,
        })
    }

    async fn drive(&self, request: &GenerationRequest, ctx: &mut RunCtx) -> Result<(), RunError> {
        let prompt = self.build_prompt(request).await;
        let mut stream = self.source.stream(&prompt).await?;

        while let Some(delta) = stream.next().await {
            match delta {
                Ok(delta) => {
                    for ev in ctx.demux.push(&delta) {
                        self.handle(ev, ctx).await?;
                    }
                }
                Err(e) => {
                    // keep what was already streamed for the open file
                    for ev in ctx.demux.finish() {
                        self.handle(ev, ctx).await?;
                    }
                    return Err(e.into());
                }
            }
        }
        for ev in ctx.demux.finish() {
            self.handle(ev, ctx).await?;
        }
        self.reconcile(ctx).await
    }

    async fn handle(&self, ev: FileEvent, ctx: &mut RunCtx) -> Result<(), RunError> {
        match ev {
            FileEvent::Started { path, name } => {
                debug!("file started: {path}");
                // a repeated block replaces the earlier one
                ctx.artifacts.retain(|a| a.path != path);
                ctx.artifacts.push(FileArtifact::new(path.clone()));
                self.sink.emit(StreamEvent::FileStarted { path, name });
            }
            FileEvent::Chunk { path, text } => {
                let artifact = ctx.open(&path);
                artifact.append(&text)?;
                if self.config.persist_partial {
                    if let Err(e) = self.store.create_or_update_file(&path, &artifact.content).await {
                        warn!("partial write of {path} failed: {e}");
                    }
                }
                self.sink.emit(StreamEvent::FileChunk { path, text });
            }
            FileEvent::Completed {
                path,
                content,
                truncated,
            } => {
                let artifact = ctx.open(&path);
                if artifact.content != content {
                    artifact.content = content;
                }
                artifact.complete(truncated)?;
                self.finalize(artifact).await?;
                self.sink.emit(StreamEvent::FileCompleted { path });
            }
        }
        Ok(())
    }

    /// Validate and persist a completed artifact. A store failure is terminal.
    async fn finalize(&self, artifact: &mut FileArtifact) -> Result<(), RunError> {
        artifact.validate_with(&self.engine)?;
        if let Some(validation) = &artifact.validation {
            for d in &validation.diagnostics {
                if d.fixed {
                    debug!("{}: {d}", artifact.path);
                } else {
                    warn!("{}: {d}", artifact.path);
                }
            }
        }
        if artifact.truncated {
            warn!("{}: stream ended before the closing fence", artifact.path);
        }
        self.store
            .create_or_update_file(&artifact.path, artifact.final_content())
            .await?;
        Ok(())
    }

    async fn reconcile(&self, ctx: &mut RunCtx) -> Result<(), RunError> {
        let captured: HashSet<String> = ctx.artifacts.iter().map(|a| a.path.clone()).collect();
        let found = reconcile(
            ctx.demux.raw(),
            &self.config.allowed_extensions,
            &captured,
            self.config.reconcile,
        );
        for rec in found {
            info!("recovered {} from loosely formatted output", rec.path);
            let mut artifact = FileArtifact::new(rec.path.clone());
            artifact.append(&rec.content)?;
            artifact.complete(rec.truncated)?;
            self.sink.emit(StreamEvent::FileStarted {
                path: rec.path.clone(),
                name: artifact.name(),
            });
            self.finalize(&mut artifact).await?;
            self.sink.emit(StreamEvent::FileCompleted {
                path: rec.path.clone(),
            });
            ctx.artifacts.retain(|a| a.path != rec.path);
            ctx.artifacts.push(artifact);
            ctx.recovered.push(rec.path);
        }
        Ok(())
    }

    async fn read_context(&self, path: &str) -> Option<ContextFile> {
        match self.store.read_file(path).await {
            Ok(Some(content)) => Some(ContextFile {
                path: path.to_string(),
                content,
            }),
            Ok(None) => None,
            Err(e) => {
                warn!("cannot read {path} for context: {e}");
                None
            }
        }
    }

    async fn build_prompt(&self, request: &GenerationRequest) -> Prompt {
        let allowed = &self.config.allowed_extensions;
        match request.mode {
            Mode::Generate => generate_prompt(&request.prompt, request.preferences.as_ref(), allowed),
            Mode::FixError => {
                let files = self.store.list_files().await.unwrap_or_else(|e| {
                    warn!("cannot list project files: {e}");
                    Vec::new()
                });
                let target = find_target(&request.prompt, &files, allowed);
                let mut context = Vec::new();
                if let Some(t) = &target {
                    debug!("fix target {} ({:?})", t.path, t.heuristic);
                    context.extend(self.read_context(&t.path).await);
                }
                if context.is_empty() {
                    let fallback = std::iter::once(&self.config.manifest_path)
                        .chain(self.config.bootstrap_files.iter());
                    for path in fallback {
                        context.extend(self.read_context(path).await);
                    }
                }
                fix_prompt(
                    &request.prompt,
                    target.as_ref().map(|t| t.path.as_str()),
                    &context,
                    allowed,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests;
