//! Broadcast of stream events to whoever is watching a run.

use std::sync::Mutex;

use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::types::StreamEvent;

/// Observer for run events. Must not block: it is called inline from the
/// run loop.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: StreamEvent);
}

/// Forwards into a tokio channel; a dropped receiver is not an error.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: StreamEvent) {
        if self.tx.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }
}

/// Keeps everything in memory.
#[derive(Debug, Default)]
pub struct CollectSink {
    events: Mutex<Vec<StreamEvent>>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StreamEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl EventSink for CollectSink {
    fn emit(&self, event: StreamEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

/// Writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: StreamEvent) {
        match &event {
            StreamEvent::FileChunk { path, text } => debug!("chunk {path} (+{} bytes)", text.len()),
            StreamEvent::FileStarted { path, .. } => info!("started {path}"),
            StreamEvent::FileCompleted { path } => info!("completed {path}"),
            StreamEvent::GenerationComplete => info!("generation complete"),
            StreamEvent::GenerationError { message } => warn!("generation error: {message}"),
        }
    }
}

impl<T: EventSink + ?Sized> EventSink for std::sync::Arc<T> {
    fn emit(&self, event: StreamEvent) {
        (**self).emit(event)
    }
}
