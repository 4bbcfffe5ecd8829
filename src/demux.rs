//! Incremental file-block demuxer:  `File: <path>` ⏎ ```lang ⏎ … ⏎ ```
//!
//! The demuxer only ever acts on complete lines, so where the transport cut
//! the text has no influence on the produced events. The buffer holds the
//! whole transcript; a cursor marks the first byte not yet consumed.
//!
//! Under [`Grammar::Loose`] a block opened by a bare path line is abandoned,
//! without a `Completed` event, when a `File:` header appears inside it.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::config::ReconcilePolicy;
use crate::grammar::{fence_open, is_fence_close, parse_header, parse_loose_header};
use crate::types::{file_name, FileEvent};

#[derive(Debug, Clone, PartialEq)]
enum State {
    Scanning,
    /// Header seen, waiting for the opening fence. `loose` marks a bare
    /// path line rather than a `File:` header.
    AwaitingFence { path: String, loose: bool },
    Capturing {
        path: String,
        content: String,
        loose: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    /// `File: <path>` headers only.
    Strict,
    /// Strict headers plus bare (markdown-decorated) path lines.
    Loose,
}

#[derive(Debug)]
pub struct Demuxer {
    buf: String,
    cursor: usize,
    state: State,
    allowed: Vec<String>,
    grammar: Grammar,
    finished: bool,
}

impl Demuxer {
    pub fn new<S: AsRef<str>>(allowed_extensions: &[S], grammar: Grammar) -> Self {
        Self {
            buf: String::new(),
            cursor: 0,
            state: State::Scanning,
            allowed: allowed_extensions
                .iter()
                .map(|s| s.as_ref().to_string())
                .collect(),
            grammar,
            finished: false,
        }
    }

    /// Everything pushed so far.
    pub fn raw(&self) -> &str {
        &self.buf
    }

    /// Path of the block currently being captured.
    pub fn current_path(&self) -> Option<&str> {
        match &self.state {
            State::Capturing { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Feed the next delta; returns events for every line it completed.
    pub fn push(&mut self, delta: &str) -> Vec<FileEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }
        self.buf.push_str(delta);

        while let Some(off) = self.buf[self.cursor..].find('\n') {
            let end = self.cursor + off + 1;
            let line = self.buf[self.cursor..end].to_string();
            self.cursor = end;
            self.on_line(&line, &mut events);
        }
        events
    }

    /// Stream ended: flush a block still being captured.
    pub fn finish(&mut self) -> Vec<FileEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }
        self.finished = true;
        let tail = self.buf[self.cursor..].to_string();
        self.cursor = self.buf.len();

        if let State::Capturing {
            path, mut content, ..
        } = std::mem::replace(&mut self.state, State::Scanning)
        {
            let closed = !tail.is_empty() && is_fence_close(&tail);
            if !closed && !tail.is_empty() {
                content.push_str(&tail);
                events.push(FileEvent::Chunk {
                    path: path.clone(),
                    text: tail,
                });
            }
            if !closed {
                debug!("stream ended inside `{}`; flushing {} bytes", path, content.len());
            }
            events.push(FileEvent::Completed {
                path,
                content,
                truncated: !closed,
            });
        }
        events
    }

    /// Path of a header line, and whether only the loose grammar accepted it.
    fn header(&self, line: &str) -> Option<(String, bool)> {
        if let Some(path) = parse_header(line, &self.allowed) {
            return Some((path, false));
        }
        match self.grammar {
            Grammar::Strict => None,
            Grammar::Loose => parse_loose_header(line, &self.allowed).map(|p| (p, true)),
        }
    }

    fn on_line(&mut self, raw_line: &str, events: &mut Vec<FileEvent>) {
        let line = raw_line.trim_end_matches(['\n', '\r']);

        match std::mem::replace(&mut self.state, State::Scanning) {
            State::Scanning => {
                if let Some((path, loose)) = self.header(line) {
                    self.state = State::AwaitingFence { path, loose };
                }
            }
            State::AwaitingFence { path, loose } => {
                if fence_open(line).is_some() {
                    debug!("file block started: {}", path);
                    events.push(FileEvent::Started {
                        name: file_name(&path),
                        path: path.clone(),
                    });
                    self.state = State::Capturing {
                        path,
                        content: String::new(),
                        loose,
                    };
                } else if line.trim().is_empty() {
                    self.state = State::AwaitingFence { path, loose };
                } else {
                    // not a block after all; the line may itself be a header
                    self.on_line(raw_line, events);
                }
            }
            State::Capturing {
                path,
                mut content,
                loose,
            } => {
                if loose && parse_header(line, &self.allowed).is_some() {
                    // a bare path line over an empty fence opened this block;
                    // the real header wins and the block is dropped
                    debug!("dropping loose block {}: header inside it", path);
                    self.on_line(raw_line, events);
                } else if is_fence_close(line) {
                    debug!("file block completed: {} ({} bytes)", path, content.len());
                    events.push(FileEvent::Completed {
                        path,
                        content,
                        truncated: false,
                    });
                } else {
                    content.push_str(raw_line);
                    events.push(FileEvent::Chunk {
                        path: path.clone(),
                        text: raw_line.to_string(),
                    });
                    self.state = State::Capturing {
                        path,
                        content,
                        loose,
                    };
                }
            }
        }
    }
}

/// A file found by the reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovered {
    pub path: String,
    pub content: String,
    pub truncated: bool,
}

/// Re-run the demuxer once over the whole transcript with the loose grammar.
/// Repeated paths keep their first position and their last content; paths in
/// `captured` are dropped or kept according to `policy`.
pub fn reconcile<S: AsRef<str>>(
    raw: &str,
    allowed_extensions: &[S],
    captured: &HashSet<String>,
    policy: ReconcilePolicy,
) -> Vec<Recovered> {
    let mut demux = Demuxer::new(allowed_extensions, Grammar::Loose);
    let mut events = demux.push(raw);
    events.extend(demux.finish());

    let mut order: Vec<String> = Vec::new();
    let mut latest: HashMap<String, Recovered> = HashMap::new();
    for ev in events {
        if let FileEvent::Completed {
            path,
            content,
            truncated,
        } = ev
        {
            if !latest.contains_key(&path) {
                order.push(path.clone());
            }
            latest.insert(
                path.clone(),
                Recovered {
                    path,
                    content,
                    truncated,
                },
            );
        }
    }

    order
        .into_iter()
        .filter(|p| policy == ReconcilePolicy::Overwrite || !captured.contains(p))
        .filter_map(|p| latest.remove(&p))
        .collect()
}
