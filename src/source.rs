//! Where model output comes from.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use crate::error::SourceError;
use crate::prompt::Prompt;

pub type DeltaStream = BoxStream<'static, Result<String, SourceError>>;

/// A streaming completion endpoint. Deltas arrive in order; the stream ends
/// when the model is done. An `Err` item aborts the run.
#[async_trait]
pub trait CompletionSource: Send + Sync {
    async fn stream(&self, prompt: &Prompt) -> Result<DeltaStream, SourceError>;
}

/// Replays a recorded transcript in fixed-size chunks. A chunk size of 0
/// delivers the whole transcript at once.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    transcript: String,
    chunk_chars: usize,
    /// Inject a stream error after this many chunks.
    fail_after: Option<usize>,
}

impl ReplaySource {
    pub fn new(transcript: impl Into<String>, chunk_chars: usize) -> Self {
        Self {
            transcript: transcript.into(),
            chunk_chars,
            fail_after: None,
        }
    }

    pub fn failing_after(mut self, chunks: usize) -> Self {
        self.fail_after = Some(chunks);
        self
    }

    pub fn chunks(&self) -> Vec<String> {
        if self.chunk_chars == 0 {
            return vec![self.transcript.clone()];
        }
        let chars: Vec<char> = self.transcript.chars().collect();
        chars
            .chunks(self.chunk_chars)
            .map(|c| c.iter().collect())
            .collect()
    }
}

#[async_trait]
impl CompletionSource for ReplaySource {
    async fn stream(&self, _prompt: &Prompt) -> Result<DeltaStream, SourceError> {
        let mut items: Vec<Result<String, SourceError>> = self.chunks().into_iter().map(Ok).collect();
        if let Some(n) = self.fail_after {
            items.truncate(n);
            items.push(Err(SourceError::Stream(format!("replay cut off after {n} chunk(s)"))));
        }
        Ok(stream::iter(items).boxed())
    }
}

/// Yields its chunks with a delay between each, for timeout handling.
#[derive(Debug, Clone)]
pub struct ThrottledSource {
    inner: ReplaySource,
    delay: std::time::Duration,
}

impl ThrottledSource {
    pub fn new(inner: ReplaySource, delay: std::time::Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl CompletionSource for ThrottledSource {
    async fn stream(&self, _prompt: &Prompt) -> Result<DeltaStream, SourceError> {
        let delay = self.delay;
        let s = stream::iter(self.inner.chunks()).then(move |c| async move {
            tokio::time::sleep(delay).await;
            Ok::<_, SourceError>(c)
        });
        Ok(s.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn prompt() -> Prompt {
        Prompt {
            system: String::new(),
            user: "x".into(),
        }
    }

    #[tokio::test]
    async fn replay_reassembles() {
        let src = ReplaySource::new("héllo world", 3);
        let parts: Vec<String> = src.stream(&prompt()).await.unwrap().try_collect().await.unwrap();
        assert_eq!(parts, vec!["hél", "lo ", "wor", "ld"]);
        assert_eq!(ReplaySource::new("abc", 0).chunks(), vec!["abc"]);
    }

    #[tokio::test]
    async fn replay_can_fail() {
        let src = ReplaySource::new("abcdef", 2).failing_after(1);
        let items: Vec<_> = src.stream(&prompt()).await.unwrap().collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok("ab".to_string()));
        assert!(matches!(items[1], Err(SourceError::Stream(_))));
    }
}
