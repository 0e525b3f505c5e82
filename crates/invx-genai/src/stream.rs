//! Lazy sequence of text fragments produced by a streaming generation call.

use tracing::trace;

use crate::error::GenAiError;
use crate::Result;

/// Progress of a [`TextStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// More fragments may follow.
    Streaming,
    /// The source reported its end; every fragment has been yielded.
    Drained,
    /// The consumer gave up before the end; remaining fragments are discarded.
    Cancelled,
}

type ChunkSource = Box<dyn Iterator<Item = Result<String>> + Send>;

/// Streamed model output.
///
/// Fragments are only meaningful once fully assembled, so callers normally
/// use [`TextStream::collect_text`], which folds the whole sequence and
/// fails unless the stream reaches the drained state.
pub struct TextStream {
    source: ChunkSource,
    state: StreamState,
    fragments: usize,
}

impl TextStream {
    /// Wrap an arbitrary fragment source.
    pub fn new<I>(source: I) -> Self
    where
        I: Iterator<Item = Result<String>> + Send + 'static,
    {
        Self {
            source: Box::new(source),
            state: StreamState::Streaming,
            fragments: 0,
        }
    }

    /// A stream over already-known fragments.
    pub fn from_chunks<S: Into<String>>(chunks: Vec<S>) -> Self {
        let chunks: Vec<String> = chunks.into_iter().map(Into::into).collect();
        Self::new(chunks.into_iter().map(Ok))
    }

    /// Current state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Whether every fragment has been yielded.
    pub fn is_drained(&self) -> bool {
        self.state == StreamState::Drained
    }

    /// Number of fragments yielded so far.
    pub fn fragments(&self) -> usize {
        self.fragments
    }

    /// Stop consuming; the rest of the stream is dropped.
    pub fn cancel(&mut self) {
        if self.state == StreamState::Streaming {
            self.state = StreamState::Cancelled;
            self.source = Box::new(std::iter::empty());
        }
    }

    /// Concatenate all fragments.
    pub fn collect_text(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(chunk) = self.next() {
            text.push_str(&chunk?);
        }

        match self.state {
            StreamState::Drained => {
                trace!("Stream drained after {} fragments", self.fragments);
                Ok(text)
            }
            _ => Err(GenAiError::Stream(
                "stream was cancelled before it was drained".to_string(),
            )),
        }
    }
}

impl Iterator for TextStream {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state != StreamState::Streaming {
            return None;
        }

        match self.source.next() {
            Some(Ok(chunk)) => {
                self.fragments += 1;
                Some(Ok(chunk))
            }
            Some(Err(e)) => {
                self.cancel();
                Some(Err(e))
            }
            None => {
                self.state = StreamState::Drained;
                None
            }
        }
    }
}

impl std::fmt::Debug for TextStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextStream")
            .field("state", &self.state)
            .field("fragments", &self.fragments)
            .finish()
    }
}
