//! In-memory backend for unit tests.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use invx_genai::{
    Content, DocumentHandle, DocumentState, GenAiError, GenerativeBackend, Part, TextStream,
};
use parking_lot::Mutex;

/// Backend with scripted replies and document states that records every call.
pub(crate) struct ScriptedBackend {
    replies: Mutex<VecDeque<Vec<String>>>,
    states: Mutex<HashMap<String, VecDeque<DocumentState>>>,
    fail_generation: bool,
    pub registered: Mutex<Vec<DocumentHandle>>,
    pub requests: Mutex<Vec<Vec<Content>>>,
    pub call_times: Mutex<Vec<Instant>>,
    pub state_queries: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            states: Mutex::new(HashMap::new()),
            fail_generation: false,
            registered: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            call_times: Mutex::new(Vec::new()),
            state_queries: Mutex::new(Vec::new()),
        }
    }

    /// Queue a reply streamed as the given fragments.
    pub fn with_chunks(self, chunks: &[&str]) -> Self {
        self.replies
            .lock()
            .push_back(chunks.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Queue a reply streamed as a single fragment.
    pub fn with_reply(self, reply: &str) -> Self {
        self.with_chunks(&[reply])
    }

    /// States reported for a document, by display name; the last one repeats.
    pub fn with_states(self, display_name: &str, states: &[DocumentState]) -> Self {
        self.states
            .lock()
            .insert(display_name.to_string(), states.iter().copied().collect());
        self
    }

    /// Every generation call fails with an API error.
    pub fn failing(mut self) -> Self {
        self.fail_generation = true;
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Text parts of the last turn of the most recent request.
    pub fn last_prompt_text(&self) -> String {
        self.requests
            .lock()
            .last()
            .and_then(|contents| contents.last())
            .map(|turn| turn.parts.iter().filter_map(Part::as_text).collect::<String>())
            .unwrap_or_default()
    }
}

impl GenerativeBackend for ScriptedBackend {
    fn register_document(
        &self,
        _bytes: &[u8],
        mime_type: &str,
        display_name: &str,
    ) -> invx_genai::Result<DocumentHandle> {
        let mut registered = self.registered.lock();
        let handle = DocumentHandle {
            name: format!("files/{}", registered.len()),
            uri: format!("https://mock.test/files/{}", display_name),
            display_name: display_name.to_string(),
            mime_type: mime_type.to_string(),
        };
        registered.push(handle.clone());
        Ok(handle)
    }

    fn document_state(&self, handle: &DocumentHandle) -> invx_genai::Result<DocumentState> {
        self.state_queries.lock().push(handle.display_name.clone());

        let mut states = self.states.lock();
        let state = match states.get_mut(&handle.display_name) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().copied(),
            None => None,
        };
        Ok(state.unwrap_or(DocumentState::Active))
    }

    fn stream_generate(&self, contents: &[Content]) -> invx_genai::Result<TextStream> {
        self.call_times.lock().push(Instant::now());
        self.requests.lock().push(contents.to_vec());

        if self.fail_generation {
            return Err(GenAiError::Api {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }

        let chunks = self
            .replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| vec!["{}".to_string()]);
        Ok(TextStream::from_chunks(chunks))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
