//! Scripted runtime for tests
//!
//! Responses, failures and stream payloads are queued up front and handed
//! out in order; every request is recorded for later assertions.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::{LocalLmError, Result};
use crate::schema::CompiledSchema;
use crate::stream::StreamSink;

use super::{Availability, GenerationRequest, ModelRuntime};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory [`ModelRuntime`] driven by a script
pub struct MockRuntime {
    availability: Mutex<Availability>,
    languages: Vec<String>,
    responses: Mutex<VecDeque<std::result::Result<String, String>>>,
    streams: Mutex<VecDeque<Vec<Option<String>>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    schemas: Mutex<Vec<CompiledSchema>>,
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRuntime {
    /// Available, English only, nothing scripted
    pub fn new() -> Self {
        Self {
            availability: Mutex::new(Availability::ready()),
            languages: vec!["English".to_string()],
            responses: Mutex::new(VecDeque::new()),
            streams: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            schemas: Mutex::new(Vec::new()),
        }
    }

    pub fn with_availability(self, availability: Availability) -> Self {
        *lock(&self.availability) = availability;
        self
    }

    pub fn with_languages(mut self, languages: &[&str]) -> Self {
        self.languages = languages.iter().map(|l| l.to_string()).collect();
        self
    }

    /// Queue a successful response for `generate` / `generate_structured`
    pub fn with_response(self, text: impl Into<String>) -> Self {
        lock(&self.responses).push_back(Ok(text.into()));
        self
    }

    /// Queue a generation failure
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        lock(&self.responses).push_back(Err(message.into()));
        self
    }

    /// Queue the raw payloads one `stream` call will deliver
    pub fn with_stream(self, payloads: &[Option<&str>]) -> Self {
        let script = payloads.iter().map(|p| p.map(str::to_string)).collect();
        lock(&self.streams).push_back(script);
        self
    }

    pub fn set_availability(&self, availability: Availability) {
        *lock(&self.availability) = availability;
    }

    /// Requests received so far, in order
    pub fn requests(&self) -> Vec<GenerationRequest> {
        lock(&self.requests).clone()
    }

    /// Schemas passed to `generate_structured`, in order
    pub fn schemas(&self) -> Vec<CompiledSchema> {
        lock(&self.schemas).clone()
    }

    fn next_response(&self, request: &GenerationRequest) -> Result<String> {
        lock(&self.requests).push(request.clone());
        match lock(&self.responses).pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(LocalLmError::Generation(message)),
            None => Err(LocalLmError::Generation("no scripted response".to_string())),
        }
    }
}

#[async_trait]
impl ModelRuntime for MockRuntime {
    async fn check_availability(&self) -> Availability {
        lock(&self.availability).clone()
    }

    async fn supported_languages(&self) -> Result<Vec<String>> {
        Ok(self.languages.clone())
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.next_response(request)
    }

    async fn generate_structured(&self, request: &GenerationRequest, schema: &CompiledSchema) -> Result<String> {
        lock(&self.schemas).push(schema.clone());
        self.next_response(request)
    }

    async fn stream(&self, request: GenerationRequest, sink: &StreamSink) -> Result<()> {
        lock(&self.requests).push(request);
        let script = lock(&self.streams)
            .pop_front()
            .ok_or_else(|| LocalLmError::Generation("no scripted stream".to_string()))?;

        for payload in script {
            if sink.is_cancelled() {
                break;
            }
            sink.deliver(payload.as_deref());
            tokio::task::yield_now().await;
        }
        Ok(())
    }
}
