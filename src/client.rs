//! Caller-facing client
//!
//! [`LocalModel`] puts the schema compiler, stream bridge, tool extractor and
//! transcript conversion in front of a [`ModelRuntime`].

use std::sync::{Arc, PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::Config;
use crate::error::{LocalLmError, Result};
use crate::runtime::{Availability, GenerationOptions, GenerationRequest, ModelRuntime};
use crate::schema;
use crate::stream::{self, TextStream};
use crate::tools::{ToolCatalog, ToolResponse, extract_tool_calls, render_tool_instructions};
use crate::transcript::{self, ChatMessage, TranscriptEntry};

/// Output of a structured generation call
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredResponse {
    /// JSON text exactly as the runtime produced it
    pub text: String,
    pub object: Value,
}

impl StructuredResponse {
    /// Deserialize the object into a caller type
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.object.clone())
            .map_err(|e| LocalLmError::Encoding(format!("structured output does not match the requested type: {}", e)))
    }
}

/// Client for a locally hosted model
pub struct LocalModel {
    runtime: Arc<dyn ModelRuntime>,
    config: Config,
}

impl std::fmt::Debug for LocalModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalModel").field("config", &self.config).finish()
    }
}

impl LocalModel {
    pub fn new(runtime: Arc<dyn ModelRuntime>, config: Config) -> Self {
        Self { runtime, config }
    }

    /// Client with default configuration
    pub fn with_runtime(runtime: impl ModelRuntime + 'static) -> Self {
        Self::new(Arc::new(runtime), Config::default())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn check_availability(&self) -> Availability {
        self.runtime.check_availability().await
    }

    pub async fn supported_languages(&self) -> Result<Vec<String>> {
        self.runtime.supported_languages().await
    }

    /// One-shot generation from a bare prompt
    pub async fn generate(&self, prompt: &str, options: GenerationOptions) -> Result<String> {
        let request = self.request(Vec::new(), prompt.to_string(), options).await?;
        tracing::debug!(prompt_len = prompt.len(), "Generating response");
        self.runtime.generate(&request).await
    }

    /// Generate the next turn of a conversation
    pub async fn generate_with_history(&self, messages: &[ChatMessage], options: GenerationOptions) -> Result<String> {
        let conversation = transcript::convert(messages)?;
        let request = self.request(conversation.history, conversation.prompt, options).await?;
        tracing::debug!(history = request.history.len(), "Generating response with history");
        self.runtime.generate(&request).await
    }

    /// Like [`generate_with_history`](Self::generate_with_history) with the
    /// messages given as a JSON array
    pub async fn generate_messages_json(&self, messages_json: &str, options: GenerationOptions) -> Result<String> {
        let messages = transcript::parse_messages(messages_json)?;
        self.generate_with_history(&messages, options).await
    }

    /// Stream a response to a bare prompt
    pub async fn stream(&self, prompt: &str, options: GenerationOptions) -> Result<TextStream> {
        let request = self.request(Vec::new(), prompt.to_string(), options).await?;
        Ok(self.spawn_stream(request))
    }

    /// Stream the next turn of a conversation
    pub async fn stream_with_history(&self, messages: &[ChatMessage], options: GenerationOptions) -> Result<TextStream> {
        let conversation = transcript::convert(messages)?;
        let request = self.request(conversation.history, conversation.prompt, options).await?;
        Ok(self.spawn_stream(request))
    }

    /// Generate JSON conforming to `schema`
    pub async fn generate_structured(
        &self,
        prompt: &str,
        schema: &Value,
        options: GenerationOptions,
    ) -> Result<StructuredResponse> {
        let compiled = schema::compile(schema)?;
        let request = self.request(Vec::new(), prompt.to_string(), options).await?;

        tracing::debug!(dependencies = compiled.dependencies.len(), "Generating structured response");
        let text = self.runtime.generate_structured(&request, &compiled).await?;
        let object = serde_json::from_str(&text)
            .map_err(|e| LocalLmError::Encoding(format!("structured output is not valid JSON: {}", e)))?;

        Ok(StructuredResponse { text, object })
    }

    /// Generate with tools on offer and split out any tool calls
    pub async fn generate_with_tools(
        &self,
        messages: &[ChatMessage],
        catalog: &ToolCatalog,
        options: GenerationOptions,
    ) -> Result<ToolResponse> {
        let request = self.tool_request(messages, catalog, options).await?;
        let text = self.runtime.generate(&request).await?;

        let response = extract_tool_calls(&text, catalog);
        tracing::debug!(tool_calls = response.tool_calls.len(), "Generated response with tools");
        Ok(response)
    }

    /// Stream with tools on offer; tool calls are extracted when the stream
    /// is finished
    pub async fn stream_with_tools(
        &self,
        messages: &[ChatMessage],
        catalog: &ToolCatalog,
        options: GenerationOptions,
    ) -> Result<ToolStream> {
        let request = self.tool_request(messages, catalog, options).await?;
        Ok(ToolStream {
            inner: self.spawn_stream(request),
            catalog: catalog.clone(),
            text: String::new(),
        })
    }

    async fn tool_request(
        &self,
        messages: &[ChatMessage],
        catalog: &ToolCatalog,
        options: GenerationOptions,
    ) -> Result<GenerationRequest> {
        let conversation = transcript::convert(messages)?;
        let mut history = conversation.history;

        if let Some(instructions) = render_tool_instructions(catalog) {
            // The runtime takes a single instructions block, at the start
            match history.first_mut() {
                Some(TranscriptEntry::Instructions(existing)) => {
                    existing.push_str("\n\n");
                    existing.push_str(&instructions);
                }
                _ => history.insert(0, TranscriptEntry::Instructions(instructions)),
            }
        }

        self.request(history, conversation.prompt, options).await
    }

    /// Merge options with config defaults, validate, and check availability
    async fn request(
        &self,
        history: Vec<TranscriptEntry>,
        prompt: String,
        options: GenerationOptions,
    ) -> Result<GenerationRequest> {
        let options = options.or(self.config.generation.options());
        options.validate()?;

        if self.config.availability.check_before_generate {
            let availability = self.runtime.check_availability().await;
            if !availability.available {
                tracing::warn!(reason = ?availability.reason, "Model unavailable");
            }
            availability.into_result()?;
        }

        Ok(GenerationRequest {
            history,
            prompt,
            options,
        })
    }

    fn spawn_stream(&self, request: GenerationRequest) -> TextStream {
        let (sink, text_stream) = stream::channel();
        let runtime = Arc::clone(&self.runtime);

        tokio::spawn(async move {
            match runtime.stream(request, &sink).await {
                Ok(()) => sink.finish(),
                Err(e) => {
                    tracing::warn!(error = %e, "Stream generation failed");
                    sink.fail(&failure_message(&e));
                }
            }
        });

        text_stream
    }
}

/// Message for an in-band stream error, without double-wrapping
fn failure_message(error: &LocalLmError) -> String {
    match error {
        LocalLmError::Generation(message) => message.clone(),
        other => other.to_string(),
    }
}

/// A text stream whose output is scanned for tool calls once it ends
#[derive(Debug)]
pub struct ToolStream {
    inner: TextStream,
    catalog: ToolCatalog,
    text: String,
}

impl ToolStream {
    /// Next piece of text, `None` at end of stream
    pub async fn next_delta(&mut self) -> Result<Option<String>> {
        let delta = self.inner.next_delta().await?;
        if let Some(text) = &delta {
            self.text.push_str(text);
        }
        Ok(delta)
    }

    /// Text received so far
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Drain whatever is left and extract tool calls from the whole text
    pub async fn finish(mut self) -> Result<ToolResponse> {
        while self.next_delta().await?.is_some() {}
        Ok(extract_tool_calls(&self.text, &self.catalog))
    }
}

/// The default client, built on first use and replaceable.
///
/// Hold one of these wherever a shared default is wanted; tests build their
/// own [`LocalModel`] instead.
pub struct DefaultProvider {
    factory: Box<dyn Fn() -> LocalModel + Send + Sync>,
    instance: RwLock<Option<Arc<LocalModel>>>,
}

impl DefaultProvider {
    pub fn new(factory: impl Fn() -> LocalModel + Send + Sync + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            instance: RwLock::new(None),
        }
    }

    /// The current default, constructing it if needed
    pub fn get(&self) -> Arc<LocalModel> {
        if let Some(model) = self.instance.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            return Arc::clone(model);
        }

        let mut slot = self.instance.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slot.get_or_insert_with(|| Arc::new((self.factory)())))
    }

    /// Replace the default
    pub fn set(&self, model: LocalModel) {
        *self.instance.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(model));
    }

    /// Drop the current default; the next `get` rebuilds it
    pub fn reset(&self) {
        *self.instance.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
