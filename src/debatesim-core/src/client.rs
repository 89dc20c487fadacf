//! Language-service clients.
//!
//! The engine consumes two abstract capabilities: free-text generation
//! and structured extraction. Both run through the [`LanguageClient`]
//! trait; extraction is a separate call on top of generation (free text
//! first, structure second, never one combined call).

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::warn;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs,
};

use crate::config::ModelSpec;
use crate::error::DebateError;

/// A capability that turns a prompt into text.
///
/// The production implementation is [`OpenAiClient`]; tests substitute a
/// scripted fake.
#[async_trait]
pub trait LanguageClient: Send + Sync {
    /// Generate free text for the given prompt under the given model spec.
    async fn generate(
        &self,
        system: Option<&str>,
        prompt: &str,
        spec: &ModelSpec,
    ) -> Result<String, DebateError>;
}

/// Client for any OpenAI-compatible chat-completions endpoint.
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
}

impl OpenAiClient {
    /// Build a client against the given API base and key.
    pub fn new(api_base: &str, api_key: &str) -> Result<Self, DebateError> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| DebateError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);

        Ok(Self {
            client: Client::with_config(config).with_http_client(http_client),
        })
    }
}

#[async_trait]
impl LanguageClient for OpenAiClient {
    async fn generate(
        &self,
        system: Option<&str>,
        prompt: &str,
        spec: &ModelSpec,
    ) -> Result<String, DebateError> {
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::new();
        if let Some(system) = system {
            messages.push(ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessage {
                    content: system.to_string().into(),
                    name: None,
                },
            ));
        }
        messages.push(ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessage {
                content: prompt.to_string().into(),
                name: None,
            },
        ));

        let request = CreateChatCompletionRequestArgs::default()
            .model(&spec.name)
            .temperature(spec.temperature)
            .max_completion_tokens(spec.max_tokens)
            .messages(messages)
            .build()?;

        // Retry with exponential backoff; only the last error surfaces.
        let max_retries = 3;
        let mut last_error = None;

        for attempt in 0..max_retries {
            if attempt > 0 {
                let delay = std::time::Duration::from_secs(1 << attempt);
                tokio::time::sleep(delay).await;
            }

            match self.client.chat().create(request.clone()).await {
                Ok(response) => {
                    let content = response
                        .choices
                        .first()
                        .and_then(|c| c.message.content.clone())
                        .unwrap_or_default();
                    return Ok(content);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "chat completion failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .map(DebateError::from)
            .unwrap_or_else(|| DebateError::Config("Unknown API error after retries".to_string())))
    }
}

const EXTRACTION_SYSTEM: &str = "You are a precise data extractor. Respond with a single JSON \
object that matches the requested fields exactly. No prose, no markdown fences, no commentary.";

/// Structured extraction over a [`LanguageClient`].
///
/// Asks for JSON, strips fences, and parses into `T`. One bounded retry
/// with reinforced instructions on malformed output.
pub async fn extract<T: DeserializeOwned>(
    client: &dyn LanguageClient,
    prompt: &str,
    spec: &ModelSpec,
) -> Result<T, DebateError> {
    let mut last_parse_error = String::new();

    for attempt in 0..2 {
        let user = if attempt == 0 {
            prompt.to_string()
        } else {
            format!(
                "{prompt}\n\nYour previous answer was not valid JSON ({last_parse_error}). \
                 Respond again with ONLY the JSON object — no surrounding text."
            )
        };

        let raw = client.generate(Some(EXTRACTION_SYSTEM), &user, spec).await?;
        let cleaned = strip_code_fences(&raw);
        match serde_json::from_str::<T>(cleaned) {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(attempt, error = %e, "structured extraction returned malformed JSON");
                last_parse_error = e.to_string();
            }
        }
    }

    Err(DebateError::Malformed(last_parse_error))
}

/// Strip markdown code fences and surrounding chatter from a JSON reply.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    // Fall back to the outermost braces if the model added prose.
    if let (Some(open), Some(close)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if open < close {
            return trimmed[open..=close].trim();
        }
    }
    trimmed
}

/// Sanitize a generated speech by stripping reasoning tokens and
/// XML-like tags some models leak into their output.
pub fn sanitize_response(response: &str) -> String {
    let tags_to_strip = [
        "thinking",
        "think",
        "reflection",
        "internal",
        "reasoning",
        "scratchpad",
        "plan",
        "analysis",
    ];

    let mut result = response.to_string();

    for tag in &tags_to_strip {
        let pattern = format!(r"(?is)<{tag}[^>]*>.*?</{tag}>", tag = tag);
        if let Ok(re) = regex::Regex::new(&pattern) {
            result = re.replace_all(&result, "").to_string();
        }
    }

    // Remove any remaining orphaned opening/closing tags.
    if let Ok(orphan_re) = regex::Regex::new(r"</?[\w]+[^>]*>") {
        result = orphan_re.replace_all(&result, "").to_string();
    }

    // Strip markdown emphasis markers; speeches are spoken text.
    result = result.replace('*', "");

    // Collapse runs of blank lines left behind by stripped blocks.
    if let Ok(blank_re) = regex::Regex::new(r"\n{3,}") {
        result = blank_re.replace_all(&result, "\n\n").to_string();
    }

    result.trim().to_string()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// A scripted client that replays canned responses in order.
    /// `Err` entries simulate a failed call.
    pub struct ScriptedClient {
        responses: Mutex<VecDeque<Result<String, String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        pub fn new<I, S>(responses: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                responses: Mutex::new(responses.into_iter().map(|s| Ok(s.into())).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn from_results(responses: Vec<Result<String, String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn remaining(&self) -> usize {
            self.responses.lock().unwrap().len()
        }

        /// Every prompt this client has been asked to answer, in order.
        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LanguageClient for ScriptedClient {
        async fn generate(
            &self,
            _system: Option<&str>,
            prompt: &str,
            _spec: &ModelSpec,
        ) -> Result<String, DebateError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.responses.lock().unwrap().pop_front() {
                Some(Ok(text)) => Ok(text),
                Some(Err(message)) => Err(DebateError::Malformed(message)),
                None => Err(DebateError::Malformed("script exhausted".to_string())),
            }
        }
    }

    /// A client whose every call fails.
    pub struct FailingClient;

    #[async_trait]
    impl LanguageClient for FailingClient {
        async fn generate(
            &self,
            _system: Option<&str>,
            _prompt: &str,
            _spec: &ModelSpec,
        ) -> Result<String, DebateError> {
            Err(DebateError::Malformed("scripted failure".to_string()))
        }
    }
}
