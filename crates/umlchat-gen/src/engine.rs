use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::ChatMessage;
use log::debug;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use umlchat_core::AiSettings;

use crate::error::GenerationError;
use crate::prompt::{GenerationRequest, Message};

/// Remote text generation: prompt in, raw text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Short label for logs, e.g. `polza/deepseek/deepseek-chat`.
    fn name(&self) -> String;

    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

// --- OpenAI-compatible chat completions over reqwest ---

pub struct ChatCompletionsGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl ChatCompletionsGenerator {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<Message>,
}

#[derive(Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ReplyMessage>,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
    text: Option<String>,
}

/// Reply text at `choices[0].message.content` (or `.text`).
pub(crate) fn extract_reply(raw: &str) -> Result<String, GenerationError> {
    let completion: Completion = serde_json::from_str(raw)
        .map_err(|e| GenerationError::Transport(format!("malformed completion: {e}")))?;

    let message = completion.choices.into_iter().next().and_then(|c| c.message);
    let text = message.and_then(|m| {
        m.content
            .filter(|c| !c.trim().is_empty())
            .or(m.text)
    });

    match text {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(GenerationError::EmptyResponse),
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsGenerator {
    fn name(&self) -> String {
        format!("{} ({})", self.endpoint, self.model)
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let body = ChatBody {
            model: &self.model,
            temperature: request.temperature,
            messages: request.messages(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let raw = response.text().await?;
        extract_reply(&raw)
    }
}

// --- Native providers via the llm crate ---

fn map_backend(provider: &str) -> Result<LLMBackend, GenerationError> {
    match provider {
        "openai" => Ok(LLMBackend::OpenAI),
        "anthropic" => Ok(LLMBackend::Anthropic),
        "google" => Ok(LLMBackend::Google),
        "ollama" => Ok(LLMBackend::Ollama),
        "groq" => Ok(LLMBackend::Groq),
        "mistral" => Ok(LLMBackend::Mistral),
        "deepseek" => Ok(LLMBackend::DeepSeek),
        other => Err(GenerationError::Configuration(format!("unknown provider: {other}"))),
    }
}

pub struct LlmGenerator {
    provider: String,
    backend: LLMBackend,
    api_key: String,
    model: String,
    base_url: Option<String>,
}

impl LlmGenerator {
    pub fn new(settings: &AiSettings) -> Result<Self, GenerationError> {
        Ok(Self {
            provider: settings.provider.clone(),
            backend: map_backend(&settings.provider)?,
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            base_url: settings.base_url.clone().filter(|u| !u.trim().is_empty()),
        })
    }
}

#[async_trait]
impl TextGenerator for LlmGenerator {
    fn name(&self) -> String {
        format!("{} ({})", self.provider, self.model)
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let mut builder = LLMBuilder::new()
            .backend(self.backend.clone())
            .model(&self.model)
            .system(request.system_prompt())
            .temperature(request.temperature);

        if !self.api_key.is_empty() {
            builder = builder.api_key(&self.api_key);
        }
        if let Some(url) = &self.base_url {
            builder = builder.base_url(url);
        }

        let llm = builder
            .build()
            .map_err(|e| GenerationError::Configuration(format!("build LLM: {e}")))?;

        let messages = vec![ChatMessage::user().content(request.user_message()).build()];

        let response = llm
            .chat(&messages)
            .await
            .map_err(|e| GenerationError::Transport(format!("chat: {e}")))?;

        match response.text() {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(GenerationError::EmptyResponse),
        }
    }
}

/// Stand-in used when no provider is configured. Every call fails with the
/// configuration problem, so a host can still open chats and edit sources.
pub struct UnconfiguredGenerator {
    reason: String,
}

impl UnconfiguredGenerator {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl TextGenerator for UnconfiguredGenerator {
    fn name(&self) -> String {
        "unconfigured".into()
    }

    async fn complete(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
        Err(GenerationError::Configuration(self.reason.clone()))
    }
}

/// Providers served by the OpenAI-compatible client instead of the llm crate.
const CHAT_COMPLETIONS_PROVIDERS: &[&str] = &["polza", "openai-compatible"];

/// Pick a generator for the configured provider.
pub fn generator_from_settings(settings: &AiSettings) -> Result<Arc<dyn TextGenerator>, GenerationError> {
    if !umlchat_core::ai_configured(settings) {
        return Err(GenerationError::Configuration(format!(
            "no API key for provider '{}'; set apiKey in settings.json or one of {}",
            settings.provider,
            umlchat_core::API_KEY_ENV.join(", ")
        )));
    }

    if CHAT_COMPLETIONS_PROVIDERS.contains(&settings.provider.as_str()) {
        Ok(Arc::new(ChatCompletionsGenerator::new(
            &settings.endpoint_base(),
            &settings.api_key,
            &settings.model,
        )))
    } else {
        Ok(Arc::new(LlmGenerator::new(settings)?))
    }
}

/// Run one completion under a cancellation token and an optional time limit.
///
/// A call whose token is cancelled reports `Cancelled`, even when the
/// response arrived before the cancellation was noticed.
pub async fn call(
    generator: &dyn TextGenerator,
    request: &GenerationRequest,
    token: &CancellationToken,
    timeout: Option<Duration>,
) -> Result<String, GenerationError> {
    if token.is_cancelled() {
        return Err(GenerationError::Cancelled);
    }

    let completion = async {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, generator.complete(request))
                .await
                .unwrap_or(Err(GenerationError::Timeout(limit))),
            None => generator.complete(request).await,
        }
    };

    let result = tokio::select! {
        biased;
        _ = token.cancelled() => Err(GenerationError::Cancelled),
        result = completion => result,
    };

    if token.is_cancelled() {
        debug!(generator = generator.name(); "discarding result of cancelled call");
        return Err(GenerationError::Cancelled);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::title_request;

    struct Slow(Duration, &'static str);

    #[async_trait]
    impl TextGenerator for Slow {
        fn name(&self) -> String {
            "slow".into()
        }

        async fn complete(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
            tokio::time::sleep(self.0).await;
            Ok(self.1.to_string())
        }
    }

    #[test]
    fn reply_from_content() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"graph TD\nA --> B"}}]}"#;
        assert_eq!(extract_reply(raw).unwrap(), "graph TD\nA --> B");
    }

    #[test]
    fn reply_falls_back_to_text_field() {
        let raw = r#"{"choices":[{"message":{"content":null,"text":"pie"}}]}"#;
        assert_eq!(extract_reply(raw).unwrap(), "pie");
    }

    #[test]
    fn empty_or_missing_reply_is_empty_response() {
        for raw in [
            r#"{"choices":[]}"#,
            r#"{"choices":[{"message":{"content":"   "}}]}"#,
            r#"{"id":"x"}"#,
        ] {
            assert!(matches!(extract_reply(raw), Err(GenerationError::EmptyResponse)), "{raw}");
        }
    }

    #[test]
    fn malformed_json_is_transport_error() {
        assert!(matches!(extract_reply("<html>502</html>"), Err(GenerationError::Transport(_))));
    }

    #[test]
    fn endpoint_is_joined_once() {
        let g = ChatCompletionsGenerator::new("https://api.polza.ai/api/v1/", "k", "m");
        assert_eq!(g.endpoint(), "https://api.polza.ai/api/v1/chat/completions");
    }

    #[test]
    fn missing_key_is_configuration_error() {
        let settings = umlchat_core::apply_overrides(AiSettings::default(), |_| None);
        let err = generator_from_settings(&settings).err().unwrap();
        assert!(matches!(err, GenerationError::Configuration(_)));
    }

    #[test]
    fn unknown_provider_is_configuration_error() {
        let settings = AiSettings {
            provider: "carrier-pigeon".into(),
            api_key: "k".into(),
            model: "m".into(),
            ..Default::default()
        };
        assert!(matches!(
            generator_from_settings(&settings).err().unwrap(),
            GenerationError::Configuration(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_beats_slow_response() {
        let generator = Slow(Duration::from_secs(30), "graph TD");
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });
        let result = call(&generator, &title_request("x"), &token, None).await;
        assert!(matches!(result, Err(GenerationError::Cancelled)));
    }

    #[tokio::test]
    async fn pre_cancelled_token_never_calls() {
        let generator = Slow(Duration::from_millis(0), "graph TD");
        let token = CancellationToken::new();
        token.cancel();
        let result = call(&generator, &title_request("x"), &token, None).await;
        assert!(matches!(result, Err(GenerationError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_a_generation_failure() {
        let generator = Slow(Duration::from_secs(120), "graph TD");
        let token = CancellationToken::new();
        let result = call(&generator, &title_request("x"), &token, Some(Duration::from_secs(5))).await;
        assert!(matches!(result, Err(GenerationError::Timeout(_))));
    }

    #[tokio::test]
    async fn unconfigured_generator_reports_its_reason() {
        let generator = UnconfiguredGenerator::new("no API key");
        let token = CancellationToken::new();
        match call(&generator, &title_request("x"), &token, None).await {
            Err(GenerationError::Configuration(reason)) => assert_eq!(reason, "no API key"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn completes_without_limits() {
        let generator = Slow(Duration::from_millis(1), "graph TD");
        let token = CancellationToken::new();
        let result = call(&generator, &title_request("x"), &token, None).await;
        assert_eq!(result.unwrap(), "graph TD");
    }
}
