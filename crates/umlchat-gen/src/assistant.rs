use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use umlchat_core::AiSettings;

use crate::classify::classify;
use crate::engine::{self, TextGenerator};
use crate::error::GenerationError;
use crate::guidance::GuidanceLibrary;
use crate::prompt::{self, Composer, GenerationRequest};
use crate::sanitize::sanitize;

const TITLE_MAX_CHARS: usize = 50;
const TITLE_FALLBACK_CHARS: usize = 30;
const QUOTES: &[char] = &['"', '\''];

/// Generation, repair and title calls against one text generator.
///
/// Holds no per-conversation state, so one instance can serve every session.
pub struct DiagramAssistant {
    generator: Arc<dyn TextGenerator>,
    composer: Composer,
    timeout: Option<Duration>,
}

impl DiagramAssistant {
    pub fn new(generator: Arc<dyn TextGenerator>, library: Arc<GuidanceLibrary>) -> Self {
        Self {
            generator,
            composer: Composer::new(library),
            timeout: None,
        }
    }

    /// Generator picked from settings, standard guidance, configured timeout.
    pub fn from_settings(settings: &AiSettings) -> Result<Self, GenerationError> {
        let generator = engine::generator_from_settings(settings)?;
        Ok(Self::new(generator, Arc::new(GuidanceLibrary::standard()))
            .with_timeout(settings.timeout_secs.map(Duration::from_secs)))
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    /// New or updated diagram source for a chat message.
    pub async fn generate(
        &self,
        user_instruction: &str,
        existing_source: Option<&str>,
        token: &CancellationToken,
    ) -> Result<String, GenerationError> {
        let category = classify(self.composer.library(), user_instruction, existing_source);
        let request = self.composer.compose(user_instruction, existing_source);
        info!(
            generator = self.generator.name(),
            category = category.as_str(),
            guided = request.guidance.is_some(),
            update = request.existing_source.is_some();
            "sending generation request"
        );
        self.run_for_source("generate", &request, token).await
    }

    /// Syntax-corrected version of a source the renderer rejected.
    pub async fn repair(
        &self,
        invalid_source: &str,
        token: &CancellationToken,
    ) -> Result<String, GenerationError> {
        info!(generator = self.generator.name(), chars = invalid_source.len(); "sending repair request");
        let request = prompt::repair_request(invalid_source);
        self.run_for_source("repair", &request, token).await
    }

    /// Short conversation title from its first message.
    pub async fn title_for(
        &self,
        first_message: &str,
        token: &CancellationToken,
    ) -> Result<String, GenerationError> {
        let request = prompt::title_request(first_message);
        let raw = engine::call(self.generator.as_ref(), &request, token, self.timeout).await?;
        let title = clean_title(&raw);
        if title.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        debug!(title = title.as_str(); "generated chat title");
        Ok(title)
    }

    async fn run_for_source(
        &self,
        op: &'static str,
        request: &GenerationRequest,
        token: &CancellationToken,
    ) -> Result<String, GenerationError> {
        let raw = engine::call(self.generator.as_ref(), request, token, self.timeout).await?;
        debug!(op, raw_chars = raw.len(); "raw model output received");

        let source = sanitize(&raw);
        if source.is_empty() {
            warn!(op; "model output was empty after sanitizing");
            return Err(GenerationError::EmptyResponse);
        }
        Ok(source)
    }
}

/// Trimmed, unquoted, capped at 50 characters.
fn clean_title(raw: &str) -> String {
    let title = raw.trim();
    let title = title.strip_prefix(QUOTES).unwrap_or(title);
    let title = title.strip_suffix(QUOTES).unwrap_or(title);
    title.trim().chars().take(TITLE_MAX_CHARS).collect()
}

/// Title used when generation fails: the start of the message itself.
pub fn fallback_title(first_message: &str) -> String {
    let message = first_message.trim();
    if message.chars().count() > TITLE_FALLBACK_CHARS {
        let head: String = message.chars().take(TITLE_FALLBACK_CHARS).collect();
        format!("{head}...")
    } else {
        message.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_lose_quotes_and_length() {
        assert_eq!(clean_title("  \"Регистрация пользователя\"\n"), "Регистрация пользователя");
        assert_eq!(clean_title("'Shop'"), "Shop");
        assert_eq!(clean_title(&"x".repeat(80)).chars().count(), TITLE_MAX_CHARS);
        assert_eq!(clean_title("\"\""), "");
    }

    #[test]
    fn fallback_truncates_on_characters() {
        assert_eq!(fallback_title("short one"), "short one");
        let long = "Диаграмма последовательности для оформления заказа";
        let title = fallback_title(long);
        assert!(title.ends_with("..."));
        assert_eq!(title.chars().count(), TITLE_FALLBACK_CHARS + 3);
    }

    #[test]
    fn zero_timeout_means_none() {
        struct Never;
        #[async_trait::async_trait]
        impl TextGenerator for Never {
            fn name(&self) -> String {
                "never".into()
            }
            async fn complete(&self, _r: &GenerationRequest) -> Result<String, GenerationError> {
                Err(GenerationError::EmptyResponse)
            }
        }
        let assistant = DiagramAssistant::new(Arc::new(Never), Arc::new(GuidanceLibrary::standard()))
            .with_timeout(Some(Duration::ZERO));
        assert_eq!(assistant.timeout, None);
    }
}
