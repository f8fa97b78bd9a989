use std::sync::Arc;

use serde::Serialize;

use umlchat_core::rules;

use crate::guidance::GuidanceLibrary;

/// Near zero: the same request should give the same diagram.
pub const GENERATE_TEMPERATURE: f32 = 0.2;
pub const REPAIR_TEMPERATURE: f32 = 0.1;
pub const TITLE_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

/// One entry of the chat message list sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Everything needed for one call to the model. Built fresh per call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system_policy: String,
    pub guidance: Option<String>,
    pub user_instruction: String,
    /// Non-blank current source when iterating on a diagram.
    pub existing_source: Option<String>,
    pub temperature: f32,
}

impl GenerationRequest {
    /// The trailing user message: the bare instruction, or the update template
    /// when there is an existing source.
    pub fn user_message(&self) -> String {
        match &self.existing_source {
            Some(existing) => wrap_update(existing, &self.user_instruction),
            None => self.user_instruction.clone(),
        }
    }

    /// Policy, then guidance, then the user message.
    pub fn messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(3);
        messages.push(Message::system(self.system_policy.as_str()));
        if let Some(guidance) = &self.guidance {
            messages.push(Message::system(guidance.as_str()));
        }
        messages.push(Message::user(self.user_message()));
        messages
    }

    /// Policy and guidance joined, for backends that take a single system prompt.
    pub fn system_prompt(&self) -> String {
        match &self.guidance {
            Some(guidance) => format!("{}\n\n{}", self.system_policy, guidance),
            None => self.system_policy.clone(),
        }
    }
}

/// Builds generation requests around an injected guidance library.
#[derive(Debug, Clone)]
pub struct Composer {
    library: Arc<GuidanceLibrary>,
}

impl Composer {
    pub fn new(library: Arc<GuidanceLibrary>) -> Self {
        Self { library }
    }

    pub fn library(&self) -> &GuidanceLibrary {
        &self.library
    }

    pub fn compose(&self, user_instruction: &str, existing_source: Option<&str>) -> GenerationRequest {
        let existing_source = existing_source.filter(|s| !s.trim().is_empty());
        GenerationRequest {
            system_policy: rules::SYSTEM_POLICY.to_string(),
            guidance: self.library.build_guidance(user_instruction, existing_source),
            user_instruction: user_instruction.to_string(),
            existing_source: existing_source.map(str::to_string),
            temperature: GENERATE_TEMPERATURE,
        }
    }
}

/// Existing source, requested change and an explicit "return everything" line.
pub fn wrap_update(existing_source: &str, user_instruction: &str) -> String {
    format!(
        "=== EXISTING MERMAID CODE ===\n\
{existing_source}\n\
=============================\n\
\n\
=== USER REQUEST ===\n\
{user_instruction}\n\
====================\n\
\n\
INSTRUCTION: Update the existing code above based on the user request. \
Return the full updated code."
    )
}

/// Narrow request that only asks for a syntax fix. No classification involved.
pub fn repair_request(invalid_source: &str) -> GenerationRequest {
    GenerationRequest {
        system_policy: rules::REPAIR_POLICY.to_string(),
        guidance: None,
        user_instruction: format!("Fix this Mermaid code:\n\n{invalid_source}"),
        existing_source: None,
        temperature: REPAIR_TEMPERATURE,
    }
}

pub fn title_request(first_message: &str) -> GenerationRequest {
    GenerationRequest {
        system_policy: rules::TITLE_POLICY.to_string(),
        guidance: None,
        user_instruction: first_message.to_string(),
        existing_source: None,
        temperature: TITLE_TEMPERATURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composer() -> Composer {
        Composer::new(Arc::new(GuidanceLibrary::standard()))
    }

    #[test]
    fn fresh_request_is_sent_bare() {
        let req = composer().compose("sequence diagram of a login", None);
        assert_eq!(req.user_message(), "sequence diagram of a login");
        assert_eq!(req.system_policy, rules::SYSTEM_POLICY);
        assert!(req.guidance.as_deref().unwrap().contains("DIAGRAM TYPE: Sequence"));
        assert_eq!(req.temperature, GENERATE_TEMPERATURE);
    }

    #[test]
    fn existing_source_is_wrapped_into_sections() {
        let source = "classDiagram\n  class Shop";
        let req = composer().compose("add an Order class", Some(source));
        let msg = req.user_message();

        let code_at = msg.find("=== EXISTING MERMAID CODE ===").unwrap();
        let request_at = msg.find("=== USER REQUEST ===").unwrap();
        assert!(code_at < request_at);
        assert!(msg[code_at..request_at].contains(source));
        assert!(msg[request_at..].contains("add an Order class"));
        assert!(msg.contains("Return the full updated code."));
    }

    #[test]
    fn blank_existing_source_counts_as_absent() {
        let req = composer().compose("draw a state machine", Some("  \n"));
        assert_eq!(req.existing_source, None);
        assert_eq!(req.user_message(), "draw a state machine");
    }

    #[test]
    fn messages_order_policy_guidance_user() {
        let req = composer().compose("ER diagram for a blog", None);
        let messages = req.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, MessageRole::System);
        assert_eq!(messages[1].role, MessageRole::System);
        assert!(messages[1].content.contains("erDiagram"));
        assert_eq!(messages[2].role, MessageRole::User);
    }

    #[test]
    fn no_guidance_means_two_messages() {
        let req = composer().compose("make it blue", None);
        assert_eq!(req.guidance, None);
        assert_eq!(req.messages().len(), 2);
        assert_eq!(req.system_prompt(), rules::SYSTEM_POLICY);
    }

    #[test]
    fn repair_request_uses_its_own_policy() {
        let req = repair_request("graph TD\nsubgraph A\nX --> Y");
        assert_eq!(req.system_policy, rules::REPAIR_POLICY);
        assert_eq!(req.guidance, None);
        assert!(req.user_message().starts_with("Fix this Mermaid code:\n\ngraph TD"));
        assert_eq!(req.temperature, REPAIR_TEMPERATURE);
    }

    #[test]
    fn title_temperature_is_higher_than_generation() {
        let req = title_request("Диаграмма классов магазина");
        assert!(req.temperature > GENERATE_TEMPERATURE);
        assert_eq!(req.user_message(), "Диаграмма классов магазина");
    }

    #[test]
    fn messages_serialize_for_chat_completions() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hi"}));
    }
}
