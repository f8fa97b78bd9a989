use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{info, warn};
use umlchat_core::ChatStore;
use umlchat_gen::{
    classify, precheck_looks_valid, sanitize, DiagramAssistant, GenerationError, GuidanceLibrary,
    Operation, Session, UnconfiguredGenerator,
};

// --- Request types ---

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct GenerateRequest {
    /// Chat to continue (e.g. "chat-3"). Omit to start a new chat.
    chat_id: Option<String>,
    /// What to draw or change, in any language
    message: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ChatRequest {
    /// ID of the chat (e.g. "chat-3")
    chat_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct EditRequest {
    /// ID of the chat
    chat_id: String,
    /// Complete new Mermaid source. Replaces the current one.
    source: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ClassifyRequest {
    /// The user's request text
    request: String,
    /// Current diagram source, if iterating on an existing diagram
    existing_source: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SourceRequest {
    /// Mermaid source text
    source: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SanitizeRequest {
    /// Raw model output, possibly wrapped in code fences
    raw: String,
}

// --- Server ---

#[derive(Clone)]
pub struct UmlChatServer {
    tool_router: ToolRouter<Self>,
    assistant: Arc<DiagramAssistant>,
    /// Why generation is unavailable (usually a missing API key).
    unavailable: Option<String>,
    library: Arc<GuidanceLibrary>,
    store: ChatStore,
    sessions: Arc<Mutex<HashMap<String, Arc<Session>>>>,
}

#[tool_router]
impl UmlChatServer {
    pub fn new(assistant: Result<Arc<DiagramAssistant>, String>, store: ChatStore) -> Self {
        let library = Arc::new(GuidanceLibrary::standard());
        let (assistant, unavailable) = match assistant {
            Ok(assistant) => (assistant, None),
            Err(reason) => {
                let generator = Arc::new(UnconfiguredGenerator::new(reason.clone()));
                let assistant = DiagramAssistant::new(generator, library.clone());
                (Arc::new(assistant), Some(reason))
            }
        };
        Self {
            tool_router: Self::tool_router(),
            assistant,
            unavailable,
            library,
            store,
            sessions: Arc::default(),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session(&self, chat_id: &str) -> Result<Arc<Session>, String> {
        let mut sessions = self.sessions();
        if let Some(session) = sessions.get(chat_id) {
            return Ok(session.clone());
        }
        let session = Arc::new(Session::open(self.assistant.clone(), self.store.clone(), chat_id)?);
        sessions.insert(chat_id.to_string(), session.clone());
        Ok(session)
    }

    /// Start a chat under a fresh id. The id is reserved on disk while the
    /// session map is locked, so concurrent callers never share one.
    fn new_session(&self) -> Result<Arc<Session>, String> {
        let mut sessions = self.sessions();
        let record = self.store.create()?;
        let id = record.id.clone();
        let session = Arc::new(Session::new(self.assistant.clone(), record).with_store(self.store.clone()));
        sessions.insert(id.clone(), session.clone());
        info!(chat_id = id.as_str(); "chat created");
        Ok(session)
    }

    fn forget(&self, chat_id: &str) {
        let removed = self.sessions().remove(chat_id);
        if let Some(session) = removed {
            session.close();
        }
    }

    #[tool(
        description = "Create or update a Mermaid diagram from a natural-language message. Without chat_id a new chat is started. With chat_id the chat's current diagram is updated according to the message. Returns the chat id followed by the full diagram source. A newer message to the same chat cancels one that is still running."
    )]
    async fn generate_diagram(
        &self,
        Parameters(req): Parameters<GenerateRequest>,
    ) -> Result<CallToolResult, McpError> {
        if let Some(reason) = &self.unavailable {
            return Ok(failure(reason.as_str()));
        }
        let session = match req.chat_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => self.session(&id),
            None => self
                .new_session()
                .map_err(|e| format!("Failed to create chat: {}", e)),
        };
        let session = match session {
            Ok(s) => s,
            Err(e) => return Ok(failure(e)),
        };
        let chat_id = session.id();

        match session.send_message(&req.message).await {
            Ok(source) => {
                if let Err(e) = session.ensure_title().await {
                    warn!(chat_id = chat_id.as_str(), error = e.to_string(); "title not generated");
                }
                let mut text = format!("chat: {}\n\n{}", chat_id, source);
                if !precheck_looks_valid(&source) {
                    text.push_str("\n\nWarning: the source does not start with a known diagram type. Use fix_diagram to repair it.");
                }
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => Ok(generation_failure(&chat_id, Operation::Generate, &e)),
        }
    }

    #[tool(
        description = "Fix syntax errors in the chat's current Mermaid source without changing its meaning. Use after the diagram failed to render. Returns the corrected source."
    )]
    async fn fix_diagram(
        &self,
        Parameters(req): Parameters<ChatRequest>,
    ) -> Result<CallToolResult, McpError> {
        if let Some(reason) = &self.unavailable {
            return Ok(failure(reason.as_str()));
        }
        let session = match self.session(&req.chat_id) {
            Ok(s) => s,
            Err(e) => return Ok(failure(e)),
        };
        match session.fix_diagram().await {
            Ok(source) if source.is_empty() => Ok(failure(format!(
                "Chat '{}' has no diagram to fix.",
                req.chat_id
            ))),
            Ok(source) => Ok(CallToolResult::success(vec![Content::text(source)])),
            Err(e) => Ok(generation_failure(&req.chat_id, Operation::Repair, &e)),
        }
    }

    #[tool(
        description = "Replace the chat's diagram source with a manual edit. The next generate_diagram call iterates on this source."
    )]
    fn edit_diagram(
        &self,
        Parameters(req): Parameters<EditRequest>,
    ) -> Result<CallToolResult, McpError> {
        let session = match self.session(&req.chat_id) {
            Ok(s) => s,
            Err(e) => return Ok(failure(e)),
        };
        session.edit_source(&req.source);
        Ok(CallToolResult::success(vec![Content::text(format!(
            "Diagram source of '{}' updated.",
            req.chat_id
        ))]))
    }

    #[tool(
        description = "Get a chat as JSON: {id, title, turns: [{role, text, createdAt}], diagramSource, createdAt, updatedAt}"
    )]
    fn get_chat(
        &self,
        Parameters(req): Parameters<ChatRequest>,
    ) -> Result<CallToolResult, McpError> {
        let live = self.sessions().get(&req.chat_id).map(|s| s.snapshot());
        let record = match live {
            Some(record) => record,
            None => match self.store.read(&req.chat_id) {
                Ok(Some(record)) => record,
                Ok(None) => return Ok(failure(format!("Chat '{}' not found.", req.chat_id))),
                Err(e) => return Ok(failure(format!("Failed to read chat '{}': {}", req.chat_id, e))),
            },
        };
        let json = serde_json::to_string_pretty(&record)
            .unwrap_or_else(|e| format!("Serialization error: {}", e));
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "List all stored chats with their titles")]
    fn list_chats(&self) -> Result<CallToolResult, McpError> {
        match self.store.list() {
            Ok(ids) if ids.is_empty() => Ok(CallToolResult::success(vec![Content::text(
                "No chats found. Use generate_diagram to start one.",
            )])),
            Ok(ids) => {
                let lines: Vec<String> = ids
                    .iter()
                    .map(|id| {
                        let title = self
                            .store
                            .read(id)
                            .ok()
                            .flatten()
                            .map(|r| r.title)
                            .unwrap_or_default();
                        chat_line(id, &title)
                    })
                    .collect();
                Ok(CallToolResult::success(vec![Content::text(lines.join("\n"))]))
            }
            Err(e) => Ok(failure(e)),
        }
    }

    #[tool(description = "Delete a chat. A generation still running for it is cancelled.")]
    fn delete_chat(
        &self,
        Parameters(req): Parameters<ChatRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.forget(&req.chat_id);
        match self.store.delete(&req.chat_id) {
            Ok(()) => {
                info!(chat_id = req.chat_id.as_str(); "chat deleted");
                Ok(CallToolResult::success(vec![Content::text(format!(
                    "Chat '{}' deleted.",
                    req.chat_id
                ))]))
            }
            Err(e) => Ok(failure(e)),
        }
    }

    #[tool(
        description = "Classify a request into a diagram category: use-case, sequence, class, activity, state, er or unknown. An existing source decides the category when the request names none."
    )]
    fn classify_request(
        &self,
        Parameters(req): Parameters<ClassifyRequest>,
    ) -> Result<CallToolResult, McpError> {
        let category = classify(&self.library, &req.request, req.existing_source.as_deref());
        Ok(CallToolResult::success(vec![Content::text(category.as_str())]))
    }

    #[tool(
        description = "Get the diagram-type guidance block that would accompany a request, or a note that none applies"
    )]
    fn get_guidance(
        &self,
        Parameters(req): Parameters<ClassifyRequest>,
    ) -> Result<CallToolResult, McpError> {
        let text = self
            .library
            .build_guidance(&req.request, req.existing_source.as_deref())
            .unwrap_or_else(|| NO_GUIDANCE.to_string());
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    #[tool(
        description = "Cheap syntax screen: true when the source's first meaningful line starts with a known Mermaid diagram header. Not a full parse."
    )]
    fn precheck_diagram(
        &self,
        Parameters(req): Parameters<SourceRequest>,
    ) -> Result<CallToolResult, McpError> {
        let verdict = precheck_looks_valid(&req.source);
        Ok(CallToolResult::success(vec![Content::text(verdict.to_string())]))
    }

    #[tool(description = "Strip code fences and surrounding whitespace from raw model output")]
    fn sanitize_output(
        &self,
        Parameters(req): Parameters<SanitizeRequest>,
    ) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult::success(vec![Content::text(sanitize(&req.raw))]))
    }

    #[tool(description = "Get the notation policy every generated diagram follows")]
    fn get_rules(&self) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult::success(vec![Content::text(
            umlchat_core::rules::SYSTEM_POLICY,
        )]))
    }
}

#[tool_handler]
impl ServerHandler for UmlChatServer {
    fn get_info(&self) -> ServerInfo {
        let instructions = format!(
            "{}\n\n## Notation policy\n{}",
            INSTRUCTIONS,
            umlchat_core::rules::SYSTEM_POLICY
        );
        ServerInfo {
            instructions: Some(instructions.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// --- Helpers ---

const NO_GUIDANCE: &str = "No guidance: the request names no diagram type.";

fn failure(message: impl Into<String>) -> CallToolResult {
    CallToolResult::error(vec![Content::text(message.into())])
}

fn generation_failure(chat_id: &str, op: Operation, err: &GenerationError) -> CallToolResult {
    if err.is_cancelled() {
        return failure(format!(
            "Request for '{}' was cancelled by a newer one.",
            chat_id
        ));
    }
    failure(format!("{} ({})", err.user_message(op), err))
}

fn chat_line(id: &str, title: &str) -> String {
    if title.is_empty() {
        id.to_string()
    } else {
        format!("{}: {}", id, title)
    }
}

const INSTRUCTIONS: &str = r#"umlchat turns natural-language requests into Mermaid diagrams (use case, sequence, class, activity, state and ER diagrams). Each chat keeps one current diagram source.

## Workflow
1. Call `generate_diagram` with a message to start a chat. Keep the returned chat id.
2. Call `generate_diagram` again with the same chat_id to change the diagram. Describe the change, not the whole diagram.
3. If the diagram fails to render, call `fix_diagram`. To apply a hand edit, call `edit_diagram` with the full source.
4. `get_chat` returns the transcript and the current source.

`classify_request`, `get_guidance`, `precheck_diagram` and `sanitize_output` expose the individual pipeline steps without calling the model."#;

fn init_logging() {
    let env = env_logger::Env::default()
        .filter_or("UMLCHAT_LOG", "info")
        .write_style("UMLCHAT_LOG_STYLE");
    env_logger::Builder::from_env(env)
        .target(env_logger::Target::Stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let settings = umlchat_core::resolve_settings();
    let assistant = DiagramAssistant::from_settings(&settings)
        .map(Arc::new)
        .map_err(|e| e.to_string());
    match &assistant {
        Ok(_) => info!(provider = settings.provider.as_str(), model = settings.model.as_str(); "generator ready"),
        Err(e) => warn!(error = e.as_str(); "generation unavailable"),
    }

    let store = ChatStore::open_default();
    info!(root:? = store.root(); "chat store opened");

    let service = UmlChatServer::new(assistant, store)
        .serve(rmcp::transport::io::stdio())
        .await
        .inspect_err(|e| eprintln!("MCP server error: {}", e))?;
    service.waiting().await?;
    Ok(())
}
