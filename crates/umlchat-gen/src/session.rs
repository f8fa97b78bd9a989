//! One conversation: its transcript, its current diagram source, and at most
//! one pending generation call.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use umlchat_core::{ChatRecord, ChatStore, ConversationTurn};

use crate::assistant::{fallback_title, DiagramAssistant};
use crate::error::{GenerationError, Operation};
use crate::render::{DiagramRenderer, RenderError};

pub const CREATED_REPLY: &str = "Diagram created.";
pub const UPDATED_REPLY: &str = "Diagram updated.";
pub const FIXED_REPLY: &str = "Diagram syntax fixed.";

struct Pending {
    ticket: u64,
    token: CancellationToken,
}

struct State {
    record: ChatRecord,
    pending: Option<Pending>,
    next_ticket: u64,
}

pub struct Session {
    assistant: Arc<DiagramAssistant>,
    store: Option<ChatStore>,
    /// Parent of every call token; cancelled by [`Session::close`].
    root: CancellationToken,
    state: Mutex<State>,
}

impl Session {
    pub fn new(assistant: Arc<DiagramAssistant>, record: ChatRecord) -> Self {
        Self {
            assistant,
            store: None,
            root: CancellationToken::new(),
            state: Mutex::new(State {
                record,
                pending: None,
                next_ticket: 1,
            }),
        }
    }

    /// Persist every change of the record through `store`.
    pub fn with_store(mut self, store: ChatStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Load a stored conversation, or start a new one under `id`.
    pub fn open(assistant: Arc<DiagramAssistant>, store: ChatStore, id: &str) -> Result<Self, String> {
        let record = store.read(id)?.unwrap_or_else(|| ChatRecord::new(id));
        Ok(Self::new(assistant, record).with_store(store))
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> String {
        self.state().record.id.clone()
    }

    pub fn snapshot(&self) -> ChatRecord {
        self.state().record.clone()
    }

    pub fn diagram_source(&self) -> String {
        self.state().record.diagram_source.clone()
    }

    pub fn transcript(&self) -> Vec<ConversationTurn> {
        self.state().record.turns.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.state().pending.is_some()
    }

    /// Cancel whatever is pending and register a new call.
    fn begin(&self) -> (u64, CancellationToken, Option<String>) {
        let mut state = self.state();
        if let Some(previous) = state.pending.take() {
            debug!(chat_id = state.record.id.as_str(), ticket = previous.ticket; "superseding pending call");
            previous.token.cancel();
        }
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        let token = self.root.child_token();
        state.pending = Some(Pending {
            ticket,
            token: token.clone(),
        });
        let existing = state.record.existing_source().map(str::to_string);
        (ticket, token, existing)
    }

    /// Apply a finished call, unless it was cancelled or superseded.
    fn finish(
        &self,
        ticket: u64,
        token: &CancellationToken,
        apply: impl FnOnce(&mut ChatRecord),
    ) -> Result<(), GenerationError> {
        let record = {
            let mut state = self.state();
            let current = state.pending.as_ref().is_some_and(|p| p.ticket == ticket);
            if !current || token.is_cancelled() {
                return Err(GenerationError::Cancelled);
            }
            state.pending = None;
            apply(&mut state.record);
            state.record.touch();
            state.record.clone()
        };
        self.persist(&record);
        Ok(())
    }

    /// Drop the pending slot without touching the record.
    fn release(&self, ticket: u64) {
        let mut state = self.state();
        if state.pending.as_ref().is_some_and(|p| p.ticket == ticket) {
            state.pending = None;
        }
    }

    fn persist(&self, record: &ChatRecord) {
        if let Some(store) = &self.store {
            if let Err(e) = store.write(record) {
                warn!(chat_id = record.id.as_str(), error = e; "failed to persist chat");
            }
        }
    }

    /// Handle a chat message: generate or update the diagram.
    ///
    /// Any call still pending for this session is cancelled first. A
    /// cancelled call changes nothing. A failed call keeps the current source
    /// and records the message plus one short failure reply.
    pub async fn send_message(&self, text: &str) -> Result<String, GenerationError> {
        let (ticket, token, existing) = self.begin();
        let updating = existing.is_some();

        let result = self
            .assistant
            .generate(text, existing.as_deref(), &token)
            .await;

        if matches!(result, Err(GenerationError::Cancelled)) {
            debug!(ticket; "generation cancelled, result discarded");
            return Err(GenerationError::Cancelled);
        }

        self.finish(ticket, &token, |record| {
            record.turns.push(ConversationTurn::user(text));
            match &result {
                Ok(source) => {
                    record.diagram_source = source.clone();
                    let reply = if updating { UPDATED_REPLY } else { CREATED_REPLY };
                    record.turns.push(ConversationTurn::assistant(reply));
                }
                Err(e) => {
                    record
                        .turns
                        .push(ConversationTurn::assistant(e.user_message(Operation::Generate)));
                }
            }
        })?;

        match &result {
            Ok(source) => info!(chat_id = self.id(), chars = source.len(); "diagram source replaced"),
            Err(e) => warn!(
                chat_id = self.id(),
                error = e.to_string(),
                transport = e.is_transport();
                "generation failed"
            ),
        }
        result
    }

    /// One-click syntax fix of the current source.
    ///
    /// Returns the current (empty) source without a call when there is
    /// nothing to fix. A pending call is only cancelled once a repair is sent.
    pub async fn fix_diagram(&self) -> Result<String, GenerationError> {
        if self.state().record.existing_source().is_none() {
            return Ok(String::new());
        }
        let (ticket, token, existing) = self.begin();
        let Some(source) = existing else {
            self.release(ticket);
            return Ok(String::new());
        };

        let result = self.assistant.repair(&source, &token).await;
        if matches!(result, Err(GenerationError::Cancelled)) {
            return Err(GenerationError::Cancelled);
        }

        self.finish(ticket, &token, |record| match &result {
            Ok(fixed) => {
                record.diagram_source = fixed.clone();
                record.turns.push(ConversationTurn::assistant(FIXED_REPLY));
            }
            Err(e) => {
                record
                    .turns
                    .push(ConversationTurn::assistant(e.user_message(Operation::Repair)));
            }
        })?;

        if let Err(e) = &result {
            warn!(chat_id = self.id(), error = e.to_string(); "repair failed");
        }
        result
    }

    /// Replace the source with a manual edit.
    pub fn edit_source(&self, source: &str) {
        let record = {
            let mut state = self.state();
            state.record.diagram_source = source.to_string();
            state.record.touch();
            state.record.clone()
        };
        self.persist(&record);
    }

    /// Cancel the pending call, if any. Its result will be ignored.
    pub fn cancel(&self) -> bool {
        let pending = self.state().pending.take();
        match pending {
            Some(p) => {
                p.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel everything, including title requests.
    pub fn close(&self) {
        self.root.cancel();
        self.state().pending = None;
    }

    /// Title of the conversation, generated from its first message if unset.
    ///
    /// Falls back to the start of the message when generation fails.
    pub async fn ensure_title(&self) -> Result<String, GenerationError> {
        let first_message = {
            let state = self.state();
            if !state.record.title.is_empty() {
                return Ok(state.record.title.clone());
            }
            match state.record.first_user_message() {
                Some(m) => m.to_string(),
                None => return Ok(String::new()),
            }
        };

        let token = self.root.child_token();
        let title = match self.assistant.title_for(&first_message, &token).await {
            Ok(title) => title,
            Err(GenerationError::Cancelled) => return Err(GenerationError::Cancelled),
            Err(e) => {
                warn!(error = e.to_string(); "title generation failed, using message prefix");
                fallback_title(&first_message)
            }
        };

        let record = {
            let mut state = self.state();
            if !state.record.title.is_empty() {
                return Ok(state.record.title.clone());
            }
            state.record.title = title.clone();
            state.record.touch();
            state.record.clone()
        };
        self.persist(&record);
        Ok(title)
    }

    /// Render the current source. A failure leaves the source in place so it
    /// can be edited or fixed.
    pub fn render(&self, renderer: &dyn DiagramRenderer) -> Result<String, RenderError> {
        let source = self.diagram_source();
        renderer.render(&source).inspect_err(|e| {
            debug!(error = e.message.as_str(); "renderer rejected diagram source");
        })
    }
}
