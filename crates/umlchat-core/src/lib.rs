pub mod rules;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};

// --- Types ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in a chat transcript. Turns are only ever appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    #[serde(default)]
    pub created_at: u64,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            created_at: now_millis(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            created_at: now_millis(),
        }
    }
}

/// A persisted conversation: its transcript and the one current diagram source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub turns: Vec<ConversationTurn>,
    /// Current Mermaid source. Overwritten as a whole, never versioned.
    #[serde(default)]
    pub diagram_source: String,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
}

impl ChatRecord {
    pub fn new(id: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: id.into(),
            title: String::new(),
            turns: Vec::new(),
            diagram_source: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The current source, or `None` when it is blank.
    pub fn existing_source(&self) -> Option<&str> {
        let source = self.diagram_source.as_str();
        (!source.trim().is_empty()).then_some(source)
    }

    pub fn first_user_message(&self) -> Option<&str> {
        self.turns
            .iter()
            .find(|t| t.role == Role::User)
            .map(|t| t.text.as_str())
    }

    pub fn touch(&mut self) {
        self.updated_at = now_millis();
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// --- Storage ---

/// Resolve the global data directory (~/.umlchat/).
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".umlchat")
}

/// Chat ids are `[A-Za-z0-9_-]+`, so a record path never leaves the store root.
pub fn validate_chat_id(id: &str) -> Result<(), String> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(format!("invalid chat id '{}': use letters, digits, '-' and '_'", id))
    }
}

/// File-backed chat records, one JSON file per conversation.
#[derive(Debug, Clone)]
pub struct ChatStore {
    root: PathBuf,
}

impl ChatStore {
    /// Store rooted at `~/.umlchat/chats`.
    pub fn open_default() -> Self {
        Self::at(data_dir().join("chats"))
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a record. Ids are plain names, never paths.
    fn path_for(&self, id: &str) -> Result<PathBuf, String> {
        validate_chat_id(id)?;
        Ok(self.root.join(format!("{}.json", id)))
    }

    /// List all chat ids (without .json extension), sorted.
    pub fn list(&self) -> Result<Vec<String>, String> {
        if !self.root.exists() {
            return Ok(vec![]);
        }
        let mut ids: Vec<String> = fs::read_dir(&self.root)
            .map_err(|e| e.to_string())?
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let name = entry.file_name().to_string_lossy().to_string();
                name.strip_suffix(".json").map(|n| n.to_string())
            })
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Read a chat record. Returns `Ok(None)` if it does not exist.
    pub fn read(&self, id: &str) -> Result<Option<ChatRecord>, String> {
        let path = self.path_for(id)?;
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).map_err(|e| e.to_string())?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| format!("corrupt chat record '{}': {}", id, e))
    }

    /// Write the full record.
    ///
    /// Uses atomic write (temp file + rename) so a reader never sees a
    /// half-written record.
    pub fn write(&self, record: &ChatRecord) -> Result<(), String> {
        let path = self.path_for(&record.id)?;
        fs::create_dir_all(&self.root).map_err(|e| e.to_string())?;
        let json = serde_json::to_string_pretty(record).map_err(|e| e.to_string())?;
        let tmp = self.root.join(format!(".{}.json.tmp", record.id));
        fs::write(&tmp, json).map_err(|e| e.to_string())?;
        fs::rename(&tmp, path).map_err(|e| e.to_string())?;
        debug!(chat_id = record.id.as_str(), turns = record.turns.len(); "chat record written");
        Ok(())
    }

    /// Delete a chat by id.
    pub fn delete(&self, id: &str) -> Result<(), String> {
        let path = self.path_for(id)?;
        if path.exists() {
            fs::remove_file(&path).map_err(|e| e.to_string())
        } else {
            Ok(())
        }
    }

    /// Allocate the next id and persist an empty record under it, so the
    /// following scan no longer hands out the same id.
    pub fn create(&self) -> Result<ChatRecord, String> {
        let record = ChatRecord::new(self.next_chat_id()?);
        self.write(&record)?;
        Ok(record)
    }

    /// Generate the next chat ID by scanning existing records.
    pub fn next_chat_id(&self) -> Result<String, String> {
        let max = self
            .list()?
            .iter()
            .filter_map(|id| id.strip_prefix("chat-").and_then(|n| n.parse::<u64>().ok()))
            .max()
            .unwrap_or(0);
        Ok(format!("chat-{}", max + 1))
    }
}

// --- AI Settings ---

pub const DEFAULT_PROVIDER: &str = "polza";
pub const DEFAULT_MODEL: &str = "deepseek/deepseek-chat";
pub const DEFAULT_BASE_URL: &str = "https://api.polza.ai/api/v1";

/// Environment variables consulted for the API key, in order.
pub const API_KEY_ENV: [&str; 3] = ["UMLCHAT_API_KEY", "POLZA_API_KEY", "API_KEY"];

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiSettings {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
    /// Base URL of an OpenAI-compatible endpoint (without `/chat/completions`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Hard limit for a single generation call. Unset means transport default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl AiSettings {
    /// Endpoint base URL with the default filled in and trailing slashes removed.
    pub fn endpoint_base(&self) -> String {
        self.base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string()
    }
}

fn settings_path() -> PathBuf {
    data_dir().join("settings.json")
}

pub fn read_settings() -> AiSettings {
    let path = settings_path();
    if !path.exists() {
        return AiSettings::default();
    }
    match fs::read_to_string(&path)
        .map_err(|e| e.to_string())
        .and_then(|s| serde_json::from_str(&s).map_err(|e| e.to_string()))
    {
        Ok(settings) => settings,
        Err(e) => {
            warn!(path = path.display().to_string(), error = e; "ignoring unreadable settings file");
            AiSettings::default()
        }
    }
}

/// Settings file, then environment overrides, then defaults.
pub fn resolve_settings() -> AiSettings {
    apply_overrides(read_settings(), |name| std::env::var(name).ok())
}

/// Layer environment values and defaults over `settings`.
///
/// `lookup` is the environment accessor; empty values count as unset.
pub fn apply_overrides(
    mut settings: AiSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> AiSettings {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(provider) = get("UMLCHAT_PROVIDER") {
        settings.provider = provider;
    }
    if let Some(model) = get("UMLCHAT_MODEL") {
        settings.model = model;
    }
    if let Some(url) = get("UMLCHAT_BASE_URL") {
        settings.base_url = Some(url);
    }
    if settings.api_key.is_empty() {
        if let Some(key) = API_KEY_ENV.iter().find_map(|name| get(name)) {
            settings.api_key = key;
        }
    }
    if settings.provider.is_empty() {
        settings.provider = DEFAULT_PROVIDER.to_string();
    }
    if settings.model.is_empty() {
        settings.model = DEFAULT_MODEL.to_string();
    }
    settings
}

pub fn ai_configured(settings: &AiSettings) -> bool {
    !settings.provider.is_empty()
        && !settings.model.is_empty()
        && (settings.provider == "ollama" || !settings.api_key.is_empty())
}
