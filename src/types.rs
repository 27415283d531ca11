use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ChatId = Uuid;
pub type UserHuid = Uuid;
pub type SyncId = Uuid;

/// Only users of this kind can be reached through a personal chat.
pub const CONVERSATIONAL_USER_KIND: &str = "cts_user";

pub const DEFAULT_GROUP_CHAT_SUFFIX: &str = "@chat-id.internal";

// ---------------------------------------------------------------------------
// Inbound API payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    pub to: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub buttons: Vec<Vec<ButtonSpec>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ButtonSpec {
    pub label: String,
    pub link: String,
    #[serde(default)]
    pub text_color: Option<String>,
    #[serde(default)]
    pub background_color: Option<String>,
    #[serde(default)]
    pub text_align: Option<String>,
    #[serde(default)]
    pub alert_text: Option<String>,
    #[serde(default)]
    pub h_size: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultResponse {
    pub result: String,
}

impl ResultResponse {
    pub fn new(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound platform message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonAlign {
    Left,
    Center,
    Right,
}

impl ButtonAlign {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Some(ButtonAlign::Left),
            "center" => Some(ButtonAlign::Center),
            "right" => Some(ButtonAlign::Right),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ButtonOptions {
    pub font_color: Option<String>,
    pub background_color: Option<String>,
    pub align: Option<ButtonAlign>,
    pub alert_text: Option<String>,
    pub h_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub link: String,
    pub options: ButtonOptions,
}

pub type ButtonRow = Vec<Button>;

/// Opaque provenance blob attached to every gateway message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedMetadata {
    pub encrypted_caller_info: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub chat_id: ChatId,
    pub body: String,
    pub bubbles: Vec<ButtonRow>,
    pub metadata: Option<SealedMetadata>,
}

// ---------------------------------------------------------------------------
// Platform-side entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformUser {
    pub user_huid: UserHuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub emails: Vec<String>,
    pub user_kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatType {
    Chat,
    GroupChat,
    Channel,
    #[serde(other)]
    Other,
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Submit and return as soon as the platform accepted the request.
    Async,
    /// Wait until the platform reports delivery.
    Sync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Accepted { sync_id: SyncId },
    Created { sync_id: SyncId },
}
