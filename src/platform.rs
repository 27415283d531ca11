use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::types::{ChatId, OutboundMessage, PlatformUser, SyncId};

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("platform request failed: {0}")]
    Transport(String),
    #[error("platform rejected request ({status}): {reason}")]
    Rejected { status: u16, reason: String },
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    #[error("delivery failed: {0}")]
    Delivery(String),
    #[error("no delivery report within {0} seconds")]
    Timeout(u64),
}

/// The messaging platform as seen by the gateway.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn find_users_by_emails(
        &self,
        emails: &[String],
    ) -> Result<Vec<PlatformUser>, PlatformError>;

    /// Returns the personal chat with `user`, creating it when needed.
    async fn create_chat_with_user(&self, user: &PlatformUser) -> Result<ChatId, PlatformError>;

    /// Submits the message and returns once the platform accepted it.
    async fn send_message_async(&self, message: &OutboundMessage) -> Result<SyncId, PlatformError>;

    /// Submits the message and waits for the delivery report.
    async fn send_message_sync(&self, message: &OutboundMessage) -> Result<SyncId, PlatformError>;
}

/// Recording platform used by tests and local runs.
#[derive(Default)]
pub struct InMemoryPlatform {
    pub users: Mutex<Vec<PlatformUser>>,
    pub chats: Mutex<Vec<(PlatformUser, ChatId)>>,
    pub sent: Mutex<Vec<(OutboundMessage, bool)>>,
    pub fail_sends: Mutex<Option<String>>,
    pub fail_lookups: Mutex<Option<String>>,
    lookups: AtomicUsize,
}

impl InMemoryPlatform {
    pub fn with_users(users: Vec<PlatformUser>) -> Self {
        Self {
            users: Mutex::new(users),
            ..Self::default()
        }
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn sent_messages(&self) -> Vec<(OutboundMessage, bool)> {
        self.sent.lock().clone()
    }

    fn record_send(&self, message: &OutboundMessage, sync: bool) -> Result<SyncId, PlatformError> {
        if let Some(reason) = self.fail_sends.lock().clone() {
            return Err(PlatformError::Transport(reason));
        }
        self.sent.lock().push((message.clone(), sync));
        Ok(Uuid::new_v4())
    }
}

#[async_trait]
impl PlatformClient for InMemoryPlatform {
    async fn find_users_by_emails(
        &self,
        emails: &[String],
    ) -> Result<Vec<PlatformUser>, PlatformError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.fail_lookups.lock().clone() {
            return Err(PlatformError::Transport(reason));
        }
        Ok(self
            .users
            .lock()
            .iter()
            .filter(|u| {
                u.emails
                    .iter()
                    .any(|e| emails.iter().any(|q| q.eq_ignore_ascii_case(e)))
            })
            .cloned()
            .collect())
    }

    async fn create_chat_with_user(&self, user: &PlatformUser) -> Result<ChatId, PlatformError> {
        let mut chats = self.chats.lock();
        if let Some((_, id)) = chats.iter().find(|(u, _)| u.user_huid == user.user_huid) {
            return Ok(*id);
        }
        let id = Uuid::new_v4();
        chats.push((user.clone(), id));
        Ok(id)
    }

    async fn send_message_async(&self, message: &OutboundMessage) -> Result<SyncId, PlatformError> {
        self.record_send(message, false)
    }

    async fn send_message_sync(&self, message: &OutboundMessage) -> Result<SyncId, PlatformError> {
        self.record_send(message, true)
    }
}
