use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::platform::{PlatformClient, PlatformError};
use crate::types::{
    Button, ButtonAlign, ChatId, OutboundMessage, PlatformUser, SealedMetadata, SyncId,
};

/// Bot credentials in the `host@secret_key@bot_id` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotxCredentials {
    pub host: String,
    pub secret_key: String,
    pub bot_id: Uuid,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("bot credentials must look like 'host@secret_key@bot_id'")]
pub struct InvalidCredentials;

impl FromStr for BotxCredentials {
    type Err = InvalidCredentials;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, rest) = s.trim().split_once('@').ok_or(InvalidCredentials)?;
        let (secret_key, bot_id) = rest.rsplit_once('@').ok_or(InvalidCredentials)?;
        if host.is_empty() || secret_key.is_empty() {
            return Err(InvalidCredentials);
        }
        Ok(Self {
            host: host.to_string(),
            secret_key: secret_key.to_string(),
            bot_id: Uuid::parse_str(bot_id).map_err(|_| InvalidCredentials)?,
        })
    }
}

impl BotxCredentials {
    /// Upper-case hex HMAC-SHA256 of the bot id keyed by the secret.
    pub fn signature(&self) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret_key.as_bytes())
            .expect("hmac accepts keys of any length");
        mac.update(self.bot_id.to_string().as_bytes());
        hex::encode_upper(mac.finalize().into_bytes())
    }
}

// ---------------------------------------------------------------------------
// Callback signatures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct BotxClaims {
    #[serde(default)]
    pub iss: Option<String>,
    pub exp: u64,
}

/// Checks the HS256 bearer JWT the platform attaches to every bot callback.
///
/// The token is keyed by the bot secret and addressed to the bot id.
#[derive(Clone)]
pub struct CallbackVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl CallbackVerifier {
    pub fn new(credentials: &BotxCredentials) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[credentials.bot_id.to_string()]);
        Self {
            key: DecodingKey::from_secret(credentials.secret_key.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<BotxClaims, jsonwebtoken::errors::Error> {
        Ok(decode::<BotxClaims>(token, &self.key, &self.validation)?.claims)
    }
}

// ---------------------------------------------------------------------------
// Delivery reports
// ---------------------------------------------------------------------------

/// Outcome of a notification as reported by the platform callback.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryReport {
    pub sync_id: SyncId,
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub errors: serde_json::Value,
}

impl DeliveryReport {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

enum Slot {
    Waiting(oneshot::Sender<DeliveryReport>),
    Arrived(DeliveryReport, Instant),
}

/// Matches delivery callbacks with synchronous senders.
///
/// A report can arrive before its sender registered; such reports are parked
/// for `retention` and dropped afterwards.
pub struct CallbackRegistry {
    slots: Mutex<HashMap<SyncId, Slot>>,
    retention: Duration,
}

impl CallbackRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            retention,
        }
    }

    pub fn complete(&self, report: DeliveryReport) {
        let mut slots = self.slots.lock();
        let now = Instant::now();
        slots.retain(|_, slot| match slot {
            Slot::Arrived(_, at) => now.duration_since(*at) < self.retention,
            Slot::Waiting(tx) => !tx.is_closed(),
        });
        match slots.remove(&report.sync_id) {
            Some(Slot::Waiting(tx)) => {
                let _ = tx.send(report);
            }
            _ => {
                slots.insert(report.sync_id, Slot::Arrived(report, now));
            }
        }
    }

    pub async fn wait(&self, sync_id: SyncId, timeout: Duration) -> Result<DeliveryReport, PlatformError> {
        let rx = {
            let mut slots = self.slots.lock();
            if let Some(Slot::Arrived(report, _)) = slots.remove(&sync_id) {
                return Ok(report);
            }
            let (tx, rx) = oneshot::channel();
            slots.insert(sync_id, Slot::Waiting(tx));
            rx
        };
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(report)) => Ok(report),
            _ => {
                self.slots.lock().remove(&sync_id);
                Err(PlatformError::Timeout(timeout.as_secs()))
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.slots.lock().len()
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    result: Option<T>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct UsersByEmail<'a> {
    emails: &'a [String],
}

#[derive(Debug, Serialize)]
struct CreateChat<'a> {
    name: &'a str,
    description: Option<&'a str>,
    chat_type: &'static str,
    members: Vec<Uuid>,
    shared_history: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCreated {
    chat_id: ChatId,
}

#[derive(Debug, Deserialize)]
struct Accepted {
    sync_id: SyncId,
}

#[derive(Debug, Serialize)]
struct DirectNotification<'a> {
    group_chat_id: ChatId,
    notification: Notification<'a>,
}

#[derive(Debug, Serialize)]
struct Notification<'a> {
    status: &'static str,
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a SealedMetadata>,
    bubble: Vec<Vec<WireButton<'a>>>,
    keyboard: Vec<Vec<WireButton<'a>>>,
}

#[derive(Debug, Serialize)]
struct WireButton<'a> {
    command: &'a str,
    label: &'a str,
    data: serde_json::Value,
    opts: WireButtonOpts<'a>,
}

#[derive(Debug, Serialize)]
struct WireButtonOpts<'a> {
    silent: bool,
    handler: &'static str,
    link: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    font_color: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    background_color: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    align: Option<ButtonAlign>,
    #[serde(skip_serializing_if = "Option::is_none")]
    h_size: Option<u32>,
    show_alert: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    alert_text: Option<&'a str>,
}

impl<'a> From<&'a Button> for WireButton<'a> {
    fn from(b: &'a Button) -> Self {
        WireButton {
            command: &b.link,
            label: &b.label,
            data: serde_json::Value::Object(Default::default()),
            opts: WireButtonOpts {
                silent: true,
                handler: "client",
                link: &b.link,
                font_color: b.options.font_color.as_deref(),
                background_color: b.options.background_color.as_deref(),
                align: b.options.align,
                h_size: b.options.h_size,
                show_alert: b.options.alert_text.is_some(),
                alert_text: b.options.alert_text.as_deref(),
            },
        }
    }
}

impl<'a> From<&'a OutboundMessage> for DirectNotification<'a> {
    fn from(m: &'a OutboundMessage) -> Self {
        DirectNotification {
            group_chat_id: m.chat_id,
            notification: Notification {
                status: "ok",
                body: &m.body,
                metadata: m.metadata.as_ref(),
                bubble: m
                    .bubbles
                    .iter()
                    .map(|row| row.iter().map(WireButton::from).collect())
                    .collect(),
                keyboard: Vec::new(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the BotX platform API.
pub struct BotxClient {
    http: reqwest::Client,
    base_url: String,
    credentials: BotxCredentials,
    token: tokio::sync::Mutex<Option<String>>,
    callbacks: Arc<CallbackRegistry>,
    sync_timeout: Duration,
}

impl BotxClient {
    pub fn new(
        credentials: BotxCredentials,
        plain_http: bool,
        callbacks: Arc<CallbackRegistry>,
        sync_timeout: Duration,
    ) -> Result<Self, PlatformError> {
        let scheme = if plain_http { "http" } else { "https" };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: format!("{scheme}://{}", credentials.host),
            credentials,
            token: tokio::sync::Mutex::new(None),
            callbacks,
            sync_timeout,
        })
    }

    async fn token(&self) -> Result<String, PlatformError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let url = format!(
            "{}/api/v2/botx/bots/{}/token",
            self.base_url, self.credentials.bot_id
        );
        let resp = self
            .http
            .get(url)
            .query(&[("signature", self.credentials.signature())])
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        let token: String = unwrap_envelope(resp).await?;
        tracing::debug!(bot_id = %self.credentials.bot_id, "obtained bot token");
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, PlatformError> {
        let token = self.token().await?;
        let resp = self
            .http
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            self.token.lock().await.take();
        }
        unwrap_envelope(resp).await
    }

    async fn submit(&self, message: &OutboundMessage) -> Result<SyncId, PlatformError> {
        let accepted: Accepted = self
            .post(
                "/api/v4/botx/notifications/direct",
                &DirectNotification::from(message),
            )
            .await?;
        Ok(accepted.sync_id)
    }
}

async fn unwrap_envelope<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, PlatformError> {
    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| PlatformError::Transport(e.to_string()))?;
    if !status.is_success() {
        return Err(PlatformError::Rejected {
            status: status.as_u16(),
            reason: text,
        });
    }
    let envelope: Envelope<T> =
        serde_json::from_str(&text).map_err(|e| PlatformError::Transport(e.to_string()))?;
    match (envelope.status.as_str(), envelope.result) {
        ("ok", Some(result)) => Ok(result),
        _ => Err(PlatformError::Rejected {
            status: status.as_u16(),
            reason: envelope.reason.unwrap_or(text),
        }),
    }
}

#[async_trait]
impl PlatformClient for BotxClient {
    async fn find_users_by_emails(
        &self,
        emails: &[String],
    ) -> Result<Vec<PlatformUser>, PlatformError> {
        self.post("/api/v3/botx/users/by_email", &UsersByEmail { emails })
            .await
    }

    async fn create_chat_with_user(&self, user: &PlatformUser) -> Result<ChatId, PlatformError> {
        let name = user.name.as_deref().unwrap_or("Notifications");
        let created: ChatCreated = self
            .post(
                "/api/v3/botx/chats/create",
                &CreateChat {
                    name,
                    description: None,
                    chat_type: "chat",
                    members: vec![user.user_huid],
                    shared_history: false,
                },
            )
            .await?;
        Ok(created.chat_id)
    }

    async fn send_message_async(&self, message: &OutboundMessage) -> Result<SyncId, PlatformError> {
        self.submit(message).await
    }

    async fn send_message_sync(&self, message: &OutboundMessage) -> Result<SyncId, PlatformError> {
        let sync_id = self.submit(message).await?;
        let report = self.callbacks.wait(sync_id, self.sync_timeout).await?;
        if !report.is_ok() {
            return Err(PlatformError::Delivery(
                report
                    .reason
                    .unwrap_or_else(|| report.errors.to_string()),
            ));
        }
        Ok(sync_id)
    }
}
