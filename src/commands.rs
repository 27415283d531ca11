use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::address::AddressResolver;
use crate::mute::MuteStore;
use crate::platform::PlatformClient;
use crate::strings::localized;
use crate::types::{ChatId, ChatType, OutboundMessage};

pub const COMMAND_MUTE: &str = "/mute";
pub const COMMAND_UNMUTE: &str = "/unmute";
pub const COMMAND_CHAT_ADDR: &str = "/chataddr";

const MENU: &[(&str, &str)] = &[
    (COMMAND_MUTE, "Mute notifications in this chat 🔕"),
    (COMMAND_UNMUTE, "Unmute notifications in this chat 🔔"),
    (COMMAND_CHAT_ADDR, "Show the address of this chat 📫"),
];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    User,
    System,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Command {
    pub body: String,
    pub command_type: CommandType,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandSender {
    pub group_chat_id: ChatId,
    pub chat_type: ChatType,
    #[serde(default)]
    pub user_huid: Option<Uuid>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub locale: String,
}

/// Command callback posted by the platform when a chat member talks to the bot.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandRequest {
    #[serde(default)]
    pub sync_id: Option<Uuid>,
    pub command: Command,
    pub from: CommandSender,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusQuery {
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub chat_type: Option<String>,
    #[serde(default)]
    pub user_huid: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MenuCommand {
    pub body: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResult {
    pub enabled: bool,
    pub status_message: String,
    pub commands: Vec<MenuCommand>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub result: StatusResult,
}

/// Command menu; only chat admins get to see the commands.
pub fn status_response(query: &StatusQuery) -> StatusResponse {
    let commands = if query.is_admin {
        MENU.iter()
            .map(|&(body, description)| MenuCommand {
                body,
                name: body,
                description,
            })
            .collect()
    } else {
        Vec::new()
    };
    StatusResponse {
        status: "ok",
        result: StatusResult {
            enabled: true,
            status_message: String::new(),
            commands,
        },
    }
}

/// Handles `/mute`, `/unmute` and `/chataddr` from chat members.
#[derive(Clone)]
pub struct CommandHandler {
    mutes: Arc<MuteStore>,
    resolver: AddressResolver,
    platform: Arc<dyn PlatformClient>,
}

impl CommandHandler {
    pub fn new(
        mutes: Arc<MuteStore>,
        resolver: AddressResolver,
        platform: Arc<dyn PlatformClient>,
    ) -> Self {
        Self {
            mutes,
            resolver,
            platform,
        }
    }

    /// Applies the command and returns the reply text, if any.
    pub async fn reply_for(&self, req: &CommandRequest) -> Option<String> {
        if req.command.command_type != CommandType::User {
            return None;
        }
        let body = req.command.body.trim().to_lowercase();
        let command = body.split_whitespace().next()?;

        let chat_id = req.from.group_chat_id;
        let locale = req.from.locale.as_str();
        let may_control = req.from.is_admin || req.from.chat_type == ChatType::Chat;

        match command {
            COMMAND_MUTE | COMMAND_UNMUTE => {
                if !may_control {
                    return Some(localized(locale, "not_admin"));
                }
                let mute = command == COMMAND_MUTE;
                let mutes = Arc::clone(&self.mutes);
                let ident = chat_id.to_string();
                // file writes and fsyncs stay off the async workers
                let changed =
                    tokio::task::spawn_blocking(move || mutes.set_muted(&ident, mute)).await;
                let id = match changed {
                    Ok(Ok(true)) if mute => "muted",
                    Ok(Ok(true)) => "unmuted",
                    Ok(Ok(false)) if mute => "not_changed_muted",
                    Ok(Ok(false)) => "not_changed_unmuted",
                    Ok(Err(e)) => {
                        tracing::error!(%chat_id, mute, error = %e, "failed to change mute");
                        "error"
                    }
                    Err(e) => {
                        tracing::error!(%chat_id, mute, error = %e, "mute task failed");
                        "error"
                    }
                };
                Some(localized(locale, id))
            }
            COMMAND_CHAT_ADDR if may_control => Some(
                localized(locale, "show_chat_addr")
                    .replace("{addr}", &self.resolver.chat_address(chat_id)),
            ),
            _ => None,
        }
    }

    pub async fn handle(&self, req: CommandRequest) {
        let Some(text) = self.reply_for(&req).await else {
            return;
        };
        let reply = OutboundMessage {
            chat_id: req.from.group_chat_id,
            body: text,
            bubbles: Vec::new(),
            metadata: None,
        };
        if let Err(e) = self.platform.send_message_async(&reply).await {
            tracing::warn!(chat_id = %reply.chat_id, error = %e, "failed to send command reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::InMemoryPlatform;
    use crate::types::DEFAULT_GROUP_CHAT_SUFFIX;

    fn handler(dir: &std::path::Path) -> (CommandHandler, Arc<InMemoryPlatform>) {
        let platform = Arc::new(InMemoryPlatform::default());
        let mutes = Arc::new(MuteStore::open(dir.join("mute.txt")).unwrap());
        (
            CommandHandler::new(
                mutes,
                AddressResolver::new(DEFAULT_GROUP_CHAT_SUFFIX),
                platform.clone(),
            ),
            platform,
        )
    }

    fn request(body: &str, chat_type: ChatType, is_admin: bool) -> CommandRequest {
        CommandRequest {
            sync_id: None,
            command: Command {
                body: body.into(),
                command_type: CommandType::User,
            },
            from: CommandSender {
                group_chat_id: Uuid::parse_str("22222222-2222-2222-2222-222222222222").unwrap(),
                chat_type,
                user_huid: None,
                is_admin,
                locale: "en".into(),
            },
        }
    }

    #[tokio::test]
    async fn admin_mutes_and_unmutes_group_chat() {
        let dir = tempfile::tempdir().unwrap();
        let (handler, _) = handler(dir.path());
        let chat = "22222222-2222-2222-2222-222222222222";

        let reply = handler
            .reply_for(&request("  /MUTE please", ChatType::GroupChat, true))
            .await;
        assert_eq!(reply.unwrap(), localized("en", "muted"));
        assert!(handler.mutes.is_muted(chat));

        let reply = handler.reply_for(&request("/mute", ChatType::GroupChat, true)).await;
        assert_eq!(reply.unwrap(), localized("en", "not_changed_muted"));

        let reply = handler.reply_for(&request("/unmute", ChatType::GroupChat, true)).await;
        assert_eq!(reply.unwrap(), localized("en", "unmuted"));
        assert!(!handler.mutes.is_muted(chat));
    }

    #[tokio::test]
    async fn personal_chat_member_may_control() {
        let dir = tempfile::tempdir().unwrap();
        let (handler, _) = handler(dir.path());

        let reply = handler.reply_for(&request("/mute", ChatType::Chat, false)).await;
        assert_eq!(reply.unwrap(), localized("en", "muted"));
    }

    #[tokio::test]
    async fn non_admin_in_group_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let (handler, _) = handler(dir.path());

        let reply = handler.reply_for(&request("/mute", ChatType::GroupChat, false)).await;
        assert_eq!(reply.unwrap(), localized("en", "not_admin"));
        assert!(handler.mutes.is_empty());

        assert!(handler
            .reply_for(&request("/chataddr", ChatType::GroupChat, false))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn chat_address_is_revealed_in_personal_chats() {
        let dir = tempfile::tempdir().unwrap();
        let (handler, _) = handler(dir.path());

        let reply = handler
            .reply_for(&request("/chataddr", ChatType::Chat, false))
            .await
            .unwrap();
        assert!(reply.contains("22222222-2222-2222-2222-222222222222@chat-id.internal"));
    }

    #[tokio::test]
    async fn chat_address_is_revealed_to_admins() {
        let dir = tempfile::tempdir().unwrap();
        let (handler, _) = handler(dir.path());

        let reply = handler
            .reply_for(&request("/chataddr", ChatType::GroupChat, true))
            .await
            .unwrap();
        assert!(reply.contains("22222222-2222-2222-2222-222222222222@chat-id.internal"));
    }

    #[tokio::test]
    async fn system_and_unknown_commands_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let (handler, _) = handler(dir.path());

        let mut system = request("/mute", ChatType::GroupChat, true);
        system.command.command_type = CommandType::System;
        assert!(handler.reply_for(&system).await.is_none());
        assert!(handler
            .reply_for(&request("hello", ChatType::GroupChat, true))
            .await
            .is_none());
        assert!(handler
            .reply_for(&request("   ", ChatType::GroupChat, true))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn replies_are_sent_without_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let (handler, platform) = handler(dir.path());

        handler
            .handle(request("/mute", ChatType::GroupChat, true))
            .await;

        let sent = platform.sent_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.body, localized("en", "muted"));
        assert!(sent[0].0.metadata.is_none());
        assert!(!sent[0].1);
    }

    #[test]
    fn status_menu_only_for_admins() {
        let admin = status_response(&StatusQuery {
            is_admin: true,
            ..StatusQuery::default()
        });
        assert_eq!(admin.result.commands.len(), 3);
        assert_eq!(admin.result.commands[0].body, COMMAND_MUTE);

        let member = status_response(&StatusQuery::default());
        assert!(member.result.enabled);
        assert!(member.result.commands.is_empty());
    }
}
