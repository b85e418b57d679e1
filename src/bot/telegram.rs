//! Telegram transport using teloxide.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatMemberKind, FileId, InputFile, ParseMode};
use tracing::{info, warn};

/// Chat transport capability consumed by the engines.
///
/// Lookup failures degrade gracefully (`None` / not admin) instead of
/// propagating, matching how the bot treats the Telegram API as flaky.
#[async_trait]
pub trait ChatPort: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), String>;

    /// `media` is either an https URL or a Telegram file id.
    async fn send_animation(&self, chat_id: i64, media: &str, caption: &str)
    -> Result<(), String>;

    async fn member_display_name(&self, chat_id: i64, user_id: i64) -> Option<String>;

    async fn is_admin(&self, chat_id: i64, user_id: i64) -> bool;
}

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChatPort for TelegramClient {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), String> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Markdown)
            .await
            .map(|_| ())
            .map_err(|e| {
                let msg = format!("Failed to send: {e}");
                warn!("{}", msg);
                msg
            })
    }

    async fn send_animation(
        &self,
        chat_id: i64,
        media: &str,
        caption: &str,
    ) -> Result<(), String> {
        info!("🎬 Sending animation to chat {}", chat_id);

        let input_file = if media.starts_with("http") {
            let url = reqwest::Url::parse(media)
                .map_err(|e| format!("Invalid animation URL: {e}"))?;
            InputFile::url(url)
        } else {
            InputFile::file_id(FileId(media.to_string()))
        };

        self.bot
            .send_animation(ChatId(chat_id), input_file)
            .caption(caption)
            .parse_mode(ParseMode::Markdown)
            .await
            .map(|_| ())
            .map_err(|e| {
                let msg = format!("Failed to send animation: {e}");
                warn!("{}", msg);
                msg
            })
    }

    async fn member_display_name(&self, chat_id: i64, user_id: i64) -> Option<String> {
        match self
            .bot
            .get_chat_member(ChatId(chat_id), UserId(user_id as u64))
            .await
        {
            Ok(member) => Some(member.user.first_name.clone()),
            Err(e) => {
                warn!("Failed to get chat member {user_id}: {e}");
                None
            }
        }
    }

    async fn is_admin(&self, chat_id: i64, user_id: i64) -> bool {
        match self
            .bot
            .get_chat_member(ChatId(chat_id), UserId(user_id as u64))
            .await
        {
            Ok(member) => matches!(
                member.kind,
                ChatMemberKind::Owner(_) | ChatMemberKind::Administrator(_)
            ),
            Err(e) => {
                warn!("Failed to check admin status for {user_id}: {e}");
                false
            }
        }
    }
}
