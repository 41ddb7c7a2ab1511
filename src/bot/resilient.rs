//! Resilient messaging utilities with automatic retry for Telegram API operations.
//!
//! This module provides wrappers around Telegram API operations that automatically
//! retry on transient network failures using exponential backoff with jitter.

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile, Message, MessageId, ParseMode};
use tracing::{debug, warn};
use url::Url;

/// Send a text message with automatic retry on network failures.
///
/// Uses [`crate::utils::retry_telegram_operation`] with exponential backoff
/// to handle transient network errors.
///
/// # Errors
///
/// Returns an error after all retries are exhausted.
pub async fn send_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    text: impl Into<String>,
    parse_mode: Option<ParseMode>,
) -> Result<Message> {
    let text = text.into();
    crate::utils::retry_telegram_operation(|| async {
        let mut req = bot.send_message(chat_id, text.clone());
        if let Some(pm) = parse_mode {
            req = req.parse_mode(pm);
        }
        req.await
            .map_err(|e| anyhow::anyhow!("Telegram send error: {e}"))
    })
    .await
}

/// Send a video by URL with automatic retry on network failures.
///
/// Telegram fetches the media itself, so only the direct URL and the
/// caption cross the wire here.
///
/// # Errors
///
/// Returns an error after all retries are exhausted.
pub async fn send_video_resilient(
    bot: &Bot,
    chat_id: ChatId,
    media_url: &Url,
    caption: &str,
) -> Result<Message> {
    crate::utils::retry_telegram_operation(|| async {
        bot.send_video(chat_id, InputFile::url(media_url.clone()))
            .caption(caption.to_string())
            .parse_mode(ParseMode::Html)
            .await
            .map_err(|e| anyhow::anyhow!("Telegram video send error: {e}"))
    })
    .await
}

/// Edit a message with automatic retry on network failures.
///
/// # Errors
///
/// Returns an error after all retries are exhausted.
pub async fn edit_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    msg_id: MessageId,
    text: impl Into<String>,
    parse_mode: Option<ParseMode>,
) -> Result<Message> {
    let text = text.into();
    crate::utils::retry_telegram_operation(|| async {
        let mut req = bot.edit_message_text(chat_id, msg_id, text.clone());
        if let Some(pm) = parse_mode {
            req = req.parse_mode(pm);
        }
        req.await
            .map_err(|e| anyhow::anyhow!("Telegram edit error: {e}"))
    })
    .await
}

/// Edit message with graceful degradation and automatic retry.
///
/// Retries on transient network errors and swallows the expected
/// "message is not modified" / "message to edit not found" responses.
///
/// # Returns
///
/// - `true` if message was successfully edited
/// - `false` if edit was skipped (not modified / not found) or failed after retries
pub async fn edit_message_safe_resilient(
    bot: &Bot,
    chat_id: ChatId,
    msg_id: MessageId,
    text: &str,
) -> bool {
    const ERROR_NOT_MODIFIED: &str = "message is not modified";
    const ERROR_NOT_FOUND: &str = "message to edit not found";

    match edit_message_resilient(bot, chat_id, msg_id, text, Some(ParseMode::Html)).await {
        Ok(_) => true,
        Err(e) => {
            let err_msg = e.to_string();
            if err_msg.contains(ERROR_NOT_MODIFIED) || err_msg.contains(ERROR_NOT_FOUND) {
                debug!("Message update skipped: {err_msg}");
            } else {
                warn!("Failed to edit message after retries: {e}");
            }
            false
        }
    }
}
