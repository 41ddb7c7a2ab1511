//! Command and message handlers for the Telegram transport.
//!
//! The link handler is the only caller of the rate limiter: the admit
//! decision is taken synchronously, before the (potentially slow) media
//! resolution starts.

use crate::bot::resilient::{
    edit_message_safe_resilient, send_message_resilient, send_video_resilient,
};
use crate::ratelimit::RateLimiter;
use crate::resolver::{ytdlp, MediaResolver, MediaSource, ResolveError, ResolvedMedia};
use crate::utils;
use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};
use url::Url;

/// Supported bot commands.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Greeting and usage.
    #[command(description = "Start and show usage.")]
    Start,
    /// Liveness probe.
    #[command(description = "Check that the bot is alive.")]
    Healthcheck,
    /// Resolver tooling status.
    #[command(description = "Show resolver tool version.")]
    Version,
    /// Rate limiter counters.
    #[command(description = "Show request statistics.")]
    Stats,
}

const MSG_WELCOME: &str = "🎉 Welcome to the media download bot!\n\n\
    📱 Send me a video link from:\n\
    • YouTube\n\
    • Instagram\n\
    • TikTok\n\
    • Facebook\n\n\
    and I will fetch the video for you.";

const MSG_INVALID_URL: &str =
    "❌ Please send a valid http(s) link, e.g. https://example.com/video";

const MSG_UNSUPPORTED: &str = "❌ This service is not supported. I can fetch videos \
    from YouTube, Instagram, TikTok and Facebook.";

const MSG_THROTTLED: &str =
    "⚠️ Too many requests. You are temporarily blocked, please try again later.";

/// Longest media title carried into a video caption.
const CAPTION_TITLE_MAX_CHARS: usize = 200;

/// Longest upstream error detail shown to the user.
const ERROR_DETAIL_MAX_CHARS: usize = 300;

/// Extract the sender's user ID, or 0 for channel posts without one.
#[must_use]
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

/// Build the HTML caption for a delivered video.
fn build_caption(media: &ResolvedMedia) -> String {
    match &media.title {
        Some(title) => format!(
            "<b>{}</b>\n✨ via @media_fetch_bot",
            html_escape::encode_text(&utils::truncate_str(title, CAPTION_TITLE_MAX_CHARS))
        ),
        None => "✨ via @media_fetch_bot".to_string(),
    }
}

/// User-facing failure text for a resolution error.
fn failure_text(err: &ResolveError, source: MediaSource) -> String {
    match err {
        ResolveError::Unsupported => MSG_UNSUPPORTED.to_string(),
        ResolveError::Fatal(detail) => format!(
            "❌ This media cannot be fetched: {}",
            html_escape::encode_text(&utils::truncate_str(detail, ERROR_DETAIL_MAX_CHARS))
        ),
        ResolveError::Transient(_) => format!(
            "⚠️ {source} is not responding right now. Please try again in a moment."
        ),
        ResolveError::Tool(_) => {
            "❌ Could not fetch the media. Please try a different link.".to_string()
        }
    }
}

/// Handle the `/start` command.
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn start(bot: Bot, msg: Message) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    info!(user_id, "User started the bot");
    send_message_resilient(&bot, msg.chat.id, MSG_WELCOME, None).await?;
    Ok(())
}

/// Handle the `/healthcheck` command.
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn healthcheck(bot: Bot, msg: Message) -> Result<()> {
    send_message_resilient(&bot, msg.chat.id, "OK", None).await?;
    Ok(())
}

/// Handle the `/version` command: report the state of the yt-dlp
/// installation.
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn version(bot: Bot, msg: Message) -> Result<()> {
    let text = match ytdlp::probe_version().await {
        Some(v) => format!("yt-dlp version: {v}"),
        None => "yt-dlp: not installed or not working".to_string(),
    };
    send_message_resilient(&bot, msg.chat.id, text, None).await?;
    Ok(())
}

/// Handle the `/stats` command: surface the limiter counters.
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn stats(bot: Bot, msg: Message, limiter: Arc<RateLimiter>) -> Result<()> {
    let cfg = limiter.config();
    let text = format!(
        "📊 <b>Request statistics</b>\n\
         Tracked users: {}\n\
         Denied requests: {}\n\
         Bans issued: {}\n\
         Policy: {} requests per {}s window, {}s ban",
        limiter.tracked_users(),
        limiter.denied_count(),
        limiter.tripped_count(),
        cfg.request_limit,
        cfg.window_secs,
        cfg.ban_secs,
    );
    send_message_resilient(&bot, msg.chat.id, text, Some(ParseMode::Html)).await?;
    Ok(())
}

/// Handle a plain text message carrying (hopefully) a video link.
///
/// Order matters here: malformed and unsupported links are rejected
/// before the limiter is consulted, so they consume no slot; the admit
/// decision completes before the resolver is invoked; and a failed
/// resolution does not refund the slot that admitting it consumed.
///
/// # Errors
///
/// Returns an error if a Telegram reply cannot be sent.
pub async fn handle_link(
    bot: Bot,
    msg: Message,
    limiter: Arc<RateLimiter>,
    resolver: Arc<dyn MediaResolver>,
) -> Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let text = text.trim();
    let user_id = get_user_id_safe(&msg);

    let link = match Url::parse(text) {
        Ok(link) if link.scheme() == "http" || link.scheme() == "https" => link,
        _ => {
            send_message_resilient(&bot, msg.chat.id, MSG_INVALID_URL, None).await?;
            return Ok(());
        }
    };

    let Some(source) = MediaSource::classify(&link) else {
        info!(user_id, url = %link, "Rejected unsupported link");
        send_message_resilient(&bot, msg.chat.id, MSG_UNSUPPORTED, None).await?;
        return Ok(());
    };

    if !limiter.admit(user_id) {
        info!(user_id, "Request denied by rate limiter");
        send_message_resilient(&bot, msg.chat.id, MSG_THROTTLED, None).await?;
        return Ok(());
    }

    info!(user_id, %source, url = %link, "Resolving media request");
    let status = send_message_resilient(
        &bot,
        msg.chat.id,
        format!("🔍 Fetching media from {source}..."),
        None,
    )
    .await?;

    match resolver.resolve(&link).await {
        Ok(media) => {
            edit_message_safe_resilient(
                &bot,
                msg.chat.id,
                status.id,
                "✅ Media resolved. Sending...",
            )
            .await;
            send_video_resilient(&bot, msg.chat.id, &media.media_url, &build_caption(&media))
                .await?;
            info!(user_id, "Media delivered");
        }
        Err(e) => {
            warn!(user_id, error = %e, "Resolution failed");
            edit_message_safe_resilient(&bot, msg.chat.id, status.id, &failure_text(&e, source))
                .await;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(title: Option<&str>) -> ResolvedMedia {
        ResolvedMedia {
            media_url: Url::parse("https://cdn.example.com/v.mp4").expect("static URL"),
            title: title.map(str::to_string),
            source: MediaSource::YouTube,
        }
    }

    #[test]
    fn test_caption_escapes_title() {
        let caption = build_caption(&media(Some("Tom & Jerry <3")));
        assert!(caption.contains("Tom &amp; Jerry &lt;3"));
        assert!(!caption.contains("<3"));
    }

    #[test]
    fn test_caption_truncates_long_title() {
        let long = "x".repeat(500);
        let caption = build_caption(&media(Some(&long)));
        assert!(caption.len() < 300);
    }

    #[test]
    fn test_caption_without_title() {
        let caption = build_caption(&media(None));
        assert!(caption.contains("via @media_fetch_bot"));
        assert!(!caption.contains("<b>"));
    }

    #[test]
    fn test_failure_text_variants() {
        assert!(failure_text(&ResolveError::Unsupported, MediaSource::TikTok)
            .contains("not supported"));
        assert!(
            failure_text(&ResolveError::Fatal("Private video".into()), MediaSource::YouTube)
                .contains("Private video")
        );
        assert!(failure_text(
            &ResolveError::Transient("timeout".into()),
            MediaSource::Instagram
        )
        .contains("Instagram"));
    }

    #[test]
    fn test_failure_text_escapes_upstream_detail() {
        let text = failure_text(
            &ResolveError::Fatal("<b>oops</b>".into()),
            MediaSource::YouTube,
        );
        assert!(!text.contains("<b>"));
        assert!(text.contains("&lt;b&gt;"));
    }
}
