//! Media Fetch Bot
//!
//! A Telegram bot that accepts social-media video links, resolves them to
//! direct media URLs via external tools, and replies with the video,
//! gated by a per-user sliding-window rate limiter with temporary bans.

/// Telegram bot transport and handlers
pub mod bot;
/// Injected time sources
pub mod clock;
/// Configuration management
pub mod config;
/// Per-user rate limiting and bans
pub mod ratelimit;
/// Media URL resolution over external tools
pub mod resolver;
/// Shared helpers
pub mod utils;
