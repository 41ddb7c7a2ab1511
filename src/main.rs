use dotenvy::dotenv;
use media_fetch_bot::bot::handlers::Command;
use media_fetch_bot::clock::MonotonicClock;
use media_fetch_bot::config::{get_eviction_interval, Settings};
use media_fetch_bot::ratelimit::{RateLimiter, RateLimiterConfig};
use media_fetch_bot::resolver::mirror::MirrorApiResolver;
use media_fetch_bot::resolver::ytdlp::{self, YtDlpResolver};
use media_fetch_bot::resolver::{ChainResolver, MediaResolver};
use media_fetch_bot::bot;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting bot tokens from log output
struct RedactionPatterns {
    token1: Regex,
    token2: Regex,
    token3: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token1: Regex::new(r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)")?,
            token2: Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
            token3: Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = input.to_string();
        output = self
            .token1
            .replace_all(&output, "$1[TELEGRAM_TOKEN]$3")
            .to_string();
        output = self
            .token2
            .replace_all(&output, "[TELEGRAM_TOKEN]")
            .to_string();
        output = self
            .token3
            .replace_all(&output, "$1[TELEGRAM_TOKEN]")
            .to_string();
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // We return the original buffer length to satisfy the contract,
        // even if the redacted string length differs.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv().ok();

    // Initialize redaction patterns early (before logging)
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    // Setup logging with redaction
    init_logging(patterns);

    info!("Starting Media Fetch Bot...");

    // Surface a missing yt-dlp installation at startup rather than on
    // the first request.
    match ytdlp::probe_version().await {
        Some(v) => info!("yt-dlp version: {v}"),
        None => warn!("yt-dlp not found or not working; media resolution will fail"),
    }

    // Load settings
    let settings = init_settings();

    // Initialize rate limiter and resolver chain
    let limiter = Arc::new(RateLimiter::new(
        RateLimiterConfig::from_env(),
        Arc::new(MonotonicClock::new()),
    ));
    let resolver = build_resolver(&settings);

    spawn_eviction_task(limiter.clone());

    // Initialize Bot
    let bot = Bot::new(settings.telegram_token.clone());

    // Setup handlers
    let handler = setup_handler();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![limiter, resolver])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

fn build_resolver(settings: &Settings) -> Arc<dyn MediaResolver> {
    let mut resolvers: Vec<Arc<dyn MediaResolver>> = vec![Arc::new(YtDlpResolver::new())];
    if let Some(endpoint) = settings.mirror_api_url.clone() {
        info!("Mirror API fallback enabled");
        resolvers.push(Arc::new(MirrorApiResolver::new(
            endpoint,
            settings.mirror_api_key.clone(),
        )));
    }
    Arc::new(ChainResolver::new(resolvers))
}

/// Periodically drop rate limiter entries that carry no live state.
fn spawn_eviction_task(limiter: Arc<RateLimiter>) {
    let interval_secs = get_eviction_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.tick().await; // first tick completes immediately
        loop {
            interval.tick().await;
            let removed = limiter.evict_stale();
            if removed > 0 {
                debug!(removed, "Eviction pass finished");
            }
        }
    });
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry().branch(
        Update::filter_message()
            .branch(
                dptree::entry()
                    .filter_command::<Command>()
                    .endpoint(handle_command),
            )
            .branch(
                Update::filter_message()
                    .filter(|msg: Message| msg.text().is_some())
                    .endpoint(handle_link_message),
            ),
    )
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    limiter: Arc<RateLimiter>,
) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Start => bot::handlers::start(bot, msg).await,
        Command::Healthcheck => bot::handlers::healthcheck(bot, msg).await,
        Command::Version => bot::handlers::version(bot, msg).await,
        Command::Stats => bot::handlers::stats(bot, msg, limiter).await,
    };
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn handle_link_message(
    bot: Bot,
    msg: Message,
    limiter: Arc<RateLimiter>,
    resolver: Arc<dyn MediaResolver>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::handlers::handle_link(bot, msg, limiter, resolver).await {
        error!("Link handler error: {}", e);
    }
    respond(())
}
