//! Runtime configuration
//!
//! Defaults carry the reference constants. [`IngestConfig::from_env`] layers
//! `LIVECHAT_*` environment variables on top; the binary layers CLI flags on
//! top of that.
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `LIVECHAT_HOST` | bind address | `127.0.0.1` |
//! | `LIVECHAT_PORT` | listen port | `8000` |
//! | `LIVECHAT_PUBLIC_KEY_PATH` | PEM file with the webhook verifying key | built-in Kick key |
//! | `LIVECHAT_WEBHOOK_STORE_CAPACITY` | webhook store size | `100` |
//! | `LIVECHAT_SCRAPE_STORE_CAPACITY` | scrape store size | `100` |
//! | `LIVECHAT_DEDUP_CAPACITY` | dedup window size | `500` |
//! | `LIVECHAT_POLL_INTERVAL_MS` | scrape tick | `200` |
//! | `LIVECHAT_SETTLE_DELAY_MS` | wait after navigation | `3000` |
//! | `LIVECHAT_JOIN_TIMEOUT_MS` | bounded wait for the poll task on stop | `5000` |
//! | `LIVECHAT_DRAIN_BATCH` | events per drain cycle | `100` |
//! | `LIVECHAT_DRAIN_TICK_MS` | drain cycle interval | `300` |
//! | `LIVECHAT_URL_TEMPLATE` | chatroom URL, `{channel}` placeholder | `https://kick.com/{channel}/chatroom` |
//! | `LIVECHAT_HEADLESS` | run the browser headless | `true` |
//! | `LIVECHAT_CHROME_PATH` | Chrome/Chromium executable | auto-detect |

use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::debug;

use crate::browser::BrowserConfig;
use crate::error::ConfigError;
use crate::pipeline::dedup::DEFAULT_DEDUP_CAPACITY;
use crate::pipeline::drain::{DEFAULT_BATCH_SIZE, DEFAULT_DRAIN_TICK};
use crate::pipeline::store::{DEFAULT_EVENT_LOG_CAPACITY, DEFAULT_STORE_CAPACITY};

/// Page text shown when the channel does not exist
pub const NOT_FOUND_MARKER: &str = "Oops, Something went wrong";

/// Page text shown by the anti-automation interstitial
pub const CHALLENGE_MARKER: &str = "Checking if the site connection is secure";

/// Default chatroom URL template
pub const DEFAULT_URL_TEMPLATE: &str = "https://kick.com/{channel}/chatroom";

const ENV_PREFIX: &str = "LIVECHAT_";

/// Top-level configuration
#[derive(Debug, Clone, Default)]
pub struct IngestConfig {
    /// HTTP listener
    pub server: ServerConfig,
    /// Webhook intake
    pub webhook: WebhookConfig,
    /// Scraping session
    pub scraper: ScraperConfig,
    /// Stores and drain loop
    pub pipeline: PipelineConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address
    pub host: IpAddr,
    /// Listen port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8000,
        }
    }
}

impl ServerConfig {
    /// Socket address to bind
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Webhook intake settings
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// PEM file holding the verifying key; `None` uses the built-in key
    pub public_key_path: Option<PathBuf>,
    /// Capacity of the webhook message store
    pub store_capacity: usize,
    /// How many delivery ids are remembered for redelivery detection
    pub dedup_capacity: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            public_key_path: None,
            store_capacity: DEFAULT_STORE_CAPACITY,
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
        }
    }
}

/// Scraping session settings
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Chatroom URL with a `{channel}` placeholder
    pub url_template: String,
    /// Interval between poll ticks
    pub poll_interval: Duration,
    /// Wait after the first navigation before inspecting the page
    pub settle_delay: Duration,
    /// Re-check interval while a challenge page is shown
    pub captcha_interval: Duration,
    /// How long `stop()` waits for the poll task
    pub join_timeout: Duration,
    /// Navigation timeout in milliseconds
    pub navigation_timeout_ms: u64,
    /// Whether the page lists the newest entry first
    pub newest_first: bool,
    /// Text marking a missing channel
    pub not_found_marker: String,
    /// Text marking an anti-automation challenge
    pub challenge_marker: String,
    /// Dedup window size
    pub dedup_capacity: usize,
    /// Browser launch settings
    pub browser: BrowserConfig,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            poll_interval: Duration::from_millis(200),
            settle_delay: Duration::from_secs(3),
            captcha_interval: Duration::from_millis(500),
            join_timeout: Duration::from_secs(5),
            navigation_timeout_ms: 30_000,
            newest_first: true,
            not_found_marker: NOT_FOUND_MARKER.to_string(),
            challenge_marker: CHALLENGE_MARKER.to_string(),
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
            browser: BrowserConfig::default(),
        }
    }
}

impl ScraperConfig {
    /// Create a new config builder
    pub fn builder() -> ScraperConfigBuilder {
        ScraperConfigBuilder::default()
    }

    /// Target URL for a channel
    pub fn target_url(&self, channel: &str) -> String {
        self.url_template.replace("{channel}", channel)
    }
}

/// Builder for ScraperConfig
#[derive(Default)]
pub struct ScraperConfigBuilder {
    config: ScraperConfig,
}

impl ScraperConfigBuilder {
    /// Set the chatroom URL template
    pub fn url_template<S: Into<String>>(mut self, template: S) -> Self {
        self.config.url_template = template.into();
        self
    }

    /// Set the poll interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the post-navigation settle delay
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.config.settle_delay = delay;
        self
    }

    /// Set the challenge re-check interval
    pub fn captcha_interval(mut self, interval: Duration) -> Self {
        self.config.captcha_interval = interval;
        self
    }

    /// Set the stop join timeout
    pub fn join_timeout(mut self, timeout: Duration) -> Self {
        self.config.join_timeout = timeout;
        self
    }

    /// Set whether the page is newest-first
    pub fn newest_first(mut self, newest_first: bool) -> Self {
        self.config.newest_first = newest_first;
        self
    }

    /// Set the dedup window size
    pub fn dedup_capacity(mut self, capacity: usize) -> Self {
        self.config.dedup_capacity = capacity;
        self
    }

    /// Set the browser launch config
    pub fn browser(mut self, browser: BrowserConfig) -> Self {
        self.config.browser = browser;
        self
    }

    /// Build the config
    pub fn build(self) -> ScraperConfig {
        self.config
    }
}

/// Store and drain loop settings
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Capacity of the scrape message store
    pub scrape_store_capacity: usize,
    /// Capacity of the operator event log
    pub event_log_capacity: usize,
    /// Events per drain cycle
    pub drain_batch: usize,
    /// Interval between drain cycles
    pub drain_tick: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scrape_store_capacity: DEFAULT_STORE_CAPACITY,
            event_log_capacity: DEFAULT_EVENT_LOG_CAPACITY,
            drain_batch: DEFAULT_BATCH_SIZE,
            drain_tick: DEFAULT_DRAIN_TICK,
        }
    }
}

impl IngestConfig {
    /// Defaults overlaid with `LIVECHAT_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`IngestConfig::from_env`] with an explicit variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };
        let mut config = Self::default();

        if let Some(host) = vars.parse::<IpAddr>("HOST")? {
            config.server.host = host;
        }
        if let Some(port) = vars.parse::<u16>("PORT")? {
            config.server.port = port;
        }

        config.webhook.public_key_path = vars.get("PUBLIC_KEY_PATH").map(PathBuf::from);
        if let Some(n) = vars.capacity("WEBHOOK_STORE_CAPACITY")? {
            config.webhook.store_capacity = n;
        }
        if let Some(n) = vars.capacity("SCRAPE_STORE_CAPACITY")? {
            config.pipeline.scrape_store_capacity = n;
        }
        if let Some(n) = vars.capacity("DEDUP_CAPACITY")? {
            config.scraper.dedup_capacity = n;
            config.webhook.dedup_capacity = n;
        }
        if let Some(n) = vars.capacity("DRAIN_BATCH")? {
            config.pipeline.drain_batch = n;
        }

        if let Some(d) = vars.nonzero_millis("POLL_INTERVAL_MS")? {
            config.scraper.poll_interval = d;
        }
        if let Some(d) = vars.millis("SETTLE_DELAY_MS")? {
            config.scraper.settle_delay = d;
        }
        if let Some(d) = vars.millis("JOIN_TIMEOUT_MS")? {
            config.scraper.join_timeout = d;
        }
        if let Some(d) = vars.nonzero_millis("DRAIN_TICK_MS")? {
            config.pipeline.drain_tick = d;
        }

        if let Some(template) = vars.get("URL_TEMPLATE") {
            if !template.contains("{channel}") {
                return Err(ConfigError::OutOfRange(format!(
                    "{ENV_PREFIX}URL_TEMPLATE must contain {{channel}}: {template}"
                )));
            }
            config.scraper.url_template = template;
        }
        if let Some(headless) = vars.flag("HEADLESS")? {
            config.scraper.browser.headless = headless;
        }
        if let Some(path) = vars.get("CHROME_PATH") {
            config.scraper.browser.chrome_path = Some(path);
        }

        debug!(?config, "Configuration loaded");
        Ok(config)
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(&format!("{ENV_PREFIX}{key}")).filter(|v| !v.trim().is_empty())
    }

    fn parse<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|_| ConfigError::InvalidValue {
                    key: format!("{ENV_PREFIX}{key}"),
                    value: raw,
                }),
        }
    }

    fn capacity(&self, key: &str) -> Result<Option<usize>, ConfigError> {
        match self.parse::<usize>(key)? {
            Some(0) => Err(ConfigError::OutOfRange(format!(
                "{ENV_PREFIX}{key} must be at least 1"
            ))),
            other => Ok(other),
        }
    }

    fn millis(&self, key: &str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.parse::<u64>(key)?.map(Duration::from_millis))
    }

    /// Intervals that drive a ticker
    fn nonzero_millis(&self, key: &str) -> Result<Option<Duration>, ConfigError> {
        match self.millis(key)? {
            Some(d) if d.is_zero() => Err(ConfigError::OutOfRange(format!(
                "{ENV_PREFIX}{key} must be at least 1"
            ))),
            other => Ok(other),
        }
    }

    fn flag(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(Some(true)),
                "0" | "false" | "no" | "off" => Ok(Some(false)),
                _ => Err(ConfigError::InvalidValue {
                    key: format!("{ENV_PREFIX}{key}"),
                    value: raw,
                }),
            },
        }
    }
}
