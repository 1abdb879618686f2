use std::time::Duration;

use crate::cipher::{self, BLOCK_SIZE, CipherError};

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";
const DEFAULT_CREATOR: &str = "GIMI❤️";

const DEFAULT_SAVETUBE_BASE_URL: &str = "https://media.savetube.me/api";
const DEFAULT_SAVETUBE_ORIGIN: &str = "https://yt.savetube.me";
const DEFAULT_SAVETUBE_REFERER: &str = "https://yt.savetube.me/";
const DEFAULT_SAVETUBE_USER_AGENT: &str = "Postify/1.0.0";
// C5D58EF67A7584E4A29F6C35BBC4EB12
const DEFAULT_SAVETUBE_SECRET_KEY: [u8; BLOCK_SIZE] = [
    0xC5, 0xD5, 0x8E, 0xF6, 0x7A, 0x75, 0x84, 0xE4, 0xA2, 0x9F, 0x6C, 0x35, 0xBB, 0xC4, 0xEB, 0x12,
];

const DEFAULT_SEARCH_URL: &str = "https://www.youtube.com/results";
const DEFAULT_SEARCH_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

const DEFAULT_YTMP3_INIT_URL: &str = "https://d.ymcdn.org/api/v1/init";
const DEFAULT_YTMP3_REFERER: &str = "https://id.ytmp3.mobi/";

const DEFAULT_UPSTREAM_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_POLL_ATTEMPTS: usize = 10;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1500;

const DEFAULT_RATE_LIMIT_MAX_REQUESTS: usize = 25;
const DEFAULT_RATE_LIMIT_WINDOW_SECONDS: u64 = 10;
const MAX_RATE_LIMIT_WINDOW_SECONDS: u64 = 86_400;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub creator: String,
    pub allowed_origins: Vec<String>,
    pub trust_proxy_headers: bool,
    pub rate_limit: RateLimitConfig,
    pub providers: ProviderConfig,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window: Duration,
    pub whitelist: Vec<String>,
}

/// Everything the resolution workflow needs to talk to the third-party services.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub savetube_base_url: String,
    pub cdn_scheme: String,
    pub savetube_origin: String,
    pub savetube_referer: String,
    pub savetube_user_agent: String,
    pub secret_key: [u8; BLOCK_SIZE],
    pub audio_quality: String,
    pub search_url: String,
    pub search_user_agent: String,
    pub ytmp3_init_url: String,
    pub ytmp3_referer: String,
    pub upstream_timeout: Duration,
    pub poll_attempts: usize,
    pub poll_interval: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            savetube_base_url: DEFAULT_SAVETUBE_BASE_URL.to_string(),
            cdn_scheme: "https".to_string(),
            savetube_origin: DEFAULT_SAVETUBE_ORIGIN.to_string(),
            savetube_referer: DEFAULT_SAVETUBE_REFERER.to_string(),
            savetube_user_agent: DEFAULT_SAVETUBE_USER_AGENT.to_string(),
            secret_key: DEFAULT_SAVETUBE_SECRET_KEY,
            audio_quality: "128".to_string(),
            search_url: DEFAULT_SEARCH_URL.to_string(),
            search_user_agent: DEFAULT_SEARCH_USER_AGENT.to_string(),
            ytmp3_init_url: DEFAULT_YTMP3_INIT_URL.to_string(),
            ytmp3_referer: DEFAULT_YTMP3_REFERER.to_string(),
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECONDS),
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, CipherError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, CipherError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &str| lookup(name).and_then(|value| non_empty(&value).map(ToString::to_string));
        let defaults = ProviderConfig::default();

        let secret_key = match text("SAVETUBE_SECRET_KEY") {
            Some(hex) => cipher::parse_key(&hex)?,
            None => defaults.secret_key,
        };

        let providers = ProviderConfig {
            savetube_base_url: text("SAVETUBE_BASE_URL")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or(defaults.savetube_base_url),
            cdn_scheme: text("SAVETUBE_CDN_SCHEME").unwrap_or(defaults.cdn_scheme),
            secret_key,
            search_url: text("YOUTUBE_SEARCH_URL").unwrap_or(defaults.search_url),
            ytmp3_init_url: text("YTMP3_INIT_URL").unwrap_or(defaults.ytmp3_init_url),
            ytmp3_referer: text("YTMP3_REFERER").unwrap_or(defaults.ytmp3_referer),
            upstream_timeout: parse_env::<u64, _>(&lookup, "UPSTREAM_TIMEOUT_SECONDS")
                .filter(|value| *value > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.upstream_timeout),
            poll_attempts: parse_env::<usize, _>(&lookup, "POLL_ATTEMPTS")
                .filter(|value| *value > 0)
                .unwrap_or(defaults.poll_attempts),
            poll_interval: parse_env::<u64, _>(&lookup, "POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            ..defaults
        };

        let rate_limit = RateLimitConfig {
            max_requests: parse_env::<usize, _>(&lookup, "RATE_LIMIT_MAX_REQUESTS")
                .filter(|value| *value > 0)
                .unwrap_or(DEFAULT_RATE_LIMIT_MAX_REQUESTS),
            window: parse_env::<u64, _>(&lookup, "RATE_LIMIT_WINDOW_SECONDS")
                .filter(|value| (1..=MAX_RATE_LIMIT_WINDOW_SECONDS).contains(value))
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECONDS)),
            whitelist: split_list(lookup("RATE_LIMIT_WHITELIST")),
        };

        Ok(Self {
            bind_addr: resolve_bind_addr(&lookup),
            creator: text("PLAY_CREATOR").unwrap_or_else(|| DEFAULT_CREATOR.to_string()),
            allowed_origins: split_list(lookup("ALLOWED_ORIGINS")),
            trust_proxy_headers: read_bool(lookup("TRUST_PROXY_HEADERS")).unwrap_or(false),
            rate_limit,
            providers,
        })
    }
}

fn resolve_bind_addr<F>(lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(configured) = lookup("APP_ADDR").and_then(|value| non_empty(&value).map(ToString::to_string)) {
        return configured;
    }

    if let Some(port) = parse_env::<u16, _>(lookup, "PORT") {
        return format!("0.0.0.0:{port}");
    }

    DEFAULT_BIND_ADDR.to_string()
}

fn parse_env<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(name).and_then(|value| value.trim().parse::<T>().ok())
}

fn read_bool(value: Option<String>) -> Option<bool> {
    match value?.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
