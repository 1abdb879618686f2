use std::{
    collections::{HashMap, HashSet},
    net::SocketAddr,
    sync::Arc,
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;
use tracing::warn;

use crate::{AppState, config::RateLimitConfig, error::ApiError};

type WindowMap = HashMap<String, Vec<DateTime<Utc>>>;

/// Sliding window of request timestamps per client IP, in memory only.
#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<Mutex<WindowMap>>,
    whitelist: Arc<HashSet<String>>,
    max_requests: usize,
    window: TimeDelta,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let window = TimeDelta::from_std(config.window).unwrap_or(TimeDelta::MAX);
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
            whitelist: Arc::new(config.whitelist.iter().cloned().collect()),
            max_requests: config.max_requests,
            window,
        }
    }

    pub async fn register(&self, ip: &str, now: DateTime<Utc>) -> Result<(), ApiError> {
        if self.whitelist.contains(ip) {
            return Ok(());
        }

        // None when the window reaches before the earliest representable time.
        let window_start = now.checked_sub_signed(self.window);
        let in_window = |seen: &DateTime<Utc>| window_start.is_none_or(|start| *seen > start);

        let mut windows = self.windows.lock().await;
        windows.retain(|_, entries| entries.last().is_some_and(in_window));

        let entries = windows.entry(ip.to_string()).or_default();
        entries.retain(in_window);

        if entries.len() >= self.max_requests {
            let reset_at = entries
                .first()
                .copied()
                .unwrap_or(now)
                .checked_add_signed(self.window)
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            let wait_ms = (reset_at - now).num_milliseconds();
            let retry_after_seconds = ((wait_ms + 999) / 1000).max(1) as u64;
            warn!("Rate limit hit for {ip}, retry in {retry_after_seconds}s");
            return Err(ApiError::rate_limited(
                self.max_requests,
                self.window.num_seconds().max(1) as u64,
                retry_after_seconds,
            ));
        }

        entries.push(now);
        Ok(())
    }
}

pub async fn enforce_rate_limit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let client_ip = client_ip_for_request(state.trust_proxy_headers, request.headers(), addr);
    state.rate_limiter.register(&client_ip, Utc::now()).await?;
    Ok(next.run(request).await)
}

fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let check_header = |key: &str| {
        headers
            .get(key)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
    };

    if let Some(forwarded) = check_header("x-forwarded-for") {
        let first_ip = forwarded
            .split(',')
            .next()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string);

        if first_ip.is_some() {
            return first_ip;
        }
    }

    check_header("cf-connecting-ip").or_else(|| check_header("x-real-ip"))
}

pub fn client_ip_for_request(trust_proxy_headers: bool, headers: &HeaderMap, addr: SocketAddr) -> String {
    if trust_proxy_headers {
        extract_client_ip(headers).unwrap_or_else(|| addr.ip().to_string())
    } else {
        addr.ip().to_string()
    }
}
