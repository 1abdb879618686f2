use std::{collections::HashSet, net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    http::{HeaderValue, Method},
    middleware,
    routing::get,
};
use tokio::{net::TcpListener, time::Duration};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};
use url::Url;

mod cipher;
mod config;
mod error;
mod play;
mod rate_limit;
mod savetube;
mod upstream;
mod video;
mod ytmp3;

#[cfg(test)]
mod test_support;

use config::{AppConfig, ProviderConfig};
use error::ApiError;
use rate_limit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    http_client: reqwest::Client,
    providers: Arc<ProviderConfig>,
    creator: String,
    rate_limiter: RateLimiter,
    trust_proxy_headers: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "backend=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(error) = run().await {
        eprintln!("Server error: {}", error.message);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ApiError> {
    let config = AppConfig::from_env()
        .map_err(|error| ApiError::internal(format!("Invalid configuration: {error}")))?;

    let state = build_state(&config)?;
    let cors = build_cors_layer(&config.allowed_origins)?;
    let app = build_router(state, cors);

    if !config.trust_proxy_headers {
        warn!("TRUST_PROXY_HEADERS=false: rate limiting uses the socket IP.");
    }

    let addr = config.bind_addr;
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|error| ApiError::internal(format!("Could not bind {addr}: {error}")))?;

    info!("Play API ready on http://{addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|error| ApiError::internal(format!("HTTP server error: {error}")))
}

fn build_state(config: &AppConfig) -> Result<AppState, ApiError> {
    let http_client = reqwest::Client::builder()
        .timeout(config.providers.upstream_timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|error| ApiError::internal(format!("Could not build HTTP client: {error}")))?;

    info!(
        "Upstream timeout {:?}, {} progress checks every {:?}",
        config.providers.upstream_timeout,
        config.providers.poll_attempts,
        config.providers.poll_interval
    );

    Ok(AppState {
        http_client,
        providers: Arc::new(config.providers.clone()),
        creator: config.creator.clone(),
        rate_limiter: RateLimiter::new(&config.rate_limit),
        trust_proxy_headers: config.trust_proxy_headers,
    })
}

fn build_router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/play", get(play::play))
        .route("/api/search/play", get(play::play))
        .route("/api/health", get(health))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::enforce_rate_limit,
        ))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn not_found() -> ApiError {
    ApiError::route_not_found()
}

fn build_cors_layer(origins: &[String]) -> Result<CorsLayer, ApiError> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers(Any);

    if origins.is_empty() {
        info!("ALLOWED_ORIGINS not set, accepting requests from any origin.");
        return Ok(layer.allow_origin(Any));
    }

    let normalized_origins = origins
        .iter()
        .map(|origin| {
            normalize_origin(origin).ok_or_else(|| {
                ApiError::internal(format!(
                    "Invalid origin in ALLOWED_ORIGINS: {origin}. Use values like https://example.com"
                ))
            })
        })
        .collect::<Result<HashSet<_>, _>>()?;
    let allowed_origins = Arc::new(normalized_origins);
    let allow_origin = AllowOrigin::predicate({
        let allowed_origins = Arc::clone(&allowed_origins);
        move |origin: &HeaderValue, _| {
            let normalized = origin.to_str().ok().and_then(normalize_origin);
            let allowed = normalized
                .as_ref()
                .is_some_and(|value| allowed_origins.contains(value));
            debug!(
                "CORS origin check raw={:?} normalized={:?} allowed={}",
                origin, normalized, allowed
            );
            allowed
        }
    });
    info!(
        "CORS allow-list loaded with {} origin(s): {:?}",
        allowed_origins.len(),
        allowed_origins.iter().collect::<Vec<_>>()
    );

    Ok(layer.allow_origin(allow_origin))
}

fn normalize_origin(value: &str) -> Option<String> {
    let parsed = Url::parse(value).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let scheme = parsed.scheme();
    let default_port = match scheme {
        "http" => 80,
        "https" => 443,
        _ => return None,
    };
    let port = parsed.port();

    if parsed.path() != "/" || parsed.query().is_some() || parsed.fragment().is_some() {
        return None;
    }

    let include_port = port.is_some_and(|explicit| explicit != default_port);

    if include_port {
        Some(format!("{scheme}://{host}:{}", port?))
    } else {
        Some(format!("{scheme}://{host}"))
    }
}
