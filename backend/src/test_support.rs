use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use crate::{
    cipher::tests::encrypt_payload,
    config::ProviderConfig,
    video::{VideoRef, watch_url},
};

pub const VIDEO_ID: &str = "dQw4w9WgXcQ";

#[derive(Debug, Clone, Default)]
pub struct Hits(Arc<AtomicUsize>);

impl Hits {
    pub fn bump(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn video_ref() -> VideoRef {
    VideoRef {
        id: VIDEO_ID.to_string(),
        url: watch_url(VIDEO_ID),
    }
}

pub fn provider_config(addr: SocketAddr) -> ProviderConfig {
    ProviderConfig {
        savetube_base_url: format!("http://{addr}/api"),
        cdn_scheme: "http".to_string(),
        search_url: format!("http://{addr}/results"),
        ytmp3_init_url: format!("http://{addr}/api/v1/init"),
        upstream_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(5),
        ..ProviderConfig::default()
    }
}

pub async fn bind_local() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

pub async fn spawn_upstream(router: Router) -> SocketAddr {
    let (listener, addr) = bind_local().await;
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

#[derive(Debug, Clone, Copy)]
pub enum VideoMode {
    Direct,
    CompleteAfter(usize),
    ErrorAfter(usize),
    NeverComplete,
    InitFails,
}

/// One local server standing in for the search page and both providers.
#[derive(Debug, Clone)]
pub struct FakeUpstream {
    pub search_hit: bool,
    pub cdn_ok: bool,
    pub include_key: bool,
    pub audio_link: bool,
    pub video: VideoMode,
}

impl Default for FakeUpstream {
    fn default() -> Self {
        Self {
            search_hit: true,
            cdn_ok: true,
            include_key: true,
            audio_link: true,
            video: VideoMode::CompleteAfter(2),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpstreamHits {
    pub search: Hits,
    pub cdn: Hits,
    pub info: Hits,
    pub download: Hits,
    pub init: Hits,
    pub convert: Hits,
    pub progress: Hits,
}

impl UpstreamHits {
    pub fn total(&self) -> usize {
        [
            &self.search,
            &self.cdn,
            &self.info,
            &self.download,
            &self.init,
            &self.convert,
            &self.progress,
        ]
        .iter()
        .map(|hits| hits.count())
        .sum()
    }
}

pub struct RunningUpstream {
    pub addr: SocketAddr,
    pub config: ProviderConfig,
    pub hits: UpstreamHits,
}

struct FakeState {
    options: FakeUpstream,
    addr: SocketAddr,
    secret_key: [u8; 16],
    hits: UpstreamHits,
}

type Shared = State<Arc<FakeState>>;

impl FakeUpstream {
    pub async fn spawn(self) -> RunningUpstream {
        let (listener, addr) = bind_local().await;
        let config = provider_config(addr);
        let hits = UpstreamHits::default();
        let state = Arc::new(FakeState {
            options: self,
            addr,
            secret_key: config.secret_key,
            hits: hits.clone(),
        });

        let router = Router::new()
            .route("/results", get(search))
            .route("/api/random-cdn", get(random_cdn))
            .route("/v2/info", post(info))
            .route("/download", post(download))
            .route("/api/v1/init", get(init))
            .route("/convert", get(convert))
            .route("/progress", get(progress))
            .with_state(state);

        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        RunningUpstream { addr, config, hits }
    }
}

async fn search(State(state): Shared) -> String {
    state.hits.search.bump();
    if state.options.search_hit {
        format!(r#"<script>var ytInitialData = {{"videoRenderer":{{"videoId":"{VIDEO_ID}"}}}};</script>"#)
    } else {
        "<html><body>No results</body></html>".to_string()
    }
}

async fn random_cdn(State(state): Shared) -> Json<Value> {
    state.hits.cdn.bump();
    Json(json!({ "status": state.options.cdn_ok, "data": { "cdn": state.addr.to_string() } }))
}

async fn info(State(state): Shared, Json(body): Json<Value>) -> Json<Value> {
    state.hits.info.bump();
    assert_eq!(body["url"], watch_url(VIDEO_ID));

    let mut plaintext = json!({
        "title": "Never Gonna Give You Up",
        "thumbnail": format!("https://i.ytimg.com/vi/{VIDEO_ID}/hqdefault.jpg"),
        "duration": 213,
    });
    if state.options.include_key {
        plaintext["key"] = json!("audio-key");
    }

    let encrypted = encrypt_payload(plaintext.to_string().as_bytes(), &state.secret_key);
    Json(json!({ "status": true, "data": { "data": encrypted } }))
}

async fn download(State(state): Shared, Json(body): Json<Value>) -> Json<Value> {
    state.hits.download.bump();
    assert_eq!(body["downloadType"], "audio");
    assert_eq!(body["quality"], "128");
    assert_eq!(body["key"], "audio-key");

    if state.options.audio_link {
        Json(json!({ "data": { "data": { "downloadUrl": "https://cdn.example/audio.mp3" } } }))
    } else {
        Json(json!({ "data": { "data": {} } }))
    }
}

async fn init(State(state): Shared) -> Json<Value> {
    state.hits.init.bump();
    match state.options.video {
        VideoMode::InitFails => Json(json!({ "error": 0 })),
        _ => Json(json!({
            "convertURL": format!("http://{}/convert?sig=test", state.addr),
            "error": 0,
        })),
    }
}

async fn convert(
    State(state): Shared,
    Query(params): Query<std::collections::HashMap<String, String>>,
) -> Json<Value> {
    state.hits.convert.bump();
    assert_eq!(params.get("v").map(String::as_str), Some(VIDEO_ID));
    assert_eq!(params.get("f").map(String::as_str), Some("mp4"));

    match state.options.video {
        VideoMode::Direct => Json(json!({
            "downloadURL": "https://conv.example/direct.mp4",
            "error": 0,
        })),
        _ => Json(json!({
            "progressURL": format!("http://{}/progress?id=1", state.addr),
            "downloadURL": "",
            "error": 0,
        })),
    }
}

async fn progress(State(state): Shared) -> Json<Value> {
    let attempt = state.hits.progress.bump();
    match state.options.video {
        VideoMode::CompleteAfter(done) if attempt >= done => Json(json!({
            "progress": 3,
            "downloadURL": "https://conv.example/video.mp4",
            "error": 0,
        })),
        VideoMode::ErrorAfter(failed) if attempt >= failed => Json(json!({
            "progress": 0,
            "error": "conversion failed",
        })),
        _ => Json(json!({ "progress": 1, "error": 0 })),
    }
}
