//! HTTP API: summarize, speak, download.
//!
//! Handlers are thin: validate the body, call the injected service, map any
//! failure onto [`ApiError`]. Clients only ever see JSON errors (or a plain
//! 404 body on download).

use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::audio_store::AudioStore;
use crate::results_log::{ResultRecord, ResultsLog};
use crate::speech::SpeechSynthesizer;
use crate::summarizer::{Summarizer, Summary};

const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Shown instead of the real cause outside debug mode.
const GENERIC_DETAILS: &str = "An internal error occurred.";

/// Where generated files are served inline.
const AUDIO_ROUTE: &str = "/static/audio";

#[derive(Clone)]
pub struct AppState {
    pub summarizer: Arc<dyn Summarizer>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub store: AudioStore,
    pub results_log: Option<ResultsLog>,
    /// Prefix of the filename suggested on download.
    pub download_prefix: String,
    /// Expose error details in 500 responses.
    pub debug: bool,
}

// --- Request/Response types ---

#[derive(Deserialize)]
struct TextRequest {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Serialize)]
struct SpeakResponse {
    audio_url: String,
    download_url: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No text provided")]
    NoText,
    #[error("{error}: {details}")]
    Upstream { error: &'static str, details: String },
    #[error("File not found")]
    NotFound,
}

impl ApiError {
    /// Log a downstream failure and hide its cause unless `debug` is set.
    fn upstream(error: &'static str, cause: &dyn std::fmt::Display, debug: bool) -> Self {
        error!("{error}: {cause}");
        let details = if debug {
            cause.to_string()
        } else {
            GENERIC_DETAILS.to_string()
        };
        Self::Upstream { error, details }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::NoText => (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    error: "No text provided",
                    details: None,
                }),
            )
                .into_response(),
            Self::Upstream { error, details } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error,
                    details: Some(details),
                }),
            )
                .into_response(),
            Self::NotFound => (StatusCode::NOT_FOUND, "File not found").into_response(),
        }
    }
}

/// Pull non-blank text out of a JSON body, keeping it untrimmed.
fn required_text(body: Result<Json<TextRequest>, JsonRejection>) -> Result<String, ApiError> {
    let Ok(Json(req)) = body else {
        return Err(ApiError::NoText);
    };
    match req.text {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(ApiError::NoText),
    }
}

/// Build the axum router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/summarize", post(handle_summarize))
        .route("/speak", post(handle_speak))
        .route("/download/{filename}", get(handle_download))
        .route(&format!("{AUDIO_ROUTE}/{{filename}}"), get(handle_play))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// --- Handlers ---

async fn handle_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn handle_summarize(
    State(state): State<AppState>,
    body: Result<Json<TextRequest>, JsonRejection>,
) -> Result<Json<Summary>, ApiError> {
    let text = required_text(body)?;
    info!("HTTP /summarize ({} chars)", text.len());

    let result = state
        .summarizer
        .summarize(&text)
        .await
        .map_err(|e| ApiError::upstream("Failed to generate summary", &e, state.debug))?;

    if let Some(log) = &state.results_log {
        log.append_async(ResultRecord::new(&text, &result)).await;
    }

    Ok(Json(result))
}

async fn handle_speak(
    State(state): State<AppState>,
    body: Result<Json<TextRequest>, JsonRejection>,
) -> Result<Json<SpeakResponse>, ApiError> {
    const FAILED: &str = "TTS generation failed";

    let text = required_text(body)?;
    info!("HTTP /speak ({} chars)", text.len());

    let audio = state
        .speech
        .synthesize(&text)
        .await
        .map_err(|e| ApiError::upstream(FAILED, &e, state.debug))?;

    let name = state
        .store
        .write(&AudioStore::new_file_name(), &audio)
        .await
        .map_err(|e| ApiError::upstream(FAILED, &e, state.debug))?;
    info!("Saved {} bytes of audio as {name}", audio.len());

    Ok(Json(SpeakResponse {
        audio_url: format!("{AUDIO_ROUTE}/{name}"),
        download_url: format!("/download/{name}"),
    }))
}

async fn handle_download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let token = Uuid::new_v4().simple().to_string();
    let download_name = format!("{}_{}.mp3", state.download_prefix, &token[..6]);
    let disposition = format!("attachment; filename=\"{download_name}\"");
    stream_audio(&state.store, &filename, disposition).await
}

/// Inline playback for the page's `<audio>` element.
async fn handle_play(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    stream_audio(&state.store, &filename, "inline".to_string()).await
}

async fn stream_audio(
    store: &AudioStore,
    filename: &str,
    disposition: String,
) -> Result<Response, ApiError> {
    let path = store.find(filename).await.ok_or(ApiError::NotFound)?;

    // The sweeper may have won the race since `find`
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| ApiError::NotFound)?;

    let headers = [
        (header::CONTENT_TYPE, "audio/mpeg".to_string()),
        (header::CONTENT_DISPOSITION, disposition),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::speech::SpeechError;
    use crate::summarizer::SummarizeError;

    #[derive(Default)]
    struct FakeSummarizer {
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Summarizer for FakeSummarizer {
        async fn summarize(&self, text: &str) -> Result<Summary, SummarizeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SummarizeError::Status {
                    status: 503,
                    body: "model overloaded".into(),
                });
            }
            Ok(Summary {
                summary: format!("summary of {text}"),
                keywords: "alpha, beta".into(),
            })
        }
    }

    #[derive(Default)]
    struct FakeSpeech {
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeSpeech {
        async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, SpeechError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SpeechError::EmptyAudio);
            }
            Ok(b"ID3fake-mp3".to_vec())
        }
    }

    struct Harness {
        app: Router,
        summarizer: Arc<FakeSummarizer>,
        speech: Arc<FakeSpeech>,
        root: tempfile::TempDir,
        store: AudioStore,
    }

    fn harness(fail: bool, debug: bool) -> Harness {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let root = tempfile::tempdir().unwrap();
        let store = AudioStore::open(root.path().join("audio")).unwrap();
        let summarizer = Arc::new(FakeSummarizer {
            fail,
            ..Default::default()
        });
        let speech = Arc::new(FakeSpeech {
            fail,
            ..Default::default()
        });

        let state = AppState {
            summarizer: summarizer.clone(),
            speech: speech.clone(),
            store: store.clone(),
            results_log: Some(ResultsLog::new(root.path().join("results.jsonl"))),
            download_prefix: "speech_audio".into(),
            debug,
        };

        Harness {
            app: router(state),
            summarizer,
            speech,
            root,
            store,
        }
    }

    async fn post_json(app: &Router, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    async fn get_raw(app: &Router, uri: &str) -> Response<Body> {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        app.clone().oneshot(request).await.unwrap()
    }

    async fn body_bytes(response: Response<Body>) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    // ============================================================================
    // Validation
    // ============================================================================

    #[tokio::test]
    async fn blank_text_is_rejected() {
        let h = harness(false, false);

        for uri in ["/summarize", "/speak"] {
            for body in [
                r#"{"text": ""}"#,
                r#"{"text": "   "}"#,
                r#"{"text": "\n\t"}"#,
                r#"{}"#,
                r#"{"text": null}"#,
                r#"{"text": 42}"#,
                "not json",
            ] {
                let (status, json) = post_json(&h.app, uri, body).await;
                assert_eq!(status, StatusCode::BAD_REQUEST, "{uri} {body}");
                assert_eq!(json["error"], "No text provided");
            }
        }

        assert_eq!(h.summarizer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.speech.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_body_is_rejected() {
        let h = harness(false, false);
        let request = Request::builder()
            .method("POST")
            .uri("/summarize")
            .body(Body::empty())
            .unwrap();
        let response = h.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    // ============================================================================
    // /summarize
    // ============================================================================

    #[tokio::test]
    async fn summarize_returns_summary_and_keywords() {
        let h = harness(false, false);

        let (status, json) = post_json(&h.app, "/summarize", r#"{"text": " The sun. "}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["summary"], "summary of  The sun. ");
        assert_eq!(json["keywords"], "alpha, beta");

        let records = ResultsLog::new(h.root.path().join("results.jsonl")).load();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].keywords, "alpha, beta");
    }

    #[tokio::test]
    async fn summarize_failure_hides_details() {
        let h = harness(true, false);

        let (status, json) = post_json(&h.app, "/summarize", r#"{"text": "hello"}"#).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "Failed to generate summary");
        assert_eq!(json["details"], GENERIC_DETAILS);
        assert!(ResultsLog::new(h.root.path().join("results.jsonl")).load().is_empty());
    }

    #[tokio::test]
    async fn summarize_failure_shows_details_in_debug() {
        let h = harness(true, true);

        let (status, json) = post_json(&h.app, "/summarize", r#"{"text": "hello"}"#).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let details = json["details"].as_str().unwrap();
        assert!(details.contains("503"), "{details}");
        assert!(details.contains("model overloaded"), "{details}");
    }

    // ============================================================================
    // /speak
    // ============================================================================

    #[tokio::test]
    async fn speak_writes_file_into_managed_dir() {
        let h = harness(false, false);

        let (status, json) = post_json(&h.app, "/speak", r#"{"text": "Read this aloud"}"#).await;
        assert_eq!(status, StatusCode::OK);

        let audio_url = json["audio_url"].as_str().unwrap();
        let download_url = json["download_url"].as_str().unwrap();
        let name = audio_url.strip_prefix("/static/audio/").unwrap();
        assert!(name.starts_with("tts_") && name.ends_with(".mp3"), "{name}");
        assert_eq!(download_url, format!("/download/{name}"));

        let path = h.store.dir().join(name);
        assert_eq!(std::fs::read(&path).unwrap(), b"ID3fake-mp3");

        // Playback route serves the same bytes inline
        let response = get_raw(&h.app, audio_url).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"ID3fake-mp3");
    }

    #[tokio::test]
    async fn speak_generates_unique_files() {
        let h = harness(false, false);

        let (_, first) = post_json(&h.app, "/speak", r#"{"text": "one"}"#).await;
        let (_, second) = post_json(&h.app, "/speak", r#"{"text": "one"}"#).await;

        assert_ne!(first["audio_url"], second["audio_url"]);
        assert_eq!(std::fs::read_dir(h.store.dir()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn speak_failure_is_500_and_writes_nothing() {
        let h = harness(true, false);

        let (status, json) = post_json(&h.app, "/speak", r#"{"text": "hello"}"#).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "TTS generation failed");
        assert_eq!(json["details"], GENERIC_DETAILS);
        assert_eq!(std::fs::read_dir(h.store.dir()).unwrap().count(), 0);
    }

    // ============================================================================
    // /download
    // ============================================================================

    #[tokio::test]
    async fn download_missing_file_is_404() {
        let h = harness(false, false);

        let response = get_raw(&h.app, "/download/does-not-exist.mp3").await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_bytes(response).await, b"File not found");
    }

    #[tokio::test]
    async fn download_streams_attachment() {
        let h = harness(false, false);
        std::fs::write(h.store.dir().join("tts_abc.mp3"), b"ID3audio").unwrap();

        let response = get_raw(&h.app, "/download/tts_abc.mp3").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert!(
            disposition.starts_with("attachment; filename=\"speech_audio_"),
            "{disposition}"
        );
        assert!(disposition.ends_with(".mp3\""), "{disposition}");
        assert_eq!(body_bytes(response).await, b"ID3audio");

        // Downloading never deletes
        assert!(h.store.dir().join("tts_abc.mp3").exists());
    }

    #[tokio::test]
    async fn partial_files_are_never_served() {
        let h = harness(false, false);
        std::fs::write(h.store.dir().join("tts_abc.mp3.part"), b"ID3half").unwrap();

        for uri in ["/download/tts_abc.mp3.part", "/static/audio/tts_abc.mp3.part"] {
            let response = get_raw(&h.app, uri).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(body_bytes(response).await, b"File not found");
        }
    }

    #[tokio::test]
    async fn playback_is_inline() {
        let h = harness(false, false);
        std::fs::write(h.store.dir().join("tts_abc.mp3"), b"ID3audio").unwrap();

        let response = get_raw(&h.app, "/static/audio/tts_abc.mp3").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
        assert_eq!(response.headers()[header::CONTENT_DISPOSITION], "inline");
        assert_eq!(body_bytes(response).await, b"ID3audio");
    }

    #[tokio::test]
    async fn download_cannot_escape_managed_dir() {
        let h = harness(false, false);
        // Sits next to the managed dir, one level up
        std::fs::write(h.root.path().join("secret.txt"), b"top secret").unwrap();

        for uri in [
            "/download/..%2Fsecret.txt",
            "/download/..%2F..%2Fetc%2Fpasswd",
            "/download/%2Fetc%2Fpasswd",
            "/download/..",
            "/static/audio/../secret.txt",
            "/static/audio/..%2Fsecret.txt",
        ] {
            let response = get_raw(&h.app, uri).await;
            assert_ne!(response.status(), StatusCode::OK, "{uri}");
            let body = body_bytes(response).await;
            assert!(!body.windows(10).any(|w| w == b"top secret"), "{uri}");
        }
    }

    #[tokio::test]
    async fn download_sanitizes_before_lookup() {
        let h = harness(false, false);
        std::fs::write(h.store.dir().join("etc_passwd"), b"inside").unwrap();

        // Traversal collapses to a plain name inside the managed dir
        let response = get_raw(&h.app, "/download/..%2F..%2Fetc%2Fpasswd").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"inside");
    }

    #[tokio::test]
    async fn index_page_is_served() {
        let h = harness(false, false);
        let response = get_raw(&h.app, "/").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(body.contains("<html"));
    }
}
