//! Text-to-speech through the Google Translate TTS endpoint.
//!
//! Pipeline:
//! 1. Text → chunks of at most 100 chars (split on sentence ends, then spaces)
//! 2. Chunk → `GET /translate_tts` → MP3 frames
//! 3. MP3 frames concatenated in order into one file

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::SpeechConfig;

/// Longest input the endpoint accepts per request.
const MAX_CHUNK_CHARS: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("nothing to speak")]
    EmptyText,
    #[error("TTS request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("TTS API returned status {status} for chunk {chunk}")]
    Status { status: u16, chunk: usize },
    #[error("TTS API returned no audio")]
    EmptyAudio,
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
}

/// Turns text into MP3 audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError>;
}

pub struct GoogleTts {
    base_url: String,
    lang: String,
    client: Client,
}

impl GoogleTts {
    pub fn new(config: &SpeechConfig) -> Result<Self, SpeechError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(SpeechError::Client)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            lang: config.lang.clone(),
            client,
        })
    }

    async fn fetch_chunk(&self, chunk: &str, index: usize, total: usize) -> Result<Vec<u8>, SpeechError> {
        let url = format!("{}/translate_tts", self.base_url);
        let idx = index.to_string();
        let total = total.to_string();
        let textlen = chunk.chars().count().to_string();

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("ie", "UTF-8"),
                ("q", chunk),
                ("tl", self.lang.as_str()),
                ("total", total.as_str()),
                ("idx", idx.as_str()),
                ("textlen", textlen.as_str()),
                ("client", "tw-ob"),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            warn!("TTS API returned status {status} for chunk {index}");
            return Err(SpeechError::Status {
                status: status.as_u16(),
                chunk: index,
            });
        }

        Ok(resp.bytes().await?.to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        let t_start = Instant::now();
        let chunks = split_chunks(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(SpeechError::EmptyText);
        }

        let mut audio = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let bytes = self.fetch_chunk(chunk, i, chunks.len()).await?;
            debug!("Chunk {}/{}: {} bytes", i + 1, chunks.len(), bytes.len());
            audio.extend_from_slice(&bytes);
        }

        if audio.is_empty() {
            return Err(SpeechError::EmptyAudio);
        }

        let latency_ms = t_start.elapsed().as_secs_f64() * 1000.0;
        info!(
            "Synthesized {} chars in {} chunks → {} bytes ({latency_ms:.0}ms)",
            text.len(),
            chunks.len(),
            audio.len()
        );
        Ok(audio)
    }
}

// --- Helper functions ---

/// Split text into chunks of at most `max_chars` characters.
///
/// Prefers to break after sentence punctuation, then after clause
/// punctuation, then at whitespace. A single word longer than `max_chars`
/// is hard-split at a char boundary.
fn split_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text.trim();

    while !rest.is_empty() {
        if rest.chars().count() <= max_chars {
            chunks.push(rest.to_string());
            break;
        }

        // Byte offset just past the `max_chars`-th char
        let limit = rest
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let window = &rest[..limit];

        let cut = window
            .rfind(|c: char| matches!(c, '.' | '!' | '?' | '\n'))
            .or_else(|| window.rfind(|c: char| matches!(c, ';' | ':' | ',')))
            .map(|i| i + 1)
            .or_else(|| window.rfind(char::is_whitespace).filter(|&i| i > 0))
            .unwrap_or(limit);

        let chunk = rest[..cut].trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        rest = rest[cut..].trim_start();
    }

    chunks
}
