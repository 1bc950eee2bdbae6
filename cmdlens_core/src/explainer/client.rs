//! HTTP client for the generative backend's streaming `generate` endpoint.

use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use serde::Serialize;
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

use super::decoder::{FragmentDecoder, StreamAccumulator};
use super::error::ExplainError;

/// Characters of an error body kept in `ExplainError::Status`.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Decoded text pieces of one free-form generation, in arrival order.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ExplainError>> + Send>>;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

/// Shared handle to the backend. Cloning is cheap and reuses the pool.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    generate_url: Url,
    model: String,
    call_timeout: Duration,
}

impl BackendClient {
    pub fn new(
        base_url: &Url,
        model: impl Into<String>,
        connect_timeout: Duration,
        call_timeout: Duration,
    ) -> Result<Self, ExplainError> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ExplainError::Connect(format!("failed to build HTTP client: {e}")))?;
        Self::with_http_client(http, base_url, model, call_timeout)
    }

    /// Use an existing `reqwest::Client` (and its connection pool).
    pub fn with_http_client(
        http: reqwest::Client,
        base_url: &Url,
        model: impl Into<String>,
        call_timeout: Duration,
    ) -> Result<Self, ExplainError> {
        Ok(Self {
            http,
            generate_url: generate_endpoint(base_url)?,
            model: model.into(),
            call_timeout,
        })
    }

    pub fn generate_url(&self) -> &Url {
        &self.generate_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    async fn open(&self, prompt: &str) -> Result<reqwest::Response, ExplainError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: true,
        };
        let response = self
            .http
            .post(self.generate_url.clone())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExplainError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }
        Ok(response)
    }

    /// Run one generation and return the trimmed, accumulated text.
    ///
    /// The whole call, from connect to the end of the body, is bounded by the
    /// call timeout.
    pub async fn generate(&self, prompt: &str) -> Result<String, ExplainError> {
        let deadline = Instant::now() + self.call_timeout;
        let response = match tokio::time::timeout_at(deadline, self.open(prompt)).await {
            Ok(response) => response?,
            Err(_) => return Err(ExplainError::Timeout(self.call_timeout)),
        };

        let mut body = response.bytes_stream();
        let mut decoder = FragmentDecoder::new();
        let mut accumulator = StreamAccumulator::new();

        loop {
            let next = match tokio::time::timeout_at(deadline, body.next()).await {
                Ok(next) => next,
                Err(_) => {
                    return accumulator
                        .finish_interrupted(ExplainError::Timeout(self.call_timeout));
                }
            };
            match next {
                Some(Ok(chunk)) => {
                    for fragment in decoder.push(&chunk) {
                        accumulator.absorb(fragment);
                    }
                }
                Some(Err(e)) => {
                    return accumulator.finish_interrupted(ExplainError::Truncated(e.to_string()));
                }
                None => break,
            }
        }

        if let Some(fragment) = decoder.finish() {
            accumulator.absorb(fragment);
        }
        tracing::debug!(
            parseable = accumulator.parseable_count(),
            malformed = accumulator.malformed_count(),
            "Generation stream closed"
        );
        accumulator.finish()
    }

    /// Start a free-form generation and stream its text pieces as they decode.
    ///
    /// Connecting is bounded by the call timeout; afterwards the call timeout
    /// bounds the silence between two network chunks. A transport error ends
    /// the stream with one `Err` item.
    pub async fn stream_text(&self, prompt: &str) -> Result<TextStream, ExplainError> {
        let response = tokio::time::timeout(self.call_timeout, self.open(prompt))
            .await
            .map_err(|_| ExplainError::Timeout(self.call_timeout))??;

        let state = TextStreamState {
            body: response.bytes_stream().boxed(),
            decoder: FragmentDecoder::new(),
            pending: VecDeque::new(),
            idle_timeout: self.call_timeout,
            finished: false,
        };

        Ok(Box::pin(futures::stream::unfold(state, next_text_piece)))
    }
}

struct TextStreamState {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: FragmentDecoder,
    pending: VecDeque<String>,
    idle_timeout: Duration,
    finished: bool,
}

async fn next_text_piece(
    mut state: TextStreamState,
) -> Option<(Result<String, ExplainError>, TextStreamState)> {
    loop {
        if let Some(text) = state.pending.pop_front() {
            return Some((Ok(text), state));
        }
        if state.finished {
            return None;
        }

        match tokio::time::timeout(state.idle_timeout, state.body.next()).await {
            Ok(Some(Ok(chunk))) => {
                let pieces = state
                    .decoder
                    .push(&chunk)
                    .into_iter()
                    .filter_map(|fragment| fragment.into_text());
                state.pending.extend(pieces);
            }
            Ok(Some(Err(e))) => {
                state.finished = true;
                return Some((Err(ExplainError::Truncated(e.to_string())), state));
            }
            Ok(None) => {
                state.finished = true;
                if let Some(text) = state.decoder.finish().and_then(|f| f.into_text()) {
                    state.pending.push_back(text);
                }
            }
            Err(_) => {
                state.finished = true;
                let timeout = state.idle_timeout;
                return Some((Err(ExplainError::Timeout(timeout)), state));
            }
        }
    }
}

/// `{base}/api/generate`, keeping any path prefix the base URL carries.
fn generate_endpoint(base_url: &Url) -> Result<Url, ExplainError> {
    if !matches!(base_url.scheme(), "http" | "https") {
        return Err(ExplainError::InvalidUrl(format!(
            "unsupported scheme '{}' in {}",
            base_url.scheme(),
            base_url
        )));
    }
    let mut base = base_url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join("api/generate")
        .map_err(|e| ExplainError::InvalidUrl(format!("{base_url}: {e}")))
}
