//! Best-effort decoding of the backend's newline-delimited JSON stream.
//!
//! Network chunks do not line up with records, so bytes are buffered until a
//! newline arrives and each complete line is decoded on its own. Decoding
//! returns a tagged `Fragment`; a bad line is a `Malformed` fragment to skip,
//! never an error that ends the stream.

use bytes::{Buf, BytesMut};
use serde::Deserialize;

use super::error::ExplainError;

/// One decoded line of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// A record carrying non-empty partial-response text.
    Text(String),
    /// A well-formed record with no text (for example the final statistics record).
    NoText,
    /// A well-formed record reporting a backend-side error.
    BackendError(String),
    /// A line that is not a JSON record.
    Malformed(String),
}

impl Fragment {
    pub fn is_parseable(&self) -> bool {
        !matches!(self, Fragment::Malformed(_))
    }

    /// Text carried by this fragment, logging the ones that get skipped.
    pub fn into_text(self) -> Option<String> {
        match self {
            Fragment::Text(text) => Some(text),
            Fragment::NoText => None,
            Fragment::BackendError(message) => {
                tracing::warn!("Generative backend reported an error mid-stream: {}", message);
                None
            }
            Fragment::Malformed(reason) => {
                tracing::debug!("Skipping malformed stream fragment: {}", reason);
                None
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Decode a single line (without its newline). Blank lines yield `None`.
pub fn decode_line(line: &[u8]) -> Option<Fragment> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return None;
    }

    let chunk: GenerateChunk = match serde_json::from_slice(line) {
        Ok(chunk) => chunk,
        Err(e) => return Some(Fragment::Malformed(e.to_string())),
    };

    Some(match (chunk.response, chunk.error) {
        (Some(text), _) if !text.is_empty() => Fragment::Text(text),
        (_, Some(message)) => Fragment::BackendError(message),
        _ => Fragment::NoText,
    })
}

/// Splits an incoming byte stream into decoded fragments.
#[derive(Debug, Default)]
pub struct FragmentDecoder {
    buffer: BytesMut,
}

impl FragmentDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk; returns the fragments completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Fragment> {
        self.buffer.extend_from_slice(chunk);
        let mut fragments = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line = self.buffer.split_to(newline + 1);
            line.truncate(newline);
            if let Some(fragment) = decode_line(&line) {
                fragments.push(fragment);
            }
        }
        fragments
    }

    /// Decode whatever is left once the stream has closed.
    pub fn finish(&mut self) -> Option<Fragment> {
        let rest = self.buffer.split();
        if !rest.has_remaining() {
            return None;
        }
        decode_line(&rest)
    }
}

/// Collects fragment text for one explanation call.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    parseable: usize,
    malformed: usize,
    /// Last error reported by the backend in-stream.
    backend_error: Option<String>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn absorb(&mut self, fragment: Fragment) {
        if let Fragment::BackendError(message) = &fragment {
            self.backend_error = Some(message.clone());
        }
        if fragment.is_parseable() {
            self.parseable += 1;
        } else {
            self.malformed += 1;
        }
        if let Some(text) = fragment.into_text() {
            self.text.push_str(&text);
        }
    }

    pub fn parseable_count(&self) -> usize {
        self.parseable
    }

    pub fn malformed_count(&self) -> usize {
        self.malformed
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Result after the stream closed normally.
    pub fn finish(self) -> Result<String, ExplainError> {
        if self.parseable == 0 {
            return Err(ExplainError::Truncated(format!(
                "stream closed without a parseable fragment ({} malformed)",
                self.malformed
            )));
        }
        let text = self.text.trim();
        if text.is_empty() {
            return Err(match self.backend_error {
                Some(message) => ExplainError::Backend(message),
                None => ExplainError::Empty,
            });
        }
        Ok(text.to_string())
    }

    /// Result after the stream died. Text that already arrived is kept;
    /// otherwise the cause is returned.
    pub fn finish_interrupted(self, cause: ExplainError) -> Result<String, ExplainError> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(self.backend_error.map_or(cause, ExplainError::Backend));
        }
        tracing::warn!(
            chars = text.len(),
            "Stream interrupted after partial content, keeping it: {}",
            cause
        );
        Ok(text.to_string())
    }
}
