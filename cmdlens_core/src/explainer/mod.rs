//! # Streaming Explainer
//!
//! Turns the captured output of an approved command into a short
//! plain-language explanation by asking a generative backend.
//!
//! The backend answers with newline-delimited JSON records, each optionally
//! carrying a piece of the response text. Records are decoded one at a time as
//! bytes arrive ([`decoder`]); a record that fails to decode is skipped and
//! never aborts the stream. Only a failed connection, a deadline, or a stream
//! that closes before any usable record surfaces as an [`ExplainError`].
//!
//! The same client also serves free-form generation, where the decoded text
//! pieces are forwarded to the caller as they arrive instead of being
//! accumulated.

mod client;
pub mod decoder;
mod error;
mod prompt;

pub use client::{BackendClient, TextStream};
pub use decoder::{Fragment, FragmentDecoder, StreamAccumulator};
pub use error::ExplainError;
pub use prompt::{ExplainContext, MAX_PROMPT_OUTPUT_BYTES, PromptTemplate};

use async_trait::async_trait;

use crate::retry::{RetryConfig, execute_with_retry};

/// Produces an explanation for one command's output.
#[async_trait]
pub trait Explainer: Send + Sync {
    async fn explain(
        &self,
        template: PromptTemplate,
        context: &ExplainContext,
    ) -> Result<String, ExplainError>;
}

/// [`Explainer`] backed by a streaming generate call.
#[derive(Debug, Clone)]
pub struct StreamingExplainer {
    client: BackendClient,
    retry: Option<RetryConfig>,
}

impl StreamingExplainer {
    pub fn new(client: BackendClient) -> Self {
        Self {
            client,
            retry: None,
        }
    }

    /// Retry transient failures. Off unless set.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = (retry.max_retries > 0).then_some(retry);
        self
    }

    pub fn client(&self) -> &BackendClient {
        &self.client
    }
}

#[async_trait]
impl Explainer for StreamingExplainer {
    async fn explain(
        &self,
        template: PromptTemplate,
        context: &ExplainContext,
    ) -> Result<String, ExplainError> {
        let prompt = template.render(context);
        tracing::debug!(
            command = %context.command,
            ?template,
            prompt_bytes = prompt.len(),
            "Requesting explanation"
        );

        let result = match &self.retry {
            Some(retry) => execute_with_retry(retry, || self.client.generate(&prompt)).await,
            None => self.client.generate(&prompt).await,
        };

        if let Err(e) = &result {
            tracing::warn!(command = %context.command, "Explanation failed: {}", e);
        }
        result
    }
}
