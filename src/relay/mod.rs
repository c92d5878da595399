//! The chat relay: validate a query, wrap it in the farmer preamble,
//! forward it to a [`Generator`] once, hand back the text untouched.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::consts::NO_QUERY_MESSAGE;
use crate::generator::Generator;
use crate::prompts::farmer::build_farmer_prompt;

/// Why a relayed chat failed. Each variant maps to one HTTP status.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Missing or empty query. Nothing was sent upstream.
    #[error("No query provided")]
    BadRequest,
    /// The generator failed; carries its message as-is.
    #[error("{0}")]
    Upstream(String),
}

impl RelayError {
    /// Message shown to the client.
    pub fn message(&self) -> String {
        match self {
            RelayError::BadRequest => NO_QUERY_MESSAGE.to_string(),
            RelayError::Upstream(message) => message.clone(),
        }
    }
}

/// Forwards chat queries to a generator. Built once at startup and shared.
pub struct ChatRelay {
    generator: Arc<dyn Generator>,
}

impl ChatRelay {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Relay one query. Empty or absent queries never reach the generator.
    pub async fn chat(&self, query: Option<&str>) -> Result<String, RelayError> {
        let query = match query {
            Some(q) if !q.is_empty() => q,
            _ => return Err(RelayError::BadRequest),
        };

        let prompt = build_farmer_prompt(query);
        debug!(
            query_len = query.len(),
            generator = self.generator.name(),
            "relaying query"
        );

        self.generator.generate(&prompt).await.map_err(|e| {
            let message = format!("{e:#}");
            warn!(error = %message, "generator failed");
            RelayError::Upstream(message)
        })
    }
}
