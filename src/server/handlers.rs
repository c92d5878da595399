use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::AppState;
use crate::consts::STATUS_TEXT;
use crate::relay::RelayError;

/// Incoming `POST /chat` body.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub query: Option<String>,
}

impl ChatRequest {
    /// Lenient parse: malformed JSON and non-objects yield a request
    /// without a query. See [`query_text`] for how values become text.
    pub fn from_body(body: &[u8]) -> Self {
        let query = serde_json::from_slice::<Value>(body)
            .ok()
            .and_then(|value| value.get("query").and_then(query_text));
        Self { query }
    }
}

/// Turn a `query` value into prompt text.
///
/// `null`, `0`, `false`, `[]` and `{}` count as missing. An empty string is
/// kept so the relay can reject it. Strings pass through; `true` becomes
/// `True`; other numbers, arrays and objects keep their JSON text.
pub fn query_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::Bool(true) => Some("True".to_string()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::Array(items) if items.is_empty() => None,
        Value::Object(fields) if fields.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = match self {
            RelayError::BadRequest => StatusCode::BAD_REQUEST,
            RelayError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorBody { error: self.message() })).into_response()
    }
}

pub async fn index_handler() -> &'static str {
    STATUS_TEXT
}

pub async fn chat_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ChatResponse>, RelayError> {
    let request = ChatRequest::from_body(&body);
    let response = state.relay.chat(request.query.as_deref()).await?;
    Ok(Json(ChatResponse { response }))
}
