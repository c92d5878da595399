use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Generator;
use crate::consts::{DEFAULT_GEMINI_BASE_URL, DEFAULT_MODEL};

/// A generator that calls the Gemini `generateContent` REST endpoint.
pub struct GeminiGenerator {
    model: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiGenerator {
    /// Build a generator for `model` (or [`DEFAULT_MODEL`]).
    /// Fails on an empty key so a misconfigured server never starts.
    pub fn new(api_key: String, model: Option<String>) -> Result<Self> {
        if api_key.trim().is_empty() {
            bail!("Gemini API key is empty. Set GOOGLE_API_KEY or pass --api-key.");
        }
        Ok(Self {
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_key,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        })
    }

    /// Point the generator at a different API host (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    fn build_request(prompt: &str) -> ApiRequest<'_> {
        ApiRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        }
    }

    /// Join the text parts of the first candidate.
    fn parse_response(resp: ApiResponse) -> Result<String> {
        let candidate = resp.candidates.into_iter().next();

        let text: String = candidate
            .as_ref()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if !text.is_empty() {
            return Ok(text);
        }

        if let Some(reason) = resp.prompt_feedback.and_then(|f| f.block_reason) {
            bail!("Gemini API returned no text (prompt blocked: {})", reason);
        }
        if let Some(reason) = candidate.and_then(|c| c.finish_reason) {
            bail!("Gemini API returned no text (finish reason: {})", reason);
        }
        bail!("Gemini API returned empty response")
    }

    /// Prefer the API's own error message over the raw body.
    fn error_message(body: &str) -> String {
        serde_json::from_str::<ApiErrorBody>(body)
            .ok()
            .and_then(|e| e.error.message)
            .unwrap_or_else(|| body.to_string())
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = Self::build_request(prompt);

        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!(
                "Gemini API error ({}): {}",
                status,
                Self::error_message(&text)
            );
        }

        let api_resp: ApiResponse = resp.json().await?;

        if let Some(usage) = &api_resp.usage_metadata {
            debug!(
                prompt_tokens = usage.prompt_token_count,
                output_tokens = usage.candidates_token_count,
                "gemini usage"
            );
        }

        Self::parse_response(api_resp)
    }
}

// --- API types ---

#[derive(Serialize)]
struct ApiRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<String> {
        let resp: ApiResponse = serde_json::from_str(json).unwrap();
        GeminiGenerator::parse_response(resp)
    }

    #[test]
    fn new_rejects_empty_key() {
        assert!(GeminiGenerator::new(String::new(), None).is_err());
        assert!(GeminiGenerator::new("   ".to_string(), None).is_err());
    }

    #[test]
    fn new_defaults_model() {
        let generator = GeminiGenerator::new("key".to_string(), None).unwrap();
        assert_eq!(generator.model(), DEFAULT_MODEL);
    }

    #[test]
    fn endpoint_uses_model_and_base() {
        let generator = GeminiGenerator::new("key".to_string(), Some("gemini-test".to_string()))
            .unwrap()
            .with_base_url("http://localhost:9999/");
        assert_eq!(
            generator.endpoint(),
            "http://localhost:9999/v1beta/models/gemini-test:generateContent"
        );
    }

    #[test]
    fn request_body_shape() {
        let body = GeminiGenerator::build_request("hello");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"contents": [{"parts": [{"text": "hello"}]}]})
        );
    }

    #[test]
    fn parse_single_part() {
        let json = r#"{
            "candidates": [{
                "content": {"parts": [{"text": "Use compost."}], "role": "model"},
                "finishReason": "STOP"
            }]
        }"#;
        assert_eq!(parse(json).unwrap(), "Use compost.");
    }

    #[test]
    fn parse_joins_parts() {
        let json = r#"{
            "candidates": [{
                "content": {"parts": [{"text": "Water "}, {"text": "at dawn."}]}
            }]
        }"#;
        assert_eq!(parse(json).unwrap(), "Water at dawn.");
    }

    #[test]
    fn parse_uses_first_candidate_only() {
        let json = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "first"}]}},
                {"content": {"parts": [{"text": "second"}]}}
            ]
        }"#;
        assert_eq!(parse(json).unwrap(), "first");
    }

    #[test]
    fn parse_keeps_text_verbatim() {
        let json = r#"{"candidates": [{"content": {"parts": [{"text": "  spaced\n"}]}}]}"#;
        assert_eq!(parse(json).unwrap(), "  spaced\n");
    }

    #[test]
    fn parse_no_candidates_fails() {
        let err = parse(r#"{"candidates": []}"#).unwrap_err();
        assert!(err.to_string().contains("empty response"));
    }

    #[test]
    fn parse_blocked_prompt_reports_reason() {
        let json = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let err = parse(json).unwrap_err();
        assert!(err.to_string().contains("prompt blocked: SAFETY"));
    }

    #[test]
    fn parse_empty_candidate_reports_finish_reason() {
        let json = r#"{"candidates": [{"finishReason": "RECITATION"}]}"#;
        let err = parse(json).unwrap_err();
        assert!(err.to_string().contains("finish reason: RECITATION"));
    }

    #[test]
    fn parse_ignores_usage_metadata() {
        let json = r#"{
            "candidates": [{"content": {"parts": [{"text": "ok"}]}}],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 3, "totalTokenCount": 15}
        }"#;
        assert_eq!(parse(json).unwrap(), "ok");
    }

    #[test]
    fn error_message_prefers_api_message() {
        let body = r#"{"error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(
            GeminiGenerator::error_message(body),
            "Resource has been exhausted"
        );
    }

    #[test]
    fn error_message_falls_back_to_body() {
        assert_eq!(GeminiGenerator::error_message("bad gateway"), "bad gateway");
    }
}
