//! Gemini REST client for narrative generation and model listing.

use super::NarrativeService;
use crate::core::error::{GenerationError, GenerationErrorKind};
use crate::core::types::GeminiSettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Generation method a model must support to be usable.
pub const GENERATE_CONTENT: &str = "generateContent";

/// Upper bound on followed model-list pages.
const MAX_MODEL_PAGES: usize = 20;

/// Gemini `generateContent` client authenticated with an API key.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(settings: &GeminiSettings, api_key: &str) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| {
                GenerationError::new(GenerationErrorKind::InvalidRequest, format!("HTTP client: {e}"))
            })?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.trim_start_matches("models/").to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn generate_url(&self) -> String {
        format!("{}/models/{}:{}", self.base_url, self.model, GENERATE_CONTENT)
    }

    /// Models that support `generateContent`, following page tokens.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, GenerationError> {
        let url = format!("{}/models", self.base_url);
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_MODEL_PAGES {
            let mut request = self
                .http
                .get(&url)
                .query(&[("key", self.api_key.as_str()), ("pageSize", "100")]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let response = request.send().await.map_err(transport_error)?;
            let page: ModelsPage = decode(response).await?;

            models.extend(
                page.models
                    .into_iter()
                    .filter(|m| m.supported_generation_methods.iter().any(|g| g == GENERATE_CONTENT)),
            );
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => return Ok(models),
            }
        }
        tracing::warn!(pages = MAX_MODEL_PAGES, "model list page limit reached; list truncated");
        Ok(models)
    }
}

#[async_trait]
impl NarrativeService for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
        };
        let response = self
            .http
            .post(self.generate_url())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let parsed: GenerateResponse = decode(response).await?;
        extract_text(parsed)
    }
}

fn transport_error(e: reqwest::Error) -> GenerationError {
    // the request URL carries the API key
    let e = e.without_url();
    let kind = if e.is_decode() {
        GenerationErrorKind::InvalidResponse
    } else {
        GenerationErrorKind::Network
    };
    GenerationError::new(kind, e.to_string())
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, GenerationError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GenerationError::from_status(status.as_u16(), api_error_message(&body)));
    }
    response.json::<T>().await.map_err(|e| {
        GenerationError::new(
            GenerationErrorKind::InvalidResponse,
            format!("cannot decode response: {}", e.without_url()),
        )
    })
}

/// `error.message` from a Gemini error body, else the raw body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.trim().to_string())
}

fn extract_text(response: GenerateResponse) -> Result<String, GenerationError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(GenerationError::new(
            GenerationErrorKind::Blocked,
            format!("prompt blocked: {reason}"),
        ));
    }
    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(GenerationError::new(GenerationErrorKind::Empty, "no candidates returned"));
    };
    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if !text.trim().is_empty() {
        return Ok(text.trim().to_string());
    }
    match candidate.finish_reason.as_deref() {
        Some(reason @ ("SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT")) => Err(
            GenerationError::new(GenerationErrorKind::Blocked, format!("response blocked: {reason}")),
        ),
        _ => Err(GenerationError::new(GenerationErrorKind::Empty, "candidate has no text")),
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelsPage {
    #[serde(default)]
    models: Vec<ModelInfo>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// A model entry from `GET /models`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    /// Resource name, e.g. `models/gemini-1.5-flash`
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Transient;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GeminiClient {
        let settings = GeminiSettings {
            model: "gemini-1.5-flash".to_string(),
            base_url: server.uri(),
            timeout_secs: 5,
        };
        GeminiClient::new(&settings, "test-key").unwrap()
    }

    #[tokio::test]
    async fn test_generate_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-1.5-flash:generateContent"))
            .and(query_param("key", "test-key"))
            .and(body_string_contains("Resources in VMs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": {"parts": [{"text": "Two VMs "}, {"text": "run Linux.\n"}]},
                    "finishReason": "STOP"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = client(&server).generate("Resources in VMs:\n- vm1").await.unwrap();
        assert_eq!(text, "Two VMs run Linux.");
    }

    #[tokio::test]
    async fn test_generate_blocked_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "promptFeedback": {"blockReason": "SAFETY"}
            })))
            .mount(&server)
            .await;

        let err = client(&server).generate("x").await.unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::Blocked);
        assert!(err.reason.contains("SAFETY"));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_generate_empty_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"candidates": []})))
            .mount(&server)
            .await;

        let err = client(&server).generate("x").await.unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::Empty);
    }

    #[tokio::test]
    async fn test_generate_safety_finish() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"finishReason": "SAFETY"}]
            })))
            .mount(&server)
            .await;

        let err = client(&server).generate("x").await.unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::Blocked);
    }

    #[tokio::test]
    async fn test_generate_rate_limited_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}
            })))
            .mount(&server)
            .await;

        let err = client(&server).generate("x").await.unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::RateLimited);
        assert!(err.is_transient());
        assert_eq!(err.reason, "HTTP 429: Resource has been exhausted");
    }

    #[tokio::test]
    async fn test_generate_bad_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let err = client(&server).generate("x").await.unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::Auth);
        assert_eq!(err.reason, "HTTP 403: forbidden");
    }

    #[tokio::test]
    async fn test_generate_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client(&server).generate("x").await.unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::InvalidResponse);
        assert!(!err.reason.contains("test-key"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network() {
        let settings = GeminiSettings {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            ..GeminiSettings::default()
        };
        let err = GeminiClient::new(&settings, "secret-key")
            .unwrap()
            .generate("x")
            .await
            .unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::Network);
        assert!(!err.reason.contains("secret-key"));
    }

    #[tokio::test]
    async fn test_list_models_filters_and_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [
                    {"name": "models/gemini-1.5-pro", "supportedGenerationMethods": ["generateContent"]}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [
                    {"name": "models/gemini-1.5-flash", "displayName": "Gemini 1.5 Flash",
                     "supportedGenerationMethods": ["generateContent", "countTokens"]},
                    {"name": "models/embedding-001", "supportedGenerationMethods": ["embedContent"]}
                ],
                "nextPageToken": "p2"
            })))
            .mount(&server)
            .await;

        let models = client(&server).list_models().await.unwrap();
        let names: Vec<_> = models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["models/gemini-1.5-flash", "models/gemini-1.5-pro"]);
        assert_eq!(models[0].display_name.as_deref(), Some("Gemini 1.5 Flash"));
    }

    #[tokio::test]
    async fn test_list_models_stops_at_page_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [
                    {"name": "models/gemini-1.5-flash", "supportedGenerationMethods": ["generateContent"]}
                ],
                "nextPageToken": "same-token"
            })))
            .expect(MAX_MODEL_PAGES as u64)
            .mount(&server)
            .await;

        let models = client(&server).list_models().await.unwrap();
        assert_eq!(models.len(), MAX_MODEL_PAGES);
    }

    #[test]
    fn test_model_prefix_stripped() {
        let settings = GeminiSettings {
            model: "models/gemini-1.5-pro".to_string(),
            ..GeminiSettings::default()
        };
        let c = GeminiClient::new(&settings, "k").unwrap();
        assert_eq!(c.model(), "gemini-1.5-pro");
        assert!(c.generate_url().ends_with("/models/gemini-1.5-pro:generateContent"));
    }

    #[test]
    fn test_api_error_message() {
        assert_eq!(api_error_message(r#"{"error":{"message":"API key not valid"}}"#), "API key not valid");
        assert_eq!(api_error_message(" plain text \n"), "plain text");
    }
}
