use crate::config::Settings;
use crate::domain::document::Document;
use crate::error::{PipelineError, Result};
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::{ChatBackend, ChatMessage, ChatRequest, ChatResponse, ResponseFormat};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const PROVIDER: &str = "cohere";
const DEFAULT_BASE_URL: &str = "https://api.cohere.com";
const DEFAULT_MODEL: &str = "command-r-plus-08-2024";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct CohereClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: Option<u32>,
    timeout: Duration,
}

impl CohereClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_cohere_api_key()?.to_string();
        let base_url =
            std::env::var("COHERE_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("COHERE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let max_tokens = std::env::var("COHERE_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok());

        let timeout_secs = std::env::var("COHERE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Self::new(api_key, base_url, Duration::from_secs(timeout_secs))?
            .with_model(model)
            .with_max_tokens(max_tokens))
    }

    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: None,
            timeout,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn diagnostics(
        stage: &'static str,
        detail: String,
        raw_output: Option<String>,
        raw_response_json: Option<Value>,
    ) -> PipelineError {
        LlmDiagnosticsError {
            provider: PROVIDER,
            stage,
            detail,
            raw_output,
            raw_response_json,
        }
        .into()
    }

    fn map_request_error(&self, err: reqwest::Error) -> PipelineError {
        if err.is_timeout() {
            PipelineError::GenerationTimeout {
                provider: PROVIDER,
                timeout: self.timeout,
            }
        } else {
            Self::diagnostics("request", err.to_string(), None, None)
        }
    }

    fn build_request<'a>(&'a self, request: &'a ChatRequest) -> ChatV2Request<'a> {
        ChatV2Request {
            model: &self.model,
            messages: &request.messages,
            documents: request.documents.iter().map(wire_document).collect(),
            response_format: match request.response_format {
                ResponseFormat::JsonObject => Some(WireResponseFormat { kind: "json_object" }),
                ResponseFormat::Text => None,
            },
            max_tokens: self.max_tokens,
        }
    }

    async fn create_chat(&self, req: &ChatV2Request<'_>) -> Result<(Value, ChatV2Response)> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| Self::diagnostics("request", format!("invalid API key header: {e}"), None, None))?;
        headers.insert(AUTHORIZATION, bearer);

        let url = format!("{}/v2/chat", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(req)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let status = res.status();
        let text = res.text().await.map_err(|e| self.map_request_error(e))?;
        if !status.is_success() {
            let raw_response_json = serde_json::from_str::<Value>(&text).ok();
            return Err(Self::diagnostics(
                "http",
                format!("status={status}"),
                Some(text),
                raw_response_json,
            ));
        }

        let raw_json = serde_json::from_str::<Value>(&text).map_err(|e| {
            Self::diagnostics(
                "decode",
                format!("response is not JSON: {e}"),
                Some(text.clone()),
                None,
            )
        })?;
        let parsed = serde_json::from_value::<ChatV2Response>(raw_json.clone()).map_err(|e| {
            Self::diagnostics(
                "decode",
                format!("failed to decode chat response: {e}"),
                Some(text),
                Some(raw_json.clone()),
            )
        })?;
        Ok((raw_json, parsed))
    }

    fn first_text(res: &ChatV2Response) -> Option<&str> {
        res.message
            .content
            .iter()
            .find_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Unknown => None,
            })
    }
}

#[async_trait::async_trait]
impl ChatBackend for CohereClient {
    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let req = self.build_request(request);
        let (raw_json, res) = self.create_chat(&req).await?;

        if matches!(res.finish_reason.as_deref(), Some("MAX_TOKENS")) {
            tracing::warn!(
                model = %self.model,
                max_tokens = ?self.max_tokens,
                "Cohere finish_reason=MAX_TOKENS; output may be truncated"
            );
        }

        match Self::first_text(&res) {
            Some(text) => Ok(ChatResponse {
                text: text.to_string(),
                raw_response_json: raw_json,
            }),
            None => Err(Self::diagnostics(
                "empty_response",
                "response contained no text content".to_string(),
                None,
                Some(raw_json),
            )),
        }
    }
}

/// Objects go out as `{"data": {...}}`, strings as-is, anything else stringified.
fn wire_document(document: &Document) -> WireDocument<'_> {
    match document.as_value() {
        Value::Object(map) => WireDocument::Data { data: map },
        Value::String(text) => WireDocument::Text(text.clone()),
        other => WireDocument::Text(other.to_string()),
    }
}

#[derive(Debug, Serialize)]
struct ChatV2Request<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    documents: Vec<WireDocument<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<WireResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WireDocument<'a> {
    Text(String),
    Data {
        data: &'a serde_json::Map<String, Value>,
    },
}

#[derive(Debug, Serialize)]
struct WireResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatV2Response {
    message: AssistantMessage,

    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(other)]
    Unknown,
}
