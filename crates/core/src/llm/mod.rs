pub mod cohere;
pub mod error;
pub mod json;
pub mod prompt;

use crate::domain::document::Document;
use crate::error::Result;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    JsonObject,
}

/// Provider-agnostic chat call: ordered messages plus optional retrieval documents.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub documents: Vec<Document>,
    pub response_format: ResponseFormat,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Text of the first generated message.
    pub text: String,
    pub raw_response_json: serde_json::Value,
}

#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse>;
}
