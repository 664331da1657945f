// src/provider/mod.rs — Model provider layer

pub mod openai;
pub mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::infra::errors::TipsError;

/// Core trait that all model providers implement.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn id(&self) -> &str;

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, TipsError>;

    async fn embed(&self, model: &str, texts: &[&str]) -> Result<Vec<Vec<f32>>, TipsError>;
}

#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
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

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    ContentFilter,
    #[default]
    Unknown,
}
