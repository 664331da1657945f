// src/provider/openai.rs — OpenAI-compatible chat + embeddings provider

use async_trait::async_trait;

use super::{ChatRequest, ChatResponse, ModelProvider, Role, StopReason, TokenUsage};
use crate::infra::errors::TipsError;

pub struct OpenAIProvider {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
}

impl OpenAIProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, "https://api.openai.com/v1".into())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn transport_error(e: reqwest::Error) -> TipsError {
        TipsError::Provider {
            provider: "openai".into(),
            message: e.to_string(),
            retriable: e.is_timeout() || e.is_connect(),
        }
    }

    /// POST a JSON body and return the parsed JSON response, mapping HTTP
    /// failures onto provider errors.
    async fn post_json(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, TipsError> {
        let response = self
            .client
            .post(format!("{}/{endpoint}", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(Self::transport_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(5000);
            return Err(TipsError::RateLimited {
                provider: "openai".into(),
                retry_after_ms,
            });
        }

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(TipsError::Provider {
                provider: "openai".into(),
                message: format!("HTTP {}: {}", status, error_body),
                retriable: status.is_server_error(),
            });
        }

        response.json().await.map_err(|e| TipsError::Provider {
            provider: "openai".into(),
            message: format!("Failed to parse {endpoint} response: {}", e),
            retriable: false,
        })
    }
}

#[async_trait]
impl ModelProvider for OpenAIProvider {
    fn id(&self) -> &str {
        "openai"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, TipsError> {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                serde_json::json!({ "role": role, "content": m.content })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if let Some(temp) = request.temperature {
            body["temperature"] = serde_json::json!(temp);
        }

        let resp = self.post_json("chat/completions", &body).await?;
        Ok(parse_chat_response(&resp))
    }

    async fn embed(&self, model: &str, texts: &[&str]) -> Result<Vec<Vec<f32>>, TipsError> {
        let body = serde_json::json!({
            "model": model,
            "input": texts,
        });

        let resp = self.post_json("embeddings", &body).await?;
        parse_embedding_response(&resp)
    }
}

fn parse_chat_response(resp: &serde_json::Value) -> ChatResponse {
    let choice = &resp["choices"][0];
    let content = choice["message"]["content"]
        .as_str()
        .unwrap_or("")
        .trim()
        .to_string();

    let usage = TokenUsage {
        input_tokens: resp["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        output_tokens: resp["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
    };

    let stop_reason = match choice["finish_reason"].as_str() {
        Some("stop") => StopReason::EndTurn,
        Some("length") => StopReason::MaxTokens,
        Some("content_filter") => StopReason::ContentFilter,
        _ => StopReason::Unknown,
    };

    ChatResponse {
        content,
        usage,
        stop_reason,
    }
}

/// Embeddings come back tagged with their input `index`; order by it so the
/// output lines up with the request.
fn parse_embedding_response(resp: &serde_json::Value) -> Result<Vec<Vec<f32>>, TipsError> {
    let data = resp["data"].as_array().ok_or_else(|| TipsError::Provider {
        provider: "openai".into(),
        message: "Embedding response has no data array".into(),
        retriable: false,
    })?;

    let mut indexed: Vec<(u64, Vec<f32>)> = data
        .iter()
        .enumerate()
        .map(|(pos, d)| {
            let idx = d["index"].as_u64().unwrap_or(pos as u64);
            let vector = d["embedding"]
                .as_array()
                .map(|values| {
                    values
                        .iter()
                        .map(|v| v.as_f64().map(|f| f as f32).unwrap_or(f32::NAN))
                        .collect()
                })
                .unwrap_or_default();
            (idx, vector)
        })
        .collect();
    indexed.sort_by_key(|(idx, _)| *idx);

    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}
