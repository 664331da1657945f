// src/streams/mod.rs — Per-stream prompt generators

use std::sync::Arc;

use async_trait::async_trait;
use minijinja::{context, Environment};

use crate::core::types::ContentGenerator;
use crate::infra::config::ResolvedStream;
use crate::infra::errors::TipsError;
use crate::provider::{ChatRequest, Message, ModelProvider};

/// Rendered prompt pair for one generation.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPrompt {
    pub level: String,
    pub variant: String,
    pub system: String,
    pub user: String,
}

/// Asks a chat model for a tip using the stream's prompt templates.
///
/// Each call picks a fresh random level and variant, so retries after a
/// duplicate are not re-asking the identical question.
pub struct PromptGenerator {
    stream: ResolvedStream,
    provider: Arc<dyn ModelProvider>,
}

impl PromptGenerator {
    pub fn new(stream: ResolvedStream, provider: Arc<dyn ModelProvider>) -> Self {
        Self { stream, provider }
    }

    pub fn render(&self, level: &str, variant: &str) -> Result<RenderedPrompt, TipsError> {
        render_prompt(&self.stream, level, variant)
    }

    fn pick(options: &[String]) -> String {
        if options.is_empty() {
            return String::new();
        }
        options[random_index(options.len())].clone()
    }
}

pub fn render_prompt(
    stream: &ResolvedStream,
    level: &str,
    variant: &str,
) -> Result<RenderedPrompt, TipsError> {
    let env = Environment::new();
    let ctx = context! { level => level, variant => variant, stream => &stream.name };
    Ok(RenderedPrompt {
        level: level.to_string(),
        variant: variant.to_string(),
        system: env.render_str(&stream.prompt.system_prompt, &ctx)?,
        user: env.render_str(&stream.prompt.user_prompt, &ctx)?,
    })
}

/// Uniform index in `0..len` from OS randomness; 0 if the OS source fails.
fn random_index(len: usize) -> usize {
    let mut buf = [0u8; 8];
    if getrandom::getrandom(&mut buf).is_err() {
        return 0;
    }
    (u64::from_le_bytes(buf) % len as u64) as usize
}

#[async_trait]
impl ContentGenerator for PromptGenerator {
    async fn generate(&self) -> Result<String, TipsError> {
        let level = Self::pick(&self.stream.prompt.levels);
        let variant = Self::pick(&self.stream.prompt.variants);
        let prompt = self.render(&level, &variant)?;

        tracing::info!(
            stream = %self.stream.name,
            model = %self.stream.model,
            level = %prompt.level,
            variant = %prompt.variant,
            "Requesting tip"
        );

        let response = self
            .provider
            .chat(ChatRequest {
                model: self.stream.model.clone(),
                messages: vec![Message::system(prompt.system), Message::user(prompt.user)],
                ..Default::default()
            })
            .await?;

        let content = response.content.trim().to_string();
        if content.is_empty() {
            return Err(TipsError::EmptyGeneration {
                stream: self.stream.name.clone(),
            });
        }
        tracing::info!(
            stream = %self.stream.name,
            tokens = response.usage.total(),
            "Received tip content (length: {})",
            content.len()
        );
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::config::Config;
    use crate::provider::{ChatResponse, Role, StopReason, TokenUsage};
    use std::sync::Mutex;

    fn stream(name: &str) -> ResolvedStream {
        Config::default().resolve_stream(name).unwrap()
    }

    #[test]
    fn test_render_python_prompt() {
        let p = render_prompt(&stream("python"), "Advanced", "").unwrap();
        assert!(p.system.starts_with("You are a Daily Python Tricks channel."));
        assert!(p.system.contains("```python"));
        assert_eq!(
            p.user,
            "Give me today's Advanced Python tip. Ensure it is unique."
        );
    }

    #[test]
    fn test_render_js_prompt_uses_variant() {
        let p = render_prompt(&stream("js"), "Basic", "TypeScript").unwrap();
        assert!(p.system.starts_with("You are a Daily TypeScript Tips channel."));
        assert!(p.system.contains("```typescript"));
        assert_eq!(p.user, "Give me today's Basic TypeScript tip.");
    }

    #[test]
    fn test_render_blockchain_prompt_variants() {
        let with_code = render_prompt(&stream("blockchain"), "Basic", "code").unwrap();
        assert!(with_code.system.contains("```solidity"));
        let prose = render_prompt(&stream("blockchain"), "Basic", "prose").unwrap();
        assert!(!prose.system.contains("```solidity"));
        assert!(prose.system.contains("3. Use emojis extensively in the text"));
    }

    #[test]
    fn test_bad_template_is_error() {
        let mut s = stream("trader");
        s.prompt.user_prompt = "{{ level ".into();
        assert!(matches!(
            render_prompt(&s, "Basic", ""),
            Err(TipsError::Template(_))
        ));
    }

    #[test]
    fn test_random_index_in_range() {
        for _ in 0..100 {
            assert!(random_index(3) < 3);
        }
    }

    #[tokio::test]
    async fn test_generate_sends_system_and_user_messages() {
        let provider = Arc::new(RecordingProvider::new("  *Level: #Basic* tip \n"));
        let generator = PromptGenerator::new(stream("trader"), provider.clone());
        let tip = generator.generate().await.unwrap();
        assert_eq!(tip, "*Level: #Basic* tip");

        let seen = provider.requests.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].model, "gpt-4-turbo");
        assert_eq!(seen[0].messages[0].role, Role::System);
        assert_eq!(seen[0].messages[1].role, Role::User);
        assert!(seen[0].messages[1].content.ends_with("trading tip."));
    }

    #[tokio::test]
    async fn test_generate_blank_reply_is_error() {
        let provider = Arc::new(RecordingProvider::new("   "));
        let generator = PromptGenerator::new(stream("python"), provider);
        assert!(matches!(
            generator.generate().await,
            Err(TipsError::EmptyGeneration { .. })
        ));
    }

    struct RecordingProvider {
        reply: String,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl RecordingProvider {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                requests: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl ModelProvider for RecordingProvider {
        fn id(&self) -> &str {
            "recording"
        }
        async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, TipsError> {
            self.requests.lock().unwrap().push(req);
            Ok(ChatResponse {
                content: self.reply.clone(),
                usage: TokenUsage::default(),
                stop_reason: StopReason::EndTurn,
            })
        }
        async fn embed(&self, _model: &str, _texts: &[&str]) -> Result<Vec<Vec<f32>>, TipsError> {
            Ok(vec![])
        }
    }
}
