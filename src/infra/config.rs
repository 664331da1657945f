// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::infra::errors::TipsError;
use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub dedup: DedupConfig,

    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Streams declared in config.toml. Merged over the built-in streams
    /// by [`Config::streams`].
    #[serde(default)]
    pub streams: BTreeMap<String, StreamConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub chat_model: String,
    pub embedding_model: String,
    /// Expected embedding dimension. The provider is always asked and its
    /// dimension wins if the two disagree.
    #[serde(default)]
    pub embedding_dimension: Option<usize>,
    #[serde(default)]
    pub retry: RetrySettings,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            chat_model: "gpt-4-turbo".into(),
            embedding_model: "text-embedding-3-small".into(),
            embedding_dimension: None,
            retry: RetrySettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 2_000,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    pub similarity_threshold: f32,
    pub max_attempts: u32,
    pub empty_backoff_ms: u64,
    pub duplicate_backoff_ms: u64,
    /// End-to-end deadline for one deduplicated generation. 0 disables it.
    pub timeout_seconds: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.95,
            max_attempts: 5,
            empty_backoff_ms: 2_000,
            duplicate_backoff_ms: 1_000,
            timeout_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token_env: String,
    pub parse_mode: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token_env: "TELEGRAM_BOT_TOKEN".into(),
            parse_mode: "MarkdownV2".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Append log output to this file instead of stderr.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// One topic stream: how to prompt for it and where its tips go.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// System prompt (minijinja template; `level` and `variant` in scope).
    pub system_prompt: String,
    /// User prompt (minijinja template; `level` and `variant` in scope).
    pub user_prompt: String,
    #[serde(default = "default_levels")]
    pub levels: Vec<String>,
    #[serde(default)]
    pub variants: Vec<String>,
    /// Overrides `provider.chat_model`.
    #[serde(default)]
    pub model: Option<String>,
    /// Overrides `dedup.similarity_threshold`.
    #[serde(default)]
    pub similarity_threshold: Option<f32>,
    /// Overrides `dedup.max_attempts`.
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// Defaults to `<data_dir>/indexes/<stream>_tips.index`.
    #[serde(default)]
    pub index_file: Option<PathBuf>,
    /// Environment variable holding the Telegram chat id.
    #[serde(default)]
    pub channel_env: Option<String>,
}

fn default_levels() -> Vec<String> {
    vec!["Professional".into(), "Basic".into(), "Advanced".into()]
}

/// Per-stream settings after defaults and overrides are applied.
#[derive(Debug, Clone)]
pub struct ResolvedStream {
    pub name: String,
    pub prompt: StreamConfig,
    pub model: String,
    pub similarity_threshold: f32,
    pub max_attempts: u32,
    pub index_path: PathBuf,
    pub channel_env: String,
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let mut thresholds = vec![("dedup", self.dedup.similarity_threshold)];
        for (name, s) in &self.streams {
            if let Some(t) = s.similarity_threshold {
                thresholds.push((name.as_str(), t));
            }
        }
        for (scope, t) in thresholds {
            if !(0.0..=1.0).contains(&t) {
                return Err(TipsError::Config(format!(
                    "similarity_threshold for '{scope}' must be in [0, 1], got {t}"
                ))
                .into());
            }
        }
        if self.dedup.max_attempts == 0 {
            return Err(TipsError::Config("dedup.max_attempts must be at least 1".into()).into());
        }
        Ok(())
    }

    /// Built-in streams with config.toml entries layered on top.
    pub fn streams(&self) -> BTreeMap<String, StreamConfig> {
        let mut all = builtin_streams();
        for (name, stream) in &self.streams {
            all.insert(name.clone(), stream.clone());
        }
        all
    }

    pub fn resolve_stream(&self, name: &str) -> Option<ResolvedStream> {
        let prompt = self.streams().remove(name)?;
        Some(ResolvedStream {
            name: name.to_string(),
            model: prompt
                .model
                .clone()
                .unwrap_or_else(|| self.provider.chat_model.clone()),
            similarity_threshold: prompt
                .similarity_threshold
                .unwrap_or(self.dedup.similarity_threshold),
            max_attempts: prompt.max_attempts.unwrap_or(self.dedup.max_attempts).max(1),
            index_path: prompt
                .index_file
                .clone()
                .unwrap_or_else(|| paths::index_path(name)),
            channel_env: prompt
                .channel_env
                .clone()
                .unwrap_or_else(|| format!("{}_CHANNEL_ID", name.to_uppercase())),
            prompt,
        })
    }
}

const CODE_TIP_RULES: &str = "Format your response in this exact structure:\n\
1. Start with the level in bold: *Level: #Basic* or *Level: #Advanced* or *Level: #Professional*\n\
2. Add a brief explanation of the tip in bold and then the next line.\n";

/// The four streams the bot has always shipped with.
pub fn builtin_streams() -> BTreeMap<String, StreamConfig> {
    let mut streams = BTreeMap::new();

    streams.insert(
        "python".to_string(),
        builtin(
            format!(
                "You are a Daily Python Tricks channel. {CODE_TIP_RULES}\
3. Always include a code example using this exact format:\n\
```python\n# Your code here\n# Add comments with output if needed\n```\n\
4. Do not add any additional text after the code example\n\
5. Make sure code examples are practical and executable\n\
6. Use proper Python formatting and indentation in code examples\n\
7. Use emojis extensively in the text\n\
8. Do not repeat the same tip"
            ),
            "Give me today's {{ level }} Python tip. Ensure it is unique.",
            vec![],
        ),
    );

    streams.insert(
        "js".to_string(),
        builtin(
            format!(
                "You are a Daily {{{{ variant }}}} Tips channel. {CODE_TIP_RULES}\
3. Always include a code example using this exact format:\n\
```{{{{ variant | lower }}}}\n// Your code here\n// Add comments with output if needed\n```\n\
4. Make sure code examples are practical and executable\n\
5. Use proper formatting and indentation in code examples\n\
6. Use emojis extensively in the text\n\
7. Do not repeat the same tip\n\
8. Include modern features and best practices"
            ),
            "Give me today's {{ level }} {{ variant }} tip.",
            vec!["JavaScript".into(), "TypeScript".into()],
        ),
    );

    streams.insert(
        "trader".to_string(),
        builtin(
            "You are a Daily Trading Tips channel. Format your response in this exact structure:\n\
1. Start with the level in bold: *Level: #Basic* or *Level: #Advanced* or *Level: #Professional*\n\
2. Add a brief explanation of the trading concept, strategy, or tip in bold\n\
3. Provide practical examples or scenarios\n\
4. Include relevant trading terminology\n\
5. Add risk management considerations if applicable\n\
6. Use emojis extensively in the text\n\
7. Do not repeat the same tip\n\
8. Keep it concise and practical"
                .to_string(),
            "Give me today's {{ level }} trading tip.",
            vec![],
        ),
    );

    streams.insert(
        "blockchain".to_string(),
        builtin(
            format!(
                "You are a Daily Blockchain Tricks channel. {CODE_TIP_RULES}\
{{% if variant == \"code\" %}}\
3. Always include a code example using this exact format:\n\
```solidity\n// Your code here\n// Add comments with output if needed\n```\n\
4. Do not add any additional text after the code example\n\
5. Use emojis extensively in the text\n\
6. Do not repeat the same tip\
{{% else %}}\
3. Use emojis extensively in the text\n\
4. Do not repeat the same tip\
{{% endif %}}"
            ),
            "Give me today's {{ level }} Blockchain tip. Ensure it is unique.",
            vec!["code".into(), "prose".into()],
        ),
    );

    streams
}

fn builtin(system_prompt: String, user_prompt: &str, variants: Vec<String>) -> StreamConfig {
    StreamConfig {
        system_prompt,
        user_prompt: user_prompt.to_string(),
        levels: default_levels(),
        variants,
        model: None,
        similarity_threshold: None,
        max_attempts: None,
        index_file: None,
        channel_env: None,
    }
}
