// src/cli/send.rs — Generate, deduplicate and deliver tips

use std::sync::{Arc, Mutex};

use crate::core::types::{ContentGenerator, DedupPolicy, RejectedCandidate, UniqueContent};
use crate::core::StreamDeduplicator;
use crate::infra::config::{Config, ResolvedStream};
use crate::infra::errors::{DedupError, TipsError};
use crate::infra::paths;
use crate::integrations::telegram::TelegramAdapter;
use crate::integrations::MessagingAdapter;
use crate::memory::embeddings::EmbeddingService;
use crate::memory::store::Store;
use crate::provider::openai::OpenAIProvider;
use crate::provider::retry::{RetryConfig, RetryProvider};
use crate::provider::ModelProvider;
use crate::streams::PromptGenerator;

/// Result of delivering one tip.
#[derive(Debug, Clone)]
pub struct SendReport {
    pub stream: String,
    pub text: String,
    pub verified: bool,
    pub index_id: Option<u64>,
    /// Row id in the tip log, if the log was available.
    pub tip_id: Option<i64>,
    pub message_id: String,
    pub rejected: usize,
}

/// `tipstream send` entry point.
pub async fn run_send(config: &Config, streams: &[String], all: bool) -> anyhow::Result<()> {
    let names: Vec<String> = if all {
        config.streams().into_keys().collect()
    } else if streams.is_empty() {
        anyhow::bail!("Name at least one stream, or pass --all");
    } else {
        streams.to_vec()
    };

    let resolved = names
        .iter()
        .map(|n| resolve(config, n))
        .collect::<Result<Vec<_>, _>>()?;

    paths::ensure_dirs().await?;
    let provider = build_provider(config)?;
    let embedder = Arc::new(build_embedder(config, provider.clone()));
    let adapter = build_telegram(config)?;
    let bot = adapter.validate().await?;
    tracing::debug!("{}", bot);
    let store = open_store();

    let jobs = resolved.into_iter().map(|stream| {
        let provider = provider.clone();
        let embedder = embedder.clone();
        let store = store.clone();
        let adapter = &adapter;
        async move {
            let name = stream.name.clone();
            let result = send_stream(config, stream, provider, embedder, adapter, store).await;
            (name, result)
        }
    });

    let mut failures = 0;
    for (name, result) in futures::future::join_all(jobs).await {
        match result {
            Ok(report) => {
                let check = if report.verified { "checked" } else { "unchecked" };
                println!(
                    "{name}: sent message {} ({check}, {} near-duplicate(s) skipped)",
                    report.message_id, report.rejected
                );
            }
            Err(e) => {
                failures += 1;
                tracing::error!(stream = %name, "Failed to send tip: {:#}", e);
                eprintln!("{name}: {e:#}");
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} stream(s) failed");
    }
    Ok(())
}

async fn send_stream(
    config: &Config,
    stream: ResolvedStream,
    provider: Arc<dyn ModelProvider>,
    embedder: Arc<EmbeddingService>,
    adapter: &dyn MessagingAdapter,
    store: Option<Arc<Mutex<Store>>>,
) -> anyhow::Result<SendReport> {
    // Fail before spending tokens if there is nowhere to deliver.
    let target = std::env::var(&stream.channel_env)
        .map_err(|_| TipsError::MissingEnv(stream.channel_env.clone()))?;

    let policy = DedupPolicy::for_stream(&config.dedup, &stream);
    let dedup =
        StreamDeduplicator::open(&stream.name, &stream.index_path, embedder, policy).await?;
    let generator = PromptGenerator::new(stream, provider);

    deliver_unique_tip(&dedup, &generator, adapter, &target, store).await
}

/// Get a unique tip for the deduplicator's stream, log it and post it.
///
/// The tip log is best effort: a database error is logged and delivery
/// still happens. Near-duplicates are logged even when no unique tip was
/// found.
pub async fn deliver_unique_tip(
    dedup: &StreamDeduplicator,
    generator: &dyn ContentGenerator,
    adapter: &dyn MessagingAdapter,
    target: &str,
    store: Option<Arc<Mutex<Store>>>,
) -> anyhow::Result<SendReport> {
    let stream = dedup.stream().to_string();
    let content = match dedup.get_unique_content(generator).await {
        Ok(content) => content,
        Err(e) => {
            if let (DedupError::GenerationExhausted { rejected, .. }, Some(store)) =
                (&e, store.as_ref())
            {
                if let Ok(guard) = store.lock() {
                    record_similar(&stream, rejected, &guard);
                }
            }
            return Err(e.into());
        }
    };
    let tip_id = record(&stream, &content, store.as_ref());

    let message_id = adapter.send(target, &content.text).await?;
    tracing::info!(stream = %stream, adapter = adapter.id(), message_id = %message_id, "Tip delivered");

    if let (Some(id), Some(store)) = (tip_id, store.as_ref()) {
        if let Ok(s) = store.lock() {
            if let Err(e) = s.mark_delivered(id) {
                tracing::warn!(stream = %stream, "Failed to mark tip {} delivered: {}", id, e);
            }
        }
    }

    Ok(SendReport {
        stream,
        verified: content.is_verified(),
        index_id: content.index_id(),
        rejected: content.rejected().len(),
        text: content.text,
        tip_id,
        message_id,
    })
}

/// Write the accepted tip and any rejected near-duplicates to the tip log.
fn record(
    stream: &str,
    content: &UniqueContent,
    store: Option<&Arc<Mutex<Store>>>,
) -> Option<i64> {
    let guard = store?.lock().ok()?;
    record_similar(stream, &content.rejected(), &guard);
    match guard.insert_tip(stream, content.index_id(), &content.text) {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::warn!(stream = %stream, "Failed to log tip: {}", e);
            None
        }
    }
}

fn record_similar(stream: &str, rejected: &[RejectedCandidate], store: &Store) {
    for r in rejected {
        if let Err(e) = store.insert_similar_tip(stream, r.matched_id, r.score, &r.text) {
            tracing::warn!(stream = %stream, "Failed to log similar tip: {}", e);
        }
    }
}

pub(crate) fn resolve(config: &Config, name: &str) -> Result<ResolvedStream, TipsError> {
    config
        .resolve_stream(name)
        .ok_or_else(|| TipsError::UnknownStream {
            name: name.to_string(),
            known: config.streams().into_keys().collect::<Vec<_>>().join(", "),
        })
}

/// OpenAI-compatible provider from the configured key, wrapped in retries.
pub(crate) fn build_provider(config: &Config) -> Result<Arc<dyn ModelProvider>, TipsError> {
    let key_env = &config.provider.api_key_env;
    let api_key =
        std::env::var(key_env).map_err(|_| TipsError::MissingEnv(key_env.clone()))?;
    let inner: Arc<dyn ModelProvider> = Arc::new(OpenAIProvider::with_base_url(
        api_key,
        config.provider.base_url.clone(),
    ));
    Ok(Arc::new(RetryProvider::with_config(
        inner,
        RetryConfig::from(&config.provider.retry),
    )))
}

pub(crate) fn build_embedder(
    config: &Config,
    provider: Arc<dyn ModelProvider>,
) -> EmbeddingService {
    let service = EmbeddingService::new(provider, config.provider.embedding_model.clone());
    match config.provider.embedding_dimension {
        Some(dim) => service.with_dimension(dim),
        None => service,
    }
}

fn build_telegram(config: &Config) -> Result<TelegramAdapter, TipsError> {
    let env = &config.telegram.bot_token_env;
    let token = std::env::var(env).map_err(|_| TipsError::MissingEnv(env.clone()))?;
    Ok(TelegramAdapter::new(token).with_parse_mode(config.telegram.parse_mode.clone()))
}

/// Tip log, or `None` if the database can't be opened.
pub(crate) fn open_store() -> Option<Arc<Mutex<Store>>> {
    match Store::open(&paths::db_path()) {
        Ok(s) => Some(Arc::new(Mutex::new(s))),
        Err(e) => {
            tracing::warn!("Tip log unavailable: {}", e);
            None
        }
    }
}
