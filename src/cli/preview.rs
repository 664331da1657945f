// src/cli/preview.rs — Dry run of the generate/check loop

use std::sync::Arc;

use crate::core::types::{AttemptOutcome, DedupPolicy, UniqueContent, Verdict};
use crate::core::StreamDeduplicator;
use crate::infra::config::Config;
use crate::streams::PromptGenerator;

use super::send::{build_embedder, build_provider, resolve};

/// Generate a tip against the stream's real index without saving anything
/// or posting it anywhere.
pub async fn run_preview(config: &Config, name: &str) -> anyhow::Result<()> {
    let stream = resolve(config, name)?;
    let provider = build_provider(config)?;
    let embedder = Arc::new(build_embedder(config, provider.clone()));

    let policy = DedupPolicy {
        persist: false,
        ..DedupPolicy::for_stream(&config.dedup, &stream)
    };
    let dedup =
        StreamDeduplicator::open(&stream.name, &stream.index_path, embedder, policy).await?;
    let generator = PromptGenerator::new(stream, provider);

    let content = dedup.get_unique_content(&generator).await?;
    print!("{}", render_preview(name, &content));
    Ok(())
}

fn render_preview(stream: &str, content: &UniqueContent) -> String {
    let mut out = String::new();
    for a in &content.attempts {
        let line = match &a.outcome {
            AttemptOutcome::EmptyGeneration => "no content".to_string(),
            AttemptOutcome::Duplicate { score, matched_id } => {
                format!("duplicate of #{matched_id} (score {score:.4})")
            }
            AttemptOutcome::Accepted { best_score, .. } => match best_score {
                Some(s) => format!("unique (closest {s:.4})"),
                None => "unique (index empty)".to_string(),
            },
            AttemptOutcome::Unverified => "not checked".to_string(),
        };
        out.push_str(&format!("  attempt {}: {line}\n", a.attempt));
    }

    let verdict = match &content.verdict {
        Verdict::Verified { .. } => "verified".to_string(),
        Verdict::Unverified { reason } => format!("unverified: {reason}"),
    };
    out.push_str(&format!("\n[{stream}] {verdict}\n\n{}\n", content.text));
    out
}
