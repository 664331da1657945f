// tests/coordinator_test.rs — Integration test: dedup loop with scripted generator + embedder

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use tipstream::core::types::{AttemptOutcome, ContentGenerator, DedupPolicy, Verdict};
use tipstream::core::StreamDeduplicator;
use tipstream::infra::errors::{DedupError, TipsError};
use tipstream::memory::embeddings::EmbeddingService;
use tipstream::memory::index::VectorIndex;
use tipstream::memory::persistence;
use tipstream::provider::{ChatRequest, ChatResponse, ModelProvider};

/// Embeds known strings to fixed vectors. Unknown text is a provider error.
struct TableEmbedder {
    table: HashMap<String, Vec<f32>>,
}

impl TableEmbedder {
    fn new(entries: &[(&str, Vec<f32>)]) -> Self {
        Self {
            table: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }
}

#[async_trait]
impl ModelProvider for TableEmbedder {
    fn id(&self) -> &str {
        "table"
    }

    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, TipsError> {
        Err(TipsError::Provider {
            provider: "table".into(),
            message: "chat not supported".into(),
            retriable: false,
        })
    }

    async fn embed(&self, _model: &str, texts: &[&str]) -> Result<Vec<Vec<f32>>, TipsError> {
        texts
            .iter()
            .map(|t| {
                self.table.get(*t).cloned().ok_or_else(|| TipsError::Provider {
                    provider: "table".into(),
                    message: format!("no embedding for '{t}'"),
                    retriable: false,
                })
            })
            .collect()
    }
}

/// Plays back a script of generations, then repeats `fallback` forever.
struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<String, TipsError>>>,
    fallback: String,
    calls: AtomicU32,
}

impl ScriptedGenerator {
    fn new(script: Vec<Result<&str, ()>>, fallback: &str) -> Self {
        Self {
            script: Mutex::new(
                script
                    .into_iter()
                    .map(|r| {
                        r.map(str::to_string).map_err(|()| TipsError::Provider {
                            provider: "scripted".into(),
                            message: "connection reset".into(),
                            retriable: true,
                        })
                    })
                    .collect(),
            ),
            fallback: fallback.to_string(),
            calls: AtomicU32::new(0),
        }
    }

    fn always(text: &str) -> Self {
        Self::new(vec![], text)
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn generate(&self) -> Result<String, TipsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// Never finishes within any reasonable deadline.
struct SlowGenerator;

#[async_trait]
impl ContentGenerator for SlowGenerator {
    async fn generate(&self) -> Result<String, TipsError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok("late tip".into())
    }
}

fn tips_table() -> TableEmbedder {
    TableEmbedder::new(&[
        ("dimension probe", vec![0.0, 0.0, 1.0]),
        ("tip A", vec![1.0, 0.0, 0.0]),
        ("tip A reworded", vec![0.99, 0.1, 0.0]),
        ("tip B", vec![0.0, 1.0, 0.0]),
        ("tip C", vec![0.0, 0.0, 2.0]),
    ])
}

fn embedder(provider: TableEmbedder) -> Arc<EmbeddingService> {
    Arc::new(EmbeddingService::new(Arc::new(provider), "test-embed").with_dimension(3))
}

fn quick_policy() -> DedupPolicy {
    DedupPolicy {
        timeout: None,
        ..DedupPolicy::default().without_backoff()
    }
}

fn dedup_at(path: &Path, policy: DedupPolicy) -> StreamDeduplicator {
    StreamDeduplicator::with_index(
        "python",
        path,
        embedder(tips_table()),
        policy,
        VectorIndex::load(path, 3),
    )
}

#[tokio::test]
async fn test_first_tip_on_empty_index_is_accepted_and_saved() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("python_tips.index");
    let dedup = dedup_at(&path, quick_policy());

    let out = dedup
        .get_unique_content(&ScriptedGenerator::always("tip A"))
        .await
        .unwrap();

    assert_eq!(out.text, "tip A");
    assert_eq!(
        out.verdict,
        Verdict::Verified {
            id: 0,
            best_score: None,
            persisted: true
        }
    );
    assert_eq!(out.attempts.len(), 1);
    assert_eq!(dedup.index_len().await, 1);
    assert_eq!(persistence::read_header(&path).unwrap(), (3, 1));
}

#[tokio::test]
async fn test_duplicate_is_rejected_then_novel_tip_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("python_tips.index");
    let dedup = dedup_at(&path, quick_policy());
    dedup
        .get_unique_content(&ScriptedGenerator::always("tip A"))
        .await
        .unwrap();

    let generator = ScriptedGenerator::new(vec![Ok("tip A reworded")], "tip B");
    let out = dedup.get_unique_content(&generator).await.unwrap();

    assert_eq!(out.text, "tip B");
    assert_eq!(out.index_id(), Some(1));
    assert_eq!(generator.calls(), 2);

    let rejected = out.rejected();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].text, "tip A reworded");
    assert_eq!(rejected[0].matched_id, 0);
    assert!(rejected[0].score > 0.95);
    assert_eq!(dedup.index_len().await, 2);
}

#[tokio::test]
async fn test_exhaustion_leaves_index_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("python_tips.index");
    let dedup = dedup_at(&path, quick_policy());
    dedup
        .get_unique_content(&ScriptedGenerator::always("tip A"))
        .await
        .unwrap();

    let generator = ScriptedGenerator::always("tip A");
    let err = dedup.get_unique_content(&generator).await.unwrap_err();

    match err {
        DedupError::GenerationExhausted { attempts, rejected } => {
            assert_eq!(attempts, 5);
            assert_eq!(rejected.len(), 5);
            assert!(rejected.iter().all(|r| r.matched_id == 0 && r.text == "tip A"));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert_eq!(generator.calls(), 5);
    assert_eq!(dedup.index_len().await, 1);
    assert_eq!(persistence::read_header(&path).unwrap(), (3, 1));
}

#[tokio::test]
async fn test_embedding_failure_fails_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("python_tips.index");
    let dedup = dedup_at(&path, quick_policy());

    let out = dedup
        .get_unique_content(&ScriptedGenerator::always("something unembeddable"))
        .await
        .unwrap();

    assert_eq!(out.text, "something unembeddable");
    assert!(!out.is_verified());
    assert_eq!(out.index_id(), None);
    assert!(matches!(out.attempts[0].outcome, AttemptOutcome::Unverified));
    assert_eq!(dedup.index_len().await, 0);
    assert!(!path.exists());
}

#[tokio::test]
async fn test_empty_and_failed_generations_are_retried() {
    let dir = tempfile::tempdir().unwrap();
    let dedup = dedup_at(&dir.path().join("t.index"), quick_policy());
    let generator = ScriptedGenerator::new(vec![Ok("   "), Err(())], "tip C");

    let out = dedup.get_unique_content(&generator).await.unwrap();

    assert_eq!(out.text, "tip C");
    assert_eq!(out.attempts.len(), 3);
    assert_eq!(out.attempts[0].outcome, AttemptOutcome::EmptyGeneration);
    assert_eq!(out.attempts[1].outcome, AttemptOutcome::EmptyGeneration);
    assert!(out.is_verified());
}

#[tokio::test]
async fn test_score_equal_to_threshold_is_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.index");
    let policy = DedupPolicy {
        similarity_threshold: 0.0,
        max_attempts: 1,
        ..quick_policy()
    };
    let dedup = dedup_at(&path, policy);
    dedup
        .get_unique_content(&ScriptedGenerator::always("tip A"))
        .await
        .unwrap();

    // Orthogonal vectors score exactly 0.0.
    let err = dedup
        .get_unique_content(&ScriptedGenerator::always("tip B"))
        .await
        .unwrap_err();
    assert!(matches!(err, DedupError::GenerationExhausted { attempts: 1, .. }));
}

#[tokio::test]
async fn test_threshold_one_rejects_only_identical() {
    let dir = tempfile::tempdir().unwrap();
    let policy = DedupPolicy {
        similarity_threshold: 1.0,
        max_attempts: 1,
        ..quick_policy()
    };
    let dedup = dedup_at(&dir.path().join("t.index"), policy);
    dedup
        .get_unique_content(&ScriptedGenerator::always("tip A"))
        .await
        .unwrap();

    assert!(dedup
        .get_unique_content(&ScriptedGenerator::always("tip A reworded"))
        .await
        .is_ok());
    assert!(dedup
        .get_unique_content(&ScriptedGenerator::always("tip A"))
        .await
        .is_err());
}

#[tokio::test]
async fn test_save_failure_still_accepts() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not_a_dir");
    std::fs::write(&blocker, b"file").unwrap();
    let path = blocker.join("python_tips.index");
    let dedup = dedup_at(&path, quick_policy());

    let out = dedup
        .get_unique_content(&ScriptedGenerator::always("tip A"))
        .await
        .unwrap();

    assert_eq!(
        out.verdict,
        Verdict::Verified {
            id: 0,
            best_score: None,
            persisted: false
        }
    );
    assert_eq!(dedup.index_len().await, 1);

    // In-memory index still dedups for the rest of the process.
    let err = dedup
        .get_unique_content(&ScriptedGenerator::always("tip A"))
        .await
        .unwrap_err();
    assert!(matches!(err, DedupError::GenerationExhausted { .. }));
}

#[tokio::test]
async fn test_persist_disabled_does_not_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.index");
    let policy = DedupPolicy {
        persist: false,
        ..quick_policy()
    };
    let dedup = dedup_at(&path, policy);

    let out = dedup
        .get_unique_content(&ScriptedGenerator::always("tip A"))
        .await
        .unwrap();
    assert!(matches!(
        out.verdict,
        Verdict::Verified {
            persisted: false,
            ..
        }
    ));
    assert!(!path.exists());
}

#[tokio::test]
async fn test_reopened_index_remembers_accepted_tips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("python_tips.index");
    {
        let dedup = dedup_at(&path, quick_policy());
        dedup
            .get_unique_content(&ScriptedGenerator::always("tip A"))
            .await
            .unwrap();
        dedup
            .get_unique_content(&ScriptedGenerator::always("tip B"))
            .await
            .unwrap();
    }

    let reopened = StreamDeduplicator::open("python", &path, embedder(tips_table()), quick_policy())
        .await
        .unwrap();
    assert_eq!(reopened.index_len().await, 2);

    let generator = ScriptedGenerator::new(vec![Ok("tip B")], "tip C");
    let out = reopened.get_unique_content(&generator).await.unwrap();
    assert_eq!(out.text, "tip C");
    assert_eq!(out.index_id(), Some(2));
}

#[tokio::test]
async fn test_open_probes_dimension_when_unknown() {
    let dir = tempfile::tempdir().unwrap();
    let table = TableEmbedder::new(&[("dimension probe", vec![0.0, 0.0, 0.0, 1.0])]);
    let service = Arc::new(EmbeddingService::new(Arc::new(table), "test-embed"));

    let dedup = StreamDeduplicator::open("js", dir.path().join("js.index"), service.clone(), quick_policy())
        .await
        .unwrap();

    assert_eq!(service.known_dimension(), Some(4));
    assert_eq!(dedup.index_len().await, 0);
}

#[tokio::test]
async fn test_concurrent_calls_on_one_stream_are_serialized() {
    let dir = tempfile::tempdir().unwrap();
    let dedup = dedup_at(&dir.path().join("t.index"), quick_policy());

    // Both callers first propose "tip A". Only one may accept it.
    let shared = ScriptedGenerator::new(vec![Ok("tip A"), Ok("tip A")], "tip B");
    let (first, second) = tokio::join!(
        dedup.get_unique_content(&shared),
        dedup.get_unique_content(&shared)
    );

    let mut texts = vec![first.unwrap().text, second.unwrap().text];
    texts.sort();
    assert_eq!(texts, vec!["tip A".to_string(), "tip B".to_string()]);
    assert_eq!(dedup.index_len().await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_waits_between_attempts_but_not_after_last() {
    let dir = tempfile::tempdir().unwrap();
    let policy = DedupPolicy {
        max_attempts: 3,
        timeout: None,
        ..DedupPolicy::default()
    };
    let dedup = dedup_at(&dir.path().join("t.index"), policy);
    dedup
        .get_unique_content(&ScriptedGenerator::always("tip A"))
        .await
        .unwrap();

    let start = tokio::time::Instant::now();
    let err = dedup
        .get_unique_content(&ScriptedGenerator::always("tip A"))
        .await
        .unwrap_err();

    // Two 1s duplicate backoffs for three attempts.
    assert!(matches!(err, DedupError::GenerationExhausted { attempts: 3, .. }));
    assert_eq!(start.elapsed(), Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_empty_generation_uses_longer_backoff() {
    let dir = tempfile::tempdir().unwrap();
    let policy = DedupPolicy {
        timeout: None,
        ..DedupPolicy::default()
    };
    let dedup = dedup_at(&dir.path().join("t.index"), policy);

    let start = tokio::time::Instant::now();
    let out = dedup
        .get_unique_content(&ScriptedGenerator::new(vec![Ok("")], "tip A"))
        .await
        .unwrap();

    assert_eq!(out.text, "tip A");
    assert_eq!(start.elapsed(), Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_reports_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let policy = DedupPolicy {
        timeout: Some(Duration::from_secs(5)),
        ..DedupPolicy::default()
    };
    let dedup = dedup_at(&dir.path().join("t.index"), policy);

    let err = dedup.get_unique_content(&SlowGenerator).await.unwrap_err();
    assert!(matches!(err, DedupError::Timeout { seconds: 5 }));
    assert_eq!(dedup.index_len().await, 0);
}

#[tokio::test]
async fn test_wrong_configured_dimension_uses_provider_dimension() {
    let dir = tempfile::tempdir().unwrap();
    let service =
        Arc::new(EmbeddingService::new(Arc::new(tips_table()), "test-embed").with_dimension(1536));

    let dedup = StreamDeduplicator::open(
        "python",
        dir.path().join("python_tips.index"),
        service.clone(),
        quick_policy(),
    )
    .await
    .unwrap();
    assert_eq!(service.known_dimension(), Some(3));

    let first = dedup
        .get_unique_content(&ScriptedGenerator::always("tip A"))
        .await
        .unwrap();
    assert!(first.is_verified());

    // Dedup still works: the same tip is rejected every time.
    let err = dedup
        .get_unique_content(&ScriptedGenerator::always("tip A"))
        .await
        .unwrap_err();
    assert!(matches!(err, DedupError::GenerationExhausted { .. }));
    assert_eq!(dedup.index_len().await, 1);
}

#[tokio::test(flavor = "current_thread")]
async fn test_concurrent_streams_each_persist() {
    let dir = tempfile::tempdir().unwrap();
    let python_path = dir.path().join("python_tips.index");
    let js_path = dir.path().join("js_tips.index");
    let python = dedup_at(&python_path, quick_policy());
    let js = dedup_at(&js_path, quick_policy());

    let python_gen = ScriptedGenerator::always("tip A");
    let js_gen = ScriptedGenerator::always("tip B");
    let (a, b) = tokio::join!(
        python.get_unique_content(&python_gen),
        js.get_unique_content(&js_gen)
    );

    for out in [a.unwrap(), b.unwrap()] {
        assert!(matches!(
            out.verdict,
            Verdict::Verified {
                persisted: true,
                ..
            }
        ));
    }
    assert_eq!(persistence::read_header(&python_path).unwrap(), (3, 1));
    assert_eq!(persistence::read_header(&js_path).unwrap(), (3, 1));
}
