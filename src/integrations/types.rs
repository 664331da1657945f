// src/integrations/types.rs — Delivery adapter traits

use async_trait::async_trait;

/// Adapter for chat apps that tips are posted to.
#[async_trait]
pub trait MessagingAdapter: Send + Sync {
    fn id(&self) -> &str;

    /// Post `content` to `target` and return the platform's message id.
    async fn send(&self, target: &str, content: &str) -> anyhow::Result<String>;
}

/// Collects delivered messages in memory. Used by `preview` and tests.
#[derive(Default)]
pub struct RecordingAdapter {
    sent: std::sync::Mutex<Vec<(String, String)>>,
}

impl RecordingAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MessagingAdapter for RecordingAdapter {
    fn id(&self) -> &str {
        "recording"
    }

    async fn send(&self, target: &str, content: &str) -> anyhow::Result<String> {
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| anyhow::anyhow!("recording adapter poisoned"))?;
        sent.push((target.to_string(), content.to_string()));
        Ok(sent.len().to_string())
    }
}
