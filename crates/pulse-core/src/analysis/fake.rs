use super::AnalysisClient;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Canned replies for tests and offline runs. Records every prompt it sees.
#[derive(Clone, Default)]
pub struct FakeClient {
    reply: Option<String>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl FakeClient {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
            ..Default::default()
        }
    }

    /// Every call fails.
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().ok().and_then(|p| p.last().cloned())
    }
}

#[async_trait]
impl AnalysisClient for FakeClient {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut p) = self.prompts.lock() {
            p.push(prompt.to_string());
        }
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        match &self.reply {
            Some(r) => Ok(r.clone()),
            None => anyhow::bail!("fake client configured to fail"),
        }
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}
