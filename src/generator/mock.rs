use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::Generator;

/// What a [`MockGenerator`] answers with on a given call.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail(String),
}

/// A scripted generator for tests. Returns pre-defined replies in order
/// and remembers every prompt it was given.
pub struct MockGenerator {
    replies: Vec<Reply>,
    index: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockGenerator {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies,
            index: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A generator that answers every call with the same text.
    pub fn always(text: &str) -> Self {
        Self::new(vec![Reply::Text(text.to_string())])
    }

    /// A generator whose first call fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self::new(vec![Reply::Fail(message.to_string())])
    }

    /// Number of times `generate` was called.
    pub fn calls(&self) -> usize {
        self.index.load(Ordering::SeqCst)
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Generator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());
        let i = self.index.fetch_add(1, Ordering::SeqCst);
        // A single scripted reply repeats forever
        let slot = if self.replies.len() == 1 { 0 } else { i };
        let reply = self.replies.get(slot).ok_or_else(|| {
            anyhow::anyhow!("MockGenerator: no more replies (called {} times)", i + 1)
        })?;

        match reply {
            Reply::Text(text) => Ok(text.clone()),
            Reply::Fail(message) => Err(anyhow::anyhow!("{message}")),
        }
    }
}
