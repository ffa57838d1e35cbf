//! Conversation history, owned outside the agent loop.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use fochs_turn::Message;
use thiserror::Error;
use tokio::sync::RwLock;

/// History backend failures.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The backend could not be read or written.
    #[error("history backend error: {0}")]
    Backend(String),
}

/// Per-user conversation storage.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Messages for `user_id`, oldest first. Unknown users have none.
    async fn load(&self, user_id: &str) -> Result<Vec<Message>, HistoryError>;

    /// Append messages for `user_id`.
    async fn append(&self, user_id: &str, messages: Vec<Message>) -> Result<(), HistoryError>;
}

/// In-memory history keeping the last `window` messages per user.
pub struct MemoryHistory {
    window: usize,
    data: RwLock<HashMap<String, VecDeque<Message>>>,
}

impl MemoryHistory {
    /// Keep at most `window` messages per user.
    pub fn new(window: usize) -> Self {
        Self {
            window,
            data: RwLock::new(HashMap::new()),
        }
    }

    /// The per-user message limit.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Forget everything stored for `user_id`.
    pub async fn clear(&self, user_id: &str) {
        self.data.write().await.remove(user_id);
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new(50)
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn load(&self, user_id: &str) -> Result<Vec<Message>, HistoryError> {
        let data = self.data.read().await;
        Ok(data
            .get(user_id)
            .map(|messages| messages.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn append(&self, user_id: &str, messages: Vec<Message>) -> Result<(), HistoryError> {
        let mut data = self.data.write().await;
        let stored = data.entry(user_id.to_string()).or_default();
        stored.extend(messages);
        let excess = stored.len().saturating_sub(self.window);
        stored.drain(..excess);
        Ok(())
    }
}
