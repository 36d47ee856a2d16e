use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use agora_types::events::ChatEvent;

/// Live listeners per conversation.
///
/// Each connected socket registers one listener and gets back a receiver;
/// [`broadcast`](Self::broadcast) fans an event out to every listener of a
/// conversation. Nothing is buffered for listeners that are not connected.
#[derive(Clone, Default)]
pub struct ChatRegistry {
    inner: Arc<RwLock<HashMap<i64, HashMap<Uuid, mpsc::UnboundedSender<ChatEvent>>>>>,
}

impl ChatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener on a conversation. Returns (listener_id, receiver).
    pub async fn add(&self, conversation_id: i64) -> (Uuid, mpsc::UnboundedReceiver<ChatEvent>) {
        let listener_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .write()
            .await
            .entry(conversation_id)
            .or_default()
            .insert(listener_id, tx);
        (listener_id, rx)
    }

    /// Drop a listener; the conversation entry goes away with its last listener.
    pub async fn remove(&self, conversation_id: i64, listener_id: Uuid) {
        let mut conversations = self.inner.write().await;
        if let Some(listeners) = conversations.get_mut(&conversation_id) {
            listeners.remove(&listener_id);
            if listeners.is_empty() {
                conversations.remove(&conversation_id);
            }
        }
    }

    /// Send `event` to every listener of the conversation. Returns how many
    /// listeners accepted it.
    pub async fn broadcast(&self, conversation_id: i64, event: ChatEvent) -> usize {
        let conversations = self.inner.read().await;
        let Some(listeners) = conversations.get(&conversation_id) else {
            return 0;
        };
        listeners
            .values()
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count()
    }

    #[cfg(test)]
    pub(crate) async fn listener_count(&self, conversation_id: i64) -> usize {
        self.inner
            .read()
            .await
            .get(&conversation_id)
            .map_or(0, HashMap::len)
    }
}
