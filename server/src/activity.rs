use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use products_pipeline::TransitionEvent;
use tokio::{sync::mpsc::UnboundedReceiver, task::JoinHandle};
use tracing::debug;

const DEFAULT_CAPACITY: usize = 200;

/// Recent stage changes kept in memory, newest first.
#[derive(Clone)]
pub struct ActivityFeed {
    entries: Arc<Mutex<VecDeque<TransitionEvent>>>,
    capacity: usize,
}

impl Default for ActivityFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ActivityFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, event: TransitionEvent) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push_front(event);
        entries.truncate(self.capacity);
    }

    pub fn recent(&self, limit: usize) -> Vec<TransitionEvent> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Drains `rx` into the feed until every sender is gone.
    pub fn spawn(&self, mut rx: UnboundedReceiver<TransitionEvent>) -> JoinHandle<()> {
        let feed = self.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                feed.record(event);
            }
            debug!("activity channel closed");
        })
    }
}
