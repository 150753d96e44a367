use anyhow::Result;
use async_trait::async_trait;
use soulframe_core::{Identity, MemoryContext, MemoryEntry, MemoryRecall, StateStore};
use std::sync::Arc;

use crate::topics::TopicExtractor;

/// Bonus added to an entry's weight for each tag it shares with the message.
const TOPIC_BONUS: f32 = 0.5;
const DEFAULT_WINDOW: usize = 200;

/// Read-only recall of prior summaries relevant to the current message.
///
/// Entries whose `trust_threshold` exceeds the host's current trust are never
/// surfaced. Only the newest `window` eligible entries are ranked, by weight
/// plus topic overlap.
pub struct MemoryContextBuilder {
    store: Arc<dyn StateStore>,
    topics: TopicExtractor,
    limit: usize,
    window: usize,
}

impl MemoryContextBuilder {
    pub fn new(store: Arc<dyn StateStore>, limit: usize) -> Self {
        Self {
            store,
            topics: TopicExtractor::new(),
            limit,
            window: DEFAULT_WINDOW,
        }
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(self.limit);
        self
    }

    pub async fn build(&self, identity: &Identity, message: &str) -> Result<MemoryContext> {
        let trust = self
            .store
            .load_bond(identity)
            .await?
            .map(|b| b.trust)
            .unwrap_or(0.0);
        let message_tags = self.topics.tags(message);

        let mut scored: Vec<(f32, MemoryEntry)> = self
            .store
            .recall_candidates(identity, trust, self.window)
            .await?
            .into_iter()
            .map(|e| {
                let overlap = e.tags.iter().filter(|t| message_tags.contains(t)).count();
                (e.weight + TOPIC_BONUS * overlap as f32, e)
            })
            .collect();

        // Highest score first; newer entries win ties.
        scored.sort_by(|(sa, a), (sb, b)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.timestamp.cmp(&a.timestamp))
        });
        let entries: Vec<MemoryEntry> = scored.into_iter().take(self.limit).map(|(_, e)| e).collect();

        let primary_topic = message_tags
            .first()
            .cloned()
            .or_else(|| entries.iter().find_map(|e| e.tags.first().cloned()));

        tracing::debug!(
            "Recalled {} memories for {} (trust {:.2}, topic {:?})",
            entries.len(),
            identity,
            trust,
            primary_topic
        );

        Ok(MemoryContext {
            entries,
            primary_topic,
        })
    }
}

#[async_trait]
impl MemoryRecall for MemoryContextBuilder {
    async fn build_context(&self, identity: &Identity, message: &str) -> Result<MemoryContext> {
        self.build(identity, message).await
    }
}
