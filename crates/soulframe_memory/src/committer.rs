use async_trait::async_trait;
use soulframe_core::{MemoryEntry, MemoryKind, StateStore, TurnRecord, TurnRecorder};
use std::sync::Arc;

use crate::topics::TopicExtractor;

const SUMMARY_CHARS: usize = 160;
/// Emotionally heavy turns are only recalled once the host is trusted this much.
const SENSITIVE_TRUST: f32 = 0.4;

/// Writes one memory log entry per finalized turn.
pub struct MemoryCommitter {
    store: Arc<dyn StateStore>,
    topics: TopicExtractor,
}

impl MemoryCommitter {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            topics: TopicExtractor::new(),
        }
    }

    pub fn entry_for(&self, record: &TurnRecord) -> MemoryEntry {
        let tags = self
            .topics
            .tags(&format!("{} {}", record.message, record.reply));
        let valence = record.sentiment.map(|s| s.valence).unwrap_or(0.0);
        let heavy = valence < -0.3
            || record
                .snapshot
                .as_ref()
                .is_some_and(|s| s.tags.iter().any(|t| t == "low" || t == "tense"));

        let (kind, trust_threshold) = if heavy {
            (MemoryKind::Emotional, SENSITIVE_TRUST)
        } else {
            (MemoryKind::Conversation, 0.0)
        };

        MemoryEntry {
            kind,
            trust_threshold,
            summary: format!(
                "Host: {} | Me: {}",
                clip(&record.message),
                clip(&record.reply)
            ),
            timestamp: record.timestamp,
            weight: (0.3 + 0.5 * valence.abs() + 0.05 * tags.len() as f32).min(1.0),
            tags,
            thread_id: Some(record.thread_id.clone()),
        }
    }
}

fn clip(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= SUMMARY_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(SUMMARY_CHARS).collect();
    format!("{}…", cut.trim_end())
}

#[async_trait]
impl TurnRecorder for MemoryCommitter {
    fn name(&self) -> &str {
        "memory_commit"
    }

    async fn record(&self, record: &TurnRecord) -> anyhow::Result<()> {
        let entry = self.entry_for(record);
        self.store.append_memory(&record.identity, &entry).await?;
        tracing::debug!(
            "Committed {:?} memory for {} in {} (tags {:?})",
            entry.kind,
            record.identity,
            record.thread_id,
            entry.tags
        );
        Ok(())
    }
}
