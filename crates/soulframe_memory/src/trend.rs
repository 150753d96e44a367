//! Cross-turn sentiment trend and emotional synchrony.

use async_trait::async_trait;
use soulframe_core::sentiment::SentimentAnalyzer;
use soulframe_core::{
    Identity, SentimentReading, SentimentSource, SentimentTrendPoint, StateStore, TurnRecord,
    TurnRecorder,
};
use std::sync::Arc;

/// How many trend points the analyzer looks back over.
const ANALYZER_LOOKBACK: usize = 5;
const INITIAL_SYNCHRONY: f32 = 0.5;

/// Appends the host's sentiment to a bounded trend series and keeps an EMA of
/// how closely the synth's mood tracks the host's.
pub struct TrendTracker {
    store: Arc<dyn StateStore>,
    capacity: usize,
    synchrony_alpha: f32,
}

impl TrendTracker {
    pub fn new(store: Arc<dyn StateStore>, capacity: usize, synchrony_alpha: f32) -> Self {
        Self {
            store,
            capacity,
            synchrony_alpha: synchrony_alpha.clamp(0.0, 1.0),
        }
    }

    pub async fn synchrony(&self, identity: &Identity) -> anyhow::Result<f32> {
        Ok(self
            .store
            .load_synchrony(identity)
            .await?
            .unwrap_or(INITIAL_SYNCHRONY))
    }
}

#[async_trait]
impl TurnRecorder for TrendTracker {
    fn name(&self) -> &str {
        "trend"
    }

    async fn record(&self, record: &TurnRecord) -> anyhow::Result<()> {
        let Some(reading) = record.sentiment else {
            return Ok(());
        };
        let point = SentimentTrendPoint {
            valence: reading.valence,
            activation: reading.activation,
            timestamp: record.timestamp,
        };
        self.store
            .append_trend(&record.identity, &point, self.capacity)
            .await?;

        if let Some(snapshot) = &record.snapshot {
            let observed = 1.0 - (reading.valence - snapshot.valence).abs() / 2.0;
            let previous = self.synchrony(&record.identity).await?;
            let next = self.synchrony_alpha * observed + (1.0 - self.synchrony_alpha) * previous;
            self.store
                .save_synchrony(&record.identity, next.clamp(0.0, 1.0))
                .await?;
        }
        Ok(())
    }
}

/// Sentiment stage that reads recent trend history for context.
pub struct TrendSentiment {
    store: Arc<dyn StateStore>,
    analyzer: SentimentAnalyzer,
}

impl TrendSentiment {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            analyzer: SentimentAnalyzer::new(),
        }
    }
}

#[async_trait]
impl SentimentSource for TrendSentiment {
    async fn analyze(&self, identity: &Identity, message: &str) -> anyhow::Result<SentimentReading> {
        let trend = self.store.trend(identity).await?;
        let start = trend.len().saturating_sub(ANALYZER_LOOKBACK);
        Ok(self.analyzer.analyze(message, &trend[start..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryStore;
    use chrono::Utc;
    use soulframe_core::EmotionalSnapshot;

    fn record(valence: f32, synth_valence: Option<f32>) -> TurnRecord {
        TurnRecord {
            identity: Identity::new("s", "h"),
            message: "hi".into(),
            reply: "hello".into(),
            thread_id: "t".into(),
            sentiment: Some(SentimentReading {
                valence,
                ..SentimentReading::neutral()
            }),
            snapshot: synth_valence.map(|v| {
                let mut s = EmotionalSnapshot::neutral(Utc::now());
                s.valence = v;
                s
            }),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_trend_is_bounded() {
        let store = Arc::new(InMemoryStore::new());
        let tracker = TrendTracker::new(store.clone(), 3, 0.2);
        for _ in 0..5 {
            tracker.record(&record(0.4, None)).await.unwrap();
        }
        assert_eq!(store.trend(&Identity::new("s", "h")).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_synchrony_rises_when_moods_align() {
        let store = Arc::new(InMemoryStore::new());
        let tracker = TrendTracker::new(store, 10, 0.5);
        let id = Identity::new("s", "h");
        tracker.record(&record(0.6, Some(0.6))).await.unwrap();
        let aligned = tracker.synchrony(&id).await.unwrap();
        assert!((aligned - 0.75).abs() < 1e-6);

        tracker.record(&record(1.0, Some(-1.0))).await.unwrap();
        let split = tracker.synchrony(&id).await.unwrap();
        assert!(split < aligned);
    }

    #[tokio::test]
    async fn test_sentiment_stage_uses_history() {
        let store = Arc::new(InMemoryStore::new());
        let tracker = TrendTracker::new(store.clone(), 10, 0.2);
        for _ in 0..4 {
            tracker.record(&record(-0.9, None)).await.unwrap();
        }
        let stage = TrendSentiment::new(store);
        let id = Identity::new("s", "h");
        let reading = stage.analyze(&id, "the bus is at noon").await.unwrap();
        assert!(reading.valence < 0.0);
    }
}
