use anyhow::Result;
use async_trait::async_trait;
use soulframe_core::{
    BondState, EmotionRecord, Identity, MemoryEntry, SentimentTrendPoint, StateStore,
};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    emotion: HashMap<Identity, EmotionRecord>,
    bond: HashMap<Identity, BondState>,
    memories: HashMap<Identity, Vec<MemoryEntry>>,
    trend: HashMap<Identity, VecDeque<SentimentTrendPoint>>,
    synchrony: HashMap<Identity, f32>,
}

/// Process-local [`StateStore`]. Nothing survives a restart.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn load_emotion(&self, identity: &Identity) -> Result<Option<EmotionRecord>> {
        Ok(self.tables.read().await.emotion.get(identity).cloned())
    }

    async fn save_emotion(&self, identity: &Identity, record: &EmotionRecord) -> Result<()> {
        self.tables
            .write()
            .await
            .emotion
            .insert(identity.clone(), record.clone());
        Ok(())
    }

    async fn load_bond(&self, identity: &Identity) -> Result<Option<BondState>> {
        Ok(self.tables.read().await.bond.get(identity).copied())
    }

    async fn save_bond(&self, identity: &Identity, bond: &BondState) -> Result<()> {
        self.tables.write().await.bond.insert(identity.clone(), *bond);
        Ok(())
    }

    async fn append_memory(&self, identity: &Identity, entry: &MemoryEntry) -> Result<()> {
        self.tables
            .write()
            .await
            .memories
            .entry(identity.clone())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn memories(&self, identity: &Identity) -> Result<Vec<MemoryEntry>> {
        Ok(self
            .tables
            .read()
            .await
            .memories
            .get(identity)
            .cloned()
            .unwrap_or_default())
    }

    async fn recall_candidates(
        &self,
        identity: &Identity,
        max_trust: f32,
        window: usize,
    ) -> Result<Vec<MemoryEntry>> {
        let tables = self.tables.read().await;
        let Some(entries) = tables.memories.get(identity) else {
            return Ok(Vec::new());
        };
        let mut picked: Vec<MemoryEntry> = entries
            .iter()
            .rev()
            .filter(|e| e.trust_threshold <= max_trust)
            .take(window)
            .cloned()
            .collect();
        picked.reverse();
        Ok(picked)
    }

    async fn append_trend(
        &self,
        identity: &Identity,
        point: &SentimentTrendPoint,
        capacity: usize,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        let series = tables.trend.entry(identity.clone()).or_default();
        series.push_back(*point);
        while series.len() > capacity {
            series.pop_front();
        }
        Ok(())
    }

    async fn trend(&self, identity: &Identity) -> Result<Vec<SentimentTrendPoint>> {
        Ok(self
            .tables
            .read()
            .await
            .trend
            .get(identity)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn load_synchrony(&self, identity: &Identity) -> Result<Option<f32>> {
        Ok(self.tables.read().await.synchrony.get(identity).copied())
    }

    async fn save_synchrony(&self, identity: &Identity, score: f32) -> Result<()> {
        self.tables
            .write()
            .await
            .synchrony
            .insert(identity.clone(), score);
        Ok(())
    }
}
