//! Trust and affection between a synth and its host.
//!
//! Both scalars move slowly: warm, untense messages build trust; tension
//! erodes it. The tier is derived from trust.

use async_trait::async_trait;
use soulframe_core::config::BondConfig;
use soulframe_core::{BondLedger, BondState, BondTier, Identity, SentimentReading, StateStore, TurnRecord, TurnRecorder};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct BondTracker {
    config: BondConfig,
    store: Arc<dyn StateStore>,
    cache: RwLock<HashMap<Identity, BondState>>,
}

impl BondTracker {
    pub fn new(config: BondConfig, store: Arc<dyn StateStore>) -> Self {
        Self {
            config,
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn current(&self, identity: &Identity) -> anyhow::Result<BondState> {
        if let Some(bond) = self.cache.read().await.get(identity) {
            return Ok(*bond);
        }
        let bond = self.store.load_bond(identity).await?.unwrap_or_default();
        self.cache.write().await.insert(identity.clone(), bond);
        Ok(bond)
    }

    /// Nudge trust and affection by one host message and persist the result.
    pub async fn observe(
        &self,
        identity: &Identity,
        reading: &SentimentReading,
    ) -> anyhow::Result<BondState> {
        let before = self.current(identity).await?;
        let after = self.step(before, reading);

        if after.tier != before.tier {
            tracing::info!(
                "Bond tier for {} moved {:?} -> {:?} (trust {:.2})",
                identity,
                before.tier,
                after.tier,
                after.trust
            );
        }

        self.cache.write().await.insert(identity.clone(), after);
        self.store.save_bond(identity, &after).await?;
        Ok(after)
    }

    fn step(&self, bond: BondState, r: &SentimentReading) -> BondState {
        let c = &self.config;
        let trust = bond.trust + c.trust_gain * r.warmth * (1.0 - r.tension) - c.trust_loss * r.tension;
        let affection = bond.affection + c.affection_gain * r.valence.max(0.0)
            - c.affection_loss * (-r.valence).max(0.0);
        let trust = trust.clamp(0.0, 1.0);
        BondState {
            tier: BondTier::from_trust(trust),
            trust,
            affection: affection.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl BondLedger for BondTracker {
    async fn bond(&self, identity: &Identity) -> anyhow::Result<BondState> {
        self.current(identity).await
    }
}

#[async_trait]
impl TurnRecorder for BondTracker {
    fn name(&self) -> &str {
        "bond"
    }

    async fn record(&self, record: &TurnRecord) -> anyhow::Result<()> {
        if let Some(reading) = &record.sentiment {
            self.observe(&record.identity, reading).await?;
        }
        Ok(())
    }
}
