//! Emotional state manager.
//!
//! Keeps exactly one live [`EmotionalSnapshot`] per identity. Writers go
//! through a per-identity async mutex (single writer); background readers use
//! the lock-free [`MoodBoard`] published after every change.
//!
//! Emotions have inertia: a new reading is blended into the previous snapshot
//! (`blend_factor` new, the rest old), and a dominant mood must hold for
//! `min_dwell_secs` before it may change again.

use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use soulframe_core::config::{ClimateConfig, EmotionConfig};
use soulframe_core::sentiment::{analyze_text, SentimentAnalyzer};
use soulframe_core::{
    EmotionEngine, EmotionRecord, EmotionalClimate, EmotionalSnapshot, Identity, Mood, MoodSample,
    SentimentReading, StateStore,
};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::climate::compute_climate;

/// Weight of the reply's own sentiment during the refine pass.
const REPLY_WEIGHT: f32 = 0.3;

#[derive(Debug, Clone)]
pub struct BoardEntry {
    pub snapshot: EmotionalSnapshot,
    pub climate: EmotionalClimate,
}

/// Versioned, immutable view of every identity's latest emotional state.
#[derive(Debug, Clone, Default)]
pub struct MoodBoard {
    pub version: u64,
    pub entries: HashMap<Identity, BoardEntry>,
}

impl MoodBoard {
    /// Identity whose snapshot changed most recently.
    pub fn most_recent(&self) -> Option<(&Identity, &BoardEntry)> {
        self.entries
            .iter()
            .max_by_key(|(_, e)| e.snapshot.timestamp)
    }
}

#[derive(Default)]
struct EmotionCell {
    loaded: bool,
    snapshot: Option<EmotionalSnapshot>,
    history: VecDeque<MoodSample>,
    last_input: Option<(u64, DateTime<Utc>)>,
}

pub struct EmotionalStateManager {
    emotion: EmotionConfig,
    climate: ClimateConfig,
    store: Arc<dyn StateStore>,
    analyzer: SentimentAnalyzer,
    cells: Mutex<HashMap<Identity, Arc<Mutex<EmotionCell>>>>,
    board: ArcSwap<MoodBoard>,
}

impl EmotionalStateManager {
    pub fn new(emotion: EmotionConfig, climate: ClimateConfig, store: Arc<dyn StateStore>) -> Self {
        Self {
            emotion,
            climate,
            store,
            analyzer: SentimentAnalyzer::new(),
            cells: Mutex::new(HashMap::new()),
            board: ArcSwap::from_pointee(MoodBoard::default()),
        }
    }

    /// Lock-free read of the latest published state.
    pub fn board(&self) -> Arc<MoodBoard> {
        self.board.load_full()
    }

    async fn cell(&self, identity: &Identity) -> Arc<Mutex<EmotionCell>> {
        let mut cells = self.cells.lock().await;
        cells.entry(identity.clone()).or_default().clone()
    }

    async fn ensure_loaded(&self, identity: &Identity, cell: &mut EmotionCell) {
        if cell.loaded {
            return;
        }
        cell.loaded = true;
        match self.store.load_emotion(identity).await {
            Ok(Some(record)) => {
                cell.snapshot = Some(record.snapshot);
                cell.history = record.history.into_iter().collect();
                while cell.history.len() > self.climate.history_capacity {
                    cell.history.pop_front();
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to load emotional state for {}: {}", identity, e),
        }
    }

    pub async fn ingest(
        &self,
        identity: &Identity,
        message: &str,
        reply: &str,
        hint: Option<&SentimentReading>,
        existing: Option<&EmotionalSnapshot>,
    ) -> EmotionalSnapshot {
        self.ingest_at(identity, message, reply, hint, existing, Utc::now())
            .await
    }

    pub async fn ingest_at(
        &self,
        identity: &Identity,
        message: &str,
        reply: &str,
        hint: Option<&SentimentReading>,
        existing: Option<&EmotionalSnapshot>,
        now: DateTime<Utc>,
    ) -> EmotionalSnapshot {
        let cell = self.cell(identity).await;
        let mut cell = cell.lock().await;
        self.ensure_loaded(identity, &mut cell).await;

        let hash = input_hash(message, reply, hint);
        if let (Some((last_hash, last_at)), Some(current)) = (cell.last_input, &cell.snapshot) {
            if last_hash == hash && last_at == now {
                return current.clone();
            }
        }

        // Latest wins between what we hold and what the caller passed in.
        let base = match (cell.snapshot.as_ref(), existing) {
            (Some(held), Some(given)) if given.timestamp > held.timestamp => given.clone(),
            (Some(held), _) => held.clone(),
            (None, Some(given)) => given.clone(),
            (None, None) => EmotionalSnapshot::neutral(now),
        };

        let reading = self.reading_for(message, reply, hint);
        let snapshot = self.blend(&base, &reading, message, now);

        cell.history.push_back(MoodSample {
            valence: snapshot.valence,
            arousal: reading.activation,
            timestamp: now,
        });
        while cell.history.len() > self.climate.history_capacity {
            cell.history.pop_front();
        }

        let history: Vec<MoodSample> = cell.history.iter().copied().collect();
        let climate = compute_climate(&history, &self.climate);

        cell.snapshot = Some(snapshot.clone());
        cell.last_input = Some((hash, now));
        self.publish(identity, &snapshot, climate);

        tracing::debug!(
            "Ingested mood for {}: dominant={} valence={:.2} weather={}",
            identity,
            snapshot.dominant_mood,
            snapshot.valence,
            climate.weather
        );

        let record = EmotionRecord {
            snapshot: snapshot.clone(),
            history,
        };
        if let Err(e) = self.store.save_emotion(identity, &record).await {
            tracing::warn!("Failed to persist emotional state for {}: {}", identity, e);
        }

        snapshot
    }

    fn reading_for(
        &self,
        message: &str,
        reply: &str,
        hint: Option<&SentimentReading>,
    ) -> SentimentReading {
        let base = match hint {
            Some(h) => *h,
            None => self.analyzer.analyze(message, &[]),
        };
        if reply.trim().is_empty() {
            return base;
        }
        let from_reply = analyze_text(reply);
        SentimentReading {
            valence: (1.0 - REPLY_WEIGHT) * base.valence + REPLY_WEIGHT * from_reply.valence,
            warmth: (1.0 - REPLY_WEIGHT) * base.warmth + REPLY_WEIGHT * from_reply.warmth,
            ..base
        }
        .normalized()
    }

    fn blend(
        &self,
        base: &EmotionalSnapshot,
        reading: &SentimentReading,
        message: &str,
        now: DateTime<Utc>,
    ) -> EmotionalSnapshot {
        let b = self.emotion.blend_factor.clamp(0.0, 1.0);
        let target = target_intensities(reading, message);

        let intensities: BTreeMap<Mood, f32> = Mood::ALL
            .iter()
            .map(|mood| {
                let new = target.get(mood).copied().unwrap_or(0.0);
                let old = base.intensity(*mood);
                (*mood, (b * new + (1.0 - b) * old).clamp(0.0, 1.0))
            })
            .collect();
        let valence = (b * reading.valence + (1.0 - b) * base.valence).clamp(-1.0, 1.0);

        let mut snapshot = EmotionalSnapshot {
            dominant_mood: base.dominant_mood,
            intensities,
            valence,
            tags: tags_for(reading),
            timestamp: now,
            dominant_since: base.dominant_since,
        };

        let candidate = snapshot.strongest();
        if candidate != base.dominant_mood {
            // Leaving neutral is free; any other change waits out the dwell.
            let held = now.signed_duration_since(base.dominant_since);
            let dwell = ChronoDuration::seconds(self.emotion.min_dwell_secs as i64);
            if base.dominant_mood == Mood::Neutral || held >= dwell {
                snapshot.dominant_mood = candidate;
                snapshot.dominant_since = now;
            }
        }
        snapshot
    }

    fn publish(&self, identity: &Identity, snapshot: &EmotionalSnapshot, climate: EmotionalClimate) {
        let entry = BoardEntry {
            snapshot: snapshot.clone(),
            climate,
        };
        self.board.rcu(|board| {
            let mut next = MoodBoard::clone(board);
            next.version += 1;
            next.entries.insert(identity.clone(), entry.clone());
            next
        });
    }

    pub async fn climate(&self, identity: &Identity) -> EmotionalClimate {
        if let Some(entry) = self.board.load().entries.get(identity) {
            return entry.climate;
        }
        let cell = self.cell(identity).await;
        let mut cell = cell.lock().await;
        self.ensure_loaded(identity, &mut cell).await;
        let history: Vec<MoodSample> = cell.history.iter().copied().collect();
        compute_climate(&history, &self.climate)
    }

    pub async fn snapshot(&self, identity: &Identity) -> Option<EmotionalSnapshot> {
        if let Some(entry) = self.board.load().entries.get(identity) {
            return Some(entry.snapshot.clone());
        }
        let cell = self.cell(identity).await;
        let mut cell = cell.lock().await;
        self.ensure_loaded(identity, &mut cell).await;
        cell.snapshot.clone()
    }

    /// Drift identities idle longer than `mood_decay_after_secs` back toward
    /// neutral. Identities with a turn in flight are skipped. Returns how many
    /// snapshots changed.
    pub async fn decay_idle(&self, now: DateTime<Utc>) -> usize {
        let cells: Vec<(Identity, Arc<Mutex<EmotionCell>>)> = {
            let cells = self.cells.lock().await;
            cells.iter().map(|(id, c)| (id.clone(), c.clone())).collect()
        };
        let idle_after = ChronoDuration::seconds(self.emotion.mood_decay_after_secs as i64);
        let retain = self.emotion.decay_retain.clamp(0.0, 1.0);

        let mut decayed = 0;
        for (identity, cell) in cells {
            let Ok(mut cell) = cell.try_lock() else {
                tracing::trace!("Skipping decay for busy identity {}", identity);
                continue;
            };
            let Some(current) = cell.snapshot.clone() else {
                continue;
            };
            if current.dominant_mood == Mood::Neutral && current.valence.abs() < 0.01 {
                continue;
            }
            if now.signed_duration_since(current.timestamp) < idle_after {
                continue;
            }

            let mut next = current.clone();
            for (mood, value) in next.intensities.iter_mut() {
                if *mood == Mood::Neutral {
                    *value += (1.0 - *value) * (1.0 - retain);
                } else {
                    *value *= retain;
                }
            }
            next.valence *= retain;
            next.timestamp = now;
            let strongest = next.strongest();
            if strongest != next.dominant_mood {
                next.dominant_mood = strongest;
                next.dominant_since = now;
            }

            let history: Vec<MoodSample> = cell.history.iter().copied().collect();
            let climate = compute_climate(&history, &self.climate);
            cell.snapshot = Some(next.clone());
            self.publish(&identity, &next, climate);
            decayed += 1;

            let record = EmotionRecord {
                snapshot: next,
                history,
            };
            if let Err(e) = self.store.save_emotion(&identity, &record).await {
                tracing::warn!("Failed to persist decayed mood for {}: {}", identity, e);
            }
        }

        if decayed > 0 {
            tracing::debug!("Mood decay relaxed {} identities", decayed);
        }
        decayed
    }
}

#[async_trait]
impl EmotionEngine for EmotionalStateManager {
    async fn ingest(
        &self,
        identity: &Identity,
        message: &str,
        reply: &str,
        hint: Option<&SentimentReading>,
        existing: Option<&EmotionalSnapshot>,
    ) -> anyhow::Result<EmotionalSnapshot> {
        Ok(EmotionalStateManager::ingest(self, identity, message, reply, hint, existing).await)
    }

    async fn climate(&self, identity: &Identity) -> anyhow::Result<EmotionalClimate> {
        Ok(EmotionalStateManager::climate(self, identity).await)
    }

    async fn current(&self, identity: &Identity) -> Option<EmotionalSnapshot> {
        self.snapshot(identity).await
    }
}

fn input_hash(message: &str, reply: &str, hint: Option<&SentimentReading>) -> u64 {
    let mut hasher = DefaultHasher::new();
    message.hash(&mut hasher);
    reply.hash(&mut hasher);
    if let Some(h) = hint {
        for v in [h.valence, h.activation, h.warmth, h.tension] {
            v.to_bits().hash(&mut hasher);
        }
    }
    hasher.finish()
}

/// Map a sentiment reading onto mood intensities in [0, 1].
fn target_intensities(r: &SentimentReading, message: &str) -> BTreeMap<Mood, f32> {
    let pos = r.valence.max(0.0);
    let neg = (-r.valence).max(0.0);
    let curious = if message.contains('?') {
        0.35 + 0.2 * r.activation
    } else {
        0.05
    };

    let mut map = BTreeMap::new();
    map.insert(Mood::Joy, pos * (0.4 + 0.6 * r.activation));
    map.insert(Mood::Calm, pos * (1.0 - r.activation) * 0.8);
    map.insert(Mood::Affection, pos * r.warmth);
    map.insert(Mood::Curious, curious);
    map.insert(Mood::Sadness, neg * (1.0 - r.activation));
    map.insert(Mood::Frustration, neg * r.activation);
    map.insert(Mood::Anxiety, r.tension * (0.5 + 0.5 * r.activation));

    let strongest = map.values().copied().fold(0.0f32, f32::max);
    map.insert(Mood::Neutral, (1.0 - strongest).clamp(0.0, 1.0) * 0.8);
    for v in map.values_mut() {
        *v = v.clamp(0.0, 1.0);
    }
    map
}

fn tags_for(r: &SentimentReading) -> Vec<String> {
    let mut tags = Vec::new();
    if r.warmth > 0.6 {
        tags.push("warm".to_string());
    }
    if r.tension > 0.5 {
        tags.push("tense".to_string());
    }
    if r.activation > 0.6 {
        tags.push("energized".to_string());
    }
    if r.valence < -0.3 {
        tags.push("low".to_string());
    }
    tags
}
