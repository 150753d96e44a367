//! Integration tests for the SQLite state store.

use chrono::{TimeZone, Utc};
use soulframe_core::{
    BondState, BondTier, EmotionRecord, EmotionalSnapshot, Identity, MemoryEntry, MemoryKind,
    MoodSample, SentimentTrendPoint, StateStore,
};
use soulframe_memory::{MemoryContextBuilder, SqliteStore};
use std::sync::Arc;
use tempfile::TempDir;

async fn temp_store() -> (SqliteStore, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::new(dir.path().join("soulframe.db")).await.unwrap();
    (store, dir)
}

#[tokio::test]
async fn test_emotion_roundtrip_and_upsert() {
    let (store, _dir) = temp_store().await;
    let id = Identity::new("synth", "host");
    let t = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();

    assert!(store.load_emotion(&id).await.unwrap().is_none());

    let mut record = EmotionRecord {
        snapshot: EmotionalSnapshot::neutral(t),
        history: vec![MoodSample {
            valence: 0.2,
            arousal: 0.4,
            timestamp: t,
        }],
    };
    store.save_emotion(&id, &record).await.unwrap();
    record.snapshot.valence = 0.5;
    store.save_emotion(&id, &record).await.unwrap();

    let loaded = store.load_emotion(&id).await.unwrap().unwrap();
    assert_eq!(loaded, record);
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("soulframe.db");
    let id = Identity::new("synth", "host");
    let bond = BondState {
        tier: BondTier::Comfortable,
        trust: 0.45,
        affection: 0.3,
    };
    {
        let store = SqliteStore::new(&path).await.unwrap();
        store.save_bond(&id, &bond).await.unwrap();
        store.save_synchrony(&id, 0.66).await.unwrap();
    }
    let store = SqliteStore::new(&path).await.unwrap();
    assert_eq!(store.load_bond(&id).await.unwrap(), Some(bond));
    let sync = store.load_synchrony(&id).await.unwrap().unwrap();
    assert!((sync - 0.66).abs() < 1e-6);
}

#[tokio::test]
async fn test_trend_trimmed_per_identity() {
    let (store, _dir) = temp_store().await;
    let a = Identity::new("synth", "a");
    let b = Identity::new("synth", "b");
    for i in 0..6 {
        let p = SentimentTrendPoint {
            valence: i as f32 / 10.0,
            activation: 0.3,
            timestamp: Utc.timestamp_millis_opt(1_700_000_000_000 + i).unwrap(),
        };
        store.append_trend(&a, &p, 4).await.unwrap();
    }
    store
        .append_trend(
            &b,
            &SentimentTrendPoint {
                valence: -0.5,
                activation: 0.1,
                timestamp: Utc::now(),
            },
            4,
        )
        .await
        .unwrap();

    let trend = store.trend(&a).await.unwrap();
    assert_eq!(trend.len(), 4);
    assert!((trend[0].valence - 0.2).abs() < 1e-6);
    assert_eq!(store.trend(&b).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_memory_context_over_sqlite() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let id = Identity::new("synth", "host");
    store
        .save_bond(
            &id,
            &BondState {
                tier: BondTier::Curious,
                trust: 0.3,
                affection: 0.1,
            },
        )
        .await
        .unwrap();

    for (summary, threshold, tags) in [
        ("Talked about the new song", 0.0, vec!["music".to_string()]),
        ("Shared a hard family moment", 0.5, vec!["family".to_string()]),
    ] {
        let entry = MemoryEntry {
            kind: MemoryKind::Conversation,
            trust_threshold: threshold,
            summary: summary.to_string(),
            timestamp: Utc::now(),
            weight: 0.5,
            tags,
            thread_id: Some("conv-1".into()),
        };
        store.append_memory(&id, &entry).await.unwrap();
    }

    let ctx = MemoryContextBuilder::new(store, 5)
        .build(&id, "any new music?")
        .await
        .unwrap();
    assert_eq!(ctx.entries.len(), 1);
    assert_eq!(ctx.entries[0].summary, "Talked about the new song");
    assert_eq!(ctx.primary_topic.as_deref(), Some("music"));
}

#[tokio::test]
async fn test_recall_candidates_filter_trust_and_window() {
    let (store, _dir) = temp_store().await;
    let id = Identity::new("synth", "host");
    for hour in 0..6u32 {
        let entry = MemoryEntry {
            kind: MemoryKind::Conversation,
            trust_threshold: if hour % 2 == 0 { 0.0 } else { 0.9 },
            summary: format!("hour {}", hour),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap(),
            weight: 0.5,
            tags: Vec::new(),
            thread_id: None,
        };
        store.append_memory(&id, &entry).await.unwrap();
    }

    let picked = store.recall_candidates(&id, 0.5, 2).await.unwrap();
    let summaries: Vec<&str> = picked.iter().map(|e| e.summary.as_str()).collect();
    assert_eq!(summaries, vec!["hour 2", "hour 4"]);

    let all = store.recall_candidates(&id, 1.0, 100).await.unwrap();
    assert_eq!(all.len(), 6);
    assert_eq!(all[0].summary, "hour 0");
}
