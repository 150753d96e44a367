use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use soulframe_core::{
    BondState, EmotionRecord, Identity, MemoryEntry, SentimentTrendPoint, StateStore,
};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use std::path::Path;

/// [`StateStore`] backed by a SQLite file. Structured values are stored as
/// JSON columns keyed by the identity's flat key.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display());
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&db_url)
            .await
            .context("Failed to connect to SQLite database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Private in-memory database. One connection, so every query sees the same data.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory SQLite database")?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS emotion_state (
                identity TEXT PRIMARY KEY,
                record_json TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create emotion_state table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bond_state (
                identity TEXT PRIMARY KEY,
                bond_json TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create bond_state table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memory_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                identity TEXT NOT NULL,
                trust_threshold REAL NOT NULL,
                timestamp INTEGER NOT NULL,
                entry_json TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create memory_log table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_memory_log_identity ON memory_log(identity, timestamp)",
        )
            .execute(&self.pool)
            .await
            .context("Failed to create memory_log index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sentiment_trend (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                identity TEXT NOT NULL,
                valence REAL NOT NULL,
                activation REAL NOT NULL,
                timestamp INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create sentiment_trend table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS synchrony (
                identity TEXT PRIMARY KEY,
                score REAL NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create synchrony table")?;

        Ok(())
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn load_emotion(&self, identity: &Identity) -> Result<Option<EmotionRecord>> {
        let row = sqlx::query("SELECT record_json FROM emotion_state WHERE identity = ?")
            .bind(identity.key())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query emotion_state")?;

        match row {
            Some(row) => {
                let json: String = row.get("record_json");
                let record = serde_json::from_str(&json)
                    .context("Failed to deserialize emotional state")?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn save_emotion(&self, identity: &Identity, record: &EmotionRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        sqlx::query(
            "INSERT INTO emotion_state (identity, record_json, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(identity) DO UPDATE SET record_json = excluded.record_json, updated_at = excluded.updated_at",
        )
        .bind(identity.key())
        .bind(json)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to save emotional state")?;
        Ok(())
    }

    async fn load_bond(&self, identity: &Identity) -> Result<Option<BondState>> {
        let row = sqlx::query("SELECT bond_json FROM bond_state WHERE identity = ?")
            .bind(identity.key())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query bond_state")?;

        match row {
            Some(row) => {
                let json: String = row.get("bond_json");
                Ok(Some(serde_json::from_str(&json).context("Failed to deserialize bond")?))
            }
            None => Ok(None),
        }
    }

    async fn save_bond(&self, identity: &Identity, bond: &BondState) -> Result<()> {
        let json = serde_json::to_string(bond)?;
        sqlx::query(
            "INSERT INTO bond_state (identity, bond_json, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(identity) DO UPDATE SET bond_json = excluded.bond_json, updated_at = excluded.updated_at",
        )
        .bind(identity.key())
        .bind(json)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to save bond")?;
        Ok(())
    }

    async fn append_memory(&self, identity: &Identity, entry: &MemoryEntry) -> Result<()> {
        let json = serde_json::to_string(entry)?;
        sqlx::query(
            "INSERT INTO memory_log (identity, trust_threshold, timestamp, entry_json) VALUES (?, ?, ?, ?)",
        )
        .bind(identity.key())
        .bind(entry.trust_threshold)
        .bind(entry.timestamp.timestamp_millis())
        .bind(json)
        .execute(&self.pool)
        .await
        .context("Failed to append memory")?;
        Ok(())
    }

    async fn memories(&self, identity: &Identity) -> Result<Vec<MemoryEntry>> {
        let rows = sqlx::query(
            "SELECT entry_json FROM memory_log WHERE identity = ? ORDER BY timestamp ASC, id ASC",
        )
        .bind(identity.key())
        .fetch_all(&self.pool)
        .await
        .context("Failed to query memory_log")?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let json: String = row.get("entry_json");
            match serde_json::from_str(&json) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!("Skipping unreadable memory entry: {}", e),
            }
        }
        Ok(entries)
    }

    async fn recall_candidates(
        &self,
        identity: &Identity,
        max_trust: f32,
        window: usize,
    ) -> Result<Vec<MemoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT entry_json FROM memory_log
            WHERE identity = ? AND trust_threshold <= ?
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(identity.key())
        .bind(max_trust)
        .bind(i64::try_from(window).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .context("Failed to query recall candidates")?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows.into_iter().rev() {
            let json: String = row.get("entry_json");
            match serde_json::from_str(&json) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!("Skipping unreadable memory entry: {}", e),
            }
        }
        Ok(entries)
    }

    async fn append_trend(
        &self,
        identity: &Identity,
        point: &SentimentTrendPoint,
        capacity: usize,
    ) -> Result<()> {
        let key = identity.key();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO sentiment_trend (identity, valence, activation, timestamp) VALUES (?, ?, ?, ?)",
        )
        .bind(&key)
        .bind(point.valence)
        .bind(point.activation)
        .bind(point.timestamp.timestamp_millis())
        .execute(&mut *tx)
        .await
        .context("Failed to append trend point")?;

        sqlx::query(
            r#"
            DELETE FROM sentiment_trend
            WHERE identity = ? AND id NOT IN (
                SELECT id FROM sentiment_trend WHERE identity = ? ORDER BY id DESC LIMIT ?
            )
            "#,
        )
        .bind(&key)
        .bind(&key)
        .bind(capacity as i64)
        .execute(&mut *tx)
        .await
        .context("Failed to trim trend")?;

        tx.commit().await?;
        Ok(())
    }

    async fn trend(&self, identity: &Identity) -> Result<Vec<SentimentTrendPoint>> {
        let rows = sqlx::query(
            "SELECT valence, activation, timestamp FROM sentiment_trend WHERE identity = ? ORDER BY id ASC",
        )
        .bind(identity.key())
        .fetch_all(&self.pool)
        .await
        .context("Failed to query sentiment_trend")?;

        let mut points = Vec::with_capacity(rows.len());
        for row in rows {
            let ms: i64 = row.get("timestamp");
            let Some(timestamp) = Utc.timestamp_millis_opt(ms).single() else {
                tracing::warn!("Skipping trend point with invalid timestamp {}", ms);
                continue;
            };
            points.push(SentimentTrendPoint {
                valence: row.get::<f64, _>("valence") as f32,
                activation: row.get::<f64, _>("activation") as f32,
                timestamp,
            });
        }
        Ok(points)
    }

    async fn load_synchrony(&self, identity: &Identity) -> Result<Option<f32>> {
        let row = sqlx::query("SELECT score FROM synchrony WHERE identity = ?")
            .bind(identity.key())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query synchrony")?;
        Ok(row.map(|r| r.get::<f64, _>("score") as f32))
    }

    async fn save_synchrony(&self, identity: &Identity, score: f32) -> Result<()> {
        sqlx::query(
            "INSERT INTO synchrony (identity, score) VALUES (?, ?) \
             ON CONFLICT(identity) DO UPDATE SET score = excluded.score",
        )
        .bind(identity.key())
        .bind(score)
        .execute(&self.pool)
        .await
        .context("Failed to save synchrony")?;
        Ok(())
    }
}
