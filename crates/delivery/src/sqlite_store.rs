use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    courier_routing::Tier,
    sqlx::{SqlitePool, sqlite::SqlitePoolOptions},
};

use crate::{
    error::{Error, Result},
    fallback::{Disposition, FallbackRecord, FallbackStore},
};

/// SQLite-backed fallback store.
pub struct SqliteFallbackStore {
    pool: SqlitePool,
}

type Row = (
    String,
    Option<String>,
    Option<String>,
    i64,
    i64,
    Option<i64>,
    String,
    String,
    i64,
);

impl SqliteFallbackStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `url` and ensure the schema.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(url)
            .await?;
        Self::init(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS fallback_records (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                disposition       TEXT    NOT NULL,
                intended_workflow TEXT,
                routing_error     TEXT,
                chat_id           INTEGER NOT NULL,
                sender_id         INTEGER NOT NULL,
                message_id        INTEGER,
                text              TEXT    NOT NULL,
                payload           TEXT    NOT NULL,
                recorded_at       INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_fallback_disposition_recorded
             ON fallback_records (disposition, recorded_at DESC)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}

fn from_row(r: Row) -> Result<FallbackRecord> {
    let intended_workflow = r
        .1
        .as_deref()
        .map(str::parse::<Tier>)
        .transpose()
        .map_err(|e| Error::Corrupt(e.to_string()))?;
    let recorded_at = DateTime::<Utc>::from_timestamp_millis(r.8)
        .ok_or_else(|| Error::Corrupt(format!("bad timestamp {}", r.8)))?;
    Ok(FallbackRecord {
        disposition: r.0.parse()?,
        intended_workflow,
        routing_error: r.2,
        chat_id: r.3,
        sender_id: r.4,
        message_id: r.5,
        text: r.6,
        payload: serde_json::from_str(&r.7)?,
        recorded_at,
    })
}

#[async_trait]
impl FallbackStore for SqliteFallbackStore {
    async fn store(&self, record: &FallbackRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO fallback_records
             (disposition, intended_workflow, routing_error, chat_id, sender_id,
              message_id, text, payload, recorded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.disposition.as_str())
        .bind(record.intended_workflow.map(Tier::as_str))
        .bind(&record.routing_error)
        .bind(record.chat_id)
        .bind(record.sender_id)
        .bind(record.message_id)
        .bind(&record.text)
        .bind(serde_json::to_string(&record.payload)?)
        .bind(record.recorded_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent(
        &self,
        disposition: Option<Disposition>,
        limit: u32,
    ) -> Result<Vec<FallbackRecord>> {
        let rows = sqlx::query_as::<_, Row>(
            "SELECT disposition, intended_workflow, routing_error, chat_id, sender_id,
                    message_id, text, payload, recorded_at
             FROM fallback_records
             WHERE (?1 IS NULL OR disposition = ?1)
             ORDER BY recorded_at DESC, id DESC
             LIMIT ?2",
        )
        .bind(disposition.map(Disposition::as_str))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(from_row).collect()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        courier_channels::{ChatKind, RawEvent},
        courier_routing::normalize,
    };

    async fn store() -> SqliteFallbackStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        SqliteFallbackStore::init(&pool).await.unwrap();
        SqliteFallbackStore::new(pool)
    }

    #[tokio::test]
    async fn stores_and_reads_back() {
        let store = store().await;
        let msg = normalize(&RawEvent::text(-42, 7, ChatKind::Group, "hello?"));
        let record = FallbackRecord::from_message(Disposition::Fallback, &msg)
            .with_intended(Tier::Conversational)
            .with_error("n8n webhook failed");
        store.store(&record).await.unwrap();

        let got = store.recent(None, 10).await.unwrap();
        assert_eq!(got.len(), 1);
        let got = &got[0];
        assert_eq!(got.disposition, Disposition::Fallback);
        assert_eq!(got.intended_workflow, Some(Tier::Conversational));
        assert_eq!(got.routing_error.as_deref(), Some("n8n webhook failed"));
        assert_eq!(got.chat_id, -42);
        assert_eq!(got.payload["text"], "hello?");
        assert_eq!(
            got.recorded_at.timestamp_millis(),
            record.recorded_at.timestamp_millis()
        );
    }

    #[tokio::test]
    async fn recent_filters_by_disposition() {
        let store = store().await;
        let msg = normalize(&RawEvent::text(1, 1, ChatKind::Private, "x"));
        store
            .store(&FallbackRecord::from_message(Disposition::Unclassified, &msg))
            .await
            .unwrap();
        store
            .store(&FallbackRecord::from_message(Disposition::Delivered, &msg))
            .await
            .unwrap();
        store
            .store(&FallbackRecord::critical(1, 1, "panic"))
            .await
            .unwrap();

        let unclassified = store
            .recent(Some(Disposition::Unclassified), 10)
            .await
            .unwrap();
        assert_eq!(unclassified.len(), 1);

        let critical = store
            .recent(Some(Disposition::CriticalError), 10)
            .await
            .unwrap();
        assert_eq!(critical.len(), 1);
        assert!(critical[0].payload.is_null());

        assert_eq!(store.recent(None, 2).await.unwrap().len(), 2);
    }
}
