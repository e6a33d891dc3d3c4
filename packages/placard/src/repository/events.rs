//! Append-only analytics event log. Rollups are grouped in SQL.

use async_trait::async_trait;
use sqlx::Row;
use tracing::{debug, warn};

use placard_core::error::Result;
use placard_core::metrics::{DateRange, EventKind, EventLog, EventRecord, EventTally};
use placard_core::EntityId;

use super::{InventoryRepository, backend};

#[async_trait]
impl EventLog for InventoryRepository {
    async fn tally(&self, subject: &EntityId, range: &DateRange) -> Result<EventTally> {
        let rows = sqlx::query(
            r#"
            SELECT kind, COUNT(*) AS n
            FROM analytics_events
            WHERE subject_id = ? AND occurred_at >= ? AND occurred_at <= ?
            GROUP BY kind
            "#,
        )
        .bind(subject.as_str())
        .bind(range.start.timestamp_millis())
        .bind(range.end.timestamp_millis())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut tally = EventTally::default();
        for row in rows {
            let kind: String = row.get("kind");
            let n: i64 = row.get("n");
            match kind.parse::<EventKind>() {
                Ok(kind) => tally.add(kind, n as u64),
                Err(e) => warn!(subject = %subject, "skipping events: {e}"),
            }
        }
        Ok(tally)
    }

    async fn append(&self, event: &EventRecord) -> Result<()> {
        sqlx::query("INSERT INTO analytics_events (kind, subject_id, occurred_at) VALUES (?, ?, ?)")
            .bind(event.kind.as_str())
            .bind(event.subject_id.as_str())
            .bind(event.occurred_at.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        debug!(kind = %event.kind, subject = %event.subject_id, "appended event");
        Ok(())
    }
}
