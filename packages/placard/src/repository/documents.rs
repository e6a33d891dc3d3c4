use async_trait::async_trait;
use sqlx::Row;
use tracing::debug;

use placard_core::error::{Result, ValidationErrors};
use placard_core::{Criteria, EntityId, EntityStore, QueryError, Seek, SortDirection};

use super::sql::{Bind, bind_all, criteria_clause, decode_doc};
use super::{Collection, InventoryRepository, backend};

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

#[async_trait]
impl<E: Collection> EntityStore<E> for InventoryRepository {
    async fn find(&self, criteria: &Criteria, seek: &Seek, limit: usize) -> Result<Vec<E>> {
        let mut clause = criteria_clause::<E>(criteria)?;

        // Columns share the sort field names.
        let column = seek.order.field.as_str();
        let dir = seek.order.direction;
        if let Some(after) = &seek.after {
            let cmp = match dir {
                SortDirection::Asc => ">",
                SortDirection::Desc => "<",
            };
            let value = Bind::from(&after.value);
            clause.push(
                &format!("(t.{column} {cmp} ? OR (t.{column} = ? AND t.id {cmp} ?))"),
                [value.clone(), value, Bind::Text(after.id.to_string())],
            );
        }

        let sql = format!(
            "SELECT t.doc FROM {} t WHERE {} ORDER BY t.{column} {dir}, t.id {dir} LIMIT ?",
            E::TABLE,
            clause.sql,
            dir = dir.as_sql(),
        );
        debug!(table = E::TABLE, %sql, "find");

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = bind_all(sqlx::query(&sql), &clause.binds)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        rows.iter()
            .map(|row| decode_doc::<E>(row.get::<&str, _>("doc")))
            .collect()
    }

    async fn count(&self, criteria: &Criteria) -> Result<u64> {
        let clause = criteria_clause::<E>(criteria)?;
        let sql = format!(
            "SELECT COUNT(*) AS total FROM {} t WHERE {}",
            E::TABLE,
            clause.sql
        );
        let row = bind_all(sqlx::query(&sql), &clause.binds)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        let total: i64 = row.try_get("total").map_err(backend)?;
        Ok(total as u64)
    }

    async fn find_by_id(&self, id: &EntityId) -> Result<Option<E>> {
        let sql = format!("SELECT doc FROM {} WHERE id = ?", E::TABLE);
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        row.map(|row| decode_doc::<E>(row.get::<&str, _>("doc")))
            .transpose()
    }

    async fn save(&self, entity: E) -> Result<E> {
        let doc = serde_json::to_string(&entity).map_err(QueryError::backend)?;
        let record = entity.record();

        let sql = format!(
            r#"
            INSERT INTO {} (id, name, deleted, created_at, updated_at, created_by, updated_by, doc, body)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                deleted = excluded.deleted,
                updated_at = excluded.updated_at,
                updated_by = excluded.updated_by,
                doc = excluded.doc,
                body = excluded.body
            "#,
            E::TABLE
        );

        let result = sqlx::query(&sql)
            .bind(record.id.as_str())
            .bind(entity.name())
            .bind(record.is_deleted())
            .bind(record.created_at.timestamp_millis())
            .bind(record.updated_at.timestamp_millis())
            .bind(record.created_by.as_deref())
            .bind(record.updated_by.as_deref())
            .bind(doc.as_str())
            .bind(entity.search_text())
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => {
                debug!(table = E::TABLE, id = %record.id, "saved document");
                Ok(entity)
            }
            Err(e) if is_unique_violation(&e) => {
                Err(ValidationErrors::single("name", "must be unique").into())
            }
            Err(e) => Err(backend(e)),
        }
    }
}
