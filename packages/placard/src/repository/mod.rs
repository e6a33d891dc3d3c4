// Repository layer: one SQLite pool serving every collaborator trait of the
// query core. Each concern lives in its own file with its own trait impl.

use sqlx::sqlite::SqlitePool;

use placard_core::{Advertiser, Entity, Placement, QueryError};

mod documents;
mod events;
mod search;
mod sql;

#[cfg(test)]
pub(crate) mod test_helpers;

/// An entity kind with a backing document table and FTS5 index.
pub trait Collection: Entity {
    const TABLE: &'static str;
    const FTS_TABLE: &'static str;
}

impl Collection for Placement {
    const TABLE: &'static str = "placements";
    const FTS_TABLE: &'static str = "placements_fts";
}

impl Collection for Advertiser {
    const TABLE: &'static str = "advertisers";
    const FTS_TABLE: &'static str = "advertisers_fts";
}

#[derive(Clone)]
pub struct InventoryRepository {
    pub(crate) pool: SqlitePool,
}

impl InventoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

pub(crate) fn backend(err: sqlx::Error) -> QueryError {
    QueryError::backend(err)
}
