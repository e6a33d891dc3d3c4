//! Document store contract consumed by the connection resolver and lifecycle.

use std::cmp::Ordering;

use async_trait::async_trait;

use crate::criteria::Criteria;
use crate::entity::{Entity, EntityId};
use crate::error::{QueryError, Result};
use crate::sort::{SortKey, SortSpec};

/// Range condition for a keyset fetch: rows strictly after `after` in `order`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seek {
    pub order: SortSpec,
    pub after: Option<SortKey>,
}

impl Seek {
    pub fn from_start(order: SortSpec) -> Self {
        Self { order, after: None }
    }

    pub fn admits(&self, key: &SortKey) -> bool {
        match &self.after {
            None => true,
            Some(bound) => self.order.compare(key, bound) == Ordering::Greater,
        }
    }
}

#[async_trait]
pub trait EntityStore<E: Entity>: Send + Sync {
    /// Rows matching `criteria` that `seek` admits, ordered by `seek.order`
    /// (value then id), at most `limit`.
    async fn find(&self, criteria: &Criteria, seek: &Seek, limit: usize) -> Result<Vec<E>>;

    async fn count(&self, criteria: &Criteria) -> Result<u64>;

    /// Direct lookup; soft-deleted rows are returned too.
    async fn find_by_id(&self, id: &EntityId) -> Result<Option<E>>;

    /// Insert or replace by id. A uniqueness violation is a `Validation` error.
    async fn save(&self, entity: E) -> Result<E>;

    async fn find_strict_active_by_id(&self, id: &EntityId) -> Result<E> {
        match self.find_by_id(id).await? {
            Some(entity) if !entity.is_deleted() => Ok(entity),
            _ => Err(QueryError::not_found(E::KIND, id)),
        }
    }
}
