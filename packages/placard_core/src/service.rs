//! Per-entity-kind facade over the connection, search, metrics, and
//! lifecycle operations.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::connection::{self, Page, Pagination, PaginationArgs, PaginationLimits};
use crate::criteria::Criteria;
use crate::entity::{Entity, EntityId};
use crate::error::Result;
use crate::lifecycle::{Ack, AttributionStamper, Authorizer, LifecycleController, Principal};
use crate::metrics::{self, DateRange, EventLog, MetricsSummary};
use crate::search::{self, SearchIndex};
use crate::sort::SortSpec;
use crate::store::EntityStore;

pub struct InventoryService<E: Entity> {
    store: Arc<dyn EntityStore<E>>,
    index: Arc<dyn SearchIndex<E>>,
    events: Arc<dyn EventLog>,
    authorizer: Arc<dyn Authorizer>,
    lifecycle: LifecycleController<E>,
    limits: PaginationLimits,
}

impl<E: Entity> Clone for InventoryService<E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            index: Arc::clone(&self.index),
            events: Arc::clone(&self.events),
            authorizer: Arc::clone(&self.authorizer),
            lifecycle: self.lifecycle.clone(),
            limits: self.limits,
        }
    }
}

impl<E: Entity> InventoryService<E> {
    pub fn new(
        store: Arc<dyn EntityStore<E>>,
        index: Arc<dyn SearchIndex<E>>,
        events: Arc<dyn EventLog>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        let lifecycle = LifecycleController::new(Arc::clone(&store), Arc::clone(&authorizer));
        Self {
            store,
            index,
            events,
            authorizer,
            lifecycle,
            limits: PaginationLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: PaginationLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_stamper(mut self, stamper: Arc<dyn AttributionStamper>) -> Self {
        self.lifecycle = self.lifecycle.with_stamper(stamper);
        self
    }

    pub fn limits(&self) -> &PaginationLimits {
        &self.limits
    }

    /// Authorize, then validate pagination. Both happen before any backend call.
    fn prepare(&self, args: PaginationArgs) -> Result<(Principal, Pagination)> {
        let principal = self.authorizer.check().inspect_err(|e| {
            warn!(kind = E::KIND, error = %e, "rejected read");
        })?;
        let pagination = Pagination::from_args(args, &self.limits)?;
        Ok((principal, pagination))
    }

    pub async fn list_entities(
        &self,
        criteria: &Criteria,
        args: PaginationArgs,
        sort: SortSpec,
        with_total: bool,
    ) -> Result<Page<E>> {
        let (_, pagination) = self.prepare(args)?;
        connection::resolve(&*self.store, criteria, sort, &pagination, with_total).await
    }

    pub async fn search_entities(
        &self,
        phrase: &str,
        args: PaginationArgs,
        filter: &Criteria,
        with_total: bool,
    ) -> Result<Page<E>> {
        let (_, pagination) = self.prepare(args)?;
        search::search(&*self.index, phrase, filter, &pagination, with_total).await
    }

    pub async fn autocomplete_entities(
        &self,
        phrase: &str,
        args: PaginationArgs,
        filter: &Criteria,
        with_total: bool,
    ) -> Result<Page<E>> {
        let (_, pagination) = self.prepare(args)?;
        search::autocomplete(&*self.index, phrase, filter, &pagination, with_total).await
    }

    pub async fn entity_metrics(
        &self,
        id: &EntityId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<MetricsSummary> {
        self.authorizer.check()?;
        metrics::summarize(&*self.events, id, &DateRange::new(start, end)).await
    }

    pub async fn get_entity(&self, id: &EntityId) -> Result<E> {
        self.lifecycle.get(id).await
    }

    pub async fn create_entity(&self, draft: E::Draft) -> Result<E> {
        self.lifecycle.create(draft).await
    }

    pub async fn update_entity(&self, id: &EntityId, patch: E::Patch) -> Result<E> {
        self.lifecycle.update(id, patch).await
    }

    pub async fn delete_entity(&self, id: &EntityId) -> Result<Ack> {
        self.lifecycle.delete(id).await
    }
}
