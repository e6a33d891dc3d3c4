//! Create, update, and soft-delete with authorization and attribution.
//!
//! Every operation authorizes before touching the store, and every write ends
//! in exactly one [`EntityStore::save`]. Deletion flips the record to
//! `deleted`; rows are never removed.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::entity::{Entity, EntityId, LifecycleTransition, Record};
use crate::error::{QueryError, Result};
use crate::store::EntityStore;

/// The acting caller, as established by an [`Authorizer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
        }
    }
}

pub trait Authorizer: Send + Sync {
    /// The current principal, or [`QueryError::Unauthorized`].
    fn check(&self) -> Result<Principal>;
}

/// Authorizer with a fixed outcome, as used by the CLI and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthorizer {
    principal: Option<Principal>,
}

impl StaticAuthorizer {
    pub fn allow(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
        }
    }

    pub fn deny() -> Self {
        Self { principal: None }
    }
}

impl Authorizer for StaticAuthorizer {
    fn check(&self) -> Result<Principal> {
        self.principal.clone().ok_or(QueryError::Unauthorized)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stamp {
    Created,
    Updated,
    Deleted,
}

pub trait AttributionStamper: Send + Sync {
    fn stamp(&self, record: &mut Record, principal: &Principal, stamp: Stamp);
}

/// Writes the principal id into `created_by` / `updated_by`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldStamper;

impl AttributionStamper for FieldStamper {
    fn stamp(&self, record: &mut Record, principal: &Principal, stamp: Stamp) {
        if stamp == Stamp::Created {
            record.created_by = Some(principal.id.clone());
        }
        record.updated_by = Some(principal.id.clone());
        debug!(id = %record.id, principal = %principal.id, ?stamp, "stamped attribution");
    }
}

/// Successful-write acknowledgement. Serializes as `"ok"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ack {
    Ok,
}

pub struct LifecycleController<E: Entity> {
    store: Arc<dyn EntityStore<E>>,
    authorizer: Arc<dyn Authorizer>,
    stamper: Arc<dyn AttributionStamper>,
}

impl<E: Entity> Clone for LifecycleController<E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            authorizer: Arc::clone(&self.authorizer),
            stamper: Arc::clone(&self.stamper),
        }
    }
}

impl<E: Entity> LifecycleController<E> {
    pub fn new(store: Arc<dyn EntityStore<E>>, authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            store,
            authorizer,
            stamper: Arc::new(FieldStamper),
        }
    }

    pub fn with_stamper(mut self, stamper: Arc<dyn AttributionStamper>) -> Self {
        self.stamper = stamper;
        self
    }

    fn authorize(&self) -> Result<Principal> {
        self.authorizer.check().inspect_err(|e| {
            warn!(kind = E::KIND, error = %e, "rejected lifecycle request");
        })
    }

    /// Strict active lookup; soft-deleted rows are `NotFound`.
    #[tracing::instrument(skip_all, fields(kind = E::KIND, id = %id))]
    pub async fn get(&self, id: &EntityId) -> Result<E> {
        self.authorize()?;
        self.store.find_strict_active_by_id(id).await
    }

    #[tracing::instrument(skip_all, fields(kind = E::KIND))]
    pub async fn create(&self, draft: E::Draft) -> Result<E> {
        let principal = self.authorize()?;
        let mut entity = E::from_draft(Record::new(Utc::now()), draft)?;
        self.stamper
            .stamp(entity.record_mut(), &principal, Stamp::Created);

        let saved = self.store.save(entity).await?;
        info!(id = %saved.id(), principal = %principal.id, "created {}", E::KIND);
        Ok(saved)
    }

    #[tracing::instrument(skip_all, fields(kind = E::KIND, id = %id))]
    pub async fn update(&self, id: &EntityId, patch: E::Patch) -> Result<E> {
        let principal = self.authorize()?;
        let mut entity = self.store.find_strict_active_by_id(id).await?;

        entity.apply(patch)?;
        entity
            .record_mut()
            .transition(LifecycleTransition::Update, Utc::now())
            .map_err(|_| QueryError::not_found(E::KIND, id))?;
        self.stamper
            .stamp(entity.record_mut(), &principal, Stamp::Updated);

        let saved = self.store.save(entity).await?;
        info!(principal = %principal.id, "updated {}", E::KIND);
        Ok(saved)
    }

    #[tracing::instrument(skip_all, fields(kind = E::KIND, id = %id))]
    pub async fn delete(&self, id: &EntityId) -> Result<Ack> {
        let principal = self.authorize()?;
        let mut entity = self.store.find_strict_active_by_id(id).await?;

        entity
            .record_mut()
            .transition(LifecycleTransition::Delete, Utc::now())
            .map_err(|_| QueryError::not_found(E::KIND, id))?;
        self.stamper
            .stamp(entity.record_mut(), &principal, Stamp::Deleted);

        self.store.save(entity).await?;
        info!(principal = %principal.id, "deleted {}", E::KIND);
        Ok(Ack::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Advertiser, AdvertiserInput, Placement, PlacementInput};
    use crate::memory::MemoryStore;

    fn controller<E: Entity>(
        store: &Arc<MemoryStore<E>>,
        authorizer: StaticAuthorizer,
    ) -> LifecycleController<E> {
        LifecycleController::new(store.clone(), Arc::new(authorizer))
    }

    fn alice() -> StaticAuthorizer {
        StaticAuthorizer::allow(Principal::new("alice"))
    }

    fn draft(name: &str) -> PlacementInput {
        PlacementInput {
            name: Some(name.into()),
            publisher_id: Some("pub-1".into()),
            template_id: Some("tpl-1".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_stamps_creator_and_persists_once() {
        let store = Arc::new(MemoryStore::<Placement>::new());
        let ctl = controller(&store, alice());

        let p = ctl.create(draft("Homepage")).await.unwrap();
        assert_eq!(p.record.created_by.as_deref(), Some("alice"));
        assert_eq!(p.record.updated_by.as_deref(), Some("alice"));
        assert!(!p.is_deleted());
        assert_eq!(store.calls(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn create_with_missing_fields_never_saves() {
        let store = Arc::new(MemoryStore::<Placement>::new());
        let ctl = controller(&store, alice());

        let err = ctl
            .create(PlacementInput {
                name: Some("x".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        let QueryError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.fields.len(), 2);
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn duplicate_advertiser_name_is_a_validation_error() {
        let store = Arc::new(MemoryStore::<Advertiser>::new());
        let ctl = controller(&store, alice());
        let input = || AdvertiserInput {
            name: Some("Acme".into()),
        };

        ctl.create(input()).await.unwrap();
        let err = ctl.create(input()).await.unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn unauthorized_callers_never_reach_the_store() {
        let store = Arc::new(MemoryStore::<Placement>::new());
        let seeded = controller(&store, alice())
            .create(draft("Homepage"))
            .await
            .unwrap();
        let before = store.calls();

        let ctl = controller(&store, StaticAuthorizer::deny());
        let id = seeded.id().clone();
        assert!(matches!(
            ctl.create(draft("Other")).await,
            Err(QueryError::Unauthorized)
        ));
        assert!(matches!(
            ctl.update(&id, PlacementInput::default()).await,
            Err(QueryError::Unauthorized)
        ));
        assert!(matches!(ctl.delete(&id).await, Err(QueryError::Unauthorized)));
        assert!(matches!(ctl.get(&id).await, Err(QueryError::Unauthorized)));
        assert_eq!(store.calls(), before);
    }

    #[tokio::test]
    async fn update_applies_patch_and_stamps_updater() {
        let store = Arc::new(MemoryStore::<Placement>::new());
        let created = controller(&store, alice())
            .create(draft("Homepage"))
            .await
            .unwrap();

        let bob = controller(&store, StaticAuthorizer::allow(Principal::new("bob")));
        let updated = bob
            .update(
                created.id(),
                PlacementInput {
                    name: Some("Homepage Top".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Homepage Top");
        assert_eq!(updated.publisher_id.as_str(), "pub-1");
        assert_eq!(updated.record.created_by.as_deref(), Some("alice"));
        assert_eq!(updated.record.updated_by.as_deref(), Some("bob"));
        assert!(updated.record.updated_at >= created.record.updated_at);
    }

    #[tokio::test]
    async fn invalid_patch_leaves_stored_entity_unchanged() {
        let store = Arc::new(MemoryStore::<Placement>::new());
        let ctl = controller(&store, alice());
        let created = ctl.create(draft("Homepage")).await.unwrap();

        let err = ctl
            .update(
                created.id(),
                PlacementInput {
                    reserve_pct: Some(1.5),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
        assert_eq!(ctl.get(created.id()).await.unwrap().reserve_pct, None);
    }

    #[tokio::test]
    async fn delete_is_soft_and_terminal() {
        let store = Arc::new(MemoryStore::<Placement>::new());
        let ctl = controller(&store, alice());
        let created = ctl.create(draft("Homepage")).await.unwrap();
        let id = created.id().clone();

        assert_eq!(ctl.delete(&id).await.unwrap(), Ack::Ok);

        let row = store.find_by_id(&id).await.unwrap().unwrap();
        assert!(row.is_deleted());
        assert_eq!(row.record.updated_by.as_deref(), Some("alice"));

        assert!(matches!(
            ctl.delete(&id).await,
            Err(QueryError::NotFound { .. })
        ));
        assert!(matches!(
            ctl.update(&id, draft("Again")).await,
            Err(QueryError::NotFound { .. })
        ));
        assert!(matches!(ctl.get(&id).await, Err(QueryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn writes_to_absent_ids_are_not_found() {
        let store = Arc::new(MemoryStore::<Placement>::new());
        let ctl = controller(&store, alice());
        let missing = EntityId::from("missing");
        let err = ctl.update(&missing, draft("x")).await.unwrap_err();
        assert_eq!(err.to_string(), "placement not found: missing");
        assert!(matches!(
            ctl.delete(&missing).await,
            Err(QueryError::NotFound { .. })
        ));
    }

    #[test]
    fn ack_serializes_as_ok() {
        assert_eq!(serde_json::to_string(&Ack::Ok).unwrap(), "\"ok\"");
    }
}
