//! Entity envelope, lifecycle state machine, and the `Entity` contract.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ValidationErrors;
use crate::sort::{SortField, SortKey, SortValue};

mod advertiser;
mod placement;

pub use advertiser::{Advertiser, AdvertiserInput};
pub use placement::{Placement, PlacementInput};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// UUIDv7, so ids sort in creation order.
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    #[default]
    Active,
    Deleted,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

impl FromStr for LifecycleState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "deleted" => Ok(Self::Deleted),
            _ => Err(format!("unknown lifecycle state: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleTransition {
    /// active → active (mutation in place)
    Update,
    /// active → deleted
    Delete,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("deleted is a terminal state")]
    TerminalState,
}

impl LifecycleState {
    pub fn apply(self, transition: LifecycleTransition) -> Result<Self, TransitionError> {
        match (self, transition) {
            (Self::Deleted, _) => Err(TransitionError::TerminalState),
            (Self::Active, LifecycleTransition::Update) => Ok(Self::Active),
            (Self::Active, LifecycleTransition::Delete) => Ok(Self::Deleted),
        }
    }

    pub fn is_deleted(self) -> bool {
        self == Self::Deleted
    }
}

/// Fields shared by every stored entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: EntityId,
    pub state: LifecycleState,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
}

impl Record {
    pub fn new(now: DateTime<Utc>) -> Self {
        let now = truncate_millis(now);
        Self {
            id: EntityId::generate(),
            state: LifecycleState::Active,
            created_at: now,
            updated_at: now,
            created_by: None,
            updated_by: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<EntityId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn is_deleted(&self) -> bool {
        self.state.is_deleted()
    }

    pub fn transition(
        &mut self,
        transition: LifecycleTransition,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.state = self.state.apply(transition)?;
        self.updated_at = truncate_millis(now);
        Ok(())
    }
}

/// Stores keep millisecond precision; keep in-memory values identical.
pub fn truncate_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(t.timestamp_millis()).unwrap_or(t)
}

/// A plain-data inventory entity the query layer can page, search, and mutate.
///
/// Construction and normalization are explicit functions rather than schema hooks:
/// the lifecycle controller calls `from_draft` on create and `apply` on update.
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Collection name, used in errors and logs.
    const KIND: &'static str;

    /// Fields a `Criteria` may compare against.
    const FILTER_FIELDS: &'static [&'static str];

    /// Whether `name` must be unique across the collection.
    const UNIQUE_NAME: bool = false;

    type Draft: Send;
    type Patch: Send;

    fn from_draft(record: Record, draft: Self::Draft) -> Result<Self, ValidationErrors>;

    fn apply(&mut self, patch: Self::Patch) -> Result<(), ValidationErrors>;

    fn record(&self) -> &Record;

    fn record_mut(&mut self) -> &mut Record;

    fn name(&self) -> &str;

    /// String form of a filterable field, `None` when unset.
    fn filter_value(&self, field: &str) -> Option<String>;

    /// Text handed to the search index.
    fn search_text(&self) -> String {
        self.name().to_string()
    }

    fn id(&self) -> &EntityId {
        &self.record().id
    }

    fn is_deleted(&self) -> bool {
        self.record().is_deleted()
    }

    fn sort_value(&self, field: SortField) -> SortValue {
        let record = self.record();
        match field {
            SortField::Id => SortValue::Text(record.id.to_string()),
            SortField::Name => SortValue::Text(self.name().to_string()),
            SortField::CreatedAt => SortValue::Int(record.created_at.timestamp_millis()),
            SortField::UpdatedAt => SortValue::Int(record.updated_at.timestamp_millis()),
        }
    }

    fn sort_key(&self, field: SortField) -> SortKey {
        SortKey::new(self.sort_value(field), self.id().clone())
    }
}

/// Trimmed, non-empty text or a "required" error.
pub(crate) fn required_text(
    errors: &mut ValidationErrors,
    field: &str,
    value: Option<String>,
) -> Option<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Some(v),
        _ => {
            errors.push(field, "is required");
            None
        }
    }
}

/// Trimmed text; blank collapses to `None`.
pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deleted_is_terminal() {
        let state = LifecycleState::Active
            .apply(LifecycleTransition::Delete)
            .unwrap();
        assert_eq!(state, LifecycleState::Deleted);
        assert_eq!(
            state.apply(LifecycleTransition::Update),
            Err(TransitionError::TerminalState)
        );
        assert_eq!(
            state.apply(LifecycleTransition::Delete),
            Err(TransitionError::TerminalState)
        );
    }

    #[test]
    fn update_keeps_active() {
        assert_eq!(
            LifecycleState::Active.apply(LifecycleTransition::Update),
            Ok(LifecycleState::Active)
        );
    }

    #[test]
    fn lifecycle_state_roundtrip() {
        for state in [LifecycleState::Active, LifecycleState::Deleted] {
            assert_eq!(state.to_string().parse::<LifecycleState>().unwrap(), state);
        }
        assert!("archived".parse::<LifecycleState>().is_err());
    }

    #[test]
    fn record_truncates_to_millis() {
        let now = Utc::now();
        let record = Record::new(now);
        assert_eq!(record.created_at.timestamp_millis(), now.timestamp_millis());
        assert_eq!(record.created_at.timestamp_subsec_nanos() % 1_000_000, 0);
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn record_transition_touches_updated_at() {
        let t0 = DateTime::from_timestamp_millis(1_000).unwrap();
        let t1 = DateTime::from_timestamp_millis(2_000).unwrap();
        let mut record = Record::new(t0);
        record.transition(LifecycleTransition::Delete, t1).unwrap();
        assert!(record.is_deleted());
        assert_eq!(record.updated_at, t1);
        assert_eq!(record.created_at, t0);
        assert!(record.transition(LifecycleTransition::Update, t1).is_err());
    }
}
