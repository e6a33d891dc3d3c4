//! Query and aggregation core for Placard inventory entities.
//!
//! Cursor-paginated connections, search/autocomplete fan-out, analytics rollups,
//! and the soft-delete lifecycle. Storage, search, and authorization are traits;
//! see `memory` for the in-process implementations.

pub mod connection;
pub mod criteria;
pub mod cursor;
pub mod entity;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod metrics;
pub mod search;
pub mod service;
pub mod sort;
pub mod store;

pub use connection::{Page, PageInfo, Pagination, PaginationArgs, PaginationLimits};
pub use criteria::Criteria;
pub use cursor::Cursor;
pub use entity::{Advertiser, Entity, EntityId, LifecycleState, Placement, Record};
pub use error::{QueryError, Result};
pub use lifecycle::{Ack, AttributionStamper, Authorizer, LifecycleController, Principal};
pub use metrics::{DateRange, EventKind, EventLog, EventRecord, MetricsSummary};
pub use search::SearchIndex;
pub use service::InventoryService;
pub use sort::{SortDirection, SortField, SortKey, SortSpec, SortValue};
pub use store::{EntityStore, Seek};
