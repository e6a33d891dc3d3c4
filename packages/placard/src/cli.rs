//! Subcommand arguments and their dispatch onto the inventory services.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde_json::{Value, json};

use placard_core::entity::{AdvertiserInput, PlacementInput};
use placard_core::metrics::{EventKind, EventLog, EventRecord};
use placard_core::{Criteria, Cursor, EntityId, InventoryService, PaginationArgs, SortField, SortSpec};

use crate::repository::{Collection, InventoryRepository};

/// Pagination flags shared by every listing command.
#[derive(Args, Debug, Default)]
pub struct PageArgs {
    /// Page forward: number of items
    #[arg(long)]
    first: Option<u32>,

    /// Page forward: cursor to start after
    #[arg(long)]
    after: Option<String>,

    /// Page backward: number of items
    #[arg(long)]
    last: Option<u32>,

    /// Page backward: cursor to end before
    #[arg(long)]
    before: Option<String>,

    /// Include the total match count
    #[arg(long)]
    total: bool,
}

impl PageArgs {
    fn pagination(&self) -> PaginationArgs {
        PaginationArgs {
            first: self.first,
            after: self.after.clone().map(Cursor::from),
            last: self.last,
            before: self.before.clone().map(Cursor::from),
        }
    }
}

/// Store-side filter flags.
#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    /// Equality filter, repeatable
    #[arg(long = "filter", value_name = "FIELD=VALUE")]
    filters: Vec<String>,

    /// Include soft-deleted entities
    #[arg(long)]
    include_deleted: bool,
}

impl FilterArgs {
    fn criteria(&self) -> Result<Criteria> {
        let mut criteria = Criteria::parse_pairs(self.filters.iter().map(String::as_str))
            .map_err(placard_core::QueryError::from)?;
        criteria.include_deleted = self.include_deleted;
        Ok(criteria)
    }
}

/// Read and delete operations common to every entity kind.
#[derive(Subcommand, Debug)]
pub enum QueryCommand {
    /// Cursor-paginated listing
    List {
        #[command(flatten)]
        filter: FilterArgs,

        /// Sort field: id, name, created_at, updated_at
        #[arg(long, default_value = "id")]
        sort: SortField,

        /// Sort descending
        #[arg(long)]
        desc: bool,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Fetch one active entity by id
    Get { id: String },

    /// Ranked full-text search
    Search {
        /// Free-text phrase (empty matches everything)
        #[arg(default_value = "")]
        phrase: String,

        #[command(flatten)]
        filter: FilterArgs,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Prefix search on name
    Autocomplete {
        #[arg(default_value = "")]
        phrase: String,

        #[command(flatten)]
        filter: FilterArgs,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Soft-delete an entity
    Delete { id: String },

    /// Load/view/click rollup for an entity
    Metrics {
        id: String,

        /// Range start (RFC 3339)
        #[arg(long)]
        from: DateTime<Utc>,

        /// Range end, inclusive (RFC 3339)
        #[arg(long)]
        to: DateTime<Utc>,
    },
}

#[derive(Args, Debug, Default)]
pub struct PlacementFields {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    publisher_id: Option<String>,
    #[arg(long)]
    template_id: Option<String>,
    #[arg(long)]
    topic_id: Option<String>,
    /// Share of inventory held back, between 0 and 1
    #[arg(long)]
    reserve_pct: Option<f64>,
}

impl From<PlacementFields> for PlacementInput {
    fn from(f: PlacementFields) -> Self {
        Self {
            name: f.name,
            publisher_id: f.publisher_id,
            template_id: f.template_id,
            topic_id: f.topic_id,
            reserve_pct: f.reserve_pct,
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct AdvertiserFields {
    #[arg(long)]
    name: Option<String>,
}

impl From<AdvertiserFields> for AdvertiserInput {
    fn from(f: AdvertiserFields) -> Self {
        Self { name: f.name }
    }
}

#[derive(Subcommand, Debug)]
pub enum PlacementCommand {
    #[command(flatten)]
    Query(QueryCommand),

    /// Create a placement
    Create(PlacementFields),

    /// Update the given fields of a placement
    Update {
        id: String,
        #[command(flatten)]
        fields: PlacementFields,
    },
}

#[derive(Subcommand, Debug)]
pub enum AdvertiserCommand {
    #[command(flatten)]
    Query(QueryCommand),

    /// Create an advertiser
    Create(AdvertiserFields),

    /// Rename an advertiser
    Update {
        id: String,
        #[command(flatten)]
        fields: AdvertiserFields,
    },
}

#[derive(Subcommand, Debug)]
pub enum EventCommand {
    /// Append a tracking event
    Record {
        /// load, view, or click (the `-js` wire names are accepted too)
        kind: EventKind,

        /// Entity the event belongs to
        subject: String,

        /// Event time (RFC 3339, defaults to now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
}

pub async fn placement_command(
    service: &InventoryService<placard_core::Placement>,
    command: PlacementCommand,
) -> Result<Value> {
    match command {
        PlacementCommand::Query(q) => query_command(service, q).await,
        PlacementCommand::Create(fields) => {
            Ok(json!(service.create_entity(fields.into()).await?))
        }
        PlacementCommand::Update { id, fields } => Ok(json!(
            service
                .update_entity(&EntityId::from(id), fields.into())
                .await?
        )),
    }
}

pub async fn advertiser_command(
    service: &InventoryService<placard_core::Advertiser>,
    command: AdvertiserCommand,
) -> Result<Value> {
    match command {
        AdvertiserCommand::Query(q) => query_command(service, q).await,
        AdvertiserCommand::Create(fields) => {
            Ok(json!(service.create_entity(fields.into()).await?))
        }
        AdvertiserCommand::Update { id, fields } => Ok(json!(
            service
                .update_entity(&EntityId::from(id), fields.into())
                .await?
        )),
    }
}

async fn query_command<E: Collection>(
    service: &InventoryService<E>,
    command: QueryCommand,
) -> Result<Value> {
    let value = match command {
        QueryCommand::List {
            filter,
            sort,
            desc,
            page,
        } => {
            let spec = if desc {
                SortSpec::desc(sort)
            } else {
                SortSpec::asc(sort)
            };
            json!(
                service
                    .list_entities(&filter.criteria()?, page.pagination(), spec, page.total)
                    .await?
            )
        }
        QueryCommand::Get { id } => json!(service.get_entity(&EntityId::from(id)).await?),
        QueryCommand::Search {
            phrase,
            filter,
            page,
        } => json!(
            service
                .search_entities(&phrase, page.pagination(), &filter.criteria()?, page.total)
                .await?
        ),
        QueryCommand::Autocomplete {
            phrase,
            filter,
            page,
        } => json!(
            service
                .autocomplete_entities(&phrase, page.pagination(), &filter.criteria()?, page.total)
                .await?
        ),
        QueryCommand::Delete { id } => json!(service.delete_entity(&EntityId::from(id)).await?),
        QueryCommand::Metrics { id, from, to } => json!(
            service
                .entity_metrics(&EntityId::from(id), from, to)
                .await?
        ),
    };
    Ok(value)
}

pub async fn event_command(repo: &InventoryRepository, command: EventCommand) -> Result<Value> {
    match command {
        EventCommand::Record { kind, subject, at } => {
            let event = EventRecord::new(kind, EntityId::from(subject), at.unwrap_or_else(Utc::now));
            repo.append(&event).await?;
            Ok(json!(event))
        }
    }
}
