//! Keyset-paginated connections over an [`EntityStore`].
//!
//! A page is fetched as `size + 1` rows ordered by (sort field, id); the extra
//! row only signals that more data exists in the fetch direction. Backward
//! pages are fetched in reversed order and flipped back before returning, so
//! callers always see rows in the requested sort order.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::criteria::Criteria;
use crate::cursor::{self, Cursor};
use crate::entity::Entity;
use crate::error::{QueryError, Result};
use crate::sort::SortSpec;
use crate::store::{EntityStore, Seek};

/// Raw pagination arguments as a transport layer receives them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationArgs {
    pub first: Option<u32>,
    pub after: Option<Cursor>,
    pub last: Option<u32>,
    pub before: Option<Cursor>,
}

impl PaginationArgs {
    pub fn first(n: u32) -> Self {
        Self {
            first: Some(n),
            ..Default::default()
        }
    }

    pub fn last(n: u32) -> Self {
        Self {
            last: Some(n),
            ..Default::default()
        }
    }

    pub fn after(mut self, cursor: Option<Cursor>) -> Self {
        self.after = cursor;
        self
    }

    pub fn before(mut self, cursor: Option<Cursor>) -> Self {
        self.before = cursor;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationLimits {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for PaginationLimits {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

/// A validated pagination request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pagination {
    Forward { first: u32, after: Option<Cursor> },
    Backward { last: u32, before: Option<Cursor> },
}

impl Pagination {
    pub fn from_args(args: PaginationArgs, limits: &PaginationLimits) -> Result<Self> {
        let forward = args.first.is_some() || args.after.is_some();
        let backward = args.last.is_some() || args.before.is_some();

        match (forward, backward) {
            (true, true) => Err(QueryError::InvalidPagination(
                "`first`/`after` cannot be combined with `last`/`before`".into(),
            )),
            (false, true) => {
                let last = args.last.unwrap_or(limits.default_page_size);
                check_size("last", last, limits)?;
                Ok(Self::Backward {
                    last,
                    before: args.before,
                })
            }
            _ => {
                let first = args.first.unwrap_or(limits.default_page_size);
                check_size("first", first, limits)?;
                Ok(Self::Forward {
                    first,
                    after: args.after,
                })
            }
        }
    }

    pub fn size(&self) -> u32 {
        match self {
            Self::Forward { first, .. } => *first,
            Self::Backward { last, .. } => *last,
        }
    }

    pub fn is_backward(&self) -> bool {
        matches!(self, Self::Backward { .. })
    }
}

fn check_size(arg: &str, n: u32, limits: &PaginationLimits) -> Result<()> {
    if n == 0 {
        return Err(QueryError::InvalidPagination(format!(
            "`{arg}` must be at least 1"
        )));
    }
    if n > limits.max_page_size {
        return Err(QueryError::InvalidPagination(format!(
            "`{arg}` must not exceed {}",
            limits.max_page_size
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub start_cursor: Option<Cursor>,
    pub end_cursor: Option<Cursor>,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub nodes: Vec<T>,
    pub page_info: PageInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
}

impl<T> Page<T> {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Resolve one page of `E` under `criteria`, ordered by `sort`.
#[tracing::instrument(skip_all, fields(kind = E::KIND, sort = %sort))]
pub async fn resolve<E, S>(
    store: &S,
    criteria: &Criteria,
    sort: SortSpec,
    pagination: &Pagination,
    with_total: bool,
) -> Result<Page<E>>
where
    E: Entity,
    S: EntityStore<E> + ?Sized,
{
    criteria.validate::<E>()?;

    let field = sort.field.as_str();
    let (order, cursor) = match pagination {
        Pagination::Forward { after, .. } => (sort, after.as_ref()),
        Pagination::Backward { before, .. } => (sort.reversed(), before.as_ref()),
    };
    let bound = match cursor {
        Some(c) => {
            let key = cursor::decode(c, field)?;
            sort.field.check_value(&key.value)?;
            Some(key)
        }
        None => None,
    };

    let size = pagination.size() as usize;
    let seek = Seek {
        order,
        after: bound,
    };
    let mut rows = store.find(criteria, &seek, size + 1).await?;
    let has_more = rows.len() > size;
    rows.truncate(size);
    if pagination.is_backward() {
        rows.reverse();
    }

    let (has_next_page, has_previous_page) = match pagination {
        Pagination::Forward { after, .. } => (has_more, after.is_some()),
        Pagination::Backward { before, .. } => (before.is_some(), has_more),
    };

    let start_cursor = rows
        .first()
        .map(|e| cursor::encode(field, &e.sort_key(sort.field)));
    let end_cursor = rows
        .last()
        .map(|e| cursor::encode(field, &e.sort_key(sort.field)));

    let total_count = if with_total {
        Some(store.count(criteria).await?)
    } else {
        None
    };

    debug!(
        returned = rows.len(),
        has_next_page, has_previous_page, "resolved connection page"
    );

    Ok(Page {
        nodes: rows,
        page_info: PageInfo {
            start_cursor,
            end_cursor,
            has_next_page,
            has_previous_page,
        },
        total_count,
    })
}
