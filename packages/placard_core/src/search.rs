//! Full-text search and autocomplete, wrapped into connection pages.
//!
//! Matching and ranking belong to the [`SearchIndex`]. This module only maps
//! pagination onto offsets into the ranked hit list and back. Search cursors
//! carry a hit's 0-based rank under the reserved `_position` field, so they
//! are not interchangeable with connection cursors and do not survive
//! re-ranking between requests.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connection::{Page, PageInfo, Pagination};
use crate::criteria::Criteria;
use crate::cursor::{self, Cursor};
use crate::entity::{Entity, EntityId};
use crate::error::{QueryError, Result};
use crate::sort::{SortKey, SortValue};

/// Sort field name that marks a cursor as a search position.
pub const POSITION_FIELD: &str = "_position";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub phrase: String,
    pub filter: Criteria,
    pub offset: u64,
    pub limit: u64,
}

/// One window of ranked hits plus the size of the whole result.
#[derive(Debug, Clone)]
pub struct SearchHits<E> {
    pub hits: Vec<E>,
    pub total: u64,
}

impl<E> SearchHits<E> {
    pub fn empty() -> Self {
        Self {
            hits: Vec::new(),
            total: 0,
        }
    }
}

/// External full-text index over one entity kind.
///
/// An empty phrase matches every entity the filter admits, in the index's
/// stable fallback order.
#[async_trait]
pub trait SearchIndex<E: Entity>: Send + Sync {
    /// Ranked match over the entity's full search text.
    async fn search(&self, query: &SearchQuery) -> Result<SearchHits<E>>;

    /// Prefix match restricted to `name`.
    async fn autocomplete(&self, query: &SearchQuery) -> Result<SearchHits<E>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Full,
    Prefix,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => f.write_str("search"),
            Self::Prefix => f.write_str("autocomplete"),
        }
    }
}

pub async fn search<E, I>(
    index: &I,
    phrase: &str,
    filter: &Criteria,
    pagination: &Pagination,
    with_total: bool,
) -> Result<Page<E>>
where
    E: Entity,
    I: SearchIndex<E> + ?Sized,
{
    run(index, SearchMode::Full, phrase, filter, pagination, with_total).await
}

pub async fn autocomplete<E, I>(
    index: &I,
    phrase: &str,
    filter: &Criteria,
    pagination: &Pagination,
    with_total: bool,
) -> Result<Page<E>>
where
    E: Entity,
    I: SearchIndex<E> + ?Sized,
{
    run(index, SearchMode::Prefix, phrase, filter, pagination, with_total).await
}

pub fn encode_position(position: u64, id: &EntityId) -> Cursor {
    let value = SortValue::Int(i64::try_from(position).unwrap_or(i64::MAX));
    cursor::encode(POSITION_FIELD, &SortKey::new(value, id.clone()))
}

pub fn decode_position(cursor: &Cursor) -> Result<u64> {
    let key = cursor::decode(cursor, POSITION_FIELD)?;
    match key.value {
        SortValue::Int(n) if n >= 0 => Ok(n as u64),
        _ => Err(QueryError::InvalidCursor(
            "search cursor position must be a non-negative integer".into(),
        )),
    }
}

async fn fetch<E, I>(index: &I, mode: SearchMode, query: &SearchQuery) -> Result<SearchHits<E>>
where
    E: Entity,
    I: SearchIndex<E> + ?Sized,
{
    match mode {
        SearchMode::Full => index.search(query).await,
        SearchMode::Prefix => index.autocomplete(query).await,
    }
}

#[tracing::instrument(skip_all, fields(kind = E::KIND, mode = %mode))]
async fn run<E, I>(
    index: &I,
    mode: SearchMode,
    phrase: &str,
    filter: &Criteria,
    pagination: &Pagination,
    with_total: bool,
) -> Result<Page<E>>
where
    E: Entity,
    I: SearchIndex<E> + ?Sized,
{
    filter.validate::<E>()?;

    let mut query = SearchQuery {
        phrase: phrase.trim().to_string(),
        filter: filter.clone(),
        offset: 0,
        limit: 0,
    };

    let (start, mut hits, has_next_page, has_previous_page) = match pagination {
        Pagination::Forward { first, after } => {
            let start = match after {
                Some(c) => decode_position(c)?.saturating_add(1),
                None => 0,
            };
            let first = u64::from(*first);
            query.offset = start;
            query.limit = first + 1;
            let mut hits = fetch(index, mode, &query).await?;
            let has_more = hits.hits.len() as u64 > first;
            hits.hits.truncate(first as usize);
            (start, hits, has_more, after.is_some())
        }
        Pagination::Backward { last, before } => {
            let last = u64::from(*last);
            let end = match before {
                Some(c) => decode_position(c)?,
                None => {
                    // Probe the total so the window can be anchored at the tail.
                    let probe = fetch(index, mode, &query).await?;
                    probe.total
                }
            };
            let start = end.saturating_sub(last);
            query.offset = start;
            query.limit = end - start;
            let hits = if query.limit == 0 && before.is_none() {
                SearchHits::empty()
            } else {
                fetch(index, mode, &query).await?
            };
            (start, hits, before.is_some(), start > 0)
        }
    };
    hits.hits.truncate(query.limit as usize);

    let start_cursor = hits.hits.first().map(|e| encode_position(start, e.id()));
    let end_cursor = hits
        .hits
        .last()
        .map(|e| encode_position(start + hits.hits.len() as u64 - 1, e.id()));

    debug!(
        phrase = %query.phrase,
        returned = hits.hits.len(),
        total = hits.total,
        "resolved search page"
    );

    Ok(Page {
        nodes: hits.hits,
        page_info: PageInfo {
            start_cursor,
            end_cursor,
            has_next_page,
            has_previous_page,
        },
        total_count: with_total.then_some(hits.total),
    })
}
