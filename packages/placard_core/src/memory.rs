//! In-process store, search index, and event log.
//!
//! These back the core's tests and any embedding that does not need
//! persistence. Every trait call bumps a counter so tests can assert that a
//! rejected request never reached the backend.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::criteria::Criteria;
use crate::entity::{Entity, EntityId};
use crate::error::{Result, ValidationErrors};
use crate::metrics::{DateRange, EventLog, EventRecord, EventTally};
use crate::search::{SearchHits, SearchIndex, SearchQuery};
use crate::store::{EntityStore, Seek};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct MemoryStore<E> {
    rows: Mutex<BTreeMap<EntityId, E>>,
    calls: AtomicUsize,
}

impl<E: Entity> Default for MemoryStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> MemoryStore<E> {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(BTreeMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Seed a row without uniqueness checks or call accounting.
    pub fn insert(&self, entity: E) {
        lock(&self.rows).insert(entity.id().clone(), entity);
    }

    pub fn len(&self) -> usize {
        lock(&self.rows).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of trait calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    fn matching(&self, criteria: &Criteria) -> Vec<E> {
        lock(&self.rows)
            .values()
            .filter(|e| criteria.matches(*e))
            .cloned()
            .collect()
    }

    fn ranked(&self, query: &SearchQuery, prefix: bool) -> SearchHits<E> {
        let tokens: Vec<String> = query
            .phrase
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();

        let mut scored: Vec<(usize, E)> = self
            .matching(&query.filter)
            .into_iter()
            .filter_map(|e| {
                let score = if prefix {
                    prefix_score(&e.name().to_lowercase(), &tokens)
                } else {
                    full_score(&e.search_text().to_lowercase(), &tokens)
                }?;
                Some((score, e))
            })
            .collect();

        scored.sort_by(|(sa, a), (sb, b)| {
            sb.cmp(sa)
                .then_with(|| a.name().cmp(b.name()))
                .then_with(|| a.id().cmp(b.id()))
        });

        let total = scored.len() as u64;
        let hits = scored
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .map(|(_, e)| e)
            .collect();
        SearchHits { hits, total }
    }
}

/// Occurrence count of every token; `None` if any token is missing.
fn full_score(text: &str, tokens: &[String]) -> Option<usize> {
    let mut score = 0;
    for token in tokens {
        let n = text.matches(token.as_str()).count();
        if n == 0 {
            return None;
        }
        score += n;
    }
    Some(score)
}

/// Leading tokens must be whole words; the last may be a word prefix.
fn prefix_score(name: &str, tokens: &[String]) -> Option<usize> {
    let words: Vec<&str> = name.split_whitespace().collect();
    let Some((last, leading)) = tokens.split_last() else {
        return Some(0);
    };
    let whole = leading.iter().all(|t| words.contains(&t.as_str()));
    let partial = words.iter().any(|w| w.starts_with(last.as_str()));
    (whole && partial).then_some(0)
}

#[async_trait]
impl<E: Entity> EntityStore<E> for MemoryStore<E> {
    async fn find(&self, criteria: &Criteria, seek: &Seek, limit: usize) -> Result<Vec<E>> {
        self.tick();
        let field = seek.order.field;
        let mut rows: Vec<E> = self
            .matching(criteria)
            .into_iter()
            .filter(|e| seek.admits(&e.sort_key(field)))
            .collect();
        rows.sort_by(|a, b| seek.order.compare(&a.sort_key(field), &b.sort_key(field)));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn count(&self, criteria: &Criteria) -> Result<u64> {
        self.tick();
        Ok(self.matching(criteria).len() as u64)
    }

    async fn find_by_id(&self, id: &EntityId) -> Result<Option<E>> {
        self.tick();
        Ok(lock(&self.rows).get(id).cloned())
    }

    async fn save(&self, entity: E) -> Result<E> {
        self.tick();
        let mut rows = lock(&self.rows);
        if E::UNIQUE_NAME
            && rows
                .values()
                .any(|other| other.id() != entity.id() && other.name() == entity.name())
        {
            return Err(ValidationErrors::single("name", "must be unique").into());
        }
        rows.insert(entity.id().clone(), entity.clone());
        Ok(entity)
    }
}

#[async_trait]
impl<E: Entity> SearchIndex<E> for MemoryStore<E> {
    async fn search(&self, query: &SearchQuery) -> Result<SearchHits<E>> {
        self.tick();
        Ok(self.ranked(query, false))
    }

    async fn autocomplete(&self, query: &SearchQuery) -> Result<SearchHits<E>> {
        self.tick();
        Ok(self.ranked(query, true))
    }
}

#[derive(Default)]
pub struct MemoryEventLog {
    events: Mutex<Vec<EventRecord>>,
    calls: AtomicUsize,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn tally(&self, subject: &EntityId, range: &DateRange) -> Result<EventTally> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(lock(&self.events)
            .iter()
            .filter(|e| &e.subject_id == subject && range.contains(e.occurred_at))
            .map(|e| e.kind)
            .collect())
    }

    async fn append(&self, event: &EventRecord) -> Result<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        lock(&self.events).push(event.clone());
        Ok(())
    }
}
