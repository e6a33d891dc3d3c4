//! Load/view/click rollups over the append-only analytics event log.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entity::EntityId;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "load-js")]
    Load,
    #[serde(rename = "view-js")]
    View,
    #[serde(rename = "click-js")]
    Click,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [Self::Load, Self::View, Self::Click];

    /// Wire name as emitted by the tracking scripts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "load-js",
            Self::View => "view-js",
            Self::Click => "click-js",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "load-js" | "load" => Ok(Self::Load),
            "view-js" | "view" => Ok(Self::View),
            "click-js" | "click" => Ok(Self::Click),
            _ => Err(format!("unknown event kind: {s}")),
        }
    }
}

/// One tracked event. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub kind: EventKind,
    pub subject_id: EntityId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub occurred_at: DateTime<Utc>,
}

impl EventRecord {
    pub fn new(kind: EventKind, subject_id: EntityId, occurred_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            subject_id,
            occurred_at: crate::entity::truncate_millis(occurred_at),
        }
    }
}

/// Inclusive time window `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }

    /// An inverted range admits nothing.
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

/// Per-kind event counts for one subject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTally {
    pub loads: u64,
    pub views: u64,
    pub clicks: u64,
}

impl EventTally {
    pub fn record(&mut self, kind: EventKind) {
        self.add(kind, 1);
    }

    pub fn add(&mut self, kind: EventKind, n: u64) {
        match kind {
            EventKind::Load => self.loads += n,
            EventKind::View => self.views += n,
            EventKind::Click => self.clicks += n,
        }
    }
}

impl FromIterator<EventKind> for EventTally {
    fn from_iter<T: IntoIterator<Item = EventKind>>(iter: T) -> Self {
        let mut tally = Self::default();
        for kind in iter {
            tally.record(kind);
        }
        tally
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub loads: u64,
    pub views: u64,
    pub clicks: u64,
    pub ctr: f64,
}

impl MetricsSummary {
    pub const ZERO: Self = Self {
        loads: 0,
        views: 0,
        clicks: 0,
        ctr: 0.0,
    };

    /// `ctr` is `clicks / views`, 0 without views, and never above 1.
    pub fn from_tally(tally: EventTally) -> Self {
        let ctr = if tally.views == 0 {
            0.0
        } else {
            (tally.clicks as f64 / tally.views as f64).min(1.0)
        };
        Self {
            loads: tally.loads,
            views: tally.views,
            clicks: tally.clicks,
            ctr,
        }
    }
}

impl Default for MetricsSummary {
    fn default() -> Self {
        Self::ZERO
    }
}

#[async_trait]
pub trait EventLog: Send + Sync {
    /// Count `subject`'s events inside `range`, grouped by kind.
    async fn tally(&self, subject: &EntityId, range: &DateRange) -> Result<EventTally>;

    async fn append(&self, event: &EventRecord) -> Result<()>;
}

#[tracing::instrument(skip_all, fields(subject = %subject))]
pub async fn summarize<L>(log: &L, subject: &EntityId, range: &DateRange) -> Result<MetricsSummary>
where
    L: EventLog + ?Sized,
{
    if range.is_empty() {
        debug!("inverted range, skipping event log");
        return Ok(MetricsSummary::ZERO);
    }
    let tally = log.tally(subject, range).await?;
    let summary = MetricsSummary::from_tally(tally);
    debug!(
        loads = summary.loads,
        views = summary.views,
        clicks = summary.clicks,
        "summarized events"
    );
    Ok(summary)
}
