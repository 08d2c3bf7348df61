#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Work unit, campaign, checkpoint and run report types.
//!
//! A campaign enumerates the whole search space as an ordered list of
//! [`WorkUnit`]s. Each unit is driven to completion page by page and its
//! progress is persisted as a [`UnitCheckpoint`] after every offset
//! advance; the [`Campaign`] itself is persisted after every unit so a
//! crashed run resumes at the right place.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Key of the single work unit that covers the unpartitioned range.
pub const WHOLE_RANGE_KEY: &str = "all";

// ── Work units ───────────────────────────────────────────────────────────

/// Lifecycle of a [`WorkUnit`].
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UnitStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

/// Read position within a work unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    /// Next offset to request.
    pub offset: u64,
    /// Total record count the API reported for this unit, once observed.
    pub total_known: Option<u64>,
}

/// One partition of the search space, enumerated exhaustively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkUnit {
    pub key: String,
    pub cursor: Cursor,
    /// Entities successfully upserted for this unit.
    pub processed_count: u64,
    /// Transient failure streak. Reset to 0 on any successful page.
    pub consecutive_error_count: u32,
    pub status: UnitStatus,
}

impl WorkUnit {
    /// Creates a fresh unit positioned at offset 0.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            cursor: Cursor::default(),
            processed_count: 0,
            consecutive_error_count: 0,
            status: UnitStatus::Pending,
        }
    }

    /// Whether every record the API reported has been upserted.
    #[must_use]
    pub fn reached_total(&self) -> bool {
        self.cursor
            .total_known
            .is_some_and(|total| self.processed_count >= total)
    }

    /// Whether an empty page at the current position means end-of-data.
    ///
    /// True when the total is unknown or zero, when every reported record
    /// has been upserted, or when the cursor has moved past the reported
    /// total (records dropped on the way keep `processed_count` behind).
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        match self.cursor.total_known {
            None | Some(0) => true,
            Some(total) => self.processed_count >= total || self.cursor.offset >= total,
        }
    }
}

// ── Session ──────────────────────────────────────────────────────────────

/// Session-level state threaded through every request of a unit.
///
/// Passed into request construction and updated from each response. It is
/// persisted with the unit so a resumed unit keeps its cookies and
/// continues credential rotation where it stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationContext {
    /// Index of the credential pair used by the previous request.
    pub credential_index: Option<usize>,
    /// Cookies captured from `Set-Cookie` headers, by name.
    pub cookies: BTreeMap<String, String>,
}

// ── Checkpoints ──────────────────────────────────────────────────────────

/// Persisted form of a [`WorkUnit`] plus its [`PaginationContext`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitCheckpoint {
    pub key: String,
    pub cursor_offset: u64,
    pub total_known: Option<u64>,
    pub processed_count: u64,
    pub consecutive_error_count: u32,
    #[serde(default)]
    pub status: UnitStatus,
    #[serde(default)]
    pub session: PaginationContext,
}

impl UnitCheckpoint {
    /// Captures the current state of `unit` and `session`.
    #[must_use]
    pub fn capture(unit: &WorkUnit, session: &PaginationContext) -> Self {
        Self {
            key: unit.key.clone(),
            cursor_offset: unit.cursor.offset,
            total_known: unit.cursor.total_known,
            processed_count: unit.processed_count,
            consecutive_error_count: unit.consecutive_error_count,
            status: unit.status,
            session: session.clone(),
        }
    }

    /// Splits the checkpoint back into a unit and its session.
    #[must_use]
    pub fn into_parts(self) -> (WorkUnit, PaginationContext) {
        let unit = WorkUnit {
            key: self.key,
            cursor: Cursor {
                offset: self.cursor_offset,
                total_known: self.total_known,
            },
            processed_count: self.processed_count,
            consecutive_error_count: self.consecutive_error_count,
            status: self.status,
        };
        (unit, self.session)
    }
}

// ── Campaign ─────────────────────────────────────────────────────────────

/// The ordered set of work units plus global progress.
///
/// Every key is in exactly one of `pending`, `in_progress` or `completed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    /// Keys not yet started, in processing order.
    pub pending: VecDeque<String>,
    /// The key currently being driven, if any.
    pub in_progress: Option<String>,
    pub completed: BTreeSet<String>,
    /// Entities upserted across all units. Never decreases.
    pub total_entities_processed: u64,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

impl Campaign {
    /// Creates a campaign with every key pending.
    #[must_use]
    pub fn new(keys: impl IntoIterator<Item = String>, started_at: DateTime<Utc>) -> Self {
        Self {
            pending: keys.into_iter().collect(),
            in_progress: None,
            completed: BTreeSet::new(),
            total_entities_processed: 0,
            started_at: Some(started_at),
        }
    }

    /// Total number of units in the campaign.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.pending.len() + self.completed.len() + usize::from(self.in_progress.is_some())
    }

    /// Whether every unit has completed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.pending.is_empty() && self.in_progress.is_none()
    }

    /// Pops the head of `pending` and marks it in progress.
    ///
    /// Returns the in-progress key unchanged if one is already set.
    pub fn start_next(&mut self) -> Option<String> {
        if let Some(key) = &self.in_progress {
            return Some(key.clone());
        }
        let key = self.pending.pop_front()?;
        self.in_progress = Some(key.clone());
        Some(key)
    }

    /// Moves the in-progress unit to `completed`.
    pub fn complete_current(&mut self) {
        if let Some(key) = self.in_progress.take() {
            self.completed.insert(key);
        }
    }

    /// Moves the in-progress unit to the back of `pending`.
    pub fn defer_current(&mut self) {
        if let Some(key) = self.in_progress.take() {
            self.pending.push_back(key);
        }
    }

    /// Adds `count` to the running entity total.
    pub const fn record_entities(&mut self, count: u64) {
        self.total_entities_processed = self.total_entities_processed.saturating_add(count);
    }
}

// ── Raw batches ──────────────────────────────────────────────────────────

/// One archived fetch result. Written once, never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBatch {
    pub unit_key: String,
    pub offset: u64,
    pub captured_at: DateTime<Utc>,
    pub payload: RawPayload,
}

/// What came back for a [`RawBatch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RawPayload {
    /// A 2xx response. `body` is the parsed JSON, or a JSON string holding
    /// the raw text when it did not parse.
    Response {
        status: u16,
        body: serde_json::Value,
    },
    /// A failed fetch.
    Error {
        kind: String,
        message: String,
        status: Option<u16>,
        body: Option<String>,
    },
}

impl RawBatch {
    /// Whether this batch records a failed fetch.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.payload, RawPayload::Error { .. })
    }
}

// ── Reports ──────────────────────────────────────────────────────────────

/// Volume classification of a partition letter.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VolumeClass {
    /// Exceeds the API's readable depth; subdivided into two-letter keys.
    High,
    Medium,
    Low,
}

impl VolumeClass {
    /// Multiplier applied to the base politeness delay.
    #[must_use]
    pub const fn delay_factor(self) -> f64 {
        match self {
            Self::High => 3.0,
            Self::Medium => 1.5,
            Self::Low => 1.0,
        }
    }
}

/// How a unit's run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UnitOutcome {
    /// End of data reached; the unit is complete.
    Done,
    /// The consecutive error budget ran out. The unit stays resumable.
    Aborted { reason: String },
    /// Shutdown was requested; the last checkpoint is intact.
    Interrupted,
}

/// Counters for one run of one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitReport {
    pub key: String,
    pub outcome: UnitOutcome,
    /// Pages fetched successfully.
    pub batches: u64,
    /// Raw records seen across all pages.
    pub records_seen: u64,
    /// Entities upserted during this run.
    pub upserted: u64,
    /// Records dropped for lacking an identifier.
    pub dropped: u64,
    /// Entities whose scalar write failed.
    pub failed_upserts: u64,
    /// Pages whose shape no extractor recognized.
    pub unrecognized_pages: u64,
    /// Offsets skipped after an empty page.
    pub speculative_skips: u64,
    pub transport_errors: u64,
    pub processed_count: u64,
    pub total_known: Option<u64>,
}

impl UnitReport {
    /// Creates an all-zero report for `unit`.
    #[must_use]
    pub fn new(unit: &WorkUnit) -> Self {
        Self {
            key: unit.key.clone(),
            outcome: UnitOutcome::Interrupted,
            batches: 0,
            records_seen: 0,
            upserted: 0,
            dropped: 0,
            failed_upserts: 0,
            unrecognized_pages: 0,
            speculative_skips: 0,
            transport_errors: 0,
            processed_count: unit.processed_count,
            total_known: unit.cursor.total_known,
        }
    }
}

/// Result of one orchestrator run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignSummary {
    pub units_completed: u64,
    pub units_aborted: Vec<String>,
    pub units_remaining: u64,
    pub interrupted: bool,
    /// Entities upserted during this run.
    pub entities_this_run: u64,
    /// Entities upserted across all runs of the campaign.
    pub total_entities_processed: u64,
    pub duration: Duration,
}
