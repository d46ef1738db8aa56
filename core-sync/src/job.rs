//! # Sync Cycle State Machine
//!
//! One pass of pushing the pending-change queue to the spreadsheet.
//!
//! ## State Machine
//!
//! ```text
//! Idle → Running → Completed
//!           ↓
//!         Failed
//! ```
//!
//! Transitions are validated; a terminal cycle cannot be restarted, a new
//! cycle is created instead.

use crate::{Result, SyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a sync cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CycleId(Uuid);

impl CycleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CycleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CycleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

impl CycleStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CycleStatus::Completed | CycleStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStatus::Idle => "idle",
            CycleStatus::Running => "running",
            CycleStatus::Completed => "completed",
            CycleStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-item outcome classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// The remote confirmed the write
    Success,
    /// The remote answered but did not apply the change
    Failure,
    /// The request itself failed
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub id: i64,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemOutcome {
    pub fn success(id: i64) -> Self {
        Self {
            id,
            status: ItemStatus::Success,
            error: None,
        }
    }

    pub fn failure(id: i64, reason: impl Into<String>) -> Self {
        Self {
            id,
            status: ItemStatus::Failure,
            error: Some(reason.into()),
        }
    }

    pub fn error(id: i64, message: impl Into<String>) -> Self {
        Self {
            id,
            status: ItemStatus::Error,
            error: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ItemStatus::Success
    }
}

/// Aggregate result of a sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub success_count: usize,
    pub failure_count: usize,
    pub details: Vec<ItemOutcome>,
}

impl SyncReport {
    pub fn record(&mut self, outcome: ItemOutcome) {
        if outcome.is_success() {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.details.push(outcome);
    }

    /// At least one success and no failure at all.
    pub fn is_clean(&self) -> bool {
        self.success_count > 0 && self.failure_count == 0
    }

    pub fn succeeded_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.details.iter().filter(|o| o.is_success()).map(|o| o.id)
    }

    /// True when nothing succeeded and every item failed at the transport
    /// level.
    pub fn all_errored(&self) -> bool {
        !self.details.is_empty()
            && self
                .details
                .iter()
                .all(|o| o.status == ItemStatus::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCycle {
    pub id: CycleId,
    pub status: CycleStatus,
    pub total: usize,
    pub processed: usize,
    pub report: SyncReport,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncCycle {
    pub fn new(total: usize) -> Self {
        Self {
            id: CycleId::new(),
            status: CycleStatus::Idle,
            total,
            processed: 0,
            report: SyncReport::default(),
            error_message: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn start(mut self, now: DateTime<Utc>) -> Result<Self> {
        self.validate_transition(CycleStatus::Running)?;
        self.status = CycleStatus::Running;
        self.started_at = Some(now);
        Ok(self)
    }

    /// Record one processed item.
    ///
    /// # Errors
    ///
    /// Returns an error if the cycle is not running
    pub fn record(&mut self, outcome: ItemOutcome) -> Result<()> {
        if self.status != CycleStatus::Running {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.to_string(),
                to: "record".to_string(),
                reason: "Cycle must be running to record outcomes".to_string(),
            });
        }
        self.processed += 1;
        self.report.record(outcome);
        Ok(())
    }

    /// Processed share of the queue, 0 to 100
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.processed * 100) / self.total).min(100) as u8
    }

    pub fn complete(mut self, now: DateTime<Utc>) -> Result<Self> {
        self.validate_transition(CycleStatus::Completed)?;
        self.status = CycleStatus::Completed;
        self.finished_at = Some(now);
        Ok(self)
    }

    pub fn fail(mut self, message: impl Into<String>, now: DateTime<Utc>) -> Result<Self> {
        self.validate_transition(CycleStatus::Failed)?;
        self.status = CycleStatus::Failed;
        self.error_message = Some(message.into());
        self.finished_at = Some(now);
        Ok(self)
    }

    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds().max(0) as u64),
            _ => None,
        }
    }

    fn validate_transition(&self, to: CycleStatus) -> Result<()> {
        let valid = matches!(
            (self.status, to),
            (CycleStatus::Idle, CycleStatus::Running)
                | (CycleStatus::Running, CycleStatus::Completed)
                | (CycleStatus::Running, CycleStatus::Failed)
        );

        if valid {
            Ok(())
        } else {
            Err(SyncError::InvalidStateTransition {
                from: self.status.to_string(),
                to: to.to_string(),
                reason: format!("Cannot transition from {} to {}", self.status, to),
            })
        }
    }
}
