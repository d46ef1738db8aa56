//! Aggregate counts and rates derived from the route collection.

use crate::models::{Route, RouteStatus, Sequence};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-status counts shared by the overall and per-sequence views.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub total: usize,
    pub completed: usize,
    pub active: usize,
    pub delayed: usize,
    pub pending: usize,
    pub scheduled: usize,
}

impl StatusCounts {
    fn tally<'a>(routes: impl IntoIterator<Item = &'a Route>) -> Self {
        let mut counts = Self::default();
        for route in routes {
            counts.total += 1;
            match route.status {
                RouteStatus::Completed => counts.completed += 1,
                RouteStatus::Active => counts.active += 1,
                RouteStatus::Delayed => counts.delayed += 1,
                RouteStatus::Pending => counts.pending += 1,
                RouteStatus::Scheduled => counts.scheduled += 1,
            }
        }
        counts
    }

    pub fn count(&self, status: RouteStatus) -> usize {
        match status {
            RouteStatus::Completed => self.completed,
            RouteStatus::Active => self.active,
            RouteStatus::Delayed => self.delayed,
            RouteStatus::Pending => self.pending,
            RouteStatus::Scheduled => self.scheduled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceBreakdown {
    pub sequence: String,
    #[serde(flatten)]
    pub counts: StatusCounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    #[serde(flatten)]
    pub counts: StatusCounts,
    /// Completed share of all routes, in whole percent
    pub completion_rate: u8,
    pub delay_rate: u8,
    pub active_rate: u8,
    pub generated_at: DateTime<Utc>,
    /// One entry per fixed sequence, in sequence order, even when empty
    pub by_sequence: Vec<SequenceBreakdown>,
}

impl Statistics {
    pub fn compute(routes: &[Route], generated_at: DateTime<Utc>) -> Self {
        let counts = StatusCounts::tally(routes);

        let by_sequence = Sequence::ALL
            .iter()
            .map(|sequence| SequenceBreakdown {
                sequence: sequence.label().to_string(),
                counts: StatusCounts::tally(
                    routes.iter().filter(|r| r.sequence == sequence.label()),
                ),
            })
            .collect();

        Self {
            counts,
            completion_rate: percent(counts.completed, counts.total),
            delay_rate: percent(counts.delayed, counts.total),
            active_rate: percent(counts.active, counts.total),
            generated_at,
            by_sequence,
        }
    }

    pub fn total(&self) -> usize {
        self.counts.total
    }

    pub fn count(&self, status: RouteStatus) -> usize {
        self.counts.count(status)
    }

    pub fn sequence(&self, label: &str) -> Option<&SequenceBreakdown> {
        self.by_sequence.iter().find(|b| b.sequence == label)
    }
}

/// Share of `part` in `total` rounded half-up to a whole percent; 0 when
/// `total` is 0.
pub fn percent(part: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let rounded = (200 * part + total) / (2 * total);
    rounded.min(100) as u8
}
