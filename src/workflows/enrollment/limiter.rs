use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::domain::{ChildId, ParentId, WorkshopId};
use super::repository::{ApplicationFilter, ApplicationStore, StoreError};

/// Submission caps for one (parent, child, workshop) triple.
#[derive(Debug, Clone, Copy)]
pub struct SubmissionLimits {
    /// Applications permitted inside the trailing window.
    pub limit: usize,
    /// Window length in days.
    pub limit_days: i64,
}

/// Outcome of a rate-limit probe. `retry_after_seconds` is only meaningful
/// when `allowed` is false; it is deliberately unclamped, so a non-positive
/// value means the window has already cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimitDecision {
    pub allowed: bool,
    pub retry_after_seconds: i64,
}

impl LimitDecision {
    fn allowed() -> Self {
        Self {
            allowed: true,
            retry_after_seconds: 0,
        }
    }
}

/// Counts recent submissions for a triple, regardless of their status, and
/// computes when the next attempt becomes possible.
pub struct SubmissionRateLimiter<A> {
    applications: Arc<A>,
    limits: SubmissionLimits,
}

impl<A> SubmissionRateLimiter<A>
where
    A: ApplicationStore,
{
    pub fn new(applications: Arc<A>, limits: SubmissionLimits) -> Self {
        Self {
            applications,
            limits,
        }
    }

    pub fn limits(&self) -> SubmissionLimits {
        self.limits
    }

    /// Decide whether a new application for the triple may be created at
    /// `now`. Rejected attempts still count against the cap.
    pub fn check(
        &self,
        parent_id: &ParentId,
        child_id: &ChildId,
        workshop_id: &WorkshopId,
        now: DateTime<Utc>,
    ) -> Result<LimitDecision, StoreError> {
        let window_start = now - Duration::days(self.limits.limit_days);
        let filter = ApplicationFilter::default()
            .parent(parent_id.clone())
            .child(child_id.clone())
            .workshop(workshop_id.clone())
            .created_between(window_start, now);

        let mut recent = self.applications.filter(&filter)?;

        if recent.is_empty() || recent.len() < self.limits.limit {
            return Ok(LimitDecision::allowed());
        }

        // The attempt becomes possible one second after the limit-th most
        // recent submission ages out of the window.
        recent.sort_by(|a, b| b.creation_time.cmp(&a.creation_time));
        let gate_index = self.limits.limit.saturating_sub(1).min(recent.len() - 1);
        let gate = recent[gate_index].creation_time
            + Duration::days(self.limits.limit_days)
            + Duration::seconds(1);

        Ok(LimitDecision {
            allowed: false,
            retry_after_seconds: (gate - now).num_seconds(),
        })
    }
}
