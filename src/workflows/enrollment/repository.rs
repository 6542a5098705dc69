use chrono::{DateTime, Utc};

use super::domain::{
    Application, ApplicationId, ApplicationStatus, ChildId, ParentId, Workshop, WorkshopId,
    WorkshopStatus,
};

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Duplicate,
    #[error("record version is stale, reload and retry")]
    VersionConflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Conjunction of optional predicates over applications. Only the fields
/// that are present participate in the match; an empty filter matches
/// everything.
#[derive(Debug, Clone, Default)]
pub struct ApplicationFilter {
    pub parent_id: Option<ParentId>,
    pub child_id: Option<ChildId>,
    pub workshop_id: Option<WorkshopId>,
    pub statuses: Option<Vec<ApplicationStatus>>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub blocked_by_provider: Option<bool>,
}

impl ApplicationFilter {
    pub fn parent(mut self, parent_id: ParentId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn child(mut self, child_id: ChildId) -> Self {
        self.child_id = Some(child_id);
        self
    }

    pub fn workshop(mut self, workshop_id: WorkshopId) -> Self {
        self.workshop_id = Some(workshop_id);
        self
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = ApplicationStatus>) -> Self {
        self.statuses = Some(statuses.into_iter().collect());
        self
    }

    pub fn created_between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.created_from = Some(from);
        self.created_to = Some(to);
        self
    }

    pub fn blocked(mut self, blocked: bool) -> Self {
        self.blocked_by_provider = Some(blocked);
        self
    }

    pub fn matches(&self, application: &Application) -> bool {
        if let Some(parent_id) = &self.parent_id {
            if application.parent_id != *parent_id {
                return false;
            }
        }
        if let Some(child_id) = &self.child_id {
            if application.child_id != *child_id {
                return false;
            }
        }
        if let Some(workshop_id) = &self.workshop_id {
            if application.workshop_id != *workshop_id {
                return false;
            }
        }
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&application.status) {
                return false;
            }
        }
        if let Some(from) = &self.created_from {
            if application.creation_time < *from {
                return false;
            }
        }
        if let Some(to) = &self.created_to {
            if application.creation_time > *to {
                return false;
            }
        }
        if let Some(blocked) = self.blocked_by_provider {
            if application.is_blocked_by_provider != blocked {
                return false;
            }
        }
        true
    }
}

/// Sort order for listings: unblocked records first, then by status, then
/// oldest first. Flags off mean the corresponding key is skipped.
#[derive(Debug, Clone, Copy)]
pub struct ApplicationOrdering {
    pub blocked_last: bool,
    pub by_status: bool,
    pub by_creation_time: bool,
}

impl Default for ApplicationOrdering {
    fn default() -> Self {
        Self {
            blocked_last: true,
            by_status: false,
            by_creation_time: true,
        }
    }
}

impl ApplicationOrdering {
    pub fn sort(&self, applications: &mut [Application]) {
        applications.sort_by(|a, b| {
            let mut ordering = std::cmp::Ordering::Equal;
            if self.blocked_last {
                ordering = a.is_blocked_by_provider.cmp(&b.is_blocked_by_provider);
            }
            if ordering.is_eq() && self.by_status {
                ordering = a.status.cmp(&b.status);
            }
            if ordering.is_eq() && self.by_creation_time {
                ordering = a.creation_time.cmp(&b.creation_time);
            }
            ordering
        });
    }
}

/// Page window for listings.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

/// Persistence abstraction for applications, so the orchestrator can be
/// exercised against an in-memory store.
pub trait ApplicationStore: Send + Sync {
    fn insert(&self, application: Application) -> Result<Application, StoreError>;

    /// Persist a modified application. Fails with `VersionConflict` when
    /// the stored version no longer matches the one the caller loaded.
    fn update(&self, application: Application) -> Result<Application, StoreError>;

    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, StoreError>;

    fn filter(&self, filter: &ApplicationFilter) -> Result<Vec<Application>, StoreError>;

    fn count(&self, filter: &ApplicationFilter) -> Result<usize, StoreError>;

    fn list(
        &self,
        filter: &ApplicationFilter,
        ordering: ApplicationOrdering,
        page: Page,
    ) -> Result<Vec<Application>, StoreError>;

    /// Move every `Approved` application to `StudyingForYears`, returning
    /// the number of affected rows. Idempotent by construction.
    fn promote_approved_to_studying(&self) -> Result<usize, StoreError>;
}

/// Read/mutate access to the capacity-relevant workshop projection. Only
/// the capacity controller calls `set_status`.
pub trait WorkshopStore: Send + Sync {
    fn fetch(&self, id: &WorkshopId) -> Result<Option<Workshop>, StoreError>;

    fn set_status(&self, id: &WorkshopId, status: WorkshopStatus) -> Result<(), StoreError>;
}
