use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for enrollment applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl std::fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParentId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChildId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkshopId(pub String);

impl std::fmt::Display for WorkshopId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderId(pub String);

/// Platform user identity, as handed over by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Lifecycle states of an enrollment application.
///
/// `AcceptedForSelection` only exists for workshops running a competitive
/// selection; the default permission table denies it as a target outright.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    AcceptedForSelection,
    Approved,
    Rejected,
    StudyingForYears,
    Completed,
    Left,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 7] = [
        ApplicationStatus::Pending,
        ApplicationStatus::AcceptedForSelection,
        ApplicationStatus::Approved,
        ApplicationStatus::Rejected,
        ApplicationStatus::StudyingForYears,
        ApplicationStatus::Completed,
        ApplicationStatus::Left,
    ];

    /// Statuses that count against a workshop's seat capacity.
    pub const SEAT_OCCUPYING: [ApplicationStatus; 2] = [
        ApplicationStatus::Approved,
        ApplicationStatus::StudyingForYears,
    ];

    /// Statuses that block a new application for the same (child, workshop).
    pub const ACTIVE: [ApplicationStatus; 4] = [
        ApplicationStatus::Pending,
        ApplicationStatus::AcceptedForSelection,
        ApplicationStatus::Approved,
        ApplicationStatus::StudyingForYears,
    ];

    /// Statuses that trigger a parent-facing message on update.
    pub const PARENT_NOTIFIED: [ApplicationStatus; 3] = [
        ApplicationStatus::Approved,
        ApplicationStatus::Rejected,
        ApplicationStatus::AcceptedForSelection,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::AcceptedForSelection => "accepted_for_selection",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::StudyingForYears => "studying_for_years",
            ApplicationStatus::Completed => "completed",
            ApplicationStatus::Left => "left",
        }
    }

    pub fn occupies_seat(self) -> bool {
        Self::SEAT_OCCUPYING.contains(&self)
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Caller roles recognized by the permission tables. Employees share the
/// provider rows; `Admin` covers the support roles, which all carry the
/// same permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Parent,
    Provider,
    Employee,
    Admin,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Parent, Role::Provider, Role::Employee, Role::Admin];

    pub const fn label(self) -> &'static str {
        match self {
            Role::Parent => "parent",
            Role::Provider => "provider",
            Role::Employee => "employee",
            Role::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value.trim().to_ascii_lowercase().as_str() {
            "parent" => Some(Role::Parent),
            "provider" => Some(Role::Provider),
            "employee" => Some(Role::Employee),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Authenticated caller identity, extracted upstream of this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
}

/// An enrollment request for one child into one workshop.
///
/// `version` is the optimistic-concurrency token; stores reject an update
/// whose version does not match the persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub parent_id: ParentId,
    pub child_id: ChildId,
    pub workshop_id: WorkshopId,
    pub status: ApplicationStatus,
    pub creation_time: DateTime<Utc>,
    pub approved_time: Option<DateTime<Utc>>,
    pub rejection_message: Option<String>,
    pub is_blocked_by_provider: bool,
    pub version: u64,
}

impl Application {
    pub fn view(&self) -> ApplicationView {
        ApplicationView {
            id: self.id.clone(),
            parent_id: self.parent_id.clone(),
            child_id: self.child_id.clone(),
            workshop_id: self.workshop_id.clone(),
            status: self.status.label(),
            creation_time: self.creation_time,
            approved_time: self.approved_time,
            rejection_message: self.rejection_message.clone(),
            is_blocked_by_provider: self.is_blocked_by_provider,
        }
    }
}

/// Serialized representation returned by the HTTP surface.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationView {
    pub id: ApplicationId,
    pub parent_id: ParentId,
    pub child_id: ChildId,
    pub workshop_id: WorkshopId,
    pub status: &'static str,
    pub creation_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_message: Option<String>,
    pub is_blocked_by_provider: bool,
}

/// Open/closed gate for new enrollments. Driven by seat accounting, never
/// written outside the capacity controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkshopStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ownership {
    State,
    Common,
    Private,
}

/// Sentinel meaning the provider never set a seat count. A real taken-seat
/// count can never reach it, so such workshops are never closed.
pub const UNLIMITED_SEATS: u32 = u32::MAX;

/// Capacity-relevant projection of a workshop as consumed by this core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workshop {
    pub id: WorkshopId,
    pub provider_id: ProviderId,
    pub title: String,
    pub available_seats: u32,
    pub status: WorkshopStatus,
    pub competitive_selection: bool,
    pub ownership: Ownership,
    pub is_blocked: bool,
}
