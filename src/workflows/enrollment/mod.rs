//! Enrollment workflow: applications from parents to provider workshops,
//! the role-checked status machine, seat accounting, submission limits,
//! and the notification fan-out around status changes.

pub mod capacity;
pub mod domain;
pub mod limiter;
pub mod memory;
pub mod notify;
pub mod permissions;
pub mod repository;
pub mod rights;
pub mod router;
pub mod service;

pub use capacity::CapacityController;
pub use domain::{
    Application, ApplicationId, ApplicationStatus, Caller, ChildId, ParentId, ProviderId, Role,
    UserId, Workshop, WorkshopId, WorkshopStatus,
};
pub use limiter::{LimitDecision, SubmissionLimits, SubmissionRateLimiter};
pub use permissions::StatusPermissionMatrix;
pub use router::enrollment_router;
pub use service::{CreateApplication, CreateOutcome, EnrollmentError, EnrollmentService, StatusUpdate};

#[cfg(test)]
mod tests;
