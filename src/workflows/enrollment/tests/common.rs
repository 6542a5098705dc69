//! Shared fixture for the enrollment tests: in-memory collaborators wired
//! into a service, with one provider, one parent of two children, and an
//! employee scoped to the default workshop.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};

use crate::workflows::enrollment::domain::{
    Application, ApplicationId, ApplicationStatus, Caller, ChildId, Ownership, ParentId,
    ProviderId, Role, UserId, Workshop, WorkshopId, WorkshopStatus,
};
use crate::workflows::enrollment::limiter::SubmissionLimits;
use crate::workflows::enrollment::memory::{
    MemoryApplicationStore, MemoryDirectory, MemoryMailer, MemoryNotifications,
    MemoryWorkshopStore,
};
use crate::workflows::enrollment::notify::{NotifyError, StatusEmail, StatusMailer};
use crate::workflows::enrollment::repository::{ApplicationStore, WorkshopStore};
use crate::workflows::enrollment::service::EnrollmentService;

pub const WORKSHOP: &str = "w-1";
pub const PROVIDER: &str = "prov-1";
pub const PARENT: &str = "par-1";
pub const CHILD: &str = "ch-1";
pub const SECOND_CHILD: &str = "ch-2";

pub struct Harness {
    pub applications: Arc<MemoryApplicationStore>,
    pub workshops: Arc<MemoryWorkshopStore>,
    pub directory: Arc<MemoryDirectory>,
    pub notifier: Arc<MemoryNotifications>,
    pub mailer: Arc<MemoryMailer>,
    pub service: Arc<EnrollmentService<MemoryApplicationStore, MemoryWorkshopStore>>,
}

pub fn harness() -> Harness {
    harness_with_limits(SubmissionLimits {
        limit: 2,
        limit_days: 7,
    })
}

pub fn harness_with_limits(limits: SubmissionLimits) -> Harness {
    let applications = Arc::new(MemoryApplicationStore::new());
    let workshops = Arc::new(MemoryWorkshopStore::new());
    // Zero TTL keeps identity lookups fresh across registrations.
    let directory = Arc::new(MemoryDirectory::new(StdDuration::ZERO));
    let notifier = Arc::new(MemoryNotifications::new());
    let mailer = Arc::new(MemoryMailer::new());

    directory.register_parent(
        UserId("user-parent".to_string()),
        ParentId(PARENT.to_string()),
        [ChildId(CHILD.to_string()), ChildId(SECOND_CHILD.to_string())],
    );
    directory.register_provider(
        ProviderId(PROVIDER.to_string()),
        UserId("user-provider".to_string()),
    );
    directory.register_employee(
        UserId("user-employee".to_string()),
        ProviderId(PROVIDER.to_string()),
        [WorkshopId(WORKSHOP.to_string())],
    );

    let service = Arc::new(EnrollmentService::new(
        applications.clone(),
        workshops.clone(),
        directory.clone(),
        directory.clone(),
        notifier.clone(),
        mailer.clone(),
        limits,
    ));

    Harness {
        applications,
        workshops,
        directory,
        notifier,
        mailer,
        service,
    }
}

impl Harness {
    pub fn put_workshop(&self, seats: u32) {
        self.put_workshop_with(seats, |_| {});
    }

    pub fn put_workshop_with(&self, seats: u32, customize: impl FnOnce(&mut Workshop)) {
        let mut workshop = Workshop {
            id: WorkshopId(WORKSHOP.to_string()),
            provider_id: ProviderId(PROVIDER.to_string()),
            title: "Robotics lab".to_string(),
            available_seats: seats,
            status: WorkshopStatus::Open,
            competitive_selection: false,
            ownership: Ownership::Common,
            is_blocked: false,
        };
        customize(&mut workshop);
        self.workshops.put(workshop);
    }

    /// Insert an application behind the service's back, for seeding
    /// histories the public API would refuse to create.
    pub fn seed_application(
        &self,
        id: &str,
        child: &str,
        status: ApplicationStatus,
        created: DateTime<Utc>,
    ) -> Application {
        let application = Application {
            id: ApplicationId(id.to_string()),
            parent_id: ParentId(PARENT.to_string()),
            child_id: ChildId(child.to_string()),
            workshop_id: WorkshopId(WORKSHOP.to_string()),
            status,
            creation_time: created,
            approved_time: None,
            rejection_message: None,
            is_blocked_by_provider: false,
            version: 0,
        };
        self.applications
            .insert(application)
            .expect("seed application inserts")
    }

    pub fn workshop_status(&self) -> WorkshopStatus {
        self.workshops
            .fetch(&WorkshopId(WORKSHOP.to_string()))
            .expect("workshop store reachable")
            .expect("workshop seeded")
            .status
    }
}

pub fn parent_caller() -> Caller {
    Caller {
        user_id: UserId("user-parent".to_string()),
        role: Role::Parent,
    }
}

pub fn provider_caller() -> Caller {
    Caller {
        user_id: UserId("user-provider".to_string()),
        role: Role::Provider,
    }
}

pub fn employee_caller() -> Caller {
    Caller {
        user_id: UserId("user-employee".to_string()),
        role: Role::Employee,
    }
}

pub fn admin_caller() -> Caller {
    Caller {
        user_id: UserId("user-admin".to_string()),
        role: Role::Admin,
    }
}

/// Mailer that always fails, for asserting email failures never roll back
/// a committed status change.
pub struct FailingMailer;

impl StatusMailer for FailingMailer {
    fn send(&self, _email: StatusEmail) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("smtp relay unreachable".to_string()))
    }
}
