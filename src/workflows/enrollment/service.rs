use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use super::capacity::{CapacityController, CapacityError};
use super::domain::{
    Application, ApplicationId, ApplicationStatus, Caller, ChildId, Ownership, ParentId,
    ProviderId, Role, Workshop, WorkshopId, WorkshopStatus,
};
use super::limiter::{LimitDecision, SubmissionLimits, SubmissionRateLimiter};
use super::notify::{
    NotificationAction, NotificationEvent, NotificationSink, RecipientResolver, StaffDirectory,
    StatusEmail, StatusMailer,
};
use super::permissions::StatusPermissionMatrix;
use super::repository::{
    ApplicationFilter, ApplicationOrdering, ApplicationStore, Page, StoreError, WorkshopStore,
};
use super::rights::{AccessClaim, RightsChecker};

/// Errors raised by the enrollment orchestrator. Each carries a stable
/// machine-readable code for the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum EnrollmentError {
    #[error("caller is not permitted to perform this operation")]
    AccessDenied,
    #[error("application {0} was not found")]
    ApplicationNotFound(ApplicationId),
    #[error("workshop {0} was not found")]
    WorkshopNotFound(WorkshopId),
    #[error("workshop is blocked and does not accept applications")]
    WorkshopBlocked,
    #[error("workshop is closed for new applications")]
    WorkshopClosed,
    #[error("child already has an active application for this workshop")]
    ActiveApplicationExists,
    #[error("workshop has no free seats left")]
    WorkshopFull,
    #[error("child already holds a seat in this workshop")]
    AlreadyApproved,
    #[error("{role} may not move an application from {from} to {to}")]
    ForbiddenTransition {
        role: Role,
        from: ApplicationStatus,
        to: ApplicationStatus,
    },
    #[error("application was modified concurrently, reload and retry")]
    Conflict,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EnrollmentError {
    pub fn code(&self) -> &'static str {
        match self {
            EnrollmentError::AccessDenied => "access_denied",
            EnrollmentError::ApplicationNotFound(_) | EnrollmentError::WorkshopNotFound(_) => {
                "not_found"
            }
            EnrollmentError::WorkshopBlocked => "workshop_blocked",
            EnrollmentError::WorkshopClosed => "workshop_closed",
            EnrollmentError::ActiveApplicationExists => "active_application_exists",
            EnrollmentError::WorkshopFull => "workshop_full",
            EnrollmentError::AlreadyApproved => "already_approved",
            EnrollmentError::ForbiddenTransition { .. } => "forbidden_transition",
            EnrollmentError::Conflict => "concurrency_conflict",
            EnrollmentError::Store(_) => "storage_unavailable",
        }
    }
}

impl From<CapacityError> for EnrollmentError {
    fn from(value: CapacityError) -> Self {
        match value {
            CapacityError::WorkshopNotFound(id) => EnrollmentError::WorkshopNotFound(id),
            CapacityError::Store(err) => EnrollmentError::Store(err),
        }
    }
}

/// Request to open a new application.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateApplication {
    pub parent_id: ParentId,
    pub child_id: ChildId,
    pub workshop_id: WorkshopId,
}

/// Requested status change for an existing application.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdate {
    pub status: ApplicationStatus,
    #[serde(default)]
    pub rejection_message: Option<String>,
    pub parent_id: ParentId,
    pub workshop_id: WorkshopId,
    pub provider_id: ProviderId,
}

/// Result of the create path. Hitting the submission limit is an expected,
/// user-facing condition, not an error.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(Application),
    RateLimited { retry_after_seconds: i64 },
}

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_id() -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("app-{id:06}"))
}

/// Orchestrator for the application lifecycle: rate-limited creation, the
/// permission-checked status machine, seat accounting, and notifications.
pub struct EnrollmentService<A, W> {
    applications: Arc<A>,
    workshops: Arc<W>,
    rights: Arc<dyn RightsChecker>,
    directory: Arc<dyn StaffDirectory>,
    notifier: Arc<dyn NotificationSink>,
    mailer: Arc<dyn StatusMailer>,
    recipients: RecipientResolver,
    limiter: SubmissionRateLimiter<A>,
    capacity: CapacityController<A, W>,
}

impl<A, W> EnrollmentService<A, W>
where
    A: ApplicationStore + 'static,
    W: WorkshopStore + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        applications: Arc<A>,
        workshops: Arc<W>,
        rights: Arc<dyn RightsChecker>,
        directory: Arc<dyn StaffDirectory>,
        notifier: Arc<dyn NotificationSink>,
        mailer: Arc<dyn StatusMailer>,
        limits: SubmissionLimits,
    ) -> Self {
        let limiter = SubmissionRateLimiter::new(applications.clone(), limits);
        let capacity = CapacityController::new(applications.clone(), workshops.clone());
        let recipients = RecipientResolver::new(directory.clone());

        Self {
            applications,
            workshops,
            rights,
            directory,
            notifier,
            mailer,
            recipients,
            limiter,
            capacity,
        }
    }

    /// Open a new application in `Pending` for the caller's child.
    pub fn create(
        &self,
        caller: &Caller,
        request: CreateApplication,
    ) -> Result<CreateOutcome, EnrollmentError> {
        let claim = AccessClaim::Parent {
            parent_id: request.parent_id.clone(),
            child_id: Some(request.child_id.clone()),
        };
        if !self.rights.user_has_rights(caller, &[claim]) {
            return Err(EnrollmentError::AccessDenied);
        }

        let workshop = self.load_workshop(&request.workshop_id)?;

        if workshop.is_blocked {
            return Err(EnrollmentError::WorkshopBlocked);
        }
        if workshop.status != WorkshopStatus::Open {
            return Err(EnrollmentError::WorkshopClosed);
        }

        let active = ApplicationFilter::default()
            .child(request.child_id.clone())
            .workshop(request.workshop_id.clone())
            .with_statuses(ApplicationStatus::ACTIVE);
        if self.applications.count(&active)? > 0 {
            return Err(EnrollmentError::ActiveApplicationExists);
        }

        let now = Utc::now();
        let decision = self.limiter.check(
            &request.parent_id,
            &request.child_id,
            &request.workshop_id,
            now,
        )?;
        if !decision.allowed {
            info!(
                workshop = %request.workshop_id,
                retry_after_seconds = decision.retry_after_seconds,
                "submission limit exceeded"
            );
            return Ok(CreateOutcome::RateLimited {
                retry_after_seconds: decision.retry_after_seconds,
            });
        }

        let application = Application {
            id: next_application_id(),
            parent_id: request.parent_id,
            child_id: request.child_id,
            workshop_id: request.workshop_id,
            status: ApplicationStatus::Pending,
            creation_time: now,
            approved_time: None,
            rejection_message: None,
            is_blocked_by_provider: false,
            version: 0,
        };

        let stored = self.applications.insert(application)?;
        info!(application = %stored.id, "application created");

        let recipients = self.recipients.for_create(&stored, &workshop.provider_id);
        self.dispatch(NotificationEvent::for_status(
            NotificationAction::Create,
            stored.id.clone(),
            recipients,
            stored.status,
        ));

        Ok(CreateOutcome::Created(stored))
    }

    /// Move an application through the status machine.
    pub fn update_status(
        &self,
        caller: &Caller,
        id: &ApplicationId,
        update: StatusUpdate,
    ) -> Result<Application, EnrollmentError> {
        let claims = [
            AccessClaim::Parent {
                parent_id: update.parent_id.clone(),
                child_id: None,
            },
            AccessClaim::Provider {
                provider_id: update.provider_id.clone(),
            },
            AccessClaim::EmployeeWorkshop {
                provider_id: update.provider_id.clone(),
                workshop_id: update.workshop_id.clone(),
            },
        ];
        if !self.rights.user_has_rights(caller, &claims) {
            return Err(EnrollmentError::AccessDenied);
        }

        let current = self
            .applications
            .fetch(id)?
            .ok_or_else(|| EnrollmentError::ApplicationNotFound(id.clone()))?;

        // Re-requesting the current status is an idempotent success.
        if current.status == update.status {
            return Ok(current);
        }

        let workshop = self.load_workshop(&current.workshop_id)?;
        let previous_status = current.status;

        if update.status.occupies_seat() {
            self.check_seat_availability(&current, &workshop)?;
        }

        let matrix = StatusPermissionMatrix::for_workshop(workshop.competitive_selection);
        if !matrix.can_change_status(caller.role, current.status, update.status) {
            return Err(EnrollmentError::ForbiddenTransition {
                role: caller.role,
                from: current.status,
                to: update.status,
            });
        }

        let mut changed = current;
        changed.status = update.status;
        changed.rejection_message = update.rejection_message;
        if changed.status != ApplicationStatus::Rejected {
            changed.rejection_message = None;
        }
        if changed.status == ApplicationStatus::Approved {
            changed.approved_time = Some(Utc::now());
        }

        let updated = self.applications.update(changed).map_err(|err| match err {
            StoreError::VersionConflict => EnrollmentError::Conflict,
            other => EnrollmentError::Store(other),
        })?;
        info!(
            application = %updated.id,
            from = %previous_status,
            to = %updated.status,
            "application status updated"
        );

        let recipients = self.recipients.for_update(&updated, &workshop.provider_id);
        self.dispatch(NotificationEvent::for_status(
            NotificationAction::Update,
            updated.id.clone(),
            recipients,
            updated.status,
        ));

        self.send_status_email(&updated, &workshop);

        self.capacity
            .reconcile_after_transition(&updated.workshop_id, previous_status, updated.status)?;

        Ok(updated)
    }

    /// Fetch an application, allowing the owning parent, the provider, or
    /// an employee scoped to the workshop.
    pub fn get(&self, caller: &Caller, id: &ApplicationId) -> Result<Application, EnrollmentError> {
        let application = self
            .applications
            .fetch(id)?
            .ok_or_else(|| EnrollmentError::ApplicationNotFound(id.clone()))?;
        let workshop = self.load_workshop(&application.workshop_id)?;

        let claims = [
            AccessClaim::Parent {
                parent_id: application.parent_id.clone(),
                child_id: None,
            },
            AccessClaim::Provider {
                provider_id: workshop.provider_id.clone(),
            },
            AccessClaim::EmployeeWorkshop {
                provider_id: workshop.provider_id.clone(),
                workshop_id: workshop.id.clone(),
            },
        ];
        if !self.rights.user_has_rights(caller, &claims) {
            return Err(EnrollmentError::AccessDenied);
        }

        Ok(application)
    }

    /// Provider-side listing of a workshop's applications: unblocked
    /// records first, oldest first within each group.
    pub fn list_for_workshop(
        &self,
        caller: &Caller,
        workshop_id: &WorkshopId,
        page: Page,
    ) -> Result<Vec<Application>, EnrollmentError> {
        let workshop = self.load_workshop(workshop_id)?;

        let claims = [
            AccessClaim::Provider {
                provider_id: workshop.provider_id.clone(),
            },
            AccessClaim::EmployeeWorkshop {
                provider_id: workshop.provider_id.clone(),
                workshop_id: workshop.id.clone(),
            },
        ];
        if !self.rights.user_has_rights(caller, &claims) {
            return Err(EnrollmentError::AccessDenied);
        }

        let filter = ApplicationFilter::default().workshop(workshop_id.clone());
        Ok(self
            .applications
            .list(&filter, ApplicationOrdering::default(), page)?)
    }

    /// Probe the submission limit for a triple without creating anything.
    pub fn check_rate_limit(
        &self,
        parent_id: &ParentId,
        child_id: &ChildId,
        workshop_id: &WorkshopId,
        now: DateTime<Utc>,
    ) -> Result<LimitDecision, EnrollmentError> {
        Ok(self.limiter.check(parent_id, child_id, workshop_id, now)?)
    }

    /// Explicitly reconcile a workshop after an out-of-band transition.
    pub fn reconcile_workshop_capacity(
        &self,
        workshop_id: &WorkshopId,
        from: ApplicationStatus,
        to: ApplicationStatus,
    ) -> Result<(), EnrollmentError> {
        self.capacity
            .reconcile_after_transition(workshop_id, from, to)?;
        Ok(())
    }

    /// System maintenance path: move every `Approved` application to
    /// `StudyingForYears`. Bypasses the role-checked matrix on purpose and
    /// is idempotent; the affected-row count is returned for observability.
    pub fn promote_approved_to_studying(&self) -> Result<usize, EnrollmentError> {
        let affected = self.applications.promote_approved_to_studying()?;
        info!(affected, "promoted approved applications to studying");
        Ok(affected)
    }

    fn load_workshop(&self, id: &WorkshopId) -> Result<Workshop, EnrollmentError> {
        self.workshops
            .fetch(id)?
            .ok_or_else(|| EnrollmentError::WorkshopNotFound(id.clone()))
    }

    /// Guards for transitions into a seat-occupying status: non-state
    /// providers may not approve past capacity, and one child may hold at
    /// most one seat per workshop.
    fn check_seat_availability(
        &self,
        current: &Application,
        workshop: &Workshop,
    ) -> Result<(), EnrollmentError> {
        if workshop.ownership != Ownership::State {
            let occupied = ApplicationFilter::default()
                .workshop(current.workshop_id.clone())
                .with_statuses(ApplicationStatus::SEAT_OCCUPYING);
            let occupied = self.applications.count(&occupied)? as u64;
            if occupied >= u64::from(workshop.available_seats) {
                return Err(EnrollmentError::WorkshopFull);
            }
        }

        let child_seats = ApplicationFilter::default()
            .child(current.child_id.clone())
            .workshop(current.workshop_id.clone())
            .with_statuses(ApplicationStatus::SEAT_OCCUPYING);
        if self.applications.count(&child_seats)? >= 1 {
            return Err(EnrollmentError::AlreadyApproved);
        }

        Ok(())
    }

    fn dispatch(&self, event: NotificationEvent) {
        if let Err(err) = self.notifier.dispatch(event) {
            warn!(error = %err, "notification dispatch failed");
        }
    }

    /// Best-effort parent email for the parent-facing statuses; a failure
    /// here never rolls back the committed status change.
    fn send_status_email(&self, application: &Application, workshop: &Workshop) {
        let Some(subject) = StatusEmail::subject_for(application.status) else {
            return;
        };
        let Some(recipient) = self.directory.parent_user(&application.parent_id) else {
            warn!(application = %application.id, "no parent user to email");
            return;
        };

        let email = StatusEmail {
            recipient,
            application_id: application.id.clone(),
            subject: subject.to_string(),
            workshop_title: workshop.title.clone(),
            rejection_message: application.rejection_message.clone(),
        };
        if let Err(err) = self.mailer.send(email) {
            warn!(application = %application.id, error = %err, "status email failed");
        }
    }
}
