use std::sync::Arc;

use tracing::debug;

use super::domain::{ApplicationStatus, WorkshopId, WorkshopStatus, UNLIMITED_SEATS};
use super::repository::{ApplicationFilter, ApplicationStore, StoreError, WorkshopStore};

#[derive(Debug, thiserror::Error)]
pub enum CapacityError {
    #[error("workshop {0} was not found")]
    WorkshopNotFound(WorkshopId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Seat accounting for workshops. This is the only component that writes
/// `Workshop.status`; the open/closed invariant is restored here after
/// every seat-relevant application transition, not held continuously.
pub struct CapacityController<A, W> {
    applications: Arc<A>,
    workshops: Arc<W>,
}

impl<A, W> CapacityController<A, W>
where
    A: ApplicationStore,
    W: WorkshopStore,
{
    pub fn new(applications: Arc<A>, workshops: Arc<W>) -> Self {
        Self {
            applications,
            workshops,
        }
    }

    /// Count of applications currently holding a seat in the workshop.
    pub fn taken_seats(&self, workshop_id: &WorkshopId) -> Result<usize, StoreError> {
        let filter = ApplicationFilter::default()
            .workshop(workshop_id.clone())
            .with_statuses(ApplicationStatus::SEAT_OCCUPYING);
        self.applications.count(&filter)
    }

    /// Reconcile the workshop's open/closed status after a single
    /// application moved from `from` to `to`. Transitions that do not
    /// cross the seat boundary are ignored.
    pub fn reconcile_after_transition(
        &self,
        workshop_id: &WorkshopId,
        from: ApplicationStatus,
        to: ApplicationStatus,
    ) -> Result<(), CapacityError> {
        if to.occupies_seat() && !from.occupies_seat() {
            self.reconcile(workshop_id, true)
        } else if from.occupies_seat() && !to.occupies_seat() {
            self.reconcile(workshop_id, false)
        } else {
            Ok(())
        }
    }

    fn reconcile(&self, workshop_id: &WorkshopId, seat_taken: bool) -> Result<(), CapacityError> {
        let taken = self.taken_seats(workshop_id)? as u64;
        let workshop = self
            .workshops
            .fetch(workshop_id)?
            .ok_or_else(|| CapacityError::WorkshopNotFound(workshop_id.clone()))?;

        if workshop.available_seats == UNLIMITED_SEATS {
            return Ok(());
        }

        let available = u64::from(workshop.available_seats);

        if seat_taken && taken == available && workshop.status != WorkshopStatus::Closed {
            debug!(workshop = %workshop_id, taken, "workshop reached capacity, closing");
            self.workshops
                .set_status(workshop_id, WorkshopStatus::Closed)?;
        } else if !seat_taken && taken + 1 == available && workshop.status != WorkshopStatus::Open {
            debug!(workshop = %workshop_id, taken, "seat freed, reopening workshop");
            self.workshops.set_status(workshop_id, WorkshopStatus::Open)?;
        }

        Ok(())
    }
}
