use std::collections::{BTreeSet, HashSet};

use super::domain::{ApplicationStatus, Role};

/// Static table of allowed `(role, from, to)` status transitions.
///
/// Two variants exist, selected by the workshop's `competitive_selection`
/// flag. The matrix is pure lookup; side effects of an allowed transition
/// (clearing the rejection message, stamping the approval time) belong to
/// the caller.
#[derive(Debug, Clone)]
pub struct StatusPermissionMatrix {
    allowed: HashSet<(Role, ApplicationStatus, ApplicationStatus)>,
    denied_targets: BTreeSet<ApplicationStatus>,
}

impl StatusPermissionMatrix {
    /// Table for workshops enrolling on a first-come basis.
    pub fn default_mode() -> Self {
        let mut matrix = Self::common();

        matrix.allow(Role::Admin, ApplicationStatus::Approved, ApplicationStatus::Pending);
        matrix.allow(Role::Admin, ApplicationStatus::Approved, ApplicationStatus::Completed);
        matrix.allow(Role::Admin, ApplicationStatus::Approved, ApplicationStatus::Left);
        matrix.allow(Role::Admin, ApplicationStatus::StudyingForYears, ApplicationStatus::Rejected);
        matrix.allow(Role::Admin, ApplicationStatus::StudyingForYears, ApplicationStatus::Left);

        matrix.allow(Role::Parent, ApplicationStatus::Rejected, ApplicationStatus::Pending);
        matrix.allow(Role::Parent, ApplicationStatus::Left, ApplicationStatus::Pending);

        matrix.allow_provider(ApplicationStatus::Pending, ApplicationStatus::Approved);
        matrix.allow_provider(ApplicationStatus::Pending, ApplicationStatus::Completed);
        matrix.allow_provider(ApplicationStatus::Pending, ApplicationStatus::Rejected);
        matrix.allow_provider(ApplicationStatus::Pending, ApplicationStatus::StudyingForYears);
        matrix.allow_provider(ApplicationStatus::Approved, ApplicationStatus::StudyingForYears);
        matrix.allow_provider(ApplicationStatus::Left, ApplicationStatus::Approved);
        matrix.allow_provider(ApplicationStatus::Left, ApplicationStatus::Completed);
        matrix.allow_provider(ApplicationStatus::Left, ApplicationStatus::Rejected);
        matrix.allow_provider(ApplicationStatus::StudyingForYears, ApplicationStatus::Approved);

        // Without a selection round this status must stay unreachable.
        matrix.deny_target_for_all(ApplicationStatus::AcceptedForSelection);

        matrix
    }

    /// Table for workshops with a competitive selection round, which
    /// inserts `AcceptedForSelection` between `Pending` and `Approved`.
    pub fn competitive_selection() -> Self {
        let mut matrix = Self::common();

        matrix.allow(Role::Admin, ApplicationStatus::Rejected, ApplicationStatus::Pending);
        matrix.allow(
            Role::Admin,
            ApplicationStatus::AcceptedForSelection,
            ApplicationStatus::Approved,
        );
        matrix.allow(
            Role::Admin,
            ApplicationStatus::AcceptedForSelection,
            ApplicationStatus::StudyingForYears,
        );
        matrix.allow(
            Role::Admin,
            ApplicationStatus::AcceptedForSelection,
            ApplicationStatus::Rejected,
        );

        matrix.allow(
            Role::Parent,
            ApplicationStatus::AcceptedForSelection,
            ApplicationStatus::Left,
        );

        matrix.allow_provider(
            ApplicationStatus::Pending,
            ApplicationStatus::AcceptedForSelection,
        );
        matrix.allow_provider(ApplicationStatus::Pending, ApplicationStatus::Rejected);
        matrix.allow_provider(
            ApplicationStatus::AcceptedForSelection,
            ApplicationStatus::Approved,
        );
        matrix.allow_provider(
            ApplicationStatus::AcceptedForSelection,
            ApplicationStatus::Completed,
        );
        matrix.allow_provider(
            ApplicationStatus::AcceptedForSelection,
            ApplicationStatus::Rejected,
        );
        matrix.allow_provider(
            ApplicationStatus::AcceptedForSelection,
            ApplicationStatus::StudyingForYears,
        );
        matrix.allow_provider(
            ApplicationStatus::AcceptedForSelection,
            ApplicationStatus::Pending,
        );
        matrix.allow_provider(ApplicationStatus::Approved, ApplicationStatus::StudyingForYears);
        matrix.allow_provider(ApplicationStatus::Approved, ApplicationStatus::Pending);
        matrix.allow_provider(ApplicationStatus::StudyingForYears, ApplicationStatus::Pending);
        matrix.allow_provider(ApplicationStatus::Rejected, ApplicationStatus::Pending);
        matrix.allow_provider(
            ApplicationStatus::Rejected,
            ApplicationStatus::AcceptedForSelection,
        );

        matrix
    }

    /// Select the variant for a workshop.
    pub fn for_workshop(competitive_selection: bool) -> Self {
        if competitive_selection {
            Self::competitive_selection()
        } else {
            Self::default_mode()
        }
    }

    /// Rows shared by both variants.
    fn common() -> Self {
        let mut matrix = Self {
            allowed: HashSet::new(),
            denied_targets: BTreeSet::new(),
        };

        matrix.allow_any_target(Role::Admin, ApplicationStatus::Pending);
        matrix.allow(Role::Admin, ApplicationStatus::Approved, ApplicationStatus::StudyingForYears);
        matrix.allow(Role::Admin, ApplicationStatus::Approved, ApplicationStatus::Rejected);
        matrix.allow(
            Role::Admin,
            ApplicationStatus::StudyingForYears,
            ApplicationStatus::Completed,
        );

        matrix.allow(Role::Parent, ApplicationStatus::Pending, ApplicationStatus::Left);
        matrix.allow(Role::Parent, ApplicationStatus::Approved, ApplicationStatus::Left);
        matrix.allow(
            Role::Parent,
            ApplicationStatus::StudyingForYears,
            ApplicationStatus::Left,
        );

        matrix.allow_provider(ApplicationStatus::Approved, ApplicationStatus::Completed);
        matrix.allow_provider(ApplicationStatus::Approved, ApplicationStatus::Rejected);
        matrix.allow_provider(ApplicationStatus::StudyingForYears, ApplicationStatus::Completed);
        matrix.allow_provider(ApplicationStatus::StudyingForYears, ApplicationStatus::Rejected);
        matrix.allow_provider(ApplicationStatus::Rejected, ApplicationStatus::Approved);
        matrix.allow_provider(ApplicationStatus::Rejected, ApplicationStatus::StudyingForYears);
        matrix.allow_provider(ApplicationStatus::Rejected, ApplicationStatus::Completed);
        matrix.allow_provider(ApplicationStatus::Left, ApplicationStatus::StudyingForYears);

        matrix
    }

    fn allow(&mut self, role: Role, from: ApplicationStatus, to: ApplicationStatus) {
        self.allowed.insert((role, from, to));
    }

    /// Employees act with the provider's permissions.
    fn allow_provider(&mut self, from: ApplicationStatus, to: ApplicationStatus) {
        self.allow(Role::Provider, from, to);
        self.allow(Role::Employee, from, to);
    }

    fn allow_any_target(&mut self, role: Role, from: ApplicationStatus) {
        for to in ApplicationStatus::ALL {
            if to != from {
                self.allow(role, from, to);
            }
        }
    }

    /// Block a target status for every role, overriding any allow row.
    fn deny_target_for_all(&mut self, to: ApplicationStatus) {
        self.denied_targets.insert(to);
    }

    /// Pure, total transition check. A same-status "transition" is never
    /// part of the table; callers treat it as a no-op success before
    /// consulting the matrix.
    pub fn can_change_status(
        &self,
        role: Role,
        from: ApplicationStatus,
        to: ApplicationStatus,
    ) -> bool {
        if from == to || self.denied_targets.contains(&to) {
            return false;
        }
        self.allowed.contains(&(role, from, to))
    }

    /// Enumerate the allowed triples, sorted for stable display.
    pub fn allowed_transitions(&self) -> Vec<(Role, ApplicationStatus, ApplicationStatus)> {
        let mut rows: Vec<_> = self
            .allowed
            .iter()
            .filter(|(_, _, to)| !self.denied_targets.contains(to))
            .copied()
            .collect();
        rows.sort_by_key(|(role, from, to)| (role.label(), *from, *to));
        rows
    }
}
