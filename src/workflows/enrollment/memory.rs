//! In-memory collaborators backing the dev server and the test suites.
//! A SQL-backed deployment replaces these behind the same traits.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use super::domain::{
    Application, ApplicationId, ApplicationStatus, Caller, ChildId, ParentId, ProviderId, Role,
    UserId, Workshop, WorkshopId, WorkshopStatus,
};
use super::notify::{
    NotificationEvent, NotificationSink, NotifyError, StaffDirectory, StatusEmail, StatusMailer,
};
use super::repository::{
    ApplicationFilter, ApplicationOrdering, ApplicationStore, Page, StoreError, WorkshopStore,
};
use super::rights::{AccessClaim, RightsChecker, TtlCache};

#[derive(Default)]
pub struct MemoryApplicationStore {
    records: Mutex<HashMap<ApplicationId, Application>>,
}

impl MemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ApplicationStore for MemoryApplicationStore {
    fn insert(&self, application: Application) -> Result<Application, StoreError> {
        let mut records = self.records.lock().expect("store mutex poisoned");
        if records.contains_key(&application.id) {
            return Err(StoreError::Duplicate);
        }
        records.insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn update(&self, application: Application) -> Result<Application, StoreError> {
        let mut records = self.records.lock().expect("store mutex poisoned");
        let stored = records
            .get_mut(&application.id)
            .ok_or(StoreError::NotFound)?;
        if stored.version != application.version {
            return Err(StoreError::VersionConflict);
        }
        let mut updated = application;
        updated.version += 1;
        *stored = updated.clone();
        Ok(updated)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, StoreError> {
        let records = self.records.lock().expect("store mutex poisoned");
        Ok(records.get(id).cloned())
    }

    fn filter(&self, filter: &ApplicationFilter) -> Result<Vec<Application>, StoreError> {
        let records = self.records.lock().expect("store mutex poisoned");
        Ok(records
            .values()
            .filter(|application| filter.matches(application))
            .cloned()
            .collect())
    }

    fn count(&self, filter: &ApplicationFilter) -> Result<usize, StoreError> {
        let records = self.records.lock().expect("store mutex poisoned");
        Ok(records
            .values()
            .filter(|application| filter.matches(application))
            .count())
    }

    fn list(
        &self,
        filter: &ApplicationFilter,
        ordering: ApplicationOrdering,
        page: Page,
    ) -> Result<Vec<Application>, StoreError> {
        let mut matched = self.filter(filter)?;
        ordering.sort(&mut matched);
        Ok(matched
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect())
    }

    fn promote_approved_to_studying(&self) -> Result<usize, StoreError> {
        let mut records = self.records.lock().expect("store mutex poisoned");
        let mut affected = 0;
        for application in records.values_mut() {
            if application.status == ApplicationStatus::Approved {
                application.status = ApplicationStatus::StudyingForYears;
                application.version += 1;
                affected += 1;
            }
        }
        Ok(affected)
    }
}

#[derive(Default)]
pub struct MemoryWorkshopStore {
    workshops: Mutex<HashMap<WorkshopId, Workshop>>,
}

impl MemoryWorkshopStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, workshop: Workshop) {
        self.workshops
            .lock()
            .expect("store mutex poisoned")
            .insert(workshop.id.clone(), workshop);
    }
}

impl WorkshopStore for MemoryWorkshopStore {
    fn fetch(&self, id: &WorkshopId) -> Result<Option<Workshop>, StoreError> {
        let workshops = self.workshops.lock().expect("store mutex poisoned");
        Ok(workshops.get(id).cloned())
    }

    fn set_status(&self, id: &WorkshopId, status: WorkshopStatus) -> Result<(), StoreError> {
        let mut workshops = self.workshops.lock().expect("store mutex poisoned");
        let workshop = workshops.get_mut(id).ok_or(StoreError::NotFound)?;
        workshop.status = status;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct OwnershipSnapshot {
    parent: Option<(ParentId, HashSet<ChildId>)>,
    provider: Option<ProviderId>,
    employee: Option<(ProviderId, HashSet<WorkshopId>)>,
}

/// Directory of parents, provider owners, and employees; doubles as the
/// rights checker, resolving caller ownership through a TTL cache.
pub struct MemoryDirectory {
    parents: Mutex<HashMap<ParentId, (UserId, HashSet<ChildId>)>>,
    provider_owners: Mutex<HashMap<ProviderId, UserId>>,
    employees: Mutex<HashMap<UserId, (ProviderId, HashSet<WorkshopId>)>>,
    ownership: TtlCache<UserId, OwnershipSnapshot>,
}

impl MemoryDirectory {
    pub fn new(identity_ttl: Duration) -> Self {
        Self {
            parents: Mutex::new(HashMap::new()),
            provider_owners: Mutex::new(HashMap::new()),
            employees: Mutex::new(HashMap::new()),
            ownership: TtlCache::new(identity_ttl),
        }
    }

    pub fn register_parent(
        &self,
        user: UserId,
        parent: ParentId,
        children: impl IntoIterator<Item = ChildId>,
    ) {
        self.parents
            .lock()
            .expect("directory mutex poisoned")
            .insert(parent, (user.clone(), children.into_iter().collect()));
        self.ownership.invalidate(&user);
    }

    pub fn register_provider(&self, provider: ProviderId, owner: UserId) {
        self.provider_owners
            .lock()
            .expect("directory mutex poisoned")
            .insert(provider, owner.clone());
        self.ownership.invalidate(&owner);
    }

    pub fn register_employee(
        &self,
        user: UserId,
        provider: ProviderId,
        workshops: impl IntoIterator<Item = WorkshopId>,
    ) {
        self.employees
            .lock()
            .expect("directory mutex poisoned")
            .insert(user.clone(), (provider, workshops.into_iter().collect()));
        self.ownership.invalidate(&user);
    }

    fn resolve_ownership(&self, user: &UserId) -> OwnershipSnapshot {
        self.ownership.get_or_insert_with(user.clone(), || {
            let mut snapshot = OwnershipSnapshot::default();

            let parents = self.parents.lock().expect("directory mutex poisoned");
            snapshot.parent = parents.iter().find_map(|(parent, (owner, children))| {
                (owner == user).then(|| (parent.clone(), children.clone()))
            });

            let owners = self.provider_owners.lock().expect("directory mutex poisoned");
            snapshot.provider = owners
                .iter()
                .find_map(|(provider, owner)| (owner == user).then(|| provider.clone()));

            let employees = self.employees.lock().expect("directory mutex poisoned");
            snapshot.employee = employees.get(user).cloned();

            snapshot
        })
    }
}

impl StaffDirectory for MemoryDirectory {
    fn provider_user(&self, provider_id: &ProviderId) -> Option<UserId> {
        self.provider_owners
            .lock()
            .expect("directory mutex poisoned")
            .get(provider_id)
            .cloned()
    }

    fn workshop_employees(&self, workshop_id: &WorkshopId) -> Vec<UserId> {
        let employees = self.employees.lock().expect("directory mutex poisoned");
        let mut users: Vec<_> = employees
            .iter()
            .filter(|(_, (_, workshops))| workshops.contains(workshop_id))
            .map(|(user, _)| user.clone())
            .collect();
        users.sort_by(|a, b| a.0.cmp(&b.0));
        users
    }

    fn provider_employees(&self, provider_id: &ProviderId) -> Vec<UserId> {
        let employees = self.employees.lock().expect("directory mutex poisoned");
        let mut users: Vec<_> = employees
            .iter()
            .filter(|(_, (provider, _))| provider == provider_id)
            .map(|(user, _)| user.clone())
            .collect();
        users.sort_by(|a, b| a.0.cmp(&b.0));
        users
    }

    fn parent_user(&self, parent_id: &ParentId) -> Option<UserId> {
        self.parents
            .lock()
            .expect("directory mutex poisoned")
            .get(parent_id)
            .map(|(user, _)| user.clone())
    }
}

impl RightsChecker for MemoryDirectory {
    fn user_has_rights(&self, caller: &Caller, claims: &[AccessClaim]) -> bool {
        if caller.role == Role::Admin {
            return true;
        }

        let ownership = self.resolve_ownership(&caller.user_id);

        claims.iter().any(|claim| match claim {
            AccessClaim::Parent {
                parent_id,
                child_id,
            } => ownership.parent.as_ref().is_some_and(|(owned, children)| {
                owned == parent_id
                    && child_id
                        .as_ref()
                        .map_or(true, |child| children.contains(child))
            }),
            AccessClaim::Provider { provider_id } => {
                ownership.provider.as_ref() == Some(provider_id)
            }
            AccessClaim::Employee { provider_id } => ownership
                .employee
                .as_ref()
                .is_some_and(|(provider, _)| provider == provider_id),
            AccessClaim::EmployeeWorkshop {
                provider_id,
                workshop_id,
            } => ownership
                .employee
                .as_ref()
                .is_some_and(|(provider, workshops)| {
                    provider == provider_id && workshops.contains(workshop_id)
                }),
        })
    }
}

/// Recording sink so the server and tests can inspect emitted events.
#[derive(Default)]
pub struct MemoryNotifications {
    events: Mutex<Vec<NotificationEvent>>,
}

impl MemoryNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().expect("sink mutex poisoned").clone()
    }
}

impl NotificationSink for MemoryNotifications {
    fn dispatch(&self, event: NotificationEvent) -> Result<(), NotifyError> {
        self.events.lock().expect("sink mutex poisoned").push(event);
        Ok(())
    }
}

/// Recording mailer standing in for the rendering/email pipeline.
#[derive(Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<StatusEmail>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<StatusEmail> {
        self.sent.lock().expect("mailer mutex poisoned").clone()
    }
}

impl StatusMailer for MemoryMailer {
    fn send(&self, email: StatusEmail) -> Result<(), NotifyError> {
        self.sent.lock().expect("mailer mutex poisoned").push(email);
        Ok(())
    }
}
