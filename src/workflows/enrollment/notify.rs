use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::domain::{
    Application, ApplicationId, ApplicationStatus, ParentId, ProviderId, UserId, WorkshopId,
};

/// Action a notification reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationAction {
    Create,
    Update,
}

/// Payload handed to the notification transport. `group_key` lets the
/// consumer collapse bursts of events for the same status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub action: NotificationAction,
    pub object_id: ApplicationId,
    pub recipients: Vec<UserId>,
    pub additional_data: BTreeMap<String, String>,
    pub group_key: String,
}

impl NotificationEvent {
    pub fn for_status(
        action: NotificationAction,
        object_id: ApplicationId,
        recipients: Vec<UserId>,
        status: ApplicationStatus,
    ) -> Self {
        let mut additional_data = BTreeMap::new();
        additional_data.insert("status".to_string(), status.label().to_string());
        Self {
            action,
            object_id,
            recipients,
            additional_data,
            group_key: status.label().to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Outbound notification hook. Dispatch failures are logged by the caller
/// and never roll back a committed status change.
pub trait NotificationSink: Send + Sync {
    fn dispatch(&self, event: NotificationEvent) -> Result<(), NotifyError>;
}

/// Lookup of the platform users behind providers, workshops, and parents.
pub trait StaffDirectory: Send + Sync {
    fn provider_user(&self, provider_id: &ProviderId) -> Option<UserId>;
    fn workshop_employees(&self, workshop_id: &WorkshopId) -> Vec<UserId>;
    fn provider_employees(&self, provider_id: &ProviderId) -> Vec<UserId>;
    fn parent_user(&self, parent_id: &ParentId) -> Option<UserId>;
}

/// Computes the distinct set of users to notify for an application event.
pub struct RecipientResolver {
    directory: Arc<dyn StaffDirectory>,
}

impl RecipientResolver {
    pub fn new(directory: Arc<dyn StaffDirectory>) -> Self {
        Self { directory }
    }

    /// A new application notifies the provider side: the provider's user
    /// plus employees scoped to the workshop and to the provider.
    pub fn for_create(&self, application: &Application, provider_id: &ProviderId) -> Vec<UserId> {
        let mut recipients = Vec::new();
        if let Some(user) = self.directory.provider_user(provider_id) {
            recipients.push(user);
        }
        recipients.extend(self.directory.workshop_employees(&application.workshop_id));
        recipients.extend(self.directory.provider_employees(provider_id));
        dedup_preserving_order(recipients)
    }

    /// Status updates notify the parent for the parent-facing statuses and
    /// the provider side when the child left; other statuses produce no
    /// recipients beyond the generic update event.
    pub fn for_update(&self, application: &Application, provider_id: &ProviderId) -> Vec<UserId> {
        if ApplicationStatus::PARENT_NOTIFIED.contains(&application.status) {
            return self
                .directory
                .parent_user(&application.parent_id)
                .into_iter()
                .collect();
        }

        if application.status == ApplicationStatus::Left {
            return self.for_create(application, provider_id);
        }

        Vec::new()
    }
}

fn dedup_preserving_order(recipients: Vec<UserId>) -> Vec<UserId> {
    let mut seen = std::collections::HashSet::new();
    recipients
        .into_iter()
        .filter(|user| seen.insert(user.clone()))
        .collect()
}

/// Parent-facing status message rendered and sent out of band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEmail {
    pub recipient: UserId,
    pub application_id: ApplicationId,
    pub subject: String,
    pub workshop_title: String,
    pub rejection_message: Option<String>,
}

impl StatusEmail {
    /// Subject line per status; only the three parent-facing statuses have
    /// a message.
    pub fn subject_for(status: ApplicationStatus) -> Option<&'static str> {
        match status {
            ApplicationStatus::Approved => Some("Approved!"),
            ApplicationStatus::Rejected => Some("Rejected"),
            ApplicationStatus::AcceptedForSelection => Some("Accepted for selection!"),
            _ => None,
        }
    }
}

/// Rendering/sending collaborator for the parent-facing status emails.
pub trait StatusMailer: Send + Sync {
    fn send(&self, email: StatusEmail) -> Result<(), NotifyError>;
}
