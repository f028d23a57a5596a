use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{next_id, StudentId, UserId};
use super::repository::Transaction;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub String);

/// Who a notification is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Recipient {
    User(UserId),
    Student(StudentId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

/// In-app message produced as a side effect of a lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub recipient: Recipient,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        recipient: Recipient,
        title: impl Into<String>,
        message: impl Into<String>,
        kind: NotificationKind,
    ) -> Self {
        Self {
            id: NotificationId(next_id("ntf")),
            recipient,
            title: title.into(),
            message: message.into(),
            kind,
            read: false,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification not found")]
    NotFound,
    #[error("notification sink unavailable: {0}")]
    Unavailable(String),
}

/// Persists in-app notifications.
pub trait NotificationSink: Send + Sync {
    fn create(&self, notification: Notification) -> Result<Notification, NotificationError>;

    /// Stage a notification inside an open transaction; it becomes visible only
    /// when the transaction commits.
    fn stage(
        &self,
        transaction: &mut Transaction,
        notification: Notification,
    ) -> Result<(), NotificationError> {
        transaction.insert_notification(notification);
        Ok(())
    }

    /// Newest first.
    fn for_recipients(&self, recipients: &[Recipient])
        -> Result<Vec<Notification>, NotificationError>;

    fn mark_read(
        &self,
        id: &NotificationId,
        recipients: &[Recipient],
    ) -> Result<Notification, NotificationError>;
}

/// Outbound email message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail transport unavailable: {0}")]
    Transport(String),
    #[error("invalid recipient address '{0}'")]
    InvalidRecipient(String),
}

/// Email delivery hook. Callers treat every failure as non-fatal.
pub trait Mailer: Send + Sync {
    fn send(&self, email: Email) -> Result<(), MailError>;
}

/// Audit trail entry written alongside lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemLog {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<UserId>,
    pub action: String,
    pub detail: String,
    pub at: DateTime<Utc>,
}

impl SystemLog {
    pub fn new(actor: Option<&UserId>, action: &str, detail: impl Into<String>) -> Self {
        Self {
            id: next_id("log"),
            actor: actor.cloned(),
            action: action.to_string(),
            detail: detail.into(),
            at: Utc::now(),
        }
    }
}
