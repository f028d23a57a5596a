use std::sync::Arc;

use tracing::warn;

use crate::auth::SessionRegistry;
use crate::config::RegistrySettings;

use super::domain::{Student, StudentId, UserId};
use super::error::RegistryError;
use super::notify::{Email, Mailer, Notification, NotificationSink, SystemLog};
use super::repository::RegistryStore;

/// Facade composing storage, notification and mail collaborators. Operations
/// live in the lifecycle, windows, assignments, desk and admin modules.
pub struct Registry {
    pub(crate) store: Arc<dyn RegistryStore>,
    pub(crate) notifications: Arc<dyn NotificationSink>,
    pub(crate) mailer: Arc<dyn Mailer>,
    pub(crate) settings: RegistrySettings,
    pub(crate) sessions: SessionRegistry,
}

impl Registry {
    pub fn new(
        store: Arc<dyn RegistryStore>,
        notifications: Arc<dyn NotificationSink>,
        mailer: Arc<dyn Mailer>,
        settings: RegistrySettings,
    ) -> Self {
        Self {
            store,
            notifications,
            mailer,
            settings,
            sessions: SessionRegistry::default(),
        }
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    pub(crate) fn student(&self, id: &StudentId) -> Result<Student, RegistryError> {
        self.store
            .fetch_student(id)?
            .ok_or(RegistryError::NotFound("student"))
    }

    /// Persist an in-app notification outside any transaction. Failures are logged.
    pub(crate) fn notify(&self, notification: Notification) -> bool {
        let recipient = notification.recipient.clone();
        match self.notifications.create(notification) {
            Ok(_) => true,
            Err(err) => {
                warn!(?recipient, error = %err, "failed to persist notification");
                false
            }
        }
    }

    /// Send an email. Delivery failures are logged and never abort the caller.
    pub(crate) fn mail(&self, to: &str, subject: &str, body: String) -> bool {
        let email = Email {
            from: self.settings.mail_from.clone(),
            to: to.to_string(),
            subject: subject.to_string(),
            body,
        };
        match self.mailer.send(email) {
            Ok(()) => true,
            Err(err) => {
                warn!(to, subject, error = %err, "failed to send email");
                false
            }
        }
    }

    pub(crate) fn audit(&self, actor: Option<&UserId>, action: &str, detail: impl Into<String>) {
        if let Err(err) = self.store.append_log(SystemLog::new(actor, action, detail)) {
            warn!(action, error = %err, "failed to append system log");
        }
    }
}
