use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::{verify_decoy, verify_password, Caller, Operation};

use super::domain::{Role, UserId};
use super::error::RegistryError;
use super::notify::{Notification, NotificationError, NotificationId, Recipient};
use super::registry::Registry;

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
    pub role: Role,
}

impl Registry {
    /// Verify credentials and open a session. Unknown users and wrong
    /// passwords are indistinguishable to the caller.
    pub fn login(&self, credentials: &Credentials) -> Result<Session, RegistryError> {
        let Some(user) = self
            .store
            .find_user_by_username(credentials.username.trim())?
        else {
            verify_decoy(&credentials.password);
            return Err(RegistryError::InvalidCredentials);
        };
        if !verify_password(&credentials.password, &user.password_hash)? {
            return Err(RegistryError::InvalidCredentials);
        }

        let caller = Caller {
            user_id: user.id.clone(),
            role: user.role,
            student_id: user.student_id.clone(),
        };
        let token = self.sessions.issue(caller);
        info!(user_id = %user.id, role = user.role.label(), "session opened");
        Ok(Session {
            token,
            user_id: user.id,
            role: user.role,
        })
    }

    pub fn logout(&self, token: &str) -> bool {
        self.sessions.revoke(token)
    }

    pub fn authenticate(&self, token: Option<&str>) -> Result<Caller, RegistryError> {
        token
            .and_then(|token| self.sessions.resolve(token))
            .ok_or(RegistryError::Unauthenticated)
    }

    pub fn notifications_for(&self, caller: &Caller) -> Result<Vec<Notification>, RegistryError> {
        caller.authorize(Operation::ReadNotifications)?;
        Ok(self.notifications.for_recipients(&recipients(caller))?)
    }

    pub fn mark_notification_read(
        &self,
        caller: &Caller,
        id: &NotificationId,
    ) -> Result<Notification, RegistryError> {
        caller.authorize(Operation::ReadNotifications)?;
        self.notifications
            .mark_read(id, &recipients(caller))
            .map_err(|err| match err {
                NotificationError::NotFound => RegistryError::NotFound("notification"),
                other => other.into(),
            })
    }
}

fn recipients(caller: &Caller) -> Vec<Recipient> {
    let mut recipients = vec![Recipient::User(caller.user_id.clone())];
    if let Some(student) = &caller.student_id {
        recipients.push(Recipient::Student(student.clone()));
    }
    recipients
}
