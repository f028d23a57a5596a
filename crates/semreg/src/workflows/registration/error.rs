use crate::auth::PasswordError;

use super::domain::{Department, Semester, UserId};
use super::notify::NotificationError;
use super::repository::RepositoryError;

/// Error raised by registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("{0}")]
    Validation(String),
    #[error("authentication required")]
    Unauthenticated,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("{0}")]
    Forbidden(String),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Notification(#[from] NotificationError),
    #[error(transparent)]
    Credential(#[from] PasswordError),
}

impl RegistryError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConflictError {
    #[error("an active registration window already exists for {department} semester {semester}")]
    DuplicateActiveWindow {
        department: Department,
        semester: Semester,
    },
    #[error("{department} semester {semester} is already assigned to another tutor")]
    ScopeConflict {
        department: Department,
        semester: Semester,
        tutor: UserId,
    },
    #[error("this tutor already has an assignment; update it instead")]
    AssignmentExists(UserId),
    #[error("{0}")]
    DuplicateIdentity(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PreconditionError {
    #[error("registration already completed")]
    AlreadyCompleted,
    #[error("student is not eligible for registration; pending verification: {}", .outstanding.join(", "))]
    NotEligible { outstanding: Vec<&'static str> },
    #[error("student has pending fines totalling {total}")]
    PendingFines { total: i64 },
    #[error("cannot delete: {count} student(s) have already submitted or been approved")]
    HasSubmittedWork { count: usize },
    #[error("no students found for {department} semester {semester}")]
    NoStudents {
        department: Department,
        semester: Semester,
    },
    #[error("registration window is inactive and cannot be reactivated")]
    WindowClosed,
}
