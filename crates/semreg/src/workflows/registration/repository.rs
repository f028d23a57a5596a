use chrono::{DateTime, Utc};

use super::assignments::{AssignmentId, TutorAssignment};
use super::domain::{Department, Semester, Student, StudentId, User, UserId};
use super::fines::FineLedger;
use super::notify::{Notification, SystemLog};
use super::windows::{RosterStatus, SemesterRegistration, WindowId, WindowTerms};

/// Document storage for every registry collection.
///
/// Single-document writes commit independently. Multi-document writes that must
/// become visible together go through [`Transaction`] and [`RegistryStore::commit`].
pub trait RegistryStore: Send + Sync {
    fn insert_user(&self, user: User) -> Result<User, RepositoryError>;
    fn fetch_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    fn find_user_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError>;
    fn update_user(&self, user: User) -> Result<(), RepositoryError>;
    fn list_users(&self) -> Result<Vec<User>, RepositoryError>;
    fn delete_user(&self, id: &UserId) -> Result<(), RepositoryError>;

    fn insert_student(&self, student: Student) -> Result<Student, RepositoryError>;
    fn fetch_student(&self, id: &StudentId) -> Result<Option<Student>, RepositoryError>;
    fn update_student(&self, student: Student) -> Result<(), RepositoryError>;
    fn list_students(&self) -> Result<Vec<Student>, RepositoryError>;
    fn students_in_scope(
        &self,
        department: Department,
        semester: Semester,
    ) -> Result<Vec<Student>, RepositoryError>;
    fn delete_student(&self, id: &StudentId) -> Result<(), RepositoryError>;

    fn fetch_fines(&self, student: &StudentId) -> Result<Option<FineLedger>, RepositoryError>;
    fn save_fines(&self, ledger: FineLedger) -> Result<(), RepositoryError>;
    fn delete_fines(&self, student: &StudentId) -> Result<(), RepositoryError>;

    fn fetch_window(&self, id: &WindowId) -> Result<Option<SemesterRegistration>, RepositoryError>;
    fn find_active_window(
        &self,
        department: Department,
        semester: Semester,
        creator: &UserId,
    ) -> Result<Option<SemesterRegistration>, RepositoryError>;
    fn windows_created_by(
        &self,
        creator: &UserId,
    ) -> Result<Vec<SemesterRegistration>, RepositoryError>;
    fn active_windows_for_student(
        &self,
        student: &StudentId,
    ) -> Result<Vec<SemesterRegistration>, RepositoryError>;
    /// Change deadline and status in place; the roster is never rewritten.
    /// Windows owned by another creator are reported as missing.
    fn set_window_terms(
        &self,
        id: &WindowId,
        creator: &UserId,
        terms: WindowTerms,
    ) -> Result<SemesterRegistration, RepositoryError>;
    /// Move one roster entry forward inside an active window. Returns whether
    /// anything changed; missing or inactive windows change nothing.
    fn advance_roster_entry(
        &self,
        id: &WindowId,
        student: &StudentId,
        target: RosterStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
    /// Remove a window only while every roster entry is still pending.
    /// Fails with [`RepositoryError::Retained`] otherwise.
    fn delete_window(&self, id: &WindowId) -> Result<SemesterRegistration, RepositoryError>;

    fn insert_assignment(
        &self,
        assignment: TutorAssignment,
    ) -> Result<TutorAssignment, RepositoryError>;
    fn fetch_assignment(&self, id: &AssignmentId)
        -> Result<Option<TutorAssignment>, RepositoryError>;
    fn assignment_for_tutor(
        &self,
        tutor: &UserId,
    ) -> Result<Option<TutorAssignment>, RepositoryError>;
    fn list_assignments(&self) -> Result<Vec<TutorAssignment>, RepositoryError>;
    fn update_assignment(&self, assignment: TutorAssignment) -> Result<(), RepositoryError>;
    fn delete_assignment(&self, id: &AssignmentId) -> Result<(), RepositoryError>;

    fn append_log(&self, entry: SystemLog) -> Result<(), RepositoryError>;
    /// Newest first.
    fn recent_logs(&self, limit: usize) -> Result<Vec<SystemLog>, RepositoryError>;

    fn begin(&self) -> Transaction {
        Transaction::default()
    }

    /// Apply every staged write or none of them.
    fn commit(&self, transaction: Transaction) -> Result<(), RepositoryError>;
}

/// Write staged inside a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum StagedWrite {
    InsertWindow(SemesterRegistration),
    InsertNotification(Notification),
}

/// Unit of work spanning several collections. Dropping it without committing
/// discards every staged write.
#[derive(Debug, Default)]
pub struct Transaction {
    writes: Vec<StagedWrite>,
}

impl Transaction {
    pub fn insert_window(&mut self, window: SemesterRegistration) {
        self.writes.push(StagedWrite::InsertWindow(window));
    }

    pub fn insert_notification(&mut self, notification: Notification) {
        self.writes.push(StagedWrite::InsertNotification(notification));
    }

    pub fn into_writes(self) -> Vec<StagedWrite> {
        self.writes
    }
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record conflicts with an existing record: {0}")]
    Conflict(String),
    #[error("record not found")]
    NotFound,
    #[error("record holds {0} entries that must be kept")]
    Retained(usize),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
