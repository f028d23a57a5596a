//! Semester registration: student eligibility, tutor-scoped registration
//! windows, the staff fine desk and the admin directory.
//!
//! [`Registry`] is the single entry point. Its operations are spread over
//! the lifecycle, windows, assignments, desk, admin and accounts modules; each
//! checks the caller's role before touching storage.

pub mod accounts;
pub mod admin;
pub mod assignments;
pub mod desk;
pub mod domain;
pub(crate) mod eligibility;
pub mod error;
pub mod fines;
pub mod lifecycle;
pub mod memory;
pub mod notify;
pub mod registry;
pub mod repository;
pub mod router;
pub mod windows;

#[cfg(test)]
mod tests;

pub use accounts::{Credentials, Session};
pub use admin::{NewStudent, NewUser};
pub use assignments::{AssignmentDraft, AssignmentId, AssignmentPatch, ScopeRequest, TutorAssignment};
pub use desk::VerificationUpdate;
pub use domain::{
    Department, RegistrationStatus, Role, Scope, Semester, Student, StudentId, User, UserId,
    UserView, Verification, VerificationStatus,
};
pub use eligibility::Eligibility;
pub use error::{ConflictError, PreconditionError, RegistryError};
pub use fines::{
    FineCategory, FineEntry, FineEntryUpdate, FineLedger, FineStatus, FineSummary, FineUpdate,
};
pub use lifecycle::RegistrationOutcome;
pub use memory::InMemoryStore;
pub use notify::{
    Email, MailError, Mailer, Notification, NotificationError, NotificationId, NotificationKind,
    NotificationSink, Recipient, SystemLog,
};
pub use registry::Registry;
pub use repository::{RegistryStore, RepositoryError, StagedWrite, Transaction};
pub use router::registry_router;
pub use windows::{
    ReminderReport, RosterEntry, RosterStatus, SemesterRegistration, WindowDraft, WindowId,
    WindowPatch, WindowStatistics, WindowStatus, WindowTerms,
};
