use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::auth::{Caller, Operation};

use super::domain::{RegistrationStatus, Student, StudentId, UserId};
use super::eligibility::Eligibility;
use super::error::{PreconditionError, RegistryError};
use super::notify::{Notification, NotificationKind, Recipient};
use super::registry::Registry;
use super::windows::RosterStatus;

/// Resulting status plus the breakdown explaining any stall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOutcome {
    pub student_id: StudentId,
    pub registration_status: RegistrationStatus,
    pub is_eligible: bool,
    pub fines_cleared: bool,
    pub total_pending_fines: i64,
    pub outstanding_verifications: Vec<&'static str>,
    pub registration_completed_at: Option<DateTime<Utc>>,
}

impl RegistrationOutcome {
    fn new(student: &Student, eligibility: Eligibility) -> Self {
        Self {
            student_id: student.id.clone(),
            registration_status: student.registration_status,
            is_eligible: eligibility.is_eligible,
            fines_cleared: eligibility.fines_cleared,
            total_pending_fines: eligibility.total_pending_fines,
            outstanding_verifications: eligibility.outstanding_verifications,
            registration_completed_at: student.registration_completed_at,
        }
    }
}

impl Registry {
    /// Current status of the caller's own registration.
    pub fn registration_status(
        &self,
        caller: &Caller,
    ) -> Result<RegistrationOutcome, RegistryError> {
        caller.authorize(Operation::ViewOwnRegistration)?;
        let student = self.student(caller.own_student()?)?;
        let eligibility = self.eligibility_of(&student)?;
        Ok(RegistrationOutcome::new(&student, eligibility))
    }

    /// Student self-service application.
    ///
    /// Moves the student to `in progress`, then completes immediately when the
    /// verifications are clear and nothing is owed. Re-applying while in
    /// progress re-evaluates; re-applying once completed is rejected.
    pub fn apply(&self, caller: &Caller) -> Result<RegistrationOutcome, RegistryError> {
        caller.authorize(Operation::ApplyForRegistration)?;
        let mut student = self.student(caller.own_student()?)?;

        if student.registration_status == RegistrationStatus::Completed {
            return Err(PreconditionError::AlreadyCompleted.into());
        }

        student.registration_status = RegistrationStatus::InProgress;
        self.store.update_student(student.clone())?;
        self.advance_roster(&student.id, RosterStatus::Submitted)?;

        let eligibility = self.eligibility_of(&student)?;
        if eligibility.is_ready() {
            self.complete(&mut student, &caller.user_id)?;
        } else {
            info!(
                student_id = %student.id,
                eligible = eligibility.is_eligible,
                fines_cleared = eligibility.fines_cleared,
                "registration application waiting on clearance"
            );
        }

        Ok(RegistrationOutcome::new(&student, eligibility))
    }

    /// Tutor approval. Requires readiness; skips the `in progress` step.
    pub fn approve(
        &self,
        caller: &Caller,
        student_id: &StudentId,
    ) -> Result<RegistrationOutcome, RegistryError> {
        caller.authorize(Operation::ApproveRegistration)?;
        let mut student = self.student(student_id)?;

        if student.registration_status == RegistrationStatus::Completed {
            return Err(PreconditionError::AlreadyCompleted.into());
        }

        let eligibility = self.eligibility_of(&student)?;
        if !eligibility.is_eligible {
            return Err(PreconditionError::NotEligible {
                outstanding: eligibility.outstanding_verifications,
            }
            .into());
        }
        if !eligibility.fines_cleared {
            return Err(PreconditionError::PendingFines {
                total: eligibility.total_pending_fines,
            }
            .into());
        }

        self.complete(&mut student, &caller.user_id)?;
        Ok(RegistrationOutcome::new(&student, eligibility))
    }

    fn eligibility_of(&self, student: &Student) -> Result<Eligibility, RegistryError> {
        let fines = self.store.fetch_fines(&student.id)?;
        Ok(Eligibility::evaluate(student, fines.as_ref()))
    }

    fn complete(&self, student: &mut Student, actor: &UserId) -> Result<(), RegistryError> {
        let completed_at = Utc::now();
        student.registration_status = RegistrationStatus::Completed;
        student.registration_completed_at = Some(completed_at);
        self.store.update_student(student.clone())?;
        self.advance_roster(&student.id, RosterStatus::Approved)?;

        info!(student_id = %student.id, "semester registration completed");
        self.audit(
            Some(actor),
            "registration.completed",
            format!("{} ({}) completed registration", student.name, student.id),
        );

        self.notify(Notification::new(
            Recipient::Student(student.id.clone()),
            "Registration completed",
            format!(
                "Your registration for {} semester {} is complete.",
                student.department, student.semester
            ),
            NotificationKind::Success,
        ));
        self.mail(
            &student.email,
            "Semester registration completed",
            format!(
                "Dear {},\n\nYour semester registration for {} semester {} was completed on {}.\n\n{}",
                student.name,
                student.department,
                student.semester,
                completed_at.format("%Y-%m-%d %H:%M UTC"),
                self.settings.institution
            ),
        );
        Ok(())
    }

    /// Move the student's entries in active windows forward to `target`.
    fn advance_roster(&self, student_id: &StudentId, target: RosterStatus) -> Result<(), RegistryError> {
        let at = Utc::now();
        for window in self.store.active_windows_for_student(student_id)? {
            self.store
                .advance_roster_entry(&window.id, student_id, target, at)?;
        }
        Ok(())
    }
}
