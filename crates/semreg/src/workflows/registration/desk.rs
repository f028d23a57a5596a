use serde::Deserialize;
use tracing::info;

use crate::auth::{Caller, Operation};

use super::domain::{Student, StudentId, VerificationStatus};
use super::error::RegistryError;
use super::fines::{FineLedger, FineSummary, FineUpdate};
use super::notify::{Notification, NotificationKind, Recipient};
use super::registry::Registry;

/// Staff change to any subset of the verification flags.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerificationUpdate {
    #[serde(default)]
    pub library: Option<VerificationStatus>,
    #[serde(default)]
    pub lab: Option<VerificationStatus>,
    #[serde(default)]
    pub office: Option<VerificationStatus>,
}

impl Registry {
    pub fn fines(&self, caller: &Caller, student_id: &StudentId) -> Result<FineSummary, RegistryError> {
        caller.authorize(Operation::ManageFines)?;
        self.student(student_id)?;
        let ledger = self
            .store
            .fetch_fines(student_id)?
            .ok_or(RegistryError::NotFound("fine ledger"))?;
        Ok(ledger.summary())
    }

    /// Apply a staff fine update, creating the ledger on first use.
    pub fn update_fines(
        &self,
        caller: &Caller,
        student_id: &StudentId,
        update: &FineUpdate,
    ) -> Result<FineSummary, RegistryError> {
        caller.authorize(Operation::ManageFines)?;
        if update.is_empty() {
            return Err(RegistryError::validation("no fine categories supplied"));
        }
        let student = self.student(student_id)?;

        let mut ledger = self
            .store
            .fetch_fines(student_id)?
            .unwrap_or_else(|| FineLedger::cleared(student_id.clone()));
        ledger.apply(update);
        self.store.save_fines(ledger.clone())?;

        let summary = ledger.summary();
        info!(
            student_id = %student.id,
            pending = summary.total_pending_amount,
            "fine ledger updated"
        );
        self.notify(Notification::new(
            Recipient::Student(student.id.clone()),
            "Fine details updated",
            if summary.is_all_cleared {
                "All of your fines are cleared.".to_string()
            } else {
                format!(
                    "You have pending fines totalling {}.",
                    summary.total_pending_amount
                )
            },
            NotificationKind::Info,
        ));
        self.audit(
            Some(&caller.user_id),
            "fines.updated",
            format!("{} pending {}", student.id, summary.total_pending_amount),
        );
        Ok(summary)
    }

    pub fn update_verification(
        &self,
        caller: &Caller,
        student_id: &StudentId,
        update: &VerificationUpdate,
    ) -> Result<Student, RegistryError> {
        caller.authorize(Operation::ManageFines)?;
        let mut student = self.student(student_id)?;

        let flags = &mut student.verification;
        if let Some(status) = update.library {
            flags.library = status;
        }
        if let Some(status) = update.lab {
            flags.lab = status;
        }
        if let Some(status) = update.office {
            flags.office = status;
        }
        self.store.update_student(student.clone())?;

        self.audit(
            Some(&caller.user_id),
            "verification.updated",
            format!("{} {:?}", student.id, student.verification),
        );
        Ok(student)
    }
}
