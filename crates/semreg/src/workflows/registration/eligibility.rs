use serde::Serialize;

use super::domain::Student;
use super::fines::FineLedger;

/// Derived registration gate for one student. Pure; never touches storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Eligibility {
    /// Library, lab and office verifications are all clear.
    pub is_eligible: bool,
    /// The fine ledger is fully settled, or no ledger exists.
    pub fines_cleared: bool,
    pub total_pending_fines: i64,
    pub outstanding_verifications: Vec<&'static str>,
}

impl Eligibility {
    pub fn evaluate(student: &Student, fines: Option<&FineLedger>) -> Self {
        let outstanding_verifications = student.verification.outstanding();
        Self {
            is_eligible: outstanding_verifications.is_empty(),
            fines_cleared: fines.map_or(true, FineLedger::is_all_cleared),
            total_pending_fines: fines.map_or(0, FineLedger::total_pending_amount),
            outstanding_verifications,
        }
    }

    /// Readiness: eligible and nothing owed.
    pub fn is_ready(&self) -> bool {
        self.is_eligible && self.fines_cleared
    }
}
