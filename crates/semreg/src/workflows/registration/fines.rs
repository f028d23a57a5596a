use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::StudentId;

/// The five fine categories tracked per student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FineCategory {
    Tuition,
    Transportation,
    Hostel,
    Lab,
    Library,
}

impl FineCategory {
    pub const ALL: [FineCategory; 5] = [
        FineCategory::Tuition,
        FineCategory::Transportation,
        FineCategory::Hostel,
        FineCategory::Lab,
        FineCategory::Library,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FineStatus {
    Paid,
    Pending,
}

/// Amount and settlement state of one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FineEntry {
    pub amount: i64,
    pub status: FineStatus,
}

impl FineEntry {
    pub const fn cleared() -> Self {
        Self {
            amount: 0,
            status: FineStatus::Paid,
        }
    }

    /// Apply a partial change. A non-positive amount always settles the entry,
    /// so a zero fine can never linger as pending.
    fn apply(&mut self, change: FineEntryUpdate) {
        if let Some(amount) = change.amount {
            self.amount = amount.max(0);
        }
        if let Some(status) = change.status {
            self.status = status;
        }
        if self.amount <= 0 {
            self.status = FineStatus::Paid;
        }
    }

    fn is_pending(&self) -> bool {
        self.status == FineStatus::Pending
    }
}

impl Default for FineEntry {
    fn default() -> Self {
        Self::cleared()
    }
}

/// Per-student ledger of the five fine categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FineLedger {
    pub student_id: StudentId,
    pub tuition: FineEntry,
    pub transportation: FineEntry,
    pub hostel: FineEntry,
    pub lab: FineEntry,
    pub library: FineEntry,
    pub updated_at: DateTime<Utc>,
}

impl FineLedger {
    /// A ledger with nothing owed in any category.
    pub fn cleared(student_id: StudentId) -> Self {
        Self {
            student_id,
            tuition: FineEntry::cleared(),
            transportation: FineEntry::cleared(),
            hostel: FineEntry::cleared(),
            lab: FineEntry::cleared(),
            library: FineEntry::cleared(),
            updated_at: Utc::now(),
        }
    }

    pub fn entry(&self, category: FineCategory) -> &FineEntry {
        match category {
            FineCategory::Tuition => &self.tuition,
            FineCategory::Transportation => &self.transportation,
            FineCategory::Hostel => &self.hostel,
            FineCategory::Lab => &self.lab,
            FineCategory::Library => &self.library,
        }
    }

    fn entry_mut(&mut self, category: FineCategory) -> &mut FineEntry {
        match category {
            FineCategory::Tuition => &mut self.tuition,
            FineCategory::Transportation => &mut self.transportation,
            FineCategory::Hostel => &mut self.hostel,
            FineCategory::Lab => &mut self.lab,
            FineCategory::Library => &mut self.library,
        }
    }

    pub fn total_pending_amount(&self) -> i64 {
        FineCategory::ALL
            .into_iter()
            .map(|category| self.entry(category))
            .filter(|entry| entry.is_pending())
            .map(|entry| entry.amount)
            .sum()
    }

    pub fn is_all_cleared(&self) -> bool {
        FineCategory::ALL
            .into_iter()
            .all(|category| !self.entry(category).is_pending())
    }

    pub fn pending_categories(&self) -> Vec<FineCategory> {
        FineCategory::ALL
            .into_iter()
            .filter(|category| self.entry(*category).is_pending())
            .collect()
    }

    pub fn apply(&mut self, update: &FineUpdate) {
        for category in FineCategory::ALL {
            if let Some(change) = update.change_for(category) {
                self.entry_mut(category).apply(change);
            }
        }
        self.updated_at = Utc::now();
    }

    /// Summary returned to API callers alongside the raw entries.
    pub fn summary(&self) -> FineSummary {
        FineSummary {
            ledger: self.clone(),
            total_pending_amount: self.total_pending_amount(),
            is_all_cleared: self.is_all_cleared(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FineSummary {
    #[serde(flatten)]
    pub ledger: FineLedger,
    pub total_pending_amount: i64,
    pub is_all_cleared: bool,
}

/// Partial change to one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FineEntryUpdate {
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub status: Option<FineStatus>,
}

/// Staff-submitted change set; absent categories keep their values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FineUpdate {
    #[serde(default)]
    pub tuition: Option<FineEntryUpdate>,
    #[serde(default)]
    pub transportation: Option<FineEntryUpdate>,
    #[serde(default)]
    pub hostel: Option<FineEntryUpdate>,
    #[serde(default)]
    pub lab: Option<FineEntryUpdate>,
    #[serde(default)]
    pub library: Option<FineEntryUpdate>,
}

impl FineUpdate {
    pub fn change_for(&self, category: FineCategory) -> Option<FineEntryUpdate> {
        match category {
            FineCategory::Tuition => self.tuition,
            FineCategory::Transportation => self.transportation,
            FineCategory::Hostel => self.hostel,
            FineCategory::Lab => self.lab,
            FineCategory::Library => self.library,
        }
    }

    pub fn is_empty(&self) -> bool {
        FineCategory::ALL
            .into_iter()
            .all(|category| self.change_for(category).is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> FineLedger {
        FineLedger::cleared(StudentId("stu-fines".to_string()))
    }

    fn pending(amount: i64) -> Option<FineEntryUpdate> {
        Some(FineEntryUpdate {
            amount: Some(amount),
            status: Some(FineStatus::Pending),
        })
    }

    #[test]
    fn cleared_ledger_owes_nothing() {
        let ledger = ledger();
        assert!(ledger.is_all_cleared());
        assert_eq!(ledger.total_pending_amount(), 0);
        assert!(ledger.pending_categories().is_empty());
    }

    #[test]
    fn pending_amounts_are_summed() {
        let mut ledger = ledger();
        ledger.apply(&FineUpdate {
            hostel: pending(1200),
            library: pending(50),
            ..FineUpdate::default()
        });
        ledger.apply(&FineUpdate {
            lab: Some(FineEntryUpdate {
                amount: Some(300),
                status: Some(FineStatus::Paid),
            }),
            ..FineUpdate::default()
        });

        assert!(!ledger.is_all_cleared());
        assert_eq!(ledger.total_pending_amount(), 1250);
        assert_eq!(
            ledger.pending_categories(),
            vec![FineCategory::Hostel, FineCategory::Library]
        );
    }

    #[test]
    fn zero_amount_demotes_pending_to_paid() {
        let mut ledger = ledger();
        ledger.apply(&FineUpdate {
            tuition: pending(5000),
            ..FineUpdate::default()
        });
        assert_eq!(ledger.tuition.status, FineStatus::Pending);

        ledger.apply(&FineUpdate {
            tuition: Some(FineEntryUpdate {
                amount: Some(0),
                status: None,
            }),
            ..FineUpdate::default()
        });
        assert_eq!(ledger.tuition, FineEntry::cleared());
        assert!(ledger.is_all_cleared());
    }

    #[test]
    fn negative_amounts_clamp_and_settle() {
        let mut ledger = ledger();
        ledger.apply(&FineUpdate {
            transportation: pending(-40),
            ..FineUpdate::default()
        });
        assert_eq!(ledger.transportation.amount, 0);
        assert_eq!(ledger.transportation.status, FineStatus::Paid);
    }

    #[test]
    fn status_only_change_keeps_amount() {
        let mut ledger = ledger();
        ledger.apply(&FineUpdate {
            lab: pending(75),
            ..FineUpdate::default()
        });
        ledger.apply(&FineUpdate {
            lab: Some(FineEntryUpdate {
                amount: None,
                status: Some(FineStatus::Paid),
            }),
            ..FineUpdate::default()
        });
        assert_eq!(ledger.lab.amount, 75);
        assert!(ledger.is_all_cleared());
    }

    #[test]
    fn summary_flattens_ledger_fields() {
        let mut ledger = ledger();
        ledger.apply(&FineUpdate {
            hostel: pending(10),
            ..FineUpdate::default()
        });
        let json = serde_json::to_value(ledger.summary()).expect("serializes");
        assert_eq!(json["totalPendingAmount"], 10);
        assert_eq!(json["isAllCleared"], false);
        assert_eq!(json["hostel"]["status"], "pending");
        assert!(FineUpdate::default().is_empty());
    }
}
