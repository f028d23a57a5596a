use super::common::*;
use crate::workflows::registration::{
    Department, FineCategory, FineEntryUpdate, FineStatus, FineUpdate, NotificationKind,
    RegistrationStatus, RegistryError, RegistryStore, VerificationStatus, VerificationUpdate,
};

#[test]
fn zero_amount_demotes_pending_fine_to_paid() {
    let h = harness();
    let (_, student) = student(&h.store, Department::Cse, 3, true);

    let summary = h
        .registry
        .update_fines(&staff(), &student.id, &pending_tuition(1200))
        .expect("fine recorded");
    assert_eq!(summary.total_pending_amount, 1200);
    assert!(!summary.is_all_cleared);

    let summary = h
        .registry
        .update_fines(
            &staff(),
            &student.id,
            &FineUpdate {
                tuition: Some(FineEntryUpdate {
                    amount: Some(0),
                    status: None,
                }),
                ..FineUpdate::default()
            },
        )
        .expect("fine cleared");
    assert_eq!(summary.ledger.entry(FineCategory::Tuition).status, FineStatus::Paid);
    assert!(summary.is_all_cleared);

    let notes = notifications_for(&h.store, &student);
    assert_eq!(notes.len(), 2);
    assert!(notes.iter().all(|note| note.kind == NotificationKind::Info));
}

#[test]
fn fine_update_creates_missing_ledger_and_rejects_empty_changes() {
    let h = harness();
    let (_, student) = student(&h.store, Department::Ece, 1, true);
    assert!(matches!(
        h.registry.fines(&staff(), &student.id),
        Err(RegistryError::NotFound("fine ledger"))
    ));

    assert!(matches!(
        h.registry
            .update_fines(&staff(), &student.id, &FineUpdate::default()),
        Err(RegistryError::Validation(_))
    ));

    h.registry
        .update_fines(&admin(), &student.id, &pending_tuition(40))
        .expect("admins may also update fines");
    let summary = h.registry.fines(&staff(), &student.id).expect("ledger");
    assert_eq!(summary.total_pending_amount, 40);
}

#[test]
fn unknown_students_and_wrong_roles_are_refused() {
    let h = harness();
    let (caller, student) = student(&h.store, Department::Me, 2, true);
    let missing = crate::workflows::registration::StudentId("stu-missing".to_string());

    assert!(matches!(
        h.registry.update_fines(&staff(), &missing, &pending_tuition(1)),
        Err(RegistryError::NotFound("student"))
    ));
    assert!(matches!(
        h.registry.update_fines(&caller, &student.id, &pending_tuition(1)),
        Err(RegistryError::Forbidden(_))
    ));
}

#[test]
fn verification_changes_unlock_approval() {
    let h = harness();
    let tutor = tutor(&h.store);
    let (_, student) = student(&h.store, Department::It, 5, false);

    let updated = h
        .registry
        .update_verification(
            &staff(),
            &student.id,
            &VerificationUpdate {
                library: Some(VerificationStatus::Clear),
                lab: Some(VerificationStatus::Clear),
                office: None,
            },
        )
        .expect("partial update");
    assert_eq!(updated.verification.office, VerificationStatus::Pending);
    assert!(h.registry.approve(&tutor, &student.id).is_err());

    h.registry
        .update_verification(
            &staff(),
            &student.id,
            &VerificationUpdate {
                office: Some(VerificationStatus::Clear),
                ..VerificationUpdate::default()
            },
        )
        .expect("office cleared");
    let outcome = h
        .registry
        .approve(&tutor, &student.id)
        .expect("approval succeeds");
    assert_eq!(outcome.registration_status, RegistrationStatus::Completed);

    let stored = h
        .store
        .fetch_student(&student.id)
        .expect("readable")
        .expect("present");
    assert!(stored.verification.all_clear());
}
