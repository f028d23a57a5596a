use crate::infra::in_memory_registry;
use chrono::{Duration, Local, NaiveDate};
use clap::Args;
use semreg::auth::Caller;
use semreg::config::{BootstrapAdmin, RegistrySettings};
use semreg::error::AppError;
use semreg::workflows::registration::{
    AssignmentDraft, Credentials, Email, MailError, Mailer, NewStudent, NewUser, Registry,
    RegistryError, Role, ScopeRequest, Student, VerificationStatus, VerificationUpdate,
    WindowDraft,
};
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Registration window deadline (YYYY-MM-DD). Defaults to two weeks from today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) deadline: Option<NaiveDate>,
    /// Institution name used in outbound email.
    #[arg(long, default_value = "Riverside Institute of Technology")]
    pub(crate) institution: String,
    /// Skip the rejected requests (duplicate window, contested tutor scope).
    #[arg(long)]
    pub(crate) skip_conflicts: bool,
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

/// Prints every outbound email instead of delivering it.
struct ConsoleMailer;

impl Mailer for ConsoleMailer {
    fn send(&self, email: Email) -> Result<(), MailError> {
        println!("    email -> {} : {}", email.to, email.subject);
        Ok(())
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let deadline = args
        .deadline
        .unwrap_or_else(|| Local::now().date_naive() + Duration::days(14));
    let settings = RegistrySettings {
        institution: args.institution,
        ..RegistrySettings::default()
    };
    let registry = in_memory_registry(settings, Arc::new(ConsoleMailer));

    println!("== Bootstrap ({})", registry.settings().institution);
    registry.seed_admin(&BootstrapAdmin {
        username: "registrar".to_string(),
        password: "registrar-demo".to_string(),
        email: "registrar@university.local".to_string(),
    })?;
    let admin = sign_in(&registry, "registrar", "registrar-demo")?;
    println!("  administrator 'registrar' signed in");

    println!("== Accounts");
    let student = enrol(&registry, &admin)?;
    println!(
        "  student {} ({} semester {}) status: {}",
        student.name,
        student.department,
        student.semester,
        student.registration_status.label()
    );
    let tutor = hire(&registry, &admin, "tmenon", Role::Tutor)?;
    hire(&registry, &admin, "desk", Role::Staff)?;
    println!("  tutor 'tmenon' and staff 'desk' created");

    println!("== Tutor assignment");
    let assignment = registry.create_assignment(
        &admin,
        &AssignmentDraft {
            tutor_id: tutor.user_id.clone(),
            assignments: vec![ScopeRequest {
                department: "CSE".to_string(),
                semester: 3,
            }],
        },
    )?;
    println!("  assignment {} grants CSE semester 3", assignment.id.0);

    println!("== Desk clearance");
    let desk = sign_in(&registry, "desk", "desk-pass-1")?;
    registry.update_verification(
        &desk,
        &student.id,
        &VerificationUpdate {
            library: Some(VerificationStatus::Clear),
            lab: Some(VerificationStatus::Clear),
            office: Some(VerificationStatus::Clear),
        },
    )?;
    let fines = registry.fines(&desk, &student.id)?;
    println!(
        "  verifications clear, pending fines: {} (all cleared: {})",
        fines.total_pending_amount, fines.is_all_cleared
    );

    println!("== Registration window");
    let draft = WindowDraft {
        department: Some("CSE".to_string()),
        semester: Some(3),
        deadline: Some(deadline.format("%Y-%m-%d").to_string()),
    };
    let window = registry.create_window(&tutor, &draft)?;
    println!(
        "  window {} open until {} with {} student(s)",
        window.id,
        window.deadline,
        window.roster.len()
    );

    println!("== Student application");
    let learner = sign_in(&registry, "sana", "sana-pass-1")?;
    let outcome = registry.apply(&learner)?;
    println!(
        "  status: {} (eligible: {}, fines cleared: {})",
        outcome.registration_status.label(),
        outcome.is_eligible,
        outcome.fines_cleared
    );
    report_rejection("second application", registry.apply(&learner));

    let stats = registry.window_statistics(&tutor, &window.id)?;
    println!(
        "  window statistics: total {}, pending {}, submitted {}, approved {}",
        stats.total, stats.pending, stats.submitted, stats.approved
    );

    if !args.skip_conflicts {
        println!("== Rejected requests");
        report_rejection("duplicate window", registry.create_window(&tutor, &draft));
        let rival = hire(&registry, &admin, "rival", Role::Tutor)?;
        report_rejection(
            "contested scope",
            registry.create_assignment(
                &admin,
                &AssignmentDraft {
                    tutor_id: rival.user_id,
                    assignments: vec![ScopeRequest {
                        department: "cse".to_string(),
                        semester: 3,
                    }],
                },
            ),
        );
    }

    println!("== Inbox");
    for notification in registry.notifications_for(&learner)? {
        println!("  [{}] {}", notification.title, notification.message);
    }

    Ok(())
}

fn sign_in(registry: &Registry, username: &str, password: &str) -> Result<Caller, RegistryError> {
    let session = registry.login(&Credentials {
        username: username.to_string(),
        password: password.to_string(),
    })?;
    registry.authenticate(Some(&session.token))
}

fn enrol(registry: &Registry, admin: &Caller) -> Result<Student, RegistryError> {
    registry.create_student(
        admin,
        &NewStudent {
            username: "sana".to_string(),
            password: "sana-pass-1".to_string(),
            name: "Sana Iyer".to_string(),
            admission_number: "ADM-2024-017".to_string(),
            register_number: "REG-CSE-3-017".to_string(),
            department: "CSE".to_string(),
            semester: 3,
            email: "sana@university.local".to_string(),
        },
    )
}

fn hire(
    registry: &Registry,
    admin: &Caller,
    username: &str,
    role: Role,
) -> Result<Caller, RegistryError> {
    let password = format!("{username}-pass-1");
    registry.create_user(
        admin,
        &NewUser {
            username: username.to_string(),
            email: format!("{username}@university.local"),
            password: password.clone(),
            role,
        },
    )?;
    sign_in(registry, username, &password)
}

fn report_rejection<T>(label: &str, result: Result<T, RegistryError>) {
    match result {
        Ok(_) => println!("  {label}: unexpectedly accepted"),
        Err(err) => println!("  {label}: rejected ({err})"),
    }
}
