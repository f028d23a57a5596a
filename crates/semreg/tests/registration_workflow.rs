use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::{Duration, Utc};
use semreg::auth::Caller;
use semreg::config::{BootstrapAdmin, RegistrySettings};
use semreg::workflows::registration::{
    registry_router, AssignmentDraft, Credentials, Email, InMemoryStore, MailError, Mailer,
    NewStudent, NewUser, PreconditionError, RegistrationStatus, Registry, RegistryError, Role,
    RosterStatus, ScopeRequest, Student, VerificationStatus, VerificationUpdate, WindowDraft,
};
use serde_json::{json, Value};
use tower::ServiceExt;

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<Email>>,
}

impl RecordingMailer {
    fn recipients(&self) -> Vec<String> {
        self.sent
            .lock()
            .expect("mailer mutex poisoned")
            .iter()
            .map(|email| email.to.clone())
            .collect()
    }
}

impl Mailer for RecordingMailer {
    fn send(&self, email: Email) -> Result<(), MailError> {
        self.sent.lock().expect("mailer mutex poisoned").push(email);
        Ok(())
    }
}

struct Campus {
    registry: Arc<Registry>,
    mailer: Arc<RecordingMailer>,
    admin: Caller,
}

fn campus() -> Campus {
    let store = Arc::new(InMemoryStore::new());
    let mailer = Arc::new(RecordingMailer::default());
    let registry = Arc::new(Registry::new(
        store.clone(),
        store,
        mailer.clone(),
        RegistrySettings {
            institution: "Riverside Institute of Technology".to_string(),
            mail_from: "registrar@riverside.test".to_string(),
        },
    ));
    registry
        .seed_admin(&BootstrapAdmin {
            username: "registrar".to_string(),
            password: "registrar-pass".to_string(),
            email: "registrar@riverside.test".to_string(),
        })
        .expect("admin seeded");
    let admin = sign_in(&registry, "registrar", "registrar-pass");
    Campus {
        registry,
        mailer,
        admin,
    }
}

fn sign_in(registry: &Registry, username: &str, password: &str) -> Caller {
    let session = registry
        .login(&Credentials {
            username: username.to_string(),
            password: password.to_string(),
        })
        .expect("login succeeds");
    registry
        .authenticate(Some(&session.token))
        .expect("session resolves")
}

fn enrol_cse3_student(campus: &Campus) -> Student {
    campus
        .registry
        .create_student(
            &campus.admin,
            &NewStudent {
                username: "sana".to_string(),
                password: "sana-pass-1".to_string(),
                name: "Sana Iyer".to_string(),
                admission_number: "ADM-2024-017".to_string(),
                register_number: "REG-CSE-3-017".to_string(),
                department: "CSE".to_string(),
                semester: 3,
                email: "sana@riverside.test".to_string(),
            },
        )
        .expect("student enrolled")
}

fn hire_cse3_tutor(campus: &Campus) -> Caller {
    let tutor = campus
        .registry
        .create_user(
            &campus.admin,
            &NewUser {
                username: "tmenon".to_string(),
                email: "tmenon@riverside.test".to_string(),
                password: "tutor-pass-1".to_string(),
                role: Role::Tutor,
            },
        )
        .expect("tutor created");
    campus
        .registry
        .create_assignment(
            &campus.admin,
            &AssignmentDraft {
                tutor_id: tutor.id,
                assignments: vec![ScopeRequest {
                    department: "CSE".to_string(),
                    semester: 3,
                }],
            },
        )
        .expect("tutor assigned");
    sign_in(&campus.registry, "tmenon", "tutor-pass-1")
}

fn clear_all_checks(campus: &Campus, student: &Student) {
    let staff = campus
        .registry
        .create_user(
            &campus.admin,
            &NewUser {
                username: "desk".to_string(),
                email: "desk@riverside.test".to_string(),
                password: "desk-pass-1".to_string(),
                role: Role::Staff,
            },
        )
        .expect("staff created");
    assert_eq!(staff.role, Role::Staff);
    let staff = sign_in(&campus.registry, "desk", "desk-pass-1");
    campus
        .registry
        .update_verification(
            &staff,
            &student.id,
            &VerificationUpdate {
                library: Some(VerificationStatus::Clear),
                lab: Some(VerificationStatus::Clear),
                office: Some(VerificationStatus::Clear),
            },
        )
        .expect("verifications cleared");
}

#[test]
fn cleared_student_completes_registration_once() {
    let campus = campus();
    let student = enrol_cse3_student(&campus);
    clear_all_checks(&campus, &student);
    let tutor = hire_cse3_tutor(&campus);

    let tomorrow = (Utc::now() + Duration::days(1)).date_naive();
    let window = campus
        .registry
        .create_window(
            &tutor,
            &WindowDraft {
                department: Some("CSE".to_string()),
                semester: Some(3),
                deadline: Some(tomorrow.format("%Y-%m-%d").to_string()),
            },
        )
        .expect("window opened");
    assert_eq!(window.roster.len(), 1);
    assert_eq!(window.roster[0].student_id, student.id);
    assert_eq!(window.roster[0].status, RosterStatus::Pending);

    let learner = sign_in(&campus.registry, "sana", "sana-pass-1");
    let outcome = campus.registry.apply(&learner).expect("apply succeeds");
    assert_eq!(outcome.registration_status, RegistrationStatus::Completed);
    assert!(outcome.is_eligible);
    assert!(outcome.fines_cleared);
    assert!(outcome.registration_completed_at.is_some());

    let err = campus
        .registry
        .apply(&learner)
        .expect_err("second apply rejected");
    assert!(matches!(
        err,
        RegistryError::Precondition(PreconditionError::AlreadyCompleted)
    ));

    let stats = campus
        .registry
        .window_statistics(&tutor, &window.id)
        .expect("statistics");
    assert_eq!((stats.total, stats.approved), (1, 1));

    let inbox = campus
        .registry
        .notifications_for(&learner)
        .expect("inbox readable");
    assert_eq!(inbox[0].title, "Registration completed");
    assert_eq!(
        campus.mailer.recipients(),
        ["sana@riverside.test", "sana@riverside.test"]
    );
}

async fn call(router: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("route executes");
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    (status, serde_json::from_slice(&body).expect("json payload"))
}

fn post_json(uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

#[tokio::test]
async fn tutor_scope_is_exclusive_over_http() {
    let campus = campus();
    let router = registry_router(campus.registry.clone());

    let (status, login) = call(
        &router,
        Request::post("/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "username": "registrar", "password": "registrar-pass" }).to_string(),
            ))
            .expect("request builds"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = login["data"]["token"].as_str().expect("token").to_string();

    let mut tutor_ids = Vec::new();
    for name in ["tutor-a", "tutor-b"] {
        let (status, created) = call(
            &router,
            post_json(
                "/admin/users",
                &token,
                json!({
                    "username": name,
                    "email": format!("{name}@riverside.test"),
                    "password": "tutor-pass-1",
                    "role": "tutor",
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        tutor_ids.push(created["data"]["id"].as_str().expect("id").to_string());
    }

    let (status, _) = call(
        &router,
        post_json(
            "/admin/tutor-assignments",
            &token,
            json!({ "tutorId": tutor_ids[0], "assignments": [{ "department": "ECE", "semester": 2 }] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, conflict) = call(
        &router,
        post_json(
            "/admin/tutor-assignments",
            &token,
            json!({ "tutorId": tutor_ids[1], "assignments": [{ "department": "ece", "semester": 2 }] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["success"], json!(false));
    assert!(conflict["message"]
        .as_str()
        .expect("message")
        .contains("ECE semester 2"));
}
