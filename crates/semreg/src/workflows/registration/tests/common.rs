use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::auth::Caller;
use crate::config::RegistrySettings;
use crate::workflows::registration::repository::{RepositoryError, Transaction};
use crate::workflows::registration::{
    AssignmentDraft, AssignmentId, Department, Email, FineEntryUpdate, FineLedger, FineStatus,
    FineUpdate, InMemoryStore, MailError, Mailer, Notification, NotificationError,
    NotificationId, NotificationSink, Recipient, RegistrationStatus, Registry, RegistryStore,
    Role, RosterStatus, ScopeRequest, Semester, SemesterRegistration, Student, StudentId,
    SystemLog, TutorAssignment, User, UserId, Verification, VerificationStatus, WindowDraft,
    WindowId, WindowTerms,
};

pub(super) const DEADLINE: &str = "2026-12-01";

pub(super) struct Harness {
    pub(super) registry: Arc<Registry>,
    pub(super) store: Arc<InMemoryStore>,
    pub(super) mailer: Arc<MemoryMailer>,
}

pub(super) fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let mailer = Arc::new(MemoryMailer::default());
    let registry = Registry::new(
        store.clone(),
        store.clone(),
        mailer.clone(),
        RegistrySettings::default(),
    );
    Harness {
        registry: Arc::new(registry),
        store,
        mailer,
    }
}

/// Registry whose collaborators are swapped for test doubles; storage stays in memory.
pub(super) fn harness_with(
    sink: Option<Arc<dyn NotificationSink>>,
    mailer: Option<Arc<dyn Mailer>>,
) -> (Arc<Registry>, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let sink = sink.unwrap_or_else(|| store.clone() as Arc<dyn NotificationSink>);
    let mailer = mailer.unwrap_or_else(|| Arc::new(MemoryMailer::default()) as Arc<dyn Mailer>);
    let registry = Registry::new(store.clone(), sink, mailer, RegistrySettings::default());
    (Arc::new(registry), store)
}

pub(super) fn admin() -> Caller {
    Caller {
        user_id: UserId("usr-admin".to_string()),
        role: Role::Admin,
        student_id: None,
    }
}

pub(super) fn staff() -> Caller {
    Caller {
        user_id: UserId("usr-staff".to_string()),
        role: Role::Staff,
        student_id: None,
    }
}

fn insert_user(store: &InMemoryStore, role: Role, student_id: Option<StudentId>) -> User {
    let id = UserId::generate();
    store
        .insert_user(User {
            username: id.0.clone(),
            email: format!("{}@uni.test", id.0),
            role,
            password_hash: "not-a-real-hash".to_string(),
            student_id,
            created_at: Utc::now(),
            id,
        })
        .expect("user inserts")
}

pub(super) fn tutor(store: &InMemoryStore) -> Caller {
    let user = insert_user(store, Role::Tutor, None);
    Caller {
        user_id: user.id,
        role: Role::Tutor,
        student_id: None,
    }
}

pub(super) fn verification(clear: bool) -> Verification {
    let status = if clear {
        VerificationStatus::Clear
    } else {
        VerificationStatus::Pending
    };
    Verification {
        library: status,
        lab: status,
        office: status,
    }
}

/// Student profile plus login in the given scope; no fine ledger is created.
pub(super) fn student(
    store: &InMemoryStore,
    department: Department,
    semester: u8,
    clear: bool,
) -> (Caller, Student) {
    let student_id = StudentId::generate();
    let user = insert_user(store, Role::Student, Some(student_id.clone()));
    let student = store
        .insert_student(Student {
            id: student_id.clone(),
            user_id: user.id.clone(),
            name: format!("Student {}", student_id.0),
            admission_number: format!("ADM-{}", student_id.0),
            register_number: format!("REG-{}", student_id.0),
            department,
            semester: Semester::new(semester).expect("valid semester"),
            email: user.email.clone(),
            verification: verification(clear),
            registration_status: RegistrationStatus::NotStarted,
            registration_completed_at: None,
        })
        .expect("student inserts");
    let caller = Caller {
        user_id: user.id,
        role: Role::Student,
        student_id: Some(student_id),
    };
    (caller, student)
}

pub(super) fn scope(department: &str, semester: u8) -> ScopeRequest {
    ScopeRequest {
        department: department.to_string(),
        semester,
    }
}

pub(super) fn assign(registry: &Registry, tutor: &Caller, scopes: &[(&str, u8)]) -> TutorAssignment {
    registry
        .create_assignment(
            &admin(),
            &AssignmentDraft {
                tutor_id: tutor.user_id.clone(),
                assignments: scopes
                    .iter()
                    .map(|(department, semester)| scope(department, *semester))
                    .collect(),
            },
        )
        .expect("assignment succeeds")
}

pub(super) fn draft(department: &str, semester: u8) -> WindowDraft {
    WindowDraft {
        department: Some(department.to_string()),
        semester: Some(semester),
        deadline: Some(DEADLINE.to_string()),
    }
}

pub(super) fn pending_tuition(amount: i64) -> FineUpdate {
    FineUpdate {
        tuition: Some(FineEntryUpdate {
            amount: Some(amount),
            status: Some(FineStatus::Pending),
        }),
        ..FineUpdate::default()
    }
}

pub(super) fn ledger_with(student_id: &StudentId, update: &FineUpdate) -> FineLedger {
    let mut ledger = FineLedger::cleared(student_id.clone());
    ledger.apply(update);
    ledger
}

pub(super) fn notifications_for(store: &InMemoryStore, student: &Student) -> Vec<Notification> {
    store
        .for_recipients(&[Recipient::Student(student.id.clone())])
        .expect("notifications readable")
}

#[derive(Default)]
pub(super) struct MemoryMailer {
    sent: Mutex<Vec<Email>>,
}

impl MemoryMailer {
    pub(super) fn sent(&self) -> Vec<Email> {
        self.sent.lock().expect("mailer mutex poisoned").clone()
    }
}

impl Mailer for MemoryMailer {
    fn send(&self, email: Email) -> Result<(), MailError> {
        self.sent.lock().expect("mailer mutex poisoned").push(email);
        Ok(())
    }
}

pub(super) struct FailingMailer;

impl Mailer for FailingMailer {
    fn send(&self, _email: Email) -> Result<(), MailError> {
        Err(MailError::Transport("smtp offline".to_string()))
    }
}

/// Sink that refuses every write, staged or not.
pub(super) struct FailingSink;

impl NotificationSink for FailingSink {
    fn create(&self, _notification: Notification) -> Result<Notification, NotificationError> {
        Err(NotificationError::Unavailable("sink offline".to_string()))
    }

    fn stage(
        &self,
        _transaction: &mut Transaction,
        _notification: Notification,
    ) -> Result<(), NotificationError> {
        Err(NotificationError::Unavailable("sink offline".to_string()))
    }

    fn for_recipients(
        &self,
        _recipients: &[Recipient],
    ) -> Result<Vec<Notification>, NotificationError> {
        Ok(Vec::new())
    }

    fn mark_read(
        &self,
        _id: &NotificationId,
        _recipients: &[Recipient],
    ) -> Result<Notification, NotificationError> {
        Err(NotificationError::NotFound)
    }
}

type Interleaving = Box<dyn FnOnce() + Send>;

/// Store that runs one queued action right after the next window read, so a
/// concurrent writer lands between an operation's read and its write.
pub(super) struct InterleavedStore {
    inner: Arc<InMemoryStore>,
    after_window_read: Mutex<Option<Interleaving>>,
}

impl InterleavedStore {
    pub(super) fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            after_window_read: Mutex::new(None),
        }
    }

    pub(super) fn after_next_window_read(&self, action: impl FnOnce() + Send + 'static) {
        *self.after_window_read.lock().expect("hook mutex poisoned") = Some(Box::new(action));
    }
}

impl RegistryStore for InterleavedStore {
    fn insert_user(&self, user: User) -> Result<User, RepositoryError> {
        self.inner.insert_user(user)
    }
    fn fetch_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        self.inner.fetch_user(id)
    }
    fn find_user_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        self.inner.find_user_by_username(username)
    }
    fn update_user(&self, user: User) -> Result<(), RepositoryError> {
        self.inner.update_user(user)
    }
    fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        self.inner.list_users()
    }
    fn delete_user(&self, id: &UserId) -> Result<(), RepositoryError> {
        self.inner.delete_user(id)
    }
    fn insert_student(&self, student: Student) -> Result<Student, RepositoryError> {
        self.inner.insert_student(student)
    }
    fn fetch_student(&self, id: &StudentId) -> Result<Option<Student>, RepositoryError> {
        self.inner.fetch_student(id)
    }
    fn update_student(&self, student: Student) -> Result<(), RepositoryError> {
        self.inner.update_student(student)
    }
    fn list_students(&self) -> Result<Vec<Student>, RepositoryError> {
        self.inner.list_students()
    }
    fn students_in_scope(
        &self,
        department: Department,
        semester: Semester,
    ) -> Result<Vec<Student>, RepositoryError> {
        self.inner.students_in_scope(department, semester)
    }
    fn delete_student(&self, id: &StudentId) -> Result<(), RepositoryError> {
        self.inner.delete_student(id)
    }
    fn fetch_fines(&self, student: &StudentId) -> Result<Option<FineLedger>, RepositoryError> {
        self.inner.fetch_fines(student)
    }
    fn save_fines(&self, ledger: FineLedger) -> Result<(), RepositoryError> {
        self.inner.save_fines(ledger)
    }
    fn delete_fines(&self, student: &StudentId) -> Result<(), RepositoryError> {
        self.inner.delete_fines(student)
    }
    fn fetch_window(&self, id: &WindowId) -> Result<Option<SemesterRegistration>, RepositoryError> {
        let window = self.inner.fetch_window(id);
        let action = self.after_window_read.lock().expect("hook mutex poisoned").take();
        if let Some(action) = action {
            action();
        }
        window
    }
    fn find_active_window(
        &self,
        department: Department,
        semester: Semester,
        creator: &UserId,
    ) -> Result<Option<SemesterRegistration>, RepositoryError> {
        self.inner.find_active_window(department, semester, creator)
    }
    fn windows_created_by(
        &self,
        creator: &UserId,
    ) -> Result<Vec<SemesterRegistration>, RepositoryError> {
        self.inner.windows_created_by(creator)
    }
    fn active_windows_for_student(
        &self,
        student: &StudentId,
    ) -> Result<Vec<SemesterRegistration>, RepositoryError> {
        self.inner.active_windows_for_student(student)
    }
    fn set_window_terms(
        &self,
        id: &WindowId,
        creator: &UserId,
        terms: WindowTerms,
    ) -> Result<SemesterRegistration, RepositoryError> {
        self.inner.set_window_terms(id, creator, terms)
    }
    fn advance_roster_entry(
        &self,
        id: &WindowId,
        student: &StudentId,
        target: RosterStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        self.inner.advance_roster_entry(id, student, target, at)
    }
    fn delete_window(&self, id: &WindowId) -> Result<SemesterRegistration, RepositoryError> {
        self.inner.delete_window(id)
    }
    fn insert_assignment(
        &self,
        assignment: TutorAssignment,
    ) -> Result<TutorAssignment, RepositoryError> {
        self.inner.insert_assignment(assignment)
    }
    fn fetch_assignment(
        &self,
        id: &AssignmentId,
    ) -> Result<Option<TutorAssignment>, RepositoryError> {
        self.inner.fetch_assignment(id)
    }
    fn assignment_for_tutor(
        &self,
        tutor: &UserId,
    ) -> Result<Option<TutorAssignment>, RepositoryError> {
        self.inner.assignment_for_tutor(tutor)
    }
    fn list_assignments(&self) -> Result<Vec<TutorAssignment>, RepositoryError> {
        self.inner.list_assignments()
    }
    fn update_assignment(&self, assignment: TutorAssignment) -> Result<(), RepositoryError> {
        self.inner.update_assignment(assignment)
    }
    fn delete_assignment(&self, id: &AssignmentId) -> Result<(), RepositoryError> {
        self.inner.delete_assignment(id)
    }
    fn append_log(&self, entry: SystemLog) -> Result<(), RepositoryError> {
        self.inner.append_log(entry)
    }
    fn recent_logs(&self, limit: usize) -> Result<Vec<SystemLog>, RepositoryError> {
        self.inner.recent_logs(limit)
    }
    fn commit(&self, transaction: Transaction) -> Result<(), RepositoryError> {
        self.inner.commit(transaction)
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
