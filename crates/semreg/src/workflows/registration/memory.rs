use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::assignments::{AssignmentId, TutorAssignment};
use super::domain::{Department, Semester, Student, StudentId, User, UserId};
use super::fines::FineLedger;
use super::notify::{
    Notification, NotificationError, NotificationId, NotificationSink, Recipient, SystemLog,
};
use super::repository::{RegistryStore, RepositoryError, StagedWrite, Transaction};
use super::windows::{RosterStatus, SemesterRegistration, WindowId, WindowTerms};

#[derive(Default)]
struct Collections {
    users: BTreeMap<UserId, User>,
    students: BTreeMap<StudentId, Student>,
    fines: BTreeMap<StudentId, FineLedger>,
    windows: BTreeMap<WindowId, SemesterRegistration>,
    assignments: BTreeMap<AssignmentId, TutorAssignment>,
    notifications: Vec<Notification>,
    logs: Vec<SystemLog>,
}

impl Collections {
    fn check_user(&self, user: &User) -> Result<(), RepositoryError> {
        for other in self.users.values().filter(|other| other.id != user.id) {
            if other.username.eq_ignore_ascii_case(&user.username) {
                return Err(RepositoryError::Conflict(format!(
                    "username '{}' is already taken",
                    user.username
                )));
            }
            if other.email.eq_ignore_ascii_case(&user.email) {
                return Err(RepositoryError::Conflict(format!(
                    "email '{}' is already registered",
                    user.email
                )));
            }
        }
        Ok(())
    }

    fn check_student(&self, student: &Student) -> Result<(), RepositoryError> {
        for other in self.students.values().filter(|other| other.id != student.id) {
            if other.admission_number == student.admission_number {
                return Err(RepositoryError::Conflict(format!(
                    "admission number '{}' is already registered",
                    student.admission_number
                )));
            }
            if other.register_number == student.register_number {
                return Err(RepositoryError::Conflict(format!(
                    "register number '{}' is already registered",
                    student.register_number
                )));
            }
            if other.email.eq_ignore_ascii_case(&student.email) {
                return Err(RepositoryError::Conflict(format!(
                    "email '{}' is already registered",
                    student.email
                )));
            }
        }
        Ok(())
    }

    /// At most one active window per (department, semester, creator).
    fn check_window<'a>(
        &'a self,
        window: &SemesterRegistration,
        staged: impl IntoIterator<Item = &'a SemesterRegistration>,
    ) -> Result<(), RepositoryError> {
        if !window.is_active() {
            return Ok(());
        }
        let clash = self
            .windows
            .values()
            .chain(staged)
            .filter(|other| other.id != window.id && other.is_active())
            .any(|other| {
                other.department == window.department
                    && other.semester == window.semester
                    && other.created_by == window.created_by
            });
        if clash {
            return Err(RepositoryError::Conflict(format!(
                "active window for {} semester {} already exists",
                window.department, window.semester
            )));
        }
        Ok(())
    }
}

/// Process-local store backing every registry collection and the in-app
/// notification feed. All collections share one lock, so a commit is atomic.
#[derive(Default)]
pub struct InMemoryStore {
    collections: Mutex<Collections>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        self.collections.lock().expect("store mutex poisoned")
    }
}

impl RegistryStore for InMemoryStore {
    fn insert_user(&self, user: User) -> Result<User, RepositoryError> {
        let mut guard = self.lock();
        if guard.users.contains_key(&user.id) {
            return Err(RepositoryError::Conflict(format!("user {} exists", user.id)));
        }
        guard.check_user(&user)?;
        guard.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    fn fetch_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.lock().users.get(id).cloned())
    }

    fn find_user_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|user| user.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    fn update_user(&self, user: User) -> Result<(), RepositoryError> {
        let mut guard = self.lock();
        if !guard.users.contains_key(&user.id) {
            return Err(RepositoryError::NotFound);
        }
        guard.check_user(&user)?;
        guard.users.insert(user.id.clone(), user);
        Ok(())
    }

    fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        Ok(self.lock().users.values().cloned().collect())
    }

    fn delete_user(&self, id: &UserId) -> Result<(), RepositoryError> {
        self.lock()
            .users
            .remove(id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn insert_student(&self, student: Student) -> Result<Student, RepositoryError> {
        let mut guard = self.lock();
        if guard.students.contains_key(&student.id) {
            return Err(RepositoryError::Conflict(format!(
                "student {} exists",
                student.id
            )));
        }
        guard.check_student(&student)?;
        guard.students.insert(student.id.clone(), student.clone());
        Ok(student)
    }

    fn fetch_student(&self, id: &StudentId) -> Result<Option<Student>, RepositoryError> {
        Ok(self.lock().students.get(id).cloned())
    }

    fn update_student(&self, student: Student) -> Result<(), RepositoryError> {
        let mut guard = self.lock();
        if !guard.students.contains_key(&student.id) {
            return Err(RepositoryError::NotFound);
        }
        guard.check_student(&student)?;
        guard.students.insert(student.id.clone(), student);
        Ok(())
    }

    fn list_students(&self) -> Result<Vec<Student>, RepositoryError> {
        Ok(self.lock().students.values().cloned().collect())
    }

    fn students_in_scope(
        &self,
        department: Department,
        semester: Semester,
    ) -> Result<Vec<Student>, RepositoryError> {
        Ok(self
            .lock()
            .students
            .values()
            .filter(|student| student.department == department && student.semester == semester)
            .cloned()
            .collect())
    }

    fn delete_student(&self, id: &StudentId) -> Result<(), RepositoryError> {
        self.lock()
            .students
            .remove(id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn fetch_fines(&self, student: &StudentId) -> Result<Option<FineLedger>, RepositoryError> {
        Ok(self.lock().fines.get(student).cloned())
    }

    fn save_fines(&self, ledger: FineLedger) -> Result<(), RepositoryError> {
        self.lock().fines.insert(ledger.student_id.clone(), ledger);
        Ok(())
    }

    fn delete_fines(&self, student: &StudentId) -> Result<(), RepositoryError> {
        self.lock().fines.remove(student);
        Ok(())
    }

    fn fetch_window(&self, id: &WindowId) -> Result<Option<SemesterRegistration>, RepositoryError> {
        Ok(self.lock().windows.get(id).cloned())
    }

    fn find_active_window(
        &self,
        department: Department,
        semester: Semester,
        creator: &UserId,
    ) -> Result<Option<SemesterRegistration>, RepositoryError> {
        Ok(self
            .lock()
            .windows
            .values()
            .find(|window| {
                window.is_active()
                    && window.department == department
                    && window.semester == semester
                    && &window.created_by == creator
            })
            .cloned())
    }

    fn windows_created_by(
        &self,
        creator: &UserId,
    ) -> Result<Vec<SemesterRegistration>, RepositoryError> {
        let mut windows: Vec<_> = self
            .lock()
            .windows
            .values()
            .filter(|window| &window.created_by == creator)
            .cloned()
            .collect();
        windows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(windows)
    }

    fn active_windows_for_student(
        &self,
        student: &StudentId,
    ) -> Result<Vec<SemesterRegistration>, RepositoryError> {
        Ok(self
            .lock()
            .windows
            .values()
            .filter(|window| window.is_active() && window.includes(student))
            .cloned()
            .collect())
    }

    fn set_window_terms(
        &self,
        id: &WindowId,
        creator: &UserId,
        terms: WindowTerms,
    ) -> Result<SemesterRegistration, RepositoryError> {
        let mut guard = self.lock();
        let mut window = match guard.windows.get(id) {
            Some(window) if &window.created_by == creator => window.clone(),
            _ => return Err(RepositoryError::NotFound),
        };
        if let Some(deadline) = terms.deadline {
            window.deadline = deadline;
        }
        if let Some(status) = terms.status {
            window.status = status;
        }
        window.updated_at = terms.at;
        guard.check_window(&window, [])?;
        guard.windows.insert(window.id.clone(), window.clone());
        Ok(window)
    }

    fn advance_roster_entry(
        &self,
        id: &WindowId,
        student: &StudentId,
        target: RosterStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        Ok(match self.lock().windows.get_mut(id) {
            Some(window) if window.is_active() => window.advance_entry(student, target, at),
            _ => false,
        })
    }

    fn delete_window(&self, id: &WindowId) -> Result<SemesterRegistration, RepositoryError> {
        let mut guard = self.lock();
        let locked = guard
            .windows
            .get(id)
            .ok_or(RepositoryError::NotFound)?
            .locked_entries();
        if locked > 0 {
            return Err(RepositoryError::Retained(locked));
        }
        guard.windows.remove(id).ok_or(RepositoryError::NotFound)
    }

    fn insert_assignment(
        &self,
        assignment: TutorAssignment,
    ) -> Result<TutorAssignment, RepositoryError> {
        let mut guard = self.lock();
        if guard
            .assignments
            .values()
            .any(|other| other.tutor_id == assignment.tutor_id)
        {
            return Err(RepositoryError::Conflict(format!(
                "tutor {} already has an assignment",
                assignment.tutor_id
            )));
        }
        guard
            .assignments
            .insert(assignment.id.clone(), assignment.clone());
        Ok(assignment)
    }

    fn fetch_assignment(
        &self,
        id: &AssignmentId,
    ) -> Result<Option<TutorAssignment>, RepositoryError> {
        Ok(self.lock().assignments.get(id).cloned())
    }

    fn assignment_for_tutor(
        &self,
        tutor: &UserId,
    ) -> Result<Option<TutorAssignment>, RepositoryError> {
        Ok(self
            .lock()
            .assignments
            .values()
            .find(|assignment| &assignment.tutor_id == tutor)
            .cloned())
    }

    fn list_assignments(&self) -> Result<Vec<TutorAssignment>, RepositoryError> {
        Ok(self.lock().assignments.values().cloned().collect())
    }

    fn update_assignment(&self, assignment: TutorAssignment) -> Result<(), RepositoryError> {
        let mut guard = self.lock();
        match guard.assignments.get_mut(&assignment.id) {
            Some(slot) => {
                *slot = assignment;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn delete_assignment(&self, id: &AssignmentId) -> Result<(), RepositoryError> {
        self.lock()
            .assignments
            .remove(id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn append_log(&self, entry: SystemLog) -> Result<(), RepositoryError> {
        self.lock().logs.push(entry);
        Ok(())
    }

    fn recent_logs(&self, limit: usize) -> Result<Vec<SystemLog>, RepositoryError> {
        Ok(self.lock().logs.iter().rev().take(limit).cloned().collect())
    }

    fn commit(&self, transaction: Transaction) -> Result<(), RepositoryError> {
        let writes = transaction.into_writes();
        let mut guard = self.lock();

        let mut staged: Vec<&SemesterRegistration> = Vec::new();
        for write in &writes {
            if let StagedWrite::InsertWindow(window) = write {
                if guard.windows.contains_key(&window.id) {
                    return Err(RepositoryError::Conflict(format!(
                        "window {} exists",
                        window.id
                    )));
                }
                guard.check_window(window, staged.iter().copied())?;
                staged.push(window);
            }
        }

        for write in writes {
            match write {
                StagedWrite::InsertWindow(window) => {
                    guard.windows.insert(window.id.clone(), window);
                }
                StagedWrite::InsertNotification(notification) => {
                    guard.notifications.push(notification);
                }
            }
        }
        Ok(())
    }
}

impl NotificationSink for InMemoryStore {
    fn create(&self, notification: Notification) -> Result<Notification, NotificationError> {
        self.lock().notifications.push(notification.clone());
        Ok(notification)
    }

    fn for_recipients(
        &self,
        recipients: &[Recipient],
    ) -> Result<Vec<Notification>, NotificationError> {
        Ok(self
            .lock()
            .notifications
            .iter()
            .rev()
            .filter(|notification| recipients.contains(&notification.recipient))
            .cloned()
            .collect())
    }

    fn mark_read(
        &self,
        id: &NotificationId,
        recipients: &[Recipient],
    ) -> Result<Notification, NotificationError> {
        let mut guard = self.lock();
        let notification = guard
            .notifications
            .iter_mut()
            .find(|notification| {
                &notification.id == id && recipients.contains(&notification.recipient)
            })
            .ok_or(NotificationError::NotFound)?;
        notification.read = true;
        Ok(notification.clone())
    }
}
