use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::{Caller, Operation};

use super::domain::{next_id, Department, Semester, Student, StudentId, UserId};
use super::error::{ConflictError, PreconditionError, RegistryError};
use super::notify::{Notification, NotificationKind, Recipient};
use super::registry::Registry;
use super::repository::RepositoryError;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WindowId(pub String);

impl std::fmt::Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowStatus {
    Active,
    Inactive,
}

/// Per-student progress inside one window, ordered by progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RosterStatus {
    Pending,
    Submitted,
    Approved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub student_id: StudentId,
    pub status: RosterStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
}

/// Department+semester scoped registration period with a roster snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterRegistration {
    pub id: WindowId,
    pub department: Department,
    pub semester: Semester,
    pub deadline: NaiveDate,
    pub status: WindowStatus,
    pub created_by: UserId,
    pub roster: Vec<RosterEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SemesterRegistration {
    /// New active window with every given student pending.
    pub fn open(
        department: Department,
        semester: Semester,
        deadline: NaiveDate,
        created_by: UserId,
        students: &[Student],
    ) -> Self {
        let now = Utc::now();
        Self {
            id: WindowId(next_id("win")),
            department,
            semester,
            deadline,
            status: WindowStatus::Active,
            created_by,
            roster: students
                .iter()
                .map(|student| RosterEntry {
                    student_id: student.id.clone(),
                    status: RosterStatus::Pending,
                    submitted_at: None,
                    approved_at: None,
                })
                .collect(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == WindowStatus::Active
    }

    pub fn includes(&self, student_id: &StudentId) -> bool {
        self.roster.iter().any(|entry| &entry.student_id == student_id)
    }

    /// Move a student's entry forward; never moves backwards. Returns whether
    /// anything changed.
    pub fn advance_entry(
        &mut self,
        student_id: &StudentId,
        target: RosterStatus,
        at: DateTime<Utc>,
    ) -> bool {
        let Some(entry) = self
            .roster
            .iter_mut()
            .find(|entry| &entry.student_id == student_id)
        else {
            return false;
        };
        if entry.status >= target {
            return false;
        }

        entry.status = target;
        match target {
            RosterStatus::Submitted => entry.submitted_at = Some(at),
            RosterStatus::Approved => {
                entry.submitted_at.get_or_insert(at);
                entry.approved_at = Some(at);
            }
            RosterStatus::Pending => {}
        }
        self.updated_at = at;
        true
    }

    /// Entries whose work must not be destroyed.
    pub fn locked_entries(&self) -> usize {
        self.roster
            .iter()
            .filter(|entry| entry.status != RosterStatus::Pending)
            .count()
    }
}

/// Raw create request; every field is validated by [`WindowDraft::validate`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WindowDraft {
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub semester: Option<u8>,
    #[serde(default)]
    pub deadline: Option<String>,
}

impl WindowDraft {
    pub fn validate(&self) -> Result<(Department, Semester, NaiveDate), RegistryError> {
        let department = match self.department.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => {
                raw.parse::<Department>().map_err(RegistryError::Validation)?
            }
            _ => return Err(RegistryError::validation("department is required")),
        };
        let semester = self
            .semester
            .ok_or_else(|| RegistryError::validation("semester is required"))
            .and_then(|value| Semester::new(value).map_err(RegistryError::Validation))?;
        let deadline = match self.deadline.as_deref() {
            Some(raw) if !raw.trim().is_empty() => parse_deadline(raw)?,
            _ => return Err(RegistryError::validation("deadline is required")),
        };
        Ok((department, semester, deadline))
    }
}

/// Partial update; absent fields keep their values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WindowPatch {
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default)]
    pub status: Option<WindowStatus>,
}

/// Field-level change applied by the store under its own lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowTerms {
    pub deadline: Option<NaiveDate>,
    pub status: Option<WindowStatus>,
    pub at: DateTime<Utc>,
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp.
pub fn parse_deadline(raw: &str) -> Result<NaiveDate, RegistryError> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|stamp| stamp.date_naive()))
        .map_err(|_| {
            RegistryError::validation(format!(
                "deadline '{raw}' must be a date (YYYY-MM-DD) or RFC 3339 timestamp"
            ))
        })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowStatistics {
    pub total: usize,
    pub pending: usize,
    pub submitted: usize,
    pub approved: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderReport {
    pub reminded: usize,
    pub emails_sent: usize,
    pub emails_failed: usize,
}

impl Registry {
    pub fn windows_for(&self, caller: &Caller) -> Result<Vec<SemesterRegistration>, RegistryError> {
        caller.authorize(Operation::ManageWindows)?;
        Ok(self.store.windows_created_by(&caller.user_id)?)
    }

    /// Open a window for a scope the caller administers.
    ///
    /// The roster snapshot, the window and one notification per student commit
    /// in a single transaction; emails go out afterwards and may fail freely.
    pub fn create_window(
        &self,
        caller: &Caller,
        draft: &WindowDraft,
    ) -> Result<SemesterRegistration, RegistryError> {
        caller.authorize(Operation::ManageWindows)?;
        let (department, semester, deadline) = draft.validate()?;

        if self
            .store
            .find_active_window(department, semester, &caller.user_id)?
            .is_some()
        {
            return Err(ConflictError::DuplicateActiveWindow {
                department,
                semester,
            }
            .into());
        }
        self.ensure_scope(&caller.user_id, department, semester)?;

        let students = self.store.students_in_scope(department, semester)?;
        if students.is_empty() {
            return Err(PreconditionError::NoStudents {
                department,
                semester,
            }
            .into());
        }

        let window = SemesterRegistration::open(
            department,
            semester,
            deadline,
            caller.user_id.clone(),
            &students,
        );

        let mut transaction = self.store.begin();
        transaction.insert_window(window.clone());
        for student in &students {
            self.notifications.stage(
                &mut transaction,
                Notification::new(
                    Recipient::Student(student.id.clone()),
                    "Semester registration open",
                    format!(
                        "Registration for {department} semester {semester} is open until {deadline}."
                    ),
                    NotificationKind::Info,
                ),
            )?;
        }
        self.store.commit(transaction).map_err(|err| match err {
            RepositoryError::Conflict(_) => {
                RegistryError::from(ConflictError::DuplicateActiveWindow {
                    department,
                    semester,
                })
            }
            other => RegistryError::from(other),
        })?;

        for student in &students {
            self.mail(
                &student.email,
                "Semester registration is open",
                format!(
                    "Dear {},\n\nSemester registration for {} semester {} is now open. Please complete it before {}.\n\n{}",
                    student.name, department, semester, deadline, self.settings.institution
                ),
            );
        }

        info!(
            window_id = %window.id,
            %department,
            %semester,
            students = students.len(),
            "registration window created"
        );
        self.audit(
            Some(&caller.user_id),
            "window.created",
            format!(
                "{} for {department} semester {semester} with {} student(s)",
                window.id,
                students.len()
            ),
        );
        Ok(window)
    }

    pub fn update_window(
        &self,
        caller: &Caller,
        id: &WindowId,
        patch: &WindowPatch,
    ) -> Result<SemesterRegistration, RegistryError> {
        caller.authorize(Operation::ManageWindows)?;
        let current = self.owned_window(caller, id)?;

        if current.status == WindowStatus::Inactive && patch.status == Some(WindowStatus::Active) {
            return Err(PreconditionError::WindowClosed.into());
        }
        let deadline = patch.deadline.as_deref().map(parse_deadline).transpose()?;

        let deactivating = current.is_active() && patch.status == Some(WindowStatus::Inactive);
        if patch.status.unwrap_or(current.status) == WindowStatus::Active {
            self.ensure_scope(&caller.user_id, current.department, current.semester)?;
        }

        let window = self
            .store
            .set_window_terms(
                &current.id,
                &caller.user_id,
                WindowTerms {
                    deadline,
                    status: patch.status,
                    at: Utc::now(),
                },
            )
            .map_err(|err| match err {
                RepositoryError::NotFound => RegistryError::NotFound("registration window"),
                other => other.into(),
            })?;

        if deactivating {
            for entry in &window.roster {
                self.notify(Notification::new(
                    Recipient::Student(entry.student_id.clone()),
                    "Semester registration closed",
                    format!(
                        "Registration for {} semester {} has been closed.",
                        window.department, window.semester
                    ),
                    NotificationKind::Warning,
                ));
            }
        }

        info!(window_id = %window.id, deactivated = deactivating, "registration window updated");
        self.audit(
            Some(&caller.user_id),
            "window.updated",
            format!("{} deadline {} status {:?}", window.id, window.deadline, window.status),
        );
        Ok(window)
    }

    /// Remove a window nobody has made progress in.
    pub fn delete_window(&self, caller: &Caller, id: &WindowId) -> Result<(), RegistryError> {
        caller.authorize(Operation::ManageWindows)?;
        let owned = self.owned_window(caller, id)?;

        let window = self.store.delete_window(&owned.id).map_err(|err| match err {
            RepositoryError::NotFound => RegistryError::NotFound("registration window"),
            RepositoryError::Retained(count) => PreconditionError::HasSubmittedWork { count }.into(),
            other => other.into(),
        })?;

        for entry in &window.roster {
            self.notify(Notification::new(
                Recipient::Student(entry.student_id.clone()),
                "Semester registration cancelled",
                format!(
                    "Registration for {} semester {} was cancelled.",
                    window.department, window.semester
                ),
                NotificationKind::Warning,
            ));
            if let Ok(Some(student)) = self.store.fetch_student(&entry.student_id) {
                self.mail(
                    &student.email,
                    "Semester registration cancelled",
                    format!(
                        "Dear {},\n\nThe registration window for {} semester {} has been cancelled.\n\n{}",
                        student.name, window.department, window.semester, self.settings.institution
                    ),
                );
            }
        }

        info!(window_id = %window.id, "registration window deleted");
        self.audit(Some(&caller.user_id), "window.deleted", window.id.0.clone());
        Ok(())
    }

    /// Counts over roster entries whose student still exists.
    pub fn window_statistics(
        &self,
        caller: &Caller,
        id: &WindowId,
    ) -> Result<WindowStatistics, RegistryError> {
        caller.authorize(Operation::ViewWindowStatistics)?;
        let window = self
            .store
            .fetch_window(id)?
            .ok_or(RegistryError::NotFound("registration window"))?;

        let mut stats = WindowStatistics::default();
        for entry in &window.roster {
            if self.store.fetch_student(&entry.student_id)?.is_none() {
                continue;
            }
            stats.total += 1;
            match entry.status {
                RosterStatus::Pending => stats.pending += 1,
                RosterStatus::Submitted => stats.submitted += 1,
                RosterStatus::Approved => stats.approved += 1,
            }
        }
        Ok(stats)
    }

    /// Nudge every student still pending. One failed email never stops the rest.
    pub fn send_reminders(
        &self,
        caller: &Caller,
        id: &WindowId,
    ) -> Result<ReminderReport, RegistryError> {
        caller.authorize(Operation::ManageWindows)?;
        let window = self.owned_window(caller, id)?;

        let mut report = ReminderReport::default();
        for entry in window
            .roster
            .iter()
            .filter(|entry| entry.status == RosterStatus::Pending)
        {
            let Some(student) = self.store.fetch_student(&entry.student_id)? else {
                continue;
            };

            self.notify(Notification::new(
                Recipient::Student(student.id.clone()),
                "Registration reminder",
                format!(
                    "Please complete your registration for {} semester {} before {}.",
                    window.department, window.semester, window.deadline
                ),
                NotificationKind::Warning,
            ));
            report.reminded += 1;

            let sent = self.mail(
                &student.email,
                "Reminder: complete your semester registration",
                format!(
                    "Dear {},\n\nThis is a reminder to complete your registration for {} semester {} before {}.\n\n{}",
                    student.name, window.department, window.semester, window.deadline, self.settings.institution
                ),
            );
            if sent {
                report.emails_sent += 1;
            } else {
                report.emails_failed += 1;
            }
        }

        info!(
            window_id = %window.id,
            reminded = report.reminded,
            failed = report.emails_failed,
            "registration reminders sent"
        );
        self.audit(
            Some(&caller.user_id),
            "window.reminders",
            format!("{} reminded {} student(s)", window.id, report.reminded),
        );
        Ok(report)
    }

    fn owned_window(
        &self,
        caller: &Caller,
        id: &WindowId,
    ) -> Result<SemesterRegistration, RegistryError> {
        let window = self
            .store
            .fetch_window(id)?
            .ok_or(RegistryError::NotFound("registration window"))?;
        if window.created_by != caller.user_id {
            return Err(RegistryError::Forbidden(
                "only the tutor who created this registration window may modify it".to_string(),
            ));
        }
        Ok(window)
    }
}
