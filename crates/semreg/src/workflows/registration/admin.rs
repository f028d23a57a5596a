use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use crate::auth::{hash_password, Caller, Operation};
use crate::config::BootstrapAdmin;

use super::domain::{
    Department, RegistrationStatus, Role, Semester, Student, StudentId, User, UserId, UserView,
    Verification,
};
use super::error::{ConflictError, RegistryError};
use super::fines::FineLedger;
use super::notify::SystemLog;
use super::registry::Registry;
use super::repository::RepositoryError;

const MAX_LOG_PAGE: usize = 500;

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub username: String,
    pub password: String,
    pub name: String,
    pub admission_number: String,
    pub register_number: String,
    pub department: String,
    pub semester: u8,
    pub email: String,
}

fn required(field: &str, value: &str) -> Result<String, RegistryError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(RegistryError::validation(format!("{field} is required")))
    } else {
        Ok(trimmed.to_string())
    }
}

fn email(value: &str) -> Result<String, RegistryError> {
    let email = required("email", value)?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {
            Ok(email.to_ascii_lowercase())
        }
        _ => Err(RegistryError::validation(format!(
            "'{email}' is not a valid email address"
        ))),
    }
}

fn identity_conflict(err: RepositoryError) -> RegistryError {
    match err {
        RepositoryError::Conflict(detail) => ConflictError::DuplicateIdentity(detail).into(),
        other => other.into(),
    }
}

impl Registry {
    pub fn list_users(&self, caller: &Caller) -> Result<Vec<UserView>, RegistryError> {
        caller.authorize(Operation::ManageUsers)?;
        Ok(self.store.list_users()?.iter().map(User::view).collect())
    }

    pub fn list_students(&self, caller: &Caller) -> Result<Vec<Student>, RegistryError> {
        caller.authorize(Operation::ManageUsers)?;
        Ok(self.store.list_students()?)
    }

    /// Create a staff, tutor or admin account. Students go through [`Registry::create_student`].
    pub fn create_user(&self, caller: &Caller, request: &NewUser) -> Result<UserView, RegistryError> {
        caller.authorize(Operation::ManageUsers)?;
        if request.role == Role::Student {
            return Err(RegistryError::validation(
                "student accounts are created together with their profile",
            ));
        }

        let user = self.insert_account(&request.username, &request.email, &request.password, request.role)?;
        info!(user_id = %user.id, role = user.role.label(), "user created");
        self.audit(
            Some(&caller.user_id),
            "user.created",
            format!("{} ({})", user.username, user.role.label()),
        );
        Ok(user.view())
    }

    /// Create the student's login, profile and an empty fine ledger.
    pub fn create_student(
        &self,
        caller: &Caller,
        request: &NewStudent,
    ) -> Result<Student, RegistryError> {
        caller.authorize(Operation::ManageUsers)?;

        let name = required("name", &request.name)?;
        let admission_number = required("admission number", &request.admission_number)?;
        let register_number = required("register number", &request.register_number)?;
        let department = request
            .department
            .parse::<Department>()
            .map_err(RegistryError::Validation)?;
        let semester = Semester::new(request.semester).map_err(RegistryError::Validation)?;

        let mut user = self.insert_account(
            &request.username,
            &request.email,
            &request.password,
            Role::Student,
        )?;

        let student = Student {
            id: StudentId::generate(),
            user_id: user.id.clone(),
            name,
            admission_number,
            register_number,
            department,
            semester,
            email: user.email.clone(),
            verification: Verification::default(),
            registration_status: RegistrationStatus::NotStarted,
            registration_completed_at: None,
        };
        let student = match self.store.insert_student(student) {
            Ok(student) => student,
            Err(err) => {
                if let Err(cleanup) = self.store.delete_user(&user.id) {
                    warn!(user_id = %user.id, error = %cleanup, "failed to remove orphaned user");
                }
                return Err(identity_conflict(err));
            }
        };

        user.student_id = Some(student.id.clone());
        self.store.update_user(user)?;
        self.store.save_fines(FineLedger::cleared(student.id.clone()))?;

        info!(student_id = %student.id, %department, %semester, "student created");
        self.audit(
            Some(&caller.user_id),
            "student.created",
            format!("{} ({})", student.name, student.admission_number),
        );
        Ok(student)
    }

    /// Delete a user; a student's profile and fine ledger or a tutor's
    /// assignment go with it.
    pub fn delete_user(&self, caller: &Caller, id: &UserId) -> Result<(), RegistryError> {
        caller.authorize(Operation::ManageUsers)?;
        if &caller.user_id == id {
            return Err(RegistryError::validation("administrators cannot delete themselves"));
        }
        let user = self
            .store
            .fetch_user(id)?
            .ok_or(RegistryError::NotFound("user"))?;

        if let Some(student_id) = &user.student_id {
            self.store.delete_fines(student_id)?;
            match self.store.delete_student(student_id) {
                Ok(()) | Err(RepositoryError::NotFound) => {}
                Err(err) => return Err(err.into()),
            }
        }
        if let Some(assignment) = self.store.assignment_for_tutor(&user.id)? {
            match self.store.delete_assignment(&assignment.id) {
                Ok(()) | Err(RepositoryError::NotFound) => {}
                Err(err) => return Err(err.into()),
            }
        }
        self.store.delete_user(&user.id)?;
        self.sessions.revoke_user(&user.id);

        info!(user_id = %user.id, "user deleted");
        self.audit(
            Some(&caller.user_id),
            "user.deleted",
            format!("{} ({})", user.username, user.role.label()),
        );
        Ok(())
    }

    pub fn logs(&self, caller: &Caller, limit: usize) -> Result<Vec<SystemLog>, RegistryError> {
        caller.authorize(Operation::ViewLogs)?;
        Ok(self.store.recent_logs(limit.clamp(1, MAX_LOG_PAGE))?)
    }

    /// Ensure the configured administrator exists. Returns whether one was created.
    pub fn seed_admin(&self, admin: &BootstrapAdmin) -> Result<bool, RegistryError> {
        if self.store.find_user_by_username(&admin.username)?.is_some() {
            return Ok(false);
        }
        let user = self.insert_account(&admin.username, &admin.email, &admin.password, Role::Admin)?;
        info!(user_id = %user.id, username = %user.username, "bootstrap administrator created");
        self.audit(None, "user.seeded", user.username.clone());
        Ok(true)
    }

    fn insert_account(
        &self,
        username: &str,
        email_address: &str,
        password: &str,
        role: Role,
    ) -> Result<User, RegistryError> {
        let username = required("username", username)?;
        let email = email(email_address)?;
        if password.chars().count() < 8 {
            return Err(RegistryError::validation(
                "password must be at least 8 characters",
            ));
        }

        let user = User {
            id: UserId::generate(),
            username,
            email,
            role,
            password_hash: hash_password(password)?,
            student_id: None,
            created_at: Utc::now(),
        };
        self.store.insert_user(user).map_err(identity_conflict)
    }
}
