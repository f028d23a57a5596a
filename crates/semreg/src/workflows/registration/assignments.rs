use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::{Caller, Operation};

use super::domain::{next_id, Department, Role, Scope, Semester, UserId};
use super::error::{ConflictError, RegistryError};
use super::registry::Registry;
use super::repository::RepositoryError;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssignmentId(pub String);

/// The (department, semester) scopes one tutor administers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorAssignment {
    pub id: AssignmentId,
    pub tutor_id: UserId,
    pub assignments: Vec<Scope>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TutorAssignment {
    pub fn grants(&self, department: Department, semester: Semester) -> bool {
        self.assignments.contains(&Scope::new(department, semester))
    }
}

/// Raw scope as submitted by an admin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeRequest {
    pub department: String,
    pub semester: u8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentDraft {
    pub tutor_id: UserId,
    #[serde(default)]
    pub assignments: Vec<ScopeRequest>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignmentPatch {
    #[serde(default)]
    pub assignments: Vec<ScopeRequest>,
}

/// Parse, de-duplicate and sort requested scopes.
fn normalize(requests: &[ScopeRequest]) -> Result<Vec<Scope>, RegistryError> {
    if requests.is_empty() {
        return Err(RegistryError::validation(
            "at least one department/semester assignment is required",
        ));
    }

    let mut scopes = requests
        .iter()
        .map(|request| {
            let department = request
                .department
                .parse::<Department>()
                .map_err(RegistryError::Validation)?;
            let semester = Semester::new(request.semester).map_err(RegistryError::Validation)?;
            Ok(Scope::new(department, semester))
        })
        .collect::<Result<Vec<_>, RegistryError>>()?;
    scopes.sort();
    scopes.dedup();
    Ok(scopes)
}

impl Registry {
    pub fn list_assignments(&self, caller: &Caller) -> Result<Vec<TutorAssignment>, RegistryError> {
        caller.authorize(Operation::ManageAssignments)?;
        Ok(self.store.list_assignments()?)
    }

    pub fn create_assignment(
        &self,
        caller: &Caller,
        draft: &AssignmentDraft,
    ) -> Result<TutorAssignment, RegistryError> {
        caller.authorize(Operation::ManageAssignments)?;

        let tutor = self
            .store
            .fetch_user(&draft.tutor_id)?
            .ok_or(RegistryError::NotFound("tutor"))?;
        if tutor.role != Role::Tutor {
            return Err(RegistryError::validation(format!(
                "user {} is not a tutor",
                tutor.username
            )));
        }

        let scopes = normalize(&draft.assignments)?;
        if self.store.assignment_for_tutor(&tutor.id)?.is_some() {
            return Err(ConflictError::AssignmentExists(tutor.id).into());
        }
        self.ensure_scopes_free(&scopes, None)?;

        let now = Utc::now();
        let assignment = self.store.insert_assignment(TutorAssignment {
            id: AssignmentId(next_id("asg")),
            tutor_id: tutor.id.clone(),
            assignments: scopes,
            created_at: now,
            updated_at: now,
        })?;

        info!(tutor_id = %tutor.id, scopes = assignment.assignments.len(), "tutor assignment created");
        self.audit(
            Some(&caller.user_id),
            "assignment.created",
            format!("{} -> {}", tutor.username, describe(&assignment.assignments)),
        );
        Ok(assignment)
    }

    pub fn update_assignment(
        &self,
        caller: &Caller,
        id: &AssignmentId,
        patch: &AssignmentPatch,
    ) -> Result<TutorAssignment, RegistryError> {
        caller.authorize(Operation::ManageAssignments)?;
        let mut assignment = self
            .store
            .fetch_assignment(id)?
            .ok_or(RegistryError::NotFound("tutor assignment"))?;

        let scopes = normalize(&patch.assignments)?;
        self.ensure_scopes_free(&scopes, Some(id))?;

        assignment.assignments = scopes;
        assignment.updated_at = Utc::now();
        self.store.update_assignment(assignment.clone())?;

        info!(tutor_id = %assignment.tutor_id, "tutor assignment updated");
        self.audit(
            Some(&caller.user_id),
            "assignment.updated",
            format!("{} -> {}", assignment.tutor_id, describe(&assignment.assignments)),
        );
        Ok(assignment)
    }

    pub fn delete_assignment(&self, caller: &Caller, id: &AssignmentId) -> Result<(), RegistryError> {
        caller.authorize(Operation::ManageAssignments)?;
        self.store.delete_assignment(id).map_err(|err| match err {
            RepositoryError::NotFound => RegistryError::NotFound("tutor assignment"),
            other => other.into(),
        })?;
        self.audit(Some(&caller.user_id), "assignment.deleted", id.0.clone());
        Ok(())
    }

    /// Scopes held by a tutor, sorted by department code then semester.
    pub fn scopes_for_tutor(&self, tutor: &UserId) -> Result<Vec<Scope>, RegistryError> {
        let mut scopes = self
            .store
            .assignment_for_tutor(tutor)?
            .map(|assignment| assignment.assignments)
            .unwrap_or_default();
        scopes.sort();
        Ok(scopes)
    }

    pub fn my_scopes(&self, caller: &Caller) -> Result<Vec<Scope>, RegistryError> {
        caller.authorize(Operation::ViewOwnScopes)?;
        self.scopes_for_tutor(&caller.user_id)
    }

    pub(crate) fn ensure_scope(
        &self,
        tutor: &UserId,
        department: Department,
        semester: Semester,
    ) -> Result<(), RegistryError> {
        let granted = self
            .store
            .assignment_for_tutor(tutor)?
            .is_some_and(|assignment| assignment.grants(department, semester));
        if granted {
            Ok(())
        } else {
            Err(RegistryError::Forbidden(format!(
                "tutor is not assigned to {department} semester {semester}"
            )))
        }
    }

    /// Department and semester are compared on the same scope entry.
    fn ensure_scopes_free(
        &self,
        scopes: &[Scope],
        excluding: Option<&AssignmentId>,
    ) -> Result<(), RegistryError> {
        for other in self.store.list_assignments()? {
            if excluding == Some(&other.id) {
                continue;
            }
            if let Some(taken) = scopes.iter().find(|scope| other.assignments.contains(scope)) {
                return Err(ConflictError::ScopeConflict {
                    department: taken.department,
                    semester: taken.semester,
                    tutor: other.tutor_id,
                }
                .into());
            }
        }
        Ok(())
    }
}

fn describe(scopes: &[Scope]) -> String {
    scopes
        .iter()
        .map(Scope::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
