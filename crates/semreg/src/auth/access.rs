use serde::Serialize;

use crate::workflows::registration::{RegistryError, Role, StudentId, UserId};

/// Authenticated identity attached to every workflow call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<StudentId>,
}

impl Caller {
    pub fn authorize(&self, operation: Operation) -> Result<(), RegistryError> {
        if operation.allowed_roles().contains(&self.role) {
            Ok(())
        } else {
            Err(RegistryError::Forbidden(format!(
                "role '{}' may not {}",
                self.role.label(),
                operation.describe()
            )))
        }
    }

    /// The student profile owned by this caller, if it is a student.
    pub fn own_student(&self) -> Result<&StudentId, RegistryError> {
        self.student_id.as_ref().ok_or_else(|| {
            RegistryError::Forbidden("caller has no linked student profile".to_string())
        })
    }
}

/// Closed set of guarded operations, each with an explicit role allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ViewOwnRegistration,
    ApplyForRegistration,
    ApproveRegistration,
    ManageWindows,
    ViewWindowStatistics,
    ViewOwnScopes,
    ManageFines,
    ManageUsers,
    ManageAssignments,
    ViewLogs,
    ReadNotifications,
}

impl Operation {
    pub const fn allowed_roles(self) -> &'static [Role] {
        match self {
            Operation::ViewOwnRegistration | Operation::ApplyForRegistration => &[Role::Student],
            Operation::ApproveRegistration
            | Operation::ManageWindows
            | Operation::ViewWindowStatistics
            | Operation::ViewOwnScopes => &[Role::Tutor],
            Operation::ManageFines => &[Role::Staff, Role::Admin],
            Operation::ManageUsers | Operation::ManageAssignments | Operation::ViewLogs => {
                &[Role::Admin]
            }
            Operation::ReadNotifications => {
                &[Role::Student, Role::Staff, Role::Tutor, Role::Admin]
            }
        }
    }

    const fn describe(self) -> &'static str {
        match self {
            Operation::ViewOwnRegistration => "view a registration status",
            Operation::ApplyForRegistration => "apply for registration",
            Operation::ApproveRegistration => "approve registrations",
            Operation::ManageWindows => "manage semester registration windows",
            Operation::ViewWindowStatistics => "view registration window statistics",
            Operation::ViewOwnScopes => "view tutor assignments",
            Operation::ManageFines => "manage fines and verifications",
            Operation::ManageUsers => "manage users",
            Operation::ManageAssignments => "manage tutor assignments",
            Operation::ViewLogs => "view system logs",
            Operation::ReadNotifications => "read notifications",
        }
    }
}
