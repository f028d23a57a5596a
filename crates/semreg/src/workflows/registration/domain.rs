use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_id(prefix: &str) -> String {
    let id = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{id:06}")
}

/// Identifier wrapper for user accounts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Identifier wrapper for student profiles.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StudentId(pub String);

impl UserId {
    pub(crate) fn generate() -> Self {
        Self(next_id("usr"))
    }
}

impl StudentId {
    pub(crate) fn generate() -> Self {
        Self(next_id("stu"))
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Closed set of account roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Staff,
    Tutor,
    Admin,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Staff => "staff",
            Role::Tutor => "tutor",
            Role::Admin => "admin",
        }
    }
}

/// Academic departments recognised by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum Department {
    Cse,
    Ece,
    Eee,
    Me,
    Ce,
    It,
    Aids,
    Mca,
}

impl Department {
    pub const ALL: [Department; 8] = [
        Department::Cse,
        Department::Ece,
        Department::Eee,
        Department::Me,
        Department::Ce,
        Department::It,
        Department::Aids,
        Department::Mca,
    ];

    pub const fn code(self) -> &'static str {
        match self {
            Department::Cse => "CSE",
            Department::Ece => "ECE",
            Department::Eee => "EEE",
            Department::Me => "ME",
            Department::Ce => "CE",
            Department::It => "IT",
            Department::Aids => "AIDS",
            Department::Mca => "MCA",
        }
    }
}

impl FromStr for Department {
    type Err = String;

    /// Department codes match case-insensitively.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Department::ALL
            .into_iter()
            .find(|department| department.code().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| format!("unknown department '{trimmed}'"))
    }
}

impl TryFrom<String> for Department {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Department> for &'static str {
    fn from(value: Department) -> Self {
        value.code()
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Semester number, always within 1..=8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Semester(u8);

impl Semester {
    pub const FIRST: u8 = 1;
    pub const LAST: u8 = 8;

    pub fn new(value: u8) -> Result<Self, String> {
        if (Self::FIRST..=Self::LAST).contains(&value) {
            Ok(Self(value))
        } else {
            Err(format!(
                "semester must be between {} and {}, got {value}",
                Self::FIRST,
                Self::LAST
            ))
        }
    }

    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Semester {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Semester> for u8 {
    fn from(value: Semester) -> Self {
        value.0
    }
}

impl fmt::Display for Semester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A (department, semester) pair administered by one tutor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub department: Department,
    pub semester: Semester,
}

impl Scope {
    pub fn new(department: Department, semester: Semester) -> Self {
        Self {
            department,
            semester,
        }
    }
}

impl Ord for Scope {
    /// Department code alphabetically, then semester ascending.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.department
            .code()
            .cmp(other.department.code())
            .then(self.semester.cmp(&other.semester))
    }
}

impl PartialOrd for Scope {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} semester {}", self.department, self.semester)
    }
}

/// Login identity. Students own exactly one profile through `student_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub password_hash: String,
    pub student_id: Option<StudentId>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn view(&self) -> UserView {
        UserView {
            id: self.id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role,
            student_id: self.student_id.clone(),
            created_at: self.created_at,
        }
    }
}

/// Public projection of a user; never carries the credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<StudentId>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of one departmental verification check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "clear")]
    Clear,
    #[serde(rename = "fine pending")]
    FinePending,
}

/// The three independent clearance flags gating registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub library: VerificationStatus,
    pub lab: VerificationStatus,
    pub office: VerificationStatus,
}

impl Verification {
    pub fn all_clear(&self) -> bool {
        self.outstanding().is_empty()
    }

    /// Names of the checks that are not yet clear.
    pub fn outstanding(&self) -> Vec<&'static str> {
        [
            ("library", self.library),
            ("lab", self.lab),
            ("office", self.office),
        ]
        .into_iter()
        .filter(|(_, status)| *status != VerificationStatus::Clear)
        .map(|(name, _)| name)
        .collect()
    }
}

impl Default for Verification {
    fn default() -> Self {
        Self {
            library: VerificationStatus::Pending,
            lab: VerificationStatus::Pending,
            office: VerificationStatus::Pending,
        }
    }
}

/// Global registration progress of a student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationStatus {
    #[serde(rename = "not started")]
    NotStarted,
    #[serde(rename = "in progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
}

impl RegistrationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RegistrationStatus::NotStarted => "not started",
            RegistrationStatus::InProgress => "in progress",
            RegistrationStatus::Completed => "completed",
        }
    }
}

/// Academic profile of a student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: StudentId,
    pub user_id: UserId,
    pub name: String,
    pub admission_number: String,
    pub register_number: String,
    pub department: Department,
    pub semester: Semester,
    pub email: String,
    pub verification: Verification,
    pub registration_status: RegistrationStatus,
    pub registration_completed_at: Option<DateTime<Utc>>,
}

impl Student {
    pub fn scope(&self) -> Scope {
        Scope::new(self.department, self.semester)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn departments_parse_case_insensitively() {
        assert_eq!("cse".parse::<Department>(), Ok(Department::Cse));
        assert_eq!(" Aids ".parse::<Department>(), Ok(Department::Aids));
        assert!("LAW".parse::<Department>().is_err());
        let parsed: Department = serde_json::from_str("\"ece\"").expect("deserializes");
        assert_eq!(parsed, Department::Ece);
        assert_eq!(serde_json::to_string(&parsed).expect("serializes"), "\"ECE\"");
    }

    #[test]
    fn semesters_are_bounded() {
        assert!(Semester::new(0).is_err());
        assert!(Semester::new(9).is_err());
        assert_eq!(Semester::new(8).map(Semester::get), Ok(8));
        assert!(serde_json::from_str::<Semester>("12").is_err());
    }

    #[test]
    fn scopes_sort_by_department_code_then_semester() {
        let sem = |value| Semester::new(value).expect("valid semester");
        let mut scopes = vec![
            Scope::new(Department::It, sem(2)),
            Scope::new(Department::Cse, sem(5)),
            Scope::new(Department::Aids, sem(1)),
            Scope::new(Department::Cse, sem(3)),
        ];
        scopes.sort();
        let labels: Vec<String> = scopes.iter().map(Scope::to_string).collect();
        assert_eq!(
            labels,
            vec![
                "AIDS semester 1",
                "CSE semester 3",
                "CSE semester 5",
                "IT semester 2"
            ]
        );
    }

    #[test]
    fn status_labels_match_wire_format() {
        let json = serde_json::to_string(&RegistrationStatus::InProgress).expect("serializes");
        assert_eq!(json, format!("\"{}\"", RegistrationStatus::InProgress.label()));
        let flag: VerificationStatus =
            serde_json::from_str("\"fine pending\"").expect("deserializes");
        assert_eq!(flag, VerificationStatus::FinePending);
    }

    #[test]
    fn outstanding_lists_non_clear_checks() {
        let verification = Verification {
            library: VerificationStatus::Clear,
            lab: VerificationStatus::FinePending,
            office: VerificationStatus::Pending,
        };
        assert_eq!(verification.outstanding(), vec!["lab", "office"]);
        assert!(!verification.all_clear());
    }
}
