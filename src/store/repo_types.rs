use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Account role, as stored on the profile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    #[default]
    Student,
    Organizer,
    Faculty,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Organizer => "organizer",
            Role::Faculty => "faculty",
            Role::SuperAdmin => "superAdmin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "organizer" => Ok(Role::Organizer),
            "faculty" => Ok(Role::Faculty),
            "superAdmin" => Ok(Role::SuperAdmin),
            other => anyhow::bail!("unknown role {other:?}"),
        }
    }
}

/// User profile keyed by the identity provider's subject.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub user_id: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub roll_no: Option<String>,
    pub department: Option<String>,
    pub mobile: Option<String>,
    pub role: Role,
}

impl Profile {
    /// Profile of a user the store has never seen.
    pub fn new_student(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
            full_name: None,
            roll_no: None,
            department: None,
            mobile: None,
            role: Role::Student,
        }
    }

    /// Students need roll number, department and mobile before registering.
    pub fn is_complete(&self) -> bool {
        if matches!(self.role, Role::Faculty | Role::SuperAdmin) {
            return true;
        }
        [&self.roll_no, &self.department, &self.mobile]
            .iter()
            .all(|f| f.as_deref().is_some_and(|v| !v.trim().is_empty()))
    }
}

/// Row shape of `profiles`; role is kept as text in the database.
#[derive(Debug, FromRow)]
pub struct ProfileRow {
    pub user_id: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub roll_no: Option<String>,
    pub department: Option<String>,
    pub mobile: Option<String>,
    pub role: String,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = anyhow::Error;

    fn try_from(r: ProfileRow) -> Result<Self, Self::Error> {
        Ok(Self {
            role: r.role.parse()?,
            user_id: r.user_id,
            email: r.email,
            full_name: r.full_name,
            roll_no: r.roll_no,
            department: r.department,
            mobile: r.mobile,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Event {
    pub id: String,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub location: String,
    pub organizer_id: String,
    /// Departments allowed to register; empty means everyone.
    pub restricted_branches: Vec<String>,
}

impl Event {
    pub fn admits_department(&self, department: Option<&str>) -> bool {
        if self.restricted_branches.is_empty() {
            return true;
        }
        department.is_some_and(|d| self.restricted_branches.iter().any(|b| b == d))
    }
}

/// Editable fields of an event. Id and organizer never change.
#[derive(Debug, Clone)]
pub struct EventChanges {
    pub name: String,
    pub date: OffsetDateTime,
    pub location: String,
    pub restricted_branches: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub name: String,
    pub date: OffsetDateTime,
    pub location: String,
    pub organizer_id: String,
    pub restricted_branches: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Registration {
    pub id: Uuid,
    pub user_id: String,
    pub event_id: String,
    pub student_name: String,
    pub student_roll: String,
    pub student_dept: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub registered_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub user_id: String,
    pub event_id: String,
    pub student_name: String,
    pub student_roll: String,
    pub student_dept: Option<String>,
    pub registered_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Attendance {
    pub id: Uuid,
    pub user_id: String,
    pub event_id: String,
    pub student_name: String,
    pub student_roll: String,
    pub organizer_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewAttendance {
    pub user_id: String,
    pub event_id: String,
    pub student_name: String,
    pub student_roll: String,
    pub organizer_id: String,
    pub timestamp: OffsetDateTime,
}

impl NewAttendance {
    /// Identity fields come from the registration, never from the scanned code.
    pub fn from_registration(
        reg: &Registration,
        organizer_id: &str,
        timestamp: OffsetDateTime,
    ) -> Self {
        Self {
            user_id: reg.user_id.clone(),
            event_id: reg.event_id.clone(),
            student_name: reg.student_name.clone(),
            student_roll: reg.student_roll.clone(),
            organizer_id: organizer_id.to_string(),
            timestamp,
        }
    }
}

/// Result of an insert-if-absent on a composite key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome<T> {
    Inserted(T),
    AlreadyExists,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_text_roundtrip_matches_stored_names() {
        for role in [Role::Student, Role::Organizer, Role::Faculty, Role::SuperAdmin] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("admin".parse::<Role>().is_err());
        assert_eq!(
            serde_json::to_string(&Role::SuperAdmin).unwrap(),
            "\"superAdmin\""
        );
    }

    #[test]
    fn student_profile_needs_roll_department_and_mobile() {
        let mut p = Profile::new_student("u1");
        assert!(!p.is_complete());
        p.roll_no = Some("21CS01".into());
        p.department = Some("CSE".into());
        p.mobile = Some("  ".into());
        assert!(!p.is_complete());
        p.mobile = Some("9999999999".into());
        assert!(p.is_complete());

        let mut faculty = Profile::new_student("f1");
        faculty.role = Role::Faculty;
        assert!(faculty.is_complete());
    }

    #[test]
    fn restricted_event_admits_only_listed_departments() {
        let mut ev = Event {
            id: "e1".into(),
            name: "Hack Night".into(),
            date: OffsetDateTime::UNIX_EPOCH,
            location: "Lab 3".into(),
            organizer_id: "o1".into(),
            restricted_branches: vec![],
        };
        assert!(ev.admits_department(None));
        ev.restricted_branches = vec!["CSE".into(), "ECE".into()];
        assert!(ev.admits_department(Some("ECE")));
        assert!(!ev.admits_department(Some("MECH")));
        assert!(!ev.admits_department(None));
    }
}
