use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use super::{
    repo_types::ProfileRow, Attendance, Event, EventChanges, InsertOutcome, NewAttendance,
    NewEvent, NewRegistration, Profile, RecordStore, Registration, Role, StoreError,
};

const PROFILE_COLUMNS: &str = "user_id, email, full_name, roll_no, department, mobile, role";
const EVENT_COLUMNS: &str = "id, name, date, location, organizer_id, restricted_branches";
const REGISTRATION_COLUMNS: &str =
    "id, user_id, event_id, student_name, student_roll, student_dept, registered_at";
const ATTENDANCE_COLUMNS: &str =
    r#"id, user_id, event_id, student_name, student_roll, organizer_id, "timestamp""#;

/// Postgres-backed record store. Pair uniqueness for registrations and
/// attendance is a unique index, so conditional inserts are single statements.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn profile_from_row(row: ProfileRow) -> Result<Profile, StoreError> {
    Profile::try_from(row).map_err(|e| StoreError::Corrupt(e.to_string()))
}

#[async_trait]
impl RecordStore for PgStore {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, StoreError> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        row.map(profile_from_row).transpose()
    }

    async fn upsert_profile(&self, profile: Profile) -> Result<Profile, StoreError> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            r#"
            INSERT INTO profiles (user_id, email, full_name, roll_no, department, mobile, role)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id) DO UPDATE
               SET email = EXCLUDED.email,
                   full_name = EXCLUDED.full_name,
                   roll_no = EXCLUDED.roll_no,
                   department = EXCLUDED.department,
                   mobile = EXCLUDED.mobile,
                   role = EXCLUDED.role
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(&profile.user_id)
        .bind(&profile.email)
        .bind(&profile.full_name)
        .bind(&profile.roll_no)
        .bind(&profile.department)
        .bind(&profile.mobile)
        .bind(profile.role.as_str())
        .fetch_one(&self.db)
        .await?;
        profile_from_row(row)
    }

    async fn set_role_by_email(
        &self,
        email: &str,
        role: Role,
    ) -> Result<Option<Profile>, StoreError> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "UPDATE profiles SET role = $2 WHERE email = $1 RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(email)
        .bind(role.as_str())
        .fetch_optional(&self.db)
        .await?;
        row.map(profile_from_row).transpose()
    }

    async fn insert_event(&self, event: NewEvent) -> Result<Event, StoreError> {
        let id = Uuid::new_v4().to_string();
        let ev = sqlx::query_as::<_, Event>(&format!(
            r#"
            INSERT INTO events (id, name, date, location, organizer_id, restricted_branches)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(&id)
        .bind(&event.name)
        .bind(event.date)
        .bind(&event.location)
        .bind(&event.organizer_id)
        .bind(&event.restricted_branches)
        .fetch_one(&self.db)
        .await?;
        Ok(ev)
    }

    async fn update_event(
        &self,
        id: &str,
        changes: EventChanges,
    ) -> Result<Option<Event>, StoreError> {
        let ev = sqlx::query_as::<_, Event>(&format!(
            r#"
            UPDATE events
               SET name = $2,
                   date = $3,
                   location = $4,
                   restricted_branches = $5
             WHERE id = $1
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&changes.name)
        .bind(changes.date)
        .bind(&changes.location)
        .bind(&changes.restricted_branches)
        .fetch_optional(&self.db)
        .await?;
        Ok(ev)
    }

    async fn get_event(&self, id: &str) -> Result<Option<Event>, StoreError> {
        let ev = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(ev)
    }

    async fn list_events(
        &self,
        organizer_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Event>, StoreError> {
        let rows = sqlx::query_as::<_, Event>(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM events
            WHERE $1::text IS NULL OR organizer_id = $1
            ORDER BY date DESC
            LIMIT $2
            "#
        ))
        .bind(organizer_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn insert_registration_if_absent(
        &self,
        reg: NewRegistration,
    ) -> Result<InsertOutcome<Registration>, StoreError> {
        let row = sqlx::query_as::<_, Registration>(&format!(
            r#"
            INSERT INTO registrations
                (id, user_id, event_id, student_name, student_roll, student_dept, registered_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id, event_id) DO NOTHING
            RETURNING {REGISTRATION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&reg.user_id)
        .bind(&reg.event_id)
        .bind(&reg.student_name)
        .bind(&reg.student_roll)
        .bind(&reg.student_dept)
        .bind(reg.registered_at)
        .fetch_optional(&self.db)
        .await?;

        Ok(match row {
            Some(r) => InsertOutcome::Inserted(r),
            None => {
                debug!(user_id = %reg.user_id, event_id = %reg.event_id, "registration exists");
                InsertOutcome::AlreadyExists
            }
        })
    }

    async fn find_registration(
        &self,
        user_id: &str,
        event_id: &str,
    ) -> Result<Option<Registration>, StoreError> {
        let row = sqlx::query_as::<_, Registration>(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE user_id = $1 AND event_id = $2"
        ))
        .bind(user_id)
        .bind(event_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn list_registrations_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Registration>, StoreError> {
        let rows = sqlx::query_as::<_, Registration>(&format!(
            r#"
            SELECT {REGISTRATION_COLUMNS}
            FROM registrations
            WHERE user_id = $1
            ORDER BY registered_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn insert_attendance_if_absent(
        &self,
        att: NewAttendance,
    ) -> Result<InsertOutcome<Attendance>, StoreError> {
        let row = sqlx::query_as::<_, Attendance>(&format!(
            r#"
            INSERT INTO attendance
                (id, user_id, event_id, student_name, student_roll, organizer_id, "timestamp")
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id, event_id) DO NOTHING
            RETURNING {ATTENDANCE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&att.user_id)
        .bind(&att.event_id)
        .bind(&att.student_name)
        .bind(&att.student_roll)
        .bind(&att.organizer_id)
        .bind(att.timestamp)
        .fetch_optional(&self.db)
        .await?;

        Ok(match row {
            Some(a) => InsertOutcome::Inserted(a),
            None => InsertOutcome::AlreadyExists,
        })
    }

    async fn find_attendance(
        &self,
        user_id: &str,
        event_id: &str,
    ) -> Result<Option<Attendance>, StoreError> {
        let row = sqlx::query_as::<_, Attendance>(&format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE user_id = $1 AND event_id = $2"
        ))
        .bind(user_id)
        .bind(event_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn recent_attendance(
        &self,
        event_id: &str,
        limit: i64,
    ) -> Result<Vec<Attendance>, StoreError> {
        let rows = sqlx::query_as::<_, Attendance>(&format!(
            r#"
            SELECT {ATTENDANCE_COLUMNS}
            FROM attendance
            WHERE event_id = $1
            ORDER BY "timestamp" DESC
            LIMIT $2
            "#
        ))
        .bind(event_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}
