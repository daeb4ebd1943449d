//! Record store collaborator: the typed operations the check-in core and the
//! event screens need from the document database.

use async_trait::async_trait;

pub mod memory;
pub mod postgres;
pub mod repo_types;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use repo_types::{
    Attendance, Event, EventChanges, InsertOutcome, NewAttendance, NewEvent, NewRegistration,
    Profile, Registration, Role,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("record store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, StoreError>;
    async fn upsert_profile(&self, profile: Profile) -> Result<Profile, StoreError>;
    /// Returns the updated profile, or `None` when no profile has that email.
    async fn set_role_by_email(&self, email: &str, role: Role)
        -> Result<Option<Profile>, StoreError>;

    async fn insert_event(&self, event: NewEvent) -> Result<Event, StoreError>;
    /// Returns the updated event, or `None` when no event has that id.
    async fn update_event(
        &self,
        id: &str,
        changes: EventChanges,
    ) -> Result<Option<Event>, StoreError>;
    async fn get_event(&self, id: &str) -> Result<Option<Event>, StoreError>;
    /// Newest first by event date.
    async fn list_events(
        &self,
        organizer_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Event>, StoreError>;

    async fn insert_registration_if_absent(
        &self,
        reg: NewRegistration,
    ) -> Result<InsertOutcome<Registration>, StoreError>;
    async fn find_registration(
        &self,
        user_id: &str,
        event_id: &str,
    ) -> Result<Option<Registration>, StoreError>;
    async fn list_registrations_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Registration>, StoreError>;

    /// Insert-if-absent on `(user_id, event_id)`.
    async fn insert_attendance_if_absent(
        &self,
        att: NewAttendance,
    ) -> Result<InsertOutcome<Attendance>, StoreError>;
    async fn find_attendance(
        &self,
        user_id: &str,
        event_id: &str,
    ) -> Result<Option<Attendance>, StoreError>;
    /// Newest first by timestamp, at most `limit` rows.
    async fn recent_attendance(
        &self,
        event_id: &str,
        limit: i64,
    ) -> Result<Vec<Attendance>, StoreError>;
}
