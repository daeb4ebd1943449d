use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex, MutexGuard,
    },
};

use async_trait::async_trait;
use uuid::Uuid;

use super::{
    Attendance, Event, EventChanges, InsertOutcome, NewAttendance, NewEvent, NewRegistration,
    Profile, RecordStore, Registration, Role, StoreError,
};

#[derive(Default)]
struct Tables {
    profiles: HashMap<String, Profile>,
    events: HashMap<String, Event>,
    registrations: Vec<Registration>,
    attendance: Vec<Attendance>,
}

/// In-process record store. Conditional inserts check and write under one
/// lock, so pair uniqueness holds across concurrent callers.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    calls: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of store operations issued so far, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Makes every following operation fail with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn attendance_count(&self) -> usize {
        self.lock().attendance.len()
    }

    /// Inserts an event with a caller-chosen id.
    pub fn seed_event(&self, event: Event) {
        self.lock().events.insert(event.id.clone(), event);
    }

    pub fn seed_registration(&self, reg: Registration) {
        self.lock().registrations.push(reg);
    }

    fn enter(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // A panic while holding the lock leaves plain data behind; keep serving it.
        self.tables.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, StoreError> {
        Ok(self.enter()?.profiles.get(user_id).cloned())
    }

    async fn upsert_profile(&self, profile: Profile) -> Result<Profile, StoreError> {
        let mut t = self.enter()?;
        t.profiles.insert(profile.user_id.clone(), profile.clone());
        Ok(profile)
    }

    async fn set_role_by_email(
        &self,
        email: &str,
        role: Role,
    ) -> Result<Option<Profile>, StoreError> {
        let mut t = self.enter()?;
        let found = t
            .profiles
            .values_mut()
            .find(|p| p.email.as_deref() == Some(email));
        Ok(found.map(|p| {
            p.role = role;
            p.clone()
        }))
    }

    async fn insert_event(&self, event: NewEvent) -> Result<Event, StoreError> {
        let mut t = self.enter()?;
        let ev = Event {
            id: Uuid::new_v4().to_string(),
            name: event.name,
            date: event.date,
            location: event.location,
            organizer_id: event.organizer_id,
            restricted_branches: event.restricted_branches,
        };
        t.events.insert(ev.id.clone(), ev.clone());
        Ok(ev)
    }

    async fn update_event(
        &self,
        id: &str,
        changes: EventChanges,
    ) -> Result<Option<Event>, StoreError> {
        let mut t = self.enter()?;
        Ok(t.events.get_mut(id).map(|ev| {
            ev.name = changes.name;
            ev.date = changes.date;
            ev.location = changes.location;
            ev.restricted_branches = changes.restricted_branches;
            ev.clone()
        }))
    }

    async fn get_event(&self, id: &str) -> Result<Option<Event>, StoreError> {
        Ok(self.enter()?.events.get(id).cloned())
    }

    async fn list_events(
        &self,
        organizer_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Event>, StoreError> {
        let t = self.enter()?;
        let mut events: Vec<Event> = t
            .events
            .values()
            .filter(|e| organizer_id.map_or(true, |o| e.organizer_id == o))
            .cloned()
            .collect();
        events.sort_by(|a, b| b.date.cmp(&a.date));
        events.truncate(limit.max(0) as usize);
        Ok(events)
    }

    async fn insert_registration_if_absent(
        &self,
        reg: NewRegistration,
    ) -> Result<InsertOutcome<Registration>, StoreError> {
        let mut t = self.enter()?;
        if t
            .registrations
            .iter()
            .any(|r| r.user_id == reg.user_id && r.event_id == reg.event_id)
        {
            return Ok(InsertOutcome::AlreadyExists);
        }
        let row = Registration {
            id: Uuid::new_v4(),
            user_id: reg.user_id,
            event_id: reg.event_id,
            student_name: reg.student_name,
            student_roll: reg.student_roll,
            student_dept: reg.student_dept,
            registered_at: reg.registered_at,
        };
        t.registrations.push(row.clone());
        Ok(InsertOutcome::Inserted(row))
    }

    async fn find_registration(
        &self,
        user_id: &str,
        event_id: &str,
    ) -> Result<Option<Registration>, StoreError> {
        let t = self.enter()?;
        Ok(t.registrations
            .iter()
            .find(|r| r.user_id == user_id && r.event_id == event_id)
            .cloned())
    }

    async fn list_registrations_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Registration>, StoreError> {
        let t = self.enter()?;
        let mut rows: Vec<Registration> = t
            .registrations
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.registered_at.cmp(&a.registered_at));
        Ok(rows)
    }

    async fn insert_attendance_if_absent(
        &self,
        att: NewAttendance,
    ) -> Result<InsertOutcome<Attendance>, StoreError> {
        let mut t = self.enter()?;
        if t
            .attendance
            .iter()
            .any(|a| a.user_id == att.user_id && a.event_id == att.event_id)
        {
            return Ok(InsertOutcome::AlreadyExists);
        }
        let row = Attendance {
            id: Uuid::new_v4(),
            user_id: att.user_id,
            event_id: att.event_id,
            student_name: att.student_name,
            student_roll: att.student_roll,
            organizer_id: att.organizer_id,
            timestamp: att.timestamp,
        };
        t.attendance.push(row.clone());
        Ok(InsertOutcome::Inserted(row))
    }

    async fn find_attendance(
        &self,
        user_id: &str,
        event_id: &str,
    ) -> Result<Option<Attendance>, StoreError> {
        let t = self.enter()?;
        Ok(t.attendance
            .iter()
            .find(|a| a.user_id == user_id && a.event_id == event_id)
            .cloned())
    }

    async fn recent_attendance(
        &self,
        event_id: &str,
        limit: i64,
    ) -> Result<Vec<Attendance>, StoreError> {
        let t = self.enter()?;
        // Reverse insertion order first so equal timestamps list the newest write on top.
        let mut rows: Vec<Attendance> = t
            .attendance
            .iter()
            .rev()
            .filter(|a| a.event_id == event_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }
}
