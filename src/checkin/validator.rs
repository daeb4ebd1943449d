use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use serde::Serialize;
use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use super::{code::ScanCode, CheckInError};
use crate::{
    feed::LiveFeedHub,
    store::{Attendance, InsertOutcome, NewAttendance, RecordStore},
};

#[derive(Debug, Clone, Copy)]
pub struct ScanSettings {
    pub cooldown: Duration,
    pub accept_legacy_codes: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_millis(2500),
            accept_legacy_codes: false,
        }
    }
}

/// Where the scanner is in its decision chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Idle,
    Parsing,
    CheckingEventMatch,
    CheckingRegistration,
    /// Insert-if-absent on the pair; an existing row is the duplicate verdict.
    Committing,
    CoolingDown,
}

#[derive(Debug, Clone, Copy)]
enum ScannerState {
    Ready,
    Busy(ScanPhase),
    CoolingDown { rearm_at: Instant },
}

#[derive(Debug, Clone)]
pub struct Accepted {
    pub attendance: Attendance,
    pub message: String,
}

#[derive(Debug)]
pub enum ScanDisposition {
    /// Presented while a scan was in flight or cooling down. Nothing happened.
    Ignored,
    Completed(Result<Accepted, CheckInError>),
}

/// Check-in decision chain for one scanning device bound to one event.
///
/// Only one scan is evaluated at a time. After every outcome the validator
/// cools down for `settings.cooldown` and re-arms on the first scan presented
/// after that.
pub struct CheckInValidator {
    event_id: String,
    organizer_id: String,
    store: Arc<dyn RecordStore>,
    feed: LiveFeedHub,
    settings: ScanSettings,
    state: Mutex<ScannerState>,
}

impl CheckInValidator {
    pub fn new(
        event_id: impl Into<String>,
        organizer_id: impl Into<String>,
        store: Arc<dyn RecordStore>,
        feed: LiveFeedHub,
        settings: ScanSettings,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            organizer_id: organizer_id.into(),
            store,
            feed,
            settings,
            state: Mutex::new(ScannerState::Ready),
        }
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn settings(&self) -> ScanSettings {
        self.settings
    }

    pub fn phase(&self) -> ScanPhase {
        match *self.lock() {
            ScannerState::Ready => ScanPhase::Idle,
            ScannerState::Busy(phase) => phase,
            ScannerState::CoolingDown { rearm_at } if Instant::now() >= rearm_at => ScanPhase::Idle,
            ScannerState::CoolingDown { .. } => ScanPhase::CoolingDown,
        }
    }

    #[instrument(skip(self, raw), fields(event_id = %self.event_id))]
    pub async fn scan(&self, raw: &str) -> ScanDisposition {
        let Some(permit) = self.try_arm() else {
            return ScanDisposition::Ignored;
        };
        let outcome = self.evaluate(&permit, raw).await;
        match &outcome {
            Ok(accepted) => info!(
                user_id = %accepted.attendance.user_id,
                attendance_id = %accepted.attendance.id,
                "check-in accepted"
            ),
            Err(CheckInError::Store(e)) => error!(error = %e, "check-in failed on store"),
            Err(e) => info!(reason = e.reason(), "check-in rejected"),
        }
        drop(permit);
        ScanDisposition::Completed(outcome)
    }

    async fn evaluate(&self, permit: &ScanPermit<'_>, raw: &str) -> Result<Accepted, CheckInError> {
        permit.advance(ScanPhase::Parsing);
        let code = ScanCode::parse(raw, self.settings.accept_legacy_codes)?;

        permit.advance(ScanPhase::CheckingEventMatch);
        if code.event_id != self.event_id {
            return Err(CheckInError::WrongEvent);
        }

        permit.advance(ScanPhase::CheckingRegistration);
        let registration = self
            .store
            .find_registration(&code.subject_id, &self.event_id)
            .await
            .map_err(CheckInError::Store)?
            .ok_or(CheckInError::NotRegistered)?;

        permit.advance(ScanPhase::Committing);
        let new = NewAttendance::from_registration(
            &registration,
            &self.organizer_id,
            OffsetDateTime::now_utc(),
        );
        let attendance = match self
            .store
            .insert_attendance_if_absent(new)
            .await
            .map_err(CheckInError::Store)?
        {
            InsertOutcome::Inserted(a) => a,
            InsertOutcome::AlreadyExists => return Err(CheckInError::AlreadyCheckedIn),
        };

        // The push runs on its own task so it outlives an abandoned scan.
        let hub = self.feed.clone();
        let event_id = self.event_id.clone();
        let push = tokio::spawn(async move { hub.refresh(&event_id).await });
        if let Err(e) = push.await {
            warn!(error = %e, "feed refresh task failed");
        }

        Ok(Accepted {
            message: format!("Welcome {}!", first_name(&attendance.student_name)),
            attendance,
        })
    }

    fn try_arm(&self) -> Option<ScanPermit<'_>> {
        let mut state = self.lock();
        let ready = match *state {
            ScannerState::Ready => true,
            ScannerState::Busy(_) => false,
            ScannerState::CoolingDown { rearm_at } => Instant::now() >= rearm_at,
        };
        if !ready {
            return None;
        }
        *state = ScannerState::Busy(ScanPhase::Parsing);
        Some(ScanPermit { validator: self })
    }

    fn lock(&self) -> MutexGuard<'_, ScannerState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Held for the duration of one scan. Dropping it, including when the scan
/// future is abandoned, starts the cool-down.
struct ScanPermit<'a> {
    validator: &'a CheckInValidator,
}

impl ScanPermit<'_> {
    fn advance(&self, phase: ScanPhase) {
        *self.validator.lock() = ScannerState::Busy(phase);
    }
}

impl Drop for ScanPermit<'_> {
    fn drop(&mut self) {
        let rearm_at = Instant::now() + self.validator.settings.cooldown;
        *self.validator.lock() = ScannerState::CoolingDown { rearm_at };
    }
}

fn first_name(full: &str) -> &str {
    full.split_whitespace().next().unwrap_or(full)
}

impl std::fmt::Debug for CheckInValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckInValidator")
            .field("event_id", &self.event_id)
            .field("organizer_id", &self.organizer_id)
            .field("settings", &self.settings)
            .field("phase", &self.phase())
            .finish()
    }
}
