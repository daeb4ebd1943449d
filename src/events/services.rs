use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::{
    checkin::ScanCode,
    events::dto::Ticket,
    notify::{Notifier, RegistrationConfirmation},
    store::{
        Event, InsertOutcome, NewRegistration, Profile, RecordStore, Registration, StoreError,
    },
};

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("Complete your profile before registering")]
    ProfileIncomplete,

    #[error("Only for {}", .allowed.join(", "))]
    NotEligible { allowed: Vec<String> },

    #[error("Already registered!")]
    AlreadyRegistered,

    #[error("Event not found")]
    EventNotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Registers `student` for `event_id`: profile must be complete, the event
/// must admit the student's department, and each pair registers once. A new
/// registration is confirmed to the student's email; a failed confirmation
/// does not undo it.
pub async fn register_for_event(
    store: &dyn RecordStore,
    notifier: &dyn Notifier,
    student: &Profile,
    event_id: &str,
) -> Result<Registration, RegistrationError> {
    if !student.is_complete() {
        return Err(RegistrationError::ProfileIncomplete);
    }

    let event = store
        .get_event(event_id)
        .await?
        .ok_or(RegistrationError::EventNotFound)?;
    if !event.admits_department(student.department.as_deref()) {
        return Err(RegistrationError::NotEligible {
            allowed: event.restricted_branches,
        });
    }

    let new = NewRegistration {
        user_id: student.user_id.clone(),
        event_id: event.id.clone(),
        student_name: student.full_name.clone().unwrap_or_default(),
        student_roll: student.roll_no.clone().unwrap_or_default(),
        student_dept: student.department.clone(),
        registered_at: OffsetDateTime::now_utc(),
    };
    match store.insert_registration_if_absent(new).await? {
        InsertOutcome::Inserted(reg) => {
            info!(user_id = %reg.user_id, event_id = %reg.event_id, "registered");
            confirm(notifier, student, &event, &reg).await;
            Ok(reg)
        }
        InsertOutcome::AlreadyExists => Err(RegistrationError::AlreadyRegistered),
    }
}

async fn confirm(notifier: &dyn Notifier, student: &Profile, event: &Event, reg: &Registration) {
    let Some(to) = student.email.clone() else {
        debug!(user_id = %reg.user_id, "no email on profile; confirmation skipped");
        return;
    };
    let confirmation = RegistrationConfirmation {
        to,
        display_name: reg.student_name.clone(),
        event_name: event.name.clone(),
        event_date: event.date,
        event_location: event.location.clone(),
        ticket_code: ScanCode::new(&reg.user_id, &reg.event_id).to_string(),
    };
    if let Err(e) = notifier.registration_confirmed(&confirmation).await {
        warn!(
            error = %e,
            user_id = %reg.user_id,
            event_id = %reg.event_id,
            "registration confirmation failed"
        );
    }
}

/// The user's registrations as tickets. Registrations whose event has gone
/// away are skipped.
pub async fn list_tickets(store: &dyn RecordStore, user_id: &str) -> Result<Vec<Ticket>, StoreError> {
    let regs = store.list_registrations_for_user(user_id).await?;
    let mut tickets = Vec::with_capacity(regs.len());
    for reg in regs {
        let Some(event) = store.get_event(&reg.event_id).await? else {
            debug!(event_id = %reg.event_id, "ticket for missing event skipped");
            continue;
        };
        let checked_in = store.find_attendance(user_id, &event.id).await?.is_some();
        tickets.push(Ticket {
            code: ScanCode::new(&reg.user_id, &reg.event_id).to_string(),
            event_name: event.name,
            checked_in,
            registration: reg,
        });
    }
    Ok(tickets)
}
