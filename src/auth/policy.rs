//! Role-based authorization, evaluated in one place for every route.

use axum::http::StatusCode;
use tracing::warn;

use crate::store::{Event, Profile, Role};

#[derive(Debug, Clone, Copy)]
pub enum Capability<'a> {
    CreateEvent,
    EditEvent(&'a Event),
    /// Run check-in or read the attendance of this event.
    ScanEvent(&'a Event),
    RegisterForEvent,
    ManageRoles,
}

impl Capability<'_> {
    fn action(&self) -> &'static str {
        match self {
            Capability::CreateEvent => "create events",
            Capability::EditEvent(_) => "edit this event",
            Capability::ScanEvent(_) => "check in attendees for this event",
            Capability::RegisterForEvent => "register for events",
            Capability::ManageRoles => "manage roles",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{role} may not {action}")]
pub struct Forbidden {
    pub role: Role,
    pub action: &'static str,
}

pub fn authorize(actor: &Profile, cap: Capability<'_>) -> Result<(), Forbidden> {
    let staff = matches!(actor.role, Role::Faculty | Role::SuperAdmin);
    let allowed = match cap {
        Capability::CreateEvent => staff || actor.role == Role::Organizer,
        Capability::EditEvent(event) | Capability::ScanEvent(event) => {
            staff || (actor.role == Role::Organizer && event.organizer_id == actor.user_id)
        }
        Capability::RegisterForEvent => actor.role == Role::Student,
        Capability::ManageRoles => staff,
    };
    if allowed {
        Ok(())
    } else {
        Err(Forbidden {
            role: actor.role,
            action: cap.action(),
        })
    }
}

/// [`authorize`] mapped to the handler error shape.
pub fn require(actor: &Profile, cap: Capability<'_>) -> Result<(), (StatusCode, String)> {
    authorize(actor, cap).map_err(|e| {
        warn!(user_id = %actor.user_id, error = %e, "forbidden");
        (StatusCode::FORBIDDEN, e.to_string())
    })
}
