//! QR check-in: ticket payload parsing, the per-device validator and the
//! registry of armed scanning sessions.

use axum::Router;

use crate::{state::AppState, store::StoreError};

pub mod code;
mod dto;
pub mod handlers;
pub mod session;
pub mod validator;

pub use code::ScanCode;
pub use session::{spawn_reaper, ScanSession, ScanSessions};
pub use validator::{Accepted, CheckInValidator, ScanDisposition, ScanPhase, ScanSettings};

/// Why a scan was turned away. Display strings are what the operator sees.
#[derive(Debug, thiserror::Error)]
pub enum CheckInError {
    #[error("Invalid Code")]
    MalformedCode,

    #[error("Wrong Event")]
    WrongEvent,

    #[error("Not Registered")]
    NotRegistered,

    #[error("Already Scanned")]
    AlreadyCheckedIn,

    #[error("DB Error")]
    Store(#[source] StoreError),
}

impl CheckInError {
    /// Stable machine-readable code.
    pub fn reason(&self) -> &'static str {
        match self {
            CheckInError::MalformedCode => "malformed_code",
            CheckInError::WrongEvent => "wrong_event",
            CheckInError::NotRegistered => "not_registered",
            CheckInError::AlreadyCheckedIn => "already_checked_in",
            CheckInError::Store(_) => "store_error",
        }
    }
}

pub fn router() -> Router<AppState> {
    handlers::session_routes()
}
