use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{validator::ScanDisposition, ScanPhase, ScanSession};
use crate::store::Attendance;

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Accepted,
    Rejected,
    Ignored,
}

/// What the scanning device shows after a scan. The device keeps the result
/// on screen and holds further submissions for `cooldown_ms`.
#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub status: ScanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendance: Option<Attendance>,
    pub cooldown_ms: u64,
}

impl ScanResponse {
    pub fn new(disposition: ScanDisposition, cooldown_ms: u64) -> Self {
        let (status, reason, message, attendance) = match disposition {
            ScanDisposition::Ignored => (ScanStatus::Ignored, None, None, None),
            ScanDisposition::Completed(Ok(a)) => {
                (ScanStatus::Accepted, None, Some(a.message), Some(a.attendance))
            }
            ScanDisposition::Completed(Err(e)) => (
                ScanStatus::Rejected,
                Some(e.reason()),
                Some(e.to_string()),
                None,
            ),
        };
        Self {
            status,
            reason,
            message,
            attendance,
            cooldown_ms,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub event_id: String,
    pub event_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub opened_at: OffsetDateTime,
    pub phase: ScanPhase,
    pub cooldown_ms: u64,
    pub legacy_codes: bool,
}

impl From<&ScanSession> for SessionResponse {
    fn from(s: &ScanSession) -> Self {
        let settings = s.validator().settings();
        Self {
            session_id: s.id,
            event_id: s.event.id.clone(),
            event_name: s.event.name.clone(),
            opened_at: s.opened_at,
            phase: s.validator().phase(),
            cooldown_ms: settings.cooldown.as_millis() as u64,
            legacy_codes: settings.accept_legacy_codes,
        }
    }
}
