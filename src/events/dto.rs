use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::store::Registration;

/// Body of event create and edit.
#[derive(Debug, Deserialize)]
pub struct EventRequest {
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub location: String,
    #[serde(default)]
    pub restricted_branches: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListEventsQuery {
    #[serde(default)]
    pub mine: bool,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// A registration as a ticket the student can present at the door.
#[derive(Debug, Serialize)]
pub struct Ticket {
    pub event_name: String,
    /// Payload to render as the ticket's QR code.
    pub code: String,
    pub checked_in: bool,
    #[serde(flatten)]
    pub registration: Registration,
}
