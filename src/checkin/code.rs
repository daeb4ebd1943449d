use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;

use super::CheckInError;

/// Delimiter of the canonical ticket payload `{subject_id}:{event_id}`.
pub const DELIMITER: char = ':';

/// Identity pair carried by a ticket QR code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCode {
    pub subject_id: String,
    pub event_id: String,
}

impl ScanCode {
    pub fn new(subject_id: impl Into<String>, event_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            event_id: event_id.into(),
        }
    }

    /// Parses a scanned payload. The legacy `UserID:<id>-EventID:<id>` form is
    /// only recognised when `accept_legacy` is set.
    pub fn parse(raw: &str, accept_legacy: bool) -> Result<Self, CheckInError> {
        let raw = raw.trim();
        if let Some(code) = Self::parse_canonical(raw) {
            return Ok(code);
        }
        if accept_legacy {
            if let Some(code) = Self::parse_legacy(raw) {
                warn!(subject_id = %code.subject_id, event_id = %code.event_id, "legacy ticket payload accepted");
                return Ok(code);
            }
        }
        Err(CheckInError::MalformedCode)
    }

    fn parse_canonical(raw: &str) -> Option<Self> {
        let mut parts = raw.split(DELIMITER);
        let (subject, event) = (parts.next()?, parts.next()?);
        if parts.next().is_some() || subject.is_empty() || event.is_empty() {
            return None;
        }
        Some(Self::new(subject, event))
    }

    fn parse_legacy(raw: &str) -> Option<Self> {
        lazy_static! {
            static ref LEGACY_RE: Regex =
                Regex::new(r"^UserID:(?P<subject>[^:\s]+?)-EventID:(?P<event>[^:\s]+)$").unwrap();
        }
        let caps = LEGACY_RE.captures(raw)?;
        Some(Self::new(&caps["subject"], &caps["event"]))
    }
}

/// Renders the canonical payload, the only form new tickets carry.
impl fmt::Display for ScanCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.subject_id, DELIMITER, self.event_id)
    }
}
