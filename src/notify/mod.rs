//! Registration confirmations sent to students, carrying the event details
//! and the ticket payload they present at the door.

use async_trait::async_trait;
use time::{macros::format_description, OffsetDateTime};
use tracing::info;

pub mod relay;

pub use relay::RelayNotifier;

/// What a student is told after registering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationConfirmation {
    pub to: String,
    pub display_name: String,
    pub event_name: String,
    pub event_date: OffsetDateTime,
    pub event_location: String,
    /// Canonical QR payload of the ticket.
    pub ticket_code: String,
}

impl RegistrationConfirmation {
    pub fn subject(&self) -> String {
        format!("Confirmation for {}", self.event_name)
    }

    pub fn body(&self) -> String {
        let date = self
            .event_date
            .format(format_description!(
                "[year]-[month]-[day] [hour]:[minute] UTC[offset_hour sign:mandatory]:[offset_minute]"
            ))
            .unwrap_or_else(|_| self.event_date.to_string());
        format!(
            "Hi {name},\n\n\
             You have successfully registered for {event}.\n\n\
             Date: {date}\n\
             Location: {location}\n\n\
             Show this ticket code at the entry: {code}\n",
            name = self.display_name,
            event = self.event_name,
            location = self.event_location,
            code = self.ticket_code,
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("mail relay unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("mail relay answered {0}")]
    Rejected(reqwest::StatusCode),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn registration_confirmed(
        &self,
        confirmation: &RegistrationConfirmation,
    ) -> Result<(), NotifyError>;
}

/// Used when no relay is configured: the confirmation is only logged.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn registration_confirmed(
        &self,
        confirmation: &RegistrationConfirmation,
    ) -> Result<(), NotifyError> {
        info!(
            to = %confirmation.to,
            subject = %confirmation.subject(),
            "no mail relay configured; confirmation not sent"
        );
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Keeps every confirmation it is handed; optionally fails after recording.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<RegistrationConfirmation>>,
        pub fail: bool,
    }

    impl RecordingNotifier {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn sent(&self) -> Vec<RegistrationConfirmation> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn registration_confirmed(
            &self,
            confirmation: &RegistrationConfirmation,
        ) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(confirmation.clone());
            if self.fail {
                return Err(NotifyError::Rejected(reqwest::StatusCode::BAD_GATEWAY));
            }
            Ok(())
        }
    }
}
