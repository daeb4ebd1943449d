use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, instrument};

use super::{Notifier, NotifyError, RegistrationConfirmation};

/// Posts confirmations to an HTTP mail relay as `{to, subject, message}`.
#[derive(Debug, Clone)]
pub struct RelayNotifier {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct RelayMessage {
    to: String,
    subject: String,
    message: String,
}

impl From<&RegistrationConfirmation> for RelayMessage {
    fn from(c: &RegistrationConfirmation) -> Self {
        Self {
            to: c.to.clone(),
            subject: c.subject(),
            message: c.body(),
        }
    }
}

impl RelayNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for RelayNotifier {
    #[instrument(skip(self, confirmation), fields(to = %confirmation.to))]
    async fn registration_confirmed(
        &self,
        confirmation: &RegistrationConfirmation,
    ) -> Result<(), NotifyError> {
        let res = self
            .client
            .post(&self.url)
            .json(&RelayMessage::from(confirmation))
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status));
        }
        debug!(%status, "confirmation relayed");
        Ok(())
    }
}
