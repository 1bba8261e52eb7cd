use crate::config::toml_config::TwilioConfig;
use crate::domain::model::{CallId, MessageId, PhoneNumber};
use crate::domain::ports::Notifier;
use crate::utils::error::{NotifyError, WatchError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ResourceCreated {
    sid: Option<String>,
}

/// Texts and calls through the Twilio REST API.
#[derive(Debug, Clone)]
pub struct TwilioNotifier {
    client: Client,
    config: TwilioConfig,
}

impl TwilioNotifier {
    /// `timeout` bounds each API request, so a hung request ends its dispatch task.
    pub fn new(config: TwilioConfig, timeout: Duration) -> Result<Self, WatchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, resource: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/{}.json",
            self.config.api_base().trim_end_matches('/'),
            self.config.account_sid,
            resource
        )
    }

    async fn create(&self, resource: &str, form: &[(&str, &str)]) -> Result<String, NotifyError> {
        let response = self
            .client
            .post(self.endpoint(resource))
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let created: ResourceCreated = response.json().await?;
        created.sid.ok_or(NotifyError::MissingSid)
    }
}

#[async_trait]
impl Notifier for TwilioNotifier {
    async fn send_text(
        &self,
        message: &str,
        contact: &PhoneNumber,
    ) -> Result<MessageId, NotifyError> {
        let form = [
            ("Body", message),
            ("From", self.config.from_number.as_str()),
            ("To", contact.as_str()),
        ];
        self.create("Messages", &form).await.map(MessageId)
    }

    async fn place_call(&self, contact: &PhoneNumber) -> Result<CallId, NotifyError> {
        let form = [
            ("Url", self.config.voice_url.as_str()),
            ("From", self.config.from_number.as_str()),
            ("To", contact.as_str()),
        ];
        self.create("Calls", &form).await.map(CallId)
    }
}
