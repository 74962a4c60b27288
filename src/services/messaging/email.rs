use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;

use super::NotificationSender;

pub struct HttpEmailSender {
    api_url: String,
    api_key: String,
    from_address: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OutgoingEmail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl HttpEmailSender {
    pub fn new(api_url: String, api_key: String, from_address: String) -> Self {
        Self {
            api_url,
            api_key,
            from_address,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationSender for HttpEmailSender {
    async fn send(&self, to_email: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        self.client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&OutgoingEmail {
                from: &self.from_address,
                to: to_email,
                subject,
                text: body,
            })
            .send()
            .await
            .context("failed to send email")?
            .error_for_status()
            .context("email API returned error")?;

        Ok(())
    }
}
