use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::CalendarProvider;

pub struct HttpCalendarProvider {
    base_url: String,
    api_token: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct EventBody<'a> {
    title: &'a str,
    description: String,
    start: NaiveDateTime,
    end: NaiveDateTime,
}

#[derive(Deserialize)]
struct ConnectionStatus {
    connected: bool,
}

#[derive(Deserialize)]
struct CreatedEvent {
    id: String,
}

impl HttpCalendarProvider {
    pub fn new(base_url: String, api_token: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
            client: reqwest::Client::new(),
        }
    }

    fn events_url(&self, owner_id: i64) -> String {
        format!("{}/calendars/{owner_id}/events", self.base_url)
    }
}

#[async_trait]
impl CalendarProvider for HttpCalendarProvider {
    async fn is_connected(&self, owner_id: i64) -> anyhow::Result<bool> {
        let url = format!("{}/calendars/{owner_id}/connection", self.base_url);
        let status: ConnectionStatus = self
            .client
            .get(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .context("failed to query calendar connection")?
            .error_for_status()
            .context("calendar API returned error")?
            .json()
            .await
            .context("malformed calendar connection response")?;
        Ok(status.connected)
    }

    async fn create_event(
        &self,
        owner_id: i64,
        title: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> anyhow::Result<String> {
        let created: CreatedEvent = self
            .client
            .post(self.events_url(owner_id))
            .bearer_auth(&self.api_token)
            .json(&EventBody {
                title,
                description: format!("Booking - {title}"),
                start,
                end,
            })
            .send()
            .await
            .context("failed to create calendar event")?
            .error_for_status()
            .context("calendar API returned error")?
            .json()
            .await
            .context("malformed calendar event response")?;
        Ok(created.id)
    }

    async fn update_event(
        &self,
        owner_id: i64,
        event_id: &str,
        title: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> anyhow::Result<()> {
        self.client
            .put(format!("{}/{event_id}", self.events_url(owner_id)))
            .bearer_auth(&self.api_token)
            .json(&EventBody {
                title,
                description: format!("Booking - {title}"),
                start,
                end,
            })
            .send()
            .await
            .context("failed to update calendar event")?
            .error_for_status()
            .context("calendar API returned error")?;
        Ok(())
    }

    async fn delete_event(&self, owner_id: i64, event_id: &str) -> anyhow::Result<()> {
        self.client
            .delete(format!("{}/{event_id}", self.events_url(owner_id)))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .context("failed to delete calendar event")?
            .error_for_status()
            .context("calendar API returned error")?;
        Ok(())
    }
}
