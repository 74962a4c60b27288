pub mod http;
pub mod sync;

use async_trait::async_trait;
use chrono::NaiveDateTime;

#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn is_connected(&self, owner_id: i64) -> anyhow::Result<bool>;

    async fn create_event(
        &self,
        owner_id: i64,
        title: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> anyhow::Result<String>;

    async fn update_event(
        &self,
        owner_id: i64,
        event_id: &str,
        title: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> anyhow::Result<()>;

    async fn delete_event(&self, owner_id: i64, event_id: &str) -> anyhow::Result<()>;
}

pub struct DisconnectedCalendar;

#[async_trait]
impl CalendarProvider for DisconnectedCalendar {
    async fn is_connected(&self, _owner_id: i64) -> anyhow::Result<bool> {
        Ok(false)
    }

    async fn create_event(
        &self,
        _owner_id: i64,
        _title: &str,
        _start: NaiveDateTime,
        _end: NaiveDateTime,
    ) -> anyhow::Result<String> {
        anyhow::bail!("calendar integration is not configured")
    }

    async fn update_event(
        &self,
        _owner_id: i64,
        _event_id: &str,
        _title: &str,
        _start: NaiveDateTime,
        _end: NaiveDateTime,
    ) -> anyhow::Result<()> {
        anyhow::bail!("calendar integration is not configured")
    }

    async fn delete_event(&self, _owner_id: i64, _event_id: &str) -> anyhow::Result<()> {
        anyhow::bail!("calendar integration is not configured")
    }
}
