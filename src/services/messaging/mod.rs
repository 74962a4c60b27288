pub mod email;

use async_trait::async_trait;

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, to_email: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

pub struct LogSender;

#[async_trait]
impl NotificationSender for LogSender {
    async fn send(&self, to_email: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        tracing::info!(to = to_email, subject, body_len = body.len(), "notification (log only)");
        Ok(())
    }
}
