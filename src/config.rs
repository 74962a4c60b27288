use std::env;
use std::time::Duration;

const MAX_REMINDER_LEAD_HOURS: i64 = 24 * 30;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub calendar_api_url: String,
    pub calendar_api_token: String,
    pub calendar_timeout: Duration,
    pub email_api_url: String,
    pub email_api_key: String,
    pub email_from: String,
    pub reminder_tick: Duration,
    pub reminder_lead_hours: i64,
    pub reminder_tolerance_hours: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: "slotbook.db".to_string(),
            calendar_api_url: String::new(),
            calendar_api_token: String::new(),
            calendar_timeout: Duration::from_secs(10),
            email_api_url: String::new(),
            email_api_key: String::new(),
            email_from: "no-reply@slotbook.local".to_string(),
            reminder_tick: Duration::from_secs(3600),
            reminder_lead_hours: 24,
            reminder_tolerance_hours: 1,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: parsed("PORT").unwrap_or(defaults.port),
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            calendar_api_url: env::var("CALENDAR_API_URL").unwrap_or_default(),
            calendar_api_token: env::var("CALENDAR_API_TOKEN").unwrap_or_default(),
            calendar_timeout: parsed("CALENDAR_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.calendar_timeout),
            email_api_url: env::var("EMAIL_API_URL").unwrap_or_default(),
            email_api_key: env::var("EMAIL_API_KEY").unwrap_or_default(),
            email_from: env::var("EMAIL_FROM").unwrap_or(defaults.email_from),
            reminder_tick: parsed("REMINDER_TICK_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.reminder_tick),
            reminder_lead_hours: parsed("REMINDER_LEAD_HOURS")
                .unwrap_or(defaults.reminder_lead_hours),
            reminder_tolerance_hours: parsed("REMINDER_TOLERANCE_HOURS")
                .unwrap_or(defaults.reminder_tolerance_hours),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.reminder_tick >= Duration::from_secs(1),
            "REMINDER_TICK_SECS must be at least 1"
        );
        anyhow::ensure!(
            (1..=MAX_REMINDER_LEAD_HOURS).contains(&self.reminder_lead_hours),
            "REMINDER_LEAD_HOURS must be between 1 and {MAX_REMINDER_LEAD_HOURS}"
        );
        anyhow::ensure!(
            (1..=self.reminder_lead_hours).contains(&self.reminder_tolerance_hours),
            "REMINDER_TOLERANCE_HOURS must be between 1 and REMINDER_LEAD_HOURS"
        );
        anyhow::ensure!(
            self.calendar_timeout > Duration::ZERO,
            "CALENDAR_TIMEOUT_SECS must be at least 1"
        );
        Ok(())
    }
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
