use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::PaymentStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub booking_id: i64,
    pub amount: f64,
    pub status: PaymentStatus,
    pub created_at: NaiveDateTime,
}
