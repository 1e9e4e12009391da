use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub type TargetId = i64;
/// Owner identity; doubles as the Telegram chat id for delivery.
pub type OwnerId = i64;

/// A server with monitoring enabled and at least one address.
/// Snapshot of a `servers` row, read once per cycle.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MonitorTarget {
    pub id: TargetId,
    pub owner_id: OwnerId,
    pub name: String,
    pub hosting: String,
    pub ip: Option<String>,
    pub url: Option<String>,
}

impl MonitorTarget {
    pub fn ip(&self) -> Option<&str> {
        non_empty(self.ip.as_deref())
    }

    pub fn url(&self) -> Option<&str> {
        non_empty(self.url.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Reminder preferences of one owner.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReminderSubscription {
    pub owner_id: OwnerId,
    pub horizon_days: i64,
    /// Preferred time of day (`HH:MM`). Informational only; the daily trigger
    /// time comes from the configuration.
    pub notify_time: String,
}

/// A server whose payment falls due within a reminder horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DueTarget {
    pub name: String,
    pub hosting: String,
    pub expiry_date: NaiveDate,
    pub price: f64,
    pub currency: String,
}

/// Input for inserting a server row.
#[derive(Debug, Clone)]
pub struct NewServer {
    pub owner_id: OwnerId,
    pub name: String,
    pub hosting: String,
    pub ip: Option<String>,
    pub url: Option<String>,
    pub expiry_date: NaiveDate,
    pub price: f64,
    pub currency: String,
    pub payment_period: String,
    pub is_monitoring: bool,
}

impl NewServer {
    pub fn new(owner_id: OwnerId, name: &str, expiry_date: NaiveDate) -> Self {
        Self {
            owner_id,
            name: name.to_string(),
            hosting: "unknown".to_string(),
            ip: None,
            url: None,
            expiry_date,
            price: 0.0,
            currency: "RUB".to_string(),
            payment_period: "monthly".to_string(),
            is_monitoring: false,
        }
    }
}
