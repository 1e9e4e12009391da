//! Read interfaces the monitoring and reminder drivers need from the record
//! store, plus a SQLite implementation.

pub mod models;
pub mod sqlite;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use models::{DueTarget, MonitorTarget, OwnerId, ReminderSubscription};

pub use sqlite::SqliteStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait MonitoringStore: Send + Sync {
    /// Targets with monitoring enabled and a usable address.
    async fn list_monitorable_targets(&self) -> Result<Vec<MonitorTarget>, StoreError>;
}

#[async_trait]
pub trait ReminderStore: Send + Sync {
    async fn list_subscriptions(&self) -> Result<Vec<ReminderSubscription>, StoreError>;

    /// Targets of `owner_id` expiring within `[from, until]`, both inclusive,
    /// ordered by expiry date.
    async fn list_due_targets(
        &self,
        owner_id: OwnerId,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<DueTarget>, StoreError>;
}
