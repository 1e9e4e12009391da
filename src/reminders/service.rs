use std::sync::Arc;

use chrono::{Days, Local, NaiveDate, NaiveTime};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{ConfigError, ReminderConfig};
use crate::db::{ReminderStore, StoreError};
use crate::notifications::{NotificationEvent, Notifier};

use super::schedule::{delay_until, following_run, next_run_after};

#[derive(Debug, Clone)]
pub struct ReminderSettings {
    /// Local wall-clock time of the daily run.
    pub at: NaiveTime,
    /// Run once right after start to catch up on downtime.
    pub run_on_startup: bool,
}

impl ReminderSettings {
    pub fn from_config(config: &ReminderConfig) -> Result<Self, ConfigError> {
        let at = NaiveTime::from_hms_opt(config.hour, config.minute, 0).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "reminder time {:02}:{:02} is not a valid time of day",
                config.hour, config.minute
            ))
        })?;
        Ok(Self {
            at,
            run_on_startup: config.run_on_startup,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReminderReport {
    pub subscriptions: usize,
    pub sent: usize,
    /// Subscribers with nothing due.
    pub idle: usize,
    pub failures: usize,
}

pub struct ReminderService {
    store: Arc<dyn ReminderStore>,
    notifier: Arc<dyn Notifier>,
    settings: ReminderSettings,
}

impl ReminderService {
    pub fn new(
        store: Arc<dyn ReminderStore>,
        notifier: Arc<dyn Notifier>,
        settings: ReminderSettings,
    ) -> Self {
        Self {
            store,
            notifier,
            settings,
        }
    }

    /// Runs the startup catch-up, then the daily trigger until `shutdown`.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(at = %self.settings.at, "Reminder scheduler started.");

        if self.settings.run_on_startup {
            self.run_logged().await;
        }

        let mut next = next_run_after(Local::now().naive_local(), self.settings.at);
        loop {
            let delay = delay_until(&Local::now(), next);
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = sleep(delay) => self.run_logged().await,
            }
            next = following_run(next, Local::now().naive_local(), self.settings.at);
        }

        info!("Reminder scheduler stopped.");
    }

    async fn run_logged(&self) {
        match self.run_once(Local::now().date_naive()).await {
            Ok(report) => info!(
                subscriptions = report.subscriptions,
                sent = report.sent,
                idle = report.idle,
                failures = report.failures,
                "Reminder run finished."
            ),
            Err(e) => error!(error = %e, "Reminder run failed."),
        }
    }

    /// Sends one aggregate reminder to every subscriber with targets expiring
    /// within `[today, today + horizon]`.
    pub async fn run_once(&self, today: NaiveDate) -> Result<ReminderReport, StoreError> {
        let subscriptions = self.store.list_subscriptions().await?;
        let mut report = ReminderReport {
            subscriptions: subscriptions.len(),
            ..ReminderReport::default()
        };

        for subscription in subscriptions {
            let owner_id = subscription.owner_id;
            let horizon = Days::new(subscription.horizon_days.max(0).unsigned_abs());
            let until = today.checked_add_days(horizon).unwrap_or(NaiveDate::MAX);

            let items = match self.store.list_due_targets(owner_id, today, until).await {
                Ok(items) => items,
                Err(e) => {
                    report.failures += 1;
                    error!(owner_id, error = %e, "Failed to load due targets.");
                    continue;
                }
            };
            if items.is_empty() {
                report.idle += 1;
                continue;
            }

            let count = items.len();
            let event = NotificationEvent::payment_due(owner_id, today, items);
            match self.notifier.notify(&event).await {
                Ok(()) => {
                    report.sent += 1;
                    info!(owner_id, items = count, "Payment reminder sent.");
                }
                Err(e) => {
                    report.failures += 1;
                    warn!(owner_id, error = %e, "Failed to deliver payment reminder.");
                }
            }
        }

        Ok(report)
    }
}
