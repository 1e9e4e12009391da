//! The periodic monitoring cycle.
//!
//! One cycle fetches targets, validates and probes them with bounded
//! concurrency, feeds results to the tracker and delivers one notification per
//! genuine transition. Cycles never overlap.
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::MonitoringConfig;
use crate::db::models::MonitorTarget;
use crate::db::{MonitoringStore, StoreError};
use crate::notifications::{NotificationEvent, Notifier};

use super::probe::{ProbeTarget, Prober};
use super::safety::{Rejection, SafetyPolicy};
use super::tracker::ReachabilityTracker;

#[derive(Error, Debug)]
pub enum CycleError {
    #[error("Failed to fetch monitoring targets: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverPhase {
    Idle,
    Running,
    Cancelling,
}

#[derive(Debug, Clone)]
pub struct MonitoringSettings {
    pub interval: Duration,
    pub probe_timeout: Duration,
    pub concurrency: usize,
    /// How long in-flight probes may keep running after shutdown is requested.
    pub grace: Duration,
}

impl MonitoringSettings {
    pub fn from_config(config: &MonitoringConfig) -> Self {
        Self {
            interval: config.interval(),
            probe_timeout: config.probe_timeout(),
            concurrency: config.concurrency.max(1),
            grace: config.shutdown_grace(),
        }
    }
}

/// Counters for one completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub total: usize,
    pub probed: usize,
    pub skipped: usize,
    pub online: usize,
    pub offline: usize,
    pub notified: usize,
    pub delivery_failures: usize,
    /// Probes abandoned because of shutdown, including never-started ones.
    pub discarded: usize,
}

type ProbeOutcome = Option<(MonitorTarget, bool)>;

pub struct MonitoringService {
    store: Arc<dyn MonitoringStore>,
    notifier: Arc<dyn Notifier>,
    prober: Arc<dyn Prober>,
    safety: SafetyPolicy,
    tracker: ReachabilityTracker,
    settings: MonitoringSettings,
    phase: watch::Sender<DriverPhase>,
}

impl MonitoringService {
    pub fn new(
        store: Arc<dyn MonitoringStore>,
        notifier: Arc<dyn Notifier>,
        prober: Arc<dyn Prober>,
        safety: SafetyPolicy,
        settings: MonitoringSettings,
    ) -> Self {
        let (phase, _) = watch::channel(DriverPhase::Idle);
        Self {
            store,
            notifier,
            prober,
            safety,
            tracker: ReachabilityTracker::new(),
            settings,
            phase,
        }
    }

    pub fn tracker(&self) -> &ReachabilityTracker {
        &self.tracker
    }

    pub fn phase(&self) -> DriverPhase {
        *self.phase.borrow()
    }

    /// Runs cycles every `interval` until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.settings.interval.as_secs(),
            concurrency = self.settings.concurrency,
            "Monitoring driver started."
        );

        while !shutdown.is_cancelled() {
            match self.run_cycle(&shutdown).await {
                Ok(report) => info!(
                    targets = report.total,
                    probed = report.probed,
                    skipped = report.skipped,
                    online = report.online,
                    offline = report.offline,
                    notified = report.notified,
                    delivery_failures = report.delivery_failures,
                    discarded = report.discarded,
                    "Monitoring cycle finished."
                ),
                Err(e) => error!(error = %e, "Monitoring cycle failed."),
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = sleep(self.settings.interval) => {}
            }
        }

        info!("Monitoring driver stopped.");
    }

    /// Runs exactly one cycle. Returns once every result has been applied or
    /// discarded and every notification has been attempted.
    pub async fn run_cycle(&self, shutdown: &CancellationToken) -> Result<CycleReport, CycleError> {
        self.phase.send_replace(DriverPhase::Running);
        let result = self.cycle(shutdown).await;
        self.phase.send_replace(DriverPhase::Idle);
        result
    }

    /// Picks the address to probe and checks it. A URL wins over an IP.
    fn resolve(&self, target: &MonitorTarget) -> Result<ProbeTarget, Rejection> {
        if let Some(url) = target.url() {
            self.safety.validate_url(url).map(ProbeTarget::Url)
        } else if let Some(ip) = target.ip() {
            self.safety.validate_ip(ip).map(ProbeTarget::Ip)
        } else {
            Err(Rejection::Empty)
        }
    }

    async fn cycle(&self, shutdown: &CancellationToken) -> Result<CycleReport, CycleError> {
        let targets = self.store.list_monitorable_targets().await?;

        let live: HashSet<_> = targets.iter().map(|t| t.id).collect();
        let pruned = self.tracker.retain(&live);
        if pruned > 0 {
            debug!(pruned, "Dropped state of targets no longer monitored.");
        }

        let mut report = CycleReport {
            total: targets.len(),
            ..CycleReport::default()
        };

        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency));
        let mut probes: JoinSet<ProbeOutcome> = JoinSet::new();

        for target in targets {
            let probe_target = match self.resolve(&target) {
                Ok(probe_target) => probe_target,
                Err(reason) => {
                    warn!(
                        target_id = target.id,
                        owner_id = target.owner_id,
                        reason = %reason,
                        "Skipping unsafe target."
                    );
                    report.skipped += 1;
                    continue;
                }
            };

            let prober = Arc::clone(&self.prober);
            let semaphore = Arc::clone(&semaphore);
            let token = shutdown.clone();
            let probe_timeout = self.settings.probe_timeout;

            probes.spawn(async move {
                // No new probe starts once shutdown is requested.
                let _permit = tokio::select! {
                    biased;
                    _ = token.cancelled() => return None,
                    permit = semaphore.acquire_owned() => permit.ok()?,
                };
                let reachable = prober.probe(&probe_target, probe_timeout).await;
                debug!(target_id = target.id, address = %probe_target, reachable, "Probe finished.");
                Some((target, reachable))
            });
        }

        let mut events = Vec::new();
        let mut deadline: Option<Instant> = None;

        loop {
            let joined = match deadline {
                None => tokio::select! {
                    biased;
                    joined = probes.join_next() => joined,
                    _ = shutdown.cancelled() => {
                        self.phase.send_replace(DriverPhase::Cancelling);
                        deadline = Some(Instant::now() + self.settings.grace);
                        info!(in_flight = probes.len(), "Shutdown requested, waiting for in-flight probes.");
                        continue;
                    }
                },
                Some(at) => match timeout_at(at, probes.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => break,
                },
            };

            let Some(joined) = joined else { break };
            match joined {
                Ok(Some((target, reachable))) => {
                    report.probed += 1;
                    if reachable {
                        report.online += 1;
                    } else {
                        report.offline += 1;
                    }

                    let transition = self.tracker.observe(target.id, reachable);
                    if transition.should_notify() {
                        info!(
                            target_id = target.id,
                            owner_id = target.owner_id,
                            ?transition,
                            "Reachability changed."
                        );
                        events.push(NotificationEvent::reachability_changed(&target, reachable));
                    }
                }
                Ok(None) => report.discarded += 1,
                Err(e) => error!(error = %e, "Probe task failed."),
            }
        }

        if !probes.is_empty() {
            report.discarded += probes.len();
            warn!(discarded = probes.len(), "Discarding probes still running after the grace period.");
            probes.shutdown().await;
        }

        self.deliver(events, shutdown, &mut report).await;
        Ok(report)
    }

    async fn deliver(
        &self,
        events: Vec<NotificationEvent>,
        shutdown: &CancellationToken,
        report: &mut CycleReport,
    ) {
        for (index, event) in events.iter().enumerate() {
            if shutdown.is_cancelled() {
                warn!(
                    pending = events.len() - index,
                    "Shutdown requested, dropping undelivered notifications."
                );
                break;
            }
            match self.notifier.notify(event).await {
                Ok(()) => report.notified += 1,
                Err(e) => {
                    report.delivery_failures += 1;
                    warn!(owner_id = event.owner_id, error = %e, "Failed to deliver status notification.");
                }
            }
        }
    }
}
