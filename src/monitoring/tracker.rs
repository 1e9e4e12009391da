//! In-memory reachability state per target.
//!
//! State lives only as long as the process. After a restart every target is
//! `Unknown` again and its first observation never notifies.
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::db::models::TargetId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReachabilityState {
    Unknown,
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    FirstObservation,
    BecameOnline,
    BecameOffline,
}

impl Transition {
    /// Only genuine changes are worth telling the owner about.
    pub fn should_notify(self) -> bool {
        matches!(self, Transition::BecameOnline | Transition::BecameOffline)
    }
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    online: bool,
    checked_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ReachabilityTracker {
    states: Mutex<HashMap<TargetId, Observation>>,
}

impl ReachabilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TargetId, Observation>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a probe result and reports what changed.
    pub fn observe(&self, target_id: TargetId, reachable: bool) -> Transition {
        self.observe_at(target_id, reachable, Utc::now())
    }

    pub fn observe_at(
        &self,
        target_id: TargetId,
        reachable: bool,
        checked_at: DateTime<Utc>,
    ) -> Transition {
        let mut states = self.lock();
        let current = Observation {
            online: reachable,
            checked_at,
        };
        match states.insert(target_id, current) {
            None => Transition::FirstObservation,
            Some(previous) if previous.online == reachable => Transition::None,
            Some(_) if reachable => Transition::BecameOnline,
            Some(_) => Transition::BecameOffline,
        }
    }

    pub fn state(&self, target_id: TargetId) -> ReachabilityState {
        match self.lock().get(&target_id) {
            None => ReachabilityState::Unknown,
            Some(obs) if obs.online => ReachabilityState::Online,
            Some(_) => ReachabilityState::Offline,
        }
    }

    pub fn last_checked_at(&self, target_id: TargetId) -> Option<DateTime<Utc>> {
        self.lock().get(&target_id).map(|obs| obs.checked_at)
    }

    /// Drops entries for targets that are no longer monitored.
    pub fn retain(&self, live: &HashSet<TargetId>) -> usize {
        let mut states = self.lock();
        let before = states.len();
        states.retain(|id, _| live.contains(id));
        before - states.len()
    }
}
