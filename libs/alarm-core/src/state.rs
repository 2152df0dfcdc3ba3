//! Alarm state machine
//!
//! Process-wide `armed` / `triggered` flags behind a single lock. Every
//! trigger opens a new episode and schedules one auto-reset task; the task
//! handle lives next to the state so a later trigger, arm or cancel can
//! supersede it deterministically.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Reference auto-reset delay after a trigger
pub const DEFAULT_AUTO_RESET: Duration = Duration::from_secs(10);

/// Snapshot of the alarm flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmStatus {
    pub armed: bool,
    pub triggered: bool,
}

/// Named view over [`AlarmStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmPhase {
    Idle,
    Armed,
    Triggered,
}

impl AlarmStatus {
    pub fn phase(&self) -> AlarmPhase {
        match (self.armed, self.triggered) {
            (_, true) => AlarmPhase::Triggered,
            (true, false) => AlarmPhase::Armed,
            (false, false) => AlarmPhase::Idle,
        }
    }
}

struct Inner {
    status: AlarmStatus,
    /// Bumped on every trigger, arm and cancel; a reset only applies to its own episode
    episode: u64,
    pending_reset: Option<JoinHandle<()>>,
}

impl Inner {
    fn supersede_reset(&mut self) {
        self.episode = self.episode.wrapping_add(1);
        if let Some(handle) = self.pending_reset.take() {
            handle.abort();
        }
    }
}

/// Shared handle to the alarm state
///
/// Cloning is cheap; all clones observe and mutate the same state.
#[derive(Clone)]
pub struct AlarmStateMachine {
    inner: Arc<Mutex<Inner>>,
    reset_delay: Duration,
}

impl AlarmStateMachine {
    pub fn new(reset_delay: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                status: AlarmStatus::default(),
                episode: 0,
                pending_reset: None,
            })),
            reset_delay,
        }
    }

    /// Copy of the current flags
    pub fn snapshot(&self) -> AlarmStatus {
        self.inner.lock().status
    }

    /// Arm for `duration_secs`; zero behaves as [`cancel`](Self::cancel)
    pub fn arm(&self, duration_secs: u32) {
        if duration_secs == 0 {
            self.cancel();
            return;
        }

        let mut inner = self.inner.lock();
        inner.supersede_reset();
        inner.status = AlarmStatus {
            armed: true,
            triggered: false,
        };
        info!("Alarm armed for {}s", duration_secs);
    }

    /// Back to idle from any state
    pub fn cancel(&self) {
        let mut inner = self.inner.lock();
        inner.supersede_reset();
        inner.status = AlarmStatus::default();
        info!("Alarm canceled");
    }

    /// Mark the alarm as fired and (re)start the auto-reset countdown
    pub fn observe_trigger(&self) {
        let mut inner = self.inner.lock();
        self.trigger_locked(&mut inner);
    }

    /// Apply an inbound status event atomically
    ///
    /// `active` overwrites `armed` when present. `triggered == Some(true)` acts
    /// as [`observe_trigger`](Self::observe_trigger); `Some(false)` and `None`
    /// leave `triggered` to the auto-reset.
    pub fn observe_status(&self, active: Option<bool>, triggered: Option<bool>) {
        let mut inner = self.inner.lock();
        if let Some(active) = active {
            inner.status.armed = active;
        }
        if triggered == Some(true) {
            self.trigger_locked(&mut inner);
        }
        debug!(
            "Alarm status: armed={} triggered={}",
            inner.status.armed, inner.status.triggered
        );
    }

    /// Abort any pending auto-reset
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        if let Some(handle) = inner.pending_reset.take() {
            handle.abort();
            debug!("Pending auto-reset aborted");
        }
    }

    fn trigger_locked(&self, inner: &mut Inner) {
        inner.supersede_reset();
        inner.status.triggered = true;

        let episode = inner.episode;
        let delay = self.reset_delay;
        let weak: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);

        inner.pending_reset = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // State already gone: nothing to reset
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let mut inner = shared.lock();
            if inner.episode == episode {
                inner.status.triggered = false;
                inner.pending_reset = None;
                info!("Alarm trigger auto-reset after {:?}", delay);
            }
        }));

        info!("Alarm triggered");
    }
}

impl Default for AlarmStateMachine {
    fn default() -> Self {
        Self::new(DEFAULT_AUTO_RESET)
    }
}
