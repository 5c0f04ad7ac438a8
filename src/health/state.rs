//! Per-destination health state.
//!
//! # Responsibilities
//! - Hold the active and passive health of one destination
//! - Own the destination's reactivation timer
//!
//! # Design Decisions
//! - Health fields are single atomics: writers (probing loop, passive
//!   policy, reactivation timer) each update with one store, so readers on
//!   the request hot path never observe a torn value and never block
//! - At most one reactivation timer is armed per destination; arming a new
//!   one cancels the previous, and each armed timer carries a sequence
//!   number so a superseded timer that already left its sleep cannot apply

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Health of a destination as seen by one kind of check.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// No signal yet. Counts as available.
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for HealthStatus {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthStatus::Healthy,
            2 => HealthStatus::Unhealthy,
            _ => HealthStatus::Unknown,
        }
    }
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

/// Mutable health state of one destination, owned by the health subsystem.
///
/// Collaborators such as the load balancer read through the composite
/// availability rule and never mutate.
#[derive(Debug)]
pub struct DestinationHealthState {
    active: AtomicU8,
    passive: AtomicU8,
    reactivation: Mutex<Option<ReactivationTimer>>,
    arm_seq: AtomicU64,
}

#[derive(Debug)]
struct ReactivationTimer {
    seq: u64,
    task: JoinHandle<()>,
}

impl DestinationHealthState {
    pub fn new() -> Self {
        Self {
            active: AtomicU8::new(HealthStatus::Unknown as u8),
            passive: AtomicU8::new(HealthStatus::Unknown as u8),
            reactivation: Mutex::new(None),
            arm_seq: AtomicU64::new(0),
        }
    }

    pub fn active(&self) -> HealthStatus {
        self.active.load(Ordering::Acquire).into()
    }

    pub fn passive(&self) -> HealthStatus {
        self.passive.load(Ordering::Acquire).into()
    }

    pub fn set_active(&self, status: HealthStatus) {
        self.active.store(status as u8, Ordering::Release);
    }

    pub fn set_passive(&self, status: HealthStatus) {
        self.passive.store(status as u8, Ordering::Release);
    }

    /// Arm the reactivation timer. Any previously armed timer for this
    /// destination is cancelled first.
    ///
    /// When the timer fires, passive health resets to `Unknown`, not
    /// `Healthy`: the destination re-earns `Healthy` through subsequent
    /// successful traffic or an active probe.
    pub fn schedule_reactivation(self: &Arc<Self>, period: Duration) {
        let mut slot = self.lock_timer();
        if let Some(previous) = slot.take() {
            previous.task.abort();
        }

        let seq = self.arm_seq.fetch_add(1, Ordering::AcqRel) + 1;
        let state = Arc::clone(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(period).await;
            state.reactivate(seq);
        });
        *slot = Some(ReactivationTimer { seq, task });
    }

    fn reactivate(&self, seq: u64) {
        let mut slot = self.lock_timer();
        match slot.as_ref() {
            Some(timer) if timer.seq == seq => {
                *slot = None;
                self.set_passive(HealthStatus::Unknown);
                tracing::debug!("Reactivation period elapsed, passive health reset to unknown");
            }
            // Superseded or cancelled between waking and taking the lock.
            _ => {}
        }
    }

    /// Cancel the armed reactivation timer, if any.
    ///
    /// Called synchronously before the state is discarded when its
    /// destination leaves the configuration: a timer must never fire for a
    /// removed destination.
    pub fn cancel_reactivation(&self) {
        if let Some(timer) = self.lock_timer().take() {
            timer.task.abort();
        }
    }

    /// Whether a reactivation timer is currently armed.
    pub fn reactivation_armed(&self) -> bool {
        self.lock_timer().is_some()
    }

    fn lock_timer(&self) -> MutexGuard<'_, Option<ReactivationTimer>> {
        // Holders only swap the Option and never panic, so a poisoned lock
        // still guards consistent data.
        match self.reactivation.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for DestinationHealthState {
    fn default() -> Self {
        Self::new()
    }
}
