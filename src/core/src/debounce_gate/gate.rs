//! Single-slot save gate with a trailing-edge debounce.
//!
//! Every save-triggering action goes through [`DebounceGate::try_acquire`].
//! While a [`SavePermit`] is alive further attempts get `None` and must treat
//! the trigger as a no-op; dropping the permit (normally or by cancelling the
//! future that holds it) frees the slot. Rapid repeated triggers such as
//! autosave are additionally collapsed by [`DebounceGate::debounce`], which
//! only runs the most recent request once the quiet period has elapsed.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, trace};
use tokio::task::JoinHandle;

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(300);

#[derive(Debug)]
pub struct DebounceGate {
    in_flight: AtomicBool,
    quiet_period: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Default for DebounceGate {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET_PERIOD)
    }
}

impl DebounceGate {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            in_flight: AtomicBool::new(false),
            quiet_period,
            pending: Mutex::new(None),
        }
    }

    fn pending(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    /// Claims the in-flight slot, or `None` if a save is already running.
    pub fn try_acquire(&self) -> Option<SavePermit<'_>> {
        match self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                trace!("save slot acquired");
                Some(SavePermit { gate: self })
            }
            Err(_) => {
                debug!("save already in flight; trigger ignored");
                None
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Schedules `action` to run after the quiet period, replacing any
    /// request scheduled earlier that has not fired yet.
    ///
    /// Must be called from within a tokio runtime.
    pub fn debounce<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let quiet_period = self.quiet_period;
        let mut pending = self.pending();
        if let Some(previous) = pending.take() {
            if !previous.is_finished() {
                trace!("debounce: superseding scheduled save");
                previous.abort();
            }
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;
            action().await;
        }));
    }

    /// Drops a scheduled-but-not-fired debounced action. Returns whether one was pending.
    pub fn cancel_pending(&self) -> bool {
        match self.pending().take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

/// Proof of holding the in-flight slot. Released on drop.
#[derive(Debug)]
pub struct SavePermit<'a> {
    gate: &'a DebounceGate,
}

impl Drop for SavePermit<'_> {
    fn drop(&mut self) {
        self.gate.in_flight.store(false, Ordering::Release);
        trace!("save slot released");
    }
}
