//! Condition variables keyed by wait channel

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, MutexGuard};
use tos_kernel_core::{KernelError, KernelState, Step, WaitKey, Wake};

use crate::kernel::Locked;

/// Lazily created condition variables, one per channel with sleepers.
///
/// A sleeper holds a clone of the channel's `Arc` while parked, so an entry
/// whose strong count is one has no sleepers and can be dropped.
#[derive(Default)]
pub(crate) struct WaitTable {
    channels: BTreeMap<WaitKey, Arc<Condvar>>,
}

impl WaitTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn channel(&mut self, key: WaitKey) -> Arc<Condvar> {
        self.channels
            .entry(key)
            .or_insert_with(|| Arc::new(Condvar::new()))
            .clone()
    }

    fn release(&mut self, key: WaitKey) {
        if self
            .channels
            .get(&key)
            .map_or(false, |cv| Arc::strong_count(cv) == 1)
        {
            self.channels.remove(&key);
        }
    }

    pub(crate) fn notify(&self, wake: Wake) {
        match wake {
            Wake::Signal(key) => {
                if let Some(cv) = self.channels.get(&key) {
                    cv.notify_one();
                }
            }
            Wake::Broadcast(key) => {
                if let Some(cv) = self.channels.get(&key) {
                    cv.notify_all();
                }
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.channels.len()
    }
}

/// Park on `key` until woken or `deadline` passes.
///
/// Returns `true` on timeout. The lock is released while parked.
pub(crate) fn sleep(
    guard: &mut MutexGuard<'_, Locked>,
    key: WaitKey,
    deadline: Option<Instant>,
) -> bool {
    let cv = guard.waits.channel(key);
    let timed_out = match deadline {
        Some(deadline) => cv.wait_until(guard, deadline).timed_out(),
        None => {
            cv.wait(guard);
            false
        }
    };
    drop(cv);
    guard.waits.release(key);
    timed_out
}

/// Run `op` until it stops reporting `Blocked`, sleeping in between
pub(crate) fn block_on<T>(
    guard: &mut MutexGuard<'_, Locked>,
    mut op: impl FnMut(&mut KernelState) -> Result<Step<T>, KernelError>,
) -> Result<T, KernelError> {
    loop {
        let step = op(&mut guard.core);
        guard.flush();
        match step? {
            Step::Ready(value) => return Ok(value),
            Step::Blocked(key) => {
                sleep(guard, key, None);
            }
        }
    }
}
