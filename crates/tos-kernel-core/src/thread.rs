//! Thread bridges
//!
//! A bridge is the kernel's bookkeeping for one logical thread: who owns it,
//! whether it has exited or been detached, how many joiners are parked on it
//! and the value it exited with.

use crate::error::KernelError;
use crate::state::KernelState;
use crate::types::{Pid, TaskId, Tid};
use crate::wait::{Step, WaitKey};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadBridge {
    pub owner: Pid,
    pub task: TaskId,
    pub exited: bool,
    pub detached: bool,
    /// Joiners currently parked on this bridge
    pub waiters: usize,
    pub exit_value: i32,
}

impl ThreadBridge {
    pub fn new(owner: Pid, task: TaskId) -> Self {
        Self {
            owner,
            task,
            exited: false,
            detached: false,
            waiters: 0,
            exit_value: 0,
        }
    }

    /// Nobody can observe this bridge any more
    pub fn is_reapable(&self) -> bool {
        self.exited && self.detached && self.waiters == 0
    }

    /// A parked joiner may stop waiting
    pub fn join_settled(&self) -> bool {
        self.exited || self.detached
    }
}

// ============================================================================
// Thread operations
// ============================================================================

impl KernelState {
    /// Create a bridge for a new thread of `pid`
    pub fn create_thread(&mut self, pid: Pid, task: TaskId) -> Result<Tid, KernelError> {
        if self.processes.get(pid).is_none() {
            return Err(KernelError::InvalidPid);
        }
        let tid = self.alloc_tid();
        self.threads.insert(tid, ThreadBridge::new(pid, task));
        if let Some(entry) = self.processes.get_mut(pid) {
            entry.threads.push(tid);
            entry.thread_count += 1;
        }
        Ok(tid)
    }

    /// Undo `create_thread` for a thread that never started
    pub fn abandon_thread(&mut self, pid: Pid, tid: Tid) {
        if self.threads.remove(&tid).is_none() {
            return;
        }
        if let Some(entry) = self.processes.get_mut(pid) {
            entry.threads.retain(|t| *t != tid);
            entry.thread_count -= 1;
        }
    }

    /// Bridge `tid` if it belongs to `pid`
    pub fn bridge(&self, pid: Pid, tid: Tid) -> Result<&ThreadBridge, KernelError> {
        self.threads
            .get(&tid)
            .filter(|b| b.owner == pid)
            .ok_or(KernelError::UnknownThread)
    }

    /// Register `caller` as a joiner of `target`
    pub fn thread_join_begin(
        &mut self,
        pid: Pid,
        caller: Tid,
        target: Tid,
    ) -> Result<(), KernelError> {
        let bridge = self.bridge(pid, target)?;
        if target == caller {
            return Err(KernelError::JoinSelf);
        }
        if bridge.detached {
            return Err(KernelError::ThreadDetached);
        }
        if let Some(bridge) = self.threads.get_mut(&target) {
            bridge.waiters += 1;
        }
        Ok(())
    }

    /// Finish a join once `target` exited or was detached.
    ///
    /// The last joiner out frees the bridge.
    pub fn thread_join_poll(&mut self, target: Tid) -> Result<Step<i32>, KernelError> {
        let bridge = self
            .threads
            .get_mut(&target)
            .ok_or(KernelError::UnknownThread)?;
        if !bridge.join_settled() {
            return Ok(Step::Blocked(WaitKey::ThreadExit(target)));
        }

        bridge.waiters -= 1;
        let detached = bridge.detached;
        let exit_value = bridge.exit_value;
        let free = if detached {
            bridge.is_reapable()
        } else {
            bridge.waiters == 0
        };
        if free {
            self.free_bridge(target);
        }

        if detached {
            Err(KernelError::ThreadDetached)
        } else {
            Ok(Step::Ready(exit_value))
        }
    }

    /// Detach `target`, failing any pending or future join
    pub fn thread_detach(&mut self, pid: Pid, target: Tid) -> Result<(), KernelError> {
        if self.bridge(pid, target)?.exited {
            return Err(KernelError::ThreadExited);
        }
        if let Some(bridge) = self.threads.get_mut(&target) {
            bridge.detached = true;
        }
        self.wakeups.broadcast(WaitKey::ThreadExit(target));
        Ok(())
    }

    /// Record the exit of thread `tid` of `pid`.
    ///
    /// Returns `true` when this was the last live thread and the process has
    /// become a zombie.
    pub fn thread_exit(&mut self, pid: Pid, tid: Tid, code: i32) -> bool {
        if let Some(bridge) = self.threads.get_mut(&tid) {
            bridge.exited = true;
            bridge.exit_value = code;
            let reap = bridge.is_reapable();
            self.wakeups.broadcast(WaitKey::ThreadExit(tid));
            if reap {
                self.free_bridge(tid);
            }
        }

        let Some(entry) = self.processes.get_mut(pid) else {
            return false;
        };
        entry.thread_count = entry.thread_count.saturating_sub(1);
        if entry.thread_count > 0 {
            return false;
        }
        self.teardown(pid);
        true
    }

    fn free_bridge(&mut self, tid: Tid) {
        if let Some(bridge) = self.threads.remove(&tid) {
            if let Some(entry) = self.processes.get_mut(bridge.owner) {
                entry.threads.retain(|t| *t != tid);
            }
        }
    }
}
