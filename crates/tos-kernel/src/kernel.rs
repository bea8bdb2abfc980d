//! Kernel handle, boot and execution contexts

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use parking_lot::{Mutex, MutexGuard};
use tos_hal::{ContextEntry, HAL};
use tos_kernel_core::{
    check_all_invariants, InvariantViolation, KernelConfig, KernelError, KernelState, Pid,
    ProcessState, TaskId, Tid, WaitKey,
};

use crate::sys::Sys;
use crate::wait::{sleep, WaitTable};

/// Code run by a logical thread.
///
/// Receives the thread's system call handle and its argument bytes; the
/// return value becomes the thread's exit value (and, for a main thread,
/// the process exit status).
pub type Task<H> = Arc<dyn Fn(&Sys<H>, &[u8]) -> i32 + Send + Sync + 'static>;

/// Wrap a closure as a [`Task`]
pub fn task<H, F>(f: F) -> Task<H>
where
    H: HAL,
    F: Fn(&Sys<H>, &[u8]) -> i32 + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Identity of a task as reported by process introspection
pub(crate) fn task_id<H: HAL>(task: &Task<H>) -> TaskId {
    TaskId(Arc::as_ptr(task) as *const () as usize as u64)
}

/// Everything behind the kernel lock
pub(crate) struct Locked {
    pub(crate) core: KernelState,
    pub(crate) waits: WaitTable,
}

impl Locked {
    /// Deliver every wakeup recorded by the core since the last flush
    pub(crate) fn flush(&mut self) {
        for wake in self.core.take_wakeups() {
            self.waits.notify(wake);
        }
    }
}

struct Inner<H: HAL> {
    hal: H,
    lock: Mutex<Locked>,
}

/// Which kind of logical thread an execution context runs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Role {
    /// First thread of a process; returning exits the process
    Main,
    /// Thread created with `create_thread`; returning exits the thread
    Thread,
}

/// Shared handle to a running kernel
pub struct Kernel<H: HAL> {
    inner: Arc<Inner<H>>,
}

impl<H: HAL> Clone for Kernel<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: HAL> Kernel<H> {
    /// Boot the kernel and start `init` as pid 1.
    ///
    /// # Arguments
    /// * `hal` - Platform providing execution contexts
    /// * `config` - Table limits
    /// * `init` - Task run by the init process
    /// * `args` - Argument bytes handed to `init`
    ///
    /// # Returns
    /// * `Ok(Kernel)` - Init is running
    /// * `Err(KernelError::InvalidConfig)` - `config` failed validation
    ///
    /// # Panics
    /// If the idle or init process cannot be created or init's execution
    /// context cannot be spawned.
    pub fn boot(
        hal: H,
        config: KernelConfig,
        init: Task<H>,
        args: &[u8],
    ) -> Result<Self, KernelError> {
        let core = KernelState::new(config)?;
        let kernel = Self {
            inner: Arc::new(Inner {
                hal,
                lock: Mutex::new(Locked {
                    core,
                    waits: WaitTable::new(),
                }),
            }),
        };

        let mut guard = kernel.lock();
        match guard.core.create_process(None, None, &[]) {
            Ok((Pid::IDLE, _)) => {}
            other => panic!("[proc] failed to create idle process: {:?}", other),
        }
        let tid = match guard.core.create_process(None, Some(task_id(&init)), args) {
            Ok((Pid::INIT, Some(tid))) => tid,
            other => panic!("[proc] failed to create init process: {:?}", other),
        };
        if let Err(e) = kernel.spawn(Pid::INIT, tid, init, args.to_vec(), Role::Main) {
            panic!("[proc] failed to start init: {}", e);
        }
        drop(guard);

        debug!("[proc] booted, init running as thread {}", tid);
        Ok(kernel)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Locked> {
        self.inner.lock.lock()
    }

    pub(crate) fn hal(&self) -> &H {
        &self.inner.hal
    }

    /// Start an execution context for thread `tid` of `pid`.
    ///
    /// Called with the kernel lock held, so the new context cannot observe
    /// the thread before its bookkeeping is complete.
    pub(crate) fn spawn(
        &self,
        pid: Pid,
        tid: Tid,
        task: Task<H>,
        args: Vec<u8>,
        role: Role,
    ) -> Result<(), KernelError> {
        let sys = Sys::new(self.clone(), pid, tid);
        let entry: ContextEntry = Box::new(move || {
            let code = task(&sys, &args);
            match role {
                Role::Main => sys.retire_process(code),
                Role::Thread => sys.retire_thread(code),
            }
        });

        let name = format!("tos-{}-{}", pid, tid);
        self.inner.hal.spawn_context(&name, entry).map_err(|e| {
            warn!("[thread] cannot spawn context {}: {}", name, e);
            KernelError::SpawnFailed
        })
    }

    // ========================================================================
    // Host-side inspection
    // ========================================================================

    /// Block until init has exited and return its exit status
    pub fn wait_for_init(&self) -> i32 {
        let mut guard = self.lock();
        loop {
            if let Some(code) = init_status(&guard.core) {
                return code;
            }
            sleep(&mut guard, WaitKey::InitExit, None);
        }
    }

    /// Like [`Kernel::wait_for_init`], giving up after `timeout`
    pub fn wait_for_init_timeout(&self, timeout: Duration) -> Option<i32> {
        let deadline = Instant::now().checked_add(timeout);
        let mut guard = self.lock();
        loop {
            if let Some(code) = init_status(&guard.core) {
                return Some(code);
            }
            if sleep(&mut guard, WaitKey::InitExit, deadline) {
                return init_status(&guard.core);
            }
        }
    }

    /// Check every kernel invariant against the current state
    pub fn check_invariants(&self) -> Vec<InvariantViolation> {
        check_all_invariants(&self.lock().core)
    }

    /// Number of non-free process table entries (idle included)
    pub fn process_count(&self) -> usize {
        self.lock().core.processes.count()
    }

    pub fn open_sockets(&self) -> usize {
        self.lock().core.sockets.len()
    }

    pub fn open_pipes(&self) -> usize {
        self.lock().core.pipes.len()
    }

    /// Connection requests not yet collected by their connecting thread
    pub fn pending_requests(&self) -> usize {
        self.lock().core.requests.len()
    }

    /// Logical threads that have not exited yet
    pub fn live_threads(&self) -> usize {
        self.lock()
            .core
            .processes
            .iter()
            .map(|(_, entry)| entry.thread_count)
            .sum()
    }
}

fn init_status(core: &KernelState) -> Option<i32> {
    core.processes
        .get(Pid::INIT)
        .filter(|entry| entry.state == ProcessState::Zombie)
        .map(|entry| entry.exit_value)
}
