//! System call handle
//!
//! Every logical thread receives a [`Sys`] naming its process and its own
//! thread. Calls are grouped by subsystem:
//! - `lifecycle` - processes and threads
//! - `stream` - pipes, generic descriptor I/O and introspection
//! - `socket` - sockets and the connect/accept rendezvous

mod lifecycle;
mod socket;
mod stream;

pub use stream::PipeFids;

use log::debug;
use parking_lot::MutexGuard;
use tos_hal::HAL;
use tos_kernel_core::{Pid, Tid};

use crate::kernel::{Kernel, Locked};
use crate::wait::block_on;

/// The calling logical thread's view of the kernel
pub struct Sys<H: HAL> {
    kernel: Kernel<H>,
    pid: Pid,
    tid: Tid,
}

impl<H: HAL> Sys<H> {
    pub(crate) fn new(kernel: Kernel<H>, pid: Pid, tid: Tid) -> Self {
        Self { kernel, pid, tid }
    }

    /// The kernel this thread runs on
    pub fn kernel(&self) -> &Kernel<H> {
        &self.kernel
    }

    fn lock(&self) -> MutexGuard<'_, Locked> {
        self.kernel.lock()
    }

    /// Exit the calling thread after its task returned or called `exit`,
    /// recording `code` as the process exit status first
    pub(crate) fn retire_process(&self, code: i32) {
        let mut guard = self.lock();
        guard.core.set_exit_value(self.pid, code);
        self.retire_locked(&mut guard, code);
    }

    /// Exit the calling thread without touching the process exit status
    pub(crate) fn retire_thread(&self, code: i32) {
        let mut guard = self.lock();
        self.retire_locked(&mut guard, code);
    }

    fn retire_locked(&self, guard: &mut MutexGuard<'_, Locked>, code: i32) {
        let last = guard
            .core
            .processes
            .get(self.pid)
            .map_or(false, |entry| entry.thread_count == 1);

        // Init collects every child before its last thread goes
        if self.pid == Pid::INIT && last {
            while let Ok((child, status)) =
                block_on(guard, |core| core.wait_child(Pid::INIT, None))
            {
                debug!("[proc] init collected {} with status {}", child, status);
            }
        }

        let zombie = guard.core.thread_exit(self.pid, self.tid, code);
        guard.flush();
        if zombie {
            let status = guard
                .core
                .processes
                .get(self.pid)
                .map_or(code, |entry| entry.exit_value);
            debug!("[proc] {} exited with status {}", self.pid, status);
        } else {
            debug!("[thread] {} of {} exited with {}", self.tid, self.pid, code);
        }
    }
}
