//! Process and thread system calls
//!
//! - `exec()` / `exit()` / `wait_child()` - process lifecycle
//! - `get_pid()` / `get_ppid()` - hierarchy lookups
//! - `create_thread()` / `thread_join()` / `thread_detach()` / `thread_exit()`

use log::debug;
use tos_hal::HAL;
use tos_kernel_core::{KernelError, Pid, Tid};

use super::Sys;
use crate::kernel::{task_id, Role, Task};
use crate::wait::block_on;

impl<H: HAL> Sys<H> {
    // ========================================================================
    // Processes
    // ========================================================================

    /// Create a child process.
    ///
    /// The child shares the caller's open descriptors and gets its own copy
    /// of `args`. With a task, its main thread starts running immediately.
    ///
    /// # Returns
    /// * `Ok(pid)` - Child created
    /// * `Err(KernelError::ProcessTableFull)` - No free slot
    /// * `Err(KernelError::SpawnFailed)` - No execution context; nothing was created
    pub fn exec(&self, task: Option<Task<H>>, args: &[u8]) -> Result<Pid, KernelError> {
        let mut guard = self.lock();
        let id = task.as_ref().map(task_id);
        let (pid, main) = guard.core.create_process(Some(self.pid), id, args)?;

        if let (Some(task), Some(tid)) = (task, main) {
            if let Err(e) = self.kernel.spawn(pid, tid, task, args.to_vec(), Role::Main) {
                guard.core.abandon_process(pid);
                guard.flush();
                return Err(e);
            }
        }

        debug!("[proc] {} created {} ({} arg bytes)", self.pid, pid, args.len());
        Ok(pid)
    }

    pub fn get_pid(&self) -> Pid {
        self.pid
    }

    /// Parent of the calling process; `None` for idle and init
    pub fn get_ppid(&self) -> Option<Pid> {
        self.lock().core.get_ppid(self.pid)
    }

    /// Wait for a child to exit and collect it.
    ///
    /// `Some(pid)` waits for that direct child, `None` for any child.
    ///
    /// # Returns
    /// * `Ok((pid, status))` - The collected child and its exit status
    /// * `Err(KernelError::NotAChild)` - `pid` is not a direct child
    /// * `Err(KernelError::NoChildren)` - Any-child wait with no children at all
    pub fn wait_child(&self, target: Option<Pid>) -> Result<(Pid, i32), KernelError> {
        let mut guard = self.lock();
        let (child, status) = block_on(&mut guard, |core| core.wait_child(self.pid, target))?;
        debug!("[proc] {} collected {} with status {}", self.pid, child, status);
        Ok((child, status))
    }

    /// Set the process exit status and end the calling thread.
    ///
    /// The process becomes a zombie once its last thread has exited.
    pub fn exit(&self, code: i32) -> ! {
        self.retire_process(code);
        self.kernel.hal().exit_context()
    }

    // ========================================================================
    // Threads
    // ========================================================================

    /// Start a new thread in the calling process running `task`
    pub fn create_thread(&self, task: Task<H>, args: &[u8]) -> Result<Tid, KernelError> {
        let mut guard = self.lock();
        let tid = guard.core.create_thread(self.pid, task_id(&task))?;

        if let Err(e) = self
            .kernel
            .spawn(self.pid, tid, task, args.to_vec(), Role::Thread)
        {
            guard.core.abandon_thread(self.pid, tid);
            return Err(e);
        }

        debug!("[thread] {} started {} in {}", self.tid, tid, self.pid);
        Ok(tid)
    }

    pub fn thread_self(&self) -> Tid {
        self.tid
    }

    /// Wait for thread `tid` of the calling process to exit.
    ///
    /// # Returns
    /// * `Ok(value)` - The thread's exit value
    /// * `Err(KernelError::UnknownThread)` - Not a thread of this process (or already joined)
    /// * `Err(KernelError::JoinSelf)` - `tid` is the caller
    /// * `Err(KernelError::ThreadDetached)` - Detached before or while waiting
    pub fn thread_join(&self, tid: Tid) -> Result<i32, KernelError> {
        let mut guard = self.lock();
        guard.core.thread_join_begin(self.pid, self.tid, tid)?;
        block_on(&mut guard, |core| core.thread_join_poll(tid))
    }

    /// Detach thread `tid`, failing every pending and future join on it
    pub fn thread_detach(&self, tid: Tid) -> Result<(), KernelError> {
        let mut guard = self.lock();
        guard.core.thread_detach(self.pid, tid)?;
        guard.flush();
        debug!("[thread] {} detached", tid);
        Ok(())
    }

    /// End the calling thread with exit value `code`
    pub fn thread_exit(&self, code: i32) -> ! {
        self.retire_thread(code);
        self.kernel.hal().exit_context()
    }
}
