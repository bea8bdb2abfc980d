//! Tiny OS Kernel
//!
//! The blocking half of the kernel. [`tos_kernel_core::KernelState`] holds
//! every table and never sleeps; this crate wraps it in the single kernel
//! lock, parks callers on per-channel condition variables, and runs logical
//! threads on execution contexts obtained from the [`HAL`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   Sys<H> calls    ┌─────────────────────────────────┐
//! │  Task code   │ ─────────────────▶│           Kernel<H>             │
//! │ (one per     │                   │  Mutex<Locked>                  │
//! │  logical     │ ◀──── Ok / Err ── │   ├── KernelState (core)        │
//! │  thread)     │                   │   └── WaitTable (key → Condvar) │
//! └──────────────┘                   └─────────────────────────────────┘
//!        ▲                                          │
//!        │ entry stub                               │ spawn_context / exit_context
//!        └──────────────────────────────────────────▼
//!                                             HAL (tos-hal)
//! ```
//!
//! Every call takes the lock, runs the core operation, and delivers the
//! wakeups it recorded. An operation reporting `Step::Blocked(key)` parks
//! the caller on the condition variable for `key` and is retried after it
//! wakes, so every wait re-validates its condition.

mod kernel;
mod sys;
mod wait;

pub use kernel::{task, Kernel, Task};
pub use sys::{PipeFids, Sys};

// Re-export the types callers need alongside the runtime
pub use tos_hal::{HalError, StdHal, HAL};
pub use tos_kernel_core::{
    check_all_invariants, Fid, InvariantViolation, KernelConfig, KernelError, Pid, Port,
    ProcInfo, ShutdownMode, TaskId, Tid, NOPORT, PROCINFO_MAX_ARGS_SIZE, PROCINFO_RECORD_SIZE,
};
