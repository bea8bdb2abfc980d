//! Tiny OS Kernel Core - Pure Process, Thread and IPC State
//!
//! This crate contains the **pure, HAL-free** state of the Tiny OS process
//! runtime: the process table, thread bridges, pipes, sockets and the
//! descriptor layer that binds them to per-process file ids.
//!
//! # Design Principles
//!
//! 1. **No HAL dependency**: Execution contexts and blocking live in `tos-kernel`
//! 2. **Never blocks**: An operation that would sleep returns [`Step::Blocked`]
//!    with the [`WaitKey`] to sleep on, and the caller retries after waking
//! 3. **Explicit wakeups**: Every mutation that may unblock a sleeper records
//!    it in [`KernelState::wakeups`]
//! 4. **Checkable**: [`check_all_invariants`] validates the whole state
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    tos-kernel-core                          │
//! │                                                             │
//! │   ┌───────────────┐    ┌───────────────┐                    │
//! │   │  KernelState  │    │   Step<T>     │                    │
//! │   │  - processes  │───▶│   Wakeups     │                    │
//! │   │  - threads    │    └───────────────┘                    │
//! │   │  - pipes      │                                         │
//! │   │  - sockets    │    ┌───────────────┐                    │
//! │   │  - files      │    │  Invariants   │                    │
//! │   └───────────────┘    └───────────────┘                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              │ used by
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      tos-kernel                             │
//! │   - one kernel lock, one condition variable per WaitKey     │
//! │   - execution contexts through the HAL                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! - `types` - Identifiers (Pid, Tid, Fid, ...) and small enums
//! - `config` - Boot-time limits, loadable from JSON
//! - `error` - `KernelError`
//! - `process` - Process table and lifecycle (create, wait, teardown)
//! - `thread` - Thread bridges and join/detach
//! - `pipe` - Bounded ring buffer and pipe read/write/close
//! - `socket` - Listener/peer sockets and the connect/accept rendezvous
//! - `file` - Descriptor tables and stream dispatch
//! - `procinfo` - Process introspection records
//! - `wait` - Wait keys, wakeups and `Step`
//! - `invariants` - Runtime-checkable invariants

#![no_std]
extern crate alloc;

pub mod config;
pub mod error;
pub mod file;
pub mod invariants;
pub mod pipe;
pub mod process;
pub mod procinfo;
pub mod socket;
pub mod state;
pub mod thread;
pub mod types;
pub mod wait;

// Re-export all public types for convenient access
pub use config::KernelConfig;
pub use error::KernelError;
pub use file::{Fcb, FileTable, Stream};
pub use invariants::{check_all_invariants, InvariantViolation};
pub use pipe::Pipe;
pub use process::{ProcessEntry, ProcessTable};
pub use procinfo::{ProcInfo, PROCINFO_MAX_ARGS_SIZE, PROCINFO_RECORD_SIZE};
pub use socket::{ConnectionRequest, RequestState, Socket, SocketKind};
pub use state::KernelState;
pub use thread::ThreadBridge;
pub use types::{
    FcbId, Fid, Pid, PipeId, Port, ProcessState, RequestId, ShutdownMode, SocketId, TaskId, Tid,
    NOPORT,
};
pub use wait::{Step, WaitKey, Wake, Wakeups};
