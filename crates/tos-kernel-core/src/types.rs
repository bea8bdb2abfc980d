//! Core kernel types
//!
//! This module contains the identifiers and small enums shared by every
//! table in the kernel core. All types here are pure data.

use core::fmt;
use serde::{Deserialize, Serialize};

/// Process identifier (index into the process table)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pid(pub u32);

impl Pid {
    /// Parentless idle process, created first at boot and never run
    pub const IDLE: Pid = Pid(0);
    /// First launched process; adopts orphans and collects their zombies
    pub const INIT: Pid = Pid(1);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Thread identifier
///
/// Identifies one thread bridge. Allocated monotonically and never reused,
/// so a stale id can only ever fail lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tid(pub u64);

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-process file descriptor (slot in the process's descriptor table)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fid(pub u32);

/// System-wide open stream slot (file control block)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FcbId(pub u32);

/// Pipe identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PipeId(pub u64);

/// Socket identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SocketId(pub u64);

/// Pending connection request identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

/// Identity of a task body, as reported by process introspection
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

/// Socket port number
pub type Port = u16;

/// "No port": a socket created with this port can connect but never listen
pub const NOPORT: Port = 0;

/// Process table entry state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    /// Slot is on the free list
    Free,
    /// Process has at least one live thread
    Alive,
    /// Process exited, exit value not yet collected by its parent
    Zombie,
}

/// Which direction(s) of a peer socket to shut down
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownMode {
    Read,
    Write,
    Both,
}
