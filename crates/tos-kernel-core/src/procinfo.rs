//! Process introspection stream
//!
//! Each read on an info descriptor yields one fixed-size little-endian
//! record describing the next non-free process table slot, in pid order.
//! The stream is forward-only and reports end-of-stream once the table has
//! been walked.
//!
//! Record layout:
//!
//! ```text
//! offset  size  field
//!      0     4  pid
//!      4     4  ppid (u32::MAX when parentless)
//!      8     4  alive (1 alive, 0 zombie)
//!     12     4  thread_count
//!     16     8  main_task (0 when none)
//!     24     4  argl
//!     28   128  args prefix, zero padded
//! ```

use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::error::KernelError;
use crate::file::Stream;
use crate::process::ProcessEntry;
use crate::state::KernelState;
use crate::types::{Fid, Pid, ProcessState, TaskId};

/// Bytes of the argument buffer copied into a record
pub const PROCINFO_MAX_ARGS_SIZE: usize = 128;

/// Encoded size of one record
pub const PROCINFO_RECORD_SIZE: usize = 28 + PROCINFO_MAX_ARGS_SIZE;

const NO_PARENT: u32 = u32::MAX;

/// Decoded introspection record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcInfo {
    pub pid: Pid,
    pub ppid: Option<Pid>,
    pub alive: bool,
    pub thread_count: u32,
    pub main_task: Option<TaskId>,
    /// Full argument length, which may exceed the copied prefix
    pub argl: u32,
    /// Argument prefix, at most `PROCINFO_MAX_ARGS_SIZE` bytes
    pub args: Vec<u8>,
}

impl ProcInfo {
    pub fn from_entry(pid: Pid, entry: &ProcessEntry) -> Self {
        let prefix = entry.args.len().min(PROCINFO_MAX_ARGS_SIZE);
        Self {
            pid,
            ppid: entry.parent,
            alive: entry.state == ProcessState::Alive,
            thread_count: entry.thread_count as u32,
            main_task: entry.main_task,
            argl: entry.args.len() as u32,
            args: entry.args[..prefix].to_vec(),
        }
    }

    pub fn encode(&self) -> [u8; PROCINFO_RECORD_SIZE] {
        let mut out = [0u8; PROCINFO_RECORD_SIZE];
        out[0..4].copy_from_slice(&self.pid.0.to_le_bytes());
        out[4..8].copy_from_slice(&self.ppid.map_or(NO_PARENT, |p| p.0).to_le_bytes());
        out[8..12].copy_from_slice(&(self.alive as u32).to_le_bytes());
        out[12..16].copy_from_slice(&self.thread_count.to_le_bytes());
        out[16..24].copy_from_slice(&self.main_task.map_or(0, |t| t.0).to_le_bytes());
        out[24..28].copy_from_slice(&self.argl.to_le_bytes());
        let n = self.args.len().min(PROCINFO_MAX_ARGS_SIZE);
        out[28..28 + n].copy_from_slice(&self.args[..n]);
        out
    }

    /// Parse one full record
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < PROCINFO_RECORD_SIZE {
            return None;
        }
        let u32_at = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        let mut task = [0u8; 8];
        task.copy_from_slice(&buf[16..24]);
        let task = u64::from_le_bytes(task);

        let ppid = u32_at(4);
        let argl = u32_at(24);
        let prefix = (argl as usize).min(PROCINFO_MAX_ARGS_SIZE);
        Some(Self {
            pid: Pid(u32_at(0)),
            ppid: (ppid != NO_PARENT).then_some(Pid(ppid)),
            alive: u32_at(8) != 0,
            thread_count: u32_at(12),
            main_task: (task != 0).then_some(TaskId(task)),
            argl,
            args: buf[28..28 + prefix].to_vec(),
        })
    }
}

impl KernelState {
    /// Open an introspection stream positioned at the start of the table
    pub fn open_info(&mut self, pid: Pid) -> Result<Fid, KernelError> {
        let fids = self.install(pid, &[Stream::ProcInfo { cursor: 0 }])?;
        Ok(fids[0])
    }

    /// Copy the record for the first non-free slot at or after `cursor`.
    ///
    /// Returns bytes copied and the new cursor. A short buffer receives the
    /// record's prefix; the cursor still moves past that slot.
    pub fn procinfo_read(&self, cursor: usize, out: &mut [u8]) -> (usize, usize) {
        if out.is_empty() {
            return (0, cursor);
        }
        let next = self
            .processes
            .slots()
            .skip(cursor)
            .find(|(_, entry)| entry.state != ProcessState::Free);

        match next {
            None => (0, self.processes.capacity()),
            Some((pid, entry)) => {
                let record = ProcInfo::from_entry(pid, entry).encode();
                let n = out.len().min(PROCINFO_RECORD_SIZE);
                out[..n].copy_from_slice(&record[..n]);
                (n, pid.index() + 1)
            }
        }
    }
}
