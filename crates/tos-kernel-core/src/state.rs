//! Kernel state
//!
//! `KernelState` owns every table the kernel manages. Operations on it are
//! split by subsystem into `impl KernelState` blocks next to the data they
//! touch (`process`, `thread`, `pipe`, `socket`, `file`, `procinfo`).
//!
//! Nothing here blocks. Calls that would sleep return
//! [`Step::Blocked`](crate::wait::Step) and are retried by the runtime after
//! it has waited on the reported key; every mutation that may unblock
//! someone appends to [`KernelState::wakeups`].

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::config::KernelConfig;
use crate::error::KernelError;
use crate::file::FileTable;
use crate::pipe::Pipe;
use crate::process::ProcessTable;
use crate::socket::{ConnectionRequest, Socket};
use crate::thread::ThreadBridge;
use crate::types::{PipeId, Port, RequestId, SocketId, Tid};
use crate::wait::{Wake, Wakeups};

/// The complete kernel state
pub struct KernelState {
    /// Limits fixed at boot
    pub config: KernelConfig,
    /// Process table arena
    pub processes: ProcessTable,
    /// Thread bridges by id
    pub threads: BTreeMap<Tid, ThreadBridge>,
    /// Live pipes by id
    pub pipes: BTreeMap<PipeId, Pipe>,
    /// Live sockets by id
    pub sockets: BTreeMap<SocketId, Socket>,
    /// Port to listening socket
    pub ports: BTreeMap<Port, SocketId>,
    /// In-flight connection requests
    pub requests: BTreeMap<RequestId, ConnectionRequest>,
    /// System-wide open stream table
    pub files: FileTable,
    /// Wakeups not yet delivered by the runtime
    pub wakeups: Wakeups,
    next_tid: u64,
    next_pipe_id: u64,
    next_socket_id: u64,
    next_request_id: u64,
}

impl KernelState {
    /// Create empty tables sized by `config`
    pub fn new(config: KernelConfig) -> Result<Self, KernelError> {
        config.validate()?;
        Ok(Self {
            processes: ProcessTable::new(config.max_proc, config.max_fileid),
            threads: BTreeMap::new(),
            pipes: BTreeMap::new(),
            sockets: BTreeMap::new(),
            ports: BTreeMap::new(),
            requests: BTreeMap::new(),
            files: FileTable::new(config.max_files),
            wakeups: Wakeups::new(),
            next_tid: 1,
            next_pipe_id: 1,
            next_socket_id: 1,
            next_request_id: 1,
            config,
        })
    }

    /// Drain the wakeups recorded since the last call
    pub fn take_wakeups(&mut self) -> Vec<Wake> {
        self.wakeups.take()
    }

    pub(crate) fn alloc_tid(&mut self) -> Tid {
        let tid = Tid(self.next_tid);
        self.next_tid += 1;
        tid
    }

    pub(crate) fn alloc_pipe_id(&mut self) -> PipeId {
        let id = PipeId(self.next_pipe_id);
        self.next_pipe_id += 1;
        id
    }

    pub(crate) fn alloc_socket_id(&mut self) -> SocketId {
        let id = SocketId(self.next_socket_id);
        self.next_socket_id += 1;
        id
    }

    pub(crate) fn alloc_request_id(&mut self) -> RequestId {
        let id = RequestId(self.next_request_id);
        self.next_request_id += 1;
        id
    }

    /// Upper bound handed out for thread ids so far (for invariant checks)
    pub fn next_tid(&self) -> u64 {
        self.next_tid
    }
}
