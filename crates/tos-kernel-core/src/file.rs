//! Descriptor layer
//!
//! Two levels, as in a classic Unix kernel:
//! - a per-process descriptor table (`ProcessEntry::fids`) mapping [`Fid`]
//!   slots to open streams, and
//! - a system-wide [`FileTable`] of reference-counted file control blocks,
//!   each bound to one [`Stream`].
//!
//! A control block is shared by every descriptor that inherited it. The
//! stream's close operation runs when its last reference goes away.

use alloc::vec::Vec;

use crate::error::KernelError;
use crate::state::KernelState;
use crate::types::{FcbId, Fid, Pid, PipeId, SocketId};
use crate::wait::Step;

/// Stream object bound to an open file control block
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stream {
    PipeReader(PipeId),
    PipeWriter(PipeId),
    Socket(SocketId),
    /// Process introspection, positioned at the next table slot to report
    ProcInfo { cursor: usize },
}

/// File control block
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fcb {
    pub refcount: usize,
    pub stream: Stream,
}

/// System-wide open stream table
#[derive(Clone, Debug)]
pub struct FileTable {
    slots: Vec<Option<Fcb>>,
    in_use: usize,
}

impl FileTable {
    pub fn new(max_files: usize) -> Self {
        Self {
            slots: (0..max_files).map(|_| None).collect(),
            in_use: 0,
        }
    }

    /// Free control blocks
    pub fn available(&self) -> usize {
        self.slots.len() - self.in_use
    }

    /// Bind `stream` to a fresh block holding one reference
    pub fn alloc(&mut self, stream: Stream) -> Option<FcbId> {
        let index = self.slots.iter().position(Option::is_none)?;
        self.slots[index] = Some(Fcb {
            refcount: 1,
            stream,
        });
        self.in_use += 1;
        Some(FcbId(index as u32))
    }

    pub fn get(&self, id: FcbId) -> Option<&Fcb> {
        self.slots.get(id.0 as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, id: FcbId) -> Option<&mut Fcb> {
        self.slots.get_mut(id.0 as usize)?.as_mut()
    }

    pub fn incref(&mut self, id: FcbId) {
        if let Some(fcb) = self.get_mut(id) {
            fcb.refcount += 1;
        }
    }

    /// Drop one reference. Returns the stream once the block is freed.
    pub fn decref(&mut self, id: FcbId) -> Option<Stream> {
        let fcb = self.get_mut(id)?;
        fcb.refcount -= 1;
        if fcb.refcount > 0 {
            return None;
        }
        let stream = fcb.stream;
        self.slots[id.0 as usize] = None;
        self.in_use -= 1;
        Some(stream)
    }

    /// Iterate open control blocks
    pub fn iter(&self) -> impl Iterator<Item = (FcbId, &Fcb)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|fcb| (FcbId(i as u32), fcb)))
    }
}

// ============================================================================
// Descriptor operations
// ============================================================================

impl KernelState {
    /// Check that `pid` can bind `n` new streams without touching any table
    pub fn can_install(&self, pid: Pid, n: usize) -> Result<(), KernelError> {
        let entry = self.processes.get(pid).ok_or(KernelError::InvalidPid)?;
        let free_fids = entry.fids.iter().filter(|slot| slot.is_none()).count();
        if free_fids < n {
            return Err(KernelError::DescriptorTableFull);
        }
        if self.files.available() < n {
            return Err(KernelError::FileTableFull);
        }
        Ok(())
    }

    /// Bind each stream to a fresh descriptor of `pid`, all or nothing.
    ///
    /// Descriptors are taken lowest-first.
    pub fn install(&mut self, pid: Pid, streams: &[Stream]) -> Result<Vec<Fid>, KernelError> {
        self.can_install(pid, streams.len())?;

        let mut fids = Vec::with_capacity(streams.len());
        for stream in streams {
            let fcb = self.files.alloc(*stream).ok_or(KernelError::FileTableFull)?;
            let entry = self.processes.get_mut(pid).ok_or(KernelError::InvalidPid)?;
            let slot = entry
                .fids
                .iter()
                .position(Option::is_none)
                .ok_or(KernelError::DescriptorTableFull)?;
            entry.fids[slot] = Some(fcb);
            fids.push(Fid(slot as u32));
        }
        Ok(fids)
    }

    /// Resolve a descriptor of `pid` to its control block
    pub fn lookup(&self, pid: Pid, fid: Fid) -> Result<FcbId, KernelError> {
        self.processes
            .get(pid)
            .ok_or(KernelError::InvalidPid)?
            .fids
            .get(fid.0 as usize)
            .copied()
            .flatten()
            .ok_or(KernelError::BadDescriptor)
    }

    pub fn stream(&self, fcb: FcbId) -> Result<Stream, KernelError> {
        self.files
            .get(fcb)
            .map(|f| f.stream)
            .ok_or(KernelError::BadDescriptor)
    }

    /// Resolve a descriptor that must be bound to a socket
    pub fn socket_of(&self, pid: Pid, fid: Fid) -> Result<SocketId, KernelError> {
        match self.stream(self.lookup(pid, fid)?)? {
            Stream::Socket(sid) => Ok(sid),
            _ => Err(KernelError::BadDescriptor),
        }
    }

    /// Hold an extra reference on a control block for the duration of a call
    pub fn fcb_incref(&mut self, fcb: FcbId) {
        self.files.incref(fcb);
    }

    /// Release a reference, closing the stream on the last one
    pub fn fcb_decref(&mut self, fcb: FcbId) {
        if let Some(stream) = self.files.decref(fcb) {
            self.close_stream(stream);
        }
    }

    /// Unbind a descriptor of `pid`
    pub fn close(&mut self, pid: Pid, fid: Fid) -> Result<(), KernelError> {
        let fcb = self
            .processes
            .get_mut(pid)
            .ok_or(KernelError::InvalidPid)?
            .fids
            .get_mut(fid.0 as usize)
            .and_then(Option::take)
            .ok_or(KernelError::BadDescriptor)?;
        self.fcb_decref(fcb);
        Ok(())
    }

    /// Release every descriptor of `pid`
    pub(crate) fn close_all(&mut self, pid: Pid) {
        let fcbs: Vec<FcbId> = match self.processes.get_mut(pid) {
            Some(entry) => entry.fids.iter_mut().filter_map(Option::take).collect(),
            None => return,
        };
        for fcb in fcbs {
            self.fcb_decref(fcb);
        }
    }

    fn close_stream(&mut self, stream: Stream) {
        match stream {
            Stream::PipeReader(id) => self.pipe_close_reader(id),
            Stream::PipeWriter(id) => self.pipe_close_writer(id),
            Stream::Socket(sid) => self.socket_close(sid),
            Stream::ProcInfo { .. } => {}
        }
    }

    /// Read from whatever stream the control block is bound to
    pub fn stream_read(&mut self, fcb: FcbId, out: &mut [u8]) -> Result<Step<usize>, KernelError> {
        match self.stream(fcb)? {
            Stream::PipeReader(id) => self.pipe_read(id, out),
            Stream::PipeWriter(_) => Err(KernelError::NotReadable),
            Stream::Socket(sid) => self.socket_read(sid, out),
            Stream::ProcInfo { cursor } => {
                let (n, next) = self.procinfo_read(cursor, out);
                if let Some(f) = self.files.get_mut(fcb) {
                    f.stream = Stream::ProcInfo { cursor: next };
                }
                Ok(Step::Ready(n))
            }
        }
    }

    /// Write to whatever stream the control block is bound to
    pub fn stream_write(&mut self, fcb: FcbId, data: &[u8]) -> Result<Step<usize>, KernelError> {
        match self.stream(fcb)? {
            Stream::PipeWriter(id) => self.pipe_write(id, data),
            Stream::Socket(sid) => self.socket_write(sid, data),
            Stream::PipeReader(_) | Stream::ProcInfo { .. } => Err(KernelError::NotWritable),
        }
    }
}
