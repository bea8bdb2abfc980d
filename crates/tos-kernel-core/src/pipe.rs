//! Bounded byte pipe
//!
//! A ring buffer of `C` bytes with one slot always kept empty, so that
//! `read == write` means empty and `write + 1 == read` (mod `C`) means full.
//! Occupancy is derived from the two cursors alone.

use alloc::vec;
use alloc::vec::Vec;

use crate::error::KernelError;
use crate::file::Stream;
use crate::state::KernelState;
use crate::types::{Fid, Pid, PipeId};
use crate::wait::{Step, WaitKey};

/// Pipe object: ring buffer plus endpoint liveness
#[derive(Clone, Debug)]
pub struct Pipe {
    buf: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
    /// Reader endpoint still open
    pub reader_open: bool,
    /// Writer endpoint still open
    pub writer_open: bool,
}

impl Pipe {
    /// Create an empty pipe with a ring of `ring_size` bytes (at least 2)
    pub fn new(ring_size: usize) -> Self {
        Self {
            buf: vec![0; ring_size.max(2)],
            read_pos: 0,
            write_pos: 0,
            reader_open: true,
            writer_open: true,
        }
    }

    /// Maximum number of bytes the pipe can hold
    pub fn capacity(&self) -> usize {
        self.buf.len() - 1
    }

    /// Bytes currently buffered
    pub fn len(&self) -> usize {
        let size = self.buf.len();
        (self.write_pos + size - self.read_pos) % size
    }

    pub fn is_empty(&self) -> bool {
        self.read_pos == self.write_pos
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Both endpoints closed; the pipe can be freed
    pub fn is_closed(&self) -> bool {
        !self.reader_open && !self.writer_open
    }

    /// Copy as much of `data` as fits. Returns bytes copied.
    pub fn push(&mut self, data: &[u8]) -> usize {
        let size = self.buf.len();
        let n = data.len().min(self.capacity() - self.len());

        // At most two contiguous runs: up to the end of the ring, then from 0
        let first = n.min(size - self.write_pos);
        self.buf[self.write_pos..self.write_pos + first].copy_from_slice(&data[..first]);
        self.buf[..n - first].copy_from_slice(&data[first..n]);

        self.write_pos = (self.write_pos + n) % size;
        n
    }

    /// Copy up to `out.len()` buffered bytes into `out`. Returns bytes copied.
    pub fn pop(&mut self, out: &mut [u8]) -> usize {
        let size = self.buf.len();
        let n = out.len().min(self.len());

        let first = n.min(size - self.read_pos);
        out[..first].copy_from_slice(&self.buf[self.read_pos..self.read_pos + first]);
        out[first..n].copy_from_slice(&self.buf[..n - first]);

        self.read_pos = (self.read_pos + n) % size;
        n
    }
}

// ============================================================================
// Pipe operations
// ============================================================================

impl KernelState {
    /// Create a pipe and bind its endpoints to two descriptors of `pid`.
    ///
    /// Returns `(read_fid, write_fid)`.
    pub fn create_pipe(&mut self, pid: Pid) -> Result<(Fid, Fid), KernelError> {
        self.can_install(pid, 2)?;
        let id = self.alloc_pipe_id();
        self.pipes.insert(id, Pipe::new(self.config.pipe_buffer_size));
        let fids = self.install(pid, &[Stream::PipeReader(id), Stream::PipeWriter(id)])?;
        Ok((fids[0], fids[1]))
    }

    /// Copy up to `data.len()` bytes into the pipe.
    ///
    /// Blocks on `PipeSpace` while the ring is full and a reader exists.
    /// Fails with `BrokenPipe` once the reader is gone.
    pub fn pipe_write(&mut self, id: PipeId, data: &[u8]) -> Result<Step<usize>, KernelError> {
        let pipe = self.pipes.get_mut(&id).ok_or(KernelError::BrokenPipe)?;
        if !pipe.writer_open {
            return Err(KernelError::NotWritable);
        }
        if !pipe.reader_open {
            return Err(KernelError::BrokenPipe);
        }
        if data.is_empty() {
            return Ok(Step::Ready(0));
        }
        if pipe.is_full() {
            return Ok(Step::Blocked(WaitKey::PipeSpace(id)));
        }

        let n = pipe.push(data);
        self.wakeups.broadcast(WaitKey::PipeData(id));
        Ok(Step::Ready(n))
    }

    /// Copy up to `out.len()` buffered bytes out of the pipe.
    ///
    /// Blocks on `PipeData` while empty and a writer exists. Returns 0 once
    /// empty with the writer closed.
    pub fn pipe_read(&mut self, id: PipeId, out: &mut [u8]) -> Result<Step<usize>, KernelError> {
        let pipe = self.pipes.get_mut(&id).ok_or(KernelError::NotReadable)?;
        if !pipe.reader_open {
            return Err(KernelError::NotReadable);
        }
        if out.is_empty() {
            return Ok(Step::Ready(0));
        }
        if pipe.is_empty() {
            if pipe.writer_open {
                return Ok(Step::Blocked(WaitKey::PipeData(id)));
            }
            return Ok(Step::Ready(0));
        }

        let n = pipe.pop(out);
        self.wakeups.broadcast(WaitKey::PipeSpace(id));
        Ok(Step::Ready(n))
    }

    pub fn pipe_close_reader(&mut self, id: PipeId) {
        if let Some(pipe) = self.pipes.get_mut(&id) {
            pipe.reader_open = false;
            self.pipe_endpoint_closed(id);
        }
    }

    pub fn pipe_close_writer(&mut self, id: PipeId) {
        if let Some(pipe) = self.pipes.get_mut(&id) {
            pipe.writer_open = false;
            self.pipe_endpoint_closed(id);
        }
    }

    /// Wake every thread parked on either side, then free a fully closed pipe
    fn pipe_endpoint_closed(&mut self, id: PipeId) {
        self.wakeups.broadcast(WaitKey::PipeData(id));
        self.wakeups.broadcast(WaitKey::PipeSpace(id));
        if self.pipes.get(&id).is_some_and(Pipe::is_closed) {
            self.pipes.remove(&id);
        }
    }
}
