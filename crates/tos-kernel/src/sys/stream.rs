//! Pipes and descriptor I/O

use log::{debug, trace};
use tos_hal::HAL;
use tos_kernel_core::{Fid, KernelError};

use super::Sys;
use crate::wait::block_on;

/// Descriptor pair returned by [`Sys::pipe`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipeFids {
    pub read: Fid,
    pub write: Fid,
}

impl<H: HAL> Sys<H> {
    /// Create a pipe bound to two fresh descriptors
    pub fn pipe(&self) -> Result<PipeFids, KernelError> {
        let (read, write) = self.lock().core.create_pipe(self.pid)?;
        debug!("[pipe] {} opened pipe {}/{}", self.pid, read.0, write.0);
        Ok(PipeFids { read, write })
    }

    /// Read up to `buf.len()` bytes.
    ///
    /// Blocks while a pipe or socket has no data and its writer is open.
    /// Returns `Ok(0)` at end of stream.
    pub fn read(&self, fid: Fid, buf: &mut [u8]) -> Result<usize, KernelError> {
        let mut guard = self.lock();
        let fcb = guard.core.lookup(self.pid, fid)?;

        guard.core.fcb_incref(fcb);
        let result = block_on(&mut guard, |core| core.stream_read(fcb, buf));
        guard.core.fcb_decref(fcb);
        guard.flush();

        if let Ok(n) = result {
            trace!("[pipe] {} read {} bytes from {}", self.pid, n, fid.0);
        }
        result
    }

    /// Write up to `data.len()` bytes.
    ///
    /// Blocks while the buffer is full and its reader is open. A short count
    /// is a normal outcome.
    pub fn write(&self, fid: Fid, data: &[u8]) -> Result<usize, KernelError> {
        let mut guard = self.lock();
        let fcb = guard.core.lookup(self.pid, fid)?;

        guard.core.fcb_incref(fcb);
        let result = block_on(&mut guard, |core| core.stream_write(fcb, data));
        guard.core.fcb_decref(fcb);
        guard.flush();

        if let Ok(n) = result {
            trace!("[pipe] {} wrote {} bytes to {}", self.pid, n, fid.0);
        }
        result
    }

    /// Release descriptor `fid`; the stream closes with its last reference
    pub fn close(&self, fid: Fid) -> Result<(), KernelError> {
        let mut guard = self.lock();
        guard.core.close(self.pid, fid)?;
        guard.flush();
        Ok(())
    }

    /// Open a process introspection stream.
    ///
    /// Each read yields one [`ProcInfo`](tos_kernel_core::ProcInfo) record
    /// for the next live process in pid order.
    pub fn open_info(&self) -> Result<Fid, KernelError> {
        self.lock().core.open_info(self.pid)
    }
}
