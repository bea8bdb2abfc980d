//! Socket system calls
//!
//! A connection is a pair of peer sockets cross-wired over two pipes. The
//! connecting side queues a request on the listener and parks on it; the
//! accepting side pops the request, builds both peers and admits it.

use std::time::{Duration, Instant};

use log::{debug, warn};
use tos_hal::HAL;
use tos_kernel_core::{Fid, KernelError, Port, ShutdownMode, Step};

use super::Sys;
use crate::wait::{block_on, sleep};

impl<H: HAL> Sys<H> {
    /// Create an unbound socket on `port` (`NOPORT` for a client socket)
    pub fn socket(&self, port: Port) -> Result<Fid, KernelError> {
        self.lock().core.create_socket(self.pid, port)
    }

    /// Turn an unbound socket into the listener for its port
    pub fn listen(&self, fid: Fid) -> Result<(), KernelError> {
        let mut guard = self.lock();
        guard.core.listen(self.pid, fid)?;
        debug!("[socket] {} listening on descriptor {}", self.pid, fid.0);
        Ok(())
    }

    /// Wait for a connection request and admit it.
    ///
    /// # Returns
    /// * `Ok(fid)` - Descriptor of the new peer socket
    /// * `Err(KernelError::ListenerClosed)` - The listener closed while waiting
    /// * `Err(KernelError::DescriptorTableFull)` - No descriptor for the peer;
    ///   the request stays queued
    pub fn accept(&self, fid: Fid) -> Result<Fid, KernelError> {
        let mut guard = self.lock();
        let listener = guard.core.accept_begin(self.pid, fid)?;
        let peer = block_on(&mut guard, |core| core.accept_poll(self.pid, listener))?;
        debug!("[socket] {} accepted connection as {}", self.pid, peer.0);
        Ok(peer)
    }

    /// Connect an unbound socket to the listener on `port`.
    ///
    /// `timeout` bounds the wait for an accept; `None` waits forever.
    ///
    /// # Returns
    /// * `Ok(())` - Admitted; the socket is now a peer
    /// * `Err(KernelError::NoListener)` - Nothing listens on `port`
    /// * `Err(KernelError::ConnectionRefused)` - The listener closed or refused
    /// * `Err(KernelError::Timeout)` - Not admitted in time; the request is withdrawn
    pub fn connect(
        &self,
        fid: Fid,
        port: Port,
        timeout: Option<Duration>,
    ) -> Result<(), KernelError> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut guard = self.lock();
        let rid = guard.core.connect_begin(self.pid, fid, port)?;
        guard.flush();

        loop {
            let step = guard.core.connect_poll(rid);
            guard.flush();
            match step {
                Ok(Step::Ready(())) => {
                    debug!("[socket] {} connected to port {}", self.pid, port);
                    return Ok(());
                }
                Ok(Step::Blocked(key)) => {
                    if sleep(&mut guard, key, deadline) {
                        let result = guard.core.connect_timeout(rid);
                        guard.flush();
                        if let Err(e) = result {
                            warn!("[socket] {} connect to port {}: {}", self.pid, port, e);
                        }
                        return result;
                    }
                }
                Err(e) => {
                    warn!("[socket] {} connect to port {}: {}", self.pid, port, e);
                    return Err(e);
                }
            }
        }
    }

    /// Close one or both directions of a connected socket
    pub fn shutdown(&self, fid: Fid, mode: ShutdownMode) -> Result<(), KernelError> {
        let mut guard = self.lock();
        guard.core.shutdown(self.pid, fid, mode)?;
        guard.flush();
        Ok(())
    }
}
