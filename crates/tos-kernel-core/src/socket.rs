//! Sockets
//!
//! A socket starts `Unbound`. `listen` turns it into a `Listener` owning a
//! port; a successful connect/accept rendezvous turns the requester and a
//! freshly allocated socket on the accepting side into a pair of `Peer`s
//! joined by two pipes, one per direction.
//!
//! A socket holds one reference for its descriptor plus one for each
//! in-flight accept (on a listener) or connect (on the requester), and is
//! freed when the count reaches zero.

use alloc::collections::VecDeque;

use crate::error::KernelError;
use crate::file::Stream;
use crate::pipe::Pipe;
use crate::state::KernelState;
use crate::types::{Fid, Pid, PipeId, Port, RequestId, ShutdownMode, SocketId, NOPORT};
use crate::wait::{Step, WaitKey};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketKind {
    Unbound,
    Listener {
        /// Pending requests, oldest first
        queue: VecDeque<RequestId>,
    },
    Peer {
        peer: Option<SocketId>,
        /// Pipe this side writes into; `None` after write shutdown
        outbound: Option<PipeId>,
        /// Pipe this side reads from; `None` after read shutdown
        inbound: Option<PipeId>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Socket {
    pub port: Port,
    pub refcount: usize,
    pub kind: SocketKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestState {
    Pending,
    Admitted,
    Refused,
}

/// A connect call parked on a listener's queue
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionRequest {
    pub requester: SocketId,
    pub listener: SocketId,
    pub state: RequestState,
}

impl KernelState {
    /// Create an unbound socket bound to a new descriptor of `pid`
    pub fn create_socket(&mut self, pid: Pid, port: Port) -> Result<Fid, KernelError> {
        if port > self.config.max_port {
            return Err(KernelError::InvalidPort);
        }
        self.can_install(pid, 1)?;
        let sid = self.alloc_socket_id();
        self.sockets.insert(
            sid,
            Socket {
                port,
                refcount: 1,
                kind: SocketKind::Unbound,
            },
        );
        let fids = self.install(pid, &[Stream::Socket(sid)])?;
        Ok(fids[0])
    }

    fn socket(&self, sid: SocketId) -> Result<&Socket, KernelError> {
        self.sockets.get(&sid).ok_or(KernelError::BadDescriptor)
    }

    fn check_port(&self, port: Port) -> Result<(), KernelError> {
        if port == NOPORT || port > self.config.max_port {
            return Err(KernelError::InvalidPort);
        }
        Ok(())
    }

    /// A listener still owns its port; closing it unmaps the port
    fn is_listening(&self, sid: SocketId) -> bool {
        self.sockets
            .get(&sid)
            .map_or(false, |s| self.ports.get(&s.port) == Some(&sid))
    }

    /// Make the socket behind `fid` a listener on its port
    pub fn listen(&mut self, pid: Pid, fid: Fid) -> Result<(), KernelError> {
        let sid = self.socket_of(pid, fid)?;
        let socket = self.socket(sid)?;
        if socket.kind != SocketKind::Unbound {
            return Err(KernelError::WrongSocketState);
        }
        let port = socket.port;
        self.check_port(port)?;
        if self.ports.contains_key(&port) {
            return Err(KernelError::PortInUse);
        }

        self.ports.insert(port, sid);
        if let Some(socket) = self.sockets.get_mut(&sid) {
            socket.kind = SocketKind::Listener {
                queue: VecDeque::new(),
            };
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Accept
    // ------------------------------------------------------------------------

    /// Validate an accept on `fid` and pin the listener for its duration
    pub fn accept_begin(&mut self, pid: Pid, fid: Fid) -> Result<SocketId, KernelError> {
        let sid = self.socket_of(pid, fid)?;
        if !matches!(self.socket(sid)?.kind, SocketKind::Listener { .. }) {
            return Err(KernelError::WrongSocketState);
        }
        if !self.is_listening(sid) {
            return Err(KernelError::ListenerClosed);
        }
        if let Some(socket) = self.sockets.get_mut(&sid) {
            socket.refcount += 1;
        }
        Ok(sid)
    }

    /// Admit the oldest queued request, or report that the caller must wait.
    ///
    /// Any result other than `Blocked` drops the reference taken by
    /// `accept_begin`.
    pub fn accept_poll(&mut self, pid: Pid, listener: SocketId) -> Result<Step<Fid>, KernelError> {
        let result = self.accept_next(pid, listener);
        if result.is_err() && self.has_queued_requests(listener) {
            // Hand the consumed wakeup to another accepter on this listener
            self.wakeups.signal(WaitKey::RequestAvailable(listener));
        }
        if !matches!(result, Ok(Step::Blocked(_))) {
            self.socket_decref(listener);
        }
        result
    }

    fn has_queued_requests(&self, listener: SocketId) -> bool {
        self.is_listening(listener)
            && matches!(
                self.sockets.get(&listener).map(|s| &s.kind),
                Some(SocketKind::Listener { queue }) if !queue.is_empty()
            )
    }

    fn accept_next(&mut self, pid: Pid, listener: SocketId) -> Result<Step<Fid>, KernelError> {
        loop {
            if !self.is_listening(listener) {
                return Err(KernelError::ListenerClosed);
            }
            let port = self.socket(listener)?.port;
            let queue_empty = match &self.socket(listener)?.kind {
                SocketKind::Listener { queue } => queue.is_empty(),
                _ => return Err(KernelError::WrongSocketState),
            };
            if queue_empty {
                return Ok(Step::Blocked(WaitKey::RequestAvailable(listener)));
            }

            // Reserve before popping so a full table leaves the request queued
            self.can_install(pid, 1)?;

            let Some(rid) = self.sockets.get_mut(&listener).and_then(|s| match &mut s.kind {
                SocketKind::Listener { queue } => queue.pop_front(),
                _ => None,
            }) else {
                continue;
            };

            let requester = match self.requests.get(&rid) {
                Some(req) => req.requester,
                None => continue,
            };
            let unbound = self
                .sockets
                .get(&requester)
                .map_or(false, |s| s.kind == SocketKind::Unbound);
            if !unbound {
                self.refuse_request(rid);
                continue;
            }

            let fid = self.establish(pid, port, requester)?;
            if let Some(req) = self.requests.get_mut(&rid) {
                req.state = RequestState::Admitted;
            }
            self.wakeups.signal(WaitKey::Connected(rid));
            return Ok(Step::Ready(fid));
        }
    }

    /// Create the accepting side's socket and cross-wire both peers
    fn establish(&mut self, pid: Pid, port: Port, requester: SocketId) -> Result<Fid, KernelError> {
        let accepted = self.alloc_socket_id();
        let fid = self.install(pid, &[Stream::Socket(accepted)])?[0];

        let to_requester = self.alloc_pipe_id();
        let to_accepted = self.alloc_pipe_id();
        let ring = self.config.pipe_buffer_size;
        self.pipes.insert(to_requester, Pipe::new(ring));
        self.pipes.insert(to_accepted, Pipe::new(ring));

        self.sockets.insert(
            accepted,
            Socket {
                port,
                refcount: 1,
                kind: SocketKind::Peer {
                    peer: Some(requester),
                    outbound: Some(to_requester),
                    inbound: Some(to_accepted),
                },
            },
        );
        if let Some(socket) = self.sockets.get_mut(&requester) {
            socket.kind = SocketKind::Peer {
                peer: Some(accepted),
                outbound: Some(to_accepted),
                inbound: Some(to_requester),
            };
        }
        Ok(fid)
    }

    fn refuse_request(&mut self, rid: RequestId) {
        if let Some(req) = self.requests.get_mut(&rid) {
            req.state = RequestState::Refused;
            self.wakeups.signal(WaitKey::Connected(rid));
        }
    }

    // ------------------------------------------------------------------------
    // Connect
    // ------------------------------------------------------------------------

    /// Queue a connection request from the socket behind `fid` to the
    /// listener on `port`
    pub fn connect_begin(&mut self, pid: Pid, fid: Fid, port: Port) -> Result<RequestId, KernelError> {
        let sid = self.socket_of(pid, fid)?;
        if self.socket(sid)?.kind != SocketKind::Unbound {
            return Err(KernelError::WrongSocketState);
        }
        self.check_port(port)?;
        let listener = *self.ports.get(&port).ok_or(KernelError::NoListener)?;

        let rid = self.alloc_request_id();
        self.requests.insert(
            rid,
            ConnectionRequest {
                requester: sid,
                listener,
                state: RequestState::Pending,
            },
        );
        if let Some(socket) = self.sockets.get_mut(&sid) {
            socket.refcount += 1;
        }
        if let Some(Socket {
            kind: SocketKind::Listener { queue },
            ..
        }) = self.sockets.get_mut(&listener)
        {
            queue.push_back(rid);
        }
        self.wakeups.signal(WaitKey::RequestAvailable(listener));
        Ok(rid)
    }

    /// Check whether a request has been decided
    pub fn connect_poll(&mut self, rid: RequestId) -> Result<Step<()>, KernelError> {
        let state = self
            .requests
            .get(&rid)
            .map(|r| r.state)
            .ok_or(KernelError::ConnectionRefused)?;
        match state {
            RequestState::Pending => Ok(Step::Blocked(WaitKey::Connected(rid))),
            RequestState::Admitted => {
                self.finish_request(rid);
                Ok(Step::Ready(()))
            }
            RequestState::Refused => {
                self.finish_request(rid);
                Err(KernelError::ConnectionRefused)
            }
        }
    }

    /// Give up on a request whose wait timed out.
    ///
    /// A request decided at the same instant still reports its decision.
    pub fn connect_timeout(&mut self, rid: RequestId) -> Result<(), KernelError> {
        let Some(req) = self.requests.get(&rid) else {
            return Err(KernelError::Timeout);
        };
        if req.state != RequestState::Pending {
            return match self.connect_poll(rid)? {
                Step::Ready(()) => Ok(()),
                Step::Blocked(_) => Err(KernelError::Timeout),
            };
        }

        let listener = req.listener;
        if let Some(Socket {
            kind: SocketKind::Listener { queue },
            ..
        }) = self.sockets.get_mut(&listener)
        {
            queue.retain(|r| *r != rid);
        }
        self.finish_request(rid);
        Err(KernelError::Timeout)
    }

    fn finish_request(&mut self, rid: RequestId) {
        if let Some(req) = self.requests.remove(&rid) {
            self.socket_decref(req.requester);
        }
    }

    // ------------------------------------------------------------------------
    // Data transfer and shutdown
    // ------------------------------------------------------------------------

    pub fn socket_read(&mut self, sid: SocketId, out: &mut [u8]) -> Result<Step<usize>, KernelError> {
        let pipe = match &self.socket(sid)?.kind {
            SocketKind::Peer {
                inbound: Some(pipe),
                ..
            } => *pipe,
            SocketKind::Peer { inbound: None, .. } => return Err(KernelError::NotReadable),
            _ => return Err(KernelError::WrongSocketState),
        };
        self.pipe_read(pipe, out)
    }

    pub fn socket_write(&mut self, sid: SocketId, data: &[u8]) -> Result<Step<usize>, KernelError> {
        let pipe = match &self.socket(sid)?.kind {
            SocketKind::Peer {
                outbound: Some(pipe),
                ..
            } => *pipe,
            SocketKind::Peer { outbound: None, .. } => return Err(KernelError::NotWritable),
            _ => return Err(KernelError::WrongSocketState),
        };
        self.pipe_write(pipe, data)
    }

    /// Close one or both directions of a peer socket
    pub fn shutdown(&mut self, pid: Pid, fid: Fid, mode: ShutdownMode) -> Result<(), KernelError> {
        let sid = self.socket_of(pid, fid)?;
        let Some(Socket {
            kind: SocketKind::Peer {
                outbound, inbound, ..
            },
            ..
        }) = self.sockets.get_mut(&sid)
        else {
            return Err(KernelError::WrongSocketState);
        };

        let reader = match mode {
            ShutdownMode::Read | ShutdownMode::Both => inbound.take(),
            ShutdownMode::Write => None,
        };
        let writer = match mode {
            ShutdownMode::Write | ShutdownMode::Both => outbound.take(),
            ShutdownMode::Read => None,
        };
        if let Some(pipe) = reader {
            self.pipe_close_reader(pipe);
        }
        if let Some(pipe) = writer {
            self.pipe_close_writer(pipe);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Close and release
    // ------------------------------------------------------------------------

    /// Close operation run when the socket's last descriptor goes away
    pub(crate) fn socket_close(&mut self, sid: SocketId) {
        self.socket_disconnect(sid);
        self.socket_decref(sid);
    }

    /// Unmap a listener and refuse its queue, or close a peer's pipes
    fn socket_disconnect(&mut self, sid: SocketId) {
        let Some(socket) = self.sockets.get_mut(&sid) else {
            return;
        };
        let port = socket.port;
        match &mut socket.kind {
            SocketKind::Unbound => {}
            SocketKind::Listener { queue } => {
                let refused: VecDeque<RequestId> = core::mem::take(queue);
                if self.ports.get(&port) == Some(&sid) {
                    self.ports.remove(&port);
                }
                for rid in refused {
                    self.refuse_request(rid);
                }
                self.wakeups.broadcast(WaitKey::RequestAvailable(sid));
            }
            SocketKind::Peer {
                outbound, inbound, ..
            } => {
                let (writer, reader) = (outbound.take(), inbound.take());
                if let Some(pipe) = writer {
                    self.pipe_close_writer(pipe);
                }
                if let Some(pipe) = reader {
                    self.pipe_close_reader(pipe);
                }
            }
        }
    }

    pub(crate) fn socket_decref(&mut self, sid: SocketId) {
        let Some(socket) = self.sockets.get_mut(&sid) else {
            return;
        };
        socket.refcount -= 1;
        if socket.refcount > 0 {
            return;
        }

        self.socket_disconnect(sid);
        if let Some(Socket {
            kind: SocketKind::Peer {
                peer: Some(peer), ..
            },
            ..
        }) = self.sockets.remove(&sid)
        {
            if let Some(Socket {
                kind: SocketKind::Peer { peer: back, .. },
                ..
            }) = self.sockets.get_mut(&peer)
            {
                *back = None;
            }
        }
    }
}
