//! Wait channels
//!
//! The core never blocks. An operation that cannot make progress reports
//! the channel it would sleep on, and every state change that could let a
//! sleeper proceed records a wakeup. The runtime maps each [`WaitKey`] to a
//! condition variable and drains the wakeups after every call.

use alloc::vec::Vec;

use crate::types::{Pid, PipeId, RequestId, SocketId, Tid};

/// Identity of one condition a thread can sleep on
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WaitKey {
    /// A child of this process became a zombie
    ChildExit(Pid),
    /// The init process became a zombie (host-side boot waiter)
    InitExit,
    /// A thread exited or was detached
    ThreadExit(Tid),
    /// Pipe has room, or its reader closed
    PipeSpace(PipeId),
    /// Pipe has data, or its writer closed
    PipeData(PipeId),
    /// Listener queue gained a request, or the listener closed
    RequestAvailable(SocketId),
    /// Connection request was admitted or refused
    Connected(RequestId),
}

/// How many sleepers to wake
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wake {
    Signal(WaitKey),
    Broadcast(WaitKey),
}

/// Outcome of an operation that may have to sleep
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step<T> {
    /// Finished with a result
    Ready(T),
    /// Sleep on the key, then retry
    Blocked(WaitKey),
}

/// Pending wakeups accumulated by state mutations
#[derive(Clone, Debug, Default)]
pub struct Wakeups(Vec<Wake>);

impl Wakeups {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn signal(&mut self, key: WaitKey) {
        self.0.push(Wake::Signal(key));
    }

    pub fn broadcast(&mut self, key: WaitKey) {
        self.0.push(Wake::Broadcast(key));
    }

    pub fn take(&mut self) -> Vec<Wake> {
        core::mem::take(&mut self.0)
    }

    pub fn contains(&self, key: WaitKey) -> bool {
        self.0
            .iter()
            .any(|w| matches!(w, Wake::Signal(k) | Wake::Broadcast(k) if *k == key))
    }
}
