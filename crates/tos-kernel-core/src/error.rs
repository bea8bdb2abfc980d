//! Kernel error type

use core::fmt;

/// Errors returned by kernel operations.
///
/// End-of-stream is not an error (reads return `Ok(0)`), and neither is a
/// partial transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelError {
    // === Processes ===
    /// Any-child wait with no live or zombie children
    NoChildren,
    /// Pid is out of range, unused, or not a direct child of the caller
    NotAChild,
    /// Pid does not name a process
    InvalidPid,
    /// No free process table slots
    ProcessTableFull,

    // === Threads ===
    /// Thread id is not owned by the caller's process
    UnknownThread,
    /// A thread tried to join itself
    JoinSelf,
    /// Target thread is detached
    ThreadDetached,
    /// Target thread already exited
    ThreadExited,
    /// The platform could not spawn an execution context
    SpawnFailed,

    // === Streams ===
    /// Descriptor is out of range or unbound
    BadDescriptor,
    /// Per-process descriptor table is full
    DescriptorTableFull,
    /// System-wide open stream table is full
    FileTableFull,
    /// Stream has no read side (or it was shut down)
    NotReadable,
    /// Stream has no write side (or it was shut down)
    NotWritable,
    /// Writing to a pipe whose reader is closed
    BrokenPipe,

    // === Sockets ===
    /// Socket is not in the state the operation requires
    WrongSocketState,
    /// Port is out of range, or `NOPORT` where a real port is needed
    InvalidPort,
    /// Another listener already owns the port
    PortInUse,
    /// No listener is bound to the port
    NoListener,
    /// The listener was closed while the call was blocked
    ListenerClosed,
    /// The listener refused or dropped the request
    ConnectionRefused,
    /// Connect timed out before being admitted
    Timeout,

    // === Configuration ===
    /// Configuration rejected
    InvalidConfig(&'static str),
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::NoChildren => write!(f, "no children to wait for"),
            KernelError::NotAChild => write!(f, "not a child of the calling process"),
            KernelError::InvalidPid => write!(f, "invalid process id"),
            KernelError::ProcessTableFull => write!(f, "process table full"),
            KernelError::UnknownThread => write!(f, "unknown thread"),
            KernelError::JoinSelf => write!(f, "thread cannot join itself"),
            KernelError::ThreadDetached => write!(f, "thread is detached"),
            KernelError::ThreadExited => write!(f, "thread already exited"),
            KernelError::SpawnFailed => write!(f, "failed to spawn execution context"),
            KernelError::BadDescriptor => write!(f, "bad file descriptor"),
            KernelError::DescriptorTableFull => write!(f, "descriptor table full"),
            KernelError::FileTableFull => write!(f, "open file table full"),
            KernelError::NotReadable => write!(f, "stream not readable"),
            KernelError::NotWritable => write!(f, "stream not writable"),
            KernelError::BrokenPipe => write!(f, "broken pipe"),
            KernelError::WrongSocketState => write!(f, "wrong socket state"),
            KernelError::InvalidPort => write!(f, "invalid port"),
            KernelError::PortInUse => write!(f, "port in use"),
            KernelError::NoListener => write!(f, "no listener on port"),
            KernelError::ListenerClosed => write!(f, "listener closed"),
            KernelError::ConnectionRefused => write!(f, "connection refused"),
            KernelError::Timeout => write!(f, "timed out"),
            KernelError::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}
