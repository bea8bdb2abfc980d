//! Hardware Abstraction Layer trait for Tiny OS
//!
//! This crate defines the HAL trait that lets the kernel run its logical
//! threads on top of whatever execution substrate the platform offers,
//! by abstracting the scheduler's spawn and suspend primitives.
//!
//! # Platform Implementations
//!
//! - **Host (`std` feature)**: one OS thread per execution context, see [`StdHal`]
//! - **Bare Metal**: a cooperative dispatcher supplied by the board crate

#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

use alloc::boxed::Box;
use core::fmt;

#[cfg(feature = "std")]
mod std_hal;

#[cfg(feature = "std")]
pub use std_hal::StdHal;

/// Entry point handed to a freshly spawned execution context
pub type ContextEntry = Box<dyn FnOnce() + Send + 'static>;

/// Hardware Abstraction Layer trait
///
/// Implementations provide the scheduler primitives the kernel consumes:
/// - Spawning an execution context that runs a kernel entry stub
/// - Permanently suspending the calling execution context
///
/// Mutual exclusion and condition variables are not part of the HAL. The
/// kernel owns its lock and wait channels directly.
pub trait HAL: Send + Sync + 'static {
    // === Execution Contexts ===

    /// Spawn a new execution context running `entry`
    ///
    /// The context is released to run immediately. Callers must have
    /// finished publishing any state the entry reads before calling this.
    ///
    /// # Arguments
    /// * `name` - Human-readable context name for debugging
    /// * `entry` - Entry stub to execute
    ///
    /// # Returns
    /// * `Ok(())` - Context spawned
    /// * `Err(HalError::ContextSpawnFailed)` - Platform refused a new context
    fn spawn_context(&self, name: &str, entry: ContextEntry) -> Result<(), HalError>;

    /// Suspend the calling execution context forever
    ///
    /// Called by the kernel once a logical thread has exited and all of its
    /// bookkeeping is released. Must only be called from a context that was
    /// created through [`HAL::spawn_context`].
    fn exit_context(&self) -> !;
}

/// HAL errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HalError {
    /// Failed to spawn an execution context
    ContextSpawnFailed,
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HalError::ContextSpawnFailed => write!(f, "failed to spawn execution context"),
        }
    }
}
