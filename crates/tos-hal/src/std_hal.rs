//! Host HAL backed by OS threads

use alloc::boxed::Box;
use alloc::string::String;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crate::{ContextEntry, HalError, HAL};

/// Unwind payload used to retire a context from inside kernel code
struct ContextExit;

/// HAL that maps every execution context onto a detached OS thread.
///
/// `exit_context` unwinds the calling thread back to its spawn frame, where
/// the marker payload is swallowed and the thread ends quietly. Any other
/// panic is propagated unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdHal;

impl StdHal {
    pub fn new() -> Self {
        Self
    }
}

impl HAL for StdHal {
    fn spawn_context(&self, name: &str, entry: ContextEntry) -> Result<(), HalError> {
        thread::Builder::new()
            .name(String::from(name))
            .spawn(move || {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(entry)) {
                    if !payload.is::<ContextExit>() {
                        panic::resume_unwind(payload);
                    }
                }
            })
            .map(|_| ())
            .map_err(|_| HalError::ContextSpawnFailed)
    }

    fn exit_context(&self) -> ! {
        panic::resume_unwind(Box::new(ContextExit))
    }
}
