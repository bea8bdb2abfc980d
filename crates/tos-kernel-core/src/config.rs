//! Kernel configuration
//!
//! Table capacities and limits fixed at boot. Loadable from JSON; fields
//! that are absent keep their defaults.

use serde::{Deserialize, Serialize};

use crate::error::KernelError;
use crate::types::Port;

/// Default process table capacity
pub const DEFAULT_MAX_PROC: usize = 1024;
/// Default per-process descriptor slots
pub const DEFAULT_MAX_FILEID: usize = 16;
/// Default system-wide open stream slots
pub const DEFAULT_MAX_FILES: usize = 1024;
/// Default pipe ring size (one slot stays empty)
pub const DEFAULT_PIPE_BUFFER_SIZE: usize = 16384;
/// Default highest valid port
pub const DEFAULT_MAX_PORT: Port = 1023;

/// Boot-time kernel limits
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Process table capacity (includes idle and init)
    pub max_proc: usize,
    /// Descriptor slots per process
    pub max_fileid: usize,
    /// Open stream slots shared by all processes
    pub max_files: usize,
    /// Ring size of every pipe, including the reserved empty slot
    pub pipe_buffer_size: usize,
    /// Highest port a socket may bind
    pub max_port: Port,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_proc: DEFAULT_MAX_PROC,
            max_fileid: DEFAULT_MAX_FILEID,
            max_files: DEFAULT_MAX_FILES,
            pipe_buffer_size: DEFAULT_PIPE_BUFFER_SIZE,
            max_port: DEFAULT_MAX_PORT,
        }
    }
}

impl KernelConfig {
    /// Parse and validate a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self, KernelError> {
        let config: KernelConfig = serde_json::from_str(json)
            .map_err(|_| KernelError::InvalidConfig("malformed JSON"))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every limit leaves the kernel able to boot and move data
    pub fn validate(&self) -> Result<(), KernelError> {
        if self.max_proc < 2 {
            return Err(KernelError::InvalidConfig(
                "max_proc must hold idle and init",
            ));
        }
        if self.max_fileid == 0 {
            return Err(KernelError::InvalidConfig("max_fileid must be non-zero"));
        }
        if self.max_files == 0 {
            return Err(KernelError::InvalidConfig("max_files must be non-zero"));
        }
        if self.pipe_buffer_size < 2 {
            return Err(KernelError::InvalidConfig(
                "pipe_buffer_size must be at least 2",
            ));
        }
        if self.max_port == 0 {
            return Err(KernelError::InvalidConfig("max_port must be non-zero"));
        }
        Ok(())
    }
}
