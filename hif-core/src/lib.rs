//! Host-interface control plane for the WILC family of Wi-Fi chips.
//! This crate turns management intents (scan, join, disconnect, keys,
//! stations, remain-on-channel, beacons) into WID attribute exchanges with
//! the firmware, and turns asynchronous firmware frames back into ordered
//! state-machine tasks.
//!
//! 所有状态变更都经过每个设备唯一的有序任务队列。

pub mod bss;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod hif;
pub mod ie;
pub mod queue;
pub mod registry;
pub mod timer;
pub mod traits;
pub mod transports;
pub mod wid;

pub use hif::{HifState, Vif, Wilc};

use thiserror::Error;

// Shared Error and Result type for the entire crate.

#[derive(Debug, Error)]
pub enum Error {
    #[error("Resource busy: {0}")]
    Busy(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Out of memory while building a {0} buffer")]
    NoMemory(&'static str),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Interface {0} has no active driver state")]
    NoDriver(u8),

    #[error("Device has been torn down")]
    NoDevice,

    #[error("Work queue is not running")]
    QueueClosed,

    #[error("Task was dropped before signalling completion")]
    TaskDropped,

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),
}

/// A specialized `Result` type for this crate's operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reserves an exact-capacity buffer, reporting allocation failure instead of aborting.
pub(crate) fn try_buffer(capacity: usize, what: &'static str) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(capacity)
        .map_err(|_| Error::NoMemory(what))?;
    Ok(buf)
}
