//! # MFI Command Engine
//!
//! The submission / completion core of a driver for queue-based RAID
//! host bus adapters speaking the MFI frame protocol.
//!
//! ## Components
//!
//! - [`slot::CommandSlotPool`]: fixed arena of reusable command slots with an
//!   O(1) free list of indices
//! - [`frame`] / [`sgl`]: native frame encoding and scatter-gather lists
//! - [`bringup`]: firmware state machine taking the adapter to READY
//! - [`ring::ReplyRing`]: DMA-shared producer/consumer ring of completed
//!   slot indices
//! - [`profile`]: the per-generation register contract behind one trait
//! - [`controller::Controller`]: owns all of the above and drives attach,
//!   submit, dispatch, watchdog, reset and detach
//!
//! ## Data Flow
//!
//! ```text
//! submit -> acquire slot -> encode frame + SGL -> profile.post
//!        ... hardware ...
//! reply ring entry -> dispatch -> completion callback -> release slot
//! ```
//!
//! ## Locking
//!
//! One spin lock per controller covers the slot pool and the ring cursors.
//! It is taken from caller context, always with the CPU's interrupts
//! masked, and from the interrupt path. Completion callbacks run with it
//! held and must not block or re-enter the controller. The firmware
//! handshake of a reset runs outside the lock.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod bringup;
pub mod config;
pub mod controller;
pub mod frame;
pub mod profile;
pub mod regs;
pub mod ring;
pub mod sgl;
pub mod slot;
pub mod stats;

#[cfg(test)]
mod mock;

pub use bringup::{FirmwareState, FwStatus};
pub use config::ControllerConfig;
pub use controller::{CommandResult, Completion, CompletionRecord, Controller, ControllerState};
pub use frame::{CommandBody, CommandRequest, Direction, FrameStatus, Opcode, Target};
pub use ring::ReplyRingLayout;
pub use profile::{AnyProfile, DeviceId, FramePost, HardwareProfile};
pub use sgl::{DataDescriptor, SglFormat};
pub use slot::{SlotHandle, SlotState};

use hba_hal::HalError;

/// Result type for engine operations
pub type MfiResult<T> = Result<T, MfiError>;

/// Engine errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MfiError {
    /// Every command slot is in use; retry after completions
    ResourceShortage,
    /// The data needs more scatter-gather entries than the adapter accepts
    TooFragmented {
        /// Segments in the request
        segments: usize,
        /// Adapter limit
        max: usize,
    },
    /// The adapter executed the command and reported failure
    CommandFailed(FrameStatus),
    /// The link to the adapter is unusable (stuck firmware, double fault,
    /// watchdog expiry, or permanent failure after reset)
    WireFault,
    /// The firmware reported its FAULT state
    FirmwareFault,
    /// The firmware did not leave a state within its wait budget
    FirmwareStuck(FirmwareState),
    /// The firmware reported a state outside the known set
    UnknownFirmwareState(u32),
    /// A synchronous command did not complete in time
    Timeout,
    /// No hardware profile matches the device identification
    UnsupportedDevice(DeviceId),
    /// The platform could not provide DMA memory or a mapping
    Dma(HalError),
}

impl MfiError {
    /// Errors that leave the adapter in an unknown state and call for a
    /// full controller reset
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MfiError::WireFault
                | MfiError::FirmwareFault
                | MfiError::FirmwareStuck(_)
                | MfiError::UnknownFirmwareState(_)
                | MfiError::Timeout
        )
    }
}

impl From<HalError> for MfiError {
    fn from(e: HalError) -> Self {
        MfiError::Dma(e)
    }
}

impl core::fmt::Display for MfiError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MfiError::ResourceShortage => f.write_str("no free command slot"),
            MfiError::TooFragmented { segments, max } => {
                write!(f, "{} segments exceed the limit of {}", segments, max)
            }
            MfiError::CommandFailed(status) => write!(f, "command failed with status {:#04x}", status.raw()),
            MfiError::WireFault => f.write_str("controller unavailable"),
            MfiError::FirmwareFault => f.write_str("firmware fault"),
            MfiError::FirmwareStuck(state) => write!(f, "firmware stuck in state {:?}", state),
            MfiError::UnknownFirmwareState(raw) => write!(f, "unknown firmware state {:#x}", raw),
            MfiError::Timeout => f.write_str("command timed out"),
            MfiError::UnsupportedDevice(id) => {
                write!(f, "unsupported device {:04x}:{:04x}", id.vendor, id.product)
            }
            MfiError::Dma(e) => write!(f, "DMA: {}", e),
        }
    }
}
