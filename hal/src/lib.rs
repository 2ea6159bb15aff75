//! # HBA HAL - Platform Abstraction Layer
//!
//! This crate defines the platform services a host-bus-adapter driver core
//! consumes without owning: register access, DMA memory, buffer mapping,
//! delays and memory ordering.
//!
//! ## Design Philosophy
//!
//! The HAL is designed to be:
//! - **Minimal**: Only exposes what a queue-based storage driver needs
//! - **Safe**: Encapsulates the volatile and raw-pointer accesses
//! - **Mockable**: Every service is a trait so drivers can be exercised
//!   against simulated hardware

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod mmio;
pub mod dma;
pub mod platform;

pub use dma::{DmaRegion, DmaSegment, DmaSync};
pub use mmio::{MmioWindow, RegisterIo};
pub use platform::Platform;

/// Result type for HAL operations
pub type HalResult<T> = Result<T, HalError>;

/// Errors that can occur in HAL operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// The operation is not supported on this platform
    NotSupported,
    /// Invalid parameter provided
    InvalidParameter,
    /// Hardware reported an error
    HardwareError,
    /// Operation timed out
    Timeout,
    /// Address is invalid or not aligned
    InvalidAddress,
    /// Memory allocation failed
    OutOfMemory,
}

impl core::fmt::Display for HalError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            HalError::NotSupported => "operation not supported",
            HalError::InvalidParameter => "invalid parameter",
            HalError::HardwareError => "hardware error",
            HalError::Timeout => "timed out",
            HalError::InvalidAddress => "invalid address",
            HalError::OutOfMemory => "out of DMA memory",
        };
        f.write_str(msg)
    }
}

/// Bus (physical / device-visible) address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct PhysAddr(u64);

static_assertions::assert_eq_size!(PhysAddr, u64);

impl PhysAddr {
    /// Create a new physical address
    #[inline]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Get the raw address value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Low 32 bits, as split across `_lo`/`_hi` register or frame fields
    #[inline]
    pub const fn lo(self) -> u32 {
        self.0 as u32
    }

    /// High 32 bits
    #[inline]
    pub const fn hi(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Does the address fit a 32-bit bus cycle?
    #[inline]
    pub const fn is_32bit(self) -> bool {
        self.0 >> 32 == 0
    }

    /// Check if the address is aligned to the given alignment
    #[inline]
    pub const fn is_aligned(self, align: u64) -> bool {
        self.0 % align == 0
    }

    /// Align the address up to the given alignment
    #[inline]
    pub const fn align_up(self, align: u64) -> Self {
        Self((self.0 + align - 1) & !(align - 1))
    }

    /// Add an offset to the address
    #[inline]
    pub const fn add(self, offset: u64) -> Self {
        Self(self.0 + offset)
    }
}

impl core::fmt::LowerHex for PhysAddr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::LowerHex::fmt(&self.0, f)
    }
}
