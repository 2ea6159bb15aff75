//! # Memory-Mapped Register Access
//!
//! Drivers talk to their device through a window of 32-bit registers.
//! The window is a trait so the same driver code runs against real BAR
//! mappings and against recording mocks.

use core::ptr::NonNull;

/// 32-bit register window
///
/// Offsets are byte offsets from the start of the window.
pub trait RegisterIo: Send + Sync {
    /// Read a 32-bit register
    fn read32(&self, offset: usize) -> u32;

    /// Write a 32-bit register
    fn write32(&self, offset: usize, value: u32);
}

impl<T: RegisterIo + ?Sized> RegisterIo for &T {
    #[inline]
    fn read32(&self, offset: usize) -> u32 {
        (**self).read32(offset)
    }

    #[inline]
    fn write32(&self, offset: usize, value: u32) {
        (**self).write32(offset, value)
    }
}

/// A mapped MMIO region (typically a PCI BAR)
#[derive(Debug)]
pub struct MmioWindow {
    base: NonNull<u8>,
    size: usize,
}

// SAFETY: register accesses are single volatile 32-bit operations; ordering
// between them is the driver's responsibility, not the window's.
unsafe impl Send for MmioWindow {}
unsafe impl Sync for MmioWindow {}

impl MmioWindow {
    /// Wrap an already-mapped register window
    ///
    /// # Safety
    /// `base` must point to `size` bytes of device memory mapped uncached,
    /// valid for the lifetime of the window, and 4-byte aligned.
    pub unsafe fn new(base: NonNull<u8>, size: usize) -> Self {
        debug_assert!(base.as_ptr() as usize % 4 == 0);
        Self { base, size }
    }

    /// Size of the window in bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    fn reg(&self, offset: usize) -> *mut u32 {
        assert!(
            offset % 4 == 0 && offset + 4 <= self.size,
            "register offset {:#x} outside window of {:#x} bytes",
            offset,
            self.size
        );
        // SAFETY: bounds checked above
        unsafe { self.base.as_ptr().add(offset) as *mut u32 }
    }
}

impl RegisterIo for MmioWindow {
    #[inline]
    fn read32(&self, offset: usize) -> u32 {
        // SAFETY: `reg` bounds-checks and `new` guarantees the mapping
        u32::from_le(unsafe { core::ptr::read_volatile(self.reg(offset)) })
    }

    #[inline]
    fn write32(&self, offset: usize, value: u32) {
        // SAFETY: `reg` bounds-checks and `new` guarantees the mapping
        unsafe { core::ptr::write_volatile(self.reg(offset), value.to_le()) }
    }
}
