//! # DMA Memory
//!
//! A [`DmaRegion`] is a block of memory visible both to the CPU (through a
//! virtual pointer) and to the device (through a bus address). Everything
//! the device reads or writes by DMA lives in one of these regions.
//!
//! All accessors are volatile and little-endian: the device may change the
//! contents at any time, and the wire format is fixed regardless of host
//! byte order.

use crate::PhysAddr;
use bitflags::bitflags;
use core::ptr::NonNull;

bitflags! {
    /// Cache maintenance operations around a DMA transfer
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DmaSync: u32 {
        /// Device is about to read memory the CPU wrote
        const PREWRITE = 1 << 0;
        /// Device is about to write memory the CPU will read
        const PREREAD = 1 << 1;
        /// Device finished reading
        const POSTWRITE = 1 << 2;
        /// Device finished writing; CPU may now read
        const POSTREAD = 1 << 3;
    }
}

/// One physically contiguous piece of a data buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaSegment {
    /// Bus address of the first byte
    pub addr: PhysAddr,
    /// Length in bytes
    pub len: u32,
}

impl DmaSegment {
    /// Create a new segment
    pub const fn new(addr: PhysAddr, len: u32) -> Self {
        Self { addr, len }
    }
}

/// Device-visible memory region
#[derive(Debug)]
pub struct DmaRegion {
    virt: NonNull<u8>,
    phys: PhysAddr,
    size: usize,
    align: usize,
}

// SAFETY: the region is plain memory; concurrent access discipline between
// CPU contexts is provided by the owning driver's lock, and CPU/device
// ordering by explicit barriers.
unsafe impl Send for DmaRegion {}
unsafe impl Sync for DmaRegion {}

impl DmaRegion {
    /// Build a region from an allocation made by the platform
    ///
    /// # Safety
    /// `virt` must be valid for reads and writes of `size` bytes for as
    /// long as the region exists, and `phys` must be the bus address the
    /// device uses for the same memory.
    pub unsafe fn from_raw_parts(virt: NonNull<u8>, phys: PhysAddr, size: usize, align: usize) -> Self {
        Self { virt, phys, size, align }
    }

    /// CPU pointer to the start of the region
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.virt.as_ptr()
    }

    /// Bus address of the start of the region
    #[inline]
    pub fn phys(&self) -> PhysAddr {
        self.phys
    }

    /// Bus address of `offset` bytes into the region
    #[inline]
    pub fn phys_at(&self, offset: usize) -> PhysAddr {
        assert!(offset <= self.size);
        self.phys.add(offset as u64)
    }

    /// Size in bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Alignment the region was allocated with
    #[inline]
    pub fn align(&self) -> usize {
        self.align
    }

    #[inline]
    fn ptr_at(&self, offset: usize, len: usize) -> *mut u8 {
        assert!(
            offset.checked_add(len).is_some_and(|end| end <= self.size),
            "DMA access {:#x}+{} outside region of {:#x} bytes",
            offset,
            len,
            self.size
        );
        // SAFETY: bounds checked above
        unsafe { self.virt.as_ptr().add(offset) }
    }

    /// Read one byte
    #[inline]
    pub fn read_u8(&self, offset: usize) -> u8 {
        // SAFETY: `ptr_at` bounds-checks
        unsafe { core::ptr::read_volatile(self.ptr_at(offset, 1)) }
    }

    /// Write one byte
    #[inline]
    pub fn write_u8(&self, offset: usize, value: u8) {
        // SAFETY: `ptr_at` bounds-checks
        unsafe { core::ptr::write_volatile(self.ptr_at(offset, 1), value) }
    }

    /// Read a little-endian u16
    #[inline]
    pub fn read_u16(&self, offset: usize) -> u16 {
        let p = self.ptr_at(offset, 2) as *const u16;
        // SAFETY: bounds checked; unaligned read since frame fields are packed
        u16::from_le(unsafe { core::ptr::read_unaligned(p) })
    }

    /// Write a little-endian u16
    #[inline]
    pub fn write_u16(&self, offset: usize, value: u16) {
        self.write_bytes(offset, &value.to_le_bytes());
    }

    /// Read a little-endian u32
    #[inline]
    pub fn read_u32(&self, offset: usize) -> u32 {
        let p = self.ptr_at(offset, 4) as *const u32;
        if p as usize % 4 == 0 {
            // SAFETY: bounds checked and aligned
            u32::from_le(unsafe { core::ptr::read_volatile(p) })
        } else {
            // SAFETY: bounds checked
            u32::from_le(unsafe { core::ptr::read_unaligned(p) })
        }
    }

    /// Write a little-endian u32
    #[inline]
    pub fn write_u32(&self, offset: usize, value: u32) {
        let p = self.ptr_at(offset, 4) as *mut u32;
        if p as usize % 4 == 0 {
            // SAFETY: bounds checked and aligned
            unsafe { core::ptr::write_volatile(p, value.to_le()) }
        } else {
            self.write_bytes(offset, &value.to_le_bytes());
        }
    }

    /// Write a little-endian u64
    #[inline]
    pub fn write_u64(&self, offset: usize, value: u64) {
        self.write_bytes(offset, &value.to_le_bytes());
    }

    /// Read a little-endian u64
    #[inline]
    pub fn read_u64(&self, offset: usize) -> u64 {
        let mut bytes = [0u8; 8];
        self.read_bytes(offset, &mut bytes);
        u64::from_le_bytes(bytes)
    }

    /// Copy bytes into the region
    pub fn write_bytes(&self, offset: usize, src: &[u8]) {
        let p = self.ptr_at(offset, src.len());
        for (i, byte) in src.iter().enumerate() {
            // SAFETY: the whole range was bounds-checked
            unsafe { core::ptr::write_volatile(p.add(i), *byte) }
        }
    }

    /// Copy bytes out of the region
    pub fn read_bytes(&self, offset: usize, dst: &mut [u8]) {
        let p = self.ptr_at(offset, dst.len());
        for (i, byte) in dst.iter_mut().enumerate() {
            // SAFETY: the whole range was bounds-checked
            *byte = unsafe { core::ptr::read_volatile(p.add(i)) };
        }
    }

    /// Fill a byte range with `value`
    pub fn fill(&self, offset: usize, len: usize, value: u8) {
        let p = self.ptr_at(offset, len);
        for i in 0..len {
            // SAFETY: the whole range was bounds-checked
            unsafe { core::ptr::write_volatile(p.add(i), value) }
        }
    }
}
