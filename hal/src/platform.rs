//! # Platform Services
//!
//! The aggregate trait a driver instance is built on. One `Platform` value
//! is supplied per physical device at attach time; it owns the device's
//! register mapping and hands out DMA memory.

use crate::dma::{DmaRegion, DmaSegment, DmaSync};
use crate::mmio::RegisterIo;
use crate::HalResult;
use alloc::vec::Vec;
use core::sync::atomic::{fence, Ordering};

/// Platform services consumed by a driver core
pub trait Platform: Send + Sync {
    /// Register window type
    type Registers: RegisterIo;

    /// The device's register window
    fn registers(&self) -> &Self::Registers;

    /// Allocate zeroed, device-visible memory
    fn allocate_dma_region(&self, size: usize, align: usize) -> HalResult<DmaRegion>;

    /// Return memory obtained from [`Platform::allocate_dma_region`]
    fn free_dma_region(&self, region: DmaRegion);

    /// Translate a CPU buffer into the bus segments that back it
    fn map_buffer(&self, buffer: &[u8]) -> HalResult<Vec<DmaSegment>>;

    /// Cache maintenance for a region around a device access
    fn sync_region(&self, _region: &DmaRegion, _offset: usize, _len: usize, _ops: DmaSync) {}

    /// Cache maintenance for caller-supplied data segments
    fn sync_segments(&self, _segments: &[DmaSegment], _ops: DmaSync) {}

    /// Busy-wait for the given number of microseconds
    fn delay_us(&self, us: u32);

    /// Execute with this CPU's interrupts disabled
    ///
    /// Restores the previous interrupt state afterwards. Locks that the
    /// device's interrupt handler also takes must only be taken from
    /// caller context inside this.
    fn without_interrupts<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R;

    /// Full memory barrier
    #[inline]
    fn memory_barrier(&self) {
        fence(Ordering::SeqCst);
    }

    /// Order earlier device-memory reads before later reads
    #[inline]
    fn read_barrier(&self) {
        fence(Ordering::Acquire);
    }

    /// Order earlier writes before a later doorbell write
    #[inline]
    fn write_barrier(&self) {
        fence(Ordering::Release);
    }
}

impl<T: Platform + ?Sized> Platform for &T {
    type Registers = T::Registers;

    #[inline]
    fn registers(&self) -> &Self::Registers {
        (**self).registers()
    }

    fn allocate_dma_region(&self, size: usize, align: usize) -> HalResult<DmaRegion> {
        (**self).allocate_dma_region(size, align)
    }

    fn free_dma_region(&self, region: DmaRegion) {
        (**self).free_dma_region(region)
    }

    fn map_buffer(&self, buffer: &[u8]) -> HalResult<Vec<DmaSegment>> {
        (**self).map_buffer(buffer)
    }

    fn sync_region(&self, region: &DmaRegion, offset: usize, len: usize, ops: DmaSync) {
        (**self).sync_region(region, offset, len, ops)
    }

    fn sync_segments(&self, segments: &[DmaSegment], ops: DmaSync) {
        (**self).sync_segments(segments, ops)
    }

    #[inline]
    fn delay_us(&self, us: u32) {
        (**self).delay_us(us)
    }

    #[inline]
    fn without_interrupts<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        (**self).without_interrupts(f)
    }

    #[inline]
    fn memory_barrier(&self) {
        (**self).memory_barrier()
    }

    #[inline]
    fn read_barrier(&self) {
        (**self).read_barrier()
    }

    #[inline]
    fn write_barrier(&self) {
        (**self).write_barrier()
    }
}
