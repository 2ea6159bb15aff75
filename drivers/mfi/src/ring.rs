//! # Reply Ring
//!
//! Completed slot indices come back from the adapter through a ring in DMA
//! memory. The adapter owns the producer index and the driver the
//! consumer index; both live in the same region as the entries:
//!
//! ```text
//! +0  producer (u32, written by the adapter)
//! +4  consumer (u32, written by the driver)
//! +8  entries  (capacity x u32, little-endian slot indices)
//! ```
//!
//! Every drained entry is overwritten with [`INVALID_ENTRY`] so that a
//! stale value can never be delivered twice.

use crate::{MfiError, MfiResult};
use hba_hal::{DmaRegion, DmaSync, PhysAddr, Platform};

/// Marker for a drained or never-written entry
pub const INVALID_ENTRY: u32 = 0xffff_ffff;

const PRODUCER: usize = 0;
const CONSUMER: usize = 4;
const ENTRIES: usize = 8;
const ENTRY_SIZE: usize = 4;

/// Bus addresses announced to the adapter in the INIT frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyRingLayout {
    /// First entry
    pub entries: PhysAddr,
    /// Producer index cell
    pub producer: PhysAddr,
    /// Consumer index cell
    pub consumer: PhysAddr,
    /// Entry count
    pub capacity: u32,
}

/// Driver side of the reply ring
#[derive(Debug)]
pub struct ReplyRing {
    region: DmaRegion,
    capacity: u32,
    consumer: u32,
}

impl ReplyRing {
    /// DMA bytes needed for `capacity` entries
    pub const fn region_size(capacity: u32) -> usize {
        ENTRIES + capacity as usize * ENTRY_SIZE
    }

    /// Take ownership of `region` and reset it
    pub fn new(region: DmaRegion, capacity: u32) -> Self {
        assert!(capacity >= 2);
        assert!(region.size() >= Self::region_size(capacity));
        let mut ring = Self { region, capacity, consumer: 0 };
        ring.reset();
        ring
    }

    /// Zero both indices and invalidate every entry
    pub fn reset(&mut self) {
        self.region.write_u32(PRODUCER, 0);
        self.region.write_u32(CONSUMER, 0);
        self.region.fill(ENTRIES, self.capacity as usize * ENTRY_SIZE, 0xff);
        self.consumer = 0;
    }

    /// Entry count
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Driver's consumer index
    pub fn consumer(&self) -> u32 {
        self.consumer
    }

    /// Addresses for the INIT frame
    pub fn layout(&self) -> ReplyRingLayout {
        ReplyRingLayout {
            entries: self.region.phys_at(ENTRIES),
            producer: self.region.phys_at(PRODUCER),
            consumer: self.region.phys_at(CONSUMER),
            capacity: self.capacity,
        }
    }

    /// Deliver every entry between the consumer and the producer to `f`
    ///
    /// Entries are handed over raw, in ring order, including any
    /// [`INVALID_ENTRY`]; the caller decides what an entry means. The new
    /// consumer index is published once the batch is done. A producer
    /// index outside the ring means the adapter is corrupt and is reported
    /// as [`MfiError::WireFault`] without consuming anything.
    pub fn drain<P, F>(&mut self, platform: &P, mut f: F) -> MfiResult<usize>
    where
        P: Platform,
        F: FnMut(u32),
    {
        let size = Self::region_size(self.capacity);
        platform.sync_region(&self.region, 0, size, DmaSync::POSTREAD);

        let producer = self.region.read_u32(PRODUCER);
        platform.read_barrier();

        if producer >= self.capacity {
            log::error!("[mfi] reply producer {} outside ring of {}", producer, self.capacity);
            return Err(MfiError::WireFault);
        }

        let mut drained = 0;
        while self.consumer != producer {
            let at = ENTRIES + self.consumer as usize * ENTRY_SIZE;
            let entry = self.region.read_u32(at);
            self.region.write_u32(at, INVALID_ENTRY);
            self.consumer = (self.consumer + 1) % self.capacity;
            f(entry);
            drained += 1;
        }

        self.region.write_u32(CONSUMER, self.consumer);
        platform.sync_region(&self.region, 0, size, DmaSync::PREREAD | DmaSync::PREWRITE);
        platform.memory_barrier();
        Ok(drained)
    }

    /// Give the backing memory back
    pub fn into_region(self) -> DmaRegion {
        self.region
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPlatform;
    use alloc::vec::Vec;

    fn ring(platform: &MockPlatform, capacity: u32) -> ReplyRing {
        let region = platform.allocate_dma_region(ReplyRing::region_size(capacity), 64).unwrap();
        ReplyRing::new(region, capacity)
    }

    fn produce(ring: &ReplyRing, entries: &[u32]) {
        let mut producer = ring.region.read_u32(PRODUCER);
        for entry in entries {
            ring.region.write_u32(ENTRIES + producer as usize * ENTRY_SIZE, *entry);
            producer = (producer + 1) % ring.capacity;
        }
        ring.region.write_u32(PRODUCER, producer);
    }

    #[test]
    fn test_layout_offsets() {
        let platform = MockPlatform::new();
        let r = ring(&platform, 5);
        let layout = r.layout();
        let base = r.region.phys().as_u64();
        assert_eq!(layout.producer.as_u64(), base);
        assert_eq!(layout.consumer.as_u64(), base + 4);
        assert_eq!(layout.entries.as_u64(), base + 8);
        assert_eq!(layout.capacity, 5);
        assert_eq!(ReplyRing::region_size(5), 28);
        platform.free_dma_region(r.into_region());
    }

    #[test]
    fn test_round_trip_advances_consumer() {
        let platform = MockPlatform::new();
        let mut r = ring(&platform, 5);

        produce(&r, &[3, 0, 2]);
        let mut seen = Vec::new();
        assert_eq!(r.drain(&platform, |e| seen.push(e)), Ok(3));
        assert_eq!(seen, [3, 0, 2]);
        assert_eq!(r.consumer(), 3);
        assert_eq!(r.region.read_u32(CONSUMER), 3);

        for i in 0..3 {
            assert_eq!(r.region.read_u32(ENTRIES + i * ENTRY_SIZE), INVALID_ENTRY);
        }
        platform.free_dma_region(r.into_region());
    }

    #[test]
    fn test_wraps_around() {
        let platform = MockPlatform::new();
        let mut r = ring(&platform, 4);

        let mut seen = Vec::new();
        produce(&r, &[0, 1, 2]);
        r.drain(&platform, |e| seen.push(e)).unwrap();
        produce(&r, &[3, 0, 1]);
        r.drain(&platform, |e| seen.push(e)).unwrap();

        assert_eq!(seen, [0, 1, 2, 3, 0, 1]);
        assert_eq!(r.consumer(), 2);
        platform.free_dma_region(r.into_region());
    }

    #[test]
    fn test_empty_ring_drains_nothing() {
        let platform = MockPlatform::new();
        let mut r = ring(&platform, 4);
        assert_eq!(r.drain(&platform, |_| panic!("no entries")), Ok(0));
        platform.free_dma_region(r.into_region());
    }

    #[test]
    fn test_corrupt_producer_is_wire_fault() {
        let platform = MockPlatform::new();
        let mut r = ring(&platform, 4);
        r.region.write_u32(PRODUCER, 9);
        assert_eq!(r.drain(&platform, |_| {}), Err(MfiError::WireFault));
        assert_eq!(r.consumer(), 0);
        platform.free_dma_region(r.into_region());
    }

    #[test]
    fn test_reset_invalidates() {
        let platform = MockPlatform::new();
        let mut r = ring(&platform, 4);
        produce(&r, &[1, 2]);
        r.reset();
        assert_eq!(r.region.read_u32(PRODUCER), 0);
        assert_eq!(r.region.read_u32(ENTRIES), INVALID_ENTRY);
        assert_eq!(r.drain(&platform, |_| {}), Ok(0));
        platform.free_dma_region(r.into_region());
    }
}
