//! Simulated adapter for unit tests
//!
//! [`MockPlatform`] hands out identity-mapped DMA memory (bus address ==
//! CPU pointer) and counts delays. Its register window is a
//! [`MockHardware`], a skinny-generation adapter model that follows a
//! scripted firmware state sequence, parses the INIT frame to find the
//! reply ring, records posted frames and completes them on request.

use crate::frame::{dcmd, hdr, init, io, Opcode};
use crate::regs::{intr, offset, InitDoorbell};
use crate::ring::ReplyRingLayout;
use alloc::alloc::{alloc_zeroed, dealloc, Layout};
use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec::Vec;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use hba_hal::{DmaRegion, DmaSegment, DmaSync, HalError, HalResult, PhysAddr, Platform, RegisterIo};
use spin::Mutex;

pub const PAGE_SIZE: usize = 4096;

/// Status word for READY with the given limits
pub fn ready_status(max_commands: u32, max_sgl: u32) -> u32 {
    0xb000_0000 | (max_sgl & 0xff) << 16 | (max_commands & 0xffff)
}

fn mem_read_u8(addr: u64) -> u8 {
    // SAFETY: mock DMA memory is identity mapped and alive while posted
    unsafe { core::ptr::read_volatile(addr as usize as *const u8) }
}

fn mem_read_u32(addr: u64) -> u32 {
    // SAFETY: as above
    u32::from_le(unsafe { core::ptr::read_unaligned(addr as usize as *const u32) })
}

fn mem_write_u8(addr: u64, value: u8) {
    // SAFETY: as above
    unsafe { core::ptr::write_volatile(addr as usize as *mut u8, value) }
}

fn mem_write_u32(addr: u64, value: u32) {
    // SAFETY: as above
    unsafe { core::ptr::write_unaligned(addr as usize as *mut u32, value.to_le()) }
}

fn mem_read_addr(addr: u64) -> u64 {
    mem_read_u32(addr) as u64 | (mem_read_u32(addr + 4) as u64) << 32
}

// =============================================================================
// Recording register window
// =============================================================================

/// Register window that returns preset values and records every write
#[derive(Debug, Default)]
pub struct RecordingRegs {
    values: Mutex<BTreeMap<usize, u32>>,
    writes: Mutex<Vec<(usize, u32)>>,
}

impl RecordingRegs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset the value returned by reads of `reg`
    pub fn set(&self, reg: usize, value: u32) {
        self.values.lock().insert(reg, value);
    }

    pub fn writes(&self) -> Vec<(usize, u32)> {
        self.writes.lock().clone()
    }
}

impl RegisterIo for RecordingRegs {
    fn read32(&self, reg: usize) -> u32 {
        self.values.lock().get(&reg).copied().unwrap_or(0)
    }

    fn write32(&self, reg: usize, value: u32) {
        self.writes.lock().push((reg, value));
    }
}

// =============================================================================
// Adapter model
// =============================================================================

/// A frame the model has accepted and not yet completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostedFrame {
    pub context: u32,
    pub addr: u64,
    pub units: u32,
    pub cmd: u8,
}

#[derive(Debug, Default)]
struct HwState {
    fw_script: VecDeque<u32>,
    fw_reads: usize,
    writes: Vec<(usize, u32)>,
    iqph: u32,
    osts: u32,
    omsk: u32,
    ring: Option<ReplyRingLayout>,
    init_count: usize,
    ignore_init: bool,
    pending: Vec<PostedFrame>,
    posts: Vec<PostedFrame>,
    auto_complete: bool,
    heal_on_reset: Option<Vec<u32>>,
    resets: usize,
    dcmds: Vec<u32>,
}

impl HwState {
    fn accept_post(&mut self, addr: u64, units: u32) {
        let cmd = mem_read_u8(addr + hdr::CMD as u64);
        let context = mem_read_u32(addr + hdr::CONTEXT as u64);
        let frame = PostedFrame { context, addr, units, cmd };
        self.posts.push(frame);

        if cmd == Opcode::Init as u8 {
            if self.ignore_init {
                return;
            }
            let qinfo = mem_read_addr(addr + init::QINFO_NEW_LO as u64);
            self.ring = Some(ReplyRingLayout {
                capacity: mem_read_u32(qinfo + init::qinfo::RQ_ENTRIES as u64),
                entries: PhysAddr::new(mem_read_addr(qinfo + init::qinfo::RQ_ADDR_LO as u64)),
                producer: PhysAddr::new(mem_read_addr(qinfo + init::qinfo::PI_ADDR_LO as u64)),
                consumer: PhysAddr::new(mem_read_addr(qinfo + init::qinfo::CI_ADDR_LO as u64)),
            });
            self.init_count += 1;
            mem_write_u8(addr + hdr::CMD_STATUS as u64, 0);
            return;
        }

        self.pending.push(frame);
        if cmd == Opcode::Dcmd as u8 {
            let opcode = mem_read_u32(addr + dcmd::OPCODE as u64);
            self.dcmds.push(opcode);
            if opcode == dcmd::CTRL_SHUTDOWN {
                self.complete(context, 0, 0, &[]);
                return;
            }
        }
        if self.auto_complete {
            self.complete(context, 0, 0, &[]);
        }
    }

    fn complete(&mut self, context: u32, status: u8, scsi_status: u8, sense: &[u8]) {
        let at = self
            .pending
            .iter()
            .position(|p| p.context == context)
            .unwrap_or_else(|| panic!("context {} not pending", context));
        let frame = self.pending.remove(at);

        mem_write_u8(frame.addr + hdr::CMD_STATUS as u64, status);
        mem_write_u8(frame.addr + hdr::SCSI_STATUS as u64, scsi_status);
        if !sense.is_empty() {
            let sense_addr = mem_read_addr(frame.addr + io::SENSE_LO as u64);
            for (i, byte) in sense.iter().enumerate() {
                mem_write_u8(sense_addr + i as u64, *byte);
            }
        }
        self.push_entry(context);
    }

    fn push_entry(&mut self, entry: u32) {
        let ring = self.ring.unwrap_or_else(|| panic!("reply ring not initialised"));
        let producer = mem_read_u32(ring.producer.as_u64());
        let consumer = mem_read_u32(ring.consumer.as_u64());
        let next = (producer + 1) % ring.capacity;
        assert_ne!(next, consumer, "reply ring overflow");

        mem_write_u32(ring.entries.as_u64() + producer as u64 * 4, entry);
        mem_write_u32(ring.producer.as_u64(), next);
        self.osts |= intr::SKINNY_VALID;
    }
}

/// Skinny-generation adapter model
#[derive(Debug, Default)]
pub struct MockHardware {
    state: Mutex<HwState>,
    masked: AtomicUsize,
    unmasked_posts: AtomicUsize,
}

impl MockHardware {
    /// Firmware status words returned by successive reads; the last repeats
    pub fn script_fw(&self, words: &[u32]) {
        self.state.lock().fw_script = words.iter().copied().collect();
    }

    /// Status word the firmware settles in after a reset doorbell
    pub fn heal_on_reset(&self, word: Option<u32>) {
        self.state.lock().heal_on_reset = word.map(|w| [w].into());
    }

    /// Status words the firmware walks through after a reset doorbell
    pub fn heal_after(&self, words: &[u32]) {
        self.state.lock().heal_on_reset = Some(words.to_vec());
    }

    pub fn set_auto_complete(&self, enabled: bool) {
        self.state.lock().auto_complete = enabled;
    }

    /// Leave INIT frames unanswered
    pub fn ignore_init(&self, ignore: bool) {
        self.state.lock().ignore_init = ignore;
    }

    pub fn fw_reads(&self) -> usize {
        self.state.lock().fw_reads
    }

    pub fn writes_to(&self, reg: usize) -> Vec<u32> {
        self.state.lock().writes.iter().filter(|(o, _)| *o == reg).map(|(_, v)| *v).collect()
    }

    pub fn init_count(&self) -> usize {
        self.state.lock().init_count
    }

    /// Ring addresses from the most recent INIT
    pub fn ring_layout(&self) -> Option<ReplyRingLayout> {
        self.state.lock().ring
    }

    pub fn resets(&self) -> usize {
        self.state.lock().resets
    }

    /// Contexts posted and not yet completed, in post order
    pub fn pending(&self) -> Vec<u32> {
        self.state.lock().pending.iter().map(|p| p.context).collect()
    }

    /// Every frame ever posted, INIT included
    pub fn posts(&self) -> Vec<PostedFrame> {
        self.state.lock().posts.clone()
    }

    /// DCMD opcodes posted so far
    pub fn dcmd_opcodes(&self) -> Vec<u32> {
        self.state.lock().dcmds.clone()
    }

    /// Frames posted while the CPU had interrupts enabled
    pub fn unmasked_posts(&self) -> usize {
        self.unmasked_posts.load(Ordering::SeqCst)
    }

    pub fn interrupt_mask(&self) -> u32 {
        self.state.lock().omsk
    }

    pub fn interrupt_pending(&self) -> bool {
        self.state.lock().osts & intr::SKINNY_VALID != 0
    }

    /// Complete a pending command with status OK
    pub fn complete(&self, context: u32) {
        self.state.lock().complete(context, 0, 0, &[]);
    }

    /// Complete a pending command with an error status and sense data
    pub fn complete_with(&self, context: u32, status: u8, scsi_status: u8, sense: &[u8]) {
        self.state.lock().complete(context, status, scsi_status, sense);
    }

    /// Put a raw value in the reply ring
    pub fn inject_entry(&self, entry: u32) {
        self.state.lock().push_entry(entry);
    }

    /// Overwrite the producer index cell
    pub fn corrupt_producer(&self, value: u32) {
        let ring = self.state.lock().ring.unwrap_or_else(|| panic!("reply ring not initialised"));
        mem_write_u32(ring.producer.as_u64(), value);
    }
}

impl RegisterIo for MockHardware {
    fn read32(&self, reg: usize) -> u32 {
        let mut hw = self.state.lock();
        match reg {
            offset::OSP => {
                hw.fw_reads += 1;
                if hw.fw_script.len() > 1 {
                    hw.fw_script.pop_front().unwrap_or(0)
                } else {
                    hw.fw_script.front().copied().unwrap_or(0)
                }
            }
            offset::OSTS => hw.osts,
            offset::OMSK => hw.omsk,
            _ => 0,
        }
    }

    fn write32(&self, reg: usize, value: u32) {
        let mut hw = self.state.lock();
        hw.writes.push((reg, value));
        match reg {
            offset::SKINNY_IDB if value == InitDoorbell::RESET.bits() => {
                hw.resets += 1;
                hw.ring = None;
                hw.pending.clear();
                if let Some(words) = hw.heal_on_reset.clone() {
                    hw.fw_script = words.into();
                }
            }
            offset::OSTS => hw.osts &= !value,
            offset::OMSK => hw.omsk = value,
            offset::IQPH => hw.iqph = value,
            offset::IQPL => {
                if self.masked.load(Ordering::SeqCst) == 0 {
                    self.unmasked_posts.fetch_add(1, Ordering::SeqCst);
                }
                let addr = (hw.iqph as u64) << 32 | (value & !0x3f) as u64;
                let units = ((value >> 1) & 0x1f) + 1;
                hw.accept_post(addr, units);
            }
            _ => {}
        }
    }
}

// =============================================================================
// Platform
// =============================================================================

/// Identity-mapped platform around a [`MockHardware`]
#[derive(Debug, Default)]
pub struct MockPlatform {
    hw: MockHardware,
    delay_calls: AtomicU64,
    delay_total: AtomicU64,
    live_regions: AtomicUsize,
    masked_sections: AtomicUsize,
    unmasked_syncs: AtomicUsize,
    hold_delays: AtomicBool,
    parked: AtomicBool,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Firmware already READY with the given limits, recovering on reset
    pub fn ready(max_commands: u32, max_sgl: u32) -> Self {
        let platform = Self::new();
        let word = ready_status(max_commands, max_sgl);
        platform.hw.script_fw(&[word]);
        platform.hw.heal_on_reset(Some(word));
        platform
    }

    pub fn hw(&self) -> &MockHardware {
        &self.hw
    }

    pub fn delay_calls(&self) -> u64 {
        self.delay_calls.load(Ordering::Relaxed)
    }

    pub fn delay_total_us(&self) -> u64 {
        self.delay_total.load(Ordering::Relaxed)
    }

    /// DMA regions allocated and not yet freed
    pub fn live_regions(&self) -> usize {
        self.live_regions.load(Ordering::Relaxed)
    }

    /// Calls to `without_interrupts`
    pub fn masked_sections(&self) -> usize {
        self.masked_sections.load(Ordering::SeqCst)
    }

    /// DMA syncs issued while the CPU had interrupts enabled
    pub fn unmasked_syncs(&self) -> usize {
        self.unmasked_syncs.load(Ordering::SeqCst)
    }

    /// Make every delay block until released
    pub fn hold_delays(&self, hold: bool) {
        self.hold_delays.store(hold, Ordering::SeqCst);
    }

    /// A caller is blocked inside a held delay
    pub fn delay_parked(&self) -> bool {
        self.parked.load(Ordering::SeqCst)
    }
}

impl Platform for MockPlatform {
    type Registers = MockHardware;

    fn registers(&self) -> &MockHardware {
        &self.hw
    }

    fn allocate_dma_region(&self, size: usize, align: usize) -> HalResult<DmaRegion> {
        let layout = Layout::from_size_align(size.max(1), align).map_err(|_| HalError::InvalidParameter)?;
        // SAFETY: layout has non-zero size
        let ptr = unsafe { alloc_zeroed(layout) };
        let virt = NonNull::new(ptr).ok_or(HalError::OutOfMemory)?;
        self.live_regions.fetch_add(1, Ordering::Relaxed);
        // SAFETY: freshly allocated, identity mapped
        Ok(unsafe { DmaRegion::from_raw_parts(virt, PhysAddr::new(ptr as u64), size, align) })
    }

    fn free_dma_region(&self, region: DmaRegion) {
        let layout = Layout::from_size_align(region.size().max(1), region.align())
            .unwrap_or_else(|_| panic!("bad region layout"));
        // SAFETY: allocated by `allocate_dma_region` with the same layout
        unsafe { dealloc(region.as_ptr(), layout) };
        self.live_regions.fetch_sub(1, Ordering::Relaxed);
    }

    fn map_buffer(&self, buffer: &[u8]) -> HalResult<Vec<DmaSegment>> {
        if buffer.is_empty() {
            return Err(HalError::InvalidParameter);
        }
        let mut segments = Vec::new();
        let mut addr = buffer.as_ptr() as u64;
        let end = addr + buffer.len() as u64;
        while addr < end {
            let page_end = (addr / PAGE_SIZE as u64 + 1) * PAGE_SIZE as u64;
            let len = page_end.min(end) - addr;
            segments.push(DmaSegment::new(PhysAddr::new(addr), len as u32));
            addr += len;
        }
        Ok(segments)
    }

    fn sync_region(&self, _region: &DmaRegion, _offset: usize, _len: usize, _ops: DmaSync) {
        if self.hw.masked.load(Ordering::SeqCst) == 0 {
            self.unmasked_syncs.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn delay_us(&self, us: u32) {
        self.delay_calls.fetch_add(1, Ordering::Relaxed);
        self.delay_total.fetch_add(us as u64, Ordering::Relaxed);
        if self.hold_delays.load(Ordering::SeqCst) {
            self.parked.store(true, Ordering::SeqCst);
            while self.hold_delays.load(Ordering::SeqCst) {
                core::hint::spin_loop();
            }
            self.parked.store(false, Ordering::SeqCst);
        }
    }

    fn without_interrupts<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.masked_sections.fetch_add(1, Ordering::SeqCst);
        self.hw.masked.fetch_add(1, Ordering::SeqCst);
        let result = f();
        self.hw.masked.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
