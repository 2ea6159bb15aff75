//! # Command Slot Pool
//!
//! A fixed arena of command slots, created once at attach and never
//! resized. Each slot owns one frame in a shared frame region and one
//! sense buffer in a shared sense region; the slot index doubles as the
//! frame's context value, so completions find their slot directly.
//!
//! Free slots are kept in a FIFO of indices, making acquire and release
//! O(1) without scanning.

use crate::controller::Completion;
use crate::frame::{Direction, FrameView, SENSE_SIZE};
use crate::sgl::DataDescriptor;
use crate::{MfiError, MfiResult};
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use hba_hal::{DmaRegion, PhysAddr};

/// Slot lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// On the free list
    Free,
    /// Acquired, frame being built
    Ready,
    /// Handed to the adapter
    Posted,
    /// Completion being delivered
    Done,
}

/// Caller's reference to a submitted command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotHandle {
    index: u16,
    generation: u32,
}

impl SlotHandle {
    /// Slot index
    pub fn index(&self) -> u16 {
        self.index
    }

    /// Use count of the slot when the handle was issued
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// One reusable command descriptor
pub struct CommandSlot {
    index: u16,
    state: SlotState,
    generation: u32,
    ttl: u32,
    user_context: usize,
    frame_units: u32,
    direction: Direction,
    data: DataDescriptor,
    completion: Option<Completion>,
}

impl core::fmt::Debug for CommandSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CommandSlot")
            .field("index", &self.index)
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("ttl", &self.ttl)
            .field("bound", &self.completion.is_some())
            .finish()
    }
}

impl CommandSlot {
    fn new(index: u16) -> Self {
        Self {
            index,
            state: SlotState::Free,
            generation: 0,
            ttl: 0,
            user_context: 0,
            frame_units: 0,
            direction: Direction::None,
            data: DataDescriptor::empty(),
            completion: None,
        }
    }

    /// Slot index
    pub fn index(&self) -> u16 {
        self.index
    }

    /// Current state
    pub fn state(&self) -> SlotState {
        self.state
    }

    /// Remaining watchdog ticks
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// Caller value bound at submit
    pub fn user_context(&self) -> usize {
        self.user_context
    }

    /// Units of the last frame posted from this slot
    pub fn frame_units(&self) -> u32 {
        self.frame_units
    }

    /// Handle for the current use of the slot
    pub fn handle(&self) -> SlotHandle {
        SlotHandle { index: self.index, generation: self.generation }
    }

    /// Data direction of the current command
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Data segments of the current command
    pub fn data(&self) -> &DataDescriptor {
        &self.data
    }

    pub(crate) fn bind(
        &mut self,
        completion: Option<Completion>,
        user_context: usize,
        direction: Direction,
        data: DataDescriptor,
    ) {
        self.completion = completion;
        self.user_context = user_context;
        self.direction = direction;
        self.data = data;
    }

    pub(crate) fn take_completion(&mut self) -> Option<Completion> {
        self.completion.take()
    }

    pub(crate) fn set_state(&mut self, state: SlotState) {
        self.state = state;
    }
}

/// Fixed arena of command slots
#[derive(Debug)]
pub struct CommandSlotPool {
    slots: Vec<CommandSlot>,
    free: VecDeque<u16>,
    frames: DmaRegion,
    sense: DmaRegion,
    stride: usize,
}

impl CommandSlotPool {
    /// Build `count` slots over the given frame and sense regions
    pub fn new(count: u16, frames: DmaRegion, sense: DmaRegion, stride: usize) -> Self {
        assert!(count > 0);
        assert!(frames.size() >= count as usize * stride);
        assert!(sense.size() >= count as usize * SENSE_SIZE);

        let pool = Self {
            slots: (0..count).map(CommandSlot::new).collect(),
            free: (0..count).collect(),
            frames,
            sense,
            stride,
        };
        for index in 0..count {
            pool.frame(index).clear();
        }
        pool
    }

    /// Total slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slots on the free list
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Take a slot off the free list
    pub fn acquire(&mut self) -> MfiResult<SlotHandle> {
        let index = self.free.pop_front().ok_or(MfiError::ResourceShortage)?;
        let slot = &mut self.slots[index as usize];
        debug_assert_eq!(slot.state, SlotState::Free);
        slot.state = SlotState::Ready;
        slot.generation = slot.generation.wrapping_add(1);
        Ok(slot.handle())
    }

    /// Return a slot to the free list
    ///
    /// Clears the frame, the sense buffer and the completion binding.
    /// Releasing a slot that is already free is logged and ignored.
    pub fn release(&mut self, index: u16) -> bool {
        let Some(slot) = self.slots.get_mut(index as usize) else {
            log::warn!("[mfi] release of slot {} outside pool", index);
            return false;
        };
        if slot.state == SlotState::Free {
            log::warn!("[mfi] slot {} released twice", index);
            return false;
        }

        slot.state = SlotState::Free;
        slot.ttl = 0;
        slot.user_context = 0;
        slot.frame_units = 0;
        slot.direction = Direction::None;
        slot.data = DataDescriptor::empty();
        slot.completion = None;

        self.frame(index).clear();
        self.sense.fill(index as usize * SENSE_SIZE, SENSE_SIZE, 0);
        self.free.push_back(index);
        true
    }

    /// Slot by index
    pub fn slot(&self, index: u16) -> Option<&CommandSlot> {
        self.slots.get(index as usize)
    }

    pub(crate) fn slot_mut(&mut self, index: u16) -> Option<&mut CommandSlot> {
        self.slots.get_mut(index as usize)
    }

    /// Frame storage of a slot
    pub fn frame(&self, index: u16) -> FrameView<'_> {
        FrameView::new(&self.frames, self.frame_offset(index), self.stride)
    }

    /// Byte offset of a slot's frame in the frame region
    pub fn frame_offset(&self, index: u16) -> usize {
        index as usize * self.stride
    }

    /// Per-slot frame stride
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Backing frame region
    pub fn frames(&self) -> &DmaRegion {
        &self.frames
    }

    /// Backing sense region
    pub fn sense_region(&self) -> &DmaRegion {
        &self.sense
    }

    /// Bus address of a slot's sense buffer
    pub fn sense_phys(&self, index: u16) -> PhysAddr {
        self.sense.phys_at(index as usize * SENSE_SIZE)
    }

    /// Copy a slot's sense buffer out
    pub fn read_sense(&self, index: u16, buf: &mut [u8; SENSE_SIZE]) {
        self.sense.read_bytes(index as usize * SENSE_SIZE, buf);
    }

    /// Record that a slot's frame was handed to the adapter
    pub(crate) fn mark_posted(&mut self, index: u16, ttl: u32, frame_units: u32) {
        let slot = &mut self.slots[index as usize];
        debug_assert_eq!(slot.state, SlotState::Ready);
        slot.state = SlotState::Posted;
        slot.ttl = ttl;
        slot.frame_units = frame_units;
    }

    /// Age every posted slot by one watchdog tick
    ///
    /// Returns how many slots ran out of time on this tick.
    pub fn tick(&mut self) -> usize {
        let mut expired = 0;
        for slot in self.slots.iter_mut().filter(|s| s.state == SlotState::Posted && s.ttl > 0) {
            slot.ttl -= 1;
            if slot.ttl == 0 {
                log::debug!("[mfi] slot {} timed out", slot.index);
                expired += 1;
            }
        }
        expired
    }

    /// Indices of slots that are acquired or posted
    pub fn in_flight(&self) -> Vec<u16> {
        self.slots
            .iter()
            .filter(|s| matches!(s.state, SlotState::Ready | SlotState::Posted))
            .map(|s| s.index)
            .collect()
    }

    /// Give the backing memory back
    pub fn into_regions(self) -> (DmaRegion, DmaRegion) {
        (self.frames, self.sense)
    }
}
