//! # Controller
//!
//! One [`Controller`] per adapter. It owns the slot pool, the reply ring
//! and the hardware profile, and serialises everything that touches them
//! behind a single spin lock:
//!
//! - `submit` encodes a request into a free slot and posts it
//! - `dispatch` drains the reply ring and runs completions; the interrupt
//!   handler and the polled wait loop both go through it
//! - `watchdog_tick` ages posted commands, samples the firmware state and
//!   resets the adapter when either goes wrong
//!
//! Caller-context paths take the lock inside
//! [`Platform::without_interrupts`], so the interrupt handler can never
//! spin on a lock held by the code it interrupted.
//!
//! A reset fails every in-flight command with [`MfiError::WireFault`],
//! reinitialises the firmware and resumes. The firmware handshake runs
//! with the lock released and the controller [`ControllerState::Resetting`];
//! submissions meanwhile fail with `WireFault`. When every reset attempt
//! fails the controller stays [`ControllerState::Failed`] until re-attached.

use crate::bringup::{transition_firmware, FirmwareState, FwStatus};
use crate::config::ControllerConfig;
use crate::frame::{dcmd, CommandRequest, Direction, FrameStatus, FRAME_UNIT, HEADER_SIZE, SENSE_SIZE};
use crate::profile::{AnyProfile, DeviceId, FramePost, HardwareProfile};
use crate::regs::InitDoorbell;
use crate::ring::{ReplyRing, ReplyRingLayout, INVALID_ENTRY};
use crate::sgl::{DataDescriptor, FrameEncoder, SglFormat};
use crate::slot::{CommandSlotPool, SlotHandle, SlotState};
use crate::stats::{ControllerStats, StatsSnapshot};
use crate::{MfiError, MfiResult};
use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use hba_hal::{DmaRegion, DmaSync, HalError, PhysAddr, Platform};
use spin::Mutex;

/// Completion callback
///
/// Runs with the controller lock held, possibly in interrupt context. It
/// must not block and must not call back into the controller.
pub type Completion = Box<dyn FnOnce(&CommandResult<'_>) + Send>;

/// What a completion callback is told
#[derive(Debug)]
pub struct CommandResult<'a> {
    /// The submission this result belongs to
    pub handle: SlotHandle,
    /// `Ok`, `CommandFailed` or a synthetic `WireFault` from a reset
    pub outcome: MfiResult<()>,
    /// Status byte from the frame
    pub status: FrameStatus,
    /// SCSI status byte from the frame
    pub scsi_status: u8,
    /// Sense data, empty unless the command ended with a SCSI error
    pub sense: &'a [u8],
    /// Value passed with the request
    pub user_context: usize,
}

/// Owned copy of a [`CommandResult`], returned by polled submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRecord {
    /// `Ok` or `CommandFailed`
    pub outcome: MfiResult<()>,
    /// Status byte from the frame
    pub status: FrameStatus,
    /// SCSI status byte
    pub scsi_status: u8,
    /// Sense data
    pub sense: Vec<u8>,
}

impl CompletionRecord {
    fn from_result(result: &CommandResult<'_>) -> Self {
        Self {
            outcome: result.outcome,
            status: result.status,
            scsi_status: result.scsi_status,
            sense: result.sense.to_vec(),
        }
    }
}

/// Controller lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Accepting commands
    Online,
    /// Reset in progress
    Resetting,
    /// Every reset attempt failed
    Failed,
    /// Shutting down for detach
    Detaching,
}

struct Inner {
    state: ControllerState,
    pool: CommandSlotPool,
    ring: ReplyRing,
    reset_pending: bool,
}

/// Command engine for one adapter
pub struct Controller<H: HardwareProfile, P: Platform> {
    profile: H,
    platform: P,
    config: ControllerConfig,
    encoder: FrameEncoder,
    stats: ControllerStats,
    inner: Mutex<Inner>,
}

impl<H: HardwareProfile + core::fmt::Debug, P: Platform> core::fmt::Debug for Controller<H, P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Controller")
            .field("profile", &self.profile)
            .field("encoder", &self.encoder)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl<P: Platform> Controller<AnyProfile, P> {
    /// Attach to a PCI device, picking the profile from its id
    pub fn attach_device(id: DeviceId, platform: P, config: ControllerConfig) -> MfiResult<Self> {
        let profile = AnyProfile::for_device(id)?;
        Self::attach(profile, platform, config)
    }
}

impl<H: HardwareProfile, P: Platform> Controller<H, P> {
    /// Bring the adapter up and return a controller ready for commands
    ///
    /// Masks interrupts, drives the firmware to READY, sizes the slot pool
    /// and SGL from the firmware's limits, allocates frame, sense and ring
    /// memory, sends INIT and finally unmasks interrupts. Any failure is
    /// returned and all memory is given back.
    pub fn attach(profile: H, platform: P, config: ControllerConfig) -> MfiResult<Self> {
        profile.disable_interrupts(platform.registers());
        let status = transition_firmware(&profile, &platform, &config)?;

        let format = if config.dma64 { SglFormat::Sgl64 } else { SglFormat::Sgl32 };
        let max_commands = config.commands_for(status.max_commands());
        let max_segments = (config.segments_for(status.max_sgl()) as usize)
            .min(FrameEncoder::segments_within(format, profile.max_frame_units()))
            .min(u8::MAX as usize);
        let encoder = FrameEncoder::new(format, max_segments);

        let (pool, ring) = allocate(&profile, &platform, &encoder, max_commands)?;
        let controller = Self {
            profile,
            platform,
            config,
            encoder,
            stats: ControllerStats::new(),
            inner: Mutex::new(Inner { state: ControllerState::Online, pool, ring, reset_pending: false }),
        };

        let init = controller.platform.without_interrupts(|| {
            let mut inner = controller.inner.lock();
            controller.send_init(&mut inner)
        });
        if let Err(e) = init {
            log::error!("[mfi] INIT failed: {}", e);
            controller.into_platform();
            return Err(e);
        }

        controller.profile.enable_interrupts(controller.platform.registers());
        log::info!(
            "[mfi] {} adapter online: {} commands, {} segments ({:?})",
            controller.profile.name(),
            max_commands,
            max_segments,
            format
        );
        Ok(controller)
    }

    /// Submit a command
    ///
    /// Returns once the frame is posted; `completion` runs later from
    /// [`Controller::dispatch`]. Fails with `WireFault` unless the
    /// controller is online, with `TooFragmented` before any slot is taken,
    /// and with `ResourceShortage` when every slot is busy.
    pub fn submit(&self, request: CommandRequest, completion: Completion) -> MfiResult<SlotHandle> {
        self.platform.without_interrupts(|| {
            let mut inner = self.inner.lock();
            if inner.state != ControllerState::Online {
                return Err(MfiError::WireFault);
            }
            self.submit_locked(&mut inner, request, completion)
        })
    }

    fn submit_locked(&self, inner: &mut Inner, request: CommandRequest, completion: Completion) -> MfiResult<SlotHandle> {
        self.encoder.check(&request.data)?;

        let handle = inner.pool.acquire()?;
        let index = handle.index();

        let frame = inner.pool.frame(index);
        let frame_addr = frame.phys();
        let units = match self.encoder.encode(&frame, index, inner.pool.sense_phys(index), &request) {
            Ok(units) => units,
            Err(e) => {
                inner.pool.release(index);
                return Err(e);
            }
        };

        let ttl = request.timeout_ticks.unwrap_or(self.config.default_timeout_ticks).max(1);
        let direction = request.direction;
        self.platform.sync_segments(request.data.segments(), pre_sync(direction));
        if let Some(slot) = inner.pool.slot_mut(index) {
            slot.bind(Some(completion), request.user_context, direction, request.data);
        }

        self.post_locked(inner, index, frame_addr, units, ttl);
        self.stats.record_submit();
        log::debug!("[mfi] slot {} posted, {} unit(s)", index, units);
        Ok(handle)
    }

    fn post_locked(&self, inner: &mut Inner, index: u16, frame_addr: PhysAddr, units: u32, ttl: u32) {
        let offset = inner.pool.frame_offset(index);
        self.platform.sync_region(
            inner.pool.frames(),
            offset,
            inner.pool.stride(),
            DmaSync::PREWRITE | DmaSync::PREREAD,
        );
        self.platform.write_barrier();
        inner.pool.mark_posted(index, ttl, units);
        self.profile
            .post(self.platform.registers(), FramePost { slot: index, frame_addr, frame_units: units });
    }

    /// Submit and spin until the command completes
    ///
    /// Drains the reply ring between polls, so it works with interrupts
    /// masked. Returns the completion when the adapter answered, whether
    /// the command succeeded or not; `Timeout` when it did not answer in
    /// `sync_timeout_us`, `WireFault` when a reset failed it.
    pub fn submit_polled(&self, request: CommandRequest) -> MfiResult<CompletionRecord> {
        self.run_polled(request, ControllerState::Online)
    }

    /// Polled submission accepted only while the controller is in `state`
    fn run_polled(&self, request: CommandRequest, state: ControllerState) -> MfiResult<CompletionRecord> {
        let cell: Arc<Mutex<Option<CompletionRecord>>> = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&cell);
        let completion: Completion = Box::new(move |result: &CommandResult<'_>| {
            *sink.lock() = Some(CompletionRecord::from_result(result));
        });
        let handle = self.platform.without_interrupts(|| {
            let mut inner = self.inner.lock();
            if inner.state != state {
                return Err(MfiError::WireFault);
            }
            self.submit_locked(&mut inner, request, completion)
        })?;

        let interval = self.config.sync_poll_interval_us.max(1);
        let polls = (self.config.sync_timeout_us / interval).max(1);
        for poll in 0..=polls {
            let record = self.platform.without_interrupts(|| {
                let mut inner = self.inner.lock();
                if inner.state == state {
                    self.dispatch_locked(&mut inner);
                }
                cell.lock().take()
            });
            if let Some(record) = record {
                return match record.outcome {
                    Err(e @ MfiError::WireFault) => Err(e),
                    _ => Ok(record),
                };
            }
            if poll < polls {
                self.platform.delay_us(interval);
            }
        }

        log::warn!("[mfi] polled command in slot {} timed out", handle.index());
        Err(MfiError::Timeout)
    }

    /// Drain the reply ring and deliver completions
    ///
    /// Caller-context entry point for polling. Returns the number of ring
    /// entries consumed.
    pub fn dispatch(&self) -> usize {
        self.platform.without_interrupts(|| {
            let mut inner = self.inner.lock();
            if inner.state != ControllerState::Online {
                return 0;
            }
            self.dispatch_locked(&mut inner)
        })
    }

    /// Interrupt handler entry point
    ///
    /// Runs in interrupt context, where the CPU already has interrupts
    /// masked. Returns `false` when the interrupt was not raised by this
    /// adapter.
    pub fn intr(&self) -> bool {
        let mut inner = self.inner.lock();
        if !self.profile.ack_interrupt(self.platform.registers()) {
            return false;
        }
        if inner.state == ControllerState::Online {
            self.dispatch_locked(&mut inner);
        }
        true
    }

    fn dispatch_locked(&self, inner: &mut Inner) -> usize {
        let Inner { pool, ring, reset_pending, .. } = inner;
        match ring.drain(&self.platform, |entry| self.complete_entry(pool, entry)) {
            Ok(drained) => drained,
            Err(_) => {
                *reset_pending = true;
                0
            }
        }
    }

    fn complete_entry(&self, pool: &mut CommandSlotPool, entry: u32) {
        if entry == INVALID_ENTRY {
            log::warn!("[mfi] invalid reply entry");
            self.stats.record_spurious();
            return;
        }
        let posted = u16::try_from(entry)
            .ok()
            .filter(|index| pool.slot(*index).map(|s| s.state()) == Some(SlotState::Posted));
        let Some(index) = posted else {
            log::warn!("[mfi] reply for slot {} which is not posted", entry);
            self.stats.record_spurious();
            return;
        };

        self.platform.sync_region(
            pool.frames(),
            pool.frame_offset(index),
            HEADER_SIZE,
            DmaSync::POSTREAD | DmaSync::POSTWRITE,
        );
        self.platform.read_barrier();

        let frame = pool.frame(index);
        let status = frame.status();
        let scsi_status = frame.scsi_status();

        let mut sense = [0u8; SENSE_SIZE];
        let sense_len = if status == FrameStatus::SCSI_DONE_WITH_ERROR {
            self.platform.sync_region(pool.sense_region(), 0, pool.sense_region().size(), DmaSync::POSTREAD);
            pool.read_sense(index, &mut sense);
            SENSE_SIZE
        } else {
            0
        };

        let outcome = if status.is_ok() { Ok(()) } else { Err(MfiError::CommandFailed(status)) };
        self.finish(pool, index, outcome, status, scsi_status, &sense[..sense_len]);
    }

    /// Deliver one completion and free the slot
    fn finish(
        &self,
        pool: &mut CommandSlotPool,
        index: u16,
        outcome: MfiResult<()>,
        status: FrameStatus,
        scsi_status: u8,
        sense: &[u8],
    ) {
        let Some(slot) = pool.slot_mut(index) else {
            return;
        };
        slot.set_state(SlotState::Done);
        self.platform.sync_segments(slot.data().segments(), post_sync(slot.direction()));

        let result = CommandResult {
            handle: slot.handle(),
            outcome,
            status,
            scsi_status,
            sense,
            user_context: slot.user_context(),
        };
        self.stats.record_completion(outcome.is_ok());
        if let Err(e) = outcome {
            log::debug!("[mfi] slot {} failed: {}", index, e);
        }
        if let Some(completion) = slot.take_completion() {
            completion(&result);
        }
        pool.release(index);
    }

    fn fail_in_flight(&self, inner: &mut Inner) -> usize {
        let in_flight = inner.pool.in_flight();
        for index in &in_flight {
            self.finish(&mut inner.pool, *index, Err(MfiError::WireFault), FrameStatus::INVALID, 0, &[]);
        }
        in_flight.len()
    }

    /// Periodic health check
    ///
    /// Drains pending completions, then looks for a faulted firmware, a
    /// corrupt reply ring or a command past its TTL. Any of these resets
    /// the adapter. Returns `Ok(true)` when a reset ran and succeeded,
    /// `Ok(false)` while another reset is still running, and `WireFault`
    /// once the controller has failed.
    pub fn watchdog_tick(&self) -> MfiResult<bool> {
        let reset = self.platform.without_interrupts(|| {
            let mut inner = self.inner.lock();
            match inner.state {
                ControllerState::Online => {}
                ControllerState::Failed => return Err(MfiError::WireFault),
                ControllerState::Resetting | ControllerState::Detaching => return Ok(false),
            }

            self.dispatch_locked(&mut inner);

            let fw = FwStatus::new(self.profile.read_fw_state(self.platform.registers()));
            let cause = if inner.reset_pending {
                Some("reply ring corrupt")
            } else if matches!(fw.state(), Ok(FirmwareState::Fault) | Err(_)) {
                log::error!("[mfi] firmware reports {:#010x}", fw.raw());
                Some("firmware fault")
            } else {
                let expired = inner.pool.tick();
                for _ in 0..expired {
                    self.stats.record_timeout();
                }
                if expired > 0 {
                    log::error!("[mfi] {} command(s) timed out", expired);
                    Some("command timeout")
                } else {
                    None
                }
            };

            match cause {
                Some(cause) => {
                    self.begin_reset(&mut inner, cause);
                    Ok(true)
                }
                None => Ok(false),
            }
        })?;

        if reset {
            self.recover()?;
        }
        Ok(reset)
    }

    /// Reset the adapter
    ///
    /// Fails every in-flight command with `WireFault` and re-runs bring-up.
    /// Returns `WireFault` unless the controller is online.
    pub fn reset(&self) -> MfiResult<()> {
        self.platform.without_interrupts(|| {
            let mut inner = self.inner.lock();
            if inner.state != ControllerState::Online {
                return Err(MfiError::WireFault);
            }
            self.begin_reset(&mut inner, "requested");
            Ok(())
        })?;
        self.recover()
    }

    /// Take the controller offline and fail everything in flight
    fn begin_reset(&self, inner: &mut Inner, cause: &str) {
        log::error!("[mfi] resetting {} adapter: {}", self.profile.name(), cause);
        self.stats.record_reset();
        inner.state = ControllerState::Resetting;
        self.profile.disable_interrupts(self.platform.registers());

        let failed = self.fail_in_flight(inner);
        if failed > 0 {
            log::warn!("[mfi] failed {} in-flight command(s)", failed);
        }
    }

    /// Bring a `Resetting` controller back online
    ///
    /// The firmware handshake runs without the lock held, so submissions
    /// racing with it see `Resetting` and get `WireFault`. The lock is
    /// taken again to reinitialise the ring and send INIT.
    fn recover(&self) -> MfiResult<()> {
        let regs = self.platform.registers();
        let attempts = self.config.max_reset_attempts.max(1);
        for attempt in 1..=attempts {
            self.profile.init_doorbell(regs, InitDoorbell::RESET);

            let result = transition_firmware(&self.profile, &self.platform, &self.config).and_then(|status| {
                self.platform.without_interrupts(|| {
                    let mut inner = self.inner.lock();
                    if (status.max_commands() as usize) < inner.pool.capacity() {
                        log::warn!(
                            "[mfi] firmware now allows {} commands, pool has {}",
                            status.max_commands(),
                            inner.pool.capacity()
                        );
                    }
                    inner.ring.reset();
                    self.send_init(&mut inner)?;
                    inner.state = ControllerState::Online;
                    inner.reset_pending = false;
                    self.profile.enable_interrupts(regs);
                    Ok(())
                })
            });

            match result {
                Ok(()) => {
                    log::info!("[mfi] reset complete after {} attempt(s)", attempt);
                    return Ok(());
                }
                Err(e) => log::warn!("[mfi] reset attempt {} failed: {}", attempt, e),
            }
        }

        self.platform.without_interrupts(|| self.inner.lock().state = ControllerState::Failed);
        log::error!("[mfi] adapter unavailable after {} reset attempt(s)", attempts);
        Err(MfiError::WireFault)
    }

    /// Send INIT on the first free slot and wait for its status byte
    fn send_init(&self, inner: &mut Inner) -> MfiResult<()> {
        let handle = inner.pool.acquire()?;
        let index = handle.index();

        let layout = inner.ring.layout();
        let frame = inner.pool.frame(index);
        let units = self.encoder.encode_init(&frame, index, &layout);
        let frame_addr = frame.phys();
        self.post_locked(inner, index, frame_addr, units, 0);

        let result = self.poll_status(&inner.pool, index);
        inner.pool.release(index);
        if result.is_ok() {
            log::debug!("[mfi] reply ring of {} entries initialised", layout.capacity);
        }
        result
    }

    fn poll_status(&self, pool: &CommandSlotPool, index: u16) -> MfiResult<()> {
        let interval = self.config.sync_poll_interval_us.max(1);
        let polls = (self.config.sync_timeout_us / interval).max(1);
        for _ in 0..polls {
            self.platform.sync_region(pool.frames(), pool.frame_offset(index), HEADER_SIZE, DmaSync::POSTREAD);
            self.platform.read_barrier();
            let status = pool.frame(index).status();
            if status != FrameStatus::INVALID {
                return if status.is_ok() { Ok(()) } else { Err(MfiError::CommandFailed(status)) };
            }
            self.platform.delay_us(interval);
        }
        Err(MfiError::Timeout)
    }

    /// Quiesce the adapter and give back all memory
    ///
    /// Stops new submissions, tells a healthy firmware to shut down, masks
    /// interrupts, delivers whatever completions are already in the ring,
    /// fails the rest with `WireFault` and returns the platform.
    pub fn detach(self) -> P {
        let online = self.platform.without_interrupts(|| {
            let mut inner = self.inner.lock();
            let online = inner.state == ControllerState::Online;
            if online {
                inner.state = ControllerState::Detaching;
            }
            online
        });
        if online {
            self.shutdown_firmware();
        }

        self.platform.without_interrupts(|| {
            let mut inner = self.inner.lock();
            self.profile.disable_interrupts(self.platform.registers());
            if online {
                self.dispatch_locked(&mut inner);
            }
            let failed = self.fail_in_flight(&mut inner);
            if failed > 0 {
                log::warn!("[mfi] detach failed {} in-flight command(s)", failed);
            }
        });
        log::info!("[mfi] {} adapter detached", self.profile.name());
        self.into_platform()
    }

    fn shutdown_firmware(&self) {
        let request = CommandRequest::dcmd(
            dcmd::CTRL_SHUTDOWN,
            [0; dcmd::MBOX_SIZE],
            Direction::None,
            DataDescriptor::empty(),
        );
        match self.run_polled(request, ControllerState::Detaching) {
            Ok(record) if record.outcome.is_ok() => log::debug!("[mfi] firmware shut down"),
            Ok(record) => log::warn!("[mfi] firmware shutdown failed with status {:#04x}", record.status.raw()),
            Err(e) => log::warn!("[mfi] firmware shutdown failed: {}", e),
        }
    }

    fn into_platform(self) -> P {
        let Controller { platform, inner, .. } = self;
        let inner = inner.into_inner();
        let (frames, sense) = inner.pool.into_regions();
        platform.free_dma_region(frames);
        platform.free_dma_region(sense);
        platform.free_dma_region(inner.ring.into_region());
        platform
    }

    /// Current lifecycle state
    pub fn state(&self) -> ControllerState {
        self.inner.lock().state
    }

    /// Slots currently free
    pub fn free_slots(&self) -> usize {
        self.inner.lock().pool.free_count()
    }

    /// Pool size
    pub fn max_commands(&self) -> usize {
        self.inner.lock().pool.capacity()
    }

    /// SGL limit per command
    pub fn max_segments(&self) -> usize {
        self.encoder.max_segments()
    }

    /// Reply ring addresses as announced to the adapter
    pub fn reply_ring_layout(&self) -> ReplyRingLayout {
        self.inner.lock().ring.layout()
    }

    /// Counter snapshot
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// The bound hardware profile
    pub fn profile(&self) -> &H {
        &self.profile
    }

    /// The platform the controller runs on
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Active configuration
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }
}

fn pre_sync(direction: Direction) -> DmaSync {
    match direction {
        Direction::None => DmaSync::empty(),
        Direction::Read => DmaSync::PREREAD,
        Direction::Write => DmaSync::PREWRITE,
    }
}

fn post_sync(direction: Direction) -> DmaSync {
    match direction {
        Direction::None => DmaSync::empty(),
        Direction::Read => DmaSync::POSTREAD,
        Direction::Write => DmaSync::POSTWRITE,
    }
}

fn below_4g(region: &DmaRegion) -> bool {
    region.phys().as_u64() + region.size() as u64 <= 1 << 32
}

/// Allocate frame, sense and ring memory for `count` slots
fn allocate<H: HardwareProfile, P: Platform>(
    profile: &H,
    platform: &P,
    encoder: &FrameEncoder,
    count: u16,
) -> MfiResult<(CommandSlotPool, ReplyRing)> {
    let slots = count as usize;
    let capacity = count as u32 + 1;
    let dma32 = encoder.format() == SglFormat::Sgl32;

    let frames = platform.allocate_dma_region(slots * encoder.stride(), FRAME_UNIT)?;
    if (!profile.frames_64bit() || dma32) && !below_4g(&frames) {
        log::error!("[mfi] frame memory at {:#x} is not 32-bit addressable", frames.phys());
        platform.free_dma_region(frames);
        return Err(MfiError::Dma(HalError::InvalidAddress));
    }

    let sense = match platform.allocate_dma_region(slots * SENSE_SIZE, FRAME_UNIT) {
        Ok(sense) if dma32 && !below_4g(&sense) => {
            platform.free_dma_region(sense);
            platform.free_dma_region(frames);
            return Err(MfiError::Dma(HalError::InvalidAddress));
        }
        Ok(sense) => sense,
        Err(e) => {
            platform.free_dma_region(frames);
            return Err(e.into());
        }
    };

    let ring = match platform.allocate_dma_region(ReplyRing::region_size(capacity), FRAME_UNIT) {
        Ok(ring) => ring,
        Err(e) => {
            platform.free_dma_region(sense);
            platform.free_dma_region(frames);
            return Err(e.into());
        }
    };

    Ok((CommandSlotPool::new(count, frames, sense, encoder.stride()), ReplyRing::new(ring, capacity)))
}
