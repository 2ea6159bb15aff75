//! # Firmware Bring-Up
//!
//! Walks the adapter firmware from whatever state it is found in to READY.
//!
//! Each pass reads the current state, performs the action that state
//! requires (a doorbell write for WAIT_HANDSHAKE and OPERATIONAL, nothing
//! for the others) and then polls until the state changes. Every state has
//! a wait budget; the poll count is `budget * POLLS_PER_BUDGET` at
//! `ControllerConfig::poll_interval_us`. A state that does not move within
//! its budget stops bring-up with [`MfiError::FirmwareStuck`].

use crate::config::ControllerConfig;
use crate::profile::HardwareProfile;
use crate::regs::{status, InitDoorbell};
use crate::{MfiError, MfiResult};
use hba_hal::Platform;

/// Polls per unit of wait budget
pub const POLLS_PER_BUDGET: u32 = 10;

/// Firmware states reported in the top nibble of the status word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FirmwareState {
    /// Power-on, nothing reported yet
    Undefined = 0x0,
    /// Boot block initialising
    BBInit = 0x1,
    /// Firmware initialising
    FwInit = 0x4,
    /// Waiting for the host to clear the handshake
    WaitHandshake = 0x6,
    /// Scanning devices
    DeviceScan = 0x8,
    /// Flushing controller cache
    FlushCache = 0xa,
    /// Ready to accept the INIT command
    Ready = 0xb,
    /// Running; must be moved back to READY before INIT
    Operational = 0xc,
    /// Unrecoverable firmware fault
    Fault = 0xf,
}

impl FirmwareState {
    /// Decode a state nibble
    pub fn from_nibble(nibble: u32) -> Option<Self> {
        Some(match nibble {
            0x0 => FirmwareState::Undefined,
            0x1 => FirmwareState::BBInit,
            0x4 => FirmwareState::FwInit,
            0x6 => FirmwareState::WaitHandshake,
            0x8 => FirmwareState::DeviceScan,
            0xa => FirmwareState::FlushCache,
            0xb => FirmwareState::Ready,
            0xc => FirmwareState::Operational,
            0xf => FirmwareState::Fault,
            _ => return None,
        })
    }

    /// The state's value in the status word, already shifted into place
    pub const fn status_bits(self) -> u32 {
        (self as u32) << status::STATE_SHIFT
    }

    /// Wait budget in units of [`POLLS_PER_BUDGET`] polls
    ///
    /// READY and FAULT are terminal and have none.
    pub const fn wait_budget(self) -> u32 {
        match self {
            FirmwareState::Undefined | FirmwareState::BBInit | FirmwareState::WaitHandshake => 2,
            FirmwareState::Operational => 10,
            FirmwareState::FwInit | FirmwareState::DeviceScan | FirmwareState::FlushCache => 20,
            FirmwareState::Ready | FirmwareState::Fault => 0,
        }
    }
}

/// Raw firmware status word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FwStatus(u32);

impl FwStatus {
    /// Wrap a status word
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw word
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// State nibble, undecoded
    pub const fn nibble(self) -> u32 {
        (self.0 & status::STATE_MASK) >> status::STATE_SHIFT
    }

    /// Decoded state
    pub fn state(self) -> MfiResult<FirmwareState> {
        FirmwareState::from_nibble(self.nibble()).ok_or(MfiError::UnknownFirmwareState(self.nibble()))
    }

    /// Maximum outstanding commands the firmware accepts
    pub const fn max_commands(self) -> u32 {
        self.0 & status::MAXCMD_MASK
    }

    /// Maximum scatter-gather entries per command
    pub const fn max_sgl(self) -> u32 {
        (self.0 & status::MAXSGL_MASK) >> status::MAXSGL_SHIFT
    }
}

/// Drive the firmware to READY
///
/// Returns the status word read in READY, which carries the firmware's
/// command and SGL limits. Interrupts must be masked by the caller.
pub fn transition_firmware<H, P>(profile: &H, platform: &P, config: &ControllerConfig) -> MfiResult<FwStatus>
where
    H: HardwareProfile,
    P: Platform,
{
    let regs = platform.registers();
    let mut current = FwStatus::new(profile.read_fw_state(regs));

    loop {
        let state = current.state().map_err(|e| {
            log::error!("[mfi] firmware reported unknown state {:#x}", current.nibble());
            e
        })?;

        match state {
            FirmwareState::Ready => {
                log::debug!(
                    "[mfi] firmware ready: {} commands, {} segments",
                    current.max_commands(),
                    current.max_sgl()
                );
                return Ok(current);
            }
            FirmwareState::Fault => {
                log::error!("[mfi] firmware fault during bring-up");
                return Err(MfiError::FirmwareFault);
            }
            FirmwareState::WaitHandshake => {
                profile.init_doorbell(regs, InitDoorbell::CLEAR_HANDSHAKE);
            }
            FirmwareState::Operational => {
                profile.init_doorbell(regs, InitDoorbell::READY);
            }
            _ => {}
        }

        log::debug!("[mfi] waiting in firmware state {:?}", state);

        let polls = state.wait_budget() * POLLS_PER_BUDGET;
        let mut next = None;
        for _ in 0..polls {
            platform.delay_us(config.poll_interval_us);
            let sample = FwStatus::new(profile.read_fw_state(regs));
            if sample.nibble() != current.nibble() {
                next = Some(sample);
                break;
            }
        }

        match next {
            Some(sample) => current = sample,
            None => {
                log::error!("[mfi] firmware stuck in state {:?}", state);
                return Err(MfiError::FirmwareStuck(state));
            }
        }
    }
}
