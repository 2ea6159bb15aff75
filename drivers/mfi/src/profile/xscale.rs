//! IOP331 (xscale) generation

use super::{FramePost, HardwareProfile};
use crate::regs::{intr, offset, InitDoorbell};
use hba_hal::RegisterIo;

/// xscale register contract
///
/// Firmware state lives in outbound message 0, interrupts are acknowledged
/// by writing the status back, and a post carries the frame address
/// shifted right by three with the extra unit count in the low bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Xscale;

impl HardwareProfile for Xscale {
    fn name(&self) -> &'static str {
        "xscale"
    }

    fn read_fw_state<R: RegisterIo>(&self, regs: &R) -> u32 {
        regs.read32(offset::OMSG0)
    }

    fn init_doorbell<R: RegisterIo>(&self, regs: &R, value: InitDoorbell) {
        regs.write32(offset::IDB, value.bits());
    }

    fn enable_interrupts<R: RegisterIo>(&self, regs: &R) {
        regs.write32(offset::OMSK, intr::XSCALE_ENABLE);
    }

    fn disable_interrupts<R: RegisterIo>(&self, regs: &R) {
        regs.write32(offset::OMSK, 0);
    }

    fn ack_interrupt<R: RegisterIo>(&self, regs: &R) -> bool {
        let status = regs.read32(offset::OSTS);
        if status & intr::XSCALE_VALID == 0 {
            return false;
        }
        regs.write32(offset::OSTS, status);
        true
    }

    fn post<R: RegisterIo>(&self, regs: &R, post: FramePost) {
        regs.write32(offset::IQP, (post.frame_addr.lo() >> 3) | post.extra_units());
    }

    fn max_frame_units(&self) -> u32 {
        8
    }
}
