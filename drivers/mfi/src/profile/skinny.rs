//! Skinny generation

use super::{FramePost, HardwareProfile};
use crate::regs::{intr, offset, InitDoorbell};
use hba_hal::RegisterIo;

/// skinny register contract
///
/// Posts go through a split 64-bit queue port, so frames may sit anywhere
/// in the bus address space. The high word is written first; the low word
/// write hands the frame over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Skinny;

impl HardwareProfile for Skinny {
    fn name(&self) -> &'static str {
        "skinny"
    }

    fn read_fw_state<R: RegisterIo>(&self, regs: &R) -> u32 {
        regs.read32(offset::OSP)
    }

    fn init_doorbell<R: RegisterIo>(&self, regs: &R, value: InitDoorbell) {
        regs.write32(offset::SKINNY_IDB, value.bits());
    }

    fn enable_interrupts<R: RegisterIo>(&self, regs: &R) {
        regs.write32(offset::OMSK, !intr::SKINNY_VALID);
    }

    fn disable_interrupts<R: RegisterIo>(&self, regs: &R) {
        regs.write32(offset::OMSK, 0);
    }

    fn ack_interrupt<R: RegisterIo>(&self, regs: &R) -> bool {
        let status = regs.read32(offset::OSTS);
        if status & intr::SKINNY_VALID == 0 {
            return false;
        }
        regs.write32(offset::OSTS, status);
        true
    }

    fn post<R: RegisterIo>(&self, regs: &R, post: FramePost) {
        regs.write32(offset::IQPH, post.frame_addr.hi());
        regs.write32(offset::IQPL, 0x1 | post.frame_addr.lo() | (post.extra_units() << 1));
    }

    fn max_frame_units(&self) -> u32 {
        32
    }

    fn frames_64bit(&self) -> bool {
        true
    }
}
