//! Second generation

use super::{pack_shifted, FramePost, HardwareProfile};
use crate::regs::{intr, offset, InitDoorbell};
use hba_hal::RegisterIo;

/// gen2 register contract
///
/// Same post encoding and acknowledge register as ppc, with a different
/// set of reply status bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Gen2;

impl HardwareProfile for Gen2 {
    fn name(&self) -> &'static str {
        "gen2"
    }

    fn read_fw_state<R: RegisterIo>(&self, regs: &R) -> u32 {
        regs.read32(offset::OSP)
    }

    fn init_doorbell<R: RegisterIo>(&self, regs: &R, value: InitDoorbell) {
        regs.write32(offset::IDB, value.bits());
    }

    fn enable_interrupts<R: RegisterIo>(&self, regs: &R) {
        regs.write32(offset::ODC, 0xffff_ffff);
        regs.write32(offset::OMSK, !intr::GEN2_VALID);
    }

    fn disable_interrupts<R: RegisterIo>(&self, regs: &R) {
        regs.write32(offset::OMSK, 0xffff_ffff);
    }

    fn ack_interrupt<R: RegisterIo>(&self, regs: &R) -> bool {
        let status = regs.read32(offset::OSTS);
        if status & intr::GEN2_VALID == 0 {
            return false;
        }
        regs.write32(offset::ODC, status);
        true
    }

    fn post<R: RegisterIo>(&self, regs: &R, post: FramePost) {
        regs.write32(offset::IQP, pack_shifted(&post));
    }

    fn max_frame_units(&self) -> u32 {
        32
    }
}
