//! # Register Map
//!
//! Offsets and bit definitions shared by the MFI controller generations.
//! Which of these a generation actually uses is decided in [`crate::profile`].

use bitflags::bitflags;

/// Register offsets from the start of the register BAR
pub mod offset {
    /// Inbound doorbell, skinny generation
    pub const SKINNY_IDB: usize = 0x00;
    /// Outbound message 0 (firmware state on xscale)
    pub const OMSG0: usize = 0x18;
    /// Inbound doorbell
    pub const IDB: usize = 0x20;
    /// Outbound interrupt status
    pub const OSTS: usize = 0x30;
    /// Outbound interrupt mask
    pub const OMSK: usize = 0x34;
    /// Inbound queue port
    pub const IQP: usize = 0x40;
    /// Outbound doorbell clear
    pub const ODC: usize = 0xa0;
    /// Outbound scratch pad (firmware state on ppc, gen2, skinny)
    pub const OSP: usize = 0xb0;
    /// Inbound queue port, low word (skinny)
    pub const IQPL: usize = 0xc0;
    /// Inbound queue port, high word (skinny)
    pub const IQPH: usize = 0xc4;
}

/// Firmware status word layout
pub mod status {
    /// State nibble
    pub const STATE_MASK: u32 = 0xf000_0000;
    /// State nibble position
    pub const STATE_SHIFT: u32 = 28;
    /// Maximum scatter-gather entries per command
    pub const MAXSGL_MASK: u32 = 0x00ff_0000;
    /// Position of the SGL limit
    pub const MAXSGL_SHIFT: u32 = 16;
    /// Maximum outstanding commands
    pub const MAXCMD_MASK: u32 = 0x0000_ffff;
}

/// Outbound interrupt status bits, per generation
pub mod intr {
    /// xscale: reply posted
    pub const XSCALE_VALID: u32 = 0x0000_0002;
    /// xscale: mask value that unmasks reply interrupts
    pub const XSCALE_ENABLE: u32 = 0x0000_0001;
    /// ppc: reply posted
    pub const PPC_VALID: u32 = 0x8000_0000;
    /// ppc: bits left unmasked when interrupts are on
    pub const PPC_UNMASK: u32 = 0x8000_0004;
    /// gen2: reply posted
    pub const GEN2_VALID: u32 = 0x0000_0005;
    /// skinny: reply posted
    pub const SKINNY_VALID: u32 = 0x0000_0001;
}

bitflags! {
    /// Values written to the init doorbell during bring-up and reset
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InitDoorbell: u32 {
        /// Abort all outstanding commands
        const ABORT = 0x0000_0001;
        /// Move from OPERATIONAL to READY
        const READY = 0x0000_0002;
        /// Select MFI mode
        const MFIMODE = 0x0000_0004;
        /// Acknowledge WAIT_HANDSHAKE
        const CLEAR_HANDSHAKE = 0x0000_0008;

        /// Adapter reset request
        const RESET = Self::ABORT.bits() | Self::READY.bits() | Self::MFIMODE.bits();
    }
}
