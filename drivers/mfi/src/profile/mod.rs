//! # Hardware Profiles
//!
//! The MFI adapters come in four register generations. They agree on the
//! frame format and the reply ring, and differ only in:
//!
//! - which register reports the firmware state
//! - which register is the init doorbell
//! - how an interrupt is recognised and acknowledged
//! - how a frame address and its unit count are packed into the post
//!
//! Each generation is a zero-sized type implementing [`HardwareProfile`].
//! [`AnyProfile`] picks one from the PCI identification at attach time, and
//! nothing outside this module branches on the generation.

use crate::regs::InitDoorbell;
use crate::{MfiError, MfiResult};
use hba_hal::{PhysAddr, RegisterIo};

mod gen2;
mod ppc;
mod skinny;
mod xscale;

pub use gen2::Gen2;
pub use ppc::Ppc;
pub use skinny::Skinny;
pub use xscale::Xscale;

/// PCI vendor / product pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId {
    /// PCI vendor id
    pub vendor: u16,
    /// PCI product id
    pub product: u16,
}

impl DeviceId {
    /// Create a new device id
    pub const fn new(vendor: u16, product: u16) -> Self {
        Self { vendor, product }
    }
}

/// Everything a post needs to know about a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePost {
    /// Slot that owns the frame
    pub slot: u16,
    /// Bus address of the first frame unit (64-byte aligned)
    pub frame_addr: PhysAddr,
    /// Number of 64-byte units the frame spans, at least one
    pub frame_units: u32,
}

impl FramePost {
    /// Extra units beyond the first, as the hardware counts them
    #[inline]
    pub fn extra_units(&self) -> u32 {
        debug_assert!(self.frame_units >= 1);
        self.frame_units.saturating_sub(1)
    }
}

/// Register contract of one controller generation
///
/// Implementations hold no state; every method acts on the register
/// window passed in.
pub trait HardwareProfile: Send + Sync {
    /// Short generation name for logs
    fn name(&self) -> &'static str;

    /// Read the raw firmware status word
    fn read_fw_state<R: RegisterIo>(&self, regs: &R) -> u32;

    /// Write the init doorbell
    fn init_doorbell<R: RegisterIo>(&self, regs: &R, value: InitDoorbell);

    /// Unmask reply interrupts
    fn enable_interrupts<R: RegisterIo>(&self, regs: &R);

    /// Mask all interrupts
    fn disable_interrupts<R: RegisterIo>(&self, regs: &R);

    /// Claim and acknowledge a pending reply interrupt
    ///
    /// Returns `false` when the interrupt was not raised by this adapter.
    fn ack_interrupt<R: RegisterIo>(&self, regs: &R) -> bool;

    /// Hand a frame to the adapter
    fn post<R: RegisterIo>(&self, regs: &R, post: FramePost);

    /// Largest frame, in 64-byte units, the post encoding can express
    fn max_frame_units(&self) -> u32;

    /// Whether frames may live above 4 GiB
    fn frames_64bit(&self) -> bool {
        false
    }
}

/// Post packing shared by ppc and gen2: address in the high bits, extra
/// units shifted by one, bit 0 set
#[inline]
pub(crate) fn pack_shifted(post: &FramePost) -> u32 {
    0x1 | post.frame_addr.lo() | (post.extra_units() << 1)
}

const VENDOR_LSI: u16 = 0x1000;
const VENDOR_DELL: u16 = 0x1028;

/// Supported adapters and their generation
const DEVICE_TABLE: &[(u16, u16, Generation)] = &[
    (VENDOR_LSI, 0x0411, Generation::Xscale),
    (VENDOR_LSI, 0x0413, Generation::Xscale),
    (VENDOR_DELL, 0x0015, Generation::Xscale),
    (VENDOR_LSI, 0x0060, Generation::Ppc),
    (VENDOR_LSI, 0x007c, Generation::Ppc),
    (VENDOR_LSI, 0x0078, Generation::Gen2),
    (VENDOR_LSI, 0x0079, Generation::Gen2),
    (VENDOR_LSI, 0x0071, Generation::Skinny),
    (VENDOR_LSI, 0x0073, Generation::Skinny),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Generation {
    Xscale,
    Ppc,
    Gen2,
    Skinny,
}

/// A profile chosen at run time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnyProfile {
    /// IOP331-based adapters
    Xscale(Xscale),
    /// PowerPC-based adapters
    Ppc(Ppc),
    /// Second-generation adapters
    Gen2(Gen2),
    /// Low-cost adapters with 64-bit posts
    Skinny(Skinny),
}

impl AnyProfile {
    /// Select the profile for a device
    pub fn for_device(id: DeviceId) -> MfiResult<Self> {
        let generation = DEVICE_TABLE
            .iter()
            .find(|(vendor, product, _)| *vendor == id.vendor && *product == id.product)
            .map(|(_, _, generation)| *generation);

        match generation {
            Some(Generation::Xscale) => Ok(AnyProfile::Xscale(Xscale)),
            Some(Generation::Ppc) => Ok(AnyProfile::Ppc(Ppc)),
            Some(Generation::Gen2) => Ok(AnyProfile::Gen2(Gen2)),
            Some(Generation::Skinny) => Ok(AnyProfile::Skinny(Skinny)),
            None => {
                log::warn!("[mfi] no profile for device {:04x}:{:04x}", id.vendor, id.product);
                Err(MfiError::UnsupportedDevice(id))
            }
        }
    }
}

macro_rules! delegate {
    ($self:ident, $p:ident => $e:expr) => {
        match $self {
            AnyProfile::Xscale($p) => $e,
            AnyProfile::Ppc($p) => $e,
            AnyProfile::Gen2($p) => $e,
            AnyProfile::Skinny($p) => $e,
        }
    };
}

impl HardwareProfile for AnyProfile {
    fn name(&self) -> &'static str {
        delegate!(self, p => p.name())
    }

    fn read_fw_state<R: RegisterIo>(&self, regs: &R) -> u32 {
        delegate!(self, p => p.read_fw_state(regs))
    }

    fn init_doorbell<R: RegisterIo>(&self, regs: &R, value: InitDoorbell) {
        delegate!(self, p => p.init_doorbell(regs, value))
    }

    fn enable_interrupts<R: RegisterIo>(&self, regs: &R) {
        delegate!(self, p => p.enable_interrupts(regs))
    }

    fn disable_interrupts<R: RegisterIo>(&self, regs: &R) {
        delegate!(self, p => p.disable_interrupts(regs))
    }

    fn ack_interrupt<R: RegisterIo>(&self, regs: &R) -> bool {
        delegate!(self, p => p.ack_interrupt(regs))
    }

    fn post<R: RegisterIo>(&self, regs: &R, post: FramePost) {
        delegate!(self, p => p.post(regs, post))
    }

    fn max_frame_units(&self) -> u32 {
        delegate!(self, p => p.max_frame_units())
    }

    fn frames_64bit(&self) -> bool {
        delegate!(self, p => p.frames_64bit())
    }
}
