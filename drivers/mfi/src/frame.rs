//! # MFI Frames
//!
//! A frame is the native command the adapter fetches by DMA. It starts
//! with a 24-byte header shared by all commands, followed by a body whose
//! layout depends on the opcode and then the scatter-gather list. Frames
//! are built in 64-byte units; a long SGL spills into further units.
//!
//! ```text
//! 0        8         16       24
//! +--------+---------+--------+--------------------------+-----
//! | cmd .. | context | flags  | body (opcode specific)   | SGL
//! +--------+---------+--------+--------------------------+-----
//! ```
//!
//! All fields are little-endian.

use crate::sgl::DataDescriptor;
use bitflags::bitflags;
use hba_hal::{DmaRegion, PhysAddr};

/// Size of one frame unit
pub const FRAME_UNIT: usize = 64;
/// Size of the common header
pub const HEADER_SIZE: usize = 24;
/// Sense buffer bytes per slot
pub const SENSE_SIZE: usize = 128;
/// Largest CDB a pass-through frame carries
pub const CDB_MAX: usize = 16;
/// Largest SGL offset of any frame body
pub const MAX_SGL_OFFSET: usize = 48;
/// Smallest frame stride; the INIT frame needs its second unit
pub const MIN_FRAME_STRIDE: usize = 2 * FRAME_UNIT;

/// Header field offsets
pub mod hdr {
    /// Opcode byte
    pub const CMD: usize = 0;
    /// Sense buffer length
    pub const SENSE_LEN: usize = 1;
    /// Completion status, written by the firmware
    pub const CMD_STATUS: usize = 2;
    /// SCSI status, written by the firmware
    pub const SCSI_STATUS: usize = 3;
    /// Target id
    pub const TARGET_ID: usize = 4;
    /// Logical unit
    pub const LUN: usize = 5;
    /// Valid CDB bytes
    pub const CDB_LEN: usize = 6;
    /// SGL entry count
    pub const SG_COUNT: usize = 7;
    /// Context echoed in the reply ring
    pub const CONTEXT: usize = 8;
    /// Reserved
    pub const PAD0: usize = 12;
    /// [`FrameFlags`](super::FrameFlags)
    pub const FLAGS: usize = 16;
    /// Firmware timeout, unused
    pub const TIMEOUT: usize = 18;
    /// Transfer length: bytes, or blocks for logical-drive I/O
    pub const DATA_LEN: usize = 20;
}

/// Logical-drive I/O body
pub mod io {
    /// Sense buffer address, low word
    pub const SENSE_LO: usize = 24;
    /// Sense buffer address, high word
    pub const SENSE_HI: usize = 28;
    /// First block, low word
    pub const LBA_LO: usize = 32;
    /// First block, high word
    pub const LBA_HI: usize = 36;
    /// Start of the SGL
    pub const SGL: usize = 40;
}

/// SCSI pass-through body
pub mod pass {
    /// Sense buffer address, low word
    pub const SENSE_LO: usize = 24;
    /// Sense buffer address, high word
    pub const SENSE_HI: usize = 28;
    /// CDB, [`CDB_MAX`](super::CDB_MAX) bytes
    pub const CDB: usize = 32;
    /// Start of the SGL
    pub const SGL: usize = 48;
}

/// DCMD body
pub mod dcmd {
    /// Management opcode
    pub const OPCODE: usize = 24;
    /// Mailbox arguments
    pub const MBOX: usize = 28;
    /// Mailbox length in bytes
    pub const MBOX_SIZE: usize = 12;
    /// Start of the SGL
    pub const SGL: usize = 40;

    /// Stop the firmware before its memory is reclaimed
    pub const CTRL_SHUTDOWN: u32 = 0x0105_0000;
}

/// INIT body and its queue info block
pub mod init {
    /// New queue info address, low word
    pub const QINFO_NEW_LO: usize = 24;
    /// New queue info address, high word
    pub const QINFO_NEW_HI: usize = 28;
    /// Previous queue info address, low word; always zero
    pub const QINFO_OLD_LO: usize = 32;
    /// Previous queue info address, high word; always zero
    pub const QINFO_OLD_HI: usize = 36;
    /// Queue info lives in the second frame unit
    pub const QINFO: usize = super::FRAME_UNIT;
    /// Queue info block length
    pub const QINFO_SIZE: usize = 32;

    /// Queue info field offsets, relative to [`QINFO`]
    pub mod qinfo {
        /// Reserved flags
        pub const FLAGS: usize = 0;
        /// Reply ring entry count
        pub const RQ_ENTRIES: usize = 4;
        /// Reply ring entries, low word
        pub const RQ_ADDR_LO: usize = 8;
        /// Reply ring entries, high word
        pub const RQ_ADDR_HI: usize = 12;
        /// Producer cell, low word
        pub const PI_ADDR_LO: usize = 16;
        /// Producer cell, high word
        pub const PI_ADDR_HI: usize = 20;
        /// Consumer cell, low word
        pub const CI_ADDR_LO: usize = 24;
        /// Consumer cell, high word
        pub const CI_ADDR_HI: usize = 28;
    }
}

/// Native command opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Queue initialisation
    Init = 0x00,
    /// Logical drive read
    LdRead = 0x01,
    /// Logical drive write
    LdWrite = 0x02,
    /// SCSI command to a logical drive
    LdScsiIo = 0x03,
    /// SCSI command to a physical device
    PdScsiIo = 0x04,
    /// Direct controller command
    Dcmd = 0x05,
    /// SAS management protocol
    Smp = 0x07,
    /// SATA tunnelling
    Stp = 0x08,
}

bitflags! {
    /// Header `flags` field
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FrameFlags: u16 {
        /// Complete by writing the status byte only
        const DONT_POST_IN_REPLY_QUEUE = 0x0001;
        /// SGL entries are 64-bit
        const SGL64 = 0x0002;
        /// Sense address is 64-bit
        const SENSE64 = 0x0004;
        /// Data flows host to device
        const DIR_WRITE = 0x0008;
        /// Data flows device to host
        const DIR_READ = 0x0010;
    }
}

/// Completion status byte written by the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameStatus(u8);

impl FrameStatus {
    /// Success
    pub const OK: Self = Self(0x00);
    /// Unknown opcode
    pub const INVALID_CMD: Self = Self(0x01);
    /// Unknown DCMD opcode
    pub const INVALID_DCMD: Self = Self(0x02);
    /// Bad field in the frame
    pub const INVALID_PARAMETER: Self = Self(0x03);
    /// No such target
    pub const DEVICE_NOT_FOUND: Self = Self(0x0c);
    /// Target returned a SCSI error; sense data is valid
    pub const SCSI_DONE_WITH_ERROR: Self = Self(0x2d);
    /// Not yet written by the firmware
    pub const INVALID: Self = Self(0xff);

    /// Wrap a raw status byte
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    /// The raw byte
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Did the command succeed?
    pub const fn is_ok(self) -> bool {
        self.0 == Self::OK.0
    }
}

/// Command data direction, seen from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// No data phase
    #[default]
    None,
    /// Device to host
    Read,
    /// Host to device
    Write,
}

impl Direction {
    /// Header flag for this direction
    pub fn flags(self) -> FrameFlags {
        match self {
            Direction::None => FrameFlags::empty(),
            Direction::Read => FrameFlags::DIR_READ,
            Direction::Write => FrameFlags::DIR_WRITE,
        }
    }
}

/// Addressed device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Target {
    /// Logical drive or physical device id
    pub id: u8,
    /// Logical unit
    pub lun: u8,
}

impl Target {
    /// Create a target
    pub const fn new(id: u8, lun: u8) -> Self {
        Self { id, lun }
    }
}

/// Opcode-specific part of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBody {
    /// Block I/O to a logical drive
    Io {
        /// First block
        lba: u64,
        /// Block count
        blocks: u32,
    },
    /// SCSI pass-through
    Scsi {
        /// Command descriptor block, zero padded
        cdb: [u8; CDB_MAX],
        /// Valid bytes in `cdb`
        cdb_len: u8,
        /// Address a physical device rather than a logical drive
        physical: bool,
    },
    /// Direct controller command
    Dcmd {
        /// Management opcode
        opcode: u32,
        /// Mailbox arguments
        mbox: [u8; dcmd::MBOX_SIZE],
    },
}

/// One logical command, ready to be encoded into a frame
#[derive(Debug, Clone)]
pub struct CommandRequest {
    /// Opcode-specific fields
    pub body: CommandBody,
    /// Addressed device
    pub target: Target,
    /// Data direction
    pub direction: Direction,
    /// Data buffer segments
    pub data: DataDescriptor,
    /// Watchdog ticks before the command is considered lost
    pub timeout_ticks: Option<u32>,
    /// Opaque value handed back with the completion
    pub user_context: usize,
}

impl CommandRequest {
    fn with_body(body: CommandBody, target: Target, direction: Direction, data: DataDescriptor) -> Self {
        Self { body, target, direction, data, timeout_ticks: None, user_context: 0 }
    }

    /// Read `blocks` blocks starting at `lba`
    pub fn io_read(target: Target, lba: u64, blocks: u32, data: DataDescriptor) -> Self {
        Self::with_body(CommandBody::Io { lba, blocks }, target, Direction::Read, data)
    }

    /// Write `blocks` blocks starting at `lba`
    pub fn io_write(target: Target, lba: u64, blocks: u32, data: DataDescriptor) -> Self {
        Self::with_body(CommandBody::Io { lba, blocks }, target, Direction::Write, data)
    }

    /// SCSI pass-through to a logical drive
    ///
    /// # Panics
    /// If `cdb` is longer than [`CDB_MAX`].
    pub fn scsi(target: Target, cdb: &[u8], direction: Direction, data: DataDescriptor) -> Self {
        assert!(cdb.len() <= CDB_MAX, "CDB of {} bytes", cdb.len());
        let mut buf = [0u8; CDB_MAX];
        buf[..cdb.len()].copy_from_slice(cdb);
        let body = CommandBody::Scsi { cdb: buf, cdb_len: cdb.len() as u8, physical: false };
        Self::with_body(body, target, direction, data)
    }

    /// Direct controller command
    pub fn dcmd(opcode: u32, mbox: [u8; dcmd::MBOX_SIZE], direction: Direction, data: DataDescriptor) -> Self {
        Self::with_body(CommandBody::Dcmd { opcode, mbox }, Target::default(), direction, data)
    }

    /// Address a physical device instead of a logical drive
    ///
    /// Only meaningful for pass-through requests.
    pub fn physical(mut self) -> Self {
        if let CommandBody::Scsi { physical, .. } = &mut self.body {
            *physical = true;
        }
        self
    }

    /// Override the watchdog TTL
    pub fn with_timeout(mut self, ticks: u32) -> Self {
        self.timeout_ticks = Some(ticks);
        self
    }

    /// Attach an opaque caller value
    pub fn with_context(mut self, context: usize) -> Self {
        self.user_context = context;
        self
    }

    /// Native opcode for this request
    pub fn opcode(&self) -> Opcode {
        match self.body {
            CommandBody::Io { .. } if self.direction == Direction::Write => Opcode::LdWrite,
            CommandBody::Io { .. } => Opcode::LdRead,
            CommandBody::Scsi { physical: true, .. } => Opcode::PdScsiIo,
            CommandBody::Scsi { .. } => Opcode::LdScsiIo,
            CommandBody::Dcmd { .. } => Opcode::Dcmd,
        }
    }

    /// Byte offset of the SGL in this request's frame
    pub fn sgl_offset(&self) -> usize {
        match self.body {
            CommandBody::Io { .. } => io::SGL,
            CommandBody::Scsi { .. } => pass::SGL,
            CommandBody::Dcmd { .. } => dcmd::SGL,
        }
    }

    /// Whether the frame carries a sense buffer address
    pub fn has_sense(&self) -> bool {
        !matches!(self.body, CommandBody::Dcmd { .. })
    }
}

/// The common frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct FrameHeader {
    /// [`Opcode`] byte
    pub cmd: u8,
    /// Sense buffer length
    pub sense_len: u8,
    /// Completion status
    pub cmd_status: u8,
    /// SCSI status
    pub scsi_status: u8,
    /// Target id
    pub target_id: u8,
    /// Logical unit
    pub lun: u8,
    /// Valid CDB bytes
    pub cdb_len: u8,
    /// SGL entry count
    pub sg_count: u8,
    /// Echoed in the reply ring
    pub context: u32,
    /// Reserved
    pub pad0: u32,
    /// [`FrameFlags`] bits
    pub flags: u16,
    /// Firmware timeout
    pub timeout: u16,
    /// Transfer length
    pub data_len: u32,
}

static_assertions::const_assert_eq!(core::mem::size_of::<FrameHeader>(), HEADER_SIZE);

/// A frame inside the slot arena
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    region: &'a DmaRegion,
    base: usize,
    len: usize,
}

impl<'a> FrameView<'a> {
    /// View `len` bytes at `base` of `region` as a frame
    pub fn new(region: &'a DmaRegion, base: usize, len: usize) -> Self {
        assert!(base % FRAME_UNIT == 0 && base + len <= region.size());
        Self { region, base, len }
    }

    /// Bus address of the frame
    pub fn phys(&self) -> PhysAddr {
        self.region.phys_at(self.base)
    }

    /// Bytes available to the frame
    pub fn capacity(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn write_u8(&self, offset: usize, value: u8) {
        debug_assert!(offset < self.len);
        self.region.write_u8(self.base + offset, value);
    }

    #[inline]
    pub(crate) fn write_u16(&self, offset: usize, value: u16) {
        debug_assert!(offset + 2 <= self.len);
        self.region.write_u16(self.base + offset, value);
    }

    #[inline]
    pub(crate) fn write_u32(&self, offset: usize, value: u32) {
        debug_assert!(offset + 4 <= self.len);
        self.region.write_u32(self.base + offset, value);
    }

    #[inline]
    pub(crate) fn write_bytes(&self, offset: usize, bytes: &[u8]) {
        debug_assert!(offset + bytes.len() <= self.len);
        self.region.write_bytes(self.base + offset, bytes);
    }

    /// Read a byte
    #[inline]
    pub fn read_u8(&self, offset: usize) -> u8 {
        self.region.read_u8(self.base + offset)
    }

    /// Read a little-endian u16
    #[inline]
    pub fn read_u16(&self, offset: usize) -> u16 {
        self.region.read_u16(self.base + offset)
    }

    /// Read a little-endian u32
    #[inline]
    pub fn read_u32(&self, offset: usize) -> u32 {
        self.region.read_u32(self.base + offset)
    }

    /// Write the common header
    pub fn write_header(&self, h: &FrameHeader) {
        self.write_u8(hdr::CMD, h.cmd);
        self.write_u8(hdr::SENSE_LEN, h.sense_len);
        self.write_u8(hdr::CMD_STATUS, h.cmd_status);
        self.write_u8(hdr::SCSI_STATUS, h.scsi_status);
        self.write_u8(hdr::TARGET_ID, h.target_id);
        self.write_u8(hdr::LUN, h.lun);
        self.write_u8(hdr::CDB_LEN, h.cdb_len);
        self.write_u8(hdr::SG_COUNT, h.sg_count);
        self.write_u32(hdr::CONTEXT, h.context);
        self.write_u32(hdr::PAD0, h.pad0);
        self.write_u16(hdr::FLAGS, h.flags);
        self.write_u16(hdr::TIMEOUT, h.timeout);
        self.write_u32(hdr::DATA_LEN, h.data_len);
    }

    /// Read the common header back
    pub fn header(&self) -> FrameHeader {
        FrameHeader {
            cmd: self.read_u8(hdr::CMD),
            sense_len: self.read_u8(hdr::SENSE_LEN),
            cmd_status: self.read_u8(hdr::CMD_STATUS),
            scsi_status: self.read_u8(hdr::SCSI_STATUS),
            target_id: self.read_u8(hdr::TARGET_ID),
            lun: self.read_u8(hdr::LUN),
            cdb_len: self.read_u8(hdr::CDB_LEN),
            sg_count: self.read_u8(hdr::SG_COUNT),
            context: self.read_u32(hdr::CONTEXT),
            pad0: self.read_u32(hdr::PAD0),
            flags: self.read_u16(hdr::FLAGS),
            timeout: self.read_u16(hdr::TIMEOUT),
            data_len: self.read_u32(hdr::DATA_LEN),
        }
    }

    /// Status byte written by the firmware
    pub fn status(&self) -> FrameStatus {
        FrameStatus::from_raw(self.read_u8(hdr::CMD_STATUS))
    }

    /// SCSI status byte
    pub fn scsi_status(&self) -> u8 {
        self.read_u8(hdr::SCSI_STATUS)
    }

    /// Zero the frame and mark its status as not yet written
    pub fn clear(&self) {
        self.region.fill(self.base, self.len, 0);
        self.write_u8(hdr::CMD_STATUS, FrameStatus::INVALID.raw());
    }
}
