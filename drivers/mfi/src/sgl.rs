//! # Scatter-Gather Lists and Frame Encoding
//!
//! [`FrameEncoder`] turns a [`CommandRequest`] into a native frame in a
//! slot's frame storage. Validation happens before the first byte is
//! written, so a rejected request leaves the frame untouched.

use crate::frame::{
    dcmd, init, io, pass, CommandBody, CommandRequest, FrameFlags, FrameHeader, FrameStatus,
    FrameView, Opcode, FRAME_UNIT, MAX_SGL_OFFSET, MIN_FRAME_STRIDE, SENSE_SIZE,
};
use crate::ring::ReplyRingLayout;
use crate::{MfiError, MfiResult};
use alloc::vec::Vec;
use hba_hal::{DmaSegment, HalError, PhysAddr, Platform};

/// Scatter-gather entry width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SglFormat {
    /// 32-bit address, 32-bit length
    Sgl32,
    /// 64-bit address, 32-bit length
    Sgl64,
}

impl SglFormat {
    /// Bytes per entry
    pub const fn entry_size(self) -> usize {
        match self {
            SglFormat::Sgl32 => 8,
            SglFormat::Sgl64 => 12,
        }
    }

    /// Header flags announcing the format
    pub fn flags(self) -> FrameFlags {
        match self {
            SglFormat::Sgl32 => FrameFlags::empty(),
            SglFormat::Sgl64 => FrameFlags::SGL64 | FrameFlags::SENSE64,
        }
    }
}

/// The physical pieces of a command's data buffer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataDescriptor {
    segments: Vec<DmaSegment>,
}

impl DataDescriptor {
    /// Wrap already-mapped segments
    pub fn new(segments: Vec<DmaSegment>) -> Self {
        Self { segments }
    }

    /// No data phase
    pub fn empty() -> Self {
        Self::default()
    }

    /// Map a CPU buffer through the platform
    pub fn from_buffer<P: Platform>(platform: &P, buffer: &[u8]) -> MfiResult<Self> {
        Ok(Self::new(platform.map_buffer(buffer)?))
    }

    /// The segments
    pub fn segments(&self) -> &[DmaSegment] {
        &self.segments
    }

    /// Segment count
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True when there is no data
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Total bytes described
    pub fn total_len(&self) -> u64 {
        self.segments.iter().map(|s| s.len as u64).sum()
    }
}

/// Encodes requests into frames of a fixed stride
#[derive(Debug, Clone, Copy)]
pub struct FrameEncoder {
    format: SglFormat,
    max_segments: usize,
    stride: usize,
}

impl FrameEncoder {
    /// Create an encoder for up to `max_segments` entries per frame
    pub fn new(format: SglFormat, max_segments: usize) -> Self {
        Self { format, max_segments, stride: Self::stride_for(format, max_segments) }
    }

    /// Frame storage per slot for a given SGL limit
    pub fn stride_for(format: SglFormat, max_segments: usize) -> usize {
        let needed = MAX_SGL_OFFSET + max_segments * format.entry_size();
        needed.max(MIN_FRAME_STRIDE).div_ceil(FRAME_UNIT) * FRAME_UNIT
    }

    /// Largest SGL that fits in `max_units` frame units
    pub fn segments_within(format: SglFormat, max_units: u32) -> usize {
        let bytes = (max_units as usize).saturating_mul(FRAME_UNIT);
        bytes.saturating_sub(MAX_SGL_OFFSET) / format.entry_size()
    }

    /// Units a frame with `segments` entries at `sgl_offset` occupies
    pub fn frame_units(&self, sgl_offset: usize, segments: usize) -> u32 {
        let bytes = sgl_offset + segments * self.format.entry_size();
        bytes.div_ceil(FRAME_UNIT).max(1) as u32
    }

    /// Entry width in use
    pub fn format(&self) -> SglFormat {
        self.format
    }

    /// SGL limit
    pub fn max_segments(&self) -> usize {
        self.max_segments
    }

    /// Frame storage per slot
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Validate a data description against the frame limits
    pub fn check(&self, data: &DataDescriptor) -> MfiResult<()> {
        if data.len() > self.max_segments {
            return Err(MfiError::TooFragmented { segments: data.len(), max: self.max_segments });
        }
        if self.format == SglFormat::Sgl32 && data.segments().iter().any(|s| !s.addr.is_32bit()) {
            return Err(MfiError::Dma(HalError::InvalidAddress));
        }
        if data.total_len() > u32::MAX as u64 {
            return Err(MfiError::Dma(HalError::InvalidParameter));
        }
        Ok(())
    }

    /// Encode `request` into `frame`
    ///
    /// `context` is stored in the header and comes back in the reply ring.
    /// Returns the frame unit count for the post.
    pub fn encode(
        &self,
        frame: &FrameView<'_>,
        context: u16,
        sense: PhysAddr,
        request: &CommandRequest,
    ) -> MfiResult<u32> {
        self.check(&request.data)?;

        let sgl_offset = request.sgl_offset();
        let segments = request.data.len();
        debug_assert!(sgl_offset + segments * self.format.entry_size() <= frame.capacity());

        let mut header = FrameHeader {
            cmd: request.opcode() as u8,
            sense_len: if request.has_sense() { SENSE_SIZE as u8 } else { 0 },
            cmd_status: FrameStatus::INVALID.raw(),
            target_id: request.target.id,
            lun: request.target.lun,
            sg_count: segments as u8,
            context: context as u32,
            flags: (self.format.flags() | request.direction.flags()).bits(),
            data_len: request.data.total_len() as u32,
            ..Default::default()
        };

        match request.body {
            CommandBody::Io { lba, blocks } => {
                header.data_len = blocks;
                frame.write_u32(io::SENSE_LO, sense.lo());
                frame.write_u32(io::SENSE_HI, sense.hi());
                frame.write_u32(io::LBA_LO, lba as u32);
                frame.write_u32(io::LBA_HI, (lba >> 32) as u32);
            }
            CommandBody::Scsi { cdb, cdb_len, .. } => {
                header.cdb_len = cdb_len;
                frame.write_u32(pass::SENSE_LO, sense.lo());
                frame.write_u32(pass::SENSE_HI, sense.hi());
                frame.write_bytes(pass::CDB, &cdb);
            }
            CommandBody::Dcmd { opcode, mbox } => {
                frame.write_u32(dcmd::OPCODE, opcode);
                frame.write_bytes(dcmd::MBOX, &mbox);
            }
        }
        frame.write_header(&header);
        self.write_sgl(frame, sgl_offset, request.data.segments());

        Ok(self.frame_units(sgl_offset, segments))
    }

    fn write_sgl(&self, frame: &FrameView<'_>, sgl_offset: usize, segments: &[DmaSegment]) {
        let size = self.format.entry_size();
        for (i, seg) in segments.iter().enumerate() {
            let at = sgl_offset + i * size;
            match self.format {
                SglFormat::Sgl32 => {
                    frame.write_u32(at, seg.addr.lo());
                    frame.write_u32(at + 4, seg.len);
                }
                SglFormat::Sgl64 => {
                    frame.write_u32(at, seg.addr.lo());
                    frame.write_u32(at + 4, seg.addr.hi());
                    frame.write_u32(at + 8, seg.len);
                }
            }
        }
    }

    /// Encode the INIT command announcing the reply ring
    ///
    /// The queue info block is written into the frame's second unit. The
    /// frame completes by status byte only. Returns the unit count.
    pub fn encode_init(&self, frame: &FrameView<'_>, context: u16, ring: &ReplyRingLayout) -> u32 {
        debug_assert!(frame.capacity() >= init::QINFO + init::QINFO_SIZE);

        let qinfo = frame.phys().add(init::QINFO as u64);
        let q = |field: usize| init::QINFO + field;

        frame.write_u32(q(init::qinfo::FLAGS), 0);
        frame.write_u32(q(init::qinfo::RQ_ENTRIES), ring.capacity);
        frame.write_u32(q(init::qinfo::RQ_ADDR_LO), ring.entries.lo());
        frame.write_u32(q(init::qinfo::RQ_ADDR_HI), ring.entries.hi());
        frame.write_u32(q(init::qinfo::PI_ADDR_LO), ring.producer.lo());
        frame.write_u32(q(init::qinfo::PI_ADDR_HI), ring.producer.hi());
        frame.write_u32(q(init::qinfo::CI_ADDR_LO), ring.consumer.lo());
        frame.write_u32(q(init::qinfo::CI_ADDR_HI), ring.consumer.hi());

        frame.write_u32(init::QINFO_NEW_LO, qinfo.lo());
        frame.write_u32(init::QINFO_NEW_HI, qinfo.hi());
        frame.write_u32(init::QINFO_OLD_LO, 0);
        frame.write_u32(init::QINFO_OLD_HI, 0);

        frame.write_header(&FrameHeader {
            cmd: Opcode::Init as u8,
            cmd_status: FrameStatus::INVALID.raw(),
            context: context as u32,
            flags: FrameFlags::DONT_POST_IN_REPLY_QUEUE.bits(),
            data_len: init::QINFO_SIZE as u32,
            ..Default::default()
        });
        1
    }
}
