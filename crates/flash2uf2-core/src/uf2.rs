use static_assertions::const_assert;
use std::mem;
use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{LittleEndian, U32},
};

pub const UF2_MAGIC_START0: u32 = 0x0A324655;
pub const UF2_MAGIC_START1: u32 = 0x9E5D5157;
pub const UF2_MAGIC_END: u32 = 0x0AB16F30;

pub const UF2_FLAG_NOT_MAIN_FLASH: u32 = 0x00000001;
pub const UF2_FLAG_FILE_CONTAINER: u32 = 0x00001000;
pub const UF2_FLAG_FAMILY_ID_PRESENT: u32 = 0x00002000;
pub const UF2_FLAG_MD5_PRESENT: u32 = 0x00004000;

/// Size of one frame on the wire.
pub const UF2_FRAME_SIZE: usize = 512;
/// Size of the data area of one frame.
pub const UF2_DATA_SIZE: usize = 476;

pub type Uf2FrameData = [u8; UF2_DATA_SIZE];

/// Little-endian wire image of a frame. Only used to move bytes in and out of
/// [`Uf2Frame`], so the in-memory layout of the frame never leaks onto disk.
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
struct Uf2FrameWire {
    // 32 byte header
    magic_start0: U32<LittleEndian>,
    magic_start1: U32<LittleEndian>,
    flags: U32<LittleEndian>,
    target_addr: U32<LittleEndian>,
    payload_size: U32<LittleEndian>,
    block_no: U32<LittleEndian>,
    num_blocks: U32<LittleEndian>,
    family_id: U32<LittleEndian>, // or file size, or reserved
    data: Uf2FrameData,
    magic_end: U32<LittleEndian>,
}

const_assert!(mem::size_of::<Uf2FrameWire>() == UF2_FRAME_SIZE);

/// Reasons a 512 byte record is rejected as a UF2 frame.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDefect {
    #[error("bad first start magic {0:#010x}")]
    BadStartMagic0(u32),
    #[error("bad second start magic {0:#010x}")]
    BadStartMagic1(u32),
    #[error("bad end magic {0:#010x}")]
    BadEndMagic(u32),
    #[error("payload size {0} exceeds the {UF2_DATA_SIZE} byte data area")]
    PayloadTooLarge(u32),
}

/// One decoded UF2 frame. The magic words are implied: a `Uf2Frame` only
/// exists once they have been checked, and they are written back by
/// [`Uf2Frame::to_bytes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uf2Frame {
    pub flags: u32,
    pub target_addr: u32,
    pub payload_size: u32,
    pub block_no: u32,
    pub num_blocks: u32,
    pub family_id: u32,
    pub data: Uf2FrameData,
}

impl Uf2Frame {
    /// Produces a frame initialized for a file of `num_blocks` frames
    /// targeting `family_id`.
    ///
    /// `target_addr`, `payload_size`, `block_no` and `data` still have to be
    /// filled in by the caller. The data area starts zeroed.
    pub fn prototype(num_blocks: u32, family_id: u32) -> Self {
        Self {
            flags: UF2_FLAG_FAMILY_ID_PRESENT,
            target_addr: 0,
            payload_size: 0,
            block_no: 0,
            num_blocks,
            family_id,
            data: [0; UF2_DATA_SIZE],
        }
    }

    /// The meaningful bytes of the data area.
    pub fn payload(&self) -> &[u8] {
        let len = (self.payload_size as usize).min(UF2_DATA_SIZE);
        &self.data[..len]
    }

    pub fn is_main_flash(&self) -> bool {
        self.flags & UF2_FLAG_NOT_MAIN_FLASH == 0
    }

    /// The family id, if the frame declares one.
    pub fn family(&self) -> Option<u32> {
        (self.flags & UF2_FLAG_FAMILY_ID_PRESENT != 0).then_some(self.family_id)
    }

    pub fn to_bytes(&self) -> [u8; UF2_FRAME_SIZE] {
        let wire = Uf2FrameWire {
            magic_start0: U32::new(UF2_MAGIC_START0),
            magic_start1: U32::new(UF2_MAGIC_START1),
            flags: U32::new(self.flags),
            target_addr: U32::new(self.target_addr),
            payload_size: U32::new(self.payload_size),
            block_no: U32::new(self.block_no),
            num_blocks: U32::new(self.num_blocks),
            family_id: U32::new(self.family_id),
            data: self.data,
            magic_end: U32::new(UF2_MAGIC_END),
        };

        zerocopy::transmute!(wire)
    }

    pub fn from_bytes(bytes: &[u8; UF2_FRAME_SIZE]) -> Result<Self, FrameDefect> {
        let wire: Uf2FrameWire = zerocopy::transmute!(*bytes);

        if wire.magic_start0.get() != UF2_MAGIC_START0 {
            return Err(FrameDefect::BadStartMagic0(wire.magic_start0.get()));
        }
        if wire.magic_start1.get() != UF2_MAGIC_START1 {
            return Err(FrameDefect::BadStartMagic1(wire.magic_start1.get()));
        }
        if wire.magic_end.get() != UF2_MAGIC_END {
            return Err(FrameDefect::BadEndMagic(wire.magic_end.get()));
        }

        let payload_size = wire.payload_size.get();
        if payload_size as usize > UF2_DATA_SIZE {
            return Err(FrameDefect::PayloadTooLarge(payload_size));
        }

        Ok(Self {
            flags: wire.flags.get(),
            target_addr: wire.target_addr.get(),
            payload_size,
            block_no: wire.block_no.get(),
            num_blocks: wire.num_blocks.get(),
            family_id: wire.family_id.get(),
            data: wire.data,
        })
    }
}
