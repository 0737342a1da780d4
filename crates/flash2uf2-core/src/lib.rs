//! Host side model of a microcontroller's flash filesystem region, and a
//! UF2 codec on top of it.
//!
//! A [`FlashImage`](image::FlashImage) behaves like NOR flash with infinite
//! endurance: pages are programmed after their erase block was erased, and a
//! page only holds data while it is marked present. The image can be filled
//! through the [`BlockDevice`](device::BlockDevice) contract a filesystem
//! library uses, or by replaying a UF2 file, and turned back into a UF2 file
//! a bootloader can flash.

use std::io::{Read, Write};

use log::info;
use thiserror::Error;

use crate::{
    device::{BlockDevice, BlockDeviceError, FlashRegion},
    image::{ERASED_BYTE, FlashError, FlashImage},
    uf2::FrameDefect,
};

pub mod address;
pub mod boards;
pub mod decode;
pub mod device;
pub mod encode;
pub mod image;
pub mod uf2;

pub use address::{Geometry, PageAddress};
pub use decode::{decode, read_uf2};
pub use encode::{encode, write_uf2};

// See https://github.com/microsoft/uf2/blob/master/utils/uf2families.json for list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
#[allow(non_camel_case_types)]
pub enum Family {
    /// Raspberry Pi RP2040
    RP2040 = 0xe48bff56,

    /// Raspberry Pi Microcontrollers: Absolute (unpartitioned) download
    RP2XXX_ABSOLUTE = 0xe48bff57,

    /// Raspberry Pi Microcontrollers: Data partition download
    RP2XXX_DATA = 0xe48bff58,

    /// Raspberry Pi RP2350, Secure Arm image
    RP2350_ARM_S = 0xe48bff59,

    /// Raspberry Pi RP2350, RISC-V image
    RP2350_RISCV = 0xe48bff5a,

    /// Raspberry Pi RP2350, Non-secure Arm image
    RP2350_ARM_NS = 0xe48bff5b,
}

impl Family {
    pub fn from_id(id: u32) -> Option<Self> {
        [
            Self::RP2040,
            Self::RP2XXX_ABSOLUTE,
            Self::RP2XXX_DATA,
            Self::RP2350_ARM_S,
            Self::RP2350_RISCV,
            Self::RP2350_ARM_NS,
        ]
        .into_iter()
        .find(|family| *family as u32 == id)
    }
}

#[derive(Error, Debug)]
pub enum Uf2Error {
    #[error("Frame {frame} is not a valid UF2 frame: {defect}")]
    CorruptFrame { frame: u32, defect: FrameDefect },
    #[error("Frame {frame} could not be applied to the flash image")]
    FailedToApplyFrame { frame: u32, source: FlashError },
    #[error("Failed to read input")]
    FailedToRead(std::io::Error),
    #[error("Failed to write to output")]
    FailedToWrite(std::io::Error),
    #[error("Raw image of {size} bytes does not fit the {capacity} byte flash region")]
    RawImageTooLarge { size: u64, capacity: u32 },
    #[error("Block device access failed")]
    BlockDevice(#[from] BlockDeviceError),
}

/// Loads a raw dump of the filesystem region, as produced by a host side
/// filesystem tool, into `image` through the block device contract.
///
/// Every block the dump covers is erased. Pages that are entirely erased
/// (`0xFF`) are left unprogrammed so they do not end up in the UF2 file.
/// Returns the number of pages programmed.
pub fn load_raw(mut input: impl Read, image: &mut FlashImage) -> Result<u32, Uf2Error> {
    let mut raw = Vec::new();
    input
        .read_to_end(&mut raw)
        .map_err(Uf2Error::FailedToRead)?;

    let capacity = image.geometry().capacity();
    if raw.len() as u64 > capacity as u64 {
        return Err(Uf2Error::RawImageTooLarge {
            size: raw.len() as u64,
            capacity,
        });
    }

    let mut region = FlashRegion::new(image);
    let block_size = region.block_size() as usize;
    let page_size = region.page_size() as usize;
    let mut page_buf = vec![ERASED_BYTE; page_size];
    let mut programmed = 0;

    for (block, contents) in (0..).zip(raw.chunks(block_size)) {
        region.erase(block)?;

        for (page, data) in contents.chunks(page_size).enumerate() {
            if data.iter().all(|&b| b == ERASED_BYTE) {
                continue;
            }

            page_buf.fill(ERASED_BYTE);
            page_buf[..data.len()].copy_from_slice(data);
            region.program(block, (page * page_size) as u32, &page_buf)?;
            programmed += 1;
        }
    }
    region.sync()?;

    info!("Loaded {} bytes, {} pages programmed", raw.len(), programmed);

    Ok(programmed)
}

/// Writes the whole region of `image` to `output` as a raw dump, absent pages
/// as erased flash.
pub fn dump_raw(image: &mut FlashImage, mut output: impl Write) -> Result<(), Uf2Error> {
    let mut region = FlashRegion::new(image);
    let mut block_buf = vec![0; region.block_size() as usize];

    for block in 0..region.block_count() {
        region.read(block, 0, &mut block_buf)?;
        output
            .write_all(&block_buf)
            .map_err(Uf2Error::FailedToWrite)?;
    }
    output.flush().map_err(Uf2Error::FailedToWrite)?;

    Ok(())
}
