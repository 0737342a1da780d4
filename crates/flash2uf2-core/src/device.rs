//! Block device contract as seen by an on-device filesystem, and an adapter
//! that serves it from a [`FlashImage`].
//!
//! Blocks are erase blocks numbered from the start of the filesystem region.
//! `program` and `erase` work at page and erase block granularity, `read` is
//! byte granular inside one block.

use log::trace;
use thiserror::Error;

use crate::image::{ERASED_BYTE, FlashError, FlashImage, ReadStatus};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockDeviceError {
    #[error("Flash I/O failed")]
    Io(#[from] FlashError),
    #[error("Access of {size} bytes at block {block} offset {offset} is outside the device")]
    OutOfBounds { block: u32, offset: u32, size: usize },
    #[error("Program of {size} bytes at block {block} offset {offset} is not page aligned")]
    Unaligned { block: u32, offset: u32, size: usize },
}

pub trait BlockDevice {
    fn read(&mut self, block: u32, offset: u32, buffer: &mut [u8]) -> Result<(), BlockDeviceError>;

    fn program(&mut self, block: u32, offset: u32, data: &[u8]) -> Result<(), BlockDeviceError>;

    fn erase(&mut self, block: u32) -> Result<(), BlockDeviceError>;

    fn sync(&mut self) -> Result<(), BlockDeviceError>;
}

/// Serves [`BlockDevice`] requests from an emulated flash region.
pub struct FlashRegion<'a> {
    image: &'a mut FlashImage,
}

impl<'a> FlashRegion<'a> {
    pub fn new(image: &'a mut FlashImage) -> Self {
        Self { image }
    }

    pub fn block_count(&self) -> u32 {
        self.image.geometry().block_count()
    }

    pub fn block_size(&self) -> u32 {
        self.image.geometry().erase_size()
    }

    pub fn page_size(&self) -> u32 {
        self.image.geometry().page_size()
    }

    fn check_bounds(&self, block: u32, offset: u32, size: usize) -> Result<(), BlockDeviceError> {
        if block >= self.block_count() || offset as u64 + size as u64 > self.block_size() as u64 {
            return Err(BlockDeviceError::OutOfBounds {
                block,
                offset,
                size,
            });
        }
        Ok(())
    }

    fn address(&self, block: u32, offset: u32) -> u32 {
        self.image.geometry().address_of(block, 0) + offset
    }
}

impl BlockDevice for FlashRegion<'_> {
    /// Pages that are not present read back as erased flash.
    fn read(
        &mut self,
        block: u32,
        offset: u32,
        buffer: &mut [u8],
    ) -> Result<(), BlockDeviceError> {
        self.check_bounds(block, offset, buffer.len())?;

        let page_size = self.page_size() as usize;
        let mut done = 0;
        while done < buffer.len() {
            let position = offset as usize + done;
            let len = (page_size - position % page_size).min(buffer.len() - done);
            let chunk = &mut buffer[done..done + len];

            let address = self.address(block, position as u32);
            if self.image.read_range(address, chunk)? == ReadStatus::Unavailable {
                chunk.fill(ERASED_BYTE);
            }
            done += len;
        }

        Ok(())
    }

    fn program(&mut self, block: u32, offset: u32, data: &[u8]) -> Result<(), BlockDeviceError> {
        self.check_bounds(block, offset, data.len())?;

        let page_size = self.page_size() as usize;
        if offset as usize % page_size != 0 || data.len() % page_size != 0 {
            return Err(BlockDeviceError::Unaligned {
                block,
                offset,
                size: data.len(),
            });
        }

        trace!("Program block {} offset {} ({} bytes)", block, offset, data.len());

        for (i, page) in data.chunks(page_size).enumerate() {
            let address = self.address(block, offset + (i * page_size) as u32);
            self.image.write_page(address, page)?;
        }

        Ok(())
    }

    fn erase(&mut self, block: u32) -> Result<(), BlockDeviceError> {
        self.check_bounds(block, 0, 0)?;
        self.image.erase_block_index(block)?;
        Ok(())
    }

    fn sync(&mut self) -> Result<(), BlockDeviceError> {
        Ok(())
    }
}
