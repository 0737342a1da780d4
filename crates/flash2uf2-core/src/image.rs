use std::fmt;

use log::{debug, trace};
use thiserror::Error;

use crate::address::{Geometry, PageAddress};

/// What physical NOR flash reads back after an erase.
pub const ERASED_BYTE: u8 = 0xFF;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    #[error("Write to {address:#010x} is not page aligned (offset {offset} into the page)")]
    MisalignedWrite { address: u32, offset: u32 },
    #[error("Write of {size} bytes exceeds the {page_size} byte program page")]
    InvalidWriteSize { size: usize, page_size: u32 },
    #[error("Read of {size} bytes at page offset {offset} crosses a {page_size} byte page boundary")]
    CrossPageRead {
        offset: u32,
        size: usize,
        page_size: u32,
    },
    #[error("Address {address:#010x} is outside the flash region {base:#010x} + {capacity:#x}")]
    AddressOutOfRange {
        address: u32,
        base: u32,
        capacity: u32,
    },
    #[error("Erase block {block} is outside the flash region of {block_count} blocks")]
    BlockOutOfRange { block: u32, block_count: u32 },
    #[error("Invalid flash geometry: {0}")]
    InvalidGeometry(&'static str),
}

/// Outcome of [`FlashImage::read_range`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReadStatus {
    /// The page holds data and it was copied out
    Available,
    /// The page was never written since its block was last erased; the output buffer is untouched
    Unavailable,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PresentPage {
    pub block: u32,
    pub page: u32,
    pub address: u32,
}

impl fmt::Display for PresentPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Page [{}, {}]: {:08x}", self.block, self.page, self.address)
    }
}

/// A RAM model of a flash region. Every program page carries a presence flag;
/// page bytes mean something only while that flag is set.
pub struct FlashImage {
    geometry: Geometry,
    storage: Box<[u8]>,
    // blocks * pages_per_block, row major by block
    present: Box<[bool]>,
}

impl FlashImage {
    pub fn new(geometry: Geometry) -> Self {
        let pages = geometry.block_count() as usize * geometry.pages_per_block() as usize;

        Self {
            geometry,
            storage: vec![ERASED_BYTE; geometry.capacity() as usize].into_boxed_slice(),
            present: vec![false; pages].into_boxed_slice(),
        }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn base_address(&self) -> u32 {
        self.geometry.base_address()
    }

    pub fn page_address_of(&self, address: u32) -> Result<PageAddress, FlashError> {
        self.geometry.page_address_of(address)
    }

    pub fn block_index_of(&self, address: u32) -> Result<u32, FlashError> {
        self.geometry.block_index_of(address)
    }

    fn block_presence(&self, block: u32) -> Option<&[bool]> {
        let pages = self.geometry.pages_per_block() as usize;
        let start = block as usize * pages;
        self.present.get(start..start + pages)
    }

    fn block_presence_mut(&mut self, block: u32) -> Option<&mut [bool]> {
        let pages = self.geometry.pages_per_block() as usize;
        let start = block as usize * pages;
        self.present.get_mut(start..start + pages)
    }

    fn page_range(&self, block: u32, page: u32) -> std::ops::Range<usize> {
        let start = self.geometry.storage_offset_of(block, page) as usize;
        start..start + self.geometry.page_size() as usize
    }

    /// Erases the block containing `address`. Only presence is cleared, the
    /// old bytes stay in the buffer but are no longer readable.
    pub fn erase_block(&mut self, address: u32) -> Result<(), FlashError> {
        let block = self.geometry.block_index_of(address)?;
        self.erase_block_index(block)
    }

    pub fn erase_block_index(&mut self, block: u32) -> Result<(), FlashError> {
        let block_count = self.geometry.block_count();
        let presence = self
            .block_presence_mut(block)
            .ok_or(FlashError::BlockOutOfRange { block, block_count })?;

        presence.iter_mut().for_each(|p| *p = false);
        trace!("Erased block {}", block);

        Ok(())
    }

    /// Validates a page program of `size` bytes at `address` without touching
    /// the image.
    pub fn check_page_write(&self, address: u32, size: usize) -> Result<PageAddress, FlashError> {
        let page_size = self.geometry.page_size();
        if size > page_size as usize {
            return Err(FlashError::InvalidWriteSize { size, page_size });
        }

        let resolved = self.geometry.page_address_of(address)?;
        if resolved.offset != 0 {
            return Err(FlashError::MisalignedWrite {
                address,
                offset: resolved.offset,
            });
        }

        Ok(resolved)
    }

    /// Programs the page starting at `address`.
    ///
    /// `data` may be shorter than a page; the page still becomes present and
    /// the bytes past `data.len()` keep whatever the buffer held before.
    pub fn write_page(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError> {
        let PageAddress { block, page, .. } = self.check_page_write(address, data.len())?;

        let range = self.page_range(block, page);
        self.storage[range.start..range.start + data.len()].copy_from_slice(data);
        self.present[(block * self.geometry.pages_per_block() + page) as usize] = true;

        Ok(())
    }

    /// Reads `buffer.len()` bytes starting at `address`, which must all lie in
    /// one program page.
    pub fn read_range(&self, address: u32, buffer: &mut [u8]) -> Result<ReadStatus, FlashError> {
        let page_size = self.geometry.page_size();
        let PageAddress {
            block,
            page,
            offset,
        } = self.geometry.page_address_of(address)?;

        if offset as usize + buffer.len() > page_size as usize {
            return Err(FlashError::CrossPageRead {
                offset,
                size: buffer.len(),
                page_size,
            });
        }

        match self.page(block, page) {
            Some(data) => {
                buffer.copy_from_slice(&data[offset as usize..offset as usize + buffer.len()]);
                Ok(ReadStatus::Available)
            }
            None => {
                debug!(
                    "Read unavailable page [{}][{}] off {} (size: {})",
                    block,
                    page,
                    offset,
                    buffer.len()
                );
                Ok(ReadStatus::Unavailable)
            }
        }
    }

    pub fn is_page_present(&self, block: u32, page: u32) -> bool {
        page < self.geometry.pages_per_block()
            && self
                .block_presence(block)
                .is_some_and(|presence| presence[page as usize])
    }

    /// The bytes of a page, if it is present.
    pub fn page(&self, block: u32, page: u32) -> Option<&[u8]> {
        self.is_page_present(block, page)
            .then(|| &self.storage[self.page_range(block, page)])
    }

    pub fn count_present_pages(&self, block: u32) -> usize {
        self.block_presence(block)
            .map(|presence| presence.iter().filter(|&&p| p).count())
            .unwrap_or(0)
    }

    pub fn count_present_blocks(&self) -> usize {
        (0..self.geometry.block_count())
            .filter(|&block| self.count_present_pages(block) > 0)
            .count()
    }

    pub fn present_pages(&self) -> impl Iterator<Item = PresentPage> + '_ {
        let pages_per_block = self.geometry.pages_per_block();

        self.present
            .iter()
            .enumerate()
            .filter(|(_, present)| **present)
            .map(move |(index, _)| {
                let block = index as u32 / pages_per_block;
                let page = index as u32 % pages_per_block;
                PresentPage {
                    block,
                    page,
                    address: self.geometry.address_of(block, page),
                }
            })
    }

    /// Logs every present page at debug level and returns them.
    pub fn debug_dump(&self) -> Vec<PresentPage> {
        self.present_pages()
            .inspect(|page| debug!("{}", page))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: u32 = 0x1000_0000;

    fn image() -> FlashImage {
        FlashImage::new(Geometry::new(BASE, 4 * 4096, 4096, 256).unwrap())
    }

    #[test]
    fn fresh_image_is_empty() {
        let image = image();
        assert_eq!(image.count_present_blocks(), 0);
        assert_eq!(image.present_pages().count(), 0);
        assert_eq!(image.base_address(), BASE);
    }

    #[test]
    fn write_marks_page_present() {
        let mut image = image();
        image.write_page(BASE + 0x1100, &[0x5a; 256]).unwrap();

        assert!(image.is_page_present(1, 1));
        assert_eq!(image.count_present_pages(1), 1);
        assert_eq!(image.count_present_pages(0), 0);
        assert_eq!(image.count_present_blocks(), 1);
        assert_eq!(image.page(1, 1), Some(&[0x5a; 256][..]));
    }

    #[test]
    fn erase_clears_presence_of_whole_block() {
        let mut image = image();
        for page in 0..16 {
            image.write_page(BASE + 0x2000 + page * 256, &[1; 256]).unwrap();
        }
        image.write_page(BASE + 0x3000, &[2; 256]).unwrap();
        assert_eq!(image.count_present_pages(2), 16);

        image.erase_block(BASE + 0x2f00).unwrap();
        assert_eq!(image.count_present_pages(2), 0);
        assert_eq!(image.count_present_pages(3), 1);

        // idempotent, and fine on a block that was never written
        image.erase_block(BASE + 0x2000).unwrap();
        image.erase_block(BASE).unwrap();
        assert_eq!(image.count_present_pages(2), 0);
        assert_eq!(image.count_present_blocks(), 1);
    }

    #[test]
    fn erased_page_is_unavailable() {
        let mut image = image();
        image.write_page(BASE, &[7; 256]).unwrap();
        image.erase_block(BASE).unwrap();

        let mut buf = [0x11; 16];
        assert_eq!(image.read_range(BASE, &mut buf), Ok(ReadStatus::Unavailable));
        assert_eq!(buf, [0x11; 16]);
    }

    #[test]
    fn misaligned_write_is_rejected() {
        let mut image = image();
        assert_eq!(
            image.write_page(BASE + 4, &[0; 16]),
            Err(FlashError::MisalignedWrite {
                address: BASE + 4,
                offset: 4
            })
        );
        assert_eq!(image.count_present_blocks(), 0);
    }

    #[test]
    fn oversized_write_is_rejected() {
        let mut image = image();
        assert_eq!(
            image.write_page(BASE, &[0; 257]),
            Err(FlashError::InvalidWriteSize {
                size: 257,
                page_size: 256
            })
        );
    }

    #[test]
    fn write_check_leaves_image_untouched() {
        let mut image = image();
        image.write_page(BASE + 0x100, &[7; 256]).unwrap();

        assert_eq!(
            image.check_page_write(BASE, 300),
            Err(FlashError::InvalidWriteSize {
                size: 300,
                page_size: 256
            })
        );
        assert_eq!(
            image.check_page_write(BASE + 0x1010, 16),
            Err(FlashError::MisalignedWrite {
                address: BASE + 0x1010,
                offset: 0x10
            })
        );
        assert_eq!(image.check_page_write(BASE + 0x1100, 256).unwrap().page, 1);
        assert_eq!(image.count_present_pages(0), 1);
    }

    #[test]
    fn partial_write_keeps_tail() {
        let mut image = image();
        image.write_page(BASE, &[3; 256]).unwrap();
        image.write_page(BASE, &[4; 16]).unwrap();

        let page = image.page(0, 0).unwrap();
        assert!(page[..16].iter().all(|&b| b == 4));
        assert!(page[16..].iter().all(|&b| b == 3));
    }

    #[test]
    fn reads_within_a_page() {
        let mut image = image();
        let data: Vec<u8> = (0..=255).collect();
        image.write_page(BASE + 0x100, &data).unwrap();

        let mut buf = [0; 4];
        assert_eq!(
            image.read_range(BASE + 0x1fc, &mut buf),
            Ok(ReadStatus::Available)
        );
        assert_eq!(buf, [252, 253, 254, 255]);
    }

    #[test]
    fn cross_page_read_is_rejected() {
        let mut image = image();
        image.write_page(BASE, &[0; 256]).unwrap();

        let mut buf = [0; 8];
        assert_eq!(
            image.read_range(BASE + 0xfc, &mut buf),
            Err(FlashError::CrossPageRead {
                offset: 0xfc,
                size: 8,
                page_size: 256
            })
        );
    }

    #[test]
    fn out_of_range_addresses() {
        let mut image = image();
        assert!(matches!(
            image.write_page(BASE + 4 * 4096, &[0; 256]),
            Err(FlashError::AddressOutOfRange { .. })
        ));
        assert!(matches!(
            image.erase_block(BASE - 4096),
            Err(FlashError::AddressOutOfRange { .. })
        ));
        assert_eq!(
            image.erase_block_index(4),
            Err(FlashError::BlockOutOfRange {
                block: 4,
                block_count: 4
            })
        );
        assert_eq!(image.count_present_pages(4), 0);
    }

    #[test]
    fn dump_lists_present_pages_in_address_order() {
        let mut image = image();
        image.write_page(BASE + 0x3200, &[0; 256]).unwrap();
        image.write_page(BASE + 0x0100, &[0; 256]).unwrap();

        let dump = image.debug_dump();
        assert_eq!(
            dump,
            vec![
                PresentPage {
                    block: 0,
                    page: 1,
                    address: BASE + 0x100
                },
                PresentPage {
                    block: 3,
                    page: 2,
                    address: BASE + 0x3200
                },
            ]
        );
        assert_eq!(dump[1].to_string(), "Page [3, 2]: 10003200");
    }
}
