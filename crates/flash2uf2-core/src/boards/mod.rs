pub use rp2040::RP2040;
pub use rp2350::RP2350;

use crate::{address::Geometry, image::FlashError};

pub mod rp2040;
pub mod rp2350;

/// Erase blocks reserved for the filesystem when nothing else is asked for:
/// 512K, a quarter of an RP2040's 2MB flash.
pub const DEFAULT_FILESYSTEM_BLOCKS: u32 = 128;

/// This is a helper struct, which allows you to iterate over every board defined
pub struct BoardIter {
    inner: std::vec::IntoIter<Box<dyn BoardInfo>>,
}

impl BoardIter {
    /// Creates a new BoardIter
    pub fn new() -> Self {
        Self {
            inner: vec![
                Box::new(RP2040::default()) as Box<dyn BoardInfo>,
                Box::new(RP2350::default()),
            ]
            .into_iter(),
        }
    }

    pub fn find_by_name(name: &str) -> Option<Box<dyn BoardInfo>> {
        Self::new().find(|board| board.board_name().eq_ignore_ascii_case(name))
    }
}

impl Default for BoardIter {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for BoardIter {
    type Item = Box<dyn BoardInfo>;
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// This trait helps by allowing for definitions of multiple different boards.
pub trait BoardInfo {
    /// Returns the proper family id to use for the uf2 device
    fn family_id(&self) -> u32;

    /// Optional, with the usual 256 byte program page of QSPI NOR flash
    fn page_size(&self) -> u32 {
        256
    }

    /// Optional, with a default erase size of 4096
    fn flash_sector_erase_size(&self) -> u32 {
        4096
    }

    /// Address the flash device is mapped at
    fn flash_start(&self) -> u32;

    /// Size of the flash device in bytes
    fn flash_size(&self) -> u32;

    /// Get the board's name
    fn board_name(&self) -> &'static str;

    /// Geometry of a filesystem region of `block_count` erase blocks, placed at
    /// the end of the flash device so it stays clear of code flashed at the start.
    fn filesystem_geometry(&self, block_count: u32) -> Result<Geometry, FlashError> {
        let size = block_count
            .checked_mul(self.flash_sector_erase_size())
            .filter(|&size| size <= self.flash_size())
            .ok_or(FlashError::InvalidGeometry(
                "filesystem region does not fit in the flash device",
            ))?;

        Geometry::new(
            self.flash_start() + (self.flash_size() - size),
            size,
            self.flash_sector_erase_size(),
            self.page_size(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_boards_by_name() {
        assert_eq!(
            BoardIter::find_by_name("RP2040").unwrap().board_name(),
            "rp2040"
        );
        assert_eq!(
            BoardIter::find_by_name("rp2350").unwrap().family_id(),
            0xe48bff59
        );
        assert!(BoardIter::find_by_name("esp32").is_none());
        assert_eq!(BoardIter::new().count(), 2);
    }

    #[test]
    fn filesystem_sits_at_the_end_of_flash() {
        let geometry = RP2040.filesystem_geometry(DEFAULT_FILESYSTEM_BLOCKS).unwrap();
        assert_eq!(geometry.base_address(), 0x1018_0000);
        assert_eq!(geometry.capacity(), 512 * 1024);
        assert_eq!(geometry.end_address(), 0x1020_0000);
        assert_eq!(geometry.pages_per_block(), 16);

        let geometry = RP2350.filesystem_geometry(1).unwrap();
        assert_eq!(geometry.base_address(), 0x103f_f000);
    }

    #[test]
    fn region_larger_than_flash_is_rejected() {
        assert!(RP2040.filesystem_geometry(513).is_err());
        assert!(RP2040.filesystem_geometry(512).is_ok());
        assert!(RP2040.filesystem_geometry(u32::MAX).is_err());
        assert!(RP2040.filesystem_geometry(0).is_err());
    }
}
