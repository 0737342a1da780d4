use crate::image::FlashError;

/// Fixed flash layout of one emulated region: where it lives in the target's
/// address space, how large it is, and the erase/program granularity.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Geometry {
    base_address: u32,
    capacity: u32,
    erase_size: u32,
    page_size: u32,
}

/// A flash address resolved against a [`Geometry`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PageAddress {
    /// Erase block index, counted from the base address
    pub block: u32,
    /// Program page within the erase block
    pub page: u32,
    /// Byte offset within the program page
    pub offset: u32,
}

impl Geometry {
    pub fn new(
        base_address: u32,
        capacity: u32,
        erase_size: u32,
        page_size: u32,
    ) -> Result<Self, FlashError> {
        if page_size == 0 || erase_size == 0 || capacity == 0 {
            return Err(FlashError::InvalidGeometry("sizes must be non-zero"));
        }
        if page_size as usize > crate::uf2::UF2_DATA_SIZE {
            return Err(FlashError::InvalidGeometry(
                "program page does not fit in a UF2 frame",
            ));
        }
        if erase_size % page_size != 0 {
            return Err(FlashError::InvalidGeometry(
                "erase block is not a multiple of the program page",
            ));
        }
        if capacity % erase_size != 0 {
            return Err(FlashError::InvalidGeometry(
                "capacity is not a multiple of the erase block",
            ));
        }
        if base_address as u64 + capacity as u64 > 1 << 32 {
            return Err(FlashError::InvalidGeometry(
                "region extends past the 32-bit address space",
            ));
        }

        Ok(Self {
            base_address,
            capacity,
            erase_size,
            page_size,
        })
    }

    pub fn base_address(&self) -> u32 {
        self.base_address
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn erase_size(&self) -> u32 {
        self.erase_size
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn pages_per_block(&self) -> u32 {
        self.erase_size / self.page_size
    }

    pub fn block_count(&self) -> u32 {
        self.capacity / self.erase_size
    }

    /// One past the last address of the region.
    pub fn end_address(&self) -> u64 {
        self.base_address as u64 + self.capacity as u64
    }

    pub fn contains(&self, address: u32) -> bool {
        address >= self.base_address && (address as u64) < self.end_address()
    }

    fn relative(&self, address: u32) -> Result<u32, FlashError> {
        if !self.contains(address) {
            return Err(FlashError::AddressOutOfRange {
                address,
                base: self.base_address,
                capacity: self.capacity,
            });
        }
        Ok(address - self.base_address)
    }

    pub fn block_index_of(&self, address: u32) -> Result<u32, FlashError> {
        Ok(self.relative(address)? / self.erase_size)
    }

    pub fn page_address_of(&self, address: u32) -> Result<PageAddress, FlashError> {
        let relative = self.relative(address)?;
        let in_block = relative % self.erase_size;

        Ok(PageAddress {
            block: relative / self.erase_size,
            page: in_block / self.page_size,
            offset: in_block % self.page_size,
        })
    }

    /// Byte offset of a page from the start of the region.
    pub fn storage_offset_of(&self, block: u32, page: u32) -> u32 {
        block * self.erase_size + page * self.page_size
    }

    /// Absolute flash address of a page.
    pub fn address_of(&self, block: u32, page: u32) -> u32 {
        self.base_address + self.storage_offset_of(block, page)
    }
}
