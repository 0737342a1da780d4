use crate::boards::BoardInfo;

#[derive(Debug, Default, Clone)]
pub struct RP2350;

impl BoardInfo for RP2350 {
    fn family_id(&self) -> u32 {
        // This is the rp2350 arm secure family id, should technically always be true if you held the bootsel button down and cycled power.
        0xe48bff59
    }

    fn flash_start(&self) -> u32 {
        FLASH_START_RP2350
    }

    fn flash_size(&self) -> u32 {
        FLASH_SIZE_RP2350
    }

    fn board_name(&self) -> &'static str {
        "rp2350"
    }
}

pub const FLASH_START_RP2350: u32 = 0x10000000;
// The 4MB part fitted to a Raspberry Pi Pico 2
pub const FLASH_SIZE_RP2350: u32 = 4 * 1024 * 1024;
