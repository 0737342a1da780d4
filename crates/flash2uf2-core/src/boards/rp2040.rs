use crate::boards::BoardInfo;

#[derive(Debug, Default, Clone)]
pub struct RP2040;

impl BoardInfo for RP2040 {
    fn family_id(&self) -> u32 {
        0xe48bff56
    }

    fn flash_start(&self) -> u32 {
        FLASH_START_RP2040
    }

    fn flash_size(&self) -> u32 {
        FLASH_SIZE_RP2040
    }

    fn board_name(&self) -> &'static str {
        "rp2040"
    }
}

// XIP_MAIN_BASE. The flash is also aliased at 0x11000000, 0x12000000 and
// 0x13000000 with different cache behaviour; UF2 files always use this one.
pub const FLASH_START_RP2040: u32 = 0x10000000;
// The 2MB part fitted to a Raspberry Pi Pico
pub const FLASH_SIZE_RP2040: u32 = 2 * 1024 * 1024;
