/// Sector size in bytes, fixed by CMD16.
pub const BLOCK_SIZE: usize = 512;
/// Sector size in bytes as `u32`, for address arithmetic.
pub const BLOCK_SIZE_U32: u32 = BLOCK_SIZE as u32;

pub mod tokens {
    /// Filler byte clocked out while only receiving.
    pub const DUMMY: u8 = 0xFF;
    /// Start data token for read or write single block.
    pub const DATA_START_BLOCK: u8 = 0xFE;
    /// Stop token for write multiple blocks.
    pub const STOP_TRAN: u8 = 0xFD;
    /// Start data token for write multiple blocks.
    pub const WRITE_MULTIPLE: u8 = 0xFC;
    /// Mask for data response tokens after a write block operation.
    pub const DATA_RES_MASK: u8 = 0x1F;
    /// Write data accepted token.
    pub const DATA_RES_ACCEPTED: u8 = 0x05;
    /// Busy token, held by the card while it programs a block.
    pub const BUSY: u8 = 0x00;
}

pub mod args {
    /// CMD8: 2.7-3.6V supply (0x1) and check pattern 0xAA.
    pub const IF_COND: u32 = 0x0000_01AA;
    /// CMD8 check pattern echoed in the last response byte.
    pub const IF_COND_CHECK_PATTERN: u8 = 0xAA;
    /// CMD8 accepted voltage nibble.
    pub const IF_COND_VOLTAGE: u8 = 0x1;
    /// ACMD41: host capacity support (HCS) bit.
    pub const HCS: u32 = 0x4000_0000;
}
