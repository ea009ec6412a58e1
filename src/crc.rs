/// CRC-7 calculation.
pub fn crc7(data: &[u8]) -> u8 {
    let mut crc = 0;
    for mut byte in data.iter().cloned() {
        for _bit in 0..8 {
            crc <<= 1;
            if ((byte & 0x80) ^ (crc & 0x80)) != 0 {
                crc ^= 0x09;
            }
            byte <<= 1;
        }
    }
    crc
}

/// One CRC-16 (XMODEM/CCITT, polynomial 0x1021) round in the byte swapping form the card expects.
pub const fn crc16_step(crc: u16, byte: u8) -> u16 {
    let mut crc = crc.rotate_left(8);
    crc ^= byte as u16;
    crc ^= (crc & 0xFF) >> 4;
    crc ^= crc << 12;
    crc ^= (crc & 0xFF) << 5;
    crc
}

/// CRC-16 calculation.
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0, |crc, &byte| crc16_step(crc, byte))
}

/// Running CRC-16 over a data block, fed one byte at a time as it is sent.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Crc16(u16);

impl Crc16 {
    pub const fn new() -> Self {
        Crc16(0)
    }

    pub fn update(&mut self, byte: u8) {
        self.0 = crc16_step(self.0, byte);
    }

    pub const fn value(&self) -> u16 {
        self.0
    }

    /// Trailer bytes, most significant first.
    pub const fn to_be_bytes(&self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}
