use crate::crc::crc7;

/// SD commands used by the boot driver, mapped to their wire byte (`0x40 | index`).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// GO_IDLE_STATE - init card in spi mode if CS low.
    GoIdleState = 0x40,
    /// SEND_IF_COND - verify SD Memory Card interface operating condition.
    SendIfCond = 0x48,
    /// SEND_CID - read the Card Identification register.
    SendCid = 0x4A,
    /// SET_BLOCKLEN - set the block length for block commands.
    SetBlockLen = 0x50,
    /// SET_BLOCK_COUNT - number of blocks of the following multiple block write.
    SetBlockCount = 0x57,
    /// WRITE_MULTIPLE_BLOCK - write blocks of data until a stop token.
    WriteMultipleBlock = 0x59,
    /// SD_SEND_OP_COND - sends host capacity support information and activates
    /// the card's initialization process. Must follow [`Command::AppCmd`].
    SdSendOpCond = 0x69,
    /// APP_CMD - escape for application specific command.
    AppCmd = 0x77,
    /// READ_OCR - read the OCR register of a card.
    ReadOcr = 0x7A,
}

impl Command {
    /// Command base value: start bit 0, transmission bit 1.
    pub const BASE: u8 = 0x40;

    /// Byte sent on the wire.
    pub const fn wire(self) -> u8 {
        self as u8
    }

    /// Command index without framing bits.
    pub const fn index(self) -> u8 {
        self as u8 - Self::BASE
    }

    /// Whether the card only recognizes this command after [`Command::AppCmd`].
    pub const fn is_app(self) -> bool {
        matches!(self, Command::SdSendOpCond)
    }

    /// Looks up the command for a wire byte.
    pub fn from_wire(byte: u8) -> Option<Self> {
        Some(match byte {
            0x40 => Command::GoIdleState,
            0x48 => Command::SendIfCond,
            0x4A => Command::SendCid,
            0x50 => Command::SetBlockLen,
            0x57 => Command::SetBlockCount,
            0x59 => Command::WriteMultipleBlock,
            0x69 => Command::SdSendOpCond,
            0x77 => Command::AppCmd,
            0x7A => Command::ReadOcr,
            _ => return None,
        })
    }
}

/// Size of a command frame on the wire.
pub const FRAME_SIZE: usize = 6;

/// One command as transmitted: index byte, big-endian argument, CRC byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandFrame {
    pub command: Command,
    pub argument: u32,
    /// CRC7 in the upper bits, stop bit in bit 0.
    pub crc: u8,
}

impl CommandFrame {
    /// Builds a frame with its CRC7 computed over the first five bytes.
    pub fn new(command: Command, argument: u32) -> Self {
        let mut frame = CommandFrame {
            command,
            argument,
            crc: 0,
        };
        let bytes = frame.encode();
        frame.crc = (crc7(&bytes[..FRAME_SIZE - 1]) << 1) | 0x01;
        frame
    }

    /// Builds a frame carrying a caller supplied CRC byte.
    pub const fn with_crc(command: Command, argument: u32, crc: u8) -> Self {
        CommandFrame {
            command,
            argument,
            crc,
        }
    }

    /// Wire representation.
    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        let arg = self.argument.to_be_bytes();
        [
            self.command.wire(),
            arg[0],
            arg[1],
            arg[2],
            arg[3],
            self.crc,
        ]
    }

    /// Parses a wire representation; `None` for an unknown command byte.
    pub fn decode(bytes: &[u8; FRAME_SIZE]) -> Option<Self> {
        Some(CommandFrame {
            command: Command::from_wire(bytes[0])?,
            argument: u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
            crc: bytes[5],
        })
    }
}
