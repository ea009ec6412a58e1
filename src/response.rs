use crate::consts::{args, tokens};

use bitfield::bitfield;

bitfield! {
    /// R1 response bitset.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct R1Response(u8);
    impl Debug;
    pub in_idle_state, _: 0;
    pub erase_reset, _: 1;
    pub illigal_command, _: 2;
    pub command_crc_error, _: 3;
    pub erase_sequence_error, _: 4;
    pub address_error, _: 5;
    pub parameter_error, _: 6;
    pub start_bit, _: 7;
}

/// How the driver reads an R1 response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum R1Status {
    /// All flags clear.
    Ready,
    /// Only the idle flag set, card still initializing.
    Idle,
    /// Any other flag combination.
    Error,
}

impl R1Response {
    /// Card is ready.
    pub const READY_STATE: R1Response = R1Response(0x00);
    /// Card is in idle state.
    pub const IN_IDLE_STATE: R1Response = R1Response(0x01);

    /// Response byte with the start bit clear.
    pub fn is_valid(&self) -> bool {
        !self.start_bit()
    }

    pub fn status(&self) -> R1Status {
        match *self {
            Self::READY_STATE => R1Status::Ready,
            Self::IN_IDLE_STATE => R1Status::Idle,
            _ => R1Status::Error,
        }
    }
}

bitfield! {
    /// Token the card returns after each written data block.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct DataResponse(u8);
    impl Debug;
    pub u8, status, _: 4, 0;
}

impl DataResponse {
    /// Data accepted, low five bits `0b00101`.
    pub fn is_accepted(&self) -> bool {
        self.0 & tokens::DATA_RES_MASK == tokens::DATA_RES_ACCEPTED
    }
}

/// R3 OCR payload.
pub type R3OcrPayload = [u8; 4];

bitfield! {
    /// Operation Conditions Register.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Ocr(u32);
    impl Debug;
    pub power_up_status, _: 31;
    pub card_capacity_status, _: 30;
    pub uhs2_card_status, _: 29;
    pub switching_to_1v8_accepted, _: 24;
    pub u16, voltage_window, _: 23, 15;
}

impl From<R3OcrPayload> for Ocr {
    fn from(payload: R3OcrPayload) -> Self {
        Ocr(u32::from_be_bytes(payload))
    }
}

/// R7 interface condition payload.
pub type R7Payload = [u8; 4];

bitfield! {
    /// Interface condition echoed by CMD8.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct IfCond(u32);
    impl Debug;
    pub u8, command_version, _: 31, 28;
    pub u8, voltage_accepted, _: 11, 8;
    pub u8, check_pattern, _: 7, 0;
}

impl From<R7Payload> for IfCond {
    fn from(payload: R7Payload) -> Self {
        IfCond(u32::from_be_bytes(payload))
    }
}

impl IfCond {
    pub fn voltage_ok(&self) -> bool {
        self.voltage_accepted() == args::IF_COND_VOLTAGE
    }

    pub fn pattern_ok(&self) -> bool {
        self.check_pattern() == args::IF_COND_CHECK_PATTERN
    }
}
