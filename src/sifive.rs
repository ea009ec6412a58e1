//! SiFive SPI controller transport.
//!
//! Only the clock divisor, chip select mode and the two data FIFOs are used. Frame format,
//! chip select id and delays keep their reset values.

use crate::transport::{ChipSelect, Transport};

use core::convert::Infallible;
use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::registers::{ReadOnly, ReadWrite};
use tock_registers::{register_bitfields, register_structs};

register_bitfields! [
    u32,
    /// Serial clock divisor (0x00)
    SCKDIV [
        DIV OFFSET(0) NUMBITS(12) []
    ],

    /// Chip select mode (0x18)
    CSMODE [
        MODE OFFSET(0) NUMBITS(2) [
            Auto = 0,
            Hold = 2,
            Off = 3
        ]
    ],

    /// Transmit data (0x48)
    TXDATA [
        DATA OFFSET(0) NUMBITS(8) []
    ],

    /// Receive data (0x4C)
    RXDATA [
        DATA OFFSET(0) NUMBITS(8) [],
        EMPTY OFFSET(31) NUMBITS(1) []
    ]
];

register_structs! {
    SpiRegisters {
        (0x00 => sckdiv: ReadWrite<u32, SCKDIV::Register>),
        (0x04 => _reserved0),
        (0x18 => csmode: ReadWrite<u32, CSMODE::Register>),
        (0x1C => _reserved1),
        (0x48 => txdata: ReadWrite<u32, TXDATA::Register>),
        (0x4C => rxdata: ReadOnly<u32, RXDATA::Register>),
        (0x50 => @END),
    }
}

/// Largest divisor the SCKDIV register holds.
pub const MAX_CLOCK_DIVISOR: u32 = 0xFFF;

/// Owned handle on a SiFive SPI register block.
pub struct SifiveSpi {
    regs: &'static SpiRegisters,
}

impl SifiveSpi {
    /// Creates a handle for the controller mapped at `base`.
    ///
    /// # Safety
    ///
    /// `base` must be the address of a SiFive SPI register block that nothing else accesses for
    /// as long as the handle lives.
    pub unsafe fn new(base: usize) -> Self {
        SifiveSpi {
            regs: &*(base as *const SpiRegisters),
        }
    }
}

impl Transport for SifiveSpi {
    type Error = Infallible;

    fn configure_clock(&mut self, divisor: u32) -> Result<(), Self::Error> {
        debug_assert!(
            divisor <= MAX_CLOCK_DIVISOR,
            "SCKDIV holds 12 bits, got {:#x}",
            divisor
        );
        self.regs
            .sckdiv
            .write(SCKDIV::DIV.val(divisor.min(MAX_CLOCK_DIVISOR)));
        Ok(())
    }

    fn set_chip_select(&mut self, mode: ChipSelect) -> Result<(), Self::Error> {
        self.regs.csmode.write(match mode {
            ChipSelect::Auto => CSMODE::MODE::Auto,
            ChipSelect::Hold => CSMODE::MODE::Hold,
            ChipSelect::Off => CSMODE::MODE::Off,
        });
        Ok(())
    }

    fn transfer(&mut self, byte: u8) -> Result<u8, Self::Error> {
        self.regs.txdata.write(TXDATA::DATA.val(u32::from(byte)));
        loop {
            let rx = self.regs.rxdata.extract();
            if !rx.is_set(RXDATA::EMPTY) {
                return Ok(rx.read(RXDATA::DATA) as u8);
            }
        }
    }
}
