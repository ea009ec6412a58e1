//! Bare-metal SD card boot driver written in Embedded Rust.
//!
//! Brings up an SD card on a polled SPI bus and streams a fixed payload to it with multi-block
//! writes. No interrupts, no DMA: every byte is a blocking full-duplex exchange through a
//! [`Transport`].
//!
//! ```ignore
//! let spi = unsafe { SifiveSpi::new(SPI_CTRL_ADDR) };
//! let mut card: SdCardSpi<_, DefaultSdSpiConfig> = SdCardSpi::new(spi);
//! card.init()?;
//! card.write_blocks(34, payload)?;
//! ```

#![cfg_attr(not(test), no_std)]

mod fmt;

pub mod boot;
mod cid;
mod command;
mod config;
mod consts;
mod crc;
mod init;
mod response;
pub mod sifive;
#[cfg(test)]
mod sim;
mod transport;
mod write;

pub use crate::cid::{Cid, CidData};
pub use crate::command::{Command, CommandFrame, FRAME_SIZE};
pub use crate::config::{clock_divisor, DefaultSdSpiConfig, SdSpiConfig};
pub use crate::consts::{tokens, BLOCK_SIZE};
pub use crate::crc::{crc16, crc16_step, crc7, Crc16};
pub use crate::response::{DataResponse, IfCond, Ocr, R1Response, R1Status};
pub use crate::transport::{ChipSelect, HalError, HalTransport, Transport};
pub use diskio::{
    BlockSize, DiskioDevice, Error as DiskioError, IoctlCmd, Lba, Status, StatusFlag,
};

use crate::consts::BLOCK_SIZE_U32;

use core::{cell::RefCell, marker::PhantomData};

/// [`SdCardSpi`] result error.
///
/// `T` - transport error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<T> {
    /// Error from the transport.
    Transport(T),
    /// No valid R1 within the response window; carries the last byte read.
    TimeoutCommand(Command, u8),
    /// Command answered with an unexpected R1.
    ErrorCommand(Command, u8),
    /// CMD8 did not echo the check pattern.
    CheckPatternMismatch(u8),
    /// CMD8 reported a voltage range other than 2.7-3.6V.
    VoltageNotAccepted(u8),
    /// OCR read before the card finished powering up.
    PowerUpIncomplete(u32),
    /// Card never left idle state during ACMD41 polling.
    TimeoutReady,
    /// Card kept signalling busy after a write.
    TimeoutBusy,
    /// No start block token while reading a register.
    TimeoutStartToken,
    /// Card rejected a written block.
    WriteRejected { sector: u32, token: u8 },
    /// Payload empty or not a whole number of sectors.
    InvalidPayload(usize),
    /// Sector run not addressable by the card; carries the start sector.
    AddressOutOfRange(u32),
    /// Nothing answered CMD0.
    CardNotFound,
}

/// Card type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CardType {
    /// Standard capacity, byte addressed.
    Sdsc,
    /// High or extended capacity, block addressed.
    Sdhc,
}

/// Error type alias.
type ErrorFor<T> = Error<<T as Transport>::Error>;

/// SD Card SPI driver.
///
/// `T` - byte transport.
/// `Config` - Config implementation of driver config trait.
pub struct SdCardSpi<T: Transport, Config: SdSpiConfig> {
    transport: RefCell<T>,
    status: Status,
    card_type: CardType,
    config: PhantomData<Config>,
}

impl<T: Transport, Config: SdSpiConfig> SdCardSpi<T, Config> {
    /// Init sequence value.
    const INIT_SET_VALUE: u8 = tokens::DUMMY;
    /// Init sequence size.
    const INIT_SET_SIZE: usize = 10;
    /// Receive transfer token.
    const RECEIVE_TRANSFER_TOKEN: u8 = tokens::DUMMY;

    /// Creates a new [`SdCardSpi<T, Config>`].
    ///
    /// `transport` - bus the card is attached to.
    pub fn new(transport: T) -> Self {
        SdCardSpi {
            transport: RefCell::new(transport),
            status: StatusFlag::NotInitialized.into(),
            card_type: CardType::Sdhc,
            config: PhantomData::<Config>,
        }
    }

    /// Card type reported by the last successful initialization.
    pub fn card_type(&self) -> CardType {
        self.card_type
    }

    /// Releases the transport.
    pub fn free(self) -> T {
        self.transport.into_inner()
    }

    /// Validate initialzed.
    fn validate_initialized(&self) -> Result<(), DiskioError<ErrorFor<T>>> {
        if self.status.contains(StatusFlag::NotInitialized) {
            Err(DiskioError::NotInitialized)
        } else {
            Ok(())
        }
    }

    /// Convert a sector number to a command argument.
    fn convert_lba(&self, sector: u32) -> Result<u32, ErrorFor<T>> {
        match self.card_type {
            CardType::Sdsc => sector
                .checked_mul(BLOCK_SIZE_U32)
                .ok_or(Error::AddressOutOfRange(sector)),
            CardType::Sdhc => Ok(sector),
        }
    }

    /// Set the SPI clock divisor.
    fn configure_clock(&self, divisor: u32) -> Result<(), ErrorFor<T>> {
        self.transport
            .borrow_mut()
            .configure_clock(divisor)
            .map_err(Error::Transport)
    }

    /// Switch chip select mode.
    fn set_chip_select(&self, mode: ChipSelect) -> Result<(), ErrorFor<T>> {
        self.transport
            .borrow_mut()
            .set_chip_select(mode)
            .map_err(Error::Transport)
    }

    /// Send one byte and receive one byte.
    fn transfer(&self, data: u8) -> Result<u8, ErrorFor<T>> {
        self.transport
            .borrow_mut()
            .transfer(data)
            .map_err(Error::Transport)
    }

    /// Receive a byte from the SD card by clocking in an 0xFF byte.
    fn receive(&self) -> Result<u8, ErrorFor<T>> {
        self.transfer(Self::RECEIVE_TRANSFER_TOKEN)
    }

    /// Send a byte to the SD card.
    fn send(&self, data: u8) -> Result<(), ErrorFor<T>> {
        self.transfer(data).map(|_| ())
    }

    /// Receive a slice from the SD card.
    fn receive_slice(&self, data: &mut [u8]) -> Result<(), ErrorFor<T>> {
        for byte in data.iter_mut() {
            *byte = self.receive()?;
        }

        Ok(())
    }

    /// Send a slice to the SD card.
    fn send_slice(&self, data: &[u8]) -> Result<(), ErrorFor<T>> {
        for byte in data.iter() {
            self.send(*byte)?;
        }

        Ok(())
    }

    /// Skip byte.
    fn skip_byte(&self) -> Result<(), ErrorFor<T>> {
        self.receive().map(|_| ())
    }

    /// Wait for token.
    fn wait_for_token<F: Fn(u8) -> bool>(
        &self,
        attempts: usize,
        token_validator: F,
        error: ErrorFor<T>,
    ) -> Result<u8, ErrorFor<T>> {
        for _ in 0..attempts {
            let token = self.receive()?;

            if token_validator(token) {
                return Ok(token);
            }
        }

        Err(error)
    }

    /// Wait until the card releases the busy token.
    fn wait_not_busy(&self) -> Result<(), ErrorFor<T>> {
        self.wait_for_token(
            Config::BUSY_ATTEMPTS,
            |token| token != tokens::BUSY,
            Error::TimeoutBusy,
        )
        .map(|_| ())
    }

    /// Select the card and send a command frame, then poll for R1.
    ///
    /// Must be followed by [`Self::command_end`] whatever the outcome.
    fn send_command(&self, command: Command, argument: u32) -> Result<R1Response, ErrorFor<T>> {
        let frame = CommandFrame::new(command, argument);

        self.set_chip_select(ChipSelect::Hold)?;
        self.skip_byte()?;
        self.send_slice(&frame.encode())?;

        let mut last = Self::RECEIVE_TRANSFER_TOKEN;
        for _ in 0..Config::CMD_RESPONSE_ATTEMPTS {
            let r1 = R1Response(self.receive()?);

            if r1.is_valid() {
                trace!("CMD{} -> {:#x}", command.index(), r1.0);
                return Ok(r1);
            }

            last = r1.0;
        }

        error!("CMD{}: timeout", command.index());
        Err(Error::TimeoutCommand(command, last))
    }

    /// Trailing dummy byte, then release chip select.
    fn command_end(&self) -> Result<(), ErrorFor<T>> {
        self.skip_byte()?;
        self.set_chip_select(ChipSelect::Auto)
    }

    /// Run `f` with the R1 of `command`; the command is ended on every path.
    fn command_scope<R, F>(&self, command: Command, argument: u32, f: F) -> Result<R, ErrorFor<T>>
    where
        F: FnOnce(&Self, R1Response) -> Result<R, ErrorFor<T>>,
    {
        let result = self
            .send_command(command, argument)
            .and_then(|r1| f(self, r1));
        let end = self.command_end();

        result.and_then(|value| end.map(|_| value))
    }

    /// Send `command` behind an APP_CMD prefix and return its R1.
    fn send_app_command(&self, command: Command, argument: u32) -> Result<R1Response, ErrorFor<T>> {
        self.command_scope(Command::AppCmd, 0x0000_0000, |_, _| Ok(()))?;
        self.command_scope(command, argument, |_, r1| Ok(r1))
    }

    /// Check an R1 against the one the protocol step requires.
    fn expect_r1(
        &self,
        command: Command,
        r1: R1Response,
        expected: R1Response,
    ) -> Result<(), ErrorFor<T>> {
        if r1 != expected {
            error!(
                "CMD{}: unexpected response {:#x}, expected {:#x}",
                command.index(),
                r1.0,
                expected.0
            );
            Err(Error::ErrorCommand(command, r1.0))
        } else {
            Ok(())
        }
    }
}

impl<T: Transport, Config: SdSpiConfig> DiskioDevice for SdCardSpi<T, Config> {
    type HardwareError = ErrorFor<T>;

    fn status(&self) -> Status {
        self.status
    }

    fn reset(&mut self) {
        info!("SD reset invoked");
        self.status = StatusFlag::NotInitialized.into();
    }

    fn initialize(&mut self) -> Result<(), DiskioError<Self::HardwareError>> {
        if !self.status.contains(StatusFlag::NotInitialized) {
            warn!("SD already is initialized");
            return Err(DiskioError::AlreadyInitialized);
        }

        self.init().map(|_| ()).map_err(DiskioError::Hardware)
    }

    fn read(&self, _buf: &mut [u8], _lba: Lba) -> Result<(), DiskioError<Self::HardwareError>> {
        Err(DiskioError::NotSupported)
    }

    fn write(&self, buf: &[u8], lba: Lba) -> Result<(), DiskioError<Self::HardwareError>> {
        self.validate_initialized()?;
        let sector = u32::try_from(lba).map_err(|_| DiskioError::InvalidArgument)?;

        self.write_blocks(sector, buf).map_err(|err| match err {
            Error::InvalidPayload(_) | Error::AddressOutOfRange(_) => DiskioError::InvalidArgument,
            err => DiskioError::Hardware(err),
        })
    }

    fn ioctl(&self, cmd: IoctlCmd) -> Result<(), DiskioError<Self::HardwareError>> {
        match cmd {
            IoctlCmd::CtrlSync => {
                self.validate_initialized()?;
                self.set_chip_select(ChipSelect::Hold)
                    .and_then(|_| self.wait_not_busy())
                    .and_then(|_| self.command_end())
                    .map_err(DiskioError::Hardware)
            }
            IoctlCmd::GetBlockSize(block_size) => {
                *block_size = BLOCK_SIZE;
                Ok(())
            }
            _ => Err(DiskioError::NotSupported),
        }
    }
}
