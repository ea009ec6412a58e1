//! Byte level access to the SPI bus the card sits on.

use embedded_hal::blocking::spi::Transfer;
use switch_hal::OutputSwitch;

/// Chip select mode of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChipSelect {
    /// Controller drives chip select per frame, idle between transactions.
    Auto,
    /// Chip select held asserted.
    Hold,
    /// Chip select forced deasserted.
    Off,
}

/// Full-duplex, unbuffered byte transport.
///
/// Every byte sent yields exactly one byte received.
pub trait Transport {
    /// Transport error type.
    type Error: core::fmt::Debug;

    /// Sets the SPI clock divisor. Called once, before any other operation.
    fn configure_clock(&mut self, divisor: u32) -> Result<(), Self::Error>;

    /// Switches the chip select mode.
    fn set_chip_select(&mut self, mode: ChipSelect) -> Result<(), Self::Error>;

    /// Sends one byte and receives one byte.
    fn transfer(&mut self, byte: u8) -> Result<u8, Self::Error>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    type Error = T::Error;

    fn configure_clock(&mut self, divisor: u32) -> Result<(), Self::Error> {
        (**self).configure_clock(divisor)
    }

    fn set_chip_select(&mut self, mode: ChipSelect) -> Result<(), Self::Error> {
        (**self).set_chip_select(mode)
    }

    fn transfer(&mut self, byte: u8) -> Result<u8, Self::Error> {
        (**self).transfer(byte)
    }
}

/// [`HalTransport`] error.
///
/// `S` - SPI error type.
/// `C` - select switch error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError<S, C> {
    /// Error from the SPI peripheral.
    Spi(S),
    /// Couldn't set a select.
    Select(C),
}

/// [`Transport`] over an embedded-hal SPI bus and a chip select switch.
///
/// `Spi` - SPI.
/// `Cs` - Chip select output switch.
///
/// The bus clock belongs to the HAL, so the divisor is recorded but not applied.
pub struct HalTransport<Spi, Cs> {
    spi: Spi,
    cs: Cs,
    divisor: Option<u32>,
}

impl<Spi, Cs> HalTransport<Spi, Cs>
where
    Spi: Transfer<u8>,
    Cs: OutputSwitch,
{
    /// Creates a new [`HalTransport<Spi, Cs>`].
    pub fn new(spi: Spi, cs: Cs) -> Self {
        HalTransport {
            spi,
            cs,
            divisor: None,
        }
    }

    /// Divisor requested by the driver, if any.
    pub fn divisor(&self) -> Option<u32> {
        self.divisor
    }

    /// Releases the bus and the chip select.
    pub fn free(self) -> (Spi, Cs) {
        (self.spi, self.cs)
    }
}

impl<Spi, Cs> Transport for HalTransport<Spi, Cs>
where
    Spi: Transfer<u8>,
    Cs: OutputSwitch,
    Spi::Error: core::fmt::Debug,
    Cs::Error: core::fmt::Debug,
{
    type Error = HalError<Spi::Error, Cs::Error>;

    fn configure_clock(&mut self, divisor: u32) -> Result<(), Self::Error> {
        self.divisor = Some(divisor);
        Ok(())
    }

    fn set_chip_select(&mut self, mode: ChipSelect) -> Result<(), Self::Error> {
        match mode {
            ChipSelect::Hold => self.cs.on(),
            ChipSelect::Auto | ChipSelect::Off => self.cs.off(),
        }
        .map_err(HalError::Select)
    }

    fn transfer(&mut self, byte: u8) -> Result<u8, Self::Error> {
        self.spi
            .transfer(&mut [byte])
            .map(|b| b[0])
            .map_err(HalError::Spi)
    }
}
