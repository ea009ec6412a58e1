/// Represents config for [`SdCardSpi`](crate::SdCardSpi).
pub trait SdSpiConfig {
    /// SPI clock divisor written once at power-on.
    ///
    /// The SiFive controller holds 12 bits, so values above
    /// [`MAX_CLOCK_DIVISOR`](crate::sifive::MAX_CLOCK_DIVISOR) are clamped.
    const CLOCK_DIVISOR: u32;
    /// Max attempts to read R1 after a command frame.
    const CMD_RESPONSE_ATTEMPTS: usize;
    /// Max CMD55 + ACMD41 rounds before the card must leave idle state.
    const READY_ATTEMPTS: usize;
    /// Max polls while the card holds the busy token after a written block.
    const BUSY_ATTEMPTS: usize;
    /// Max polls for the start token of a register read.
    const START_TOKEN_ATTEMPTS: usize;
}

/// Input clock of the SPI controller on the reference platform.
pub const DEFAULT_INPUT_CLOCK_HZ: u32 = 100_000_000;
/// SD high speed mode. Use 12.5 MHz (default speed mode) for cards that do not support it.
pub const DEFAULT_SCK_HZ: u32 = 25_000_000;

/// Divisor for a controller clocking `sck = input / (2 * (div + 1))`.
pub const fn clock_divisor(input_hz: u32, sck_hz: u32) -> u32 {
    (input_hz / sck_hz / 2).saturating_sub(1)
}

/// Default implementation of [`SdSpiConfig`](crate::SdSpiConfig).
///
/// The ready and busy polls are effectively unbounded, a card that never answers keeps the
/// driver waiting. Implement the trait with tighter bounds to fail instead.
pub struct DefaultSdSpiConfig;

impl SdSpiConfig for DefaultSdSpiConfig {
    const CLOCK_DIVISOR: u32 = clock_divisor(DEFAULT_INPUT_CLOCK_HZ, DEFAULT_SCK_HZ);
    const CMD_RESPONSE_ATTEMPTS: usize = 1000;
    const READY_ATTEMPTS: usize = usize::MAX;
    const BUSY_ATTEMPTS: usize = usize::MAX;
    const START_TOKEN_ATTEMPTS: usize = usize::MAX;
}
