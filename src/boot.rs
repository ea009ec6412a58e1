//! Top-level boot flow.
//!
//! Brings the card up, prints diagnostics to the console, optionally installs the payload and
//! reports whether the next stage may run. Console lines end with CRLF.

use crate::{Error, SdCardSpi, SdSpiConfig, Transport, BLOCK_SIZE};

use core::fmt::{self, Write};
use size::consts::MiB;

/// Payload length installed by the boot flow.
pub const PAYLOAD_SIZE: usize = (30 * MiB) as usize;
/// First sector of the boot loader partition.
pub const PAYLOAD_START_SECTOR: u32 = 34;
/// Bytes of the payload head shown on the console.
pub const DUMP_LEN: usize = 64;

const DUMP_LINE: usize = 16;

/// Boot flow options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootOptions {
    /// Sector the payload is written to.
    pub start_sector: u32,
    /// Install the payload on the card.
    pub write_payload: bool,
}

impl Default for BootOptions {
    fn default() -> Self {
        BootOptions {
            start_sector: PAYLOAD_START_SECTOR,
            write_payload: false,
        }
    }
}

/// Boot failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError<T> {
    /// Initialization sequence failed.
    Init(Error<T>),
    /// Payload write failed.
    Write(Error<T>),
    /// Console refused output.
    Console,
}

impl<T> From<fmt::Error> for BootError<T> {
    fn from(_: fmt::Error) -> Self {
        BootError::Console
    }
}

/// Payload region at a fixed physical address.
///
/// # Safety
///
/// `origin..origin + len` must be mapped, readable and not written for the rest of the program.
pub unsafe fn payload_region(origin: usize, len: usize) -> &'static [u8] {
    core::slice::from_raw_parts(origin as *const u8, len)
}

/// Hex dump of up to [`DUMP_LEN`] leading bytes, 16 per line.
fn dump_head<W: Write>(console: &mut W, payload: &[u8]) -> fmt::Result {
    let head = &payload[..payload.len().min(DUMP_LEN)];
    write!(console, "First {} bytes of payload:\r\n", head.len())?;

    for line in head.chunks(DUMP_LINE) {
        for byte in line {
            write!(console, "{:02x} ", byte)?;
        }
        console.write_str("\r\n")?;
    }

    Ok(())
}

/// Run the boot flow on `card`.
///
/// Initialization and payload write failures are fatal; a CID read failure is reported and
/// ignored. `Ok` means the next stage may be entered.
pub fn boot<T, Config, W>(
    card: &mut SdCardSpi<T, Config>,
    console: &mut W,
    payload: &[u8],
    options: &BootOptions,
) -> Result<(), BootError<T::Error>>
where
    T: Transport,
    Config: SdSpiConfig,
    W: Write,
{
    console.write_str("INIT\r\n")?;

    if let Err(err) = card.init() {
        console.write_str("ERROR\r\n")?;
        return Err(BootError::Init(err));
    }

    dump_head(console, payload)?;

    match card.read_cid() {
        Ok(cid) => write!(console, "SD CID: {}\r\n", cid)?,
        Err(_) => {
            warn!("CID read failed, continuing");
            console.write_str("SD CID: unavailable\r\n")?;
        }
    }

    if options.write_payload {
        write!(
            console,
            "Writing {} MiB ({} sectors) at sector {}\r\n",
            payload.len() / MiB as usize,
            payload.len() / BLOCK_SIZE,
            options.start_sector
        )?;

        if let Err(err) = card.write_blocks(options.start_sector, payload) {
            match err {
                Error::WriteRejected { sector, .. } => {
                    write!(console, "Write failed at sector {}\r\n", sector)?
                }
                _ => console.write_str("Write failed\r\n")?,
            }
            console.write_str("ERROR\r\n")?;
            return Err(BootError::Write(err));
        }
    }

    console.write_str("BOOT\r\n")?;

    Ok(())
}
