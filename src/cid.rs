use crate::{
    consts::tokens, Command, Error, ErrorFor, R1Response, SdCardSpi, SdSpiConfig, Transport,
};

use core::fmt;

/// Card Identification register contents.
pub type CidData = [u8; 16];

/// Card Identification register, kept opaque.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cid(pub CidData);

impl fmt::Display for Cid {
    /// Hex digits, the two 8-byte halves separated by a space.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i == 8 {
                f.write_str(" ")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl<T: Transport, Config: SdSpiConfig> SdCardSpi<T, Config> {
    /// Read CID.
    ///
    /// The register CRC is read but not checked.
    pub fn read_cid(&self) -> Result<Cid, ErrorFor<T>> {
        info!("CMD10");

        self.command_scope(Command::SendCid, 0x0000_0000, |s, r1| {
            s.expect_r1(Command::SendCid, r1, R1Response::READY_STATE)?;

            s.wait_for_token(
                Config::START_TOKEN_ATTEMPTS,
                |token| token == tokens::DATA_START_BLOCK,
                Error::TimeoutStartToken,
            )?;

            let mut cid = CidData::default();
            s.receive_slice(&mut cid)?;
            s.skip_byte()?;
            s.skip_byte()?;

            Ok(Cid(cid))
        })
    }
}
