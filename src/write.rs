use crate::{
    consts::tokens, crc::Crc16, response::DataResponse, Command, Error, ErrorFor, R1Response,
    SdCardSpi, SdSpiConfig, Transport, BLOCK_SIZE,
};

impl<T: Transport, Config: SdSpiConfig> SdCardSpi<T, Config> {
    /// Write `data` to consecutive sectors starting at `start_sector`.
    ///
    /// The run is announced with SET_BLOCK_COUNT and streamed in one WRITE_MULTIPLE_BLOCK
    /// session. A rejected block ends the run: earlier sectors stay written, later ones are not
    /// sent, and the session is still closed with the stop token.
    pub fn write_blocks(&self, start_sector: u32, data: &[u8]) -> Result<(), ErrorFor<T>> {
        if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
            error!(
                "SD invalid buffer, length: {}, block size: {}",
                data.len(),
                BLOCK_SIZE
            );
            return Err(Error::InvalidPayload(data.len()));
        }

        let block_count = u32::try_from(data.len() / BLOCK_SIZE)
            .map_err(|_| Error::InvalidPayload(data.len()))?;

        if start_sector.checked_add(block_count - 1).is_none() {
            error!(
                "SD sector run out of range, start: {}, count: {}",
                start_sector, block_count
            );
            return Err(Error::AddressOutOfRange(start_sector));
        }
        let address = self.convert_lba(start_sector)?;

        debug!(
            "Writing {} sectors starting at sector {}",
            block_count, start_sector
        );

        self.command_scope(Command::SetBlockCount, block_count, |s, r1| {
            s.expect_r1(Command::SetBlockCount, r1, R1Response::READY_STATE)
        })?;

        self.command_scope(Command::WriteMultipleBlock, address, |s, r1| {
            s.expect_r1(Command::WriteMultipleBlock, r1, R1Response::READY_STATE)?;

            let written = s.write_sectors(start_sector, data);
            let stopped = s.stop_transmission();

            written.and(stopped)
        })
    }

    /// Stream the blocks of an open write session.
    fn write_sectors(&self, start_sector: u32, data: &[u8]) -> Result<(), ErrorFor<T>> {
        for (offset, block) in data.chunks(BLOCK_SIZE).enumerate() {
            let sector = start_sector + offset as u32;
            self.write_data(tokens::WRITE_MULTIPLE, block)
                .map_err(|err| match err {
                    Error::WriteRejected { token, .. } => Error::WriteRejected { sector, token },
                    err => err,
                })?;

            trace!("Sector {} written", sector);
        }

        Ok(())
    }

    /// Write data.
    fn write_data(&self, token: u8, data: &[u8]) -> Result<(), ErrorFor<T>> {
        let mut crc = Crc16::new();

        self.send(token)?;
        for &byte in data {
            self.send(byte)?;
            crc.update(byte);
        }
        self.send_slice(&crc.to_be_bytes())?;

        let response = DataResponse(self.receive()?);
        if !response.is_accepted() {
            error!("SD data rejected, token: {:#x}", response.0);
            return Err(Error::WriteRejected {
                sector: 0,
                token: response.0,
            });
        }

        self.wait_not_busy()
    }

    /// Close a write session.
    fn stop_transmission(&self) -> Result<(), ErrorFor<T>> {
        self.send(tokens::STOP_TRAN)?;
        self.skip_byte()?;
        self.wait_not_busy()
    }
}
