use crate::{
    consts::args,
    response::{IfCond, Ocr, R1Status, R3OcrPayload, R7Payload},
    CardType, ChipSelect, Command, Error, ErrorFor, R1Response, SdCardSpi, SdSpiConfig, Status,
    StatusFlag, Transport, BLOCK_SIZE,
};

impl<T: Transport, Config: SdSpiConfig> SdCardSpi<T, Config> {
    /// Clock setup and at least 74 idle clocks with the card deselected.
    fn power_on(&self) -> Result<(), ErrorFor<T>> {
        self.configure_clock(Config::CLOCK_DIVISOR)?;
        self.set_chip_select(ChipSelect::Off)?;

        for _ in 0..Self::INIT_SET_SIZE {
            self.send(Self::INIT_SET_VALUE)?;
        }

        self.set_chip_select(ChipSelect::Auto)
    }

    /// Enter SD to SPI mode.
    fn go_idle(&self) -> Result<(), ErrorFor<T>> {
        info!("CMD0");

        self.command_scope(Command::GoIdleState, 0x0000_0000, |s, r1| {
            s.expect_r1(Command::GoIdleState, r1, R1Response::IN_IDLE_STATE)
        })
        .map_err(|err| match err {
            Error::TimeoutCommand(Command::GoIdleState, _) => Error::CardNotFound,
            err => err,
        })
    }

    /// Verify SD Memory Card interface operating condition.
    fn send_if_cond(&self) -> Result<(), ErrorFor<T>> {
        info!("CMD8");

        self.command_scope(Command::SendIfCond, args::IF_COND, |s, r1| {
            s.expect_r1(Command::SendIfCond, r1, R1Response::IN_IDLE_STATE)?;

            let mut payload = R7Payload::default();
            s.receive_slice(&mut payload)?;
            let cond = IfCond::from(payload);

            if !cond.voltage_ok() {
                error!("CMD8: voltage not accepted: {:#x}", cond.voltage_accepted());
                return Err(Error::VoltageNotAccepted(cond.voltage_accepted()));
            }
            if !cond.pattern_ok() {
                error!("CMD8: check pattern mismatch: {:#x}", cond.check_pattern());
                return Err(Error::CheckPatternMismatch(cond.check_pattern()));
            }

            Ok(())
        })
    }

    /// Sends host capacity support information and activates.
    fn send_op_cond(&self) -> Result<(), ErrorFor<T>> {
        info!("ACMD41");

        for _ in 0..Config::READY_ATTEMPTS {
            let r1 = self.send_app_command(Command::SdSendOpCond, args::HCS)?;

            match r1.status() {
                R1Status::Ready => return Ok(()),
                R1Status::Idle => {}
                R1Status::Error => {
                    error!("ACMD41: unexpected response {:#x}", r1.0);
                    return Err(Error::ErrorCommand(Command::SdSendOpCond, r1.0));
                }
            }
        }

        error!("ACMD41: card never left idle state");
        Err(Error::TimeoutReady)
    }

    /// Read OCR once the card is ready.
    fn read_ocr(&self) -> Result<Ocr, ErrorFor<T>> {
        info!("CMD58");

        self.command_scope(Command::ReadOcr, 0x0000_0000, |s, r1| {
            s.expect_r1(Command::ReadOcr, r1, R1Response::READY_STATE)?;

            let mut payload = R3OcrPayload::default();
            s.receive_slice(&mut payload)?;
            let ocr = Ocr::from(payload);

            if !ocr.power_up_status() {
                error!("CMD58: power up not complete, OCR {:#x}", ocr.0);
                return Err(Error::PowerUpIncomplete(ocr.0));
            }

            Ok(ocr)
        })
    }

    /// Fix the transfer unit to one sector.
    fn set_block_len(&self) -> Result<(), ErrorFor<T>> {
        info!("CMD16");

        self.command_scope(Command::SetBlockLen, BLOCK_SIZE as u32, |s, r1| {
            s.expect_r1(Command::SetBlockLen, r1, R1Response::READY_STATE)
        })
    }

    fn init_sequence(&self) -> Result<CardType, ErrorFor<T>> {
        self.power_on()?;
        self.go_idle()?;
        self.send_if_cond()?;
        self.send_op_cond()?;

        let card_type = if self.read_ocr()?.card_capacity_status() {
            CardType::Sdhc
        } else {
            warn!("SD card is standard capacity, using byte addressing");
            CardType::Sdsc
        };

        self.set_block_len()?;

        Ok(card_type)
    }

    /// Initialize SD.
    ///
    /// Any failed step aborts the whole sequence; restart from power-on to retry.
    pub fn init(&mut self) -> Result<CardType, ErrorFor<T>> {
        info!("SD initialize started");

        let result = self.init_sequence();

        self.status = match &result {
            Ok(card_type) => {
                self.card_type = *card_type;
                info!("SD successfully initialized, type: {:?}", card_type);
                Status::default()
            }
            Err(_) => {
                error!("Failed to initialize SD");
                StatusFlag::ErrorOccured | StatusFlag::NotInitialized
            }
        };

        result
    }
}
