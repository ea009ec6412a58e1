//! Simulated SD card and scripted bus for driver tests.

use crate::{
    crc16, tokens, ChipSelect, CidData, Command, CommandFrame, Transport, BLOCK_SIZE, FRAME_SIZE,
};

use core::convert::Infallible;
use std::collections::VecDeque;

/// Bus that replays a fixed list of bytes, then answers 0xFF.
pub struct Scripted {
    replies: VecDeque<u8>,
    pub sent: Vec<u8>,
    pub cs_log: Vec<ChipSelect>,
}

impl Scripted {
    pub fn new(replies: Vec<u8>) -> Self {
        Scripted {
            replies: replies.into(),
            sent: Vec::new(),
            cs_log: Vec::new(),
        }
    }

    pub fn transfers(&self) -> usize {
        self.sent.len()
    }
}

impl Transport for Scripted {
    type Error = Infallible;

    fn configure_clock(&mut self, _divisor: u32) -> Result<(), Infallible> {
        Ok(())
    }

    fn set_chip_select(&mut self, mode: ChipSelect) -> Result<(), Infallible> {
        self.cs_log.push(mode);
        Ok(())
    }

    fn transfer(&mut self, byte: u8) -> Result<u8, Infallible> {
        self.sent.push(byte);
        Ok(self.replies.pop_front().unwrap_or(tokens::DUMMY))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimCommand {
    pub command: Command,
    pub argument: u32,
    pub crc: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimBlock {
    pub token: u8,
    pub data: Vec<u8>,
    pub crc: [u8; 2],
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    ChipSelect(ChipSelect),
    Command(SimCommand),
    Block(SimBlock),
    StopToken,
}

#[derive(Debug)]
pub enum SimState {
    Idle,
    Frame(Vec<u8>),
    /// Write session open, waiting for a start or stop token.
    Receive,
    /// Data block plus CRC trailer being received.
    Block(Vec<u8>),
}

/// SD card in SPI mode, answering the commands the boot driver uses.
///
/// Fields above `divisor` shape the card's answers; the rest record what the host did.
pub struct SimCard {
    /// Never drive the bus.
    pub absent: bool,
    /// 0xFF bytes before each R1.
    pub response_delay: usize,
    pub go_idle_r1: u8,
    pub if_cond_r1: u8,
    pub if_cond_payload: [u8; 4],
    /// ACMD41 rounds answered with the idle flag before the card is ready.
    pub idle_rounds: usize,
    /// ACMD41 answer once `idle_rounds` are used up.
    pub op_cond_r1: u8,
    pub ocr: [u8; 4],
    pub set_block_len_r1: u8,
    pub set_block_count_r1: u8,
    pub write_multiple_r1: u8,
    pub send_cid_r1: u8,
    pub cid: CidData,
    pub cid_crc: [u8; 2],
    /// Index within a session of the block to reject.
    pub reject_block: Option<usize>,
    /// Busy tokens after each accepted block and after the stop token.
    pub busy_bytes: usize,

    pub divisor: Option<u32>,
    pub cs: ChipSelect,
    pub cs_log: Vec<ChipSelect>,
    pub events: Vec<SimEvent>,
    pub commands: Vec<SimCommand>,
    pub violations: Vec<String>,
    pub transfers: usize,
    pub bytes_before_first_select: usize,
    pub op_cond_count: usize,
    pub blocks_received: usize,
    pub out: VecDeque<u8>,
    pub state: SimState,
}

impl Default for SimCard {
    fn default() -> Self {
        SimCard {
            absent: false,
            response_delay: 1,
            go_idle_r1: 0x01,
            if_cond_r1: 0x01,
            if_cond_payload: [0x00, 0x00, 0x01, 0xAA],
            idle_rounds: 0,
            op_cond_r1: 0x00,
            ocr: [0xC0, 0xFF, 0x80, 0x00],
            set_block_len_r1: 0x00,
            set_block_count_r1: 0x00,
            write_multiple_r1: 0x00,
            send_cid_r1: 0x00,
            cid: CidData::default(),
            cid_crc: [0x00; 2],
            reject_block: None,
            busy_bytes: 0,
            divisor: None,
            cs: ChipSelect::Auto,
            cs_log: Vec::new(),
            events: Vec::new(),
            commands: Vec::new(),
            violations: Vec::new(),
            transfers: 0,
            bytes_before_first_select: 0,
            op_cond_count: 0,
            blocks_received: 0,
            out: VecDeque::new(),
            state: SimState::Idle,
        }
    }
}

impl SimCard {
    pub const ACCEPT_TOKEN: u8 = 0xE5;
    pub const CRC_REJECT_TOKEN: u8 = 0xEB;
    pub const REJECT_TOKEN: u8 = 0xED;

    /// `(address, block count)` of every write session opened.
    pub fn write_sessions(&self) -> Vec<(u32, u32)> {
        let mut count = None;
        let mut sessions = Vec::new();
        for c in &self.commands {
            match c.command {
                Command::SetBlockCount => count = Some(c.argument),
                Command::WriteMultipleBlock => {
                    sessions.push((c.argument, count.take().unwrap_or(0)))
                }
                _ => {}
            }
        }
        sessions
    }

    fn busy(&mut self) {
        self.out
            .extend(std::iter::repeat(tokens::BUSY).take(self.busy_bytes));
    }

    fn consume(&mut self, byte: u8) {
        let state = std::mem::replace(&mut self.state, SimState::Idle);

        self.state = match state {
            SimState::Idle if byte & 0xC0 == 0x40 => SimState::Frame(vec![byte]),
            SimState::Idle => SimState::Idle,
            SimState::Frame(mut frame) => {
                frame.push(byte);
                if frame.len() == FRAME_SIZE {
                    self.command(&frame)
                } else {
                    SimState::Frame(frame)
                }
            }
            SimState::Receive => match byte {
                tokens::WRITE_MULTIPLE => SimState::Block(Vec::with_capacity(BLOCK_SIZE + 2)),
                tokens::STOP_TRAN => {
                    self.events.push(SimEvent::StopToken);
                    self.out.push_back(tokens::DUMMY);
                    self.busy();
                    SimState::Idle
                }
                tokens::DUMMY => SimState::Receive,
                other => {
                    self.violations
                        .push(format!("unexpected byte {:#x} in write session", other));
                    SimState::Receive
                }
            },
            SimState::Block(mut data) => {
                data.push(byte);
                if data.len() == BLOCK_SIZE + 2 {
                    self.block(&data);
                    SimState::Receive
                } else {
                    SimState::Block(data)
                }
            }
        };
    }

    fn command(&mut self, frame: &[u8]) -> SimState {
        let mut bytes = [0u8; FRAME_SIZE];
        bytes.copy_from_slice(frame);

        let Some(decoded) = CommandFrame::decode(&bytes) else {
            self.violations
                .push(format!("unknown command byte {:#x}", bytes[0]));
            self.out.push_back(0x05);
            return SimState::Idle;
        };

        if CommandFrame::new(decoded.command, decoded.argument).crc != decoded.crc {
            self.violations
                .push(format!("bad CRC on {:?}", decoded.command));
        }
        if decoded.command.is_app()
            && self.commands.last().map(|c| c.command) != Some(Command::AppCmd)
        {
            self.violations
                .push(format!("{:?} without APP_CMD", decoded.command));
        }

        let command = SimCommand {
            command: decoded.command,
            argument: decoded.argument,
            crc: decoded.crc,
        };
        self.commands.push(command.clone());
        self.events.push(SimEvent::Command(command));

        self.out
            .extend(std::iter::repeat(tokens::DUMMY).take(self.response_delay));

        let ready = self.op_cond_count >= self.idle_rounds;
        let mut next = SimState::Idle;
        match decoded.command {
            Command::GoIdleState => self.out.push_back(self.go_idle_r1),
            Command::SendIfCond => {
                self.out.push_back(self.if_cond_r1);
                if self.if_cond_r1 == 0x01 {
                    self.out.extend(self.if_cond_payload);
                }
            }
            Command::AppCmd => self.out.push_back(if ready { 0x00 } else { 0x01 }),
            Command::SdSendOpCond => {
                self.op_cond_count += 1;
                self.out
                    .push_back(if ready { self.op_cond_r1 } else { 0x01 });
            }
            Command::ReadOcr => {
                self.out.push_back(0x00);
                self.out.extend(self.ocr);
            }
            Command::SetBlockLen => self.out.push_back(self.set_block_len_r1),
            Command::SetBlockCount => self.out.push_back(self.set_block_count_r1),
            Command::WriteMultipleBlock => {
                self.out.push_back(self.write_multiple_r1);
                if self.write_multiple_r1 == 0x00 {
                    self.blocks_received = 0;
                    next = SimState::Receive;
                }
            }
            Command::SendCid => {
                self.out.push_back(self.send_cid_r1);
                if self.send_cid_r1 == 0x00 {
                    self.out.extend([tokens::DUMMY, tokens::DUMMY]);
                    self.out.push_back(tokens::DATA_START_BLOCK);
                    self.out.extend(self.cid);
                    self.out.extend(self.cid_crc);
                }
            }
        }
        next
    }

    fn block(&mut self, data: &[u8]) {
        let (payload, trailer) = data.split_at(BLOCK_SIZE);
        let crc = [trailer[0], trailer[1]];
        let index = self.blocks_received;
        self.blocks_received += 1;

        self.events.push(SimEvent::Block(SimBlock {
            token: tokens::WRITE_MULTIPLE,
            data: payload.to_vec(),
            crc,
        }));

        if crc16(payload).to_be_bytes() != crc {
            self.out.push_back(Self::CRC_REJECT_TOKEN);
        } else if self.reject_block == Some(index) {
            self.out.push_back(Self::REJECT_TOKEN);
        } else {
            self.out.push_back(Self::ACCEPT_TOKEN);
            self.busy();
        }
    }
}

impl Transport for SimCard {
    type Error = Infallible;

    fn configure_clock(&mut self, divisor: u32) -> Result<(), Infallible> {
        if self.divisor.is_some() {
            self.violations.push("clock configured twice".into());
        }
        self.divisor = Some(divisor);
        Ok(())
    }

    fn set_chip_select(&mut self, mode: ChipSelect) -> Result<(), Infallible> {
        self.cs_log.push(mode);
        self.events.push(SimEvent::ChipSelect(mode));

        if mode != ChipSelect::Hold {
            match self.state {
                SimState::Receive | SimState::Block(_) => {
                    self.violations.push("deselected with write session open".into())
                }
                SimState::Frame(_) => {
                    self.violations.push("deselected mid frame".into());
                    self.state = SimState::Idle;
                }
                SimState::Idle => {}
            }
            self.out.clear();
        }

        self.cs = mode;
        Ok(())
    }

    fn transfer(&mut self, byte: u8) -> Result<u8, Infallible> {
        if self.divisor.is_none() {
            self.violations.push("transfer before clock setup".into());
        }
        self.transfers += 1;
        if !self.cs_log.contains(&ChipSelect::Hold) {
            self.bytes_before_first_select += 1;
        }

        let reply = self.out.pop_front().unwrap_or(tokens::DUMMY);
        if self.cs == ChipSelect::Hold && !self.absent {
            self.consume(byte);
        }

        Ok(reply)
    }
}
