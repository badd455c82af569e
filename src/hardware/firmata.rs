//! Firmata wire format: the handful of commands the bridge sends and a
//! streaming decoder for the reports it understands.
//!
//! Every data byte carries 7 bits; values wider than that are split into
//! little-endian 7-bit chunks.
use super::PinMode;

pub const DIGITAL_MESSAGE: u8 = 0x90;
pub const ANALOG_MESSAGE: u8 = 0xE0;
pub const REPORT_ANALOG: u8 = 0xC0;
pub const REPORT_DIGITAL: u8 = 0xD0;
pub const SET_PIN_MODE: u8 = 0xF4;
pub const REPORT_VERSION: u8 = 0xF9;
pub const START_SYSEX: u8 = 0xF0;
pub const END_SYSEX: u8 = 0xF7;

pub const PIN_STATE_QUERY: u8 = 0x6D;
pub const PIN_STATE_RESPONSE: u8 = 0x6E;
pub const REPORT_FIRMWARE: u8 = 0x79;
pub const SAMPLING_INTERVAL: u8 = 0x7A;

/// Largest interval representable in two 7-bit bytes.
pub const MAX_SAMPLING_INTERVAL_MS: u16 = 0x3FFF;
pub const MIN_SAMPLING_INTERVAL_MS: u16 = 10;

/// Pins per digital port.
pub const PORT_WIDTH: u8 = 8;

/// Digital pin number of analog channel 0 on an Uno-class board.
pub const FIRST_ANALOG_PIN: u8 = 14;

/// Longest sysex frame kept while waiting for `END_SYSEX`.
pub const MAX_SYSEX_LEN: usize = 256;

/// Reports decoded from the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmataMessage {
    Digital { port: u8, value: u16 },
    Analog { channel: u8, value: u16 },
    Version { major: u8, minor: u8 },
    Firmware { major: u8, minor: u8, name: String },
    PinState { pin: u8, mode: PinMode, state: i32 },
}

pub fn set_pin_mode(pin: u8, mode: PinMode) -> Vec<u8> {
    vec![SET_PIN_MODE, pin & 0x7F, mode.code()]
}

/// `levels` holds one bit per pin of the port, pin 0 of the port in bit 0.
pub fn digital_port(port: u8, levels: u8) -> Vec<u8> {
    vec![DIGITAL_MESSAGE | (port & 0x0F), levels & 0x7F, (levels >> 7) & 0x01]
}

pub fn report_digital(port: u8, enable: bool) -> Vec<u8> {
    vec![REPORT_DIGITAL | (port & 0x0F), u8::from(enable)]
}

pub fn report_analog(channel: u8, enable: bool) -> Vec<u8> {
    vec![REPORT_ANALOG | (channel & 0x0F), u8::from(enable)]
}

pub fn sampling_interval(ms: u64) -> Vec<u8> {
    let ms = ms.clamp(MIN_SAMPLING_INTERVAL_MS as u64, MAX_SAMPLING_INTERVAL_MS as u64) as u16;
    vec![
        START_SYSEX,
        SAMPLING_INTERVAL,
        (ms & 0x7F) as u8,
        ((ms >> 7) & 0x7F) as u8,
        END_SYSEX,
    ]
}

pub fn pin_state_query(pin: u8) -> Vec<u8> {
    vec![START_SYSEX, PIN_STATE_QUERY, pin & 0x7F, END_SYSEX]
}

pub fn version_query() -> Vec<u8> {
    vec![REPORT_VERSION]
}

pub fn firmware_query() -> Vec<u8> {
    vec![START_SYSEX, REPORT_FIRMWARE, END_SYSEX]
}

/// Incremental decoder; bytes may arrive in any chunking.
#[derive(Debug, Default)]
pub struct Decoder {
    buffer: Vec<u8>,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<FirmataMessage> {
        bytes.iter().filter_map(|&b| self.push(b)).collect()
    }

    pub fn push(&mut self, byte: u8) -> Option<FirmataMessage> {
        if self.buffer.first() == Some(&START_SYSEX) {
            if byte == END_SYSEX {
                let message = parse_sysex(&self.buffer[1..]);
                self.buffer.clear();
                return message;
            }
            if byte & 0x80 == 0 {
                if self.buffer.len() >= MAX_SYSEX_LEN {
                    tracing::trace!("Dropping oversized sysex of {} bytes", self.buffer.len());
                    self.buffer.clear();
                } else {
                    self.buffer.push(byte);
                }
                return None;
            }
            // A command byte inside sysex means we lost the end marker.
            tracing::trace!("Dropping unterminated sysex of {} bytes", self.buffer.len());
            self.buffer.clear();
        }

        if byte & 0x80 != 0 {
            self.buffer.clear();
            if byte == START_SYSEX || expected_len(byte).is_some() {
                self.buffer.push(byte);
            } else {
                tracing::trace!("Skipping unsupported command byte {:#04x}", byte);
            }
            return None;
        }

        let Some(&command) = self.buffer.first() else {
            return None;
        };
        self.buffer.push(byte);
        if Some(self.buffer.len()) != expected_len(command) {
            return None;
        }
        let message = parse_fixed(&self.buffer);
        self.buffer.clear();
        message
    }
}

fn expected_len(command: u8) -> Option<usize> {
    match command & 0xF0 {
        DIGITAL_MESSAGE | ANALOG_MESSAGE => Some(3),
        _ if command == REPORT_VERSION => Some(3),
        _ => None,
    }
}

fn parse_fixed(buffer: &[u8]) -> Option<FirmataMessage> {
    let command = buffer[0];
    let value = u16::from(buffer[1]) | (u16::from(buffer[2]) << 7);
    match command & 0xF0 {
        DIGITAL_MESSAGE => Some(FirmataMessage::Digital { port: command & 0x0F, value }),
        ANALOG_MESSAGE => Some(FirmataMessage::Analog { channel: command & 0x0F, value }),
        _ => Some(FirmataMessage::Version { major: buffer[1], minor: buffer[2] }),
    }
}

fn parse_sysex(body: &[u8]) -> Option<FirmataMessage> {
    let (&command, data) = body.split_first()?;
    match command {
        PIN_STATE_RESPONSE if data.len() >= 2 => {
            let state = data[2..]
                .iter()
                .take(4)
                .enumerate()
                .fold(0i32, |acc, (i, &b)| acc | (i32::from(b) << (7 * i)));
            Some(FirmataMessage::PinState {
                pin: data[0],
                mode: PinMode::from_code(data[1]),
                state,
            })
        }
        REPORT_FIRMWARE if data.len() >= 2 => {
            let name = data[2..]
                .chunks(2)
                .map(|pair| {
                    let lsb = pair[0];
                    let msb = pair.get(1).copied().unwrap_or(0);
                    char::from(lsb | (msb << 7))
                })
                .collect();
            Some(FirmataMessage::Firmware { major: data[0], minor: data[1], name })
        }
        _ => {
            tracing::trace!("Ignoring sysex command {:#04x}", command);
            None
        }
    }
}
