// src/hardware/mod.rs - Board capability trait shared by the serial and simulated boards
pub mod firmata;
pub mod serial;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("Serial port error: {0}")]
    Serial(#[from] std::io::Error),
    #[error("No serial port available")]
    NoPortAvailable,
    #[error("Timeout waiting for board to report ready")]
    ReadyTimeout,
    #[error("Board connection closed")]
    Closed,
}

/// Called every time the board reports a new value for a polled pin.
pub type ValueCallback = Arc<dyn Fn(i32) + Send + Sync>;

/// Called once with the answer to a single query.
pub type QueryCallback = Box<dyn FnOnce(i32) + Send>;

/// Firmata pin modes, encoded with the protocol's numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinMode {
    Input,
    Output,
    Analog,
    Pwm,
    Servo,
    Shift,
    I2c,
    OneWire,
    Stepper,
    Ignore,
    Unknown,
}

impl PinMode {
    pub fn code(self) -> u8 {
        match self {
            PinMode::Input => 0x00,
            PinMode::Output => 0x01,
            PinMode::Analog => 0x02,
            PinMode::Pwm => 0x03,
            PinMode::Servo => 0x04,
            PinMode::Shift => 0x05,
            PinMode::I2c => 0x06,
            PinMode::OneWire => 0x07,
            PinMode::Stepper => 0x08,
            PinMode::Ignore => 0x7F,
            PinMode::Unknown => 0x10,
        }
    }

    pub fn from_code(code: u8) -> PinMode {
        match code {
            0x00 => PinMode::Input,
            0x01 => PinMode::Output,
            0x02 => PinMode::Analog,
            0x03 => PinMode::Pwm,
            0x04 => PinMode::Servo,
            0x05 => PinMode::Shift,
            0x06 => PinMode::I2c,
            0x07 => PinMode::OneWire,
            0x08 => PinMode::Stepper,
            0x7F => PinMode::Ignore,
            _ => PinMode::Unknown,
        }
    }
}

/// Raw pin I/O and readiness for a single board.
///
/// Everything except `open` and `close` is fire-and-forget: values come back
/// through the supplied callbacks, possibly long after the call returned.
/// Implementations must never invoke a callback from inside the call that
/// registered it.
#[async_trait]
pub trait Board: Send + Sync {
    /// Resolves once the board is ready to accept pin commands.
    async fn open(&self) -> Result<(), HardwareError>;
    async fn close(&self) -> Result<(), HardwareError>;

    fn set_sampling_interval(&self, interval: Duration);
    fn pin_mode(&self, pin: u8, mode: PinMode);
    /// Current direction of `pin` as last known by the board.
    fn pin_mode_of(&self, pin: u8) -> PinMode;
    fn digital_write(&self, pin: u8, value: i32);
    fn digital_read(&self, pin: u8, callback: ValueCallback);
    fn analog_read(&self, pin: u8, callback: ValueCallback);
    fn query_pin_state(&self, pin: u8, callback: QueryCallback);
}
