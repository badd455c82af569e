//! Item names and the pin behavior each kind of item binds to.
//!
//! ```text
//! ready                      built-in readiness indicator
//! digital:<pin>:input        digital input, pin 0-13
//! digital:<pin>:output       digital output, pin 0-13
//! digital:<pin>:mode         current direction of a digital pin
//! analog:<pin>:input         analog input, pin 0-5
//! ```
pub mod registry;

use crate::driver::engine::UpdateSink;
use crate::hardware::{Board, PinMode};
use thiserror::Error;

pub use registry::{Item, Registration, Registry};

/// Board readiness: 0 until the board reports ready, then 1.
pub const READY: &str = "ready";
pub const BUILT_IN_ITEMS: &[&str] = &[READY];

pub const MAX_DIGITAL_PIN: u8 = 13;
pub const MAX_ANALOG_PIN: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemError {
    #[error("invalid item name: {0}")]
    InvalidName(String),
    #[error("invalid item name: {name} - pin out of range: {pin} (max {max})")]
    PinOutOfRange { name: String, pin: u8, max: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub fn pin_mode(self) -> PinMode {
        match self {
            Direction::Input => PinMode::Input,
            Direction::Output => PinMode::Output,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    Digital,
    Analog,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemMode {
    Input,
    Output,
    Undefined,
}

/// What an item is bound to on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Internal,
    Digital { pin: u8, direction: Direction },
    DigitalMode { pin: u8 },
    Analog { pin: u8 },
}

pub fn is_built_in(name: &str) -> bool {
    BUILT_IN_ITEMS.contains(&name)
}

/// Name of the pseudo-item reporting the direction of a digital pin.
pub fn mode_item_name(pin: u8) -> String {
    format!("digital:{}:mode", pin)
}

fn parse_pin(digits: &str) -> Option<u8> {
    if digits.is_empty() || digits.len() > 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn check_range(name: &str, pin: u8, max: u8) -> Result<u8, ItemError> {
    if pin > max {
        return Err(ItemError::PinOutOfRange { name: name.to_string(), pin, max });
    }
    Ok(pin)
}

/// Parse an item name into the kind of item it denotes.
pub fn parse_item_name(name: &str) -> Result<ItemKind, ItemError> {
    if is_built_in(name) {
        return Ok(ItemKind::Internal);
    }
    let invalid = || ItemError::InvalidName(name.to_string());
    let mut parts = name.split(':');
    let (Some(family), Some(pin), Some(role), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };
    let pin = parse_pin(pin).ok_or_else(invalid)?;
    match (family, role) {
        ("digital", "input") => Ok(ItemKind::Digital {
            pin: check_range(name, pin, MAX_DIGITAL_PIN)?,
            direction: Direction::Input,
        }),
        ("digital", "output") => Ok(ItemKind::Digital {
            pin: check_range(name, pin, MAX_DIGITAL_PIN)?,
            direction: Direction::Output,
        }),
        ("digital", "mode") => Ok(ItemKind::DigitalMode {
            pin: check_range(name, pin, MAX_DIGITAL_PIN)?,
        }),
        ("analog", "input") => Ok(ItemKind::Analog {
            pin: check_range(name, pin, MAX_ANALOG_PIN)?,
        }),
        _ => Err(invalid()),
    }
}

impl ItemKind {
    pub fn item_type(&self) -> ItemType {
        match self {
            ItemKind::Internal => ItemType::Internal,
            ItemKind::Digital { .. } | ItemKind::DigitalMode { .. } => ItemType::Digital,
            ItemKind::Analog { .. } => ItemType::Analog,
        }
    }

    pub fn mode(&self) -> ItemMode {
        match self {
            ItemKind::Internal | ItemKind::Analog { .. } => ItemMode::Input,
            ItemKind::Digital { direction: Direction::Input, .. } => ItemMode::Input,
            ItemKind::Digital { direction: Direction::Output, .. } => ItemMode::Output,
            ItemKind::DigitalMode { .. } => ItemMode::Undefined,
        }
    }

    pub fn pin(&self) -> Option<u8> {
        match *self {
            ItemKind::Internal => None,
            ItemKind::Digital { pin, .. } | ItemKind::DigitalMode { pin } | ItemKind::Analog { pin } => {
                Some(pin)
            }
        }
    }

    /// True for items whose start reads back another item's pin mode.
    pub fn reads_pin_mode(&self) -> bool {
        matches!(self, ItemKind::DigitalMode { .. })
    }

    pub fn is_writable(&self) -> bool {
        matches!(self, ItemKind::Digital { direction: Direction::Output, .. })
    }

    /// Value held before the first report; mode items have none.
    pub fn initial_value(&self) -> Option<i32> {
        match self {
            ItemKind::DigitalMode { .. } => None,
            _ => Some(0),
        }
    }

    /// Bind the item to the board. Returns an update the caller should apply
    /// right away, if any: digital pins announce their direction to the
    /// matching mode item, mode items report the live pin mode.
    pub fn start(&self, name: &str, board: &dyn Board, sink: &UpdateSink) -> Option<(String, i32)> {
        match *self {
            ItemKind::Internal => None,
            ItemKind::Digital { pin, direction } => {
                let mode = direction.pin_mode();
                board.pin_mode(pin, mode);
                // Output pins are not polled; writes read back through a state query.
                if direction == Direction::Input {
                    board.digital_read(pin, sink.value_callback(name));
                }
                Some((mode_item_name(pin), i32::from(mode.code())))
            }
            ItemKind::DigitalMode { pin } => {
                Some((name.to_string(), i32::from(board.pin_mode_of(pin).code())))
            }
            ItemKind::Analog { pin } => {
                board.analog_read(pin, sink.value_callback(name));
                None
            }
        }
    }

    /// Drive the pin and ask the board for its resulting state, so the stored
    /// value only ever comes from the board. Returns false when the item has
    /// no write capability.
    pub fn write(&self, name: &str, value: i32, board: &dyn Board, sink: &UpdateSink) -> bool {
        match *self {
            ItemKind::Digital { pin, direction: Direction::Output } => {
                board.digital_write(pin, value);
                board.query_pin_state(pin, sink.query_callback(name));
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_built_in() {
        assert_eq!(parse_item_name("ready"), Ok(ItemKind::Internal));
        assert_eq!(ItemKind::Internal.mode(), ItemMode::Input);
        assert_eq!(ItemKind::Internal.initial_value(), Some(0));
    }

    #[test]
    fn test_parse_digital_items() {
        for pin in 0..=MAX_DIGITAL_PIN {
            let input = parse_item_name(&format!("digital:{}:input", pin)).unwrap();
            assert_eq!(input, ItemKind::Digital { pin, direction: Direction::Input });
            assert!(!input.is_writable());

            let output = parse_item_name(&format!("digital:{}:output", pin)).unwrap();
            assert_eq!(output.mode(), ItemMode::Output);
            assert!(output.is_writable());

            let mode = parse_item_name(&format!("digital:{}:mode", pin)).unwrap();
            assert_eq!(mode, ItemKind::DigitalMode { pin });
            assert_eq!(mode.mode(), ItemMode::Undefined);
            assert_eq!(mode.initial_value(), None);
            assert!(mode.reads_pin_mode());
            assert!(!output.reads_pin_mode());
        }
        assert_eq!(
            parse_item_name("digital:07:input"),
            Ok(ItemKind::Digital { pin: 7, direction: Direction::Input })
        );
    }

    #[test]
    fn test_parse_analog_items() {
        let kind = parse_item_name("analog:5:input").unwrap();
        assert_eq!(kind, ItemKind::Analog { pin: 5 });
        assert_eq!(kind.item_type(), ItemType::Analog);
        assert_eq!(kind.pin(), Some(5));
        assert!(parse_item_name("analog:2:output").is_err());
        assert!(parse_item_name("analog:2:mode").is_err());
    }

    #[test]
    fn test_out_of_range_pins() {
        assert_eq!(
            parse_item_name("digital:14:output"),
            Err(ItemError::PinOutOfRange { name: "digital:14:output".into(), pin: 14, max: 13 })
        );
        assert!(matches!(
            parse_item_name("digital:99:mode"),
            Err(ItemError::PinOutOfRange { pin: 99, .. })
        ));
        assert!(matches!(
            parse_item_name("analog:6:input"),
            Err(ItemError::PinOutOfRange { pin: 6, max: 5, .. })
        ));
    }

    #[test]
    fn test_invalid_shapes() {
        for name in [
            "",
            "Ready",
            "digital",
            "digital:1",
            "digital:-1:input",
            "digital:100:input",
            "digital::input",
            "digital:1:input:extra",
            "digital:a:input",
            "digital:+1:input",
            "digital:1:pwm",
            "analog:1",
            "servo:3:output",
        ] {
            assert_eq!(parse_item_name(name), Err(ItemError::InvalidName(name.to_string())), "{name}");
        }
    }
}
