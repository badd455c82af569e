//! Change notifications: the payload handed to listeners, the listener list,
//! and the per-item throttle window that keeps emissions to one per sampling
//! interval.
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Placeholder reserved for good/bad/stale semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Good,
}

impl Quality {
    pub fn code(self) -> u8 {
        match self {
            Quality::Good => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemValue {
    pub name: String,
    pub value: i32,
    pub quality: Quality,
}

impl ItemValue {
    pub fn new(name: impl Into<String>, value: i32) -> Self {
        Self { name: name.into(), value, quality: Quality::Good }
    }
}

/// Event types a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    ItemValue,
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "itemvalue" => Ok(EventKind::ItemValue),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::ItemValue => f.write_str("itemvalue"),
        }
    }
}

pub type Listener = Box<dyn Fn(&ItemValue) + Send>;

/// Fans each emission out to every listener, in subscription order.
#[derive(Default)]
pub struct Notifier {
    listeners: Vec<Listener>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    pub fn emit(&self, value: &ItemValue) {
        for listener in &self.listeners {
            listener(value);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

/// Throttle window state for one item.
///
/// A closed window lets the next value through and opens; while open, values
/// are only recorded by the item. When the window expires the latest value is
/// released again if it differs from the one last let through.
#[derive(Debug, Default, Clone)]
pub struct Throttle {
    last_emitted: Option<i32>,
    window_open: bool,
}

impl Throttle {
    /// Returns the value to emit now, or `None` while the window is open.
    pub fn offer(&mut self, value: i32) -> Option<i32> {
        if self.window_open {
            return None;
        }
        self.window_open = true;
        self.last_emitted = Some(value);
        Some(value)
    }

    /// Close the window. Returns `current` when it still has to be emitted.
    pub fn expire(&mut self, current: i32) -> Option<i32> {
        self.window_open = false;
        (self.last_emitted != Some(current)).then_some(current)
    }

    /// Close the window without re-checking.
    pub fn cancel(&mut self) {
        self.window_open = false;
    }

    pub fn is_open(&self) -> bool {
        self.window_open
    }

    pub fn last_emitted(&self) -> Option<i32> {
        self.last_emitted
    }
}
