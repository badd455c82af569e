// src/item/registry.rs - Registered items and their per-item runtime state
use super::{ItemKind, ItemMode, ItemType};
use crate::notify::Throttle;
use std::collections::BTreeMap;
use tokio::task::JoinHandle;

/// A registered item.
#[derive(Debug)]
pub struct Item {
    kind: ItemKind,
    value: Option<i32>,
    started: bool,
    pub(crate) throttle: Throttle,
    /// Timer closing the open throttle window, if any.
    pub(crate) pending_update: Option<JoinHandle<()>>,
}

impl Item {
    pub fn new(kind: ItemKind) -> Self {
        Self {
            kind,
            value: kind.initial_value(),
            started: false,
            throttle: Throttle::default(),
            pending_update: None,
        }
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn item_type(&self) -> ItemType {
        self.kind.item_type()
    }

    pub fn mode(&self) -> ItemMode {
        self.kind.mode()
    }

    pub fn pin(&self) -> Option<u8> {
        self.kind.pin()
    }

    pub fn value(&self) -> Option<i32> {
        self.value
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub(crate) fn record(&mut self, value: i32) {
        self.value = Some(value);
    }

    /// Returns false if the item was already started.
    pub(crate) fn mark_started(&mut self) -> bool {
        !std::mem::replace(&mut self.started, true)
    }

    /// Abort the window timer; returns whether one was pending.
    pub(crate) fn cancel_pending_update(&mut self) -> bool {
        self.throttle.cancel();
        match self.pending_update.take() {
            Some(timer) => {
                timer.abort();
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    New,
    /// The name was already taken; the existing item is kept.
    Duplicate,
}

/// Items by name. The first registration of a name wins.
#[derive(Debug, Default)]
pub struct Registry {
    items: BTreeMap<String, Item>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, kind: ItemKind) -> Registration {
        if self.items.contains_key(name) {
            return Registration::Duplicate;
        }
        self.items.insert(name.to_string(), Item::new(kind));
        Registration::New
    }

    pub fn get(&self, name: &str) -> Option<&Item> {
        self.items.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Item> {
        self.items.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.items.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Abort every open throttle window; returns how many timers were pending.
    pub fn cancel_pending_updates(&mut self) -> usize {
        self.items
            .values_mut()
            .filter_map(|item| item.cancel_pending_update().then_some(()))
            .count()
    }
}
