// src/driver/mod.rs - Public handle to a running board driver
pub mod engine;

use crate::config::DriverConfig;
use crate::hardware::serial::FirmataBoard;
use crate::hardware::Board;
use crate::item::{parse_item_name, ItemError};
use crate::notify::{EventKind, ItemValue};
use crate::simulator::SimBoard;
use engine::{Engine, Message};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::Instrument;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error(transparent)]
    InvalidItem(#[from] ItemError),
    #[error("unknown item: {0}")]
    UnknownItem(String),
    #[error("item is read-only: {0}")]
    ReadOnly(String),
    #[error("board is not ready")]
    NotReady,
    #[error("unknown event type: {0}")]
    UnknownEvent(String),
    #[error("driver has stopped")]
    Stopped,
}

/// Exposes the items of one board.
///
/// `Driver::new` spawns the engine task and therefore has to be called from
/// within a Tokio runtime. Dropping the handle without calling [`stop`]
/// leaves the engine running until the runtime shuts down.
///
/// [`stop`]: Driver::stop
pub struct Driver {
    tx: mpsc::UnboundedSender<Message>,
    engine: JoinHandle<()>,
    span: tracing::Span,
}

/// Build a driver for the board selected by `config.sim_mode`.
pub fn create(config: &DriverConfig) -> Driver {
    let board: Arc<dyn Board> = if config.sim_mode {
        Arc::new(SimBoard::new(config.port_label()))
    } else {
        Arc::new(FirmataBoard::new(config.port_name.clone(), config.baud))
    };
    Driver::new(config, board)
}

impl Driver {
    pub fn new(config: &DriverConfig, board: Arc<dyn Board>) -> Self {
        let span = tracing::info_span!("driver", port = %config.port_label());
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Engine::new(
            board,
            Duration::from_millis(config.sampling_interval),
            tx.clone(),
        );
        let engine = tokio::spawn(engine.run(rx).instrument(span.clone()));
        Self { tx, engine, span }
    }

    fn send(&self, message: Message) -> Result<(), DriverError> {
        self.tx.send(message).map_err(|_| DriverError::Stopped)
    }

    /// Open the board; items start once it reports ready. Call once.
    pub fn start(&self) {
        if self.send(Message::Start).is_err() {
            self.span.in_scope(|| tracing::warn!("start called on a stopped driver"));
        }
    }

    /// Cancel pending updates and close the board, without waiting.
    pub fn stop(&self) {
        let _ = self.send(Message::Stop { respond_to: None });
    }

    /// Stop and wait for the board to be closed.
    pub async fn shutdown(self) {
        let (respond_to, closed) = oneshot::channel();
        if self.send(Message::Stop { respond_to: Some(respond_to) }).is_ok() {
            let _ = closed.await;
        }
        let _ = self.engine.await;
    }

    /// Register an item by name. Invalid names are logged and returned as
    /// [`DriverError::InvalidItem`]; nothing is stored for them, nor for any
    /// name once the driver has stopped.
    pub fn register(&self, name: &str) -> Result<(), DriverError> {
        let _entered = self.span.enter();
        tracing::debug!("registering item: {}", name);
        let kind = parse_item_name(name).inspect_err(|e| tracing::error!("{}", e))?;
        self.send(Message::Register { name: name.to_string(), kind })
            .inspect_err(|_| tracing::warn!("driver stopped; {} not registered", name))
    }

    /// Write an output item. The stored value is updated later, from the
    /// board's read-back.
    pub async fn write_item(&self, name: &str, value: i32) -> Result<(), DriverError> {
        let (respond_to, response) = oneshot::channel();
        self.send(Message::Write { name: name.to_string(), value, respond_to })?;
        response.await.map_err(|_| DriverError::Stopped)?
    }

    /// Last known value of an item. Never touches the board. `Ok(None)` for a
    /// mode item that has not been read yet.
    pub async fn read_item(&self, name: &str) -> Result<Option<i32>, DriverError> {
        let (respond_to, response) = oneshot::channel();
        self.send(Message::Read { name: name.to_string(), respond_to })?;
        response.await.map_err(|_| DriverError::Stopped)?
    }

    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> Result<(), DriverError>
    where
        F: Fn(&ItemValue) + Send + 'static,
    {
        match kind {
            EventKind::ItemValue => self.send(Message::Subscribe { listener: Box::new(listener) }),
        }
    }

    /// String-keyed form of [`subscribe`](Driver::subscribe); the only event
    /// type is `"itemvalue"`.
    pub fn on<F>(&self, event: &str, listener: F) -> Result<(), DriverError>
    where
        F: Fn(&ItemValue) + Send + 'static,
    {
        let kind = event.parse::<EventKind>().map_err(DriverError::UnknownEvent)?;
        self.subscribe(kind, listener)
    }
}
