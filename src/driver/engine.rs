//! The task that owns all driver state.
//!
//! Requests from the [`Driver`](super::Driver) handle, values reported by the
//! board, and throttle timer expiries all arrive as [`Message`]s on a single
//! channel and are handled one at a time.
use super::DriverError;
use crate::hardware::{Board, HardwareError, QueryCallback, ValueCallback};
use crate::item::{is_built_in, ItemKind, Registration, Registry, READY};
use crate::notify::{ItemValue, Listener, Notifier};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

pub(crate) enum Message {
    Start,
    Stop {
        respond_to: Option<oneshot::Sender<()>>,
    },
    Register {
        name: String,
        kind: ItemKind,
    },
    Write {
        name: String,
        value: i32,
        respond_to: oneshot::Sender<Result<(), DriverError>>,
    },
    Read {
        name: String,
        respond_to: oneshot::Sender<Result<Option<i32>, DriverError>>,
    },
    Subscribe {
        listener: Listener,
    },
    BoardReady,
    BoardFailed(HardwareError),
    Value {
        name: String,
        value: i32,
    },
    WindowExpired {
        name: String,
    },
}

/// Turns board reports into [`Message::Value`]s for a given item.
#[derive(Clone)]
pub struct UpdateSink {
    tx: mpsc::UnboundedSender<Message>,
}

impl UpdateSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { tx }
    }

    fn send(tx: &mpsc::UnboundedSender<Message>, name: &str, value: i32) {
        let message = Message::Value { name: name.to_string(), value };
        if tx.send(message).is_err() {
            tracing::trace!("Driver stopped; dropping value for {}", name);
        }
    }

    pub fn value_callback(&self, name: &str) -> ValueCallback {
        let tx = self.tx.clone();
        let name = name.to_string();
        Arc::new(move |value| Self::send(&tx, &name, value))
    }

    pub fn query_callback(&self, name: &str) -> QueryCallback {
        let tx = self.tx.clone();
        let name = name.to_string();
        Box::new(move |value| Self::send(&tx, &name, value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Opening,
    Ready,
}

pub(crate) struct Engine {
    board: Arc<dyn Board>,
    registry: Registry,
    notifier: Notifier,
    sampling_interval: Duration,
    tx: mpsc::UnboundedSender<Message>,
    lifecycle: Lifecycle,
    opening: Option<JoinHandle<()>>,
}

impl Engine {
    pub(crate) fn new(
        board: Arc<dyn Board>,
        sampling_interval: Duration,
        tx: mpsc::UnboundedSender<Message>,
    ) -> Self {
        Self {
            board,
            registry: Registry::new(),
            notifier: Notifier::new(),
            sampling_interval,
            tx,
            lifecycle: Lifecycle::Idle,
            opening: None,
        }
    }

    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Message>) {
        while let Some(message) = rx.recv().await {
            if self.handle(message).await.is_break() {
                break;
            }
        }
        tracing::debug!("Driver engine exited");
    }

    async fn handle(&mut self, message: Message) -> ControlFlow<()> {
        match message {
            Message::Start => self.start(),
            Message::Stop { respond_to } => {
                self.stop().await;
                if let Some(respond_to) = respond_to {
                    let _ = respond_to.send(());
                }
                return ControlFlow::Break(());
            }
            Message::Register { name, kind } => self.register(&name, kind),
            Message::Write { name, value, respond_to } => {
                let _ = respond_to.send(self.write_item(&name, value));
            }
            Message::Read { name, respond_to } => {
                let result = self
                    .registry
                    .get(&name)
                    .map(|item| item.value())
                    .ok_or(DriverError::UnknownItem(name));
                let _ = respond_to.send(result);
            }
            Message::Subscribe { listener } => self.notifier.subscribe(listener),
            Message::BoardReady => self.on_board_ready(),
            Message::BoardFailed(e) => {
                tracing::error!("Board failed to open: {}", e);
                self.opening = None;
                self.lifecycle = Lifecycle::Idle;
            }
            Message::Value { name, value } => self.update_item(&name, value),
            Message::WindowExpired { name } => self.on_window_expired(&name),
        }
        ControlFlow::Continue(())
    }

    fn sink(&self) -> UpdateSink {
        UpdateSink::new(self.tx.clone())
    }

    fn start(&mut self) {
        if self.lifecycle != Lifecycle::Idle {
            tracing::warn!("Driver already started; ignoring start");
            return;
        }
        tracing::info!("started");
        self.lifecycle = Lifecycle::Opening;
        let board = self.board.clone();
        let tx = self.tx.clone();
        self.opening = Some(tokio::spawn(async move {
            let message = match board.open().await {
                Ok(()) => Message::BoardReady,
                Err(e) => Message::BoardFailed(e),
            };
            let _ = tx.send(message);
        }));
    }

    async fn stop(&mut self) {
        tracing::info!("driver stop requested");
        if let Some(opening) = self.opening.take() {
            opening.abort();
        }
        let cancelled = self.registry.cancel_pending_updates();
        if cancelled > 0 {
            tracing::debug!("Cancelled {} pending item updates", cancelled);
        }
        if let Err(e) = self.board.close().await {
            tracing::warn!("Board close failed: {}", e);
        }
    }

    fn register(&mut self, name: &str, kind: ItemKind) {
        match self.registry.register(name, kind) {
            Registration::Duplicate => {
                tracing::debug!("Item {} already registered; keeping the first", name);
            }
            Registration::New => {
                tracing::debug!("Registered item: {}", name);
                if self.lifecycle == Lifecycle::Ready {
                    self.start_item(name);
                    if name == READY {
                        self.update_item(READY, 1);
                    }
                }
            }
        }
    }

    fn write_item(&mut self, name: &str, value: i32) -> Result<(), DriverError> {
        let item = self
            .registry
            .get(name)
            .ok_or_else(|| DriverError::UnknownItem(name.to_string()))?;
        let kind = item.kind();
        if !kind.is_writable() {
            return Err(DriverError::ReadOnly(name.to_string()));
        }
        if self.lifecycle != Lifecycle::Ready {
            return Err(DriverError::NotReady);
        }
        tracing::debug!("write_item {} = {}", name, value);
        if kind.write(name, value, self.board.as_ref(), &self.sink()) {
            Ok(())
        } else {
            Err(DriverError::ReadOnly(name.to_string()))
        }
    }

    fn on_board_ready(&mut self) {
        tracing::info!("board ready");
        self.opening = None;
        self.lifecycle = Lifecycle::Ready;
        self.board.set_sampling_interval(self.sampling_interval);
        // Mode items read the live pin mode, so pins get their direction first.
        let (modes, pins): (Vec<String>, Vec<String>) = self
            .registry
            .names()
            .into_iter()
            .partition(|name| {
                self.registry
                    .get(name)
                    .is_some_and(|item| item.kind().reads_pin_mode())
            });
        for name in pins.iter().chain(&modes) {
            self.start_item(name);
        }
        self.update_item(READY, 1);
    }

    fn start_item(&mut self, name: &str) {
        let Some(item) = self.registry.get_mut(name) else {
            return;
        };
        if !item.mark_started() {
            return;
        }
        let kind = item.kind();
        let sink = self.sink();
        if let Some((target, value)) = kind.start(name, self.board.as_ref(), &sink) {
            if self.registry.contains(&target) {
                self.update_item(&target, value);
            }
        }
    }

    /// Record a reported value and emit it unless the item's throttle window
    /// is open.
    pub(crate) fn update_item(&mut self, name: &str, value: i32) {
        let Some(item) = self.registry.get_mut(name) else {
            if !is_built_in(name) {
                tracing::error!("update_item program error - item not found: {}", name);
            }
            return;
        };
        item.record(value);
        let Some(emitted) = item.throttle.offer(value) else {
            return;
        };
        item.pending_update = Some(spawn_window_timer(
            self.tx.clone(),
            self.sampling_interval,
            name,
        ));
        tracing::debug!("update_item {} = {}", name, emitted);
        self.notifier.emit(&ItemValue::new(name, emitted));
    }

    fn on_window_expired(&mut self, name: &str) {
        let Some(item) = self.registry.get_mut(name) else {
            return;
        };
        item.pending_update = None;
        let Some(current) = item.value() else {
            item.throttle.cancel();
            return;
        };
        if let Some(value) = item.throttle.expire(current) {
            self.update_item(name, value);
        }
    }
}

fn spawn_window_timer(
    tx: mpsc::UnboundedSender<Message>,
    interval: Duration,
    name: &str,
) -> JoinHandle<()> {
    let name = name.to_string();
    tokio::spawn(async move {
        tokio::time::sleep(interval).await;
        let _ = tx.send(Message::WindowExpired { name });
    })
}
