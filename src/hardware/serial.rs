// src/hardware/serial.rs - Firmata board over a serial port
use super::firmata::{self, Decoder, FirmataMessage, FIRST_ANALOG_PIN, PORT_WIDTH};
use super::{Board, HardwareError, PinMode, QueryCallback, ValueCallback};
use async_trait::async_trait;
use serial2_tokio::SerialPort;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const READY_TIMEOUT: Duration = Duration::from_secs(10);
const READ_BUFFER_SIZE: usize = 1024;

/// Board state shared between the caller side and the reader task.
#[derive(Default)]
struct BoardState {
    modes: HashMap<u8, PinMode>,
    /// Output levels per digital port, one bit per pin.
    port_levels: HashMap<u8, u8>,
    /// Last reported level of each digital input pin.
    input_levels: HashMap<u8, i32>,
    digital_callbacks: HashMap<u8, ValueCallback>,
    analog_callbacks: HashMap<u8, ValueCallback>,
    state_queries: HashMap<u8, VecDeque<QueryCallback>>,
    ready_tx: Option<oneshot::Sender<()>>,
}

impl BoardState {
    /// Forget every callback and unanswered query; returns how many queries
    /// were still waiting.
    fn clear_pending(&mut self) -> usize {
        let unanswered = self.state_queries.values().map(VecDeque::len).sum();
        self.digital_callbacks.clear();
        self.analog_callbacks.clear();
        self.state_queries.clear();
        self.input_levels.clear();
        self.ready_tx = None;
        unanswered
    }
}

struct Link {
    command_tx: mpsc::UnboundedSender<Vec<u8>>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// A board running StandardFirmata, reached through a serial port.
pub struct FirmataBoard {
    port_name: Option<String>,
    baud: u32,
    state: Arc<Mutex<BoardState>>,
    link: Mutex<Option<Link>>,
}

impl FirmataBoard {
    /// With no `port_name` the first available serial port is used.
    pub fn new(port_name: Option<String>, baud: u32) -> Self {
        Self {
            port_name,
            baud,
            state: Arc::new(Mutex::new(BoardState::default())),
            link: Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, BoardState> {
        lock(&self.state)
    }

    fn send(&self, bytes: Vec<u8>) {
        let link = self.link.lock().unwrap_or_else(PoisonError::into_inner);
        match link.as_ref() {
            Some(link) => {
                if link.command_tx.send(bytes).is_err() {
                    tracing::error!("Serial writer task has stopped; command dropped");
                }
            }
            None => tracing::warn!("Board not open; command dropped"),
        }
    }

    fn resolve_port(&self) -> Result<String, HardwareError> {
        if let Some(name) = &self.port_name {
            return Ok(name.clone());
        }
        let ports = SerialPort::available_ports()?;
        let first = ports.first().ok_or(HardwareError::NoPortAvailable)?;
        tracing::info!("No port configured, using {}", first.display());
        Ok(first.display().to_string())
    }
}

fn lock(state: &Mutex<BoardState>) -> MutexGuard<'_, BoardState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn write_all(port: &SerialPort, mut bytes: &[u8]) -> std::io::Result<()> {
    while !bytes.is_empty() {
        let n = port.write(bytes).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::WriteZero.into());
        }
        bytes = &bytes[n..];
    }
    Ok(())
}

/// Route a decoded report to whichever callbacks are waiting for it.
/// Callbacks are invoked after the state lock is released.
fn dispatch(state: &Mutex<BoardState>, message: FirmataMessage) {
    match message {
        FirmataMessage::Digital { port, value } => {
            let mut fired = Vec::new();
            {
                let mut state = lock(state);
                for bit in 0..PORT_WIDTH {
                    let pin = port * PORT_WIDTH + bit;
                    if state.modes.get(&pin) != Some(&PinMode::Input) {
                        continue;
                    }
                    let level = i32::from((value >> bit) & 0x01);
                    if state.input_levels.insert(pin, level) == Some(level) {
                        continue;
                    }
                    if let Some(callback) = state.digital_callbacks.get(&pin) {
                        fired.push((callback.clone(), level));
                    }
                }
            }
            for (callback, level) in fired {
                callback(level);
            }
        }
        FirmataMessage::Analog { channel, value } => {
            let callback = lock(state).analog_callbacks.get(&channel).cloned();
            if let Some(callback) = callback {
                callback(i32::from(value));
            }
        }
        FirmataMessage::PinState { pin, mode, state: pin_state } => {
            let callback = {
                let mut state = lock(state);
                state.modes.insert(pin, mode);
                state.state_queries.get_mut(&pin).and_then(VecDeque::pop_front)
            };
            match callback {
                Some(callback) => callback(pin_state),
                None => tracing::debug!("Unsolicited pin state for pin {}", pin),
            }
        }
        FirmataMessage::Version { major, minor } => {
            tracing::info!("Firmata protocol version {}.{}", major, minor);
            if let Some(ready_tx) = lock(state).ready_tx.take() {
                let _ = ready_tx.send(());
            }
        }
        FirmataMessage::Firmware { major, minor, name } => {
            tracing::info!("Firmware {} {}.{}", name, major, minor);
            if let Some(ready_tx) = lock(state).ready_tx.take() {
                let _ = ready_tx.send(());
            }
        }
    }
}

#[async_trait]
impl Board for FirmataBoard {
    async fn open(&self) -> Result<(), HardwareError> {
        let path = self.resolve_port()?;
        tracing::info!("Connecting to board: {} at {} baud", path, self.baud);
        let port = Arc::new(SerialPort::open(&path, self.baud)?);

        let (ready_tx, ready_rx) = oneshot::channel();
        self.state().ready_tx = Some(ready_tx);

        let read_port = port.clone();
        let state = self.state.clone();
        let reader = tokio::spawn(async move {
            let mut decoder = Decoder::new();
            let mut buffer = vec![0u8; READ_BUFFER_SIZE];
            loop {
                match read_port.read(&mut buffer).await {
                    Ok(0) => {
                        tracing::info!("Serial connection closed by remote");
                        break;
                    }
                    Ok(n) => {
                        tracing::trace!("Read {} bytes from serial", n);
                        for message in decoder.feed(&buffer[..n]) {
                            dispatch(&state, message);
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                    Err(e) => {
                        tracing::error!("Serial read error: {}", e);
                        break;
                    }
                }
            }
        });

        let (command_tx, mut command_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let writer = tokio::spawn(async move {
            while let Some(bytes) = command_rx.recv().await {
                tracing::trace!("Serial TX: {:02x?}", bytes);
                if let Err(e) = write_all(&port, &bytes).await {
                    tracing::error!("Serial write error: {}", e);
                    break;
                }
            }
            tracing::debug!("Serial writer task terminated");
        });

        *self.link.lock().unwrap_or_else(PoisonError::into_inner) = Some(Link {
            command_tx,
            reader,
            writer,
        });

        self.send(firmata::version_query());
        self.send(firmata::firmware_query());

        match timeout(READY_TIMEOUT, ready_rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(HardwareError::Closed),
            Err(_) => Err(HardwareError::ReadyTimeout),
        }
    }

    async fn close(&self) -> Result<(), HardwareError> {
        let link = self.link.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(link) = link {
            link.reader.abort();
            // Dropping the sender lets the writer drain queued commands and exit.
            drop(link.command_tx);
            if link.writer.await.is_err() {
                tracing::warn!("Serial writer task ended abnormally");
            }
        }
        let unanswered = self.state().clear_pending();
        if unanswered > 0 {
            tracing::debug!("Dropped {} unanswered pin state queries", unanswered);
        }
        tracing::info!("Board connection closed");
        Ok(())
    }

    fn set_sampling_interval(&self, interval: Duration) {
        self.send(firmata::sampling_interval(interval.as_millis() as u64));
    }

    fn pin_mode(&self, pin: u8, mode: PinMode) {
        self.state().modes.insert(pin, mode);
        self.send(firmata::set_pin_mode(pin, mode));
    }

    fn pin_mode_of(&self, pin: u8) -> PinMode {
        self.state().modes.get(&pin).copied().unwrap_or(PinMode::Unknown)
    }

    fn digital_write(&self, pin: u8, value: i32) {
        let port = pin / PORT_WIDTH;
        let mask = 1u8 << (pin % PORT_WIDTH);
        let levels = {
            let mut state = self.state();
            let levels = state.port_levels.entry(port).or_insert(0);
            if value != 0 {
                *levels |= mask;
            } else {
                *levels &= !mask;
            }
            *levels
        };
        self.send(firmata::digital_port(port, levels));
    }

    fn digital_read(&self, pin: u8, callback: ValueCallback) {
        self.state().digital_callbacks.insert(pin, callback);
        self.send(firmata::report_digital(pin / PORT_WIDTH, true));
    }

    fn analog_read(&self, pin: u8, callback: ValueCallback) {
        self.state().analog_callbacks.insert(pin, callback);
        self.send(firmata::set_pin_mode(FIRST_ANALOG_PIN + pin, PinMode::Analog));
        self.send(firmata::report_analog(pin, true));
    }

    fn query_pin_state(&self, pin: u8, callback: QueryCallback) {
        self.state()
            .state_queries
            .entry(pin)
            .or_default()
            .push_back(callback);
        self.send(firmata::pin_state_query(pin));
    }
}

impl std::fmt::Debug for FirmataBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirmataBoard")
            .field("port_name", &self.port_name)
            .field("baud", &self.baud)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn recorder() -> (Arc<AtomicI32>, ValueCallback) {
        let seen = Arc::new(AtomicI32::new(-1));
        let sink = seen.clone();
        (seen, Arc::new(move |v| sink.store(v, Ordering::SeqCst)))
    }

    #[test]
    fn test_digital_report_fires_only_on_change_for_inputs() {
        let state = Mutex::new(BoardState::default());
        let (seen, callback) = recorder();
        let (output_seen, output_callback) = recorder();
        {
            let mut s = lock(&state);
            s.modes.insert(10, PinMode::Input);
            s.modes.insert(11, PinMode::Output);
            s.digital_callbacks.insert(10, callback);
            s.digital_callbacks.insert(11, output_callback);
        }
        // Pin 10 is bit 2 of port 1.
        dispatch(&state, FirmataMessage::Digital { port: 1, value: 0b1100 });
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(output_seen.load(Ordering::SeqCst), -1);

        seen.store(-1, Ordering::SeqCst);
        dispatch(&state, FirmataMessage::Digital { port: 1, value: 0b0100 });
        assert_eq!(seen.load(Ordering::SeqCst), -1);
    }

    #[test]
    fn test_pin_state_answers_oldest_query() {
        let state = Mutex::new(BoardState::default());
        let answer = Arc::new(AtomicI32::new(-1));
        let sink = answer.clone();
        lock(&state)
            .state_queries
            .entry(5)
            .or_default()
            .push_back(Box::new(move |v| sink.store(v, Ordering::SeqCst)));
        dispatch(&state, FirmataMessage::PinState { pin: 5, mode: PinMode::Output, state: 1 });
        assert_eq!(answer.load(Ordering::SeqCst), 1);
        assert_eq!(lock(&state).modes.get(&5), Some(&PinMode::Output));
        assert!(lock(&state).state_queries[&5].is_empty());
    }

    #[tokio::test]
    async fn test_close_forgets_callbacks_and_queries() {
        let board = FirmataBoard::new(Some("/dev/null-board".to_string()), 57600);
        let (_, callback) = recorder();
        {
            let mut state = board.state();
            state.digital_callbacks.insert(3, callback.clone());
            state.analog_callbacks.insert(0, callback);
            state.state_queries.entry(5).or_default().push_back(Box::new(|_| {}));
            state.state_queries.entry(5).or_default().push_back(Box::new(|_| {}));
        }
        board.close().await.unwrap();
        let state = board.state();
        assert!(state.digital_callbacks.is_empty());
        assert!(state.analog_callbacks.is_empty());
        assert!(state.state_queries.is_empty());
    }

    #[test]
    fn test_version_report_signals_ready() {
        let state = Mutex::new(BoardState::default());
        let (ready_tx, mut ready_rx) = oneshot::channel();
        lock(&state).ready_tx = Some(ready_tx);
        dispatch(&state, FirmataMessage::Version { major: 2, minor: 5 });
        assert!(ready_rx.try_recv().is_ok());
    }
}
