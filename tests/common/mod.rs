// Scripted board for driving the engine from tests
#![allow(dead_code)]

use async_trait::async_trait;
use firmata_bridge::config::DriverConfig;
use firmata_bridge::hardware::{Board, HardwareError, PinMode, QueryCallback, ValueCallback};
use firmata_bridge::{Driver, EventKind, ItemValue};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const READY_DELAY: Duration = Duration::from_millis(100);
pub const INTERVAL_MS: u64 = 1000;

/// Board whose reports are pushed by the test.
#[derive(Default)]
pub struct ScriptedBoard {
    state: Mutex<Scripted>,
}

#[derive(Default)]
struct Scripted {
    modes: HashMap<u8, PinMode>,
    digital: HashMap<u8, ValueCallback>,
    analog: HashMap<u8, ValueCallback>,
    queries: Vec<(u8, QueryCallback)>,
    calls: Vec<String>,
    closed: bool,
    failing_opens: usize,
}

impl ScriptedBoard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn log(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }

    /// Every board call made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    /// Make the next `open` fail with a hardware error.
    pub fn fail_next_open(&self) {
        self.state.lock().unwrap().failing_opens += 1;
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub fn report_digital(&self, pin: u8, value: i32) {
        let callback = self.state.lock().unwrap().digital.get(&pin).cloned();
        callback.expect("digital pin not polled")(value);
    }

    pub fn report_analog(&self, pin: u8, value: i32) {
        let callback = self.state.lock().unwrap().analog.get(&pin).cloned();
        callback.expect("analog pin not polled")(value);
    }

    /// Answer the oldest pending state query for `pin`.
    pub fn answer_query(&self, pin: u8, value: i32) {
        let callback = {
            let mut state = self.state.lock().unwrap();
            let index = state
                .queries
                .iter()
                .position(|(p, _)| *p == pin)
                .expect("no pending query for pin");
            state.queries.remove(index).1
        };
        callback(value);
    }
}

#[async_trait]
impl Board for ScriptedBoard {
    async fn open(&self) -> Result<(), HardwareError> {
        tokio::time::sleep(READY_DELAY).await;
        let mut state = self.state.lock().unwrap();
        state.calls.push("open".to_string());
        if state.failing_opens > 0 {
            state.failing_opens -= 1;
            return Err(HardwareError::NoPortAvailable);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), HardwareError> {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        state.calls.push("close".to_string());
        Ok(())
    }

    fn set_sampling_interval(&self, interval: Duration) {
        self.log(format!("sampling_interval {}", interval.as_millis()));
    }

    fn pin_mode(&self, pin: u8, mode: PinMode) {
        let mut state = self.state.lock().unwrap();
        state.modes.insert(pin, mode);
        state.calls.push(format!("pin_mode {} {:?}", pin, mode));
    }

    fn pin_mode_of(&self, pin: u8) -> PinMode {
        self.state.lock().unwrap().modes.get(&pin).copied().unwrap_or(PinMode::Unknown)
    }

    fn digital_write(&self, pin: u8, value: i32) {
        self.log(format!("digital_write {} {}", pin, value));
    }

    fn digital_read(&self, pin: u8, callback: ValueCallback) {
        let mut state = self.state.lock().unwrap();
        state.digital.insert(pin, callback);
        state.calls.push(format!("digital_read {}", pin));
    }

    fn analog_read(&self, pin: u8, callback: ValueCallback) {
        let mut state = self.state.lock().unwrap();
        state.analog.insert(pin, callback);
        state.calls.push(format!("analog_read {}", pin));
    }

    fn query_pin_state(&self, pin: u8, callback: QueryCallback) {
        let mut state = self.state.lock().unwrap();
        state.queries.push((pin, callback));
        state.calls.push(format!("query_pin_state {}", pin));
    }
}

pub fn test_config() -> DriverConfig {
    DriverConfig {
        port_name: Some("TEST".to_string()),
        sampling_interval: INTERVAL_MS,
        ..Default::default()
    }
}

pub type Emissions = Arc<Mutex<Vec<ItemValue>>>;

pub fn driver_with(board: &Arc<ScriptedBoard>) -> (Driver, Emissions) {
    let driver = Driver::new(&test_config(), board.clone());
    let emissions: Emissions = Arc::default();
    let sink = emissions.clone();
    driver
        .subscribe(EventKind::ItemValue, move |v| sink.lock().unwrap().push(v.clone()))
        .unwrap();
    (driver, emissions)
}

/// Values emitted for one item, in order.
pub fn values_of(emissions: &Emissions, name: &str) -> Vec<i32> {
    emissions
        .lock()
        .unwrap()
        .iter()
        .filter(|v| v.name == name)
        .map(|v| v.value)
        .collect()
}

pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Start the driver and wait until the board is ready.
pub async fn start_ready(driver: &Driver) {
    driver.start();
    advance(READY_DELAY.as_millis() as u64 + 10).await;
}
