//! In-process stand-in for a Firmata board, for development and demos when no
//! hardware is connected.
//!
//! Timing mirrors a real board closely enough for the driver not to notice:
//! readiness arrives after a delay, pin state queries answer late, and polled
//! pins drift randomly once per sampling interval.

use crate::hardware::{Board, HardwareError, PinMode, QueryCallback, ValueCallback};
use async_trait::async_trait;
use rand::Rng;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};

/// More pins than any supported board has.
pub const SIM_PIN_COUNT: usize = 50;
pub const ANALOG_MAX: i32 = 1023;
pub const ANALOG_INITIAL: i32 = 520;
/// Analog drift per sample lies in `[-ANALOG_STEP, ANALOG_STEP)`.
pub const ANALOG_STEP: i32 = 100;

const MIN_SAMPLING_INTERVAL_MS: u64 = 10;
const MAX_SAMPLING_INTERVAL_MS: u64 = 65535;
/// Firmata's power-on sampling interval.
const DEFAULT_SAMPLING_INTERVAL: Duration = Duration::from_millis(19);

#[derive(Debug, Clone, Copy)]
pub struct SimTiming {
    pub ready_delay: Duration,
    pub query_delay: Duration,
}

impl Default for SimTiming {
    fn default() -> Self {
        Self {
            ready_delay: Duration::from_millis(5000),
            query_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug)]
struct SimPin {
    mode: PinMode,
    value: i32,
    reporter: Option<JoinHandle<()>>,
}

impl SimPin {
    fn new(mode: PinMode, value: i32) -> Self {
        Self { mode, value, reporter: None }
    }
}

#[derive(Debug)]
struct SimState {
    ready: bool,
    sampling_interval: Duration,
    pins: Vec<SimPin>,
    analog_pins: Vec<SimPin>,
    queries: Vec<JoinHandle<()>>,
}

/// Simulated board; see the module docs.
#[derive(Debug)]
pub struct SimBoard {
    port_name: String,
    timing: SimTiming,
    state: Arc<Mutex<SimState>>,
}

/// Next analog sample: `previous + step`, clamped at 0 below and wrapping to 0
/// above [`ANALOG_MAX`].
pub fn drift_analog(previous: i32, step: i32) -> i32 {
    let value = previous + step;
    if value < 0 || value > ANALOG_MAX { 0 } else { value }
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimBoard {
    pub fn new(port_name: impl Into<String>) -> Self {
        Self::with_timing(port_name, SimTiming::default())
    }

    pub fn with_timing(port_name: impl Into<String>, timing: SimTiming) -> Self {
        let port_name = port_name.into();
        tracing::info!("Creating simulated board for port {}", port_name);
        Self {
            port_name,
            timing,
            state: Arc::new(Mutex::new(SimState {
                ready: false,
                sampling_interval: DEFAULT_SAMPLING_INTERVAL,
                pins: Vec::new(),
                analog_pins: Vec::new(),
                queries: Vec::new(),
            })),
        }
    }

    pub fn sampling_interval(&self) -> Duration {
        lock(&self.state).sampling_interval
    }

    /// Current simulated level of a digital pin.
    pub fn digital_value(&self, pin: u8) -> Option<i32> {
        lock(&self.state).pins.get(pin as usize).map(|p| p.value)
    }

    fn ready_state(&self, action: &str) -> Option<MutexGuard<'_, SimState>> {
        let state = lock(&self.state);
        if state.ready {
            Some(state)
        } else {
            tracing::warn!("Simulated board not ready; ignoring {}", action);
            None
        }
    }
}

#[async_trait]
impl Board for SimBoard {
    async fn open(&self) -> Result<(), HardwareError> {
        sleep(self.timing.ready_delay).await;
        let mut state = lock(&self.state);
        state.pins = (0..SIM_PIN_COUNT)
            .map(|_| SimPin::new(PinMode::Unknown, 0))
            .collect();
        state.analog_pins = (0..SIM_PIN_COUNT)
            .map(|_| SimPin::new(PinMode::Analog, ANALOG_INITIAL))
            .collect();
        state.ready = true;
        tracing::info!("Simulated board on {} ready", self.port_name);
        Ok(())
    }

    async fn close(&self) -> Result<(), HardwareError> {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        for pin in state.pins.iter_mut().chain(state.analog_pins.iter_mut()) {
            if let Some(reporter) = pin.reporter.take() {
                reporter.abort();
            }
        }
        for query in state.queries.drain(..) {
            query.abort();
        }
        state.ready = false;
        tracing::info!("Simulated board on {} closed", self.port_name);
        Ok(())
    }

    fn set_sampling_interval(&self, interval: Duration) {
        let ms = (interval.as_millis() as u64).clamp(MIN_SAMPLING_INTERVAL_MS, MAX_SAMPLING_INTERVAL_MS);
        lock(&self.state).sampling_interval = Duration::from_millis(ms);
    }

    fn pin_mode(&self, pin: u8, mode: PinMode) {
        let Some(mut state) = self.ready_state("pin_mode") else {
            return;
        };
        let index = pin as usize;
        if index >= state.pins.len() {
            state.pins.resize_with(index + 1, || SimPin::new(PinMode::Unknown, 0));
        }
        state.pins[index].mode = mode;
    }

    fn pin_mode_of(&self, pin: u8) -> PinMode {
        lock(&self.state)
            .pins
            .get(pin as usize)
            .map(|p| p.mode)
            .unwrap_or(PinMode::Unknown)
    }

    fn digital_write(&self, pin: u8, value: i32) {
        let Some(mut state) = self.ready_state("digital_write") else {
            return;
        };
        if let Some(p) = state.pins.get_mut(pin as usize) {
            p.value = i32::from(value != 0);
        }
    }

    fn digital_read(&self, pin: u8, callback: ValueCallback) {
        let Some(mut state) = self.ready_state("digital_read") else {
            return;
        };
        let period = state.sampling_interval;
        let Some(p) = state.pins.get_mut(pin as usize) else {
            return;
        };
        if p.mode == PinMode::Output {
            return;
        }
        let shared = self.state.clone();
        let reporter = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            loop {
                ticks.tick().await;
                let value = rand::rng().random_range(0..2);
                if let Some(p) = lock(&shared).pins.get_mut(pin as usize) {
                    p.value = value;
                }
                callback(value);
            }
        });
        if let Some(previous) = p.reporter.replace(reporter) {
            previous.abort();
        }
    }

    fn analog_read(&self, pin: u8, callback: ValueCallback) {
        let Some(mut state) = self.ready_state("analog_read") else {
            return;
        };
        let period = state.sampling_interval;
        let Some(p) = state.analog_pins.get_mut(pin as usize) else {
            return;
        };
        let shared = self.state.clone();
        let reporter = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            loop {
                ticks.tick().await;
                let step = rand::rng().random_range(-ANALOG_STEP..ANALOG_STEP);
                let value = {
                    let mut state = lock(&shared);
                    let Some(p) = state.analog_pins.get_mut(pin as usize) else {
                        break;
                    };
                    p.value = drift_analog(p.value, step);
                    p.value
                };
                callback(value);
            }
        });
        if let Some(previous) = p.reporter.replace(reporter) {
            previous.abort();
        }
    }

    fn query_pin_state(&self, pin: u8, callback: QueryCallback) {
        let Some(mut state) = self.ready_state("query_pin_state") else {
            return;
        };
        let delay = self.timing.query_delay;
        let shared = self.state.clone();
        state.queries.retain(|q| !q.is_finished());
        state.queries.push(tokio::spawn(async move {
            sleep(delay).await;
            let value = lock(&shared).pins.get(pin as usize).map(|p| p.value).unwrap_or(0);
            callback(value);
        }));
    }
}
