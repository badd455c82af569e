//! Exposes the pins of a Firmata board as named items: subscribe to value
//! changes, read the last known value, write output pins.
//!
//! ```no_run
//! use firmata_bridge::{config::DriverConfig, driver};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DriverConfig { sim_mode: true, ..Default::default() };
//! let driver = driver::create(&config);
//! driver.on("itemvalue", |v| println!("{} = {}", v.name, v.value))?;
//! driver.register("digital:13:output")?;
//! driver.start();
//! # Ok(())
//! # }
//! ```
pub mod config;
pub mod driver;
pub mod hardware;
pub mod item;
pub mod notify;
pub mod simulator;

pub use driver::{Driver, DriverError};
pub use item::{parse_item_name, ItemError, ItemKind};
pub use notify::{EventKind, ItemValue, Quality};
