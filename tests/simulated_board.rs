// The driver against the built-in simulated board
use firmata_bridge::config::DriverConfig;
use firmata_bridge::driver::create;
use firmata_bridge::{DriverError, ItemValue};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tokio_test::assert_ok;

fn sim_config() -> DriverConfig {
    DriverConfig {
        sim_mode: true,
        port_name: Some("SIM0".to_string()),
        ..Default::default()
    }
}

fn collect(driver: &firmata_bridge::Driver) -> Arc<Mutex<Vec<ItemValue>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    assert_ok!(driver.on("itemvalue", move |v| sink.lock().unwrap().push(v.clone())));
    seen
}

#[tokio::test(start_paused = true)]
async fn test_ready_after_simulated_boot() {
    let driver = create(&sim_config());
    let seen = collect(&driver);
    assert_ok!(driver.register("ready"));
    driver.start();

    sleep(Duration::from_millis(4900)).await;
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(driver.write_item("ready", 1).await, Err(DriverError::ReadOnly("ready".into())));

    sleep(Duration::from_millis(200)).await;
    assert_eq!(*seen.lock().unwrap(), vec![ItemValue::new("ready", 1)]);
    driver.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_output_write_is_read_back_after_query_delay() {
    let driver = create(&sim_config());
    assert_ok!(driver.register("digital:13:output"));
    assert_ok!(driver.register("digital:13:mode"));
    driver.start();
    assert_eq!(driver.write_item("digital:13:output", 1).await, Err(DriverError::NotReady));

    sleep(Duration::from_millis(5100)).await;
    assert_ok!(driver.write_item("digital:13:output", 1).await);
    assert_eq!(driver.read_item("digital:13:output").await, Ok(Some(0)));

    sleep(Duration::from_millis(600)).await;
    assert_eq!(driver.read_item("digital:13:output").await, Ok(Some(1)));

    sleep(Duration::from_millis(1000)).await;
    assert_eq!(driver.read_item("digital:13:mode").await, Ok(Some(1)));
    driver.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_analog_input_drifts_within_range() {
    let driver = create(&sim_config());
    let seen = collect(&driver);
    assert_ok!(driver.register("analog:0:input"));
    driver.start();

    sleep(Duration::from_millis(5000 + 10_500)).await;
    let values: Vec<i32> = seen
        .lock()
        .unwrap()
        .iter()
        .filter(|v| v.name == "analog:0:input")
        .map(|v| v.value)
        .collect();
    assert!(!values.is_empty());
    assert!(values.len() <= 11, "{values:?}");
    assert!(values.iter().all(|v| (0..=1023).contains(v)));

    driver.stop();
    sleep(Duration::from_millis(10)).await;
    let emitted = seen.lock().unwrap().len();
    sleep(Duration::from_millis(5000)).await;
    assert_eq!(seen.lock().unwrap().len(), emitted);
}
