//! Verify a finger against templates kept by the application
//!
//! Enrolls one finger into an in-memory store, then captures a second
//! reading and matches it against the store.

use fingerlink::{Device, DeviceConfig, MemoryTemplateStore, TemplateStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fingerlink::logging::init(false);

    let config = match std::env::var("FINGERLINK_CONFIG") {
        Ok(path) => DeviceConfig::from_file(path)?,
        Err(_) => DeviceConfig::serial("/dev/ttyUSB0"),
    };

    let device = Device::from_config(&config)?;
    device.open().await?;

    let store = MemoryTemplateStore::new();

    println!("Enrolling, follow the sensor prompts...");
    let outcome = device.enroll_into(&store).await?;
    println!("✓ {}", outcome);

    if outcome.template.is_none() {
        println!("Device did not report the template; nothing to match against");
        device.close().await?;
        return Ok(());
    }

    println!("Place the same finger again...");
    let matched = device.verify_with_store(&store).await?;
    println!(
        "{} (threshold {}, {} stored)",
        matched,
        device.threshold(),
        store.count().await?
    );

    device.close().await?;
    Ok(())
}
