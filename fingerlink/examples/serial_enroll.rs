//! Enroll a finger over a serial line, printing progress as it happens
//!
//! FINGERLINK_CONFIG points at a TOML file; otherwise FINGERLINK_PORT (or
//! /dev/ttyUSB0) is used with default timing.

use anyhow::Context;
use fingerlink::{Device, DeviceConfig, EnrollmentOutcome, EnrollmentStatus};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fingerlink::logging::init(true);

    let config = match std::env::var("FINGERLINK_CONFIG") {
        Ok(path) => DeviceConfig::from_file(&path).with_context(|| format!("loading {}", path))?,
        Err(_) => {
            let port = std::env::var("FINGERLINK_PORT").unwrap_or_else(|_| "/dev/ttyUSB0".to_string());
            DeviceConfig::serial(port)
        }
    };

    let device = Device::from_config(&config)?;
    device.open().await.context("opening terminal")?;
    println!("✓ Connected, {} templates stored", device.count().await?);

    let (tx, mut rx) = mpsc::unbounded_channel::<EnrollmentOutcome>();
    let printer = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            match update.status {
                EnrollmentStatus::Processing => {
                    if let Some(message) = update.messages.last() {
                        println!("  … {}", message);
                    }
                }
                _ => println!("  {}", update),
            }
        }
    });

    let result = device.enroll_with_progress(tx).await;
    printer.await?;

    match result {
        Ok(outcome) if outcome.recovered => {
            println!("✓ Enrolled as #{:?} (recovered after a link failure)", outcome.assigned_id)
        }
        Ok(outcome) => println!("✓ Enrolled as #{:?}", outcome.assigned_id),
        Err(e) => println!("✗ Enrollment failed: {}", e),
    }

    device.close().await?;
    Ok(())
}
