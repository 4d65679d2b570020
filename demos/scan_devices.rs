//! Basic example: list nearby BLE devices
//!
//! Run with: cargo run --example scan_devices
//!
//! Set `RUST_LOG=ble_device_scanner=debug` to see iBeacon/Eddystone diagnostics.

use ble_device_scanner::{DiscoverySession, RegistryEvent, Result, SessionConfig, SessionEvent};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ble_device_scanner=info".parse().unwrap()),
        )
        .init();

    println!("Starting BLE device discovery...\n");

    let session = DiscoverySession::with_bluetooth(SessionConfig::default()).await?;

    let mut devices = session.registry().subscribe();
    tokio::spawn(async move {
        while let Ok(change) = devices.recv().await {
            if let RegistryEvent::Inserted(device) = change {
                println!("  {}", device.row());
            }
        }
    });

    let mut session_events = session.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = session_events.recv().await {
            if let SessionEvent::ScanFailed(failure) = event {
                println!("\nScan failed: {} - refresh to retry", failure);
            }
        }
    });

    session.start().await?;

    println!("Scanning for 15 seconds, then refreshing once...");
    println!("Press Ctrl+C to exit early.\n");

    tokio::select! {
        _ = async {
            tokio::time::sleep(Duration::from_secs(15)).await;
            println!("\n--- Refresh ---");
            if let Err(e) = session.restart().await {
                println!("Refresh failed: {}", e);
            }
            tokio::time::sleep(Duration::from_secs(15)).await;
        } => {}
        _ = tokio::signal::ctrl_c() => {
            println!("\nInterrupted!");
        }
    }

    println!("\n--- Scan Complete ---");
    let snapshot = session.snapshot();
    println!("Total devices found: {}", snapshot.len());
    for device in snapshot {
        println!("  {}", device.row());
    }

    session.shutdown().await?;
    println!("\nDone!");

    Ok(())
}
