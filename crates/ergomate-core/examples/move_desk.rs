//! Connect to a desk and drive it through a short movement sequence.
//!
//! Usage:
//!
//! ```sh
//! cargo run --example move_desk -- AA:BB:CC:DD:EE:FF
//! ```
//!
//! With no argument the example scans for the first desk in range.

use std::time::Duration;

use ergomate_core::{Desk, Result, scan_for_desks};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let address = match std::env::args().nth(1) {
        Some(addr) => addr,
        None => {
            println!("Scanning for desks...");
            let desks = scan_for_desks().await?;
            let Some(found) = desks.first() else {
                eprintln!("No desk found in range");
                std::process::exit(1);
            };
            println!("Using {} at {}", found.name, found.address);
            found.address.clone()
        }
    };

    let desk = Desk::new(address, 0.0);
    desk.connect().await?;
    desk.subscribe_notifications().await?;

    println!("Nudging up for two seconds...");
    desk.move_up_for(Duration::from_secs(2)).await?;

    println!("Moving to 110 cm...");
    desk.move_to_height(110.0).await?;
    tokio::time::sleep(Duration::from_secs(15)).await;

    if let Some(cm) = desk.calibrated_height_cm() {
        println!("Desk reports {:.1} cm", cm);
    } else {
        println!("No height reading received");
    }

    desk.disconnect().await?;
    Ok(())
}
