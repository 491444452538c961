//! Stream live height readings and connection events from a desk.
//!
//! Usage:
//!
//! ```sh
//! cargo run --example watch_height -- AA:BB:CC:DD:EE:FF [offset_cm]
//! ```
//!
//! The optional offset calibrates reported heights against the desk's own
//! display. Ctrl-C to exit.

use std::sync::Arc;

use ergomate_core::{Desk, DeskEvent, Result};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(address) = args.next() else {
        eprintln!("Usage: watch_height <address> [offset_cm]");
        std::process::exit(1);
    };
    let offset_cm: f32 = args
        .next()
        .map(|s| s.parse().unwrap_or(0.0))
        .unwrap_or(0.0);

    let desk = Desk::new(address, offset_cm);
    let mut events = desk.events();

    desk.connect().await?;
    desk.subscribe_notifications().await?;

    desk.register_callback(Arc::new(|reading| {
        println!(
            "Height: {:.1} cm (raw {:.1} cm)",
            reading.calibrated_cm(),
            reading.raw_cm()
        );
    }));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => {
                match event {
                    Ok(DeskEvent::Height { .. }) => {}
                    Ok(event) => println!("Event: {:?}", event),
                    Err(_) => break,
                }
            }
        }
    }

    desk.disconnect().await?;
    Ok(())
}
