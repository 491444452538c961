//! Desk discovery and scanning.
//!
//! ErgoMate Classic desks advertise with a `BLT_` name prefix; this module
//! finds them, and finds a specific desk by its address for connecting.

use std::time::Duration;

use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use ergomate_types::uuid::{DESK_SERVICE, DEVICE_NAME_PREFIX};

use crate::error::{ConnectionFailureReason, Error, Result};

/// Information about a discovered desk.
#[derive(Debug, Clone)]
pub struct DiscoveredDesk {
    /// The advertised name (e.g., "BLT_BLTDESK").
    pub name: String,
    /// The BLE address as a string.
    pub address: String,
    /// RSSI signal strength.
    pub rssi: Option<i16>,
}

/// Options for scanning.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// How long to scan for desks.
    pub duration: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(10),
        }
    }
}

impl ScanOptions {
    /// Create new scan options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan duration.
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters.into_iter().next().ok_or(Error::connection_failed(
        None,
        ConnectionFailureReason::AdapterUnavailable,
    ))
}

/// Scan for ErgoMate desks in range.
///
/// Returns a list of discovered desks; an empty list means none were found
/// (not an error).
///
/// # Errors
///
/// Returns an error if no Bluetooth adapter is available or the scan could
/// not be started or stopped.
pub async fn scan_for_desks() -> Result<Vec<DiscoveredDesk>> {
    scan_with_options(ScanOptions::default()).await
}

/// Scan for desks with custom options.
pub async fn scan_with_options(options: ScanOptions) -> Result<Vec<DiscoveredDesk>> {
    let adapter = get_adapter().await?;
    info!(
        "Scanning for desks ({} seconds)...",
        options.duration.as_secs()
    );

    adapter.start_scan(ScanFilter::default()).await?;
    sleep(options.duration).await;
    adapter.stop_scan().await?;

    let mut desks = Vec::new();
    for peripheral in adapter.peripherals().await? {
        match desk_from_peripheral(&peripheral).await {
            Ok(Some(desk)) => {
                info!("Found desk: {} ({})", desk.name, desk.address);
                desks.push(desk);
            }
            Ok(None) => {}
            Err(e) => debug!("Error processing peripheral: {}", e),
        }
    }

    info!("Scan complete. Found {} desk(s)", desks.len());
    Ok(desks)
}

/// Check whether a peripheral looks like an ErgoMate desk.
async fn desk_from_peripheral(peripheral: &Peripheral) -> Result<Option<DiscoveredDesk>> {
    let Some(properties) = peripheral.properties().await? else {
        return Ok(None);
    };

    let is_desk = properties
        .local_name
        .as_deref()
        .is_some_and(|name| name.starts_with(DEVICE_NAME_PREFIX))
        || properties.services.contains(&DESK_SERVICE);

    if !is_desk {
        return Ok(None);
    }

    Ok(Some(DiscoveredDesk {
        name: properties.local_name.unwrap_or_default(),
        address: properties.address.to_string(),
        rssi: properties.rssi,
    }))
}

/// Find a specific desk by its BLE address.
///
/// Already-known peripherals are checked first; otherwise a scan runs until
/// the desk shows up or the timeout elapses. BLE advertisements can be missed,
/// so the peripheral cache is polled while the scan is in progress.
pub async fn find_desk(adapter: &Adapter, address: &str, timeout: Duration) -> Result<Peripheral> {
    let address_lower = address.to_lowercase();

    if let Some(peripheral) = find_peripheral_by_address(adapter, &address_lower).await? {
        debug!("Found desk in peripheral cache (no scan needed)");
        return Ok(peripheral);
    }

    adapter.start_scan(ScanFilter::default()).await?;
    let deadline = tokio::time::Instant::now() + timeout;

    let result = loop {
        sleep(Duration::from_millis(200)).await;
        if let Some(peripheral) = find_peripheral_by_address(adapter, &address_lower).await? {
            break Some(peripheral);
        }
        if tokio::time::Instant::now() >= deadline {
            break None;
        }
    };

    adapter.stop_scan().await?;

    match result {
        Some(peripheral) => Ok(peripheral),
        None => {
            warn!("Desk not found at {} after {:?}", address, timeout);
            Err(Error::connection_failed(
                Some(address.to_string()),
                ConnectionFailureReason::NotFound,
            ))
        }
    }
}

/// Search through known peripherals for one matching the address.
async fn find_peripheral_by_address(
    adapter: &Adapter,
    address_lower: &str,
) -> Result<Option<Peripheral>> {
    for peripheral in adapter.peripherals().await? {
        if let Ok(Some(props)) = peripheral.properties().await {
            let address = props.address.to_string().to_lowercase();

            // MAC address match (Linux/Windows); macOS reports zeros and
            // exposes a peripheral UUID instead.
            if address != "00:00:00:00:00:00"
                && (address == address_lower
                    || address.replace(':', "") == address_lower.replace(':', ""))
            {
                return Ok(Some(peripheral));
            }

            if peripheral
                .id()
                .to_string()
                .to_lowercase()
                .contains(address_lower)
            {
                return Ok(Some(peripheral));
            }
        }
    }

    Ok(None)
}
