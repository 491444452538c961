//! btleplug-backed transport for real desks.
//!
//! This is the only module that touches a radio. It finds the peripheral by
//! address, manages the GATT link, performs confirmed writes, pumps
//! notification streams into handlers, and reports unexpected link loss
//! through the [`DeskTransport::link_drops`] channel.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Characteristic, Peripheral as _, WriteType};
use btleplug::platform::{Adapter, Peripheral};
use futures::StreamExt;
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::scan::{find_desk, get_adapter};
use crate::transport::{DeskTransport, LinkDropReceiver, NotificationHandler};

/// Default scan budget for locating the peripheral during `open`.
const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// An open GATT link and its discovered characteristics.
struct Link {
    adapter: Adapter,
    peripheral: Peripheral,
    /// Characteristics by UUID for O(1) lookup, built at service discovery.
    characteristics: HashMap<Uuid, Characteristic>,
}

/// [`DeskTransport`] implementation backed by btleplug.
pub struct BleTransport {
    address: String,
    discovery_timeout: Duration,
    link: RwLock<Option<Link>>,
    /// Handles for spawned notification pump tasks (for cleanup).
    notify_tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Watcher task translating central events into link-drop signals.
    watcher: Mutex<Option<JoinHandle<()>>>,
    link_tx: broadcast::Sender<()>,
}

impl std::fmt::Debug for BleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleTransport")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl BleTransport {
    /// Create a transport for the desk at the given BLE address.
    ///
    /// No radio I/O happens until [`DeskTransport::open`] is called.
    pub fn new(address: impl Into<String>) -> Self {
        let (link_tx, _) = broadcast::channel(8);
        Self {
            address: address.into(),
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            link: RwLock::new(None),
            notify_tasks: Mutex::new(Vec::new()),
            watcher: Mutex::new(None),
            link_tx,
        }
    }

    /// Set the scan budget for locating the peripheral.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// The desk address this transport targets.
    pub fn address(&self) -> &str {
        &self.address
    }

    async fn abort_notify_tasks(&self) {
        let mut tasks = self.notify_tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    /// Spawn the watcher that maps this peripheral's disconnect events onto
    /// the link-drop channel. Replaces any previous watcher.
    async fn spawn_link_watcher(&self, adapter: &Adapter, peripheral: &Peripheral) -> Result<()> {
        let mut events = adapter.events().await?;
        let our_id = peripheral.id();
        let link_tx = self.link_tx.clone();
        let address = self.address.clone();

        let handle = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDisconnected(id) = event
                    && id == our_id
                {
                    info!("Desk at {} reported link loss", address);
                    let _ = link_tx.send(());
                }
            }
        });

        let mut watcher = self.watcher.lock().await;
        if let Some(old) = watcher.replace(handle) {
            old.abort();
        }
        Ok(())
    }

    async fn find_characteristic(&self, uuid: Uuid) -> Result<(Peripheral, Characteristic)> {
        let link = self.link.read().await;
        let link = link.as_ref().ok_or(Error::NotConnected)?;
        let characteristic = link
            .characteristics
            .get(&uuid)
            .cloned()
            .ok_or_else(|| Error::characteristic_not_found(uuid))?;
        Ok((link.peripheral.clone(), characteristic))
    }
}

#[async_trait]
impl DeskTransport for BleTransport {
    async fn open(&self) -> Result<()> {
        if self.is_open().await {
            return Ok(());
        }

        // A half-dead link from a previous session would shadow the new one.
        self.abort_notify_tasks().await;
        *self.link.write().await = None;

        let adapter = get_adapter().await?;
        let peripheral = find_desk(&adapter, &self.address, self.discovery_timeout).await?;

        debug!("Connecting to desk at {}", self.address);
        peripheral.connect().await?;
        peripheral.discover_services().await?;

        let mut characteristics = HashMap::new();
        for service in peripheral.services() {
            debug!("  Service: {}", service.uuid);
            for characteristic in service.characteristics {
                debug!("    Characteristic: {}", characteristic.uuid);
                characteristics.insert(characteristic.uuid, characteristic);
            }
        }

        self.spawn_link_watcher(&adapter, &peripheral).await?;
        *self.link.write().await = Some(Link {
            adapter,
            peripheral,
            characteristics,
        });

        info!("Connected to desk at {}", self.address);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // Deliberate close: stop the watcher first so teardown does not
        // surface as link loss.
        if let Some(watcher) = self.watcher.lock().await.take() {
            watcher.abort();
        }
        self.abort_notify_tasks().await;

        if let Some(link) = self.link.write().await.take() {
            let _ = link.adapter.stop_scan().await;
            link.peripheral.disconnect().await?;
            debug!("Closed link to desk at {}", self.address);
        }
        Ok(())
    }

    async fn is_open(&self) -> bool {
        let link = self.link.read().await;
        match link.as_ref() {
            Some(link) => link.peripheral.is_connected().await.unwrap_or(false),
            None => false,
        }
    }

    async fn write(&self, characteristic: Uuid, payload: &[u8]) -> Result<()> {
        let (peripheral, characteristic) = self.find_characteristic(characteristic).await?;
        // Always confirmed: the desk firmware drops write-without-response.
        peripheral
            .write(&characteristic, payload, WriteType::WithResponse)
            .await
            .map_err(|e| Error::write_failed(characteristic.uuid, e.to_string()))
    }

    async fn subscribe(&self, characteristic: Uuid, handler: NotificationHandler) -> Result<()> {
        let (peripheral, characteristic) = self.find_characteristic(characteristic).await?;
        peripheral.subscribe(&characteristic).await?;

        let mut stream = peripheral.notifications().await?;
        let target_uuid = characteristic.uuid;
        let handle = tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                if notification.uuid == target_uuid {
                    handler(&notification.value);
                }
            }
        });

        self.notify_tasks.lock().await.push(handle);
        debug!("Subscribed to notifications on {}", target_uuid);
        Ok(())
    }

    async fn unsubscribe(&self, characteristic: Uuid) -> Result<()> {
        let (peripheral, characteristic) = self.find_characteristic(characteristic).await?;
        peripheral.unsubscribe(&characteristic).await?;
        // Only the height characteristic is ever subscribed, so dropping all
        // pump tasks here is safe.
        self.abort_notify_tasks().await;
        debug!("Unsubscribed from notifications on {}", characteristic.uuid);
        Ok(())
    }

    fn link_drops(&self) -> LinkDropReceiver {
        self.link_tx.subscribe()
    }
}

impl Drop for BleTransport {
    fn drop(&mut self) {
        // Best-effort cleanup when close() was not called; the peripheral
        // disconnect itself needs an async context we may no longer have.
        if let Ok(mut watcher) = self.watcher.try_lock()
            && let Some(handle) = watcher.take()
        {
            handle.abort();
        }
        if let Ok(mut tasks) = self.notify_tasks.try_lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        if let Ok(link) = self.link.try_read()
            && link.is_some()
        {
            warn!(
                address = %self.address,
                "BleTransport dropped without close(); the BLE link may linger"
            );
        }
    }
}
