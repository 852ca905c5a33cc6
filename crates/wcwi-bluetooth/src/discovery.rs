//! Bluetooth device discovery
//!
//! Paired devices are listed immediately. A scan reports each newly seen
//! device as it is found and always ends with [`ScanEvent::Finished`], either
//! when the scan window elapses, when the adapter stops reporting, or when
//! the scan is stopped because a connection attempt began.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::adapter::{BluetoothAdapter, BluetoothDevice, BluetoothOperation};
use crate::config::BluetoothTransportConfig;
use crate::error::{BluetoothError, Result};
use wcwi_core::transport::lock;

/// Progress of a device scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    DeviceFound(BluetoothDevice),
    Finished,
}

// ----------------------------------------------------------------------------
// Discovery Implementation
// ----------------------------------------------------------------------------

pub struct BluetoothDiscovery {
    adapter: Arc<dyn BluetoothAdapter>,
    config: BluetoothTransportConfig,
    scanning: Arc<AtomicBool>,
    active: Mutex<Option<(oneshot::Sender<()>, JoinHandle<()>)>>,
}

impl BluetoothDiscovery {
    pub fn new(adapter: Arc<dyn BluetoothAdapter>, config: BluetoothTransportConfig) -> Self {
        Self {
            adapter,
            config,
            scanning: Arc::new(AtomicBool::new(false)),
            active: Mutex::new(None),
        }
    }

    /// Ensure the radio is on and the operation is permitted
    pub async fn ensure_ready(&self, operation: BluetoothOperation) -> Result<()> {
        self.adapter.check_permission(operation).await?;
        if !self.adapter.is_enabled().await? {
            return Err(BluetoothError::Disabled);
        }
        Ok(())
    }

    /// Already paired devices
    pub async fn paired_devices(&self) -> Result<Vec<BluetoothDevice>> {
        self.ensure_ready(BluetoothOperation::Connect).await?;
        self.adapter.paired_devices().await
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    /// Start a scan window
    ///
    /// Each device is reported once per scan. Starting while a scan is running
    /// is an error.
    pub async fn start_scan(&self) -> Result<mpsc::UnboundedReceiver<ScanEvent>> {
        self.ensure_ready(BluetoothOperation::Discover).await?;
        if self.scanning.swap(true, Ordering::SeqCst) {
            return Err(BluetoothError::ScanFailed("scan already running".to_string()));
        }

        let mut found = match self.adapter.start_scan().await {
            Ok(found) => found,
            Err(e) => {
                self.scanning.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let (events, receiver) = mpsc::unbounded_channel();
        let adapter = Arc::clone(&self.adapter);
        let scanning = Arc::clone(&self.scanning);
        let (stop_tx, mut stop) = oneshot::channel::<()>();
        let window = self.config.scan_timeout();

        info!(window_ms = self.config.scan_timeout_ms, "Bluetooth scan started");
        let task = tokio::spawn(async move {
            let mut seen = HashSet::new();
            let deadline = sleep(window);
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    device = found.recv() => match device {
                        Some(device) => {
                            if seen.insert(device.address.clone()) {
                                debug!(device = %device, "Discovered device");
                                if events.send(ScanEvent::DeviceFound(device)).is_err() {
                                    break;
                                }
                            }
                        }
                        None => break,
                    },
                    _ = &mut deadline => break,
                    _ = &mut stop => break,
                }
            }

            if let Err(e) = adapter.stop_scan().await {
                warn!(error = %e, "Failed to stop Bluetooth scan");
            }
            scanning.store(false, Ordering::SeqCst);
            let _ = events.send(ScanEvent::Finished);
            info!(devices = seen.len(), "Bluetooth scan finished");
        });
        *lock(&self.active) = Some((stop_tx, task));

        Ok(receiver)
    }

    /// End the running scan, if any
    pub async fn stop_scan(&self) {
        let Some((stop, task)) = lock(&self.active).take() else {
            return;
        };
        let _ = stop.send(());
        if let Err(e) = task.await {
            warn!(error = %e, "Bluetooth scan task failed");
        }
    }
}
