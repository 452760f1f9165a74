//! BlueZ D-Bus backend for advertisement scanning.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.

use super::{ADVERTISEMENT_CHANNEL_BUFFER_SIZE, AdvertisementResult, ScanError};
use crate::advertisement::{Advertisement, ServiceData};
use bluer::{Adapter, AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport, Session};
use futures::StreamExt;
use log::{debug, info};
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Devices BlueZ already knew about when discovery started.
///
/// Discovery first replays one `DeviceAdded` per known device, carrying
/// whatever BlueZ cached from earlier scans, possibly for devices long out
/// of range. Only the property changes that follow reflect advertisements
/// received during this scan.
#[derive(Debug, Default)]
struct KnownDevices {
    pending_replay: HashSet<Address>,
}

impl KnownDevices {
    fn new(addresses: impl IntoIterator<Item = Address>) -> Self {
        Self {
            pending_replay: addresses.into_iter().collect(),
        }
    }

    /// Whether a `DeviceAdded` for `address` carries data received by this scan.
    fn is_fresh(&mut self, address: Address) -> bool {
        !self.pending_replay.remove(&address)
    }

    /// A removed device is reported afresh if it shows up again.
    fn forget(&mut self, address: Address) {
        self.pending_replay.remove(&address);
    }
}

/// Start LE discovery through BlueZ.
///
/// BlueZ reports a device again whenever one of its advertised properties
/// changes; each report is read back into an [`Advertisement`]. Cached
/// devices replayed at the start of discovery are skipped until they change.
/// Discovery is stopped when `cancel` fires or the receiver is dropped.
pub async fn start_scan(
    cancel: CancellationToken,
) -> Result<mpsc::Receiver<AdvertisementResult>, ScanError> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;
    adapter
        .set_discovery_filter(DiscoveryFilter {
            transport: DiscoveryTransport::Le,
            duplicate_data: true,
            ..Default::default()
        })
        .await?;

    let mut known = KnownDevices::new(adapter.device_addresses().await?);
    let events = adapter.discover_devices_with_changes().await?;
    info!("discovering on adapter {}", adapter.name());

    let (tx, rx) = mpsc::channel(ADVERTISEMENT_CHANNEL_BUFFER_SIZE);

    // The task owns the session; dropping the discovery stream stops discovery.
    tokio::spawn(async move {
        let _session = session;
        let mut events = Box::pin(events);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("scan cancelled, stopping discovery");
                    break;
                }
                event = events.next() => match event {
                    Some(AdapterEvent::DeviceAdded(address)) => {
                        if !known.is_fresh(address) {
                            debug!("skipping cached report for {address}");
                            continue;
                        }
                        let advertisement = match read_advertisement(&adapter, address).await {
                            Ok(advertisement) => advertisement,
                            Err(e) => {
                                // Devices can vanish between the event and the property reads.
                                debug!("skipping {address}: {e}");
                                continue;
                            }
                        };
                        if tx.send(Ok(advertisement)).await.is_err() {
                            debug!("advertisement receiver dropped, stopping discovery");
                            break;
                        }
                    }
                    Some(AdapterEvent::DeviceRemoved(address)) => known.forget(address),
                    Some(_) => {}
                    None => {
                        let _ = tx.send(Err(ScanError::StreamClosed)).await;
                        break;
                    }
                }
            }
        }
    });

    Ok(rx)
}

/// Read the advertised properties BlueZ currently holds for `address`.
async fn read_advertisement(
    adapter: &Adapter,
    address: Address,
) -> Result<Advertisement, ScanError> {
    let device = adapter.device(address)?;

    let service_data = device.service_data().await?.map(|entries| {
        let mut entries: Vec<ServiceData> = entries
            .into_iter()
            .map(|(uuid, data)| ServiceData { uuid, data })
            .collect();
        // BlueZ hands out a map; sort so "first entry" is stable.
        entries.sort_by_key(|entry| entry.uuid);
        entries
    });

    let mut services: Vec<_> = device
        .uuids()
        .await?
        .map(|uuids| uuids.into_iter().collect())
        .unwrap_or_default();
    services.sort();

    Ok(Advertisement {
        address: Some(address.into()),
        service_data,
        rssi: device.rssi().await?,
        local_name: device.name().await?,
        services,
        manufacturer_data: device
            .manufacturer_data()
            .await?
            .map(|data| data.into_iter().collect())
            .unwrap_or_default(),
    })
}
