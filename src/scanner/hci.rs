//! Raw HCI socket backend for advertisement scanning.
//!
//! This backend uses raw Linux HCI sockets to scan for BLE advertisements
//! without requiring the BlueZ daemon. It requires CAP_NET_RAW and
//! CAP_NET_ADMIN capabilities or root privileges.

use super::{ADVERTISEMENT_CHANNEL_BUFFER_SIZE, AdvertisementResult, ScanError};
use crate::advertisement::{Advertisement, ServiceData, uuid_from_u16};
use crate::mac_address::MacAddress;
use libc::{
    AF_BLUETOOTH, SOCK_CLOEXEC, SOCK_NONBLOCK, SOCK_RAW, c_int, c_void, sockaddr, socklen_t,
};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// HCI protocol constants
const BTPROTO_HCI: c_int = 1;
const SOL_HCI: c_int = 0;
const HCI_FILTER: c_int = 2;
const HCI_CHANNEL_RAW: u16 = 0;
const HCI_DEV_ID: u16 = 0;

// HCI packet types
const HCI_COMMAND_PKT: u8 = 0x01;
const HCI_EVENT_PKT: u8 = 0x04;

// HCI events
const EVT_LE_META_EVENT: u8 = 0x3E;
const EVT_LE_ADVERTISING_REPORT: u8 = 0x02;

// LE controller commands
const OGF_LE_CTL: u16 = 0x08;
const OCF_LE_SET_SCAN_PARAMETERS: u16 = 0x000B;
const OCF_LE_SET_SCAN_ENABLE: u16 = 0x000C;

// Scan parameters: active, 10ms interval and window (0.625ms units).
// The meter sends its service data in the scan response, which the
// controller only requests during an active scan.
const LE_SCAN_ACTIVE: u8 = 0x01;
const LE_SCAN_INTERVAL: u16 = 0x0010;
const LE_SCAN_WINDOW: u16 = 0x0010;
const LE_PUBLIC_ADDRESS: u8 = 0x00;
const FILTER_POLICY_ACCEPT_ALL: u8 = 0x00;

// Advertising report event types
const ADV_SCAN_RSP: u8 = 0x04;

// AD types
const AD_INCOMPLETE_UUID16: u8 = 0x02;
const AD_COMPLETE_UUID16: u8 = 0x03;
const AD_INCOMPLETE_UUID128: u8 = 0x06;
const AD_COMPLETE_UUID128: u8 = 0x07;
const AD_SHORT_NAME: u8 = 0x08;
const AD_COMPLETE_NAME: u8 = 0x09;
const AD_SERVICE_DATA_UUID16: u8 = 0x16;
const AD_MANUFACTURER_DATA: u8 = 0xFF;

/// Max HCI event size
const HCI_MAX_EVENT_SIZE: usize = 258;

/// Devices whose advertisement may wait for a scan response at once.
const MAX_PENDING_SCAN_RESPONSES: usize = 256;

/// HCI socket address structure
#[repr(C)]
struct SockaddrHci {
    hci_family: u16,
    hci_dev: u16,
    hci_channel: u16,
}

/// HCI filter structure for raw sockets
#[repr(C)]
struct HciFilter {
    type_mask: u32,
    event_mask: [u32; 2],
    opcode: u16,
}

impl HciFilter {
    /// Filter passing only LE meta events.
    fn le_meta_events() -> Self {
        let mut filter = Self {
            type_mask: 0,
            event_mask: [0, 0],
            opcode: 0,
        };
        filter.type_mask |= 1 << u32::from(HCI_EVENT_PKT);
        let bit = usize::from(EVT_LE_META_EVENT);
        filter.event_mask[bit / 32] |= 1 << (bit % 32);
        filter
    }
}

fn last_os_error(context: &str) -> ScanError {
    ScanError::Bluetooth(format!("{context}: {}", io::Error::last_os_error()))
}

/// A raw HCI socket bound to one controller.
struct HciSocket {
    fd: OwnedFd,
}

impl HciSocket {
    /// Open a non-blocking raw socket on controller `dev_id`.
    fn open(dev_id: u16) -> Result<Self, ScanError> {
        // SOCK_NONBLOCK is required for AsyncFd
        let fd = unsafe {
            libc::socket(
                AF_BLUETOOTH,
                SOCK_RAW | SOCK_CLOEXEC | SOCK_NONBLOCK,
                BTPROTO_HCI,
            )
        };
        if fd < 0 {
            return Err(last_os_error("Failed to create HCI socket"));
        }
        let socket = Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        };

        let addr = SockaddrHci {
            hci_family: AF_BLUETOOTH as u16,
            hci_dev: dev_id,
            hci_channel: HCI_CHANNEL_RAW,
        };
        let ret = unsafe {
            libc::bind(
                socket.fd.as_raw_fd(),
                &addr as *const SockaddrHci as *const sockaddr,
                mem::size_of::<SockaddrHci>() as socklen_t,
            )
        };
        if ret < 0 {
            return Err(last_os_error("Failed to bind HCI socket"));
        }

        Ok(socket)
    }

    fn set_filter(&self, filter: &HciFilter) -> Result<(), ScanError> {
        let ret = unsafe {
            libc::setsockopt(
                self.fd.as_raw_fd(),
                SOL_HCI,
                HCI_FILTER,
                filter as *const HciFilter as *const c_void,
                mem::size_of::<HciFilter>() as socklen_t,
            )
        };
        if ret < 0 {
            return Err(last_os_error("Failed to set HCI filter"));
        }
        Ok(())
    }

    fn send_le_command(&self, ocf: u16, params: &[u8]) -> Result<(), ScanError> {
        let packet = hci_command_packet(OGF_LE_CTL, ocf, params);
        let ret = unsafe {
            libc::write(
                self.fd.as_raw_fd(),
                packet.as_ptr() as *const c_void,
                packet.len(),
            )
        };
        if ret < 0 {
            return Err(last_os_error("Failed to send HCI command"));
        }
        Ok(())
    }

    fn scan_parameters() -> [u8; 7] {
        let interval = LE_SCAN_INTERVAL.to_le_bytes();
        let window = LE_SCAN_WINDOW.to_le_bytes();
        [
            LE_SCAN_ACTIVE,
            interval[0],
            interval[1],
            window[0],
            window[1],
            LE_PUBLIC_ADDRESS,
            FILTER_POLICY_ACCEPT_ALL,
        ]
    }

    fn enable_scan(&self) -> Result<(), ScanError> {
        self.send_le_command(OCF_LE_SET_SCAN_PARAMETERS, &Self::scan_parameters())?;
        // Duplicate filtering off: every advertisement is reported.
        self.send_le_command(OCF_LE_SET_SCAN_ENABLE, &[0x01, 0x00])
    }

    fn disable_scan(&self) -> Result<(), ScanError> {
        self.send_le_command(OCF_LE_SET_SCAN_ENABLE, &[0x00, 0x00])
    }
}

/// Create an HCI command packet
fn hci_command_packet(ogf: u16, ocf: u16, params: &[u8]) -> Vec<u8> {
    let opcode = (ogf << 10) | ocf;
    let mut packet = Vec::with_capacity(4 + params.len());
    packet.push(HCI_COMMAND_PKT);
    packet.extend_from_slice(&opcode.to_le_bytes());
    packet.push(params.len() as u8);
    packet.extend_from_slice(params);
    packet
}

/// Append the UUIDs packed in an AD structure of `width` bytes each.
fn push_uuids(services: &mut Vec<Uuid>, value: &[u8], width: usize) {
    for chunk in value.chunks_exact(width) {
        let uuid = if width == 2 {
            uuid_from_u16(u16::from_le_bytes([chunk[0], chunk[1]]))
        } else {
            let mut bytes = [0u8; 16];
            bytes.copy_from_slice(chunk);
            // 128-bit UUIDs are little-endian on the air.
            bytes.reverse();
            Uuid::from_bytes(bytes)
        };
        services.push(uuid);
    }
}

/// Fill `adv` from the AD structures of one advertising report.
fn parse_ad_structures(ad_data: &[u8], adv: &mut Advertisement) {
    let mut offset = 0;
    while offset < ad_data.len() {
        let len = usize::from(ad_data[offset]);
        if len == 0 || offset + 1 + len > ad_data.len() {
            break;
        }
        let ad_type = ad_data[offset + 1];
        let value = &ad_data[offset + 2..offset + 1 + len];

        match ad_type {
            AD_INCOMPLETE_UUID16 | AD_COMPLETE_UUID16 => push_uuids(&mut adv.services, value, 2),
            AD_INCOMPLETE_UUID128 | AD_COMPLETE_UUID128 => {
                push_uuids(&mut adv.services, value, 16)
            }
            AD_SHORT_NAME | AD_COMPLETE_NAME => {
                // A complete name wins over a shortened one.
                if ad_type == AD_COMPLETE_NAME || adv.local_name.is_none() {
                    adv.local_name = Some(String::from_utf8_lossy(value).into_owned());
                }
            }
            AD_SERVICE_DATA_UUID16 if value.len() >= 2 => {
                adv.service_data.get_or_insert_with(Vec::new).push(ServiceData {
                    uuid: uuid_from_u16(u16::from_le_bytes([value[0], value[1]])),
                    data: value[2..].to_vec(),
                });
            }
            AD_MANUFACTURER_DATA if value.len() >= 2 => {
                adv.manufacturer_data.insert(
                    u16::from_le_bytes([value[0], value[1]]),
                    value[2..].to_vec(),
                );
            }
            _ => {}
        }

        offset += 1 + len;
    }
}

/// One report out of an LE advertising report event.
#[derive(Debug, PartialEq)]
struct AdvertisingReport {
    event_type: u8,
    advertisement: Advertisement,
}

/// Parse every report of an LE advertising report event.
///
/// `event` is the raw packet including the HCI packet type byte. Reports
/// follow each other as `event_type addr_type addr[6] data_len data[] rssi`,
/// the layout the Linux kernel parses. A truncated report ends parsing;
/// the reports before it are kept.
fn parse_advertising_reports(event: &[u8]) -> Vec<AdvertisingReport> {
    // packet type, event code, parameter length, subevent, num_reports
    if event.len() < 5
        || event[0] != HCI_EVENT_PKT
        || event[1] != EVT_LE_META_EVENT
        || event[3] != EVT_LE_ADVERTISING_REPORT
    {
        return Vec::new();
    }
    let num_reports = usize::from(event[4]);
    let mut rest = &event[5..];
    let mut reports = Vec::with_capacity(num_reports);

    for _ in 0..num_reports {
        // event_type(1) addr_type(1) addr(6) data_len(1)
        if rest.len() < 9 {
            break;
        }
        let event_type = rest[0];
        let mut addr = [0u8; 6];
        addr.copy_from_slice(&rest[2..8]);
        addr.reverse(); // HCI uses little-endian address

        let data_len = usize::from(rest[8]);
        let (Some(ad_data), Some(&rssi)) = (rest.get(9..9 + data_len), rest.get(9 + data_len))
        else {
            break;
        };

        let mut advertisement = Advertisement {
            address: Some(MacAddress(addr)),
            rssi: Some(i16::from(rssi as i8)),
            ..Default::default()
        };
        parse_ad_structures(ad_data, &mut advertisement);
        reports.push(AdvertisingReport {
            event_type,
            advertisement,
        });

        rest = &rest[10 + data_len..];
    }
    reports
}

/// Joins scan responses with the advertisement they answer.
///
/// The last advertising packet of each device is held until its scan
/// response arrives; the response is then reported with the fields of both.
#[derive(Debug, Default)]
struct ScanResponses {
    last_advertisement: HashMap<MacAddress, Advertisement>,
}

impl ScanResponses {
    fn merge(&mut self, report: AdvertisingReport) -> Advertisement {
        let AdvertisingReport {
            event_type,
            advertisement,
        } = report;
        let Some(address) = advertisement.address else {
            return advertisement;
        };

        if event_type != ADV_SCAN_RSP {
            if self.last_advertisement.len() >= MAX_PENDING_SCAN_RESPONSES
                && !self.last_advertisement.contains_key(&address)
            {
                self.last_advertisement.clear();
            }
            self.last_advertisement.insert(address, advertisement.clone());
            return advertisement;
        }

        let Some(mut merged) = self.last_advertisement.remove(&address) else {
            return advertisement;
        };
        merged.rssi = advertisement.rssi.or(merged.rssi);
        if advertisement.local_name.is_some() {
            merged.local_name = advertisement.local_name;
        }
        merged.services.extend(advertisement.services);
        if let Some(entries) = advertisement.service_data {
            merged
                .service_data
                .get_or_insert_with(Vec::new)
                .extend(entries);
        }
        merged.manufacturer_data.extend(advertisement.manufacturer_data);
        merged
    }
}

/// Start scanning for advertisements using raw HCI sockets.
///
/// Opens one socket for events and one for commands on `hci0`, enables an
/// active scan and forwards every advertising report, scan responses joined
/// with the advertisement before them. Scanning is disabled
/// again when `cancel` fires or the receiver is dropped.
///
/// # Requirements
/// - CAP_NET_RAW and CAP_NET_ADMIN capabilities or root privileges
/// - An available HCI device (typically hci0)
pub async fn start_scan(
    cancel: CancellationToken,
) -> Result<mpsc::Receiver<AdvertisementResult>, ScanError> {
    let events = HciSocket::open(HCI_DEV_ID)?;
    events.set_filter(&HciFilter::le_meta_events())?;

    let commands = HciSocket::open(HCI_DEV_ID)?;
    commands.enable_scan()?;
    info!("active LE scan enabled on hci{HCI_DEV_ID}");

    let async_fd = AsyncFd::new(events.fd)
        .map_err(|e| ScanError::Bluetooth(format!("Failed to create async fd: {e}")))?;

    let (tx, rx) = mpsc::channel(ADVERTISEMENT_CHANNEL_BUFFER_SIZE);

    tokio::spawn(async move {
        let mut buf = [0u8; HCI_MAX_EVENT_SIZE];
        let mut responses = ScanResponses::default();

        'scan: loop {
            let mut guard = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("scan cancelled, disabling LE scan");
                    break 'scan;
                }
                ready = async_fd.readable() => match ready {
                    Ok(guard) => guard,
                    Err(e) => {
                        let _ = tx.send(Err(ScanError::Bluetooth(e.to_string()))).await;
                        break 'scan;
                    }
                },
            };

            // Drain all available packets before waiting again
            loop {
                let read = guard.try_io(|inner| {
                    let ret = unsafe {
                        libc::read(
                            inner.as_raw_fd(),
                            buf.as_mut_ptr() as *mut c_void,
                            buf.len(),
                        )
                    };
                    if ret < 0 {
                        Err(io::Error::last_os_error())
                    } else {
                        Ok(ret as usize)
                    }
                });

                let n = match read {
                    Ok(Ok(n)) if n > 0 => n,
                    Ok(Ok(_)) => {
                        let _ = tx.send(Err(ScanError::StreamClosed)).await;
                        break 'scan;
                    }
                    Ok(Err(e)) => {
                        let _ = tx.send(Err(ScanError::Bluetooth(e.to_string()))).await;
                        break 'scan;
                    }
                    Err(_would_block) => break,
                };

                for report in parse_advertising_reports(&buf[..n]) {
                    let adv = responses.merge(report);
                    if tx.send(Ok(adv)).await.is_err() {
                        debug!("advertisement receiver dropped, disabling LE scan");
                        break 'scan;
                    }
                }
            }
        }

        if let Err(e) = commands.disable_scan() {
            warn!("failed to disable LE scan: {e}");
        }
    });

    Ok(rx)
}
