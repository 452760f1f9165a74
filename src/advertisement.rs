//! Backend-independent view of a received BLE advertisement.

use crate::mac_address::MacAddress;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Bluetooth Base UUID, used to expand 16-bit service identifiers.
const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5f9b_34fb;

/// Expand a 16-bit assigned number into a full 128-bit service UUID.
pub fn uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | (u128::from(short) << 96))
}

/// One service data entry of an advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceData {
    pub uuid: Uuid,
    pub data: Vec<u8>,
}

/// A single advertisement as seen by a scanner backend.
///
/// Fields that the backend could not read are left empty (`None`), which the
/// filter treats differently from a present but empty collection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Advertisement {
    pub address: Option<MacAddress>,
    /// Service data entries in the order the backend reported them
    pub service_data: Option<Vec<ServiceData>>,
    /// Received signal strength in dBm
    pub rssi: Option<i16>,
    pub local_name: Option<String>,
    pub services: Vec<Uuid>,
    /// Manufacturer specific data keyed by company identifier
    pub manufacturer_data: BTreeMap<u16, Vec<u8>>,
}

impl Advertisement {
    /// Payload of the first service data entry, if any.
    pub fn first_service_data(&self) -> Option<&[u8]> {
        self.service_data
            .as_ref()
            .and_then(|entries| entries.first())
            .map(|entry| entry.data.as_slice())
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for byte in bytes {
        write!(f, "{byte:02X}")?;
    }
    Ok(())
}

/// One-line summary used by the discovery mode.
impl fmt::Display for Advertisement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address {
            Some(address) => write!(f, "[{address}]")?,
            None => write!(f, "[unknown]")?,
        }
        write!(f, " RSSI: {:3},", self.rssi.unwrap_or(0))?;

        let mut separator = "";
        if let Some(name) = self.local_name.as_deref().filter(|n| !n.is_empty()) {
            write!(f, " Name: {name}")?;
            separator = ",";
        }

        if !self.services.is_empty() {
            write!(f, "{separator} Svcs: [")?;
            for (i, uuid) in self.services.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{uuid}")?;
            }
            write!(f, "]")?;
            separator = ",";
        }

        if !self.manufacturer_data.is_empty() {
            write!(f, "{separator} MD: ")?;
            // Company identifiers go out little-endian, as on the air.
            for (company, data) in &self.manufacturer_data {
                write_hex(f, &company.to_le_bytes())?;
                write_hex(f, data)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TEST_MAC, meter_advertisement};

    #[test]
    fn test_uuid_from_u16() {
        assert_eq!(
            uuid_from_u16(0x0d00).to_string(),
            "00000d00-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            uuid_from_u16(0xfd3d).to_string(),
            "0000fd3d-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_first_service_data() {
        let adv = meter_advertisement(TEST_MAC);
        assert_eq!(adv.first_service_data().map(<[u8]>::len), Some(6));

        let empty = Advertisement {
            service_data: Some(Vec::new()),
            ..Default::default()
        };
        assert_eq!(empty.first_service_data(), None);
        assert_eq!(Advertisement::default().first_service_data(), None);
    }

    #[test]
    fn test_display_address_and_rssi_only() {
        let adv = Advertisement {
            address: Some(TEST_MAC),
            rssi: Some(-7),
            ..Default::default()
        };
        assert_eq!(adv.to_string(), "[aa:bb:cc:dd:ee:ff] RSSI:  -7,");
    }

    #[test]
    fn test_display_all_fields() {
        let mut manufacturer_data = BTreeMap::new();
        manufacturer_data.insert(0x0969, vec![0xC4, 0x7C]);

        let adv = Advertisement {
            address: Some(TEST_MAC),
            service_data: None,
            rssi: Some(-70),
            local_name: Some("WoSensorTH".to_string()),
            services: vec![uuid_from_u16(0x0d00)],
            manufacturer_data,
        };
        assert_eq!(
            adv.to_string(),
            "[aa:bb:cc:dd:ee:ff] RSSI: -70, Name: WoSensorTH, \
             Svcs: [00000d00-0000-1000-8000-00805f9b34fb], MD: 6909C47C"
        );
    }

    #[test]
    fn test_display_several_services() {
        let adv = Advertisement {
            address: Some(TEST_MAC),
            rssi: Some(-70),
            services: vec![uuid_from_u16(0xfd3d), uuid_from_u16(0xcba2)],
            ..Default::default()
        };
        assert_eq!(
            adv.to_string(),
            "[aa:bb:cc:dd:ee:ff] RSSI: -70, Svcs: [0000fd3d-0000-1000-8000-00805f9b34fb, \
             0000cba2-0000-1000-8000-00805f9b34fb]"
        );
    }

    #[test]
    fn test_display_skips_empty_name() {
        let adv = Advertisement {
            address: Some(TEST_MAC),
            rssi: Some(-42),
            local_name: Some(String::new()),
            services: vec![uuid_from_u16(0xfd3d)],
            ..Default::default()
        };
        assert_eq!(
            adv.to_string(),
            "[aa:bb:cc:dd:ee:ff] RSSI: -42, Svcs: [0000fd3d-0000-1000-8000-00805f9b34fb]"
        );
    }
}
