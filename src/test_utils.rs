use crate::advertisement::{Advertisement, ServiceData, uuid_from_u16};
use crate::mac_address::MacAddress;
use crate::measurement::Measurement;

/// A stable MAC address for unit tests.
pub const TEST_MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

/// A second device that should never be matched.
pub const OTHER_MAC: MacAddress = MacAddress([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);

/// 21.5 degrees, 40 % humidity, 50 % battery.
pub const SAMPLE_PAYLOAD: [u8; 6] = [0x54, 0x00, 0x32, 0x05, 0x95, 0x28];

/// Same reading as [`SAMPLE_PAYLOAD`] but below zero.
pub const NEGATIVE_PAYLOAD: [u8; 6] = [0x54, 0x00, 0x32, 0x05, 0x15, 0x28];

/// The measurement encoded by [`SAMPLE_PAYLOAD`].
pub fn sample_measurement() -> Measurement {
    Measurement {
        temperature_integer: 21,
        temperature_decimal: 5,
        temperature_sign: 1,
        humidity: 40,
        battery: 50,
    }
}

/// Build a meter advertisement from `mac` carrying [`SAMPLE_PAYLOAD`].
///
/// Tests can override just the fields they care about.
pub fn meter_advertisement(mac: MacAddress) -> Advertisement {
    Advertisement {
        address: Some(mac),
        service_data: Some(vec![ServiceData {
            uuid: uuid_from_u16(0x0d00),
            data: SAMPLE_PAYLOAD.to_vec(),
        }]),
        rssi: Some(-60),
        local_name: None,
        services: vec![uuid_from_u16(0xcba2)],
        manufacturer_data: Default::default(),
    }
}
