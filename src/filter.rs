//! Advertisement filter selecting the meter a `get` invocation asked for.

use crate::advertisement::Advertisement;
use crate::decoder::METER_PAYLOAD_LEN;
use crate::mac_address::MacAddress;

/// Returns `true` when `event` comes from `target` and carries a decodable
/// meter payload in its first service data entry.
pub fn accepts(event: &Advertisement, target: &MacAddress) -> bool {
    let Some(address) = event.address else {
        return false;
    };
    if address != *target {
        return false;
    }

    event
        .first_service_data()
        .is_some_and(|data| data.len() >= METER_PAYLOAD_LEN)
}
