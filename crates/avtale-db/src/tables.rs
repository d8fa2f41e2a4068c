use chrono::{DateTime, NaiveDateTime};
use redb::TableDefinition;

use avtale_core::ProviderId;

/// Table for storing providers.
/// Key: provider id
/// Value: serialized Provider as bytes
pub const PROVIDERS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("providers");

/// Table for storing requesters.
/// Key: requester id
/// Value: serialized Requester as bytes
pub const REQUESTERS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("requesters");

/// Table for storing appointments.
/// Key: appointment id
/// Value: serialized Appointment as bytes
pub const APPOINTMENTS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("appointments");

/// Table for storing login accounts.
/// Key: username
/// Value: serialized Account as bytes
pub const ACCOUNTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("accounts");

/// Index of occupied slots. Holds exactly the `Booked` appointments.
/// Key: (provider, scheduled instant) as bytes
/// Value: appointment id
pub const LIVE_SLOTS_TABLE: TableDefinition<&[u8], u64> = TableDefinition::new("live_slots");

/// Table for id counters.
/// Key: record kind
/// Value: last assigned id
pub const COUNTERS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("counters");

pub const PROVIDER_COUNTER: &str = "provider";
pub const REQUESTER_COUNTER: &str = "requester";
pub const APPOINTMENT_COUNTER: &str = "appointment";

/// Length of an encoded slot key.
pub const SLOT_KEY_LEN: usize = 20;

/// Encode a slot key (provider, instant) to bytes.
///
/// The instant is stored at full precision: whole seconds with the sign
/// bit flipped, then the subsecond nanoseconds, so keys for one provider
/// sort chronologically.
pub fn encode_slot_key(provider: ProviderId, at: NaiveDateTime) -> [u8; SLOT_KEY_LEN] {
    let utc = at.and_utc();
    let mut key = [0u8; SLOT_KEY_LEN];
    key[..8].copy_from_slice(&provider.0.to_be_bytes());
    key[8..16].copy_from_slice(&((utc.timestamp() as u64) ^ (1 << 63)).to_be_bytes());
    key[16..].copy_from_slice(&utc.timestamp_subsec_nanos().to_be_bytes());
    key
}

/// Decode a slot key from bytes. Returns `None` for malformed keys.
pub fn decode_slot_key(bytes: &[u8]) -> Option<(ProviderId, NaiveDateTime)> {
    if bytes.len() != SLOT_KEY_LEN {
        return None;
    }
    let provider = u64::from_be_bytes(bytes[..8].try_into().ok()?);
    let raw = u64::from_be_bytes(bytes[8..16].try_into().ok()?);
    let secs = (raw ^ (1 << 63)) as i64;
    let nanos = u32::from_be_bytes(bytes[16..].try_into().ok()?);
    let at = DateTime::from_timestamp(secs, nanos)?.naive_utc();
    Some((ProviderId(provider), at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn at(year: i32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, 6, 1)
            .unwrap()
            .and_hms_opt(hour, 30, 0)
            .unwrap()
    }

    #[test]
    fn test_slot_key_decodes() {
        let key = encode_slot_key(ProviderId(42), at(2025, 10));
        assert_eq!(decode_slot_key(&key), Some((ProviderId(42), at(2025, 10))));
        assert_eq!(decode_slot_key(&key[..8]), None);
    }

    #[test]
    fn test_slot_key_ordering() {
        // Provider first, then time; pre-1970 instants sort before later ones
        let k1 = encode_slot_key(ProviderId(1), at(1960, 9));
        let k2 = encode_slot_key(ProviderId(1), at(2025, 9));
        let k3 = encode_slot_key(ProviderId(1), at(2025, 10));
        let k4 = encode_slot_key(ProviderId(2), at(1960, 9));

        assert!(k1 < k2);
        assert!(k2 < k3);
        assert!(k3 < k4);
    }

    #[test]
    fn test_slot_key_keeps_subsecond_precision() {
        let base = at(2025, 10);
        let a = base + Duration::microseconds(100);
        let b = base + Duration::microseconds(200);

        let ka = encode_slot_key(ProviderId(7), a);
        let kb = encode_slot_key(ProviderId(7), b);
        assert_ne!(ka, kb);
        assert!(ka < kb);
        assert_eq!(decode_slot_key(&kb), Some((ProviderId(7), b)));

        // Whole seconds before 1970 still order by nanoseconds within the second
        let old = at(1960, 9);
        assert!(
            encode_slot_key(ProviderId(7), old)
                < encode_slot_key(ProviderId(7), old + Duration::nanoseconds(1))
        );
    }
}
