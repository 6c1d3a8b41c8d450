use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// One drained record together with where and when the agent received it.
///
/// The payload is carried untouched; JSON output base64-encodes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRecord {
    pub seq: u64,
    pub received_at: DateTime<Utc>,
    pub len: usize,
    #[serde(serialize_with = "serialize_base64")]
    pub data: Bytes,
}

impl EventRecord {
    pub fn new(seq: u64, data: Bytes) -> Self {
        Self::with_timestamp(seq, Utc::now(), data)
    }

    pub fn with_timestamp(seq: u64, received_at: DateTime<Utc>, data: Bytes) -> Self {
        Self {
            seq,
            received_at,
            len: data.len(),
            data,
        }
    }

    /// Lowercase hex rendering of the payload.
    pub fn hex(&self) -> String {
        use std::fmt::Write as _;

        self.data
            .iter()
            .fold(String::with_capacity(self.data.len() * 2), |mut out, b| {
                let _ = write!(out, "{:02x}", b);
                out
            })
    }
}

fn serialize_base64<S>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&STANDARD.encode(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed(seq: u64, data: &'static [u8]) -> EventRecord {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        EventRecord::with_timestamp(seq, at, Bytes::from_static(data))
    }

    #[test]
    fn json_carries_payload_as_base64() {
        let record = fixed(7, b"\x00\x01hello\xff");
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["seq"], 7);
        assert_eq!(json["len"], 8);
        assert_eq!(json["data"], "AAFoZWxsb/8=");
        assert_eq!(json["received_at"], "2024-05-01T12:00:00Z");
    }

    #[test]
    fn base64_round_trips_bytes_exactly() {
        let payload: Vec<u8> = (0..=255u8).collect();
        let record = EventRecord::new(0, Bytes::from(payload.clone()));
        let json = serde_json::to_value(&record).unwrap();
        let decoded = STANDARD.decode(json["data"].as_str().unwrap()).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn hex_is_lowercase_and_padded() {
        assert_eq!(fixed(0, b"\x00\x0a\xff").hex(), "000aff");
    }
}
