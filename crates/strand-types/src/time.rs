//! Timestamp normalization.
//!
//! Every timestamp that participates in identifier derivation or signing is
//! truncated to millisecond precision and rendered as RFC 3339 with a `Z`
//! suffix, so the same instant always serializes to the same bytes.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

/// Truncate to whole milliseconds.
pub fn normalize(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(3)
}

/// Current time, already normalized.
pub fn now() -> DateTime<Utc> {
    normalize(Utc::now())
}

/// Canonical text form: `2024-05-01T12:00:00.000Z`.
pub fn format(ts: &DateTime<Utc>) -> String {
    normalize(*ts).to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse RFC 3339 text into a normalized UTC timestamp.
pub fn parse(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    Ok(normalize(DateTime::parse_from_rfc3339(text)?.with_timezone(&Utc)))
}

/// Serde adapter writing timestamps in the canonical text form.
pub mod rfc3339_millis {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn format_always_has_millis() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(format(&ts), "2024-05-01T12:00:00.000Z");
    }

    #[test]
    fn normalize_drops_sub_millisecond_precision() {
        let ts = Utc.timestamp_nanos(1_700_000_000_123_456_789);
        assert_eq!(normalize(ts).timestamp_subsec_nanos(), 123_000_000);
        assert_eq!(format(&ts), "2023-11-14T22:13:20.123Z");
    }

    #[test]
    fn parse_converts_offsets_to_utc() {
        let ts = parse("2024-05-01T14:00:00.500+02:00").unwrap();
        assert_eq!(format(&ts), "2024-05-01T12:00:00.500Z");
    }
}
