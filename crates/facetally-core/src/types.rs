use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Length of every face descriptor produced by the embedding model.
pub const DESCRIPTOR_LENGTH: usize = 128;

/// Current stored profile format tag.
pub const PROFILE_VERSION: u32 = 1;

/// One registration sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capture {
    pub vector: Vec<f64>,
    /// Detector confidence in [0, 1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "timestamp::option")]
    pub captured_at: Option<DateTime<Utc>>,
}

impl Capture {
    pub fn new(vector: Vec<f64>) -> Self {
        Self {
            vector,
            score: None,
            captured_at: None,
        }
    }

    /// Clamp a raw detector score into [0, 1], dropping non-finite values.
    pub fn clamp_score(raw: f64) -> Option<f64> {
        raw.is_finite().then(|| raw.clamp(0.0, 1.0))
    }
}

/// Consolidated enrollment record for one employee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceProfile {
    pub version: u32,
    pub centroid: Vec<f64>,
    /// Retained captures, oldest first.
    pub captures: Vec<Capture>,
    pub stats: ProfileStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileStats {
    pub capture_count: usize,
    pub descriptor_length: usize,
    /// 1.0 when every capture sits on the centroid, falling towards 0 as they spread.
    pub consistency_score: f64,
    #[serde(with = "timestamp")]
    pub last_updated: DateTime<Utc>,
}

/// Parse a capture timestamp from untrusted JSON.
///
/// Accepts RFC 3339 strings, zone-less `YYYY-MM-DDTHH:MM:SS[.fff]` strings
/// (read as UTC) and integer epoch milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                        .ok()
                        .map(|naive| naive.and_utc())
                })
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

/// Format a timestamp the way stored profiles carry it: `2026-01-02T03:04:05.006Z`.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            ts: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => super::serialize(ts, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let raw = Option::<String>::deserialize(d)?;
            raw.map(|raw| {
                DateTime::parse_from_rfc3339(&raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 0).unwrap();
        assert_eq!(parse_timestamp(&json!("2026-03-01T08:30:00Z")), Some(expected));
        assert_eq!(parse_timestamp(&json!("2026-03-01T10:30:00+02:00")), Some(expected));
        assert_eq!(parse_timestamp(&json!("2026-03-01T08:30:00")), Some(expected));
        assert_eq!(
            parse_timestamp(&json!(expected.timestamp_millis())),
            Some(expected)
        );
        assert_eq!(parse_timestamp(&json!("yesterday")), None);
        assert_eq!(parse_timestamp(&json!(null)), None);
    }

    #[test]
    fn test_format_timestamp_millis_z() {
        let ts = Utc.timestamp_millis_opt(1_767_323_045_006).unwrap();
        assert_eq!(format_timestamp(&ts), "2026-01-02T03:04:05.006Z");
    }

    #[test]
    fn test_clamp_score() {
        assert_eq!(Capture::clamp_score(1.7), Some(1.0));
        assert_eq!(Capture::clamp_score(-0.2), Some(0.0));
        assert_eq!(Capture::clamp_score(0.42), Some(0.42));
        assert_eq!(Capture::clamp_score(f64::NAN), None);
    }

    #[test]
    fn test_capture_serializes_camel_case() {
        let capture = Capture {
            vector: vec![0.5, -0.5],
            score: Some(0.9),
            captured_at: Some(Utc.timestamp_millis_opt(1_767_323_045_006).unwrap()),
        };
        let value = serde_json::to_value(&capture).unwrap();
        assert_eq!(
            value,
            json!({"vector": [0.5, -0.5], "score": 0.9, "capturedAt": "2026-01-02T03:04:05.006Z"})
        );

        let bare = serde_json::to_value(Capture::new(vec![1.0])).unwrap();
        assert_eq!(bare, json!({"vector": [1.0]}));
    }
}
