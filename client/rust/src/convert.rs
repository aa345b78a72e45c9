//! Conversion helpers for protobuf types.

use chrono::{DateTime, Utc};
use prost_types::Timestamp;

use crate::error::{ClientError, Result};

/// Parse an RFC3339 timestamp string into a protobuf Timestamp.
///
/// # Examples
/// ```
/// use telemetry_gateway_client::convert::parse_timestamp;
/// let ts = parse_timestamp("2024-01-15T10:30:00Z").unwrap();
/// assert_eq!(ts.seconds, 1705314600);
/// ```
pub fn parse_timestamp(rfc3339: &str) -> Result<Timestamp> {
    let dt: DateTime<Utc> = rfc3339
        .parse()
        .map_err(|e| ClientError::InvalidTimestamp(format!("{}: {}", rfc3339, e)))?;

    Ok(datetime_to_timestamp(dt))
}

pub fn datetime_to_timestamp(dt: DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: dt.timestamp(),
        nanos: dt.timestamp_subsec_nanos() as i32,
    }
}

/// Convert a protobuf Timestamp to a UTC datetime.
///
/// Returns `None` for timestamps outside chrono's range or with
/// out-of-range nanos.
pub fn timestamp_to_datetime(ts: &Timestamp) -> Option<DateTime<Utc>> {
    let nanos = u32::try_from(ts.nanos).ok()?;
    DateTime::from_timestamp(ts.seconds, nanos)
}
