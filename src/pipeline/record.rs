//! Record Validation
//!
//! Pure shape checks over a decoded telemetry record. Checks run in a
//! fixed order and the first failure wins, so a record missing several
//! fields always reports the same reason.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Measurement fields every record must carry, all numeric
pub const REQUIRED_MEASUREMENTS: [&str; 4] =
    ["speed_kmh", "fuel_level_pct", "engine_temp_c", "odometer_km"];

/// The fields the pipeline needs from an accepted record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRecord {
    /// Producer identity (e.g. "TRUCK-001")
    pub identity: String,
    /// Observation timestamp, normalized to UTC
    pub observed_at: DateTime<Utc>,
}

/// Why a record was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Payload is not a JSON object
    NotAnObject,
    /// `identity` missing, not a string, or empty
    MissingIdentity,
    /// `observed_at` missing or not a string
    MissingTimestamp,
    /// `observed_at` present but unparseable
    InvalidTimestamp,
    /// `position` missing or lacking numeric lat/lon
    InvalidPosition,
    /// `measurements` missing, or a required numeric field absent
    InvalidMeasurements(&'static str),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::NotAnObject => write!(f, "payload is not an object"),
            RejectReason::MissingIdentity => write!(f, "missing or empty identity"),
            RejectReason::MissingTimestamp => write!(f, "missing observed_at"),
            RejectReason::InvalidTimestamp => write!(f, "invalid timestamp"),
            RejectReason::InvalidPosition => write!(f, "missing or non-numeric position"),
            RejectReason::InvalidMeasurements(field) => {
                write!(f, "missing or non-numeric measurement: {}", field)
            }
        }
    }
}

/// Validate a decoded record. Pure: no side effects, no logging.
///
/// Returns the parsed identity and timestamp on success so the router
/// does not reparse the value.
pub fn validate(value: &Value) -> Result<ParsedRecord, RejectReason> {
    let obj = value.as_object().ok_or(RejectReason::NotAnObject)?;

    let identity = obj
        .get("identity")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(RejectReason::MissingIdentity)?;

    let observed_at = obj
        .get("observed_at")
        .and_then(Value::as_str)
        .ok_or(RejectReason::MissingTimestamp)?;
    let observed_at = DateTime::parse_from_rfc3339(observed_at)
        .map_err(|_| RejectReason::InvalidTimestamp)?
        .with_timezone(&Utc);

    let position = obj
        .get("position")
        .and_then(Value::as_object)
        .ok_or(RejectReason::InvalidPosition)?;
    if !position.get("lat").map(is_numeric).unwrap_or(false)
        || !position.get("lon").map(is_numeric).unwrap_or(false)
    {
        return Err(RejectReason::InvalidPosition);
    }

    let measurements = obj
        .get("measurements")
        .and_then(Value::as_object)
        .ok_or(RejectReason::InvalidMeasurements("measurements"))?;
    for field in REQUIRED_MEASUREMENTS {
        if !measurements.get(field).map(is_numeric).unwrap_or(false) {
            return Err(RejectReason::InvalidMeasurements(field));
        }
    }

    Ok(ParsedRecord {
        identity: identity.to_string(),
        observed_at,
    })
}

fn is_numeric(value: &Value) -> bool {
    value.is_number()
}
