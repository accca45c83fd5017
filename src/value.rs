//! JSON ⇄ DuckDB value conversion
//!
//! Inbound values (statement parameters and appender cells) are scalars only:
//! null, booleans, numbers and strings. Outbound values cover every type a
//! result column can carry, with temporal types rendered as ISO-8601 text and
//! blobs as base64.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use duckdb::types::{TimeUnit, Value};
use serde_json::{Map, Number, Value as Json};

/// Days between 0001-01-01 (CE day 1) and the Unix epoch.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Error converting a JSON argument into a DuckDB value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    #[error("{0} values are not supported")]
    Unsupported(&'static str),
}

/// Error converting a result cell into JSON
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScanError {
    #[error("non-finite float {0}")]
    NonFinite(f64),

    #[error("{kind} out of range: {raw}")]
    OutOfRange { kind: &'static str, raw: i64 },

    #[error("unsupported column type: {0}")]
    Unsupported(String),
}

// ============================================================================
// Inbound
// ============================================================================

/// Convert one JSON scalar into a bindable DuckDB value.
pub fn from_json(value: &Json) -> Result<Value, ValueError> {
    match value {
        Json::Null => Ok(Value::Null),
        Json::Bool(b) => Ok(Value::Boolean(*b)),
        Json::Number(n) => Ok(number_to_value(n)),
        Json::String(s) => Ok(Value::Text(s.clone())),
        Json::Array(_) => Err(ValueError::Unsupported("nested list")),
        Json::Object(_) => Err(ValueError::Unsupported("object")),
    }
}

/// Convert a JSON list of scalars, preserving order.
pub fn from_json_list(values: &[Json]) -> Result<Vec<Value>, ValueError> {
    values.iter().map(from_json).collect()
}

fn number_to_value(n: &Number) -> Value {
    if let Some(i) = n.as_i64() {
        Value::BigInt(i)
    } else if let Some(u) = n.as_u64() {
        Value::UBigInt(u)
    } else {
        // serde_json numbers without arbitrary_precision are always one of the three
        Value::Double(n.as_f64().unwrap_or(f64::NAN))
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// Convert a full result row into a JSON array.
pub fn row_to_json(row: &[Value]) -> Result<Json, ScanError> {
    row.iter().map(to_json).collect::<Result<Vec<_>, _>>().map(Json::Array)
}

/// Convert one result cell into JSON.
pub fn to_json(value: &Value) -> Result<Json, ScanError> {
    let json = match value {
        Value::Null => Json::Null,
        Value::Boolean(b) => Json::Bool(*b),
        Value::TinyInt(v) => Json::from(*v),
        Value::SmallInt(v) => Json::from(*v),
        Value::Int(v) => Json::from(*v),
        Value::BigInt(v) => Json::from(*v),
        Value::UTinyInt(v) => Json::from(*v),
        Value::USmallInt(v) => Json::from(*v),
        Value::UInt(v) => Json::from(*v),
        Value::UBigInt(v) => Json::from(*v),
        Value::HugeInt(v) => huge_to_json(*v),
        // Go through the shortest decimal form so 0.1f32 stays 0.1
        Value::Float(v) => float_to_json(v.to_string().parse().unwrap_or(f64::from(*v)))?,
        Value::Double(v) => float_to_json(*v)?,
        Value::Decimal(d) => Json::String(d.to_string()),
        Value::Text(s) | Value::Enum(s) => Json::String(s.clone()),
        Value::Blob(bytes) => Json::String(STANDARD.encode(bytes)),
        Value::Timestamp(unit, raw) => Json::String(timestamp_to_string(*unit, *raw)?),
        Value::Date32(days) => Json::String(date_to_string(*days)?),
        Value::Time64(unit, raw) => Json::String(time_to_string(*unit, *raw)?),
        Value::Interval {
            months,
            days,
            nanos,
        } => serde_json::json!({
            "months": months,
            "days": days,
            "micros": nanos / 1_000,
        }),
        Value::List(items) | Value::Array(items) => {
            Json::Array(items.iter().map(to_json).collect::<Result<_, _>>()?)
        }
        Value::Struct(fields) => {
            let mut object = Map::new();
            for (name, field) in fields.keys().zip(fields.values()) {
                object.insert(name.clone(), to_json(field)?);
            }
            Json::Object(object)
        }
        Value::Map(entries) => {
            let mut pairs = Vec::new();
            for (key, item) in entries.keys().zip(entries.values()) {
                pairs.push(Json::Array(vec![to_json(key)?, to_json(item)?]));
            }
            Json::Array(pairs)
        }
        Value::Union(inner) => to_json(inner)?,
        #[allow(unreachable_patterns)]
        other => return Err(ScanError::Unsupported(format!("{other:?}"))),
    };
    Ok(json)
}

fn huge_to_json(v: i128) -> Json {
    if let Ok(i) = i64::try_from(v) {
        Json::from(i)
    } else if let Ok(u) = u64::try_from(v) {
        Json::from(u)
    } else {
        Json::String(v.to_string())
    }
}

fn float_to_json(v: f64) -> Result<Json, ScanError> {
    Number::from_f64(v)
        .map(Json::Number)
        .ok_or(ScanError::NonFinite(v))
}

fn to_micros(unit: TimeUnit, raw: i64) -> i64 {
    match unit {
        TimeUnit::Second => raw.saturating_mul(1_000_000),
        TimeUnit::Millisecond => raw.saturating_mul(1_000),
        TimeUnit::Microsecond => raw,
        TimeUnit::Nanosecond => raw / 1_000,
    }
}

fn timestamp_to_string(unit: TimeUnit, raw: i64) -> Result<String, ScanError> {
    let ts = if let TimeUnit::Nanosecond = unit {
        Some(DateTime::<Utc>::from_timestamp_nanos(raw))
    } else {
        DateTime::<Utc>::from_timestamp_micros(to_micros(unit, raw))
    };
    ts.map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        .ok_or(ScanError::OutOfRange {
            kind: "timestamp",
            raw,
        })
}

fn date_to_string(days: i32) -> Result<String, ScanError> {
    days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .ok_or(ScanError::OutOfRange {
            kind: "date",
            raw: i64::from(days),
        })
}

fn time_to_string(unit: TimeUnit, raw: i64) -> Result<String, ScanError> {
    let micros = to_micros(unit, raw);
    let secs = u32::try_from(micros.div_euclid(1_000_000)).ok();
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    secs.and_then(|s| NaiveTime::from_num_seconds_from_midnight_opt(s, nanos))
        .map(|t| t.format("%H:%M:%S%.f").to_string())
        .ok_or(ScanError::OutOfRange { kind: "time", raw })
}
