//! Metric records.
//!
//! A [`NewRecord`] is what a collector hands to the local store; a
//! [`MetricRecord`] is what the store hands back, with the id, the
//! normalized capture time and the synced flag filled in.

use crate::timestamp::{check_range, format_timestamp, parse_timestamp_value};
use crate::{Error, MetricKind, RecordId, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Raw collector output: field name to JSON value.
pub type Sample = Map<String, Value>;

/// Measurement fields of one record, keyed by schema field name.
/// Absent fields are simply missing from the map.
pub type Fields = BTreeMap<String, FieldValue>;

/// A single measurement value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Converts a JSON value into a field value.
    ///
    /// `null` means the field is absent. Booleans become `1.0`/`0.0`, which
    /// is how the probes report up/down. Arrays and objects are rejected.
    pub fn from_json(name: &str, value: &Value) -> Result<Option<Self>> {
        match value {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(FieldValue::Number(if *b { 1.0 } else { 0.0 }))),
            Value::Number(n) => n
                .as_f64()
                .map(|f| Some(FieldValue::Number(f)))
                .ok_or_else(|| Error::Validation(format!("field {name}: unrepresentable number {n}"))),
            Value::String(s) => Ok(Some(FieldValue::Text(s.clone()))),
            Value::Array(_) | Value::Object(_) => Err(Error::Validation(format!(
                "field {name}: expected number or string, got {value}"
            ))),
        }
    }

    /// Returns the value as a float, parsing text if needed.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Returns the value as JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Text(s) => Value::String(s.clone()),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value as f64)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

/// Input to the local store's insert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    /// Capture time. The store uses the current UTC time when absent.
    pub captured_at: Option<DateTime<Utc>>,
    pub site_id: Option<String>,
    pub location: Option<String>,
    pub ip_address: Option<String>,
    pub fields: Fields,
}

impl NewRecord {
    /// Creates an empty record (no tags, no fields, timestamp defaulted).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn captured_at(mut self, ts: DateTime<Utc>) -> Self {
        self.captured_at = Some(ts);
        self
    }

    #[must_use]
    pub fn site_id(mut self, site_id: impl Into<String>) -> Self {
        self.site_id = Some(site_id.into());
        self
    }

    #[must_use]
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    #[must_use]
    pub fn ip_address(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Builds a record of `kind` from a collector sample.
    ///
    /// The reserved keys (`timestamp`, `site_id`, `location`, `ip_address`)
    /// become the record's identity; every other key must be a field of the
    /// kind's schema.
    pub fn from_sample(kind: MetricKind, sample: &Sample) -> Result<Self> {
        let mut record = NewRecord::new();

        for (key, value) in sample {
            match key.as_str() {
                "timestamp" => {
                    if !value.is_null() {
                        record.captured_at = Some(parse_timestamp_value(value)?);
                    }
                }
                "site_id" => record.site_id = tag_value(key, value)?,
                "location" => record.location = tag_value(key, value)?,
                "ip_address" => record.ip_address = tag_value(key, value)?,
                name => {
                    if let Some(field) = FieldValue::from_json(name, value)? {
                        record.fields.insert(name.to_string(), field);
                    }
                }
            }
        }

        record.validate(kind)?;
        Ok(record)
    }

    /// Checks the record against the schema of `kind`.
    ///
    /// Missing fields are fine; unknown fields, non-finite numbers and
    /// capture times past year 9999 are not.
    pub fn validate(&self, kind: MetricKind) -> Result<()> {
        if let Some(ts) = self.captured_at {
            check_range(ts)?;
        }
        let schema = kind.schema();
        for (name, value) in &self.fields {
            if !schema.has_field(name) {
                return Err(Error::Validation(format!(
                    "unknown field {name} for {kind} record"
                )));
            }
            if let FieldValue::Number(n) = value {
                if !n.is_finite() {
                    return Err(Error::Validation(format!("field {name}: non-finite value {n}")));
                }
            }
        }
        Ok(())
    }
}

fn tag_value(key: &str, value: &Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(Error::Validation(format!(
            "{key}: expected a scalar tag, got {other}"
        ))),
    }
}

/// A record as persisted in the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: RecordId,
    pub kind: MetricKind,
    pub captured_at: DateTime<Utc>,
    pub site_id: Option<String>,
    pub location: Option<String>,
    pub ip_address: Option<String>,
    pub fields: Fields,
    pub synced: bool,
}

impl MetricRecord {
    /// Returns a measurement field, if present.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Builds the row sent to a remote sink: identity, tags and every schema
    /// field (absent ones as `null`). The local `id` and `synced` columns are
    /// not part of the remote contract.
    #[must_use]
    pub fn remote_row(&self) -> Map<String, Value> {
        let mut row = Map::new();
        row.insert(
            "timestamp".to_string(),
            Value::String(format_timestamp(&self.captured_at)),
        );
        row.insert("site_id".to_string(), opt_string(&self.site_id));
        row.insert("location".to_string(), opt_string(&self.location));
        row.insert("ip_address".to_string(), opt_string(&self.ip_address));
        for name in self.kind.schema().fields {
            let value = self
                .fields
                .get(*name)
                .map(FieldValue::to_json)
                .unwrap_or(Value::Null);
            row.insert((*name).to_string(), value);
        }
        row
    }
}

fn opt_string(value: &Option<String>) -> Value {
    value.clone().map(Value::String).unwrap_or(Value::Null)
}
