use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::forensics::{null_as_default, AlterationEvent};
use crate::impact::ImpactResult;

/// Votes read for one party on the act
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCount {
    pub party: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub count: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActStatus {
    Queued,
    Processing,
    #[default]
    Completed,
    Failed,
}

impl ActStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActStatus::Queued => "queued",
            ActStatus::Processing => "processing",
            ActStatus::Completed => "completed",
            ActStatus::Failed => "failed",
        }
    }
}

/// One audited election act (E-14 form)
/// Field names on the wire match the dashboard's JSON, which is also
/// what export column keys refer to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedRecord {
    // ========================================================================
    // IDENTITY
    // ========================================================================
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,

    /// Voting table identifier
    #[serde(rename = "mesa", default, deserialize_with = "null_as_default")]
    pub table_id: String,

    /// Zone identifier
    #[serde(rename = "zona", default, deserialize_with = "null_as_default")]
    pub zone_id: String,

    // ========================================================================
    // TOTALS
    // ========================================================================
    #[serde(default, deserialize_with = "null_as_default")]
    pub votes: Vec<VoteCount>,

    /// Sum of the per-party counts
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_calculated: i64,

    /// Total written on the form
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_declared: i64,

    #[serde(default, deserialize_with = "null_as_default")]
    pub is_fraud: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_legible: Option<bool>,

    // ========================================================================
    // FORENSICS
    // ========================================================================
    #[serde(rename = "forensic_analysis", default, deserialize_with = "null_as_default")]
    pub alterations: Vec<AlterationEvent>,

    #[serde(rename = "strategic_analysis", default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<ImpactResult>,

    // ========================================================================
    // TIME + PROCESSING
    // ========================================================================
    /// Display time (wall clock, as shown in the dashboard)
    #[serde(default, deserialize_with = "null_as_default")]
    pub timestamp: String,

    #[serde(rename = "isoTimestamp", default, skip_serializing_if = "Option::is_none")]
    pub iso_timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub status: ActStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,

    /// Anything else the producer attached; exportable by key
    #[serde(flatten)]
    pub metadata: HashMap<String, serde_json::Value>,
}

// ============================================================================
// FIELD VALUES
// ============================================================================

/// Runtime-typed value of a record field.
/// Only `Text` is quoted on export, whatever the text contains.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl FieldValue {
    pub fn empty() -> Self {
        FieldValue::Text(String::new())
    }

    fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => FieldValue::empty(),
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => FieldValue::Float(n.as_f64().unwrap_or(0.0)),
            },
            Value::String(s) => FieldValue::Text(s.clone()),
            other => FieldValue::Text(other.to_string()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_else(FieldValue::empty)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Integer(i)
    }
}

impl From<u64> for FieldValue {
    fn from(u: u64) -> Self {
        i64::try_from(u).map_or(FieldValue::Float(u as f64), FieldValue::Integer)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

fn json_text<T: Serialize>(value: &T) -> FieldValue {
    serde_json::to_string(value).map_or_else(|_| FieldValue::empty(), FieldValue::Text)
}

impl AnalyzedRecord {
    /// Empty completed record with the given identity
    pub fn new(id: impl Into<String>, table_id: impl Into<String>, zone_id: impl Into<String>) -> Self {
        AnalyzedRecord {
            id: id.into(),
            table_id: table_id.into(),
            zone_id: zone_id.into(),
            votes: Vec::new(),
            total_calculated: 0,
            total_declared: 0,
            is_fraud: false,
            is_legible: None,
            alterations: Vec::new(),
            impact: None,
            timestamp: String::new(),
            iso_timestamp: None,
            image_url: None,
            status: ActStatus::Completed,
            processing_time_ms: None,
            metadata: HashMap::new(),
        }
    }

    /// Look up a field by its wire name.
    /// Missing optional fields and unknown keys resolve to empty text.
    pub fn field(&self, key: &str) -> FieldValue {
        match key {
            "id" => self.id.as_str().into(),
            "mesa" => self.table_id.as_str().into(),
            "zona" => self.zone_id.as_str().into(),
            "total_calculated" => self.total_calculated.into(),
            "total_declared" => self.total_declared.into(),
            "is_fraud" => self.is_fraud.into(),
            "is_legible" => self.is_legible.into(),
            "timestamp" => self.timestamp.as_str().into(),
            "isoTimestamp" => self
                .iso_timestamp
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
                .into(),
            "image_url" => self.image_url.as_deref().into(),
            "status" => self.status.as_str().into(),
            "processing_time_ms" => self.processing_time_ms.into(),
            "votes" => json_text(&self.votes),
            "forensic_analysis" => json_text(&self.alterations),
            "strategic_analysis" => self.impact.as_ref().map_or_else(FieldValue::empty, json_text),
            other => self
                .metadata
                .get(other)
                .map_or_else(FieldValue::empty, FieldValue::from_json),
        }
    }

    /// Declared total differs from the sum of the counts
    pub fn has_arithmetic_mismatch(&self) -> bool {
        self.total_calculated != self.total_declared
    }
}

// ============================================================================
// LOADING
// ============================================================================

/// Load records from a JSON array file
pub fn load_records<P: AsRef<Path>>(path: P) -> Result<Vec<AnalyzedRecord>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read records file: {:?}", path.as_ref()))?;

    parse_records(&content).with_context(|| format!("Invalid records in {:?}", path.as_ref()))
}

pub fn parse_records(json: &str) -> Result<Vec<AnalyzedRecord>> {
    serde_json::from_str(json).context("Failed to parse records JSON")
}

// ============================================================================
// TESTS
// ============================================================================
