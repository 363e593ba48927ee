// 🔍 Forensic Findings - alterations detected on a scanned act
// Produced by the vision backend, read-only everywhere else

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Treat an explicit JSON `null` like a missing field
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Kind of visual alteration found on the document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlterationKind {
    #[serde(alias = "TACHON")]
    Erasure,
    #[serde(alias = "ENMENDADURA")]
    Amendment,
    #[serde(alias = "CALIGRAFIA")]
    Handwriting,
    #[default]
    None,
}

impl AlterationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlterationKind::Erasure => "ERASURE",
            AlterationKind::Amendment => "AMENDMENT",
            AlterationKind::Handwriting => "HANDWRITING",
            AlterationKind::None => "NONE",
        }
    }
}

impl fmt::Display for AlterationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected discrepancy with inferred before/after vote counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlterationEvent {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: AlterationKind,

    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,

    /// Party whose vote cell was altered
    #[serde(default, deserialize_with = "null_as_default")]
    pub affected_party: String,

    /// Count before the alteration, when the backend could infer it
    #[serde(default)]
    pub original_value_inferred: Option<i64>,

    /// Count as it reads now
    #[serde(default, deserialize_with = "null_as_default")]
    pub final_value_legible: i64,

    /// Backend confidence (0.0 - 1.0), not validated
    #[serde(default, deserialize_with = "null_as_default")]
    pub confidence: f64,
}

impl AlterationEvent {
    pub fn new(kind: AlterationKind, affected_party: impl Into<String>) -> Self {
        AlterationEvent {
            kind,
            description: String::new(),
            affected_party: affected_party.into(),
            original_value_inferred: None,
            final_value_legible: 0,
            confidence: 0.0,
        }
    }

    pub fn with_values(mut self, original: Option<i64>, final_value: i64) -> Self {
        self.original_value_inferred = original;
        self.final_value_legible = final_value;
        self
    }

    /// Vote-count change introduced by the alteration (missing original counts as 0)
    pub fn delta(&self) -> i64 {
        self.final_value_legible
            .saturating_sub(self.original_value_inferred.unwrap_or(0))
    }

    /// Short `KIND (party)` label used in exports
    pub fn summary(&self) -> String {
        format!("{} ({})", self.kind, self.affected_party)
    }
}
