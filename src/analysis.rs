// 🧠 Vision Analysis - request/response contract of the analyze backend
// The backend extracts the act and annotates alterations; the classifier
// runs here so the client policy stays under our control.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::forensics::{null_as_default, AlterationEvent};
use crate::impact::classify;
use crate::records::{ActStatus, AnalyzedRecord, VoteCount};

const UNKNOWN: &str = "UNKNOWN";

/// Body of `POST /api/analyze`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    /// Base64 image data
    #[serde(default, alias = "base64Image")]
    pub image: String,

    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
}

impl AnalyzeRequest {
    pub fn new(image: impl Into<String>, mime_type: impl Into<String>) -> Self {
        AnalyzeRequest {
            image: image.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.image.is_empty() || self.mime_type.is_empty() {
            warn!("Rejected analyze request without image or mimeType");
            bail!("Missing image or mimeType");
        }
        Ok(())
    }
}

/// Structured extraction returned by the vision backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisionExtraction {
    #[serde(default)]
    pub mesa: Option<String>,

    #[serde(default)]
    pub zona: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub votes: Vec<VoteCount>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub total_calculated: i64,

    #[serde(default, deserialize_with = "null_as_default")]
    pub total_declared: i64,

    #[serde(default, deserialize_with = "null_as_default")]
    pub is_fraud: bool,

    #[serde(default, deserialize_with = "null_as_default")]
    pub forensic_analysis: Vec<AlterationEvent>,
}

impl VisionExtraction {
    /// Parse the backend's response text
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            bail!("No response from vision backend");
        }
        serde_json::from_str(text).context("Failed to parse vision backend response")
    }

    /// Turn the extraction into a classified record stamped at `now`
    pub fn into_record(self, config: &ClientConfig, now: DateTime<Utc>) -> AnalyzedRecord {
        let impact = classify(&self.forensic_analysis, config);

        let mut record = AnalyzedRecord::new(
            uuid::Uuid::new_v4().to_string(),
            non_empty_or_unknown(self.mesa),
            non_empty_or_unknown(self.zona),
        );
        record.votes = self.votes;
        record.total_calculated = self.total_calculated;
        record.total_declared = self.total_declared;
        record.is_fraud = self.is_fraud;
        record.alterations = self.forensic_analysis;
        record.impact = Some(impact);
        record.timestamp = now.format("%H:%M:%S").to_string();
        record.iso_timestamp = Some(now);
        record.status = ActStatus::Completed;

        info!(
            id = %record.id,
            mesa = %record.table_id,
            fraud = record.is_fraud,
            alterations = record.alterations.len(),
            "Analyzed act"
        );
        record
    }
}

fn non_empty_or_unknown(value: Option<String>) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impact::{Intent, Recommendation};

    fn now() -> DateTime<Utc> {
        "2024-05-02T10:15:30Z".parse().unwrap()
    }

    #[test]
    fn test_request_validation() {
        assert!(AnalyzeRequest::new("aGVsbG8=", "image/png").validate().is_ok());

        let err = AnalyzeRequest::new("", "image/png").validate().unwrap_err();
        assert_eq!(err.to_string(), "Missing image or mimeType");
        assert!(AnalyzeRequest::new("aGVsbG8=", "").validate().is_err());
    }

    #[test]
    fn test_request_accepts_legacy_image_key() {
        let request: AnalyzeRequest =
            serde_json::from_str(r#"{"base64Image": "abc", "mimeType": "image/jpeg"}"#).unwrap();

        assert_eq!(request.image, "abc");
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_clean_act() {
        let text = r#"{
            "mesa": "123",
            "zona": "01",
            "votes": [
                {"party": "Pacto Historico", "count": 100},
                {"party": "Centro Democratico", "count": 50}
            ],
            "total_calculated": 150,
            "total_declared": 150,
            "is_fraud": false,
            "forensic_analysis": []
        }"#;

        let record = VisionExtraction::parse(text)
            .unwrap()
            .into_record(&ClientConfig::default(), now());

        assert_eq!(record.table_id, "123");
        assert_eq!(record.total_calculated, 150);
        assert_eq!(record.votes.len(), 2);
        assert_eq!(record.impact.as_ref().map(|i| i.intent), Some(Intent::Neutral));
        assert_eq!(record.timestamp, "10:15:30");
        assert_eq!(record.iso_timestamp, Some(now()));
        assert!(!record.id.is_empty());
    }

    #[test]
    fn test_tampered_act_is_challenged() {
        let config = ClientConfig::new("Pacto", ["Centro"], false);
        let text = r#"{
            "mesa": "123",
            "zona": "01",
            "votes": [{"party": "Pacto", "count": 80}],
            "total_calculated": 80,
            "total_declared": 100,
            "is_fraud": true,
            "forensic_analysis": [{
                "type": "TACHON",
                "description": "Votes altered",
                "affected_party": "Pacto",
                "original_value_inferred": 100,
                "final_value_legible": 80,
                "confidence": 0.95
            }]
        }"#;

        let record = VisionExtraction::parse(text).unwrap().into_record(&config, now());
        let impact = record.impact.unwrap();

        assert!(record.is_fraud);
        assert_eq!(impact.intent, Intent::Prejudice);
        assert_eq!(impact.impact_score, -20);
        assert_eq!(impact.recommendation, Recommendation::Challenge);
    }

    #[test]
    fn test_missing_fields_default() {
        let record = VisionExtraction::parse(r#"{"mesa": "", "votes": null}"#)
            .unwrap()
            .into_record(&ClientConfig::default(), now());

        assert_eq!(record.table_id, "UNKNOWN");
        assert_eq!(record.zone_id, "UNKNOWN");
        assert!(record.votes.is_empty());
        assert_eq!(record.total_declared, 0);
        assert!(!record.is_fraud);
    }

    #[test]
    fn test_empty_response() {
        let err = VisionExtraction::parse("  ").unwrap_err();
        assert_eq!(err.to_string(), "No response from vision backend");
        assert!(VisionExtraction::parse("not json").is_err());
    }
}
