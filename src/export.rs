// 📤 CSV Export - analyzed records → CSV chunks
// Text cells are always quoted (with formula-injection guard), other cells are bare.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use tracing::{debug, info};

use crate::records::{AnalyzedRecord, FieldValue};

/// Leading characters a spreadsheet would read as a formula
const FORMULA_TRIGGERS: [char; 4] = ['=', '+', '-', '@'];

// ============================================================================
// COLUMN RESOLVERS
// ============================================================================

type Extractor = fn(&AnalyzedRecord) -> FieldValue;

/// Columns computed from the record rather than read from a field
const DERIVED_COLUMNS: &[(&str, Extractor)] = &[
    ("strategic_intent", strategic_intent),
    ("strategic_recommendation", strategic_recommendation),
    ("forensic_summary", forensic_summary),
];

fn strategic_intent(record: &AnalyzedRecord) -> FieldValue {
    record
        .impact
        .as_ref()
        .map_or("N/A", |i| i.intent.as_str())
        .into()
}

fn strategic_recommendation(record: &AnalyzedRecord) -> FieldValue {
    record
        .impact
        .as_ref()
        .map_or("N/A", |i| i.recommendation.as_str())
        .into()
}

fn forensic_summary(record: &AnalyzedRecord) -> FieldValue {
    if record.alterations.is_empty() {
        return "None".into();
    }

    record
        .alterations
        .iter()
        .map(|e| e.summary())
        .collect::<Vec<_>>()
        .join("; ")
        .into()
}

/// How one export column gets its value, chosen once per column
#[derive(Clone)]
pub enum ColumnResolver {
    Derived(Extractor),
    Field(String),
}

impl fmt::Debug for ColumnResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnResolver::Derived(_) => f.write_str("Derived"),
            ColumnResolver::Field(key) => f.debug_tuple("Field").field(key).finish(),
        }
    }
}

impl ColumnResolver {
    pub fn for_key(key: &str) -> Self {
        DERIVED_COLUMNS
            .iter()
            .find(|(name, _)| *name == key)
            .map_or_else(|| ColumnResolver::Field(key.to_string()), |(_, f)| ColumnResolver::Derived(*f))
    }

    pub fn resolve(&self, record: &AnalyzedRecord) -> FieldValue {
        match self {
            ColumnResolver::Derived(extract) => extract(record),
            ColumnResolver::Field(key) => record.field(key),
        }
    }
}

/// Names of the derived columns
pub fn derived_column_keys() -> impl Iterator<Item = &'static str> {
    DERIVED_COLUMNS.iter().map(|(name, _)| *name)
}

// ============================================================================
// CELL FORMATTING
// ============================================================================

/// Render one cell
pub fn format_cell(value: &FieldValue) -> String {
    match value {
        FieldValue::Text(text) => quote_text(text),
        FieldValue::Integer(i) => i.to_string(),
        FieldValue::Float(f) => format_float(*f),
        FieldValue::Bool(b) => b.to_string(),
    }
}

fn quote_text(text: &str) -> String {
    let guarded = text.starts_with(&FORMULA_TRIGGERS[..]);

    let mut out = String::with_capacity(text.len() + 3);
    out.push('"');
    if guarded {
        out.push('\'');
    }
    for ch in text.chars() {
        if ch == '"' {
            out.push('"');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        // f64 Display already drops a trailing ".0"
        f.to_string()
    }
}

// ============================================================================
// CSV GENERATION
// ============================================================================

/// Build CSV text as chunks: header, "\n", then one row + "\n" per record.
pub fn generate_csv_chunks<'a, I, S>(records: I, columns: &[S]) -> Vec<String>
where
    I: IntoIterator<Item = &'a AnalyzedRecord>,
    S: AsRef<str>,
{
    let resolvers: Vec<ColumnResolver> = columns
        .iter()
        .map(|c| ColumnResolver::for_key(c.as_ref()))
        .collect();

    let header = columns.iter().map(|c| c.as_ref()).collect::<Vec<&str>>().join(",");
    let mut chunks = vec![header, "\n".to_string()];

    for record in records {
        let row: Vec<String> = resolvers
            .iter()
            .map(|r| format_cell(&r.resolve(record)))
            .collect();
        chunks.push(row.join(","));
        chunks.push("\n".to_string());
    }

    debug!(
        columns = columns.len(),
        rows = chunks.len() / 2 - 1,
        "Generated CSV chunks"
    );
    chunks
}

/// Stream the CSV chunks into `writer`
pub fn write_csv<'a, W, I, S>(writer: &mut W, records: I, columns: &[S]) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a AnalyzedRecord>,
    S: AsRef<str>,
{
    for chunk in generate_csv_chunks(records, columns) {
        writer
            .write_all(chunk.as_bytes())
            .context("Failed to write CSV output")?;
    }
    writer.flush().context("Failed to flush CSV output")?;
    Ok(())
}

/// Download name for an export made on `date`
pub fn export_filename(date: NaiveDate) -> String {
    format!("auditor_export_{}.csv", date.format("%Y-%m-%d"))
}

// ============================================================================
// EXPORT CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSelection {
    pub key: String,
    pub selected: bool,
}

impl ColumnSelection {
    fn on(key: &str) -> Self {
        ColumnSelection {
            key: key.to_string(),
            selected: true,
        }
    }
}

/// What the user picked in the export dialog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default)]
    pub start_date: Option<NaiveDate>,

    /// Inclusive: the whole end day is exported
    #[serde(default)]
    pub end_date: Option<NaiveDate>,

    /// Ordered column toggles
    #[serde(default = "default_columns")]
    pub columns: Vec<ColumnSelection>,
}

fn default_columns() -> Vec<ColumnSelection> {
    [
        "id",
        "mesa",
        "zona",
        "total_calculated",
        "total_declared",
        "is_fraud",
        "timestamp",
        "strategic_intent",
        "strategic_recommendation",
        "forensic_summary",
    ]
    .into_iter()
    .map(ColumnSelection::on)
    .collect()
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            start_date: None,
            end_date: None,
            columns: default_columns(),
        }
    }
}

impl ExportConfig {
    /// Export only the given columns, in that order
    pub fn with_columns<S: AsRef<str>>(columns: &[S]) -> Self {
        ExportConfig {
            columns: columns.iter().map(|c| ColumnSelection::on(c.as_ref())).collect(),
            ..Default::default()
        }
    }

    pub fn selected_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.selected)
            .map(|c| c.key.as_str())
            .collect()
    }

    pub fn set_column(&mut self, key: &str, selected: bool) {
        match self.columns.iter_mut().find(|c| c.key == key) {
            Some(column) => column.selected = selected,
            None => self.columns.push(ColumnSelection {
                key: key.to_string(),
                selected,
            }),
        }
    }

    pub fn has_date_filter(&self) -> bool {
        self.start_date.is_some() || self.end_date.is_some()
    }

    /// Inclusive time window; `today` fills in a missing end date
    pub fn window(&self, today: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self
            .start_date
            .or_else(|| NaiveDate::from_ymd_opt(2000, 1, 1))
            .unwrap_or(NaiveDate::MIN);
        let end = self.end_date.unwrap_or(today);
        let end_of_day = end
            .and_hms_milli_opt(23, 59, 59, 999)
            .unwrap_or_else(|| end.and_time(NaiveTime::MIN));

        (
            Utc.from_utc_datetime(&start.and_time(NaiveTime::MIN)),
            Utc.from_utc_datetime(&end_of_day),
        )
    }

    /// Does `record` fall inside the date range?
    /// Records without an ISO timestamp only pass when no range is set.
    pub fn includes(&self, record: &AnalyzedRecord, today: NaiveDate) -> bool {
        if !self.has_date_filter() {
            return true;
        }

        let (start, end) = self.window(today);
        record
            .iso_timestamp
            .is_some_and(|t| t >= start && t <= end)
    }

    /// Filter `records` and serialize the selected columns
    pub fn export(&self, records: &[AnalyzedRecord], today: NaiveDate) -> Vec<String> {
        let columns = self.selected_columns();
        let chunks = generate_csv_chunks(
            records.iter().filter(|r| self.includes(r, today)),
            &columns,
        );

        info!(
            records = chunks.len() / 2 - 1,
            total = records.len(),
            columns = columns.len(),
            "Exported records to CSV"
        );
        chunks
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forensics::{AlterationEvent, AlterationKind};
    use crate::impact::{ImpactResult, Intent, Recommendation};

    fn mock_records() -> Vec<AnalyzedRecord> {
        let mut first = AnalyzedRecord::new("act-1", "Mesa 1", "Zona A");
        first.total_calculated = 100;
        first.total_declared = 100;
        first.impact = Some(ImpactResult {
            intent: Intent::Benefit,
            impact_score: 10,
            recommendation: Recommendation::Challenge,
            legal_grounding: None,
        });
        first.timestamp = "2023-01-01T12:00:00Z".to_string();
        first.iso_timestamp = "2023-01-01T12:00:00Z".parse().ok();

        let mut second = AnalyzedRecord::new("act-2", "Mesa 2", "Zona B");
        second.total_calculated = 200;
        second.total_declared = 220;
        second.is_fraud = true;
        second.alterations = vec![
            AlterationEvent::new(AlterationKind::Erasure, "Party X").with_values(Some(10), 20),
        ];
        second.timestamp = "2023-01-01T13:00:00Z".to_string();
        second.iso_timestamp = "2023-01-01T13:00:00Z".parse().ok();

        vec![first, second]
    }

    fn row(record: AnalyzedRecord, columns: &[&str]) -> String {
        generate_csv_chunks(&[record], columns).remove(2)
    }

    #[test]
    fn test_headers_only() {
        let records: Vec<AnalyzedRecord> = Vec::new();
        let chunks = generate_csv_chunks(&records, &["id", "mesa"]);

        assert_eq!(chunks, vec!["id,mesa".to_string(), "\n".to_string()]);
    }

    #[test]
    fn test_basic_rows() {
        let chunks = generate_csv_chunks(&mock_records(), &["id", "mesa", "total_calculated"]);

        assert_eq!(chunks.len(), 6);
        assert_eq!(chunks[0], "id,mesa,total_calculated");
        assert_eq!(chunks[2], r#""act-1","Mesa 1",100"#);
        assert_eq!(chunks[3], "\n");
        assert_eq!(chunks[4], r#""act-2","Mesa 2",200"#);
        assert_eq!(chunks[5], "\n");
    }

    #[test]
    fn test_strategic_columns() {
        let chunks = generate_csv_chunks(
            &mock_records(),
            &["id", "strategic_intent", "strategic_recommendation"],
        );

        assert_eq!(chunks[2], r#""act-1","BENEFIT","CHALLENGE""#);
        assert_eq!(chunks[4], r#""act-2","N/A","N/A""#);
    }

    #[test]
    fn test_forensic_summary() {
        let chunks = generate_csv_chunks(&mock_records(), &["id", "forensic_summary"]);

        assert_eq!(chunks[2], r#""act-1","None""#);
        assert_eq!(chunks[4], r#""act-2","ERASURE (Party X)""#);
    }

    #[test]
    fn test_forensic_summary_joins_events() {
        let mut record = AnalyzedRecord::new("a", "m", "z");
        record.alterations = vec![
            AlterationEvent::new(AlterationKind::Erasure, "A"),
            AlterationEvent::new(AlterationKind::Handwriting, "B"),
        ];

        assert_eq!(
            row(record, &["forensic_summary"]),
            r#""ERASURE (A); HANDWRITING (B)""#
        );
    }

    #[test]
    fn test_quote_escaping_and_commas() {
        let record = AnalyzedRecord::new(r#"act-"quote""#, "Mesa, with comma", "z");

        assert_eq!(
            row(record, &["id", "mesa"]),
            r#""act-""quote""","Mesa, with comma""#
        );
    }

    #[test]
    fn test_empty_and_missing_values_are_quoted() {
        let record = AnalyzedRecord::new("act-1", "", "");

        assert_eq!(
            row(record, &["id", "mesa", "zona", "no_such_column", "image_url"]),
            r#""act-1","","","","""#
        );
    }

    #[test]
    fn test_formula_injection_guard() {
        for (input, expected) in [
            ("=SUM(1,2)", r#""'=SUM(1,2)""#),
            ("+1", r#""'+1""#),
            ("-2", r#""'-2""#),
            ("@cmd", r#""'@cmd""#),
            ("=\"x\"", r#""'=""x""""#),
            ("a=b", r#""a=b""#),
        ] {
            let record = AnalyzedRecord::new("id", input, "z");
            assert_eq!(row(record, &["mesa"]), expected, "input {input:?}");
        }
    }

    #[test]
    fn test_control_characters_kept_verbatim() {
        let record = AnalyzedRecord::new("id", "line1\nline2\r\tend", "z");

        assert_eq!(row(record, &["mesa"]), "\"line1\nline2\r\tend\"");
    }

    #[test]
    fn test_type_governs_quoting_not_content() {
        let mut record = AnalyzedRecord::new("12345", "007", "z");
        record.total_declared = -5;
        record.is_fraud = true;
        record.metadata.insert("ratio".into(), serde_json::json!(14.2));

        assert_eq!(
            row(record, &["id", "mesa", "total_declared", "is_fraud", "ratio"]),
            r#""12345","007",-5,true,14.2"#
        );
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_cell(&FieldValue::Float(100.0)), "100");
        assert_eq!(format_cell(&FieldValue::Float(0.5)), "0.5");
        assert_eq!(format_cell(&FieldValue::Float(f64::INFINITY)), "Infinity");
    }

    #[test]
    fn test_resolver_dispatch() {
        assert!(matches!(ColumnResolver::for_key("forensic_summary"), ColumnResolver::Derived(_)));
        assert!(matches!(ColumnResolver::for_key("mesa"), ColumnResolver::Field(ref k) if k == "mesa"));
        assert_eq!(derived_column_keys().count(), 3);
    }

    #[test]
    fn test_round_trip_with_csv_reader() {
        let mut tricky = AnalyzedRecord::new(r#"act-"quote""#, "Mesa, with comma", "multi\nline");
        tricky.timestamp = "=HYPERLINK(\"x\")".to_string();
        let records = vec![tricky.clone(), AnalyzedRecord::new("plain", "", "tab\there")];
        let columns = ["id", "mesa", "zona", "timestamp", "total_declared"];

        let mut out = Vec::new();
        write_csv(&mut out, &records, &columns).unwrap();

        let mut reader = csv::Reader::from_reader(out.as_slice());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), columns);

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), records.len());

        assert_eq!(&rows[0][0], tricky.id);
        assert_eq!(&rows[0][1], tricky.table_id);
        assert_eq!(&rows[0][2], tricky.zone_id);
        // The injection guard is the only lossy transform
        assert_eq!(&rows[0][3], format!("'{}", tricky.timestamp));
        assert_eq!(&rows[0][4], "0");
        assert_eq!(&rows[1][1], "");
        assert_eq!(&rows[1][2], "tab\there");
    }

    #[test]
    fn test_round_trip_generated_text() {
        let heads = ["", "=", "+", "-", "@", "\"", "'", " ="];
        let bodies = [
            "", "a", "\"", "\"\"", ",", "\r\n", "\n", "\r", "\t", "x\"y,z\nw", "SUM(A1)", "ñandú",
        ];
        let tails = ["", "\"", "\r", ",", "\n\n"];

        let mut values = Vec::new();
        for head in heads {
            for body in bodies {
                for tail in tails {
                    values.push(format!("{head}{body}{tail}"));
                }
            }
        }

        let records: Vec<AnalyzedRecord> = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut record = AnalyzedRecord::new(v.clone(), v.clone(), format!("z{v}"));
                record.total_declared = i as i64;
                record
            })
            .collect();
        let columns = ["id", "mesa", "total_declared", "zona"];

        let mut out = Vec::new();
        write_csv(&mut out, &records, &columns).unwrap();

        let mut reader = csv::Reader::from_reader(out.as_slice());
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), values.len());

        for (i, (row, value)) in rows.iter().zip(&values).enumerate() {
            let expected = if value.starts_with(&FORMULA_TRIGGERS[..]) {
                format!("'{value}")
            } else {
                value.clone()
            };

            assert_eq!(row.len(), columns.len(), "row {i} for {value:?}");
            assert_eq!(&row[0], expected, "id for {value:?}");
            assert_eq!(&row[1], expected, "mesa for {value:?}");
            assert_eq!(&row[2], i.to_string());
            assert_eq!(&row[3], format!("z{value}"), "zona for {value:?}");
        }
    }

    #[test]
    fn test_export_filename() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(export_filename(date), "auditor_export_2024-03-09.csv");
    }

    #[test]
    fn test_config_column_selection_keeps_order() {
        let mut config = ExportConfig::default();
        config.set_column("zona", false);
        config.set_column("isoTimestamp", true);

        let selected = config.selected_columns();

        assert_eq!(selected[0], "id");
        assert_eq!(selected[1], "mesa");
        assert!(!selected.contains(&"zona"));
        assert_eq!(selected.last(), Some(&"isoTimestamp"));
    }

    #[test]
    fn test_config_date_filter_includes_end_day() {
        let today = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        let mut late = AnalyzedRecord::new("late", "m", "z");
        late.iso_timestamp = "2023-01-01T23:59:59.500Z".parse().ok();
        let mut next_day = AnalyzedRecord::new("next", "m", "z");
        next_day.iso_timestamp = "2023-01-02T00:00:00Z".parse().ok();
        let undated = AnalyzedRecord::new("undated", "m", "z");

        let config = ExportConfig {
            start_date: NaiveDate::from_ymd_opt(2023, 1, 1),
            end_date: NaiveDate::from_ymd_opt(2023, 1, 1),
            ..ExportConfig::with_columns(&["id"])
        };

        assert!(config.includes(&late, today));
        assert!(!config.includes(&next_day, today));
        assert!(!config.includes(&undated, today));
        assert!(ExportConfig::default().includes(&undated, today));

        let chunks = config.export(&[late, next_day, undated], today);
        assert_eq!(chunks, vec!["id", "\n", "\"late\"", "\n"]);
    }

    #[test]
    fn test_config_open_end_uses_today() {
        let today = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let mut record = AnalyzedRecord::new("future", "m", "z");
        record.iso_timestamp = "2023-01-05T00:00:00Z".parse().ok();

        let config = ExportConfig {
            start_date: NaiveDate::from_ymd_opt(2022, 12, 1),
            ..ExportConfig::default()
        };

        assert!(!config.includes(&record, today));
    }
}
