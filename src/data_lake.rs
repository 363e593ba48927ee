// 🗂️ Data Lake - in-memory list of analyzed acts
// Newest first, bounded on ingest. Owned by whoever drives the UI/API; never persisted here.

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

use crate::export::ExportConfig;
use crate::records::{load_records, AnalyzedRecord};

/// Acts kept in memory before the oldest ones are dropped
pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct DataLake {
    records: Vec<AnalyzedRecord>,
    capacity: usize,
}

/// Counters shown next to search results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LakeSummary {
    pub total: usize,
    pub fraud: usize,
    pub arithmetic_mismatches: usize,
}

impl DataLake {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Empty lake holding at most `capacity` acts (minimum 1)
    pub fn with_capacity(capacity: usize) -> Self {
        DataLake {
            records: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Wrap an existing list (kept in the given order).
    /// A loaded list is never cut; the cap applies from the next ingest on.
    pub fn from_records(records: Vec<AnalyzedRecord>) -> Self {
        DataLake {
            records,
            capacity: DEFAULT_CAPACITY,
        }
    }

    /// Load a JSON array of records
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let records = load_records(path)?;
        info!(records = records.len(), "Loaded data lake");
        Ok(Self::from_records(records))
    }

    /// Add a freshly processed act at the front, dropping the oldest past capacity
    pub fn ingest(&mut self, record: AnalyzedRecord) {
        debug!(id = %record.id, mesa = %record.table_id, fraud = record.is_fraud, "Ingested act");
        self.records.insert(0, record);

        if self.records.len() > self.capacity {
            let dropped = self.records.len() - self.capacity;
            self.records.truncate(self.capacity);
            debug!(dropped, capacity = self.capacity, "Dropped oldest acts");
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn records(&self) -> &[AnalyzedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&AnalyzedRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn fraud_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_fraud).count()
    }

    pub fn summary(&self) -> LakeSummary {
        LakeSummary {
            total: self.records.len(),
            fraud: self.fraud_count(),
            arithmetic_mismatches: self
                .records
                .iter()
                .filter(|r| r.has_arithmetic_mismatch())
                .count(),
        }
    }

    /// Search box semantics: table and zone match case-insensitively,
    /// the id matches case-sensitively. An empty term matches everything.
    pub fn search(&self, term: &str) -> Vec<&AnalyzedRecord> {
        let needle = term.to_lowercase();

        self.records
            .iter()
            .filter(|r| {
                r.table_id.to_lowercase().contains(&needle)
                    || r.zone_id.to_lowercase().contains(&needle)
                    || r.id.contains(term)
            })
            .collect()
    }

    pub fn export(&self, config: &ExportConfig, today: NaiveDate) -> Vec<String> {
        config.export(&self.records, today)
    }
}

impl Default for DataLake {
    fn default() -> Self {
        Self::new()
    }
}
