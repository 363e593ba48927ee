// Election Act Auditor - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod config;     // Client / rival policy
pub mod forensics;  // Alteration events from the vision backend
pub mod impact;     // Benefit / prejudice classifier
pub mod records;    // Analyzed acts
pub mod export;     // CSV export
pub mod data_lake;  // In-memory act store + search
pub mod analysis;   // Vision backend contract
pub mod logging;    // Tracing filter

// Re-export commonly used types
pub use config::{ClientConfig, PartyRole, CONFIG_ENV_VAR};
pub use forensics::{AlterationEvent, AlterationKind};
pub use impact::{
    classify, Contribution, ImpactResult, Intent, IntentAccumulator, Recommendation,
};
pub use records::{
    load_records, parse_records, ActStatus, AnalyzedRecord, FieldValue, VoteCount,
};
pub use export::{
    export_filename, format_cell, generate_csv_chunks, write_csv,
    ColumnResolver, ColumnSelection, ExportConfig,
};
pub use data_lake::{DataLake, LakeSummary, DEFAULT_CAPACITY};
pub use analysis::{AnalyzeRequest, VisionExtraction};
pub use logging::log_filter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
