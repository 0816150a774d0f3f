// Error type for the I/O boundary.
//
// The KPI core itself never fails on messy data; these variants only come
// out of file loading, configuration decoding and upload validation.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KpiError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{file}: missing column(s) {}", missing.join(", "))]
    MissingColumns { file: String, missing: Vec<String> },

    #[error("{file} has no data rows")]
    NoDataRows { file: String },

    #[error("need {needed} periods to compare, found {found}")]
    InsufficientPeriods { needed: usize, found: usize },

    #[error("target {name} must be a finite number, got {value}")]
    InvalidTarget { name: &'static str, value: f64 },
}

pub type Result<T> = std::result::Result<T, KpiError>;
