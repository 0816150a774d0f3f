// KPI reporting core for small-store sales/labor uploads.
//
// Pipeline: parse CSV -> aggregate periods -> compare / evaluate against
// targets -> recommendations, daypart analysis and an action plan.
pub mod action_plan;
pub mod aggregate;
pub mod compare;
pub mod daypart;
pub mod error;
pub mod loader;
pub mod masterlist;
pub mod output;
pub mod recommend;
pub mod reports;
pub mod snapshot;
pub mod targets;
pub mod types;
pub mod util;

pub use error::{KpiError, Result};
