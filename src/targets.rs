// Target configuration and KPI evaluation.
use crate::compare::PeriodWindow;
use crate::error::{KpiError, Result};
use crate::types::{Direction, Kpi, KpiEvaluation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Per-client KPI thresholds. Growth and Labor% are fractions
/// (`0.05` = 5%), Avg Ticket is dollars.
///
/// Deserializes from `{ salesMoM, txMoM, laborPctMax, avgTicketMin }`; any
/// field left out keeps its default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct TargetSet {
    #[serde(rename = "salesMoM")]
    pub sales_mom: f64,
    #[serde(rename = "txMoM")]
    pub tx_mom: f64,
    pub labor_pct_max: f64,
    pub avg_ticket_min: f64,
}

impl Default for TargetSet {
    fn default() -> Self {
        Self {
            sales_mom: 0.05,
            tx_mom: 0.04,
            labor_pct_max: 0.27,
            avg_ticket_min: 14.0,
        }
    }
}

/// Either a single target set or one per client id.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum TargetsFile {
    Single(TargetSet),
    PerClient(HashMap<String, TargetSet>),
}

impl TargetSet {
    pub fn threshold(&self, kpi: Kpi) -> f64 {
        match kpi {
            Kpi::SalesGrowth => self.sales_mom,
            Kpi::TransactionsGrowth => self.tx_mom,
            Kpi::LaborPct => self.labor_pct_max,
            Kpi::AvgTicket => self.avg_ticket_min,
        }
    }

    pub fn validate(self) -> Result<Self> {
        let fields = [
            ("salesMoM", self.sales_mom),
            ("txMoM", self.tx_mom),
            ("laborPctMax", self.labor_pct_max),
            ("avgTicketMin", self.avg_ticket_min),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(KpiError::InvalidTarget { name, value });
            }
        }
        Ok(self)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str::<TargetSet>(text)?.validate()
    }

    /// Pick the target set for `client` out of a targets document.
    ///
    /// A document holding a single set applies to every client; a per-client
    /// map falls back to defaults for unknown or absent clients.
    pub fn for_client(text: &str, client: Option<&str>) -> Result<Self> {
        let file: TargetsFile = serde_json::from_str(text)?;
        let targets = match file {
            TargetsFile::Single(t) => t,
            TargetsFile::PerClient(map) => client
                .and_then(|c| map.get(c).copied())
                .unwrap_or_else(|| {
                    debug!(?client, "no client-specific targets, using defaults");
                    TargetSet::default()
                }),
        };
        targets.validate()
    }

    pub fn load(path: &Path, client: Option<&str>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let targets = Self::for_client(&text, client)?;
        info!(path = %path.display(), ?targets, "loaded targets");
        Ok(targets)
    }
}

/// Judge one KPI's actual value against its target.
///
/// An undefined actual is never on track, and its variance is undefined too.
pub fn evaluate(kpi: Kpi, actual: Option<f64>, targets: &TargetSet) -> KpiEvaluation {
    let target = targets.threshold(kpi);
    let actual = actual.filter(|v| v.is_finite());
    let on_track = actual.is_some_and(|a| match kpi.direction() {
        Direction::HigherIsBetter => a >= target,
        Direction::LowerIsBetter => a <= target,
    });
    KpiEvaluation {
        kpi,
        actual,
        target,
        variance: actual.map(|a| a - target),
        on_track,
    }
}

/// Evaluate all four KPIs for a period window, in [`Kpi::ALL`] order.
pub fn evaluate_window(window: &PeriodWindow, targets: &TargetSet) -> Vec<KpiEvaluation> {
    Kpi::ALL
        .iter()
        .map(|&kpi| evaluate(kpi, window.actual(kpi), targets))
        .collect()
}
