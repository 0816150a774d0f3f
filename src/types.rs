use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, AddAssign};
use tabled::Tabled;

use crate::util::normalize_header;

/// Columns the KPI pipeline knows how to read.
///
/// Lookups go through [`Row::field`], which accepts the canonical name in any
/// case/spacing plus the legacy aliases older exports used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Date,
    Location,
    Sales,
    Labor,
    Transactions,
    Shift,
    Hour,
    DateTime,
}

impl Column {
    pub fn name(self) -> &'static str {
        match self {
            Column::Date => "Date",
            Column::Location => "Location",
            Column::Sales => "Sales",
            Column::Labor => "Labor",
            Column::Transactions => "Transactions",
            Column::Shift => "Shift",
            Column::Hour => "Hour",
            Column::DateTime => "DateTime",
        }
    }

    fn aliases(self) -> &'static [&'static str] {
        match self {
            Column::Sales => &["revenue"],
            Column::Labor => &["labor_cost", "laborcost"],
            Column::Transactions => &["tx"],
            _ => &[],
        }
    }
}

/// Columns every monthly/weekly sales upload must carry.
pub const MONTHLY_COLUMNS: [Column; 5] = [
    Column::Date,
    Column::Location,
    Column::Sales,
    Column::Labor,
    Column::Transactions,
];

/// One parsed CSV data line: header -> cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    cells: BTreeMap<String, String>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.cells.insert(column.into(), value.into());
    }

    /// Look a cell up by header, exact match first, then ignoring case and
    /// whitespace.
    pub fn get(&self, column: &str) -> Option<&str> {
        if let Some(v) = self.cells.get(column) {
            return Some(v.as_str());
        }
        let wanted = normalize_header(column);
        self.cells
            .iter()
            .find(|(k, _)| normalize_header(k) == wanted)
            .map(|(_, v)| v.as_str())
    }

    /// Read a known column, falling back to its aliases.
    pub fn field(&self, column: Column) -> Option<&str> {
        self.get(column.name())
            .or_else(|| column.aliases().iter().find_map(|a| self.get(a)))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Row {
            cells: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Summed Sales/Labor/Transactions for one period.
///
/// Ratios are derived on demand and are `None` when their denominator is
/// zero, so "no data" never masquerades as 0%.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeriodTotals {
    pub sales: f64,
    pub labor: f64,
    #[serde(alias = "tx")]
    pub transactions: f64,
}

impl PeriodTotals {
    pub fn labor_pct(&self) -> Option<f64> {
        ratio(self.labor, self.sales)
    }

    pub fn avg_ticket(&self) -> Option<f64> {
        ratio(self.sales, self.transactions)
    }
}

fn ratio(num: f64, denom: f64) -> Option<f64> {
    if denom > 0.0 {
        Some(num / denom).filter(|v| v.is_finite())
    } else {
        None
    }
}

impl Add for PeriodTotals {
    type Output = PeriodTotals;

    fn add(self, rhs: PeriodTotals) -> PeriodTotals {
        PeriodTotals {
            sales: self.sales + rhs.sales,
            labor: self.labor + rhs.labor,
            transactions: self.transactions + rhs.transactions,
        }
    }
}

impl AddAssign for PeriodTotals {
    fn add_assign(&mut self, rhs: PeriodTotals) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for PeriodTotals {
    fn sum<I: Iterator<Item = PeriodTotals>>(iter: I) -> Self {
        iter.fold(PeriodTotals::default(), Add::add)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
}

/// The four KPIs that are measured against targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kpi {
    SalesGrowth,
    TransactionsGrowth,
    LaborPct,
    AvgTicket,
}

impl Kpi {
    pub const ALL: [Kpi; 4] = [
        Kpi::SalesGrowth,
        Kpi::TransactionsGrowth,
        Kpi::LaborPct,
        Kpi::AvgTicket,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Kpi::SalesGrowth => "Sales MoM",
            Kpi::TransactionsGrowth => "Transactions MoM",
            Kpi::LaborPct => "Labor %",
            Kpi::AvgTicket => "Avg Ticket",
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            Kpi::LaborPct => Direction::LowerIsBetter,
            _ => Direction::HigherIsBetter,
        }
    }

    /// Avg Ticket is a dollar amount; the rest are fractions.
    pub fn is_money(self) -> bool {
        matches!(self, Kpi::AvgTicket)
    }
}

impl fmt::Display for Kpi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of checking one KPI against its target.
///
/// `variance` is always `actual - target`; whether a positive variance is good
/// depends on the KPI's direction, so consult `on_track` for status.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KpiEvaluation {
    pub kpi: Kpi,
    pub actual: Option<f64>,
    pub target: f64,
    pub variance: Option<f64>,
    pub on_track: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Daypart {
    Breakfast,
    Lunch,
    Dinner,
    #[serde(rename = "Late Night")]
    LateNight,
}

impl Daypart {
    pub const ALL: [Daypart; 4] = [
        Daypart::Breakfast,
        Daypart::Lunch,
        Daypart::Dinner,
        Daypart::LateNight,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Daypart::Breakfast => "Breakfast",
            Daypart::Lunch => "Lunch",
            Daypart::Dinner => "Dinner",
            Daypart::LateNight => "Late Night",
        }
    }
}

impl fmt::Display for Daypart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct KpiCardRow {
    #[serde(rename = "KPI")]
    #[tabled(rename = "KPI")]
    pub kpi: String,
    #[serde(rename = "Current")]
    #[tabled(rename = "Current")]
    pub current: String,
    #[serde(rename = "MoM")]
    #[tabled(rename = "MoM")]
    pub mom: String,
    #[serde(rename = "Prev")]
    #[tabled(rename = "Prev")]
    pub prev: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct TargetRow {
    #[serde(rename = "KPI")]
    #[tabled(rename = "KPI")]
    pub kpi: String,
    #[serde(rename = "Actual")]
    #[tabled(rename = "Actual")]
    pub actual: String,
    #[serde(rename = "Target")]
    #[tabled(rename = "Target")]
    pub target: String,
    #[serde(rename = "Variance")]
    #[tabled(rename = "Variance")]
    pub variance: String,
    #[serde(rename = "Status")]
    #[tabled(rename = "Status")]
    pub status: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct DaypartRow {
    #[serde(rename = "Daypart")]
    #[tabled(rename = "Daypart")]
    pub daypart: String,
    #[serde(rename = "Rows")]
    #[tabled(rename = "Rows")]
    pub rows: usize,
    #[serde(rename = "Sales")]
    #[tabled(rename = "Sales")]
    pub sales: String,
    #[serde(rename = "Labor")]
    #[tabled(rename = "Labor")]
    pub labor: String,
    #[serde(rename = "LaborPct")]
    #[tabled(rename = "LaborPct")]
    pub labor_pct: String,
    #[serde(rename = "Transactions")]
    #[tabled(rename = "Transactions")]
    pub transactions: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct TaskRow {
    #[serde(rename = "Status")]
    #[tabled(rename = "Status")]
    pub status: String,
    #[serde(rename = "Title")]
    #[tabled(rename = "Title")]
    pub title: String,
    #[serde(rename = "Tag")]
    #[tabled(rename = "Tag")]
    pub tag: String,
    #[serde(rename = "Owner")]
    #[tabled(rename = "Owner")]
    pub owner: String,
    #[serde(rename = "Due")]
    #[tabled(rename = "Due")]
    pub due: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct StoreRow {
    #[serde(rename = "StoreId")]
    #[tabled(rename = "StoreId")]
    pub store_id: String,
    #[serde(rename = "StoreName")]
    #[tabled(rename = "StoreName")]
    pub store_name: String,
    #[serde(rename = "District")]
    #[tabled(rename = "District")]
    pub district: String,
    #[serde(rename = "Baseline")]
    #[tabled(rename = "Baseline")]
    pub baseline: String,
    #[serde(rename = "Current")]
    #[tabled(rename = "Current")]
    pub current: String,
    #[serde(rename = "Sales")]
    #[tabled(rename = "Sales")]
    pub sales: String,
    #[serde(rename = "LaborPct")]
    #[tabled(rename = "LaborPct")]
    pub labor_pct: String,
    #[serde(rename = "AvgTicket")]
    #[tabled(rename = "AvgTicket")]
    pub avg_ticket: String,
    #[serde(rename = "Status")]
    #[tabled(rename = "Status")]
    pub status: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct DistrictRow {
    #[serde(rename = "District")]
    #[tabled(rename = "District")]
    pub district: String,
    #[serde(rename = "Stores")]
    #[tabled(rename = "Stores")]
    pub stores: usize,
    #[serde(rename = "Sales")]
    #[tabled(rename = "Sales")]
    pub sales: String,
    #[serde(rename = "LaborPct")]
    #[tabled(rename = "LaborPct")]
    pub labor_pct: String,
    #[serde(rename = "AvgTicket")]
    #[tabled(rename = "AvgTicket")]
    pub avg_ticket: String,
    #[serde(rename = "Improving")]
    #[tabled(rename = "Improving")]
    pub improving: usize,
    #[serde(rename = "AtRisk")]
    #[tabled(rename = "AtRisk")]
    pub at_risk: usize,
    #[serde(rename = "Status")]
    #[tabled(rename = "Status")]
    pub status: String,
}
