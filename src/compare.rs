// Period-over-period comparison.
//
// Periods are always supplied oldest-first. "MoM" compares the current
// period with the one before it; "Prev" compares the current period with the
// one two steps back. Both are relative to the current period.
use crate::types::{Kpi, PeriodTotals};
use serde::{Deserialize, Serialize};

/// Relative change `(current - previous) / previous`.
///
/// Undefined when `previous` is 0 or either side is not finite.
pub fn pct_change(current: f64, previous: f64) -> Option<f64> {
    if !current.is_finite() || !previous.is_finite() || previous == 0.0 {
        return None;
    }
    Some((current - previous) / previous)
}

/// `pct_change` over possibly-undefined inputs.
pub fn pct_change_opt(current: Option<f64>, previous: Option<f64>) -> Option<f64> {
    pct_change(current?, previous?)
}

/// Absolute change, used for Labor% which is already a ratio.
pub fn abs_change(current: Option<f64>, previous: Option<f64>) -> Option<f64> {
    let (c, p) = (current?, previous?);
    (c.is_finite() && p.is_finite()).then(|| c - p)
}

/// The last three periods of an oldest-first series.
///
/// Snapshots are copied out of the input; comparisons never touch the
/// caller's totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodWindow {
    pub oldest: Option<PeriodTotals>,
    pub previous: Option<PeriodTotals>,
    pub current: PeriodTotals,
}

impl PeriodWindow {
    /// `None` only for an empty series; shorter series leave the missing
    /// periods undefined.
    pub fn from_oldest_first(periods: &[PeriodTotals]) -> Option<Self> {
        let (current, rest) = periods.split_last()?;
        let previous = rest.last().copied();
        let oldest = rest.len().checked_sub(2).map(|i| rest[i]);
        Some(PeriodWindow {
            oldest,
            previous,
            current: *current,
        })
    }

    pub fn is_complete(&self) -> bool {
        self.oldest.is_some() && self.previous.is_some()
    }

    pub fn deltas(&self) -> KpiDeltas {
        let relative = |f: fn(&PeriodTotals) -> Option<f64>| Delta {
            mom: pct_change_opt(f(&self.current), self.previous.as_ref().and_then(f)),
            prev: pct_change_opt(f(&self.current), self.oldest.as_ref().and_then(f)),
        };
        KpiDeltas {
            sales: relative(|t| Some(t.sales)),
            transactions: relative(|t| Some(t.transactions)),
            avg_ticket: relative(PeriodTotals::avg_ticket),
            labor_pct: Delta {
                mom: abs_change(
                    self.current.labor_pct(),
                    self.previous.and_then(|p| p.labor_pct()),
                ),
                prev: abs_change(
                    self.current.labor_pct(),
                    self.oldest.and_then(|p| p.labor_pct()),
                ),
            },
        }
    }

    /// The value each KPI is judged on against its target.
    pub fn actual(&self, kpi: Kpi) -> Option<f64> {
        match kpi {
            Kpi::SalesGrowth => pct_change(self.current.sales, self.previous?.sales),
            Kpi::TransactionsGrowth => {
                pct_change(self.current.transactions, self.previous?.transactions)
            }
            Kpi::LaborPct => self.current.labor_pct(),
            Kpi::AvgTicket => self.current.avg_ticket(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub mom: Option<f64>,
    pub prev: Option<f64>,
}

/// MoM/Prev deltas for every headline figure. `labor_pct` holds absolute
/// differences, the rest relative changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiDeltas {
    pub sales: Delta,
    pub transactions: Delta,
    pub labor_pct: Delta,
    pub avg_ticket: Delta,
}
