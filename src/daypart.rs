// Daypart bucketing and worst-daypart scoring.
//
// Each row lands in a bucket by, in order: its Shift label, its Hour cell,
// or an HH:MM time inside Date/DateTime. Rows with none of these are left
// out. Buckets are scored relative to the best bucket with data and the
// highest score is the worst daypart.
use crate::aggregate::row_totals;
use crate::types::{Column, Daypart, PeriodTotals, Row};
use crate::util::{extract_hour, parse_hour};
use serde::Serialize;
use tracing::debug;

pub const UNAVAILABLE_NOTE: &str =
    "Daypart analysis unavailable: add Shift, Hour, or Date with time.";

const LABOR_PCT_WEIGHT: f64 = 0.45;
const SALES_PER_LABOR_WEIGHT: f64 = 0.35;
const TX_PER_LABOR_WEIGHT: f64 = 0.20;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DaypartBucket {
    pub daypart: Daypart,
    pub totals: PeriodTotals,
    pub rows: usize,
}

impl DaypartBucket {
    // Buckets with rows but no sales/labor score as 0 on that metric.
    fn labor_pct(&self) -> f64 {
        self.totals.labor_pct().unwrap_or(0.0)
    }

    fn sales_per_labor(&self) -> f64 {
        per_labor(self.totals.sales, self.totals.labor)
    }

    fn tx_per_labor(&self) -> f64 {
        per_labor(self.totals.transactions, self.totals.labor)
    }
}

fn per_labor(value: f64, labor: f64) -> f64 {
    if labor > 0.0 {
        value / labor
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorstDaypart {
    pub daypart: Daypart,
    pub labor_pct: f64,
    pub sales_per_labor: f64,
    pub tx_per_labor: f64,
    pub score: f64,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaypartSummary {
    pub available: bool,
    pub note: String,
    pub buckets: Vec<DaypartBucket>,
    pub worst: Option<WorstDaypart>,
}

/// Map a free-text shift label onto a daypart.
pub fn normalize_shift(label: &str) -> Option<Daypart> {
    let v = label.trim().to_lowercase();
    if v.is_empty() {
        None
    } else if v.contains("break") {
        Some(Daypart::Breakfast)
    } else if v.contains("lunch") || v.contains("mid") {
        Some(Daypart::Lunch)
    } else if v.contains("dinner") || v.contains("eve") {
        Some(Daypart::Dinner)
    } else if v.contains("late") || v.contains("night") {
        Some(Daypart::LateNight)
    } else {
        None
    }
}

/// Breakfast 05-10, Lunch 11-15, Dinner 16-21, everything else Late Night.
pub fn hour_to_daypart(hour: u32) -> Daypart {
    match hour {
        5..=10 => Daypart::Breakfast,
        11..=15 => Daypart::Lunch,
        16..=21 => Daypart::Dinner,
        _ => Daypart::LateNight,
    }
}

/// Which daypart a row belongs to, if it says.
pub fn classify_row(row: &Row) -> Option<Daypart> {
    row.field(Column::Shift)
        .and_then(normalize_shift)
        .or_else(|| parse_hour(row.field(Column::Hour)).map(hour_to_daypart))
        .or_else(|| {
            extract_hour(row.field(Column::Date))
                .or_else(|| extract_hour(row.field(Column::DateTime)))
                .map(hour_to_daypart)
        })
}

pub fn build_daypart_summary(rows: &[Row]) -> DaypartSummary {
    let mut buckets: Vec<DaypartBucket> = Daypart::ALL
        .iter()
        .map(|&daypart| DaypartBucket {
            daypart,
            totals: PeriodTotals::default(),
            rows: 0,
        })
        .collect();

    let mut classified = 0usize;
    for row in rows {
        let Some(daypart) = classify_row(row) else {
            continue;
        };
        classified += 1;
        if let Some(bucket) = buckets.iter_mut().find(|b| b.daypart == daypart) {
            bucket.totals += row_totals(row);
            bucket.rows += 1;
        }
    }
    debug!(rows = rows.len(), classified, "daypart bucketing");

    if classified == 0 {
        return DaypartSummary {
            available: false,
            note: UNAVAILABLE_NOTE.to_string(),
            buckets,
            worst: None,
        };
    }

    let worst = compute_worst(&buckets);
    DaypartSummary {
        available: true,
        note: String::new(),
        buckets,
        worst,
    }
}

/// Score every bucket with rows and return the highest. Ties go to the
/// earlier daypart.
pub fn compute_worst(buckets: &[DaypartBucket]) -> Option<WorstDaypart> {
    let usable: Vec<&DaypartBucket> = buckets.iter().filter(|b| b.rows > 0).collect();
    if usable.is_empty() {
        return None;
    }

    let max_of = |f: fn(&DaypartBucket) -> f64| usable.iter().map(|b| f(*b)).fold(0.0, f64::max);
    let max_labor_pct = max_of(DaypartBucket::labor_pct);
    let max_spl = max_of(DaypartBucket::sales_per_labor);
    let max_tpl = max_of(DaypartBucket::tx_per_labor);

    let relative = |v: f64, max: f64| if max > 0.0 { v / max } else { 0.0 };
    let inverted = |v: f64, max: f64| if max > 0.0 { 1.0 - v / max } else { 0.0 };

    let mut worst: Option<WorstDaypart> = None;
    for b in usable {
        let (labor_pct, spl, tpl) = (b.labor_pct(), b.sales_per_labor(), b.tx_per_labor());
        let score = relative(labor_pct, max_labor_pct) * LABOR_PCT_WEIGHT
            + inverted(spl, max_spl) * SALES_PER_LABOR_WEIGHT
            + inverted(tpl, max_tpl) * TX_PER_LABOR_WEIGHT;

        if worst.as_ref().is_some_and(|w| score <= w.score) {
            continue;
        }
        worst = Some(WorstDaypart {
            daypart: b.daypart,
            labor_pct,
            sales_per_labor: spl,
            tx_per_labor: tpl,
            score,
            reasons: vec![
                format!("Labor%: {:.1}%", labor_pct * 100.0),
                format!("Sales/Labor: {:.2}", spl),
                format!("Tx/Labor: {:.2}", tpl),
            ],
        });
    }
    worst
}
