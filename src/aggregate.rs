use crate::types::{Column, PeriodTotals, Row};
use crate::util::coerce_number;

/// Sum Sales, Labor and Transactions over `rows`.
///
/// Cells that fail to parse contribute 0; aggregation never aborts.
pub fn aggregate(rows: &[Row]) -> PeriodTotals {
    rows.iter().map(row_totals).sum()
}

/// Totals contributed by a single row.
pub fn row_totals(row: &Row) -> PeriodTotals {
    PeriodTotals {
        sales: coerce_number(row.field(Column::Sales)),
        labor: coerce_number(row.field(Column::Labor)),
        transactions: coerce_number(row.field(Column::Transactions)),
    }
}

/// Aggregate each period's rows separately, preserving order.
pub fn aggregate_periods<R: AsRef<[Row]>>(periods: &[R]) -> Vec<PeriodTotals> {
    periods.iter().map(|rows| aggregate(rows.as_ref())).collect()
}
