// Ingestion adapter for stored submissions.
//
// Approved submissions were saved under several JSON layouts over time. This
// module turns any of them into one oldest-first list of periods so nothing
// downstream has to sniff shapes.
use crate::aggregate::aggregate;
use crate::types::{PeriodTotals, Row};
use serde_json::{Map, Value};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodKind {
    Monthly,
    Weekly,
}

impl PeriodKind {
    fn keys(self) -> ShapeKeys {
        match self {
            PeriodKind::Monthly => ShapeKeys {
                list: "months",
                label: "month",
                nested: "monthly",
                slot: "month",
                display: "Month",
            },
            PeriodKind::Weekly => ShapeKeys {
                list: "weeks",
                label: "weekStart",
                nested: "weekly",
                slot: "week",
                display: "Week",
            },
        }
    }
}

struct ShapeKeys {
    list: &'static str,
    label: &'static str,
    nested: &'static str,
    slot: &'static str,
    display: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Period {
    pub label: String,
    pub rows: Vec<Row>,
}

/// Periods found in `snapshot`, oldest first. Unknown layouts give an empty
/// list.
///
/// Recognised layouts, tried in order:
/// - `months: [{ month | label, rows }]`
/// - `monthly: [[row, ...], ...]`
/// - `month1Rows` / `month1.rows` / `month1` (1..=3)
///
/// and the weekly equivalents (`weeks`/`weekStart`, `weekly`, `week1Rows`).
pub fn normalize_periods(snapshot: &Value, kind: PeriodKind) -> Vec<Period> {
    let keys = kind.keys();

    if let Some(list) = snapshot.get(keys.list).and_then(Value::as_array) {
        let out: Vec<Period> = list
            .iter()
            .filter_map(|entry| {
                let rows = entry.get("rows").and_then(Value::as_array)?;
                let label = entry
                    .get(keys.label)
                    .or_else(|| entry.get("label"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                Some(Period {
                    label: label.to_string(),
                    rows: rows_from_json(rows),
                })
            })
            .collect();
        if !out.is_empty() {
            return out;
        }
    }

    if let Some(list) = snapshot.get(keys.nested).and_then(Value::as_array) {
        let out: Vec<Period> = list
            .iter()
            .enumerate()
            .filter_map(|(idx, rows)| {
                Some(Period {
                    label: format!("{} {}", keys.display, idx + 1),
                    rows: rows_from_json(rows.as_array()?),
                })
            })
            .collect();
        if !out.is_empty() {
            return out;
        }
    }

    (1..=3)
        .filter_map(|n| {
            let slot = format!("{}{}", keys.slot, n);
            let rows = snapshot
                .get(format!("{}Rows", slot))
                .and_then(Value::as_array)
                .or_else(|| {
                    let v = snapshot.get(&slot)?;
                    v.get("rows").and_then(Value::as_array).or_else(|| v.as_array())
                })?;
            Some(Period {
                label: format!("{} {}", keys.display, n),
                rows: rows_from_json(rows),
            })
        })
        .collect()
}

/// Period totals out of a snapshot, oldest first.
///
/// Prefers pre-computed `monthlyTotals: { m0, m1, m2 }`, which are stored
/// newest first (`m0` is the current month), and otherwise aggregates the
/// normalized periods.
pub fn period_totals(snapshot: &Value, kind: PeriodKind) -> Vec<PeriodTotals> {
    if kind == PeriodKind::Monthly {
        if let Some(stored) = snapshot.get("monthlyTotals").and_then(Value::as_object) {
            let mut totals: Vec<PeriodTotals> = (0..3)
                .map_while(|i| {
                    let v = stored.get(&format!("m{}", i))?;
                    serde_json::from_value(v.clone()).ok()
                })
                .collect();
            if !totals.is_empty() {
                debug!(periods = totals.len(), "using stored monthly totals");
                totals.reverse();
                return totals;
            }
        }
    }
    normalize_periods(snapshot, kind)
        .iter()
        .map(|p| aggregate(&p.rows))
        .collect()
}

fn rows_from_json(rows: &[Value]) -> Vec<Row> {
    rows.iter()
        .filter_map(Value::as_object)
        .map(row_from_object)
        .collect()
}

fn row_from_object(obj: &Map<String, Value>) -> Row {
    obj.iter()
        .map(|(k, v)| {
            let cell = match v {
                Value::String(s) => s.trim().to_string(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (k.clone(), cell)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Column;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn months_list_shape() {
        let snap = json!({
            "months": [
                { "month": "2024-01", "rows": [{ "Sales": "100", "Labor": 20, "Transactions": 10 }] },
                { "label": "2024-02", "rows": [{ "Sales": 200 }] },
                { "month": "broken" }
            ]
        });
        let periods = normalize_periods(&snap, PeriodKind::Monthly);
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].label, "2024-01");
        assert_eq!(periods[0].rows[0].field(Column::Labor), Some("20"));
        assert_eq!(periods[1].label, "2024-02");
    }

    #[test]
    fn nested_arrays_shape() {
        let snap = json!({ "weekly": [[{ "Sales": 1 }], [{ "Sales": 2 }], "junk"] });
        let periods = normalize_periods(&snap, PeriodKind::Weekly);
        assert_eq!(
            periods.iter().map(|p| p.label.as_str()).collect::<Vec<_>>(),
            vec!["Week 1", "Week 2"]
        );
    }

    #[test]
    fn numbered_slot_shapes() {
        let snap = json!({
            "month1Rows": [{ "Sales": 1 }],
            "month2": { "rows": [{ "Sales": 2 }] },
            "month3": [{ "Sales": 3, "Note": null }]
        });
        let periods = normalize_periods(&snap, PeriodKind::Monthly);
        assert_eq!(periods.len(), 3);
        assert_eq!(periods[2].rows[0].field(Column::Sales), Some("3"));
        assert_eq!(periods[2].rows[0].get("Note"), Some(""));
    }

    #[test]
    fn unknown_shape_is_empty() {
        assert!(normalize_periods(&json!({ "foo": 1 }), PeriodKind::Monthly).is_empty());
        assert!(normalize_periods(&json!([1, 2]), PeriodKind::Weekly).is_empty());
        assert!(period_totals(&Value::Null, PeriodKind::Monthly).is_empty());
    }

    #[test]
    fn stored_totals_are_reordered_oldest_first() {
        let snap = json!({
            "monthlyTotals": {
                "m0": { "sales": 1050, "labor": 270, "transactions": 100 },
                "m1": { "sales": 1100, "labor": 280, "tx": 105 },
                "m2": { "sales": 1000, "labor": 270, "transactions": 100 }
            }
        });
        let totals = period_totals(&snap, PeriodKind::Monthly);
        assert_eq!(
            totals.iter().map(|t| t.sales).collect::<Vec<_>>(),
            vec![1000.0, 1100.0, 1050.0]
        );
        assert_eq!(totals[1].transactions, 105.0);
    }

    #[test]
    fn totals_fall_back_to_rows() {
        let snap = json!({ "monthly": [[{ "Sales": "$1,000", "Labor": 250 }], [{ "Sales": 10 }]] });
        let totals = period_totals(&snap, PeriodKind::Monthly);
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].sales, 1000.0);
        assert_eq!(totals[0].labor, 250.0);
    }
}
