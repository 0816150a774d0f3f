// KPI report assembly plus the store and district rollups built on it.
use crate::aggregate::aggregate;
use crate::compare::{abs_change, pct_change, pct_change_opt, KpiDeltas, PeriodWindow};
use crate::daypart::{build_daypart_summary, DaypartSummary};
use crate::masterlist::ClientRegistry;
use crate::recommend::recommend_with_daypart;
use crate::snapshot::{normalize_periods, period_totals, Period, PeriodKind};
use crate::targets::{evaluate_window, TargetSet};
use crate::types::{
    DaypartRow, Direction, DistrictRow, KpiCardRow, KpiEvaluation, PeriodTotals, Row, StoreRow,
    TargetRow,
};
use crate::util::{format_money, format_number, format_pct, NO_DATA};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Periods a full MoM + Prev comparison needs.
pub const PERIODS_NEEDED: usize = 3;

/// Everything one report run depends on, passed in explicitly.
#[derive(Debug, Clone, Default)]
pub struct ReportContext {
    pub targets: TargetSet,
    pub client_id: Option<String>,
    pub client_name: Option<String>,
    pub store_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StoreStatus {
    Improving,
    Watch,
    AtRisk,
    NeedsBaseline,
    NeedsData,
}

impl StoreStatus {
    pub fn label(self) -> &'static str {
        match self {
            StoreStatus::Improving => "Improving",
            StoreStatus::Watch => "Watch",
            StoreStatus::AtRisk => "At risk",
            StoreStatus::NeedsBaseline => "Needs baseline",
            StoreStatus::NeedsData => "Needs data",
        }
    }
}

/// Classify a store from its baseline-to-latest deltas.
///
/// - any delta undefined: needs baseline
/// - sales up and (labor% down or avg ticket up): improving
/// - sales not up and labor% up: at risk
/// - otherwise: watch
pub fn store_status(
    delta_sales: Option<f64>,
    delta_labor_pct: Option<f64>,
    delta_avg_ticket: Option<f64>,
) -> StoreStatus {
    let (Some(sales), Some(labor), Some(ticket)) = (delta_sales, delta_labor_pct, delta_avg_ticket)
    else {
        return StoreStatus::NeedsBaseline;
    };
    let sales_up = sales > 0.0;
    if sales_up && (labor < 0.0 || ticket > 0.0) {
        StoreStatus::Improving
    } else if !sales_up && labor > 0.0 {
        StoreStatus::AtRisk
    } else {
        StoreStatus::Watch
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodSummary {
    pub label: String,
    pub rows: usize,
    pub totals: PeriodTotals,
    pub labor_pct: Option<f64>,
    pub avg_ticket: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KpiReport {
    pub generated_at: DateTime<Utc>,
    pub client_id: Option<String>,
    pub client_name: Option<String>,
    pub store_id: Option<String>,
    pub targets: TargetSet,
    /// Oldest first.
    pub periods: Vec<PeriodSummary>,
    pub complete: bool,
    pub window: PeriodWindow,
    pub deltas: KpiDeltas,
    pub evaluations: Vec<KpiEvaluation>,
    pub recommendations: Vec<String>,
    pub dayparts: DaypartSummary,
    pub status: StoreStatus,
}

impl PeriodSummary {
    fn new(label: String, rows: usize, totals: PeriodTotals) -> Self {
        PeriodSummary {
            label,
            rows,
            totals,
            labor_pct: totals.labor_pct(),
            avg_ticket: totals.avg_ticket(),
        }
    }
}

/// Aggregate, compare, evaluate and recommend over oldest-first periods.
///
/// Fewer than three periods is not an error: the comparisons that need the
/// missing periods come out undefined and the affected KPIs off track.
pub fn build_report(ctx: &ReportContext, periods: &[Period]) -> KpiReport {
    let summaries = periods
        .iter()
        .map(|p| PeriodSummary::new(p.label.clone(), p.rows.len(), aggregate(&p.rows)))
        .collect();
    let current_rows = periods.last().map(|p| p.rows.as_slice()).unwrap_or_default();
    assemble(ctx, summaries, current_rows)
}

/// Same as [`build_report`] for periods known only by their totals. Daypart
/// analysis needs rows, so it comes out unavailable.
pub fn build_report_from_totals(ctx: &ReportContext, totals: &[PeriodTotals]) -> KpiReport {
    let summaries = totals
        .iter()
        .enumerate()
        .map(|(i, t)| PeriodSummary::new(format!("Period {}", i + 1), 0, *t))
        .collect();
    assemble(ctx, summaries, &[])
}

/// Report for a stored snapshot of any known layout: row-level periods when
/// present, stored totals otherwise.
pub fn build_snapshot_report(ctx: &ReportContext, snapshot: &Value, kind: PeriodKind) -> KpiReport {
    let periods = normalize_periods(snapshot, kind);
    if !periods.is_empty() {
        return build_report(ctx, &periods);
    }
    let totals = period_totals(snapshot, kind);
    debug!(periods = totals.len(), "snapshot has no rows, reporting from totals");
    build_report_from_totals(ctx, &totals)
}

fn assemble(ctx: &ReportContext, summaries: Vec<PeriodSummary>, current_rows: &[Row]) -> KpiReport {
    let totals: Vec<PeriodTotals> = summaries.iter().map(|s| s.totals).collect();
    let window = PeriodWindow::from_oldest_first(&totals).unwrap_or_default();
    let complete = totals.len() >= PERIODS_NEEDED;
    if !complete {
        warn!(
            found = totals.len(),
            needed = PERIODS_NEEDED,
            "not enough periods for a full comparison"
        );
    }

    let deltas = window.deltas();
    let evaluations = evaluate_window(&window, &ctx.targets);
    let dayparts = build_daypart_summary(current_rows);
    let recommendations = recommend_with_daypart(&evaluations, &dayparts);

    // Baseline is the oldest period supplied, not the oldest in the window.
    let status = match totals.first() {
        Some(baseline) if totals.len() > 1 => store_status(
            pct_change(window.current.sales, baseline.sales),
            abs_change(window.current.labor_pct(), baseline.labor_pct()),
            pct_change_opt(window.current.avg_ticket(), baseline.avg_ticket()),
        ),
        _ => StoreStatus::NeedsBaseline,
    };

    info!(
        periods = summaries.len(),
        off_track = evaluations.iter().filter(|e| !e.on_track).count(),
        status = status.label(),
        "built KPI report"
    );

    KpiReport {
        generated_at: Utc::now(),
        client_id: ctx.client_id.clone(),
        client_name: ctx.client_name.clone(),
        store_id: ctx.store_id.clone(),
        targets: ctx.targets,
        periods: summaries,
        complete,
        window,
        deltas,
        evaluations,
        recommendations,
        dayparts,
        status,
    }
}

impl KpiReport {
    /// Headline cards: current value plus MoM and Prev change.
    pub fn card_rows(&self) -> Vec<KpiCardRow> {
        let current = self.window.current;
        let d = &self.deltas;
        let card = |kpi: &str, current: String, mom: Option<f64>, prev: Option<f64>| KpiCardRow {
            kpi: kpi.to_string(),
            current,
            mom: format_pct(mom, 1),
            prev: format_pct(prev, 1),
        };
        let has_data = !self.periods.is_empty();
        vec![
            card(
                "Sales",
                format_money(has_data.then_some(current.sales)),
                d.sales.mom,
                d.sales.prev,
            ),
            card(
                "Labor %",
                format_pct(current.labor_pct(), 1),
                d.labor_pct.mom,
                d.labor_pct.prev,
            ),
            card(
                "Transactions",
                if has_data {
                    format_number(current.transactions, 0)
                } else {
                    NO_DATA.to_string()
                },
                d.transactions.mom,
                d.transactions.prev,
            ),
            card(
                "Avg Ticket",
                format_money(current.avg_ticket()),
                d.avg_ticket.mom,
                d.avg_ticket.prev,
            ),
        ]
    }

    pub fn target_rows(&self) -> Vec<TargetRow> {
        self.evaluations.iter().map(target_row).collect()
    }

    pub fn daypart_rows(&self) -> Vec<DaypartRow> {
        self.dayparts
            .buckets
            .iter()
            .map(|b| DaypartRow {
                daypart: b.daypart.label().to_string(),
                rows: b.rows,
                sales: format_money(Some(b.totals.sales)),
                labor: format_money(Some(b.totals.labor)),
                labor_pct: format_pct(b.totals.labor_pct(), 1),
                transactions: format_number(b.totals.transactions, 0),
            })
            .collect()
    }

    pub fn off_track(&self) -> impl Iterator<Item = &KpiEvaluation> {
        self.evaluations.iter().filter(|e| !e.on_track)
    }
}

fn target_row(e: &KpiEvaluation) -> TargetRow {
    let fmt = |v: Option<f64>| {
        if e.kpi.is_money() {
            format_money(v)
        } else {
            format_pct(v, 1)
        }
    };
    let target = match e.kpi.direction() {
        Direction::LowerIsBetter => format!("≤ {}", fmt(Some(e.target))),
        Direction::HigherIsBetter => fmt(Some(e.target)),
    };
    TargetRow {
        kpi: e.kpi.label().to_string(),
        actual: fmt(e.actual),
        target,
        variance: fmt(e.variance),
        status: if e.on_track { "On Track" } else { "Off Track" }.to_string(),
    }
}

/// One masterlist store with its latest numbers and status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreSummary {
    pub store_id: String,
    pub store_name: String,
    pub district: String,
    pub has_baseline: bool,
    pub has_current: bool,
    /// Current period totals, when the store has any data.
    pub totals: Option<PeriodTotals>,
    pub status: StoreStatus,
}

/// Every store of `client_id` in the registry, paired with its report (keyed
/// by store id) when one exists. Sorted by district, then store id.
pub fn store_summaries(
    registry: &ClientRegistry,
    client_id: &str,
    reports: &BTreeMap<String, KpiReport>,
) -> Vec<StoreSummary> {
    let mut out: Vec<StoreSummary> = registry
        .stores(client_id)
        .iter()
        .map(|store| {
            let report = reports.get(&store.store_id).filter(|r| !r.periods.is_empty());
            StoreSummary {
                store_id: store.store_id.clone(),
                store_name: store.store_name.clone(),
                district: if store.district.is_empty() {
                    NO_DATA.to_string()
                } else {
                    store.district.clone()
                },
                has_baseline: report.is_some_and(|r| r.periods.len() > 1),
                has_current: report.is_some(),
                totals: report.map(|r| r.window.current),
                status: report.map_or(StoreStatus::NeedsData, |r| r.status),
            }
        })
        .collect();
    out.sort_by(|a, b| {
        a.district
            .cmp(&b.district)
            .then_with(|| a.store_id.cmp(&b.store_id))
    });
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistrictSummary {
    pub district: String,
    pub stores: usize,
    /// Sum of the stores' current period totals.
    pub totals: PeriodTotals,
    pub improving: usize,
    pub at_risk: usize,
    pub status: StoreStatus,
}

/// Any store at risk puts the district at risk; at least half its stores
/// (rounded up) improving makes it improving; anything else is watch.
pub fn district_status(stores: usize, improving: usize, at_risk: usize) -> StoreStatus {
    if at_risk > 0 {
        StoreStatus::AtRisk
    } else if improving > 0 && improving >= (stores + 1) / 2 {
        StoreStatus::Improving
    } else {
        StoreStatus::Watch
    }
}

/// Roll store summaries up by district, districts sorted by name.
pub fn district_rollup(stores: &[StoreSummary]) -> Vec<DistrictSummary> {
    let mut by_district: BTreeMap<&str, DistrictSummary> = BTreeMap::new();
    for s in stores {
        let d = by_district
            .entry(s.district.as_str())
            .or_insert_with(|| DistrictSummary {
                district: s.district.clone(),
                stores: 0,
                totals: PeriodTotals::default(),
                improving: 0,
                at_risk: 0,
                status: StoreStatus::Watch,
            });
        d.stores += 1;
        if let Some(t) = s.totals {
            d.totals += t;
        }
        match s.status {
            StoreStatus::Improving => d.improving += 1,
            StoreStatus::AtRisk => d.at_risk += 1,
            _ => {}
        }
    }
    by_district
        .into_values()
        .map(|mut d| {
            d.status = district_status(d.stores, d.improving, d.at_risk);
            d
        })
        .collect()
}

fn yes_no(v: bool) -> String {
    if v { "Yes" } else { "No" }.to_string()
}

pub fn store_rows(stores: &[StoreSummary]) -> Vec<StoreRow> {
    stores
        .iter()
        .map(|s| StoreRow {
            store_id: s.store_id.clone(),
            store_name: s.store_name.clone(),
            district: s.district.clone(),
            baseline: yes_no(s.has_baseline),
            current: yes_no(s.has_current),
            sales: format_money(s.totals.map(|t| t.sales)),
            labor_pct: format_pct(s.totals.and_then(|t| t.labor_pct()), 1),
            avg_ticket: format_money(s.totals.and_then(|t| t.avg_ticket())),
            status: s.status.label().to_string(),
        })
        .collect()
}

pub fn district_rows(districts: &[DistrictSummary]) -> Vec<DistrictRow> {
    districts
        .iter()
        .map(|d| DistrictRow {
            district: d.district.clone(),
            stores: d.stores,
            sales: format_money(Some(d.totals.sales)),
            labor_pct: format_pct(d.totals.labor_pct(), 1),
            avg_ticket: format_money(d.totals.avg_ticket()),
            improving: d.improving,
            at_risk: d.at_risk,
            status: d.status.label().to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_table;
    use crate::types::Kpi;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn period(label: &str, sales: f64, labor: f64, tx: f64) -> Period {
        let row: Row = [
            ("Date", "2024-03-01".to_string()),
            ("Location", "A".to_string()),
            ("Sales", sales.to_string()),
            ("Labor", labor.to_string()),
            ("Transactions", tx.to_string()),
        ]
        .into_iter()
        .collect();
        Period {
            label: label.to_string(),
            rows: vec![row],
        }
    }

    #[test]
    fn store_status_rules() {
        assert_eq!(store_status(None, Some(0.0), Some(0.0)), StoreStatus::NeedsBaseline);
        assert_eq!(store_status(Some(0.1), Some(-0.01), Some(-0.1)), StoreStatus::Improving);
        assert_eq!(store_status(Some(0.1), Some(0.01), Some(0.1)), StoreStatus::Improving);
        assert_eq!(store_status(Some(-0.1), Some(0.01), Some(0.1)), StoreStatus::AtRisk);
        assert_eq!(store_status(Some(0.1), Some(0.01), Some(-0.1)), StoreStatus::Watch);
        assert_eq!(store_status(Some(0.0), Some(-0.01), Some(0.0)), StoreStatus::Watch);
    }

    #[test]
    fn scenario_report() {
        let periods = vec![
            period("Jan", 1000.0, 270.0, 100.0),
            period("Feb", 1100.0, 280.0, 105.0),
            period("Mar", 1050.0, 270.0, 100.0),
        ];
        let report = build_report(&ReportContext::default(), &periods);
        assert!(report.complete);
        assert_eq!(report.periods.len(), 3);
        assert_eq!(report.evaluations.len(), 4);
        assert_eq!(report.recommendations.len(), 5);
        assert_eq!(report.off_track().count(), 3);

        let cards = report.card_rows();
        assert_eq!(cards[0].current, "$1,050.00");
        assert_eq!(cards[0].mom, "-4.5%");
        assert_eq!(cards[0].prev, "5.0%");
        assert_eq!(cards[1].current, "25.7%");

        let targets = report.target_rows();
        assert_eq!(targets[2].kpi, "Labor %");
        assert_eq!(targets[2].target, "≤ 27.0%");
        assert_eq!(targets[2].status, "On Track");
        assert_eq!(targets[3].actual, "$10.50");
        assert_eq!(targets[3].variance, "-$3.50");

        // Sales up vs baseline, Labor% down, ticket up.
        assert_eq!(report.status, StoreStatus::Improving);
        assert!(!report.dayparts.available);
    }

    #[test]
    fn empty_input_degrades_gracefully() {
        let report = build_report(&ReportContext::default(), &[]);
        assert!(!report.complete);
        assert!(report.evaluations.iter().all(|e| !e.on_track && e.actual.is_none()));
        assert_eq!(report.status, StoreStatus::NeedsBaseline);
        let cards = report.card_rows();
        assert!(cards.iter().all(|c| c.current == NO_DATA && c.mom == NO_DATA));
        assert_eq!(report.target_rows()[0].variance, NO_DATA);
    }

    #[test]
    fn context_flows_into_report() {
        let ctx = ReportContext {
            targets: TargetSet {
                avg_ticket_min: 10.0,
                ..TargetSet::default()
            },
            client_id: Some("acme".to_string()),
            client_name: Some("Acme".to_string()),
            store_id: Some("12".to_string()),
        };
        let report = build_report(&ctx, &[period("Mar", 1050.0, 270.0, 100.0)]);
        assert_eq!(report.client_id.as_deref(), Some("acme"));
        let ticket = report.evaluations.iter().find(|e| e.kpi == Kpi::AvgTicket).unwrap();
        assert!(ticket.on_track);
        assert_eq!(report.daypart_rows().len(), 4);
    }

    #[test]
    fn totals_only_snapshot_still_reports() {
        let snapshot = json!({
            "monthlyTotals": {
                "m0": { "sales": 1050, "labor": 270, "tx": 100 },
                "m1": { "sales": 1100, "labor": 280, "transactions": 105 },
                "m2": { "sales": 1000, "labor": 270, "transactions": 100 }
            }
        });
        let report = build_snapshot_report(&ReportContext::default(), &snapshot, PeriodKind::Monthly);
        assert!(report.complete);
        assert_eq!(report.periods.len(), 3);
        assert_eq!(report.window.current.sales, 1050.0);
        assert_eq!(report.card_rows()[1].current, "25.7%");
        assert_eq!(report.status, StoreStatus::Improving);
        assert!(!report.dayparts.available);

        let empty = build_snapshot_report(&ReportContext::default(), &json!({}), PeriodKind::Monthly);
        assert!(empty.periods.is_empty());
    }

    #[test]
    fn snapshot_rows_win_over_stored_totals() {
        let snapshot = json!({
            "monthlyTotals": { "m0": { "sales": 1 } },
            "months": [{ "month": "2024-03", "rows": [{ "Sales": 500, "Labor": 100, "Transactions": 50 }] }]
        });
        let report = build_snapshot_report(&ReportContext::default(), &snapshot, PeriodKind::Monthly);
        assert_eq!(report.periods[0].label, "2024-03");
        assert_eq!(report.window.current.sales, 500.0);
    }

    fn registry() -> ClientRegistry {
        let table = parse_table(indoc! {"
            client_id,client_name,store_id,store_name,district
            acme,Acme,3,Airport,D2
            acme,Acme,1,Downtown,D1
            acme,Acme,2,Mall,D1
            acme,Acme,4,Pier,
        "});
        ClientRegistry::from_table("masterlist.csv", &table).unwrap()
    }

    #[test]
    fn store_summaries_cover_every_store() {
        let ctx = ReportContext::default();
        let mut reports = BTreeMap::new();
        reports.insert(
            "1".to_string(),
            build_report(&ctx, &[period("Jan", 1000.0, 270.0, 100.0), period("Mar", 1050.0, 260.0, 100.0)]),
        );
        reports.insert("2".to_string(), build_report(&ctx, &[period("Mar", 900.0, 300.0, 90.0)]));

        let stores = store_summaries(&registry(), "acme", &reports);
        assert_eq!(
            stores.iter().map(|s| s.store_id.as_str()).collect::<Vec<_>>(),
            vec!["1", "2", "3", "4"]
        );
        assert_eq!(stores[0].status, StoreStatus::Improving);
        assert!(stores[0].has_baseline);
        assert_eq!(stores[1].status, StoreStatus::NeedsBaseline);
        assert!(stores[1].has_current && !stores[1].has_baseline);
        assert_eq!(stores[2].status, StoreStatus::NeedsData);
        assert_eq!(stores[2].totals, None);
        assert_eq!(stores[3].district, NO_DATA);

        let rows = store_rows(&stores);
        assert_eq!(rows[0].sales, "$1,050.00");
        assert_eq!(rows[2].sales, NO_DATA);
        assert_eq!(rows[2].status, "Needs data");
    }

    #[test]
    fn district_status_rules() {
        assert_eq!(district_status(4, 3, 1), StoreStatus::AtRisk);
        assert_eq!(district_status(3, 2, 0), StoreStatus::Improving);
        assert_eq!(district_status(4, 2, 0), StoreStatus::Improving);
        assert_eq!(district_status(3, 1, 0), StoreStatus::Watch);
        assert_eq!(district_status(1, 0, 0), StoreStatus::Watch);
        assert_eq!(district_status(1, 1, 0), StoreStatus::Improving);
    }

    #[test]
    fn districts_sum_store_totals() {
        let ctx = ReportContext::default();
        let mut reports = BTreeMap::new();
        reports.insert(
            "1".to_string(),
            build_report(&ctx, &[period("Jan", 1000.0, 270.0, 100.0), period("Mar", 1050.0, 260.0, 100.0)]),
        );
        reports.insert(
            "2".to_string(),
            build_report(&ctx, &[period("Jan", 1000.0, 200.0, 100.0), period("Mar", 950.0, 250.0, 90.0)]),
        );
        reports.insert(
            "3".to_string(),
            build_report(&ctx, &[period("Jan", 800.0, 200.0, 80.0), period("Mar", 900.0, 180.0, 80.0)]),
        );

        let stores = store_summaries(&registry(), "acme", &reports);
        let districts = district_rollup(&stores);
        assert_eq!(
            districts.iter().map(|d| d.district.as_str()).collect::<Vec<_>>(),
            vec!["D1", "D2", NO_DATA]
        );

        // D1: store 1 improving, store 2 at risk.
        let d1 = &districts[0];
        assert_eq!((d1.stores, d1.improving, d1.at_risk), (2, 1, 1));
        assert_eq!(d1.status, StoreStatus::AtRisk);
        assert_eq!(d1.totals.sales, 2000.0);
        assert_eq!(d1.totals.labor, 510.0);

        assert_eq!(districts[1].status, StoreStatus::Improving);
        // Store 4 has no data: nothing improving, so watch.
        assert_eq!(districts[2].status, StoreStatus::Watch);
        assert_eq!(districts[2].totals, PeriodTotals::default());

        let rows = district_rows(&districts);
        assert_eq!(rows[0].labor_pct, "25.5%");
        assert_eq!(rows[0].status, "At risk");
        assert_eq!(rows[2].avg_ticket, NO_DATA);
    }
}
