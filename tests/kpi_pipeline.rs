//! End-to-end tests: CSV files and stored snapshots through to the report
//! and action plan.

use indoc::indoc;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use qsr_kpi::action_plan::{build_tasks, ActionPlan, PlanBook};
use qsr_kpi::aggregate::aggregate;
use qsr_kpi::daypart::UNAVAILABLE_NOTE;
use qsr_kpi::loader::{load_table, parse_table, period_label};
use qsr_kpi::masterlist::ClientRegistry;
use qsr_kpi::reports::{
    build_report, build_snapshot_report, district_rollup, district_rows, store_summaries,
    ReportContext, StoreStatus,
};
use qsr_kpi::snapshot::{normalize_periods, period_totals, Period, PeriodKind};
use qsr_kpi::targets::TargetSet;
use qsr_kpi::types::{Daypart, Kpi, Row};
use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use tempfile::TempDir;

const JANUARY: &str = indoc! {"
    Date,Location,Sales,Labor,Transactions
    2024-01-15,Main St,600,160,60
    2024-01-31,Main St,400,110,40
"};

const FEBRUARY: &str = indoc! {"
    Date,Location,Sales,Labor,Transactions
    2024-02-10,Main St,\"$700.00\",180,65
    2024-02-20,Main St,400,100,40
"};

const MARCH: &str = indoc! {"
    Date,Location,Shift,Sales,Labor,Transactions
    2024-03-05,Main St,Breakfast,600,120,60
    2024-03-20,Main St,Dinner,450,150,40
"};

fn load_periods(dir: &TempDir, texts: &[&str]) -> Vec<Period> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let path = dir.path().join(format!("period{}.csv", i));
            fs::write(&path, text).unwrap();
            let rows = load_table(&path).unwrap().rows;
            Period {
                label: period_label(&rows).unwrap(),
                rows,
            }
        })
        .collect()
}

fn close(a: Option<f64>, b: f64) -> bool {
    a.map(|a| (a - b).abs() < 1e-9).unwrap_or(false)
}

#[test]
fn three_month_report_from_files() {
    let dir = TempDir::new().unwrap();
    let periods = load_periods(&dir, &[JANUARY, FEBRUARY, MARCH]);
    assert_eq!(
        periods.iter().map(|p| p.label.as_str()).collect::<Vec<_>>(),
        vec!["2024-01", "2024-02", "2024-03"]
    );

    let report = build_report(&ReportContext::default(), &periods);
    assert!(report.complete);
    assert!(close(report.deltas.sales.mom, (1050.0 - 1100.0) / 1100.0));
    assert!(close(report.deltas.sales.prev, 0.05));

    let labor = report.evaluations.iter().find(|e| e.kpi == Kpi::LaborPct).unwrap();
    assert!(close(labor.actual, 270.0 / 1050.0));
    assert!(labor.on_track);

    let sales = report.evaluations.iter().find(|e| e.kpi == Kpi::SalesGrowth).unwrap();
    assert!(!sales.on_track);
    assert_eq!(report.status, StoreStatus::Improving);

    // One line per KPI plus the daypart line.
    assert_eq!(report.recommendations.len(), 5);
    assert!(report.dayparts.available);
    let worst = report.dayparts.worst.as_ref().unwrap();
    assert_eq!(worst.daypart, Daypart::Dinner);
    assert!(report.recommendations[4].starts_with("Worst daypart: Dinner →"));
}

#[test]
fn report_without_time_columns_notes_dayparts_unavailable() {
    let dir = TempDir::new().unwrap();
    let periods = load_periods(&dir, &[JANUARY, JANUARY]);
    let report = build_report(&ReportContext::default(), &periods);
    assert!(!report.complete);
    assert!(!report.dayparts.available);
    assert_eq!(report.recommendations.last().unwrap(), UNAVAILABLE_NOTE);
    assert_eq!(report.deltas.sales.prev, None);
    assert!(close(report.deltas.sales.mom, 0.0));
}

#[test]
fn quoted_comma_survives_parsing() {
    let table = parse_table(indoc! {r#"
        Date,Location,Sales,Labor,Transactions
        2024-03-01,"Main St, Unit 4","1,250.50",300,90
    "#});
    let row = &table.rows[0];
    assert_eq!(row.get("Location"), Some("Main St, Unit 4"));
    assert!(close(Some(aggregate(&table.rows).sales), 1250.5));
}

#[test]
fn per_client_targets_change_the_verdict() {
    let dir = TempDir::new().unwrap();
    let targets_path = dir.path().join("targets.json");
    fs::write(
        &targets_path,
        json!({
            "acme": { "avgTicketMin": 10.0 },
            "zed": { "laborPctMax": 0.20 }
        })
        .to_string(),
    )
    .unwrap();

    let periods = load_periods(&dir, &[JANUARY, FEBRUARY, MARCH]);
    let verdict = |client: &str, kpi: Kpi| {
        let ctx = ReportContext {
            targets: TargetSet::load(&targets_path, Some(client)).unwrap(),
            ..ReportContext::default()
        };
        build_report(&ctx, &periods)
            .evaluations
            .iter()
            .find(|e| e.kpi == kpi)
            .map(|e| e.on_track)
            .unwrap()
    };
    assert!(verdict("acme", Kpi::AvgTicket));
    assert!(!verdict("zed", Kpi::LaborPct));
    assert!(!verdict("other", Kpi::AvgTicket));
}

#[test]
fn snapshot_to_action_plan() {
    let snapshot = json!({
        "reviewedAt": "2024-04-02T10:00:00Z",
        "clientName": "Acme Burgers",
        "months": [
            { "month": "2024-01", "rows": [
                { "Date": "2024-01-31", "Location": "A", "Sales": 1000, "Labor": 270, "Transactions": 100 }
            ]},
            { "month": "2024-02", "rows": [
                { "Date": "2024-02-29", "Location": "A", "Sales": 1100, "Labor": 280, "Transactions": 105 }
            ]},
            { "month": "2024-03", "rows": [
                { "Date": "2024-03-31", "Location": "A", "Sales": "1,050", "Labor": 270, "Transactions": 100 }
            ]}
        ]
    });

    let periods = normalize_periods(&snapshot, PeriodKind::Monthly);
    assert_eq!(periods.len(), 3);
    assert_eq!(period_totals(&snapshot, PeriodKind::Monthly)[2].sales, 1050.0);

    let report = build_report(&ReportContext::default(), &periods);
    let tasks = build_tasks("Acme Burgers", &report.evaluations, &report.recommendations);
    let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
    assert!(titles.contains(&"Improve Sales MoM"));
    assert!(titles.contains(&"Improve Avg Ticket"));
    assert!(!titles.contains(&"Improve Labor %"));

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("plans.json");
    let mut book = PlanBook::load(&path).unwrap();
    let plan = book.ensure("2024-04-02T10:00:00Z", "acme", "Acme Burgers");
    let added = plan.merge_tasks(tasks.clone());
    assert_eq!(added, tasks.len());
    // Regenerating the same cycle adds nothing.
    assert_eq!(plan.merge_tasks(tasks), 0);
    book.save(&path).unwrap();

    let reloaded = PlanBook::load(&path).unwrap();
    let plan: &ActionPlan = reloaded.get("2024-04-02T10:00:00Z").unwrap();
    assert_eq!(plan.tasks.len(), added);
    assert_eq!(plan.open_tasks().count(), added);
}

#[test]
fn totals_only_snapshot_reaches_report_and_plan() {
    let snapshot = json!({
        "clientName": "Acme Burgers",
        "monthlyTotals": {
            "m0": { "sales": 1050, "labor": 270, "transactions": 100 },
            "m1": { "sales": 1100, "labor": 280, "transactions": 105 },
            "m2": { "sales": 1000, "labor": 270, "transactions": 100 }
        }
    });
    let report = build_snapshot_report(&ReportContext::default(), &snapshot, PeriodKind::Monthly);
    assert!(report.complete);
    assert!(close(report.deltas.sales.prev, 0.05));
    assert_eq!(report.status, StoreStatus::Improving);
    assert!(!report.dayparts.available);

    let tasks = build_tasks("Acme Burgers", &report.evaluations, &report.recommendations);
    let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
    assert!(titles.contains(&"Improve Sales MoM"));
    assert!(!titles.contains(&"Improve Labor %"));
}

#[test]
fn district_rollup_from_masterlist_and_snapshots() {
    let dir = TempDir::new().unwrap();
    let masterlist = dir.path().join("masterlist.csv");
    fs::write(
        &masterlist,
        indoc! {"
            client_id,client_name,store_id,store_name,district,region
            acme,Acme Burgers,101,Main St,North,East
            acme,Acme Burgers,102,Harbor,North,East
            acme,Acme Burgers,201,Airport,South,East
            zed,Zed Tacos,900,Depot,West,West
        "},
    )
    .unwrap();
    let registry = ClientRegistry::load(&masterlist).unwrap();
    assert_eq!(registry.districts("acme"), vec!["North", "South"]);

    let totals = |m: [(f64, f64, f64); 2]| {
        json!({
            "monthlyTotals": {
                "m0": { "sales": m[1].0, "labor": m[1].1, "transactions": m[1].2 },
                "m1": { "sales": m[0].0, "labor": m[0].1, "transactions": m[0].2 }
            }
        })
    };
    let ctx = ReportContext::default();
    let mut reports = BTreeMap::new();
    for (store, snapshot) in [
        ("101", totals([(1000.0, 270.0, 100.0), (1100.0, 260.0, 105.0)])),
        ("102", totals([(900.0, 240.0, 90.0), (950.0, 230.0, 95.0)])),
    ] {
        reports.insert(
            store.to_string(),
            build_snapshot_report(&ctx, &snapshot, PeriodKind::Monthly),
        );
    }

    let stores = store_summaries(&registry, "acme", &reports);
    assert_eq!(stores.len(), 3);
    let districts = district_rollup(&stores);
    let rows = district_rows(&districts);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].district, "North");
    assert_eq!(rows[0].stores, 2);
    assert_eq!(rows[0].improving, 2);
    assert_eq!(rows[0].sales, "$2,050.00");
    assert_eq!(rows[0].status, "Improving");
    // Airport has no snapshot.
    assert_eq!(rows[1].district, "South");
    assert_eq!(rows[1].status, "Watch");
}

fn csv_table() -> impl Strategy<Value = (Vec<String>, Vec<Vec<String>>)> {
    prop::collection::btree_set("[a-z][a-z0-9_]{0,7}", 1..6).prop_flat_map(|header| {
        let header: Vec<String> = header.into_iter().collect();
        let width = header.len();
        let rows = prop::collection::vec(
            prop::collection::vec("[A-Za-z0-9.]{1,8}", width),
            0..8,
        );
        (Just(header), rows)
    })
}

proptest! {
    /// Serialising plain rows and parsing them back gives the same rows.
    #[test]
    fn prop_parse_round_trip((header, rows) in csv_table()) {
        let mut text = header.join(",");
        text.push('\n');
        for r in &rows {
            text.push_str(&r.join(","));
            text.push('\n');
        }

        let table = parse_table(&text);
        prop_assert_eq!(&table.header, &header);

        let expected: Vec<Row> = rows
            .iter()
            .map(|r| header.iter().cloned().zip(r.iter().cloned()).collect())
            .collect();
        prop_assert_eq!(table.rows, expected);
    }
}
