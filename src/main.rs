// Entry point and CLI flow.
//
// - `validate` checks uploads for required columns and data rows.
// - `report` builds the KPI report from CSV periods or a stored snapshot,
//   prints markdown previews and optionally exports CSV/JSON.
// - `plan` turns an approved snapshot into action-plan tasks kept in a JSON
//   plan book.
// - `districts` reports every masterlist store of a client from its stored
//   snapshot and rolls the stores up by district.
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use qsr_kpi::action_plan::{build_tasks, cycle_id, PlanBook, TaskStatus};
use qsr_kpi::loader::{column_names, period_label, validate_upload};
use qsr_kpi::masterlist::ClientRegistry;
use qsr_kpi::output::{preview_table, write_csv, write_json};
use qsr_kpi::reports::{
    build_report, build_snapshot_report, district_rollup, district_rows, store_rows,
    store_summaries, KpiReport, ReportContext, PERIODS_NEEDED,
};
use qsr_kpi::snapshot::{Period, PeriodKind};
use qsr_kpi::targets::TargetSet;
use qsr_kpi::types::{Row, MONTHLY_COLUMNS};
use qsr_kpi::util::format_int;
use qsr_kpi::KpiError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "qsr-kpi", version, about = "Sales and labor KPI reports for store uploads")]
struct Cli {
    /// Debug logging (RUST_LOG still wins when set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check uploads for required columns and data rows
    Validate {
        /// CSV files to check
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Build the KPI report
    Report {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Fail unless three periods are available
        #[arg(long)]
        strict: bool,

        /// Write kpi_cards.csv, targets.csv, dayparts.csv and report.json here
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Table rows shown per preview
        #[arg(long, default_value_t = 10)]
        max_rows: usize,
    },

    /// Generate or update the action plan for an approved snapshot
    Plan {
        /// Approved snapshot JSON
        #[arg(short, long)]
        snapshot: PathBuf,

        /// Snapshot holds weekly periods
        #[arg(long)]
        weekly: bool,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Plan book file, created when missing
        #[arg(long, default_value = "action_plans.json")]
        plans: PathBuf,

        /// Mark task ids done
        #[arg(long = "done", value_name = "TASK_ID")]
        done: Vec<String>,

        /// Remove task ids
        #[arg(long = "remove", value_name = "TASK_ID")]
        remove: Vec<String>,

        /// Add a manual task
        #[arg(long = "add", value_name = "TITLE")]
        add: Vec<String>,
    },

    /// Store and district rollup for the clients in a masterlist
    Districts {
        /// Client/store masterlist CSV
        #[arg(short, long)]
        masterlist: PathBuf,

        /// Only this client id (default: every client)
        #[arg(short, long)]
        client: Option<String>,

        /// Snapshot directory laid out as <client_id>/<store_id>.json
        #[arg(short, long)]
        snapshots: PathBuf,

        /// Snapshots hold weekly periods
        #[arg(long)]
        weekly: bool,

        /// Targets JSON, a single set or a map keyed by client id
        #[arg(short, long, env = "QSR_KPI_TARGETS")]
        targets: Option<PathBuf>,

        /// Write <client>_stores.csv and <client>_districts.csv here
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Table rows shown per preview
        #[arg(long, default_value_t = 20)]
        max_rows: usize,
    },
}

#[derive(Args)]
struct InputArgs {
    /// One period, oldest first; comma-separate several files of one period
    #[arg(short, long = "period", value_name = "FILES")]
    periods: Vec<String>,

    /// Approved snapshot JSON instead of CSV periods
    #[arg(short, long, conflicts_with = "periods")]
    snapshot: Option<PathBuf>,

    /// Snapshot holds weekly periods
    #[arg(long, requires = "snapshot")]
    weekly: bool,
}

#[derive(Args)]
struct ScopeArgs {
    /// Targets JSON, a single set or a map keyed by client id
    #[arg(short, long, env = "QSR_KPI_TARGETS")]
    targets: Option<PathBuf>,

    /// Client id for per-client targets and masterlist lookup
    #[arg(short, long)]
    client: Option<String>,

    /// Store id the data belongs to
    #[arg(long)]
    store: Option<String>,

    /// Client/store masterlist CSV
    #[arg(short, long)]
    masterlist: Option<PathBuf>,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Validate { files } => validate_command(&files),
        Commands::Report {
            input,
            scope,
            strict,
            out_dir,
            max_rows,
        } => report_command(&input, &scope, strict, out_dir.as_deref(), max_rows),
        Commands::Plan {
            snapshot,
            weekly,
            scope,
            plans,
            done,
            remove,
            add,
        } => {
            let edits = PlanEdits { done, remove, add };
            plan_command(&snapshot, weekly, &scope, &plans, &edits)
        }
        Commands::Districts {
            masterlist,
            client,
            snapshots,
            weekly,
            targets,
            out_dir,
            max_rows,
        } => {
            let args = DistrictArgs {
                masterlist,
                client,
                snapshots,
                weekly,
                targets,
                out_dir,
                max_rows,
            };
            districts_command(&args)
        }
    }
}

fn validate_command(files: &[PathBuf]) -> Result<()> {
    let required = column_names(&MONTHLY_COLUMNS);
    let mut failed = 0usize;
    for path in files {
        let name = path.display().to_string();
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", name))?;
        match validate_upload(&name, &text, &required) {
            Ok(table) => println!("OK     {} ({} rows)", name, format_int(table.rows.len() as i64)),
            Err(e) => {
                failed += 1;
                println!("FAILED {}", e);
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{} of {} file(s) failed validation", failed, files.len());
    }
    Ok(())
}

/// Rows of one period, read from each comma-separated file in `files`.
fn load_period(index: usize, files: &str) -> Result<Period> {
    let required = column_names(&MONTHLY_COLUMNS);
    let mut rows: Vec<Row> = Vec::new();
    for file in files.split(',').map(str::trim).filter(|f| !f.is_empty()) {
        let text = std::fs::read_to_string(file).with_context(|| format!("reading {}", file))?;
        let table = validate_upload(file, &text, &required)?;
        debug!(file, rows = table.rows.len(), "period file loaded");
        rows.extend(table.rows);
    }
    let label = period_label(&rows).unwrap_or_else(|| format!("Period {}", index + 1));
    Ok(Period { label, rows })
}

fn read_snapshot(path: &Path) -> Result<Value> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn period_kind(weekly: bool) -> PeriodKind {
    if weekly {
        PeriodKind::Weekly
    } else {
        PeriodKind::Monthly
    }
}

fn load_targets(path: Option<&Path>, client: Option<&str>) -> Result<TargetSet> {
    match path {
        Some(path) => {
            info!(path = %path.display(), ?client, "loading targets");
            TargetSet::load(path, client)
                .with_context(|| format!("loading targets from {}", path.display()))
        }
        None => {
            debug!("using default targets");
            Ok(TargetSet::default())
        }
    }
}

/// Empty reports are always refused; short ones only under `--strict`.
fn check_periods(report: &KpiReport, strict: bool) -> Result<()> {
    let found = report.periods.len();
    if found == 0 || (strict && found < PERIODS_NEEDED) {
        return Err(KpiError::InsufficientPeriods {
            needed: PERIODS_NEEDED,
            found,
        }
        .into());
    }
    Ok(())
}

fn load_context(scope: &ScopeArgs) -> Result<ReportContext> {
    let client = scope.client.as_deref();
    let targets = load_targets(scope.targets.as_deref(), client)?;

    let client_name = match (&scope.masterlist, client) {
        (Some(path), Some(id)) => {
            let registry = ClientRegistry::load(path)
                .with_context(|| format!("loading masterlist {}", path.display()))?;
            let name = registry.client(id).map(|c| c.name.clone());
            if name.is_none() {
                warn!(client = id, "client not found in masterlist");
            }
            name
        }
        _ => None,
    };

    Ok(ReportContext {
        targets,
        client_id: scope.client.clone(),
        client_name,
        store_id: scope.store.clone(),
    })
}

fn print_report(report: &KpiReport, max_rows: usize) {
    let who = report
        .client_name
        .as_deref()
        .or(report.client_id.as_deref())
        .unwrap_or("All clients");
    let labels: Vec<&str> = report.periods.iter().map(|p| p.label.as_str()).collect();
    println!("KPI Report: {}", who);
    println!("Periods: {}", labels.join(", "));
    println!("Store status: {}\n", report.status.label());

    preview_table(
        "KPI Summary",
        Some("MoM and Prev relative to current period"),
        &report.card_rows(),
        max_rows,
    );
    preview_table("Targets", None, &report.target_rows(), max_rows);
    if report.dayparts.available {
        preview_table("Dayparts", Some("current period"), &report.daypart_rows(), max_rows);
    }

    println!("Recommendations");
    for (i, rec) in report.recommendations.iter().enumerate() {
        println!("{}. {}", i + 1, rec);
    }
    println!();
}

fn export_report(report: &KpiReport, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    write_csv(&dir.join("kpi_cards.csv"), &report.card_rows())?;
    write_csv(&dir.join("targets.csv"), &report.target_rows())?;
    write_csv(&dir.join("dayparts.csv"), &report.daypart_rows())?;
    write_json(&dir.join("report.json"), report)?;
    println!("(Full tables exported to {})\n", dir.display());
    Ok(())
}

fn report_command(
    input: &InputArgs,
    scope: &ScopeArgs,
    strict: bool,
    out_dir: Option<&Path>,
    max_rows: usize,
) -> Result<()> {
    let ctx = load_context(scope)?;
    let report = match &input.snapshot {
        Some(path) => build_snapshot_report(&ctx, &read_snapshot(path)?, period_kind(input.weekly)),
        None => {
            let periods = input
                .periods
                .iter()
                .enumerate()
                .map(|(i, files)| load_period(i, files))
                .collect::<Result<Vec<Period>>>()?;
            build_report(&ctx, &periods)
        }
    };
    check_periods(&report, strict)?;

    print_report(&report, max_rows);
    if let Some(dir) = out_dir {
        export_report(&report, dir)?;
    }
    Ok(())
}

struct PlanEdits {
    done: Vec<String>,
    remove: Vec<String>,
    add: Vec<String>,
}

fn plan_command(
    snapshot_path: &Path,
    weekly: bool,
    scope: &ScopeArgs,
    plans_path: &Path,
    edits: &PlanEdits,
) -> Result<()> {
    let snapshot = read_snapshot(snapshot_path)?;
    let mut ctx = load_context(scope)?;
    let snapshot_str = |key: &str| snapshot.get(key).and_then(Value::as_str).map(str::to_string);
    ctx.client_id = ctx.client_id.or_else(|| snapshot_str("clientId"));
    ctx.client_name = ctx.client_name.or_else(|| snapshot_str("clientName"));
    let report = build_snapshot_report(&ctx, &snapshot, period_kind(weekly));
    check_periods(&report, false)?;

    let client_id = ctx.client_id.clone().unwrap_or_default();
    let client_name = ctx
        .client_name
        .clone()
        .unwrap_or_else(|| "Client".to_string());
    let cycle = cycle_id(&snapshot);

    let mut book = PlanBook::load(plans_path)
        .with_context(|| format!("loading plans from {}", plans_path.display()))?;
    let plan = book.ensure(&cycle, &client_id, &client_name);
    let added = plan.merge_tasks(build_tasks(
        &client_name,
        &report.evaluations,
        &report.recommendations,
    ));
    for title in &edits.add {
        plan.add_task(title);
    }
    for id in &edits.done {
        if !plan.set_status(id, TaskStatus::Done) {
            warn!(task = %id, "no such task");
        }
    }
    for id in &edits.remove {
        if !plan.remove_task(id) {
            warn!(task = %id, "no such task");
        }
    }

    let rows = plan.table_rows();
    let (open, done) = (plan.open_tasks().count(), plan.done_tasks().count());
    book.save(plans_path)
        .with_context(|| format!("saving plans to {}", plans_path.display()))?;
    info!(cycle = %cycle, added, open, done, "action plan updated");

    println!("Action Plan: {} (cycle {})", client_name, cycle);
    println!("{} open, {} done, {} new\n", open, done, added);
    preview_table("Tasks", None, &rows, rows.len());
    Ok(())
}

struct DistrictArgs {
    masterlist: PathBuf,
    client: Option<String>,
    snapshots: PathBuf,
    weekly: bool,
    targets: Option<PathBuf>,
    out_dir: Option<PathBuf>,
    max_rows: usize,
}

fn districts_command(args: &DistrictArgs) -> Result<()> {
    let registry = ClientRegistry::load(&args.masterlist)
        .with_context(|| format!("loading masterlist {}", args.masterlist.display()))?;
    let clients = match &args.client {
        Some(id) => vec![registry
            .client(id)
            .with_context(|| format!("client {} not in masterlist", id))?],
        None => registry.clients_by_name(),
    };
    if let Some(dir) = &args.out_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    for client in clients {
        let ctx = ReportContext {
            targets: load_targets(args.targets.as_deref(), Some(&client.id))?,
            client_id: Some(client.id.clone()),
            client_name: Some(client.name.clone()),
            store_id: None,
        };

        let mut reports: BTreeMap<String, KpiReport> = BTreeMap::new();
        for store in registry.stores(&client.id) {
            let path = args
                .snapshots
                .join(&client.id)
                .join(format!("{}.json", store.store_id));
            if !path.exists() {
                debug!(client = %client.id, store = %store.store_id, "no snapshot");
                continue;
            }
            let ctx = ReportContext {
                store_id: Some(store.store_id.clone()),
                ..ctx.clone()
            };
            let report = build_snapshot_report(&ctx, &read_snapshot(&path)?, period_kind(args.weekly));
            reports.insert(store.store_id.clone(), report);
        }

        let stores = store_summaries(&registry, &client.id, &reports);
        let districts = district_rollup(&stores);
        info!(
            client = %client.id,
            stores = stores.len(),
            reported = reports.len(),
            districts = districts.len(),
            "district rollup"
        );

        println!("District Rollup: {}", client.name);
        println!("Districts: {}\n", registry.districts(&client.id).join(", "));
        let (store_table, district_table) = (store_rows(&stores), district_rows(&districts));
        preview_table("Districts", None, &district_table, args.max_rows);
        preview_table("Stores", Some("current period"), &store_table, args.max_rows);

        if let Some(dir) = &args.out_dir {
            write_csv(&dir.join(format!("{}_stores.csv", client.id)), &store_table)?;
            write_csv(&dir.join(format!("{}_districts.csv", client.id)), &district_table)?;
            println!("(Full tables exported to {})\n", dir.display());
        }
    }
    Ok(())
}
