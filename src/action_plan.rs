// Action plan generated from an approved KPI review.
//
// Off-track KPIs and recommendations become tasks; tasks live in a plan keyed
// by the approval cycle so regenerating never duplicates work already on it.
use crate::error::Result;
use crate::types::{KpiEvaluation, TaskRow};
use crate::util::{format_money, format_pct};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

const MAX_TITLE_CHARS: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Open,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub tag: String,
    pub owner: String,
    pub due: Option<NaiveDate>,
    pub status: TaskStatus,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(title: &str, notes: &str, tag: &str) -> Self {
        Task {
            id: format!("t_{}", Uuid::new_v4().simple()),
            title: title.trim().to_string(),
            tag: tag.to_string(),
            owner: String::new(),
            due: None,
            status: TaskStatus::Open,
            notes: notes.to_string(),
            created_at: Utc::now(),
        }
    }

    fn key(&self) -> String {
        title_key(&self.title)
    }
}

fn title_key(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Compact task title from a recommendation: the text before the first
/// `→`, `>` or `:`, whitespace collapsed, cut to 48 characters.
pub fn short_title_from_rec(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let first = collapsed
        .split(['→', '>', ':'])
        .next()
        .unwrap_or_default()
        .trim();
    if first.is_empty() {
        return "Recommendation Task".to_string();
    }
    if first.chars().count() > MAX_TITLE_CHARS {
        let cut: String = first.chars().take(MAX_TITLE_CHARS).collect();
        format!("{}…", cut)
    } else {
        first.to_string()
    }
}

fn format_kpi_value(e: &KpiEvaluation, v: Option<f64>) -> String {
    if e.kpi.is_money() {
        format_money(v)
    } else {
        format_pct(v, 1)
    }
}

/// Tasks for every off-track KPI and every non-empty recommendation,
/// de-duplicated by title (first one wins).
pub fn build_tasks(
    client_name: &str,
    evaluations: &[KpiEvaluation],
    recommendations: &[String],
) -> Vec<Task> {
    let kpi_tasks = evaluations.iter().filter(|e| !e.on_track).map(|e| {
        let label = e.kpi.label();
        let notes = [
            format!("Client: {}", client_name),
            format!("KPI: {}", label),
            format!("Actual: {}", format_kpi_value(e, e.actual)),
            format!("Target: {}", format_kpi_value(e, Some(e.target))),
            "Focus: close variance and return to target.".to_string(),
        ]
        .join("\n");
        Task::new(&format!("Improve {}", label), &notes, label)
    });

    let rec_tasks = recommendations
        .iter()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .map(|r| Task::new(&short_title_from_rec(r), r, "Recommendation"));

    let mut seen = HashSet::new();
    kpi_tasks
        .chain(rec_tasks)
        .filter(|t| seen.insert(t.key()))
        .collect()
}

/// Stable id of an approval cycle: `reviewedAt`, then `createdAt`.
pub fn cycle_id(approved: &Value) -> String {
    ["reviewedAt", "createdAt"]
        .iter()
        .find_map(|k| approved.get(*k).and_then(Value::as_str))
        .unwrap_or("unknown")
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub cycle_id: String,
    pub client_id: String,
    pub client_name: String,
    pub created_at: DateTime<Utc>,
    pub tasks: Vec<Task>,
}

impl ActionPlan {
    pub fn new(cycle_id: &str, client_id: &str, client_name: &str) -> Self {
        ActionPlan {
            cycle_id: cycle_id.to_string(),
            client_id: client_id.to_string(),
            client_name: client_name.to_string(),
            created_at: Utc::now(),
            tasks: Vec::new(),
        }
    }

    /// Push each task whose title isn't already on the plan onto the front,
    /// one at a time, so the last new task ends up first. Returns how many
    /// were added.
    pub fn merge_tasks(&mut self, new_tasks: Vec<Task>) -> usize {
        let mut existing: HashSet<String> = self.tasks.iter().map(Task::key).collect();
        let mut fresh: Vec<Task> = new_tasks
            .into_iter()
            .filter(|t| existing.insert(t.key()))
            .collect();
        let added = fresh.len();
        fresh.reverse();
        self.tasks.splice(0..0, fresh);
        debug!(cycle = %self.cycle_id, added, "merged tasks");
        added
    }

    pub fn add_task(&mut self, title: &str) -> Option<&Task> {
        let title = title.trim();
        if title.is_empty() {
            return None;
        }
        self.tasks.insert(0, Task::new(title, "", "Manual"));
        self.tasks.first()
    }

    fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    pub fn set_status(&mut self, id: &str, status: TaskStatus) -> bool {
        self.task_mut(id).map(|t| t.status = status).is_some()
    }

    pub fn update_task(&mut self, id: &str, owner: &str, due: Option<NaiveDate>, notes: &str) -> bool {
        self.task_mut(id)
            .map(|t| {
                t.owner = owner.to_string();
                t.due = due;
                t.notes = notes.to_string();
            })
            .is_some()
    }

    pub fn remove_task(&mut self, id: &str) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        self.tasks.len() != before
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    pub fn open_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| t.status == TaskStatus::Open)
    }

    pub fn done_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| t.status == TaskStatus::Done)
    }

    pub fn table_rows(&self) -> Vec<TaskRow> {
        self.tasks
            .iter()
            .map(|t| TaskRow {
                status: match t.status {
                    TaskStatus::Open => "Open".to_string(),
                    TaskStatus::Done => "Done".to_string(),
                },
                title: t.title.clone(),
                tag: t.tag.clone(),
                owner: t.owner.clone(),
                due: t.due.map(|d| d.to_string()).unwrap_or_default(),
            })
            .collect()
    }
}

/// All plans, keyed by cycle id, as persisted on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanBook {
    plans: BTreeMap<String, ActionPlan>,
}

impl PlanBook {
    /// A missing file is an empty book.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(PlanBook::default());
        }
        let text = std::fs::read_to_string(path)?;
        let book: PlanBook = serde_json::from_str(&text)?;
        info!(path = %path.display(), plans = book.plans.len(), "loaded action plans");
        Ok(book)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn get(&self, cycle_id: &str) -> Option<&ActionPlan> {
        self.plans.get(cycle_id)
    }

    pub fn ensure(&mut self, cycle_id: &str, client_id: &str, client_name: &str) -> &mut ActionPlan {
        self.plans
            .entry(cycle_id.to_string())
            .or_insert_with(|| ActionPlan::new(cycle_id, client_id, client_name))
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}
