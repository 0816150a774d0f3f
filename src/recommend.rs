use crate::daypart::DaypartSummary;
use crate::types::{Kpi, KpiEvaluation};

/// Fixed guidance for one KPI in one state.
pub fn recommendation(kpi: Kpi, on_track: bool) -> &'static str {
    match (kpi, on_track) {
        (Kpi::SalesGrowth, true) => {
            "Sales growth on track → document what's working (daypart/channel/item mix)."
        }
        (Kpi::SalesGrowth, false) => {
            "Sales growth below target → focus on top sellers, traffic drivers and execution consistency."
        }
        (Kpi::TransactionsGrowth, true) => {
            "Transactions on track → keep throughput consistent and protect peak times."
        }
        (Kpi::TransactionsGrowth, false) => {
            "Transactions below target → tighten speed of service, promos/signage and local marketing."
        }
        (Kpi::LaborPct, true) => {
            "Labor on track → maintain staffing plan while controlling slow periods."
        }
        (Kpi::LaborPct, false) => {
            "Labor above target → audit schedules by daypart and reduce overtime."
        }
        (Kpi::AvgTicket, true) => "Avg ticket on track → keep upsell coaching and tracking.",
        (Kpi::AvgTicket, false) => {
            "Avg ticket below target → coach add-ons and make suggestive selling consistent."
        }
    }
}

/// One message per evaluation, in the evaluations' order.
pub fn recommend(evaluations: &[KpiEvaluation]) -> Vec<String> {
    evaluations
        .iter()
        .map(|e| recommendation(e.kpi, e.on_track).to_string())
        .collect()
}

/// [`recommend`] plus a line naming the worst daypart, or the advisory note
/// when the rows carried no shift/time information.
pub fn recommend_with_daypart(
    evaluations: &[KpiEvaluation],
    dayparts: &DaypartSummary,
) -> Vec<String> {
    let mut recs = recommend(evaluations);
    match &dayparts.worst {
        Some(worst) if dayparts.available => recs.push(format!(
            "Worst daypart: {} → review staffing and execution in this window ({}).",
            worst.daypart,
            worst.reasons.join(", ")
        )),
        _ => recs.push(dayparts.note.clone()),
    }
    recs
}
