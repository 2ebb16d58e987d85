use std::collections::BTreeMap;

use crate::cleanup::entity::CleanupResult;
use crate::common::entity::NANOS_PER_MILLI;
use crate::detection::entity::{Inconsistency, InconsistencyKind, normalize};
use crate::inventory::entity::{CACHE_CONVERSATIONS, Inventories};
use crate::report::entity::{AuditReport, HealthStatus, InventorySummary};

/// A kind is critical once its count exceeds this share of its backend's
/// total, in percent.
pub const CRITICAL_PERCENT: u64 = 10;

/// Cached and stored conversation counts may differ by this share of the
/// cached count, in percent, before the report calls it drift.
pub const DRIFT_PERCENT: u64 = 10;

/// Document collection holding the durable copy of cached conversations.
pub const CONVERSATION_COLLECTION: &str = "conversations";

/// Collection under which reports are persisted.
pub const REPORT_COLLECTION: &str = "audit_reports";

/// Identity of the run a report belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportContext {
    pub report_id: String,
    pub run_id: String,
    pub perform_cleanup: bool,
}

/// Report id for a run started at `run_started_at_ns`. Stable across
/// replays of the same run.
pub fn report_id_for(run_started_at_ns: u64) -> String {
    format!("audit-{}", run_started_at_ns / NANOS_PER_MILLI)
}

/// Healthy iff nothing was found. Critical when any kind's count is more
/// than [`CRITICAL_PERCENT`] of the population it is drawn from, or
/// non-zero against an empty population. Degraded otherwise.
pub fn derive_health_status(
    summary: &BTreeMap<InconsistencyKind, u64>,
    inventories: &Inventories,
) -> HealthStatus {
    let mut status = HealthStatus::Healthy;
    for (kind, count) in summary.iter().filter(|(_, c)| **c > 0) {
        let total = inventories.population_of(*kind);
        if total == 0 || count.saturating_mul(100) > CRITICAL_PERCENT.saturating_mul(total) {
            return HealthStatus::Critical;
        }
        status = HealthStatus::Degraded;
    }
    status
}

/// Compare cached sessions with stored conversations. Only judged when
/// both counts were taken, i.e. the conversation collection is audited.
pub fn conversation_drift(inventories: &Inventories) -> Option<String> {
    let stored = inventories
        .document
        .breakdown_count(CONVERSATION_COLLECTION)?;
    let cached = inventories.cache.breakdown_count(CACHE_CONVERSATIONS)?;
    let diff = cached.abs_diff(stored);
    (diff.saturating_mul(100) > DRIFT_PERCENT.saturating_mul(cached)).then(|| {
        format!(
            "conversation drift: {cached} cached sessions vs {stored} stored conversations"
        )
    })
}

/// Per-kind counts, with every kind present.
pub fn summarize(inconsistencies: &[Inconsistency]) -> BTreeMap<InconsistencyKind, u64> {
    let mut summary: BTreeMap<InconsistencyKind, u64> =
        InconsistencyKind::ALL.iter().map(|k| (*k, 0)).collect();
    for finding in inconsistencies {
        *summary.entry(finding.kind).or_insert(0) += 1;
    }
    summary
}

/// Aggregate a run's results into its report. Pure: identical inputs give
/// identical reports.
pub fn generate_reconciliation_report(
    context: &ReportContext,
    inventories: &Inventories,
    inconsistencies: &[Inconsistency],
    cleanup_results: Option<&BTreeMap<InconsistencyKind, CleanupResult>>,
    generated_at_ns: u64,
) -> AuditReport {
    let mut ordered = inconsistencies.to_vec();
    normalize(&mut ordered);
    let summary = summarize(&ordered);
    let drift = conversation_drift(inventories);
    let mut health_status = derive_health_status(&summary, inventories);
    if drift.is_some() {
        health_status = health_status.max(HealthStatus::Degraded);
    }

    let mut notes: Vec<String> = cleanup_results
        .into_iter()
        .flat_map(|results| results.values())
        .filter_map(|r| {
            r.skipped_reason
                .as_ref()
                .map(|reason| format!("{}: {reason}", r.kind))
        })
        .collect();
    notes.extend(drift);

    AuditReport {
        report_id: context.report_id.clone(),
        run_id: context.run_id.clone(),
        perform_cleanup: context.perform_cleanup,
        inventories: inventories
            .iter()
            .map(|inv| (inv.backend, InventorySummary::from(inv)))
            .collect(),
        inconsistencies: ordered,
        summary,
        cleanup_results: cleanup_results.cloned(),
        health_status,
        notes,
        generated_at_ns,
    }
}
