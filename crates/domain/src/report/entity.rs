use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::cleanup::entity::CleanupResult;
use crate::common::entity::Backend;
use crate::detection::entity::{Inconsistency, InconsistencyKind};
use crate::inventory::entity::StoreInventory;

/// Overall health of the memory system, derived from inconsistency counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Critical => "critical",
        }
    }

    /// Gauge encoding: 0 healthy, 1 degraded, 2 critical.
    pub fn gauge_value(self) -> u8 {
        match self {
            Self::Healthy => 0,
            Self::Degraded => 1,
            Self::Critical => 2,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a report keeps of an inventory. Id sets stay in the run journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySummary {
    pub total_count: u64,
    pub ids_collected: u64,
    pub scope: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub breakdown: BTreeMap<String, u64>,
    pub collected_at_ns: u64,
}

impl From<&StoreInventory> for InventorySummary {
    fn from(inventory: &StoreInventory) -> Self {
        Self {
            total_count: inventory.total_count,
            ids_collected: inventory.ids.len() as u64,
            scope: inventory.scope.clone(),
            breakdown: inventory.breakdown.clone(),
            collected_at_ns: inventory.collected_at_ns,
        }
    }
}

/// Immutable result of one audit run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub report_id: String,
    pub run_id: String,
    pub perform_cleanup: bool,
    pub inventories: BTreeMap<Backend, InventorySummary>,
    /// Grouped by kind, sorted by subject id within a kind.
    pub inconsistencies: Vec<Inconsistency>,
    pub summary: BTreeMap<InconsistencyKind, u64>,
    /// Present only when cleanup was requested.
    pub cleanup_results: Option<BTreeMap<InconsistencyKind, CleanupResult>>,
    pub health_status: HealthStatus,
    pub notes: Vec<String>,
    pub generated_at_ns: u64,
}

impl AuditReport {
    pub fn count_of(&self, kind: InconsistencyKind) -> u64 {
        self.summary.get(&kind).copied().unwrap_or(0)
    }

    pub fn total_inconsistencies(&self) -> u64 {
        self.summary.values().sum()
    }

    /// Plain-text digest for notification sinks.
    pub fn summary_text(&self) -> String {
        let mut text = format!(
            "Memory audit {} ({}): health {}\n",
            self.report_id, self.run_id, self.health_status
        );
        for (backend, inventory) in &self.inventories {
            let _ = write!(text, "  {backend}: {} records", inventory.total_count);
            if !inventory.breakdown.is_empty() {
                let parts: Vec<String> = inventory
                    .breakdown
                    .iter()
                    .map(|(part, count)| format!("{part} {count}"))
                    .collect();
                let _ = write!(text, " ({})", parts.join(", "));
            }
            text.push('\n');
        }
        for (kind, count) in self.summary.iter().filter(|(_, c)| **c > 0) {
            let _ = writeln!(text, "  {kind}: {count}");
        }
        if let Some(results) = &self.cleanup_results {
            for (kind, result) in results {
                let _ = writeln!(
                    text,
                    "  cleanup {kind}: {}/{} deleted, {} failed",
                    result.succeeded_count,
                    result.attempted_count,
                    result.failed_ids.len()
                );
            }
        }
        for note in &self.notes {
            let _ = writeln!(text, "  note: {note}");
        }
        text
    }
}
