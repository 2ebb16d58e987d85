use std::collections::BTreeMap;

use domain::cleanup::entity::CleanupResult;
use domain::common::entity::current_timestamp_ns;
use domain::common::error::StoreError;
use domain::detection::entity::{Inconsistency, InconsistencyKind};
use domain::inventory::entity::{Inventories, document_key};
use domain::report::engine::{ReportContext, generate_reconciliation_report};
use domain::report::entity::AuditReport;
use domain::workflow::error::ActivityError;

use super::AuditActivities;

impl AuditActivities {
    pub fn generate_reconciliation_report(
        &self,
        context: &ReportContext,
        inventories: &Inventories,
        inconsistencies: &[Inconsistency],
        cleanup_results: Option<&BTreeMap<InconsistencyKind, CleanupResult>>,
    ) -> AuditReport {
        generate_reconciliation_report(
            context,
            inventories,
            inconsistencies,
            cleanup_results,
            current_timestamp_ns(),
        )
    }

    /// Persist `report` under `<report_collection>/<report_id>`. Writing the
    /// same report twice leaves one document.
    pub async fn store_audit_report(&self, report: &AuditReport) -> Result<String, ActivityError> {
        let body = serde_json::to_value(report)
            .map_err(|e| ActivityError::Internal(format!("encode report: {e}")))?;
        self.documents
            .put(&self.settings.report_collection, &report.report_id, &body)
            .await?;
        tracing::info!(report_id = %report.report_id, "audit report stored");
        Ok(report.report_id.clone())
    }

    pub async fn notify(&self, summary: &str) -> Result<(), ActivityError> {
        self.notifier.send(summary).await?;
        tracing::debug!(sink = self.notifier.name(), "audit summary delivered");
        Ok(())
    }

    pub async fn load_report(&self, report_id: &str) -> Result<Option<AuditReport>, ActivityError> {
        let key = document_key(&self.settings.report_collection, report_id);
        let record = match self.documents.get(&key).await {
            Ok(Some(record)) => record,
            Ok(None) | Err(StoreError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_value(record.body)
            .map(Some)
            .map_err(|e| ActivityError::Validation(format!("stored report {report_id}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::Fixture;
    use domain::report::engine::ReportContext;
    use domain::report::entity::HealthStatus;

    fn context() -> ReportContext {
        ReportContext {
            report_id: "audit-1700000000000".into(),
            run_id: "memory-audit-1700000000000".into(),
            perform_cleanup: false,
        }
    }

    #[tokio::test]
    async fn store_then_load_report() {
        let fixture = Fixture::new();
        fixture.seed_linked_memories(2);
        let activities = fixture.activities();
        let inventories = fixture.inventories().await;
        let report = activities.generate_reconciliation_report(&context(), &inventories, &[], None);

        let id = activities.store_audit_report(&report).await.unwrap();
        activities.store_audit_report(&report).await.unwrap();

        assert_eq!(id, "audit-1700000000000");
        let loaded = activities.load_report(&id).await.unwrap().unwrap();
        assert_eq!(loaded, report);
        assert_eq!(loaded.health_status, HealthStatus::Healthy);
        assert!(fixture.documents.inner.contains("audit_reports/audit-1700000000000"));
    }

    #[tokio::test]
    async fn unknown_report_is_none() {
        let fixture = Fixture::new();
        assert!(fixture.activities().load_report("audit-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn notify_reaches_sink() {
        let fixture = Fixture::new();
        fixture.activities().notify("all good").await.unwrap();
        assert_eq!(fixture.sink.sent(), vec!["all good"]);
    }
}
