// crates/akashi-store/src/runs.rs
// ============================================================================
// Module: Run Persistence
// Description: RunStore implementation over PostgreSQL.
// Purpose: Create and resolve agent runs and track their lifecycle.
// Dependencies: akashi-core, sqlx
// ============================================================================

//! ## Overview
//! Runs are the execution contexts grouping events and decisions. Rows are
//! immutable except status and completion (enforced by trigger); run
//! resolution picks the most recent running run for an `(agent, session)`
//! pair so traces without an explicit run land in a live context.

// ============================================================================
// SECTION: Imports
// ============================================================================

use akashi_core::AgentId;
use akashi_core::AgentRun;
use akashi_core::NotifyChannel;
use akashi_core::Notifier;
use akashi_core::OrgId;
use akashi_core::RunId;
use akashi_core::RunStatus;
use akashi_core::RunStore;
use akashi_core::SessionId;
use akashi_core::StoreError;
use async_trait::async_trait;
use serde_json::json;
use time::OffsetDateTime;

use crate::error::map_sqlx_error;
use crate::postgres::PostgresStore;
use crate::postgres::run_from_row;

// ============================================================================
// SECTION: RunStore Implementation
// ============================================================================

/// Run column list shared by every run SELECT.
const RUN_COLUMNS: &str =
    "id, org_id, agent_id, session_id, parent_run_id, status, started_at, completed_at";

#[async_trait]
impl RunStore for PostgresStore {
    async fn create_run(&self, run: &AgentRun) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO agent_runs (id, org_id, agent_id, session_id, parent_run_id, status, \
             started_at, completed_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(run.id.as_uuid())
        .bind(run.org_id.as_uuid())
        .bind(run.agent_id.as_str())
        .bind(run.session_id.as_ref().map(|session| session.as_str().to_string()))
        .bind(run.parent_run_id.map(RunId::as_uuid))
        .bind(run.status.as_str())
        .bind(run.started_at)
        .bind(run.completed_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        self.notify(
            NotifyChannel::Runs,
            &json!({"org_id": run.org_id, "run_id": run.id, "agent_id": run.agent_id}),
        )
        .await
    }

    async fn run(&self, org_id: OrgId, id: RunId) -> Result<AgentRun, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RUN_COLUMNS} FROM agent_runs WHERE org_id = $1 AND id = $2"
        ))
        .bind(org_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        row.map_or_else(|| Err(StoreError::NotFound(format!("run {id}"))), |row| run_from_row(&row))
    }

    async fn latest_running_run(
        &self,
        org_id: OrgId,
        agent_id: &AgentId,
        session_id: Option<&SessionId>,
    ) -> Result<Option<AgentRun>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RUN_COLUMNS} FROM agent_runs \
             WHERE org_id = $1 AND agent_id = $2 AND status = 'running' \
               AND session_id IS NOT DISTINCT FROM $3 \
             ORDER BY started_at DESC LIMIT 1"
        ))
        .bind(org_id.as_uuid())
        .bind(agent_id.as_str())
        .bind(session_id.map(|session| session.as_str().to_string()))
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        row.as_ref().map(run_from_row).transpose()
    }

    async fn update_run_status(
        &self,
        org_id: OrgId,
        id: RunId,
        status: RunStatus,
        completed_at: Option<OffsetDateTime>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE agent_runs SET status = $1, completed_at = $2 \
             WHERE org_id = $3 AND id = $4",
        )
        .bind(status.as_str())
        .bind(completed_at)
        .bind(org_id.as_uuid())
        .bind(id.as_uuid())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("run {id}")));
        }
        Ok(())
    }
}
