// crates/akashi-store/src/events.rs
// ============================================================================
// Module: Event Persistence
// Description: EventStore implementation with bulk COPY ingestion.
// Purpose: Sequence reservation, bulk insertion, replay dedupe, and archival.
// Dependencies: akashi-core, serde_json, sqlx
// ============================================================================

//! ## Overview
//! Event flushes use PostgreSQL `COPY ... FROM STDIN` in text format: one
//! encoded line per event, tab-separated, with the text-format escape rules
//! applied to every field. Sequence values come from the global
//! `agent_event_seq`; a flush reserves one block and stamps events in
//! submission order, which preserves per-run monotonicity. The whole COPY
//! commits or fails as a unit.

// ============================================================================
// SECTION: Imports
// ============================================================================

use akashi_core::AgentEvent;
use akashi_core::EventId;
use akashi_core::EventStore;
use akashi_core::OrgId;
use akashi_core::RunId;
use akashi_core::StoreError;
use akashi_core::core::time::format_micros;
use async_trait::async_trait;
use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::map_sqlx_error;
use crate::postgres::PostgresStore;
use crate::postgres::event_from_row;

// ============================================================================
// SECTION: COPY Encoding
// ============================================================================

/// COPY statement for bulk event insertion.
const COPY_EVENTS: &str = "COPY agent_events (id, org_id, agent_id, run_id, sequence_num, \
    kind, occurred_at, recorded_at, payload) FROM STDIN (FORMAT text)";

/// Escapes one field for the COPY text format.
///
/// # Invariants
/// - Backslash, tab, newline, and carriage return are escaped; everything
///   else passes through verbatim.
pub(crate) fn copy_escape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

/// Encodes one event as a COPY text line, without the trailing newline.
pub(crate) fn encode_event_line(event: &AgentEvent) -> Result<String, StoreError> {
    let payload = serde_json::to_string(&event.payload)
        .map_err(|err| StoreError::Invalid(format!("event payload: {err}")))?;
    Ok([
        event.id.as_uuid().to_string(),
        event.org_id.as_uuid().to_string(),
        copy_escape(event.agent_id.as_str()),
        event.run_id.as_uuid().to_string(),
        event.sequence_num.to_string(),
        copy_escape(event.kind.as_str()),
        format_micros(event.occurred_at),
        format_micros(event.recorded_at),
        copy_escape(&payload),
    ]
    .join("\t"))
}

// ============================================================================
// SECTION: EventStore Implementation
// ============================================================================

#[async_trait]
impl EventStore for PostgresStore {
    async fn reserve_sequence_block(&self, count: u32) -> Result<Vec<i64>, StoreError> {
        let rows = sqlx::query(
            "SELECT nextval('agent_event_seq') AS seq FROM generate_series(1, $1)",
        )
        .bind(i64::from(count))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            values.push(row.try_get::<i64, _>("seq").map_err(map_sqlx_error)?);
        }
        values.sort_unstable();
        Ok(values)
    }

    async fn insert_events(&self, events: &[AgentEvent]) -> Result<u64, StoreError> {
        if events.is_empty() {
            return Ok(0);
        }
        let mut buffer = String::new();
        for event in events {
            buffer.push_str(&encode_event_line(event)?);
            buffer.push('\n');
        }
        let mut conn = self.pool().acquire().await.map_err(map_sqlx_error)?;
        let mut copy = conn.copy_in_raw(COPY_EVENTS).await.map_err(map_sqlx_error)?;
        copy.send(buffer.as_bytes()).await.map_err(map_sqlx_error)?;
        copy.finish().await.map_err(map_sqlx_error)
    }

    async fn existing_event_ids(&self, ids: &[EventId]) -> Result<Vec<EventId>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let lookup: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query("SELECT DISTINCT id FROM agent_events WHERE id = ANY($1)")
            .bind(&lookup)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        let mut present = Vec::with_capacity(rows.len());
        for row in rows {
            present.push(EventId::from_uuid(row.try_get("id").map_err(map_sqlx_error)?));
        }
        Ok(present)
    }

    async fn events_for_run(
        &self,
        org_id: OrgId,
        run_id: RunId,
        limit: u32,
    ) -> Result<Vec<AgentEvent>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, org_id, agent_id, run_id, sequence_num, kind, occurred_at, \
             recorded_at, payload FROM agent_events \
             WHERE org_id = $1 AND run_id = $2 ORDER BY sequence_num ASC LIMIT $3",
        )
        .bind(org_id.as_uuid())
        .bind(run_id.as_uuid())
        .bind(i64::from(limit.max(1)))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(event_from_row).collect()
    }

    async fn archive_and_purge_before(
        &self,
        org_id: OrgId,
        cutoff: OffsetDateTime,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "WITH moved AS (
                DELETE FROM agent_events WHERE org_id = $1 AND occurred_at < $2 RETURNING *
            )
            INSERT INTO agent_events_archive \
                (id, org_id, agent_id, run_id, sequence_num, kind, occurred_at, recorded_at, \
                 payload)
            SELECT id, org_id, agent_id, run_id, sequence_num, kind, occurred_at, recorded_at, \
                   payload
            FROM moved",
        )
        .bind(org_id.as_uuid())
        .bind(cutoff)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use akashi_core::AgentEvent;
    use akashi_core::AgentId;
    use akashi_core::EventId;
    use akashi_core::EventKind;
    use akashi_core::OrgId;
    use akashi_core::RunId;
    use serde_json::json;
    use time::OffsetDateTime;

    use super::copy_escape;
    use super::encode_event_line;

    #[test]
    fn escape_handles_control_characters() {
        assert_eq!(copy_escape("plain"), "plain");
        assert_eq!(copy_escape("a\tb"), "a\\tb");
        assert_eq!(copy_escape("a\nb"), "a\\nb");
        assert_eq!(copy_escape("a\\b"), "a\\\\b");
        assert_eq!(copy_escape("a\rb"), "a\\rb");
    }

    #[test]
    fn encoded_line_has_nine_fields() {
        let event = AgentEvent {
            id: EventId::generate(),
            org_id: OrgId::generate(),
            agent_id: AgentId::new("planner"),
            run_id: RunId::generate(),
            sequence_num: 42,
            kind: EventKind::ToolCallStarted,
            occurred_at: OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("timestamp"),
            recorded_at: OffsetDateTime::from_unix_timestamp(1_700_000_001).expect("timestamp"),
            payload: json!({"tool": "grep", "note": "line1\nline2"}),
        };
        let line = encode_event_line(&event).expect("encode");
        assert_eq!(line.split('\t').count(), 9);
        assert!(!line.contains('\n'));
        assert!(line.contains("\\n"));
        assert!(line.contains("tool_call_started"));
    }
}
