// crates/akashi-store/src/migrate.rs
// ============================================================================
// Module: Migration Runner
// Description: Embedded, numbered SQL migrations with checksum verification.
// Purpose: Apply schema changes in order and fail closed on drift.
// Dependencies: akashi-core, sha2, sqlx
// ============================================================================

//! ## Overview
//! Migrations are numbered SQL files embedded at compile time. The runner
//! verifies the sequence is gapless and starts at one, re-verifies the
//! checksum of every already-applied version against `schema_migrations`,
//! and applies each pending file inside its own transaction. A missing
//! file, a gap, or a checksum mismatch is fatal: the process must not start
//! against a drifted schema.

// ============================================================================
// SECTION: Imports
// ============================================================================

use akashi_core::StoreError;
use sha2::Digest;
use sha2::Sha256;
use sqlx::Executor;
use sqlx::PgPool;
use sqlx::Row;

use crate::error::map_sqlx_error;

// ============================================================================
// SECTION: Embedded Migrations
// ============================================================================

/// One embedded migration file.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// 1-based version number.
    pub version: i64,
    /// Short migration name.
    pub name: &'static str,
    /// Full SQL text.
    pub sql: &'static str,
}

/// Embedded migration set, in order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "core",
        sql: include_str!("../migrations/0001_core.sql"),
    },
    Migration {
        version: 2,
        name: "events",
        sql: include_str!("../migrations/0002_events.sql"),
    },
    Migration {
        version: 3,
        name: "conflicts",
        sql: include_str!("../migrations/0003_conflicts.sql"),
    },
    Migration {
        version: 4,
        name: "outbox_integrity",
        sql: include_str!("../migrations/0004_outbox_integrity.sql"),
    },
    Migration {
        version: 5,
        name: "audit_idempotency",
        sql: include_str!("../migrations/0005_audit_idempotency.sql"),
    },
];

/// Tables whose presence is verified after migrations run.
pub const EXPECTED_TABLES: &[&str] = &[
    "organizations",
    "agents",
    "api_keys",
    "agent_runs",
    "decisions",
    "decision_alternatives",
    "decision_evidence",
    "decision_claims",
    "agent_events",
    "agent_events_archive",
    "scored_conflicts",
    "access_grants",
    "search_outbox",
    "search_outbox_dead_letters",
    "integrity_proofs",
    "mutation_audit_log",
    "deletion_audit_log",
    "idempotency_keys",
];

// ============================================================================
// SECTION: Checksums and Sequence Checks
// ============================================================================

/// Computes the hex checksum of one migration's SQL text.
#[must_use]
pub fn migration_checksum(sql: &str) -> String {
    let digest = Sha256::digest(sql.as_bytes());
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Verifies the embedded set is gapless and 1-based.
///
/// # Errors
///
/// Returns [`StoreError::Fatal`] on an empty set, a wrong starting version,
/// or a gap.
pub fn verify_sequence(migrations: &[Migration]) -> Result<(), StoreError> {
    if migrations.is_empty() {
        return Err(StoreError::Fatal("no embedded migrations".to_string()));
    }
    for (index, migration) in migrations.iter().enumerate() {
        let expected = i64::try_from(index)
            .map_err(|_| StoreError::Fatal("migration index overflow".to_string()))?
            + 1;
        if migration.version != expected {
            return Err(StoreError::Fatal(format!(
                "migration sequence broken at {} (expected version {expected})",
                migration.version
            )));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Applies pending migrations and verifies applied checksums.
///
/// # Errors
///
/// Returns [`StoreError::Fatal`] on sequence or checksum drift and the
/// mapped driver error when a statement fails.
pub async fn run_migrations(pool: &PgPool) -> Result<u32, StoreError> {
    verify_sequence(MIGRATIONS)?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    bigint PRIMARY KEY,
            name       text NOT NULL,
            checksum   text NOT NULL,
            applied_at timestamptz NOT NULL DEFAULT now()
        )",
    )
    .execute(pool)
    .await
    .map_err(map_sqlx_error)?;

    let applied = sqlx::query("SELECT version, checksum FROM schema_migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .map_err(map_sqlx_error)?;

    let mut applied_count: u32 = 0;
    for migration in MIGRATIONS {
        let checksum = migration_checksum(migration.sql);
        let recorded = applied.iter().find_map(|row| {
            let version: i64 = row.get("version");
            (version == migration.version).then(|| row.get::<String, _>("checksum"))
        });
        match recorded {
            Some(stored) if stored == checksum => {}
            Some(_) => {
                return Err(StoreError::Fatal(format!(
                    "migration {} checksum drift",
                    migration.version
                )));
            }
            None => {
                apply_one(pool, migration, &checksum).await?;
                applied_count += 1;
            }
        }
    }

    tracing::info!(applied = applied_count, total = MIGRATIONS.len(), "migrations verified");
    Ok(applied_count)
}

/// Applies one migration inside its own transaction.
async fn apply_one(pool: &PgPool, migration: &Migration, checksum: &str) -> Result<(), StoreError> {
    let mut tx = pool.begin().await.map_err(map_sqlx_error)?;
    // Unprepared execution: migration files hold multiple statements.
    (&mut *tx).execute(migration.sql).await.map_err(map_sqlx_error)?;
    sqlx::query("INSERT INTO schema_migrations (version, name, checksum) VALUES ($1, $2, $3)")
        .bind(migration.version)
        .bind(migration.name)
        .bind(checksum)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
    tx.commit().await.map_err(map_sqlx_error)?;
    tracing::info!(version = migration.version, name = migration.name, "migration applied");
    Ok(())
}

/// Verifies every expected table exists after migrations run.
///
/// # Errors
///
/// Returns [`StoreError::Fatal`] naming the first missing table.
pub async fn verify_schema(pool: &PgPool) -> Result<(), StoreError> {
    for table in EXPECTED_TABLES {
        let present: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )",
        )
        .bind(table)
        .fetch_one(pool)
        .await
        .map_err(map_sqlx_error)?;
        if !present {
            return Err(StoreError::Fatal(format!("expected table {table} is missing")));
        }
    }
    Ok(())
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

    use super::MIGRATIONS;
    use super::Migration;
    use super::migration_checksum;
    use super::verify_sequence;

    #[test]
    fn embedded_set_is_gapless() {
        assert!(verify_sequence(MIGRATIONS).is_ok());
    }

    #[test]
    fn gap_is_rejected() {
        let broken = [
            Migration {
                version: 1,
                name: "a",
                sql: "SELECT 1",
            },
            Migration {
                version: 3,
                name: "b",
                sql: "SELECT 1",
            },
        ];
        assert!(verify_sequence(&broken).is_err());
    }

    #[test]
    fn wrong_start_is_rejected() {
        let broken = [Migration {
            version: 2,
            name: "a",
            sql: "SELECT 1",
        }];
        assert!(verify_sequence(&broken).is_err());
    }

    #[test]
    fn checksum_is_stable_and_content_sensitive() {
        let a = migration_checksum("CREATE TABLE t (id int)");
        let b = migration_checksum("CREATE TABLE t (id int)");
        let c = migration_checksum("CREATE TABLE t (id bigint)");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn migrations_embed_nonempty_sql() {
        for migration in MIGRATIONS {
            assert!(!migration.sql.trim().is_empty(), "{} is empty", migration.name);
        }
    }
}
