//! grc_postgres: PostgreSQL adapters for the grc_core port traits.
//!
//! Each adapter is a newtype wrapping `PgPool`. All SQL is runtime-checked
//! (`sqlx::query`, not `sqlx::query!`) so building the crate never needs a
//! live database. Enum columns are plain `TEXT` holding the wire strings,
//! tag lists and auditor sets are arrays, opaque payloads are `JSONB`.

use std::sync::Arc;

use anyhow::anyhow;
use grc_core::{GrcError, Ports};
use sqlx::PgPool;

pub mod audit;
pub mod audit_log;
pub mod config;
pub mod directory;
pub mod evidence;
pub mod policy;
mod rows;

pub use audit::PgAuditStore;
pub use audit_log::PgAuditLogSink;
pub use config::DbConfig;
pub use directory::PgDirectoryStore;
pub use evidence::PgEvidenceStore;
pub use policy::PgPolicyStore;

/// Every Postgres adapter over one shared pool.
#[derive(Clone)]
pub struct PgStores {
    pub audits: Arc<PgAuditStore>,
    pub evidence: Arc<PgEvidenceStore>,
    pub policies: Arc<PgPolicyStore>,
    pub directory: Arc<PgDirectoryStore>,
    pub audit_log: Arc<PgAuditLogSink>,
}

impl PgStores {
    pub fn new(pool: PgPool) -> Self {
        Self {
            audits: Arc::new(PgAuditStore::new(pool.clone())),
            evidence: Arc::new(PgEvidenceStore::new(pool.clone())),
            policies: Arc::new(PgPolicyStore::new(pool.clone())),
            directory: Arc::new(PgDirectoryStore::new(pool.clone())),
            audit_log: Arc::new(PgAuditLogSink::new(pool)),
        }
    }

    /// Port set for `GrcCore::new`. Object storage is attached by the caller.
    pub fn ports(&self) -> Ports {
        Ports::new(
            self.audits.clone(),
            self.evidence.clone(),
            self.policies.clone(),
            self.directory.clone(),
            self.audit_log.clone(),
        )
    }
}

// ── Error mapping ─────────────────────────────────────────────

/// Unique-constraint violations become `Conflict`; anything else is an
/// infrastructure failure.
pub(crate) fn unique_or_internal(err: sqlx::Error, what: impl FnOnce() -> String) -> GrcError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return GrcError::Conflict(what());
        }
    }
    GrcError::Internal(anyhow!(err))
}

/// `u64` page window as the `BIGINT` Postgres expects for LIMIT/OFFSET.
pub(crate) fn window(page: grc_core::pagination::PageRequest) -> (i64, i64) {
    (
        i64::try_from(page.limit()).unwrap_or(i64::MAX),
        i64::try_from(page.offset()).unwrap_or(i64::MAX),
    )
}

pub(crate) fn count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

pub(crate) fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// `%term%` for `ILIKE`, with the LIKE metacharacters escaped.
pub(crate) fn like_pattern(term: &str) -> String {
    format!("%{}%", escape_like(term))
}

#[cfg(test)]
mod tests {
    use super::*;
    use grc_core::pagination::{PageRequest, COMMENT_LIMITS};

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("soc"), "%soc%");
        assert_eq!(like_pattern("100%_done"), "%100\\%\\_done%");
    }

    #[test]
    fn window_matches_page_request() {
        let page = PageRequest::new(Some(3), Some(40), COMMENT_LIMITS);
        assert_eq!(window(page), (40, 80));
    }

    #[test]
    fn non_database_errors_are_internal() {
        let err = unique_or_internal(sqlx::Error::RowNotFound, || "dup".into());
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }
}
