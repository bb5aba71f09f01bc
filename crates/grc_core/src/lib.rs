//! grc_core: the domain engine of the GRC platform.
//!
//! Three domains share one authorization gate, one state-machine registry
//! and one audit-log emitter:
//!
//! - `audit`: engagements, PBC requests, evidence submissions, findings, comments
//! - `evidence`: versioned artifacts, control/requirement links, evaluations, freshness
//! - `policy`: versioned policies, sign-off workflow, templates, gap analysis
//!
//! Storage, object storage and the audit-log sink are reached only through
//! the traits in [`ports`]. `grc_postgres` provides the production adapters;
//! [`memory`] provides in-process ones for tests and local tooling.

use std::sync::Arc;

pub mod audit;
pub mod audit_log;
pub mod clock;
pub mod config;
pub mod content;
pub mod counters;
pub mod directory;
pub mod error;
pub mod evidence;
pub mod memory;
pub mod pagination;
pub mod policy;
pub mod ports;
pub mod principal;
pub mod state_machine;
pub mod types;

pub use audit::AuditService;
pub use error::{GrcError, Result};
pub use evidence::EvidenceService;
pub use policy::PolicyService;
pub use principal::{Principal, Role};

use audit_log::AuditLogEmitter;
use clock::{Clock, SystemClock};
use config::CoreConfig;
use counters::CounterReconciler;
use ports::{AuditLogSink, AuditStore, DirectoryStore, EvidenceStore, ObjectStorage, PolicyStore};

// ── Wiring ────────────────────────────────────────────────────

/// Adapter set the services are assembled from.
#[derive(Clone)]
pub struct Ports {
    pub audits: Arc<dyn AuditStore>,
    pub evidence: Arc<dyn EvidenceStore>,
    pub policies: Arc<dyn PolicyStore>,
    pub directory: Arc<dyn DirectoryStore>,
    pub audit_log: Arc<dyn AuditLogSink>,
    /// Absent when no object store is configured; upload and download
    /// operations then fail with `SERVICE_UNAVAILABLE`.
    pub storage: Option<Arc<dyn ObjectStorage>>,
    pub clock: Arc<dyn Clock>,
}

impl Ports {
    pub fn new(
        audits: Arc<dyn AuditStore>,
        evidence: Arc<dyn EvidenceStore>,
        policies: Arc<dyn PolicyStore>,
        directory: Arc<dyn DirectoryStore>,
        audit_log: Arc<dyn AuditLogSink>,
    ) -> Self {
        Self {
            audits,
            evidence,
            policies,
            directory,
            audit_log,
            storage: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_storage(mut self, storage: Arc<dyn ObjectStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// The assembled engine. Cheap to clone; every service shares the same ports.
#[derive(Clone)]
pub struct GrcCore {
    pub audits: AuditService,
    pub evidence: EvidenceService,
    pub policies: PolicyService,
    pub counters: CounterReconciler,
    pub config: Arc<CoreConfig>,
}

impl GrcCore {
    pub fn new(ports: Ports, config: CoreConfig) -> Self {
        let config = Arc::new(config);
        let log = AuditLogEmitter::new(ports.audit_log.clone(), ports.clock.clone());
        let counters = CounterReconciler::new(ports.audits.clone(), ports.clock.clone());

        let evidence = EvidenceService::new(
            ports.evidence.clone(),
            ports.directory.clone(),
            ports.storage.clone(),
            log.clone(),
            ports.clock.clone(),
            config.clone(),
        );
        let policies = PolicyService::new(
            ports.policies.clone(),
            ports.directory.clone(),
            log.clone(),
            ports.clock.clone(),
            config.clone(),
        );
        let audits = AuditService::new(
            ports.audits,
            ports.evidence,
            ports.directory,
            counters.clone(),
            log,
            ports.clock,
        );
        tracing::debug!(
            storage = ports.storage.is_some(),
            expiring_soon_days = config.expiring_soon_days,
            "grc core assembled"
        );

        Self {
            audits,
            evidence,
            policies,
            counters,
            config,
        }
    }
}
