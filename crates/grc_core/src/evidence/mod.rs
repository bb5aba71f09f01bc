//! Evidence Store: versioned artifacts, control/requirement links,
//! evaluations and freshness.

pub mod freshness;
pub mod service;
pub mod types;

pub use service::EvidenceService;
