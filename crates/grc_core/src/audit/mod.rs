//! Audit Engine: engagements, PBC requests, evidence submissions, findings
//! and threaded comments.
//!
//! Every child mutation loads the parent audit first, which applies auditor
//! isolation and rejects completed or cancelled engagements.

mod comments;
mod engagements;
mod findings;
mod requests;
pub mod service;
mod submissions;
pub mod types;

pub use requests::DEFAULT_REFERENCE_PREFIX;
pub use service::AuditService;
