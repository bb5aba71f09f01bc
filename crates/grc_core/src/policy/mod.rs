//! Policy Store: versioned policies, sign-off workflow, template cloning,
//! control linkage and gap analysis.

pub mod gap;
pub mod review;
pub mod service;
pub mod signoff;
pub mod types;

pub use service::PolicyService;
