//! Policy coverage gap analysis over the org's active controls.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::directory::ControlRecord;
use crate::ports::CoverageLink;
use crate::wire_enum;

use super::types::{Coverage, PolicyCategory};

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct GapQuery {
    /// Count partially covered controls as gaps.
    #[serde(default)]
    pub partial_is_gap: bool,
}

wire_enum! {
    pub enum CoverageLevel {
        Full => "full",
        Partial => "partial",
        Uncovered => "uncovered",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoveringPolicy {
    pub policy_id: Uuid,
    pub identifier: String,
    pub title: String,
    pub coverage: Coverage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlCoverage {
    pub control_id: Uuid,
    pub identifier: String,
    pub title: String,
    pub category: Option<String>,
    pub coverage: CoverageLevel,
    pub policies: Vec<CoveringPolicy>,
    pub suggested_categories: Vec<PolicyCategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GapReport {
    pub total_controls: usize,
    pub fully_covered: usize,
    pub partially_covered: usize,
    pub uncovered: usize,
    /// Share of controls with full coverage, one decimal place.
    pub coverage_percent: f64,
    pub gaps: Vec<ControlCoverage>,
}

/// Candidate policy categories for an upstream control category.
pub fn suggested_categories(control_category: Option<&str>) -> Vec<PolicyCategory> {
    use PolicyCategory::*;
    let key = control_category
        .map(|c| c.trim().to_ascii_lowercase().replace([' ', '-'], "_"))
        .unwrap_or_default();
    match key.as_str() {
        "access_control" | "identity_and_access" => vec![AccessControl, InformationSecurity],
        "data_protection" | "data_security" => vec![DataProtection, Privacy, Cryptography],
        "privacy" => vec![Privacy, DataProtection],
        "incident_response" | "incident_management" => vec![IncidentResponse],
        "business_continuity" | "disaster_recovery" => vec![BusinessContinuity],
        "change_management" => vec![ChangeManagement, SecureDevelopment],
        "risk_management" | "risk_assessment" => vec![RiskManagement],
        "vendor_management" | "third_party" => vec![VendorManagement],
        "asset_management" => vec![AssetManagement],
        "hr_security" | "human_resources" | "personnel" => vec![HrSecurity, AcceptableUse],
        "physical_security" => vec![PhysicalSecurity],
        "cryptography" | "encryption" => vec![Cryptography],
        "network_security" => vec![NetworkSecurity],
        "secure_development" | "software_development" => vec![SecureDevelopment, ChangeManagement],
        "logging_monitoring" | "monitoring" => vec![InformationSecurity, IncidentResponse],
        "compliance" | "governance" => vec![Compliance, InformationSecurity],
        _ => vec![InformationSecurity],
    }
}

/// Full iff some link is `full`; partial iff linked but never `full`;
/// uncovered iff unlinked. `links` must already exclude archived policies.
pub fn analyze(controls: &[ControlRecord], links: &[CoverageLink], query: GapQuery) -> GapReport {
    let mut by_control: HashMap<Uuid, Vec<&CoverageLink>> = HashMap::new();
    for link in links {
        by_control.entry(link.control_id).or_default().push(link);
    }

    let mut report = GapReport {
        total_controls: 0,
        fully_covered: 0,
        partially_covered: 0,
        uncovered: 0,
        coverage_percent: 0.0,
        gaps: Vec::new(),
    };

    for control in controls.iter().filter(|c| c.is_active) {
        report.total_controls += 1;
        let linked = by_control.get(&control.id).map(Vec::as_slice).unwrap_or(&[]);
        let level = if linked.iter().any(|l| l.coverage == Coverage::Full) {
            report.fully_covered += 1;
            CoverageLevel::Full
        } else if !linked.is_empty() {
            report.partially_covered += 1;
            CoverageLevel::Partial
        } else {
            report.uncovered += 1;
            CoverageLevel::Uncovered
        };

        let is_gap = match level {
            CoverageLevel::Full => false,
            CoverageLevel::Partial => query.partial_is_gap,
            CoverageLevel::Uncovered => true,
        };
        if is_gap {
            report.gaps.push(ControlCoverage {
                control_id: control.id,
                identifier: control.identifier.clone(),
                title: control.title.clone(),
                category: control.category.clone(),
                coverage: level,
                policies: linked
                    .iter()
                    .map(|l| CoveringPolicy {
                        policy_id: l.policy_id,
                        identifier: l.policy_identifier.clone(),
                        title: l.policy_title.clone(),
                        coverage: l.coverage,
                    })
                    .collect(),
                suggested_categories: suggested_categories(control.category.as_deref()),
            });
        }
    }

    if report.total_controls > 0 {
        let pct = report.fully_covered as f64 * 100.0 / report.total_controls as f64;
        report.coverage_percent = (pct * 10.0).round() / 10.0;
    }
    report
}
