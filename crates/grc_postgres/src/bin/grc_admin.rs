//! grc-admin: operator commands against the GRC database.
//!
//! Usage:
//!   grc-admin reconcile-counters --org <uuid> [--audit <uuid>]
//!   grc-admin gap-analysis --org <uuid> [--partial-is-gap] [--json]
//!   grc-admin freshness --org <uuid>
//!
//! Reads `DATABASE_URL` (and a `.env` file when present).

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use grc_core::clock::{Clock, SystemClock};
use grc_core::config::CoreConfig;
use grc_core::counters::CounterReconciler;
use grc_core::policy::gap::{self, GapQuery};
use grc_core::ports::{DirectoryStore, EvidenceStore, PolicyStore};
use grc_postgres::{DbConfig, PgStores};

#[derive(Parser, Debug)]
#[command(name = "grc-admin")]
#[command(about = "Operator commands for the GRC store")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recompute audit request/finding counters from the child rows
    ReconcileCounters {
        #[arg(long, env = "GRC_ORG_ID")]
        org: Uuid,

        /// Only this audit (default: every audit of the org)
        #[arg(long)]
        audit: Option<Uuid>,
    },

    /// Report controls without full policy coverage
    GapAnalysis {
        #[arg(long, env = "GRC_ORG_ID")]
        org: Uuid,

        /// Count partially covered controls as gaps
        #[arg(long)]
        partial_is_gap: bool,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Count current evidence by freshness bucket
    Freshness {
        #[arg(long, env = "GRC_ORG_ID")]
        org: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,grc_core=debug,grc_postgres=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let pool = DbConfig::from_env()?.connect().await?;
    let stores = PgStores::new(pool);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match args.command {
        Command::ReconcileCounters { org, audit } => {
            let reconciler = CounterReconciler::new(stores.audits.clone(), clock);
            match audit {
                Some(audit_id) => {
                    let counters = reconciler.reconcile_all(org, audit_id).await?;
                    println!("{}", serde_json::to_string_pretty(&counters)?);
                }
                None => {
                    let touched = reconciler.reconcile_org(org).await?;
                    println!("reconciled {touched} audit(s)");
                }
            }
        }
        Command::GapAnalysis {
            org,
            partial_is_gap,
            json,
        } => {
            let controls = stores.directory.list_active_controls(org).await?;
            let links = stores.policies.list_coverage_links(org).await?;
            let report = gap::analyze(&controls, &links, GapQuery { partial_is_gap });
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "{} controls: {} full, {} partial, {} uncovered ({:.1}% covered)",
                    report.total_controls,
                    report.fully_covered,
                    report.partially_covered,
                    report.uncovered,
                    report.coverage_percent
                );
                for control in &report.gaps {
                    println!(
                        "  {:<16} {:<10} {}",
                        control.identifier,
                        control.coverage.as_str(),
                        control.title
                    );
                }
            }
        }
        Command::Freshness { org } => {
            let config = CoreConfig::from_env();
            let summary = stores
                .evidence
                .freshness_summary(org, clock.now(), config.expiring_soon_days)
                .await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }
    Ok(())
}
