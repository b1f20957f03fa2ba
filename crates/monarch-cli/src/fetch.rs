//! `monarch fetch`: one acquisition run against the live catalog.

use std::time::Duration;

use anyhow::Context;
use clap::Args;
use monarch_acquire::{
    AcquisitionPipeline, CancelFlag, HaltReason, Persistence, RunReport, TracingReporter,
};
use monarch_core::SamplingConfig;
use monarch_store::{AssetStore, DuckStore};
use monarch_sync::{
    CatalogClient, CatalogFilter, CatalogSettings, DEFAULT_CATALOG_URL, MONARCH_TAXON_ID,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::warn;

/// 128 + SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Args)]
pub struct FetchArgs {
    /// Number of new observations to store
    #[arg(short = 'n', long = "num", default_value_t = 10)]
    num: usize,

    /// Attempt budget for the run (default: 3 x num)
    #[arg(long)]
    max_attempts: Option<usize>,

    /// Seed for a reproducible sample
    #[arg(long, env = "MONARCH_SEED")]
    seed: Option<u64>,

    /// Observation search endpoint
    #[arg(long, env = "MONARCH_CATALOG_URL", default_value = DEFAULT_CATALOG_URL)]
    catalog_url: String,

    /// Taxon to sample
    #[arg(long, env = "MONARCH_TAXON_ID", default_value_t = MONARCH_TAXON_ID)]
    taxon_id: u64,

    /// Per-request timeout for catalog queries and image downloads
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

pub async fn run(args: FetchArgs, store: DuckStore, assets: AssetStore) -> anyhow::Result<()> {
    let timeout = Duration::from_secs(args.timeout_secs);
    let client = CatalogClient::new(CatalogSettings {
        base_url: args.catalog_url,
        request_timeout: timeout,
        asset_timeout: timeout,
        ..CatalogSettings::default()
    })
    .context("building catalog client")?;

    let config = SamplingConfig {
        max_offset: client.max_offset(),
        ..SamplingConfig::default()
    };
    let filter = CatalogFilter {
        taxon_id: args.taxon_id,
        ..CatalogFilter::default()
    };
    let pipeline = AcquisitionPipeline::new(client, Persistence::new(store, assets), config)
        .with_filter(filter)
        .with_reporter(TracingReporter);

    let cancel = CancelFlag::new();
    let handle = cancel.clone();
    tokio::spawn(forward_interrupts(
        || async { tokio::signal::ctrl_c().await.is_ok() },
        handle,
        || {
            std::process::exit(INTERRUPTED_EXIT_CODE);
        },
    ));

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    match pipeline.run(args.num, args.max_attempts, &mut rng, &cancel).await {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(failure) => {
            print_report(&failure.report);
            Err(failure.error).context("acquisition run failed")
        }
    }
}

/// First interrupt cancels the run between observations; a second one aborts.
async fn forward_interrupts<F, Fut, A>(mut interrupted: F, cancel: CancelFlag, abort: A)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
    A: FnOnce(),
{
    if !interrupted().await {
        return;
    }
    warn!("interrupt received; stopping after the current observation (Ctrl-C again to abort)");
    cancel.cancel();
    if interrupted().await {
        warn!("second interrupt; aborting");
        abort();
    }
}

fn print_report(report: &RunReport) {
    println!(
        "accepted: {}, attempted: {}, pool_size: {}",
        report.accepted, report.attempted, report.pool_size
    );
    if report.accepted < report.target {
        let why = report.halt.map_or("run failed", |h| h.as_str());
        println!("  stored {} of {} requested ({why})", report.accepted, report.target);
    }
    if report.conflicts + report.failures + report.skipped_no_asset > 0 {
        println!(
            "  conflicts: {}, failures: {}, without photo: {}",
            report.conflicts, report.failures, report.skipped_no_asset
        );
    }
    if report.halt == Some(HaltReason::Cancelled) {
        println!("  run was interrupted; storage is consistent");
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn signals(seq: Vec<bool>) -> impl FnMut() -> std::future::Ready<bool> {
        let mut seq = seq.into_iter();
        move || std::future::ready(seq.next().unwrap_or(false))
    }

    #[tokio::test]
    async fn first_interrupt_cancels() {
        let cancel = CancelFlag::new();
        let aborted = Cell::new(false);
        forward_interrupts(signals(vec![true]), cancel.clone(), || aborted.set(true)).await;
        assert!(cancel.is_cancelled());
        assert!(!aborted.get());
    }

    #[tokio::test]
    async fn second_interrupt_aborts() {
        let cancel = CancelFlag::new();
        let aborted = Cell::new(false);
        forward_interrupts(signals(vec![true, true]), cancel.clone(), || aborted.set(true)).await;
        assert!(cancel.is_cancelled());
        assert!(aborted.get());
    }

    #[tokio::test]
    async fn no_signal_handler_leaves_run_alone() {
        let cancel = CancelFlag::new();
        let aborted = Cell::new(false);
        forward_interrupts(signals(vec![false]), cancel.clone(), || aborted.set(true)).await;
        assert!(!cancel.is_cancelled());
        assert!(!aborted.get());
    }
}
