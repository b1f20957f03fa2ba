//! Progress events emitted by the engine to an injected reporter.

use monarch_core::ObservationId;
use monarch_sync::CatalogError;
use tracing::{debug, info, warn};

use crate::error::CandidateFailure;
use crate::pipeline::RunReport;
use crate::pool::PoolStrategy;

/// Why a candidate was passed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Already stored; costs no attempt.
    AlreadyKnown,
    /// No photo to download; costs one attempt.
    NoAsset,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyKnown => "already known",
            Self::NoAsset => "no asset",
        }
    }
}

#[derive(Debug)]
pub enum AcquireEvent<'a> {
    RunStarted {
        target: usize,
        budget: usize,
        known: usize,
    },
    CountResolved {
        total: usize,
        pool_target: usize,
        strategy: PoolStrategy,
    },
    PoolBatch {
        start: usize,
        returned: usize,
        added: usize,
        pool_size: usize,
    },
    PoolBatchFailed {
        start: usize,
        error: &'a CatalogError,
    },
    PoolBuilt {
        size: usize,
        batch_calls: usize,
        failed_calls: usize,
    },
    Skipped {
        id: ObservationId,
        reason: SkipReason,
    },
    Accepted {
        id: ObservationId,
        accepted: usize,
        target: usize,
    },
    /// Another writer stored this id first.
    Conflict { id: ObservationId },
    Failed {
        id: ObservationId,
        failure: &'a CandidateFailure,
    },
    Finished { report: &'a RunReport },
}

/// Receives engine events. The engine never logs through a global of its own.
pub trait ProgressReporter {
    fn report(&self, event: AcquireEvent<'_>);
}

impl<T: ProgressReporter + ?Sized> ProgressReporter for &T {
    fn report(&self, event: AcquireEvent<'_>) {
        (**self).report(event)
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn report(&self, _event: AcquireEvent<'_>) {}
}

/// Forwards events to `tracing` with structured fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: AcquireEvent<'_>) {
        match event {
            AcquireEvent::RunStarted {
                target,
                budget,
                known,
            } => info!(target_count = target, budget, known, "starting acquisition run"),
            AcquireEvent::CountResolved {
                total,
                pool_target,
                strategy,
            } => info!(total, pool_target, strategy = strategy.as_str(), "catalog count resolved"),
            AcquireEvent::PoolBatch {
                start,
                returned,
                added,
                pool_size,
            } => debug!(start, returned, added, pool_size, "merged catalog batch"),
            AcquireEvent::PoolBatchFailed { start, error } => {
                warn!(start, error = %error, "catalog batch failed")
            }
            AcquireEvent::PoolBuilt {
                size,
                batch_calls,
                failed_calls,
            } => info!(size, batch_calls, failed_calls, "candidate pool built"),
            AcquireEvent::Skipped { id, reason } => {
                debug!(id, reason = reason.as_str(), "skipped candidate")
            }
            AcquireEvent::Accepted {
                id,
                accepted,
                target,
            } => info!(id, accepted, target_count = target, "stored new observation"),
            AcquireEvent::Conflict { id } => info!(id, "observation already stored by another writer"),
            AcquireEvent::Failed { id, failure } => {
                warn!(id, error = %failure, "abandoned candidate")
            }
            AcquireEvent::Finished { report } => info!(
                accepted = report.accepted,
                attempted = report.attempted,
                pool_size = report.pool_size,
                halt = report.halt.map(|h| h.as_str()).unwrap_or("none"),
                "acquisition run finished"
            ),
        }
    }
}
