use monarch_core::{Candidate, ObservationId, Record, SamplingConfig};
use monarch_sync::{CatalogError, CatalogFilter};
use rand::Rng;
use tracing::warn;

use crate::cancel::CancelFlag;
use crate::error::{AcquireError, CandidateFailure, RunFailure};
use crate::pool::PoolBuilder;
use crate::progress::{AcquireEvent, ProgressReporter, SilentReporter, SkipReason};
use crate::registry::IdentityRegistry;
use crate::traits::{CatalogSource, RecordSink};

/// Why a run stopped processing candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    TargetReached,
    BudgetExhausted,
    PoolExhausted,
    Cancelled,
}

impl HaltReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TargetReached => "target reached",
            Self::BudgetExhausted => "attempt budget exhausted",
            Self::PoolExhausted => "candidate pool exhausted",
            Self::Cancelled => "cancelled",
        }
    }
}

/// What one run achieved. Always produced, even when the run falls short.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub target: usize,
    pub budget: usize,
    pub accepted: usize,
    pub attempted: usize,
    pub pool_size: usize,
    pub skipped_known: usize,
    pub skipped_no_asset: usize,
    /// Accepted ids that another writer stored between registry load and insert.
    pub conflicts: usize,
    pub failures: usize,
    /// `None` only when the run failed before processing candidates.
    pub halt: Option<HaltReason>,
}

impl RunReport {
    fn stop_reason(&self, cancel: &CancelFlag) -> Option<HaltReason> {
        if self.accepted >= self.target {
            Some(HaltReason::TargetReached)
        } else if self.attempted >= self.budget {
            Some(HaltReason::BudgetExhausted)
        } else if cancel.is_cancelled() {
            Some(HaltReason::Cancelled)
        } else {
            None
        }
    }
}

enum Outcome {
    Stored,
    Conflict,
    NoAsset,
}

/// Turns a shuffled candidate pool into durably stored new records.
///
/// Generic over the catalog, the sink and the progress reporter so that the
/// same loop runs against live services and in-memory fakes.
pub struct AcquisitionPipeline<C, S, P = SilentReporter> {
    source: C,
    sink: S,
    reporter: P,
    filter: CatalogFilter,
    config: SamplingConfig,
}

impl<C, S> AcquisitionPipeline<C, S, SilentReporter> {
    pub fn new(source: C, sink: S, config: SamplingConfig) -> Self {
        Self {
            source,
            sink,
            reporter: SilentReporter,
            filter: CatalogFilter::default(),
            config,
        }
    }
}

impl<C, S, P> AcquisitionPipeline<C, S, P> {
    pub fn with_reporter<Q>(self, reporter: Q) -> AcquisitionPipeline<C, S, Q> {
        AcquisitionPipeline {
            source: self.source,
            sink: self.sink,
            reporter,
            filter: self.filter,
            config: self.config,
        }
    }

    pub fn with_filter(mut self, filter: CatalogFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }

    pub fn filter(&self) -> &CatalogFilter {
        &self.filter
    }

    pub fn source(&self) -> &C {
        &self.source
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

impl<C, S, P> AcquisitionPipeline<C, S, P>
where
    C: CatalogSource,
    S: RecordSink,
    P: ProgressReporter,
{
    /// Acquire up to `target` new records.
    ///
    /// The attempt budget defaults to `attempt_multiplier × target`. Known ids
    /// are skipped for free; every other candidate costs one attempt whether
    /// it is stored, conflicts, lacks an asset or fails. Falling short of the
    /// target is a successful outcome. Only an unreachable catalog count, a
    /// rejected query or unusable storage fail the run.
    pub async fn run<R: Rng>(
        &self,
        target: usize,
        budget_override: Option<usize>,
        rng: &mut R,
        cancel: &CancelFlag,
    ) -> Result<RunReport, RunFailure> {
        let budget = self.config.attempt_budget(target, budget_override);
        let mut report = RunReport {
            target,
            budget,
            ..RunReport::default()
        };

        if let Some(halt) = report.stop_reason(cancel) {
            report.halt = Some(halt);
            self.reporter.report(AcquireEvent::Finished { report: &report });
            return Ok(report);
        }

        let mut registry = match IdentityRegistry::load(&self.sink) {
            Ok(registry) => registry,
            Err(e) => {
                return Err(RunFailure {
                    error: AcquireError::PersistenceUnavailable(e),
                    report,
                });
            }
        };
        self.reporter.report(AcquireEvent::RunStarted {
            target,
            budget,
            known: registry.len(),
        });

        let pool_target = self.config.pool_target(target);
        let builder = PoolBuilder::new(&self.source, &self.filter, &self.config, &self.reporter);
        let pool = match builder.build(&registry, pool_target, rng, cancel).await {
            Ok(pool) => pool,
            Err(error) => return Err(RunFailure { error, report }),
        };
        report.pool_size = pool.len();

        let mut persist_streak = 0;
        for candidate in pool.into_shuffled(rng) {
            if let Some(halt) = report.stop_reason(cancel) {
                report.halt = Some(halt);
                break;
            }

            let id = candidate.id;
            if registry.contains(id) {
                report.skipped_known += 1;
                self.reporter.report(AcquireEvent::Skipped {
                    id,
                    reason: SkipReason::AlreadyKnown,
                });
                continue;
            }

            report.attempted += 1;
            match self.acquire_one(&candidate).await {
                Ok(Outcome::Stored) => {
                    persist_streak = 0;
                    registry.add(id);
                    report.accepted += 1;
                    self.reporter.report(AcquireEvent::Accepted {
                        id,
                        accepted: report.accepted,
                        target,
                    });
                }
                Ok(Outcome::Conflict) => {
                    // The observation is stored either way; it counts towards the target.
                    persist_streak = 0;
                    registry.add(id);
                    report.accepted += 1;
                    report.conflicts += 1;
                    self.reporter.report(AcquireEvent::Conflict { id });
                }
                Ok(Outcome::NoAsset) => {
                    report.skipped_no_asset += 1;
                    self.reporter.report(AcquireEvent::Skipped {
                        id,
                        reason: SkipReason::NoAsset,
                    });
                }
                Err(failure) => {
                    report.failures += 1;
                    self.reporter.report(AcquireEvent::Failed {
                        id,
                        failure: &failure,
                    });
                    if let CandidateFailure::PersistFailed { source, .. } = failure {
                        persist_streak += 1;
                        if persist_streak >= self.config.max_consecutive_persist_failures {
                            return Err(RunFailure {
                                error: AcquireError::PersistenceUnavailable(source),
                                report,
                            });
                        }
                    }
                }
            }
        }

        if report.halt.is_none() {
            report.halt = Some(report.stop_reason(cancel).unwrap_or(HaltReason::PoolExhausted));
        }
        self.reporter.report(AcquireEvent::Finished { report: &report });
        Ok(report)
    }

    /// Fetch, write and insert one candidate.
    ///
    /// The asset is on disk before the row is inserted, and removed again if
    /// the insert errors and no row for the id exists, so storage never holds
    /// a row without its asset or an asset without its row.
    async fn acquire_one(&self, candidate: &Candidate) -> Result<Outcome, CandidateFailure> {
        let Some(asset_url) = candidate.asset_url(&self.config.asset_size) else {
            return Ok(Outcome::NoAsset);
        };
        let id = candidate.id;
        let mut record = Record::from_candidate(candidate, asset_url)?;

        let bytes = self
            .source
            .fetch_asset(&record.asset_url)
            .await
            .map_err(|source| CandidateFailure::AssetFetchFailed { id, source })?;
        if bytes.is_empty() {
            return Err(CandidateFailure::AssetFetchFailed {
                id,
                source: CatalogError::Decode("empty asset body".into()),
            });
        }

        let reference = self
            .sink
            .store_asset(id, &bytes)
            .map_err(|source| CandidateFailure::PersistFailed { id, source })?;
        record.local_asset_path = Some(reference);

        match self.sink.insert_ignore_conflict(&record) {
            Ok(true) => Ok(Outcome::Stored),
            Ok(false) => Ok(Outcome::Conflict),
            Err(source) => {
                self.discard(id);
                Err(CandidateFailure::PersistFailed { id, source })
            }
        }
    }

    fn discard(&self, id: ObservationId) {
        match self.sink.exists(id) {
            // Another writer's row points at the same asset path.
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                warn!(id, error = %e, "could not check for an existing row; keeping asset");
                return;
            }
        }
        if let Err(e) = self.sink.discard_asset(id) {
            warn!(id, error = %e, "could not remove orphaned asset");
        }
    }
}
