//! Candidate pool construction over an offset-capped catalog.
//!
//! The catalog has no random-sample primitive and only serves offsets below
//! a fixed ceiling. The builder oversamples instead: it pulls whole pages
//! from uniformly random offsets inside the accessible window until the pool
//! holds `pool_target` new candidates or the batch budget runs out. Small
//! corpora (`total <= pool_target`) are paged through sequentially so that
//! nothing below `total` is missed.

use indexmap::IndexMap;
use indexmap::map::Entry;
use monarch_core::{Candidate, ObservationId, SamplingConfig};
use monarch_sync::{CatalogFilter, PageRequest};
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::warn;

use crate::cancel::CancelFlag;
use crate::error::AcquireError;
use crate::progress::{AcquireEvent, ProgressReporter};
use crate::registry::IdentityRegistry;
use crate::traits::CatalogSource;

/// How the pool was filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStrategy {
    /// Sequential pages from the start; used when the corpus fits the pool.
    Exhaustive,
    /// Whole pages from random offsets within the accessible window.
    RandomOffset,
}

impl PoolStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exhaustive => "exhaustive",
            Self::RandomOffset => "random-offset",
        }
    }
}

/// A set of new candidates keyed by id. First occurrence wins.
#[derive(Debug, Clone)]
pub struct CandidatePool {
    candidates: IndexMap<ObservationId, Candidate>,
    pub strategy: PoolStrategy,
    /// Catalog `total_results` at count time.
    pub total_results: usize,
    /// Batch calls issued, successful or not.
    pub batch_calls: usize,
    pub failed_calls: usize,
    /// Results dropped because the registry already knew them.
    pub excluded_known: usize,
    /// Results dropped because an earlier batch already returned them.
    pub duplicates_absorbed: usize,
}

impl CandidatePool {
    fn new(strategy: PoolStrategy, total_results: usize) -> Self {
        Self {
            candidates: IndexMap::new(),
            strategy,
            total_results,
            batch_calls: 0,
            failed_calls: 0,
            excluded_known: 0,
            duplicates_absorbed: 0,
        }
    }

    /// Merge one batch, returning how many candidates were new to the pool.
    fn merge(&mut self, batch: Vec<Candidate>, registry: &IdentityRegistry) -> usize {
        let mut added = 0;
        for candidate in batch {
            if registry.contains(candidate.id) {
                self.excluded_known += 1;
                continue;
            }
            match self.candidates.entry(candidate.id) {
                Entry::Occupied(_) => self.duplicates_absorbed += 1,
                Entry::Vacant(slot) => {
                    slot.insert(candidate);
                    added += 1;
                }
            }
        }
        added
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn contains(&self, id: ObservationId) -> bool {
        self.candidates.contains_key(&id)
    }

    /// Ids in merge order.
    pub fn ids(&self) -> impl Iterator<Item = ObservationId> + '_ {
        self.candidates.keys().copied()
    }

    /// Consume the pool into a uniformly shuffled processing order.
    pub fn into_shuffled<R: Rng>(self, rng: &mut R) -> Vec<Candidate> {
        let mut order: Vec<Candidate> = self.candidates.into_values().collect();
        order.shuffle(rng);
        order
    }
}

/// Builds a [`CandidatePool`] from a [`CatalogSource`].
pub struct PoolBuilder<'a, C: ?Sized, P> {
    source: &'a C,
    filter: &'a CatalogFilter,
    config: &'a SamplingConfig,
    reporter: &'a P,
}

impl<'a, C, P> PoolBuilder<'a, C, P>
where
    C: CatalogSource + ?Sized,
    P: ProgressReporter,
{
    pub fn new(
        source: &'a C,
        filter: &'a CatalogFilter,
        config: &'a SamplingConfig,
        reporter: &'a P,
    ) -> Self {
        Self {
            source,
            filter,
            config,
            reporter,
        }
    }

    /// Assemble at least `pool_target` new candidates if the catalog allows.
    ///
    /// Only the count query and catalog rejections are fatal. Falling short
    /// of `pool_target` after the batch budget is spent is not an error.
    pub async fn build<R: Rng>(
        &self,
        registry: &IdentityRegistry,
        pool_target: usize,
        rng: &mut R,
        cancel: &CancelFlag,
    ) -> Result<CandidatePool, AcquireError> {
        let total = self
            .source
            .count(self.filter)
            .await
            .map_err(AcquireError::from_count)?;

        let strategy = if total <= pool_target {
            PoolStrategy::Exhaustive
        } else {
            PoolStrategy::RandomOffset
        };
        self.reporter.report(AcquireEvent::CountResolved {
            total,
            pool_target,
            strategy,
        });

        let mut pool = CandidatePool::new(strategy, total);
        match strategy {
            PoolStrategy::Exhaustive => self.page_through(&mut pool, registry, cancel).await?,
            PoolStrategy::RandomOffset => {
                self.sample_offsets(&mut pool, registry, pool_target, rng, cancel)
                    .await?
            }
        }

        self.reporter.report(AcquireEvent::PoolBuilt {
            size: pool.len(),
            batch_calls: pool.batch_calls,
            failed_calls: pool.failed_calls,
        });
        Ok(pool)
    }

    /// Fetch pages 1.. until `total` results have been seen or a page is empty.
    ///
    /// A failed page is retried; failures across the whole walk are capped
    /// at the builder's batch budget.
    async fn page_through(
        &self,
        pool: &mut CandidatePool,
        registry: &IdentityRegistry,
        cancel: &CancelFlag,
    ) -> Result<(), AcquireError> {
        let per_page = self.config.page_size.max(1);
        let mut page = 1;
        let mut seen = 0;

        while seen < pool.total_results && !cancel.is_cancelled() {
            let request = PageRequest::Page { page, per_page };
            let start = request.start();
            if start >= self.config.max_offset {
                warn!(
                    start,
                    total = pool.total_results,
                    "corpus extends past the catalog offset ceiling; stopping"
                );
                break;
            }

            pool.batch_calls += 1;
            match self.source.page(self.filter, request).await {
                Ok(batch) if batch.is_empty() => break,
                Ok(batch) => {
                    seen += batch.len();
                    let returned = batch.len();
                    let added = pool.merge(batch, registry);
                    self.reporter.report(AcquireEvent::PoolBatch {
                        start,
                        returned,
                        added,
                        pool_size: pool.len(),
                    });
                    page += 1;
                }
                Err(e) if e.is_fatal() => return Err(AcquireError::RemoteRejected(e)),
                Err(e) => {
                    pool.failed_calls += 1;
                    self.reporter
                        .report(AcquireEvent::PoolBatchFailed { start, error: &e });
                    if pool.failed_calls >= self.config.builder_attempts {
                        warn!(
                            failed = pool.failed_calls,
                            "giving up on sequential paging after repeated failures"
                        );
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Pull pages from random offsets in `[0, min(total, max_offset) - page_size]`.
    async fn sample_offsets<R: Rng>(
        &self,
        pool: &mut CandidatePool,
        registry: &IdentityRegistry,
        pool_target: usize,
        rng: &mut R,
        cancel: &CancelFlag,
    ) -> Result<(), AcquireError> {
        let limit = self.config.page_size.max(1);
        let max_start = self.config.max_start_offset(pool.total_results);

        while pool.len() < pool_target
            && pool.batch_calls < self.config.builder_attempts
            && !cancel.is_cancelled()
        {
            let offset = rng.gen_range(0..=max_start);
            pool.batch_calls += 1;

            match self
                .source
                .page(self.filter, PageRequest::Offset { offset, limit })
                .await
            {
                Ok(batch) => {
                    let returned = batch.len();
                    let added = pool.merge(batch, registry);
                    self.reporter.report(AcquireEvent::PoolBatch {
                        start: offset,
                        returned,
                        added,
                        pool_size: pool.len(),
                    });
                }
                Err(e) if e.is_fatal() => return Err(AcquireError::RemoteRejected(e)),
                Err(e) => {
                    pool.failed_calls += 1;
                    self.reporter.report(AcquireEvent::PoolBatchFailed {
                        start: offset,
                        error: &e,
                    });
                }
            }
        }

        if pool.len() < pool_target {
            warn!(
                pool_size = pool.len(),
                pool_target,
                batch_calls = pool.batch_calls,
                "candidate pool under-filled"
            );
        }
        Ok(())
    }
}
