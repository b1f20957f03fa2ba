use monarch_core::{CandidateError, ObservationId};
use monarch_store::StoreError;
use monarch_sync::CatalogError;
use thiserror::Error;

use crate::pipeline::RunReport;

/// Failures that halt a run.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// The count query failed, so no sampling window can be chosen.
    #[error("sampling unavailable: {0}")]
    SamplingUnavailable(#[source] CatalogError),

    /// The catalog refused a query; the filter or paging is misconfigured.
    #[error("catalog rejected the query: {0}")]
    RemoteRejected(#[source] CatalogError),

    /// Durable storage cannot be read or keeps failing writes.
    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(#[source] StoreError),
}

impl AcquireError {
    pub(crate) fn from_count(e: CatalogError) -> Self {
        if e.is_fatal() {
            Self::RemoteRejected(e)
        } else {
            Self::SamplingUnavailable(e)
        }
    }
}

/// Why one candidate was abandoned. Never fatal on its own.
#[derive(Debug, Error)]
pub enum CandidateFailure {
    #[error("malformed candidate: {0}")]
    Malformed(#[from] CandidateError),

    #[error("asset download for observation {id} failed: {source}")]
    AssetFetchFailed {
        id: ObservationId,
        source: CatalogError,
    },

    #[error("persisting observation {id} failed: {source}")]
    PersistFailed { id: ObservationId, source: StoreError },
}

/// A fatal error together with what the run achieved before it.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunFailure {
    #[source]
    pub error: AcquireError,
    pub report: RunReport,
}
