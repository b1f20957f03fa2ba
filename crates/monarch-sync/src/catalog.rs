//! HTTP client for the remote observation catalog.
//!
//! The catalog exposes a filtered, paginated observation search. It has no
//! random-sample endpoint and only serves offsets below a fixed ceiling, so
//! this client stays a thin adapter: one request per call, no retries. Retry
//! policy belongs to the caller because counting and batch fetching want
//! different behaviour on failure.

use std::time::Duration;

use monarch_core::Candidate;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// Transport failure, timeout, 5xx or rate limiting.
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
    /// The catalog refused the request (4xx), usually a bad filter.
    #[error("catalog rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("catalog response could not be decoded: {0}")]
    Decode(String),
    /// The request would start at or past the offset the catalog serves.
    #[error("offset {offset} is at or beyond the catalog ceiling of {max}")]
    OffsetCeiling { offset: usize, max: usize },
}

impl CatalogError {
    /// Errors that signal a configuration bug rather than a transient outage.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Rejected { .. } | Self::OffsetCeiling { .. })
    }

    fn from_status(status: StatusCode, body: String) -> Self {
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Self::Unavailable(format!("server returned {status}"))
        } else {
            Self::Rejected {
                status: status.as_u16(),
                body,
            }
        }
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Unavailable(e.to_string())
        }
    }
}

/// The public observation search endpoint.
pub const DEFAULT_CATALOG_URL: &str = "https://api.inaturalist.org/v1/observations";

/// Connection settings for [`CatalogClient`].
#[derive(Debug, Clone)]
pub struct CatalogSettings {
    /// Observation search endpoint, e.g. `https://api.inaturalist.org/v1/observations`.
    pub base_url: String,
    pub request_timeout: Duration,
    /// Asset downloads get their own, usually more generous, timeout.
    pub asset_timeout: Duration,
    /// Offsets at or above this are refused without a request.
    pub max_offset: usize,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CATALOG_URL.into(),
            request_timeout: Duration::from_secs(30),
            asset_timeout: Duration::from_secs(30),
            max_offset: 10_000,
        }
    }
}

/// The fixed predicate every catalog query is filtered by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogFilter {
    pub taxon_id: u64,
    pub quality_grade: String,
    /// Exclude observations already carrying this annotation term.
    pub without_term_id: Option<u64>,
    pub has_photos: bool,
    pub order_by: String,
    pub order: String,
}

/// Monarch butterfly (*Danaus plexippus*).
pub const MONARCH_TAXON_ID: u64 = 48662;
/// The catalog's "Life Stage" annotation term.
pub const LIFE_STAGE_TERM_ID: u64 = 1;

impl Default for CatalogFilter {
    fn default() -> Self {
        Self {
            taxon_id: MONARCH_TAXON_ID,
            quality_grade: "research".into(),
            without_term_id: Some(LIFE_STAGE_TERM_ID),
            has_photos: true,
            order_by: "observed_on".into(),
            order: "desc".into(),
        }
    }
}

impl CatalogFilter {
    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("taxon_id", self.taxon_id.to_string()),
            ("quality_grade", self.quality_grade.clone()),
        ];
        if let Some(term) = self.without_term_id {
            pairs.push(("without_term_id", term.to_string()));
        }
        if self.has_photos {
            pairs.push(("photos", "true".into()));
        }
        pairs.push(("order_by", self.order_by.clone()));
        pairs.push(("order", self.order.clone()));
        pairs
    }
}

/// Which window of results to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRequest {
    /// Zero-based offset window, used by random sampling.
    Offset { offset: usize, limit: usize },
    /// One-based page number, used by exhaustive paging.
    Page { page: usize, per_page: usize },
}

impl PageRequest {
    /// Zero-based index of the first result in the window.
    pub fn start(&self) -> usize {
        match *self {
            Self::Offset { offset, .. } => offset,
            Self::Page { page, per_page } => page.saturating_sub(1) * per_page,
        }
    }

    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        match *self {
            Self::Offset { offset, limit } => vec![
                ("per_page", limit.to_string()),
                ("offset", offset.to_string()),
            ],
            Self::Page { page, per_page } => vec![
                ("per_page", per_page.to_string()),
                ("page", page.to_string()),
            ],
        }
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total_results: usize,
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

/// HTTP client for the catalog's observation search.
pub struct CatalogClient {
    client: reqwest::Client,
    base_url: String,
    asset_timeout: Duration,
    max_offset: usize,
}

impl CatalogClient {
    pub fn new(settings: CatalogSettings) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(concat!("monarch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CatalogError::Unavailable(format!("building HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            asset_timeout: settings.asset_timeout,
            max_offset: settings.max_offset,
        })
    }

    pub fn max_offset(&self) -> usize {
        self.max_offset
    }

    /// Total number of observations matching `filter`.
    pub async fn count(&self, filter: &CatalogFilter) -> Result<usize, CatalogError> {
        let mut pairs = filter.query_pairs();
        pairs.push(("per_page", "1".into()));
        let resp = self.search(&pairs).await?;
        debug!(total = resp.total_results, "catalog count");
        Ok(resp.total_results)
    }

    /// Up to one window of candidates.
    ///
    /// Results that cannot be decoded (no usable `id`) are dropped with a
    /// warning; an empty window is an empty Vec, not an error.
    pub async fn page(
        &self,
        filter: &CatalogFilter,
        request: PageRequest,
    ) -> Result<Vec<Candidate>, CatalogError> {
        let start = request.start();
        if start >= self.max_offset {
            return Err(CatalogError::OffsetCeiling {
                offset: start,
                max: self.max_offset,
            });
        }

        let mut pairs = filter.query_pairs();
        pairs.extend(request.query_pairs());
        let resp = self.search(&pairs).await?;
        let candidates = decode_candidates(resp.results);
        debug!(start, returned = candidates.len(), "catalog page");
        Ok(candidates)
    }

    /// Download the binary at `url` with the asset timeout.
    pub async fn fetch_asset(&self, url: &str) -> Result<Vec<u8>, CatalogError> {
        let resp = self
            .client
            .get(url)
            .timeout(self.asset_timeout)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CatalogError::from_status(status, body));
        }
        Ok(resp.bytes().await?.to_vec())
    }

    async fn search(&self, pairs: &[(&'static str, String)]) -> Result<SearchResponse, CatalogError> {
        let resp = self.client.get(&self.base_url).query(pairs).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CatalogError::from_status(status, body));
        }
        Ok(resp.json().await?)
    }
}

fn decode_candidates(results: Vec<serde_json::Value>) -> Vec<Candidate> {
    results
        .into_iter()
        .filter_map(|value| match Candidate::from_value(value) {
            Ok(candidate) => Some(candidate),
            Err(e) => {
                warn!(error = %e, "dropping undecodable catalog result");
                None
            }
        })
        .collect()
}
