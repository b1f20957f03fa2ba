//! In-memory catalog and sink used by the engine integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use monarch_acquire::{CatalogSource, RecordSink};
use monarch_core::{Candidate, ObservationId, Record, SamplingConfig};
use monarch_store::StoreError;
use monarch_sync::{CatalogError, CatalogFilter, PageRequest};
use serde_json::{Value, json};

pub const MAX_OFFSET: usize = 10_000;

/// A catalog observation document shaped like the live search API's results.
pub fn observation(id: ObservationId) -> Value {
    json!({
        "id": id,
        "uri": format!("https://www.inaturalist.org/observations/{id}"),
        "observed_on": "2024-08-17",
        "user": { "login": format!("observer{id}"), "name": null },
        "location": "44.9537,-93.0900",
        "place_guess": "Saint Paul, MN, USA",
        "photos": [{ "url": format!("https://assets.test/photos/{id}/square.jpg") }],
        "quality_grade": "research",
        "identifications": [
            { "current": true, "category": "improving" },
            { "current": true, "category": "supporting" }
        ],
        "license_code": "cc-by-nc"
    })
}

pub fn observation_without_photo(id: ObservationId) -> Value {
    let mut value = observation(id);
    value["photos"] = json!([]);
    value
}

pub fn observation_without_uri(id: ObservationId) -> Value {
    let mut value = observation(id);
    value["uri"] = Value::Null;
    value
}

/// Catalog fake. Results are either an explicit list or synthesised so that
/// the result at index `i` has id `i + 1`.
pub struct FakeCatalog {
    results: Option<Vec<Value>>,
    total: usize,
    count_error: Option<CatalogError>,
    page_error: Option<CatalogError>,
    failing_pages: Mutex<usize>,
    failing_asset_calls: HashSet<usize>,
    failing_asset_ids: HashSet<ObservationId>,
    requests: Mutex<Vec<PageRequest>>,
    asset_requests: Mutex<Vec<ObservationId>>,
}

impl FakeCatalog {
    pub fn with_results(results: Vec<Value>) -> Self {
        let total = results.len();
        Self::build(Some(results), total)
    }

    /// `total` observations with ids `1..=total`.
    pub fn synthetic(total: usize) -> Self {
        Self::build(None, total)
    }

    fn build(results: Option<Vec<Value>>, total: usize) -> Self {
        Self {
            results,
            total,
            count_error: None,
            page_error: None,
            failing_pages: Mutex::new(0),
            failing_asset_calls: HashSet::new(),
            failing_asset_ids: HashSet::new(),
            requests: Mutex::new(Vec::new()),
            asset_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_count(mut self, error: CatalogError) -> Self {
        self.count_error = Some(error);
        self
    }

    /// Every page call returns `error`.
    pub fn failing_pages_with(mut self, error: CatalogError) -> Self {
        self.page_error = Some(error);
        self
    }

    /// The next `n` page calls are unavailable.
    pub fn flaky_pages(self, n: usize) -> Self {
        *self.failing_pages.lock().unwrap() = n;
        self
    }

    /// Asset downloads with these zero-based call indices fail.
    pub fn failing_asset_calls(mut self, calls: impl IntoIterator<Item = usize>) -> Self {
        self.failing_asset_calls = calls.into_iter().collect();
        self
    }

    pub fn failing_assets(mut self, ids: impl IntoIterator<Item = ObservationId>) -> Self {
        self.failing_asset_ids = ids.into_iter().collect();
        self
    }

    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn asset_requests(&self) -> Vec<ObservationId> {
        self.asset_requests.lock().unwrap().clone()
    }

    fn result_at(&self, index: usize) -> Option<Value> {
        match &self.results {
            Some(results) => results.get(index).cloned(),
            None if index < self.total => Some(observation(index as ObservationId + 1)),
            None => None,
        }
    }
}

#[async_trait]
impl CatalogSource for FakeCatalog {
    async fn count(&self, _filter: &CatalogFilter) -> Result<usize, CatalogError> {
        match &self.count_error {
            Some(e) => Err(e.clone()),
            None => Ok(self.total),
        }
    }

    async fn page(
        &self,
        _filter: &CatalogFilter,
        request: PageRequest,
    ) -> Result<Vec<Candidate>, CatalogError> {
        self.requests.lock().unwrap().push(request);

        let start = request.start();
        if start >= MAX_OFFSET {
            return Err(CatalogError::OffsetCeiling {
                offset: start,
                max: MAX_OFFSET,
            });
        }
        if let Some(e) = &self.page_error {
            return Err(e.clone());
        }
        {
            let mut failing = self.failing_pages.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(CatalogError::Unavailable("server returned 503".into()));
            }
        }

        let len = match request {
            PageRequest::Offset { limit, .. } => limit,
            PageRequest::Page { per_page, .. } => per_page,
        };
        Ok((start..start + len)
            .map_while(|i| self.result_at(i))
            .map(|v| Candidate::from_value(v).unwrap())
            .collect())
    }

    async fn fetch_asset(&self, url: &str) -> Result<Vec<u8>, CatalogError> {
        // https://assets.test/photos/{id}/medium.jpg
        let id: ObservationId = url.split('/').nth(4).unwrap().parse().unwrap();
        assert!(url.ends_with("/medium.jpg"), "asset url not resized: {url}");

        let call = {
            let mut requests = self.asset_requests.lock().unwrap();
            requests.push(id);
            requests.len() - 1
        };
        if self.failing_asset_calls.contains(&call) || self.failing_asset_ids.contains(&id) {
            return Err(CatalogError::Unavailable("operation timed out".into()));
        }
        Ok(format!("jpeg-bytes-{id}").into_bytes())
    }
}

/// Sink fake backed by maps. Interior mutability because `RecordSink` takes `&self`.
#[derive(Default)]
pub struct MemorySink {
    rows: RefCell<BTreeMap<ObservationId, Record>>,
    assets: RefCell<HashMap<ObservationId, Vec<u8>>>,
    /// Stored ids that `load_all_ids` does not report, as if another writer
    /// inserted them after this run's registry snapshot.
    hidden: RefCell<HashSet<ObservationId>>,
    fail_load: Cell<bool>,
    fail_inserts: Cell<bool>,
    insert_calls: Cell<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate rows as if stored by an earlier run.
    pub fn seeded(ids: impl IntoIterator<Item = ObservationId>) -> Self {
        let sink = Self::default();
        for id in ids {
            let candidate = Candidate::from_value(observation(id)).unwrap();
            let mut record = Record::from_candidate(
                &candidate,
                format!("https://assets.test/photos/{id}/medium.jpg"),
            )
            .unwrap();
            record.local_asset_path = Some(format!("/data/images/{id}.jpg"));
            record.place_text = Some("stored by an earlier run".into());
            sink.rows.borrow_mut().insert(id, record);
        }
        sink
    }

    pub fn hide(&self, id: ObservationId) {
        self.hidden.borrow_mut().insert(id);
    }

    pub fn fail_load(&self) {
        self.fail_load.set(true);
    }

    pub fn fail_inserts(&self) {
        self.fail_inserts.set(true);
    }

    pub fn ids(&self) -> Vec<ObservationId> {
        self.rows.borrow().keys().copied().collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows.borrow().len()
    }

    pub fn record(&self, id: ObservationId) -> Option<Record> {
        self.rows.borrow().get(&id).cloned()
    }

    pub fn has_asset(&self, id: ObservationId) -> bool {
        self.assets.borrow().contains_key(&id)
    }

    pub fn asset(&self, id: ObservationId) -> Option<Vec<u8>> {
        self.assets.borrow().get(&id).cloned()
    }

    /// Give a seeded row its asset file.
    pub fn with_asset(self, id: ObservationId, bytes: &[u8]) -> Self {
        self.assets.borrow_mut().insert(id, bytes.to_vec());
        self
    }

    pub fn asset_count(&self) -> usize {
        self.assets.borrow().len()
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.get()
    }
}

impl RecordSink for MemorySink {
    fn load_all_ids(&self) -> Result<HashSet<ObservationId>, StoreError> {
        if self.fail_load.get() {
            return Err(StoreError::Other("database is locked".into()));
        }
        let hidden = self.hidden.borrow();
        Ok(self
            .rows
            .borrow()
            .keys()
            .filter(|id| !hidden.contains(id))
            .copied()
            .collect())
    }

    fn exists(&self, id: ObservationId) -> Result<bool, StoreError> {
        Ok(self.rows.borrow().contains_key(&id))
    }

    fn store_asset(&self, id: ObservationId, bytes: &[u8]) -> Result<String, StoreError> {
        self.assets.borrow_mut().insert(id, bytes.to_vec());
        Ok(format!("/data/images/{id}.jpg"))
    }

    fn discard_asset(&self, id: ObservationId) -> Result<(), StoreError> {
        self.assets.borrow_mut().remove(&id);
        Ok(())
    }

    fn insert_ignore_conflict(&self, record: &Record) -> Result<bool, StoreError> {
        self.insert_calls.set(self.insert_calls.get() + 1);
        if self.fail_inserts.get() {
            return Err(StoreError::Other("disk I/O error".into()));
        }
        let mut rows = self.rows.borrow_mut();
        if rows.contains_key(&record.id) {
            return Ok(false);
        }
        rows.insert(record.id, record.clone());
        Ok(true)
    }
}

/// Defaults with a smaller page so exhaustive paging spans several calls.
pub fn small_pages(page_size: usize) -> SamplingConfig {
    SamplingConfig {
        page_size,
        ..SamplingConfig::default()
    }
}
