//! Seams between the engine and the outside world.

use std::collections::HashSet;

use async_trait::async_trait;
use monarch_core::{Candidate, ObservationId, Record};
use monarch_store::StoreError;
use monarch_sync::{CatalogClient, CatalogError, CatalogFilter, PageRequest};

/// Remote catalog queries and asset downloads.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn count(&self, filter: &CatalogFilter) -> Result<usize, CatalogError>;

    async fn page(
        &self,
        filter: &CatalogFilter,
        request: PageRequest,
    ) -> Result<Vec<Candidate>, CatalogError>;

    async fn fetch_asset(&self, url: &str) -> Result<Vec<u8>, CatalogError>;
}

#[async_trait]
impl CatalogSource for CatalogClient {
    async fn count(&self, filter: &CatalogFilter) -> Result<usize, CatalogError> {
        CatalogClient::count(self, filter).await
    }

    async fn page(
        &self,
        filter: &CatalogFilter,
        request: PageRequest,
    ) -> Result<Vec<Candidate>, CatalogError> {
        CatalogClient::page(self, filter, request).await
    }

    async fn fetch_asset(&self, url: &str) -> Result<Vec<u8>, CatalogError> {
        CatalogClient::fetch_asset(self, url).await
    }
}

#[async_trait]
impl<T: CatalogSource + ?Sized> CatalogSource for &T {
    async fn count(&self, filter: &CatalogFilter) -> Result<usize, CatalogError> {
        (**self).count(filter).await
    }

    async fn page(
        &self,
        filter: &CatalogFilter,
        request: PageRequest,
    ) -> Result<Vec<Candidate>, CatalogError> {
        (**self).page(filter, request).await
    }

    async fn fetch_asset(&self, url: &str) -> Result<Vec<u8>, CatalogError> {
        (**self).fetch_asset(url).await
    }
}

/// Durable storage for records and their assets.
///
/// `insert_ignore_conflict` must be atomic and keyed by id: it is the only
/// thing keeping concurrent runs from storing the same observation twice.
pub trait RecordSink {
    fn load_all_ids(&self) -> Result<HashSet<ObservationId>, StoreError>;

    /// Whether a row for `id` is stored now, regardless of any registry snapshot.
    fn exists(&self, id: ObservationId) -> Result<bool, StoreError>;

    /// Durably write an asset, returning the reference stored on the record.
    fn store_asset(&self, id: ObservationId, bytes: &[u8]) -> Result<String, StoreError>;

    /// Remove an asset whose record could not be written and has no stored row.
    fn discard_asset(&self, id: ObservationId) -> Result<(), StoreError>;

    /// `true` when a new row was written, `false` when the id already existed.
    fn insert_ignore_conflict(&self, record: &Record) -> Result<bool, StoreError>;
}

impl<T: RecordSink + ?Sized> RecordSink for &T {
    fn load_all_ids(&self) -> Result<HashSet<ObservationId>, StoreError> {
        (**self).load_all_ids()
    }

    fn exists(&self, id: ObservationId) -> Result<bool, StoreError> {
        (**self).exists(id)
    }

    fn store_asset(&self, id: ObservationId, bytes: &[u8]) -> Result<String, StoreError> {
        (**self).store_asset(id, bytes)
    }

    fn discard_asset(&self, id: ObservationId) -> Result<(), StoreError> {
        (**self).discard_asset(id)
    }

    fn insert_ignore_conflict(&self, record: &Record) -> Result<bool, StoreError> {
        (**self).insert_ignore_conflict(record)
    }
}

#[cfg(feature = "duckdb")]
mod duck {
    use super::*;
    use monarch_store::{AssetStore, DuckStore};

    /// DuckDB rows plus filesystem assets.
    pub struct Persistence {
        pub store: DuckStore,
        pub assets: AssetStore,
    }

    impl Persistence {
        pub fn new(store: DuckStore, assets: AssetStore) -> Self {
            Self { store, assets }
        }
    }

    impl RecordSink for Persistence {
        fn load_all_ids(&self) -> Result<HashSet<ObservationId>, StoreError> {
            self.store.load_all_ids()
        }

        fn exists(&self, id: ObservationId) -> Result<bool, StoreError> {
            self.store.exists(id)
        }

        fn store_asset(&self, id: ObservationId, bytes: &[u8]) -> Result<String, StoreError> {
            Ok(self.assets.write(id, bytes)?.reference)
        }

        fn discard_asset(&self, id: ObservationId) -> Result<(), StoreError> {
            self.assets.remove(id).map(|_| ())
        }

        fn insert_ignore_conflict(&self, record: &Record) -> Result<bool, StoreError> {
            self.store.insert_ignore_conflict(record)
        }
    }
}

#[cfg(feature = "duckdb")]
pub use duck::Persistence;
