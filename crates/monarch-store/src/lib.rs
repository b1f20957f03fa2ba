//! Storage layer: DuckDB observation store and filesystem asset store.

mod assets;
mod error;
pub use assets::{AssetRef, AssetStore};
pub use error::StoreError;

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::{DuckStore, PurgeStats, SchemaStatus};
