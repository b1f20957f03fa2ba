//! Sync layer: remote catalog queries and annotation system task import.

pub mod annotation;
pub mod catalog;

pub use annotation::{
    AnnotationClient, AnnotationSettings, AuthScheme, AuthStrategy, BearerToken, LegacyToken,
    ProjectInfo, SyncError,
};
pub use catalog::{
    CatalogClient, CatalogError, CatalogFilter, CatalogSettings, DEFAULT_CATALOG_URL,
    LIFE_STAGE_TERM_ID, MONARCH_TAXON_ID, PageRequest,
};
