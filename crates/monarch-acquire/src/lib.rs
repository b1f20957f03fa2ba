//! Acquisition engine: turns a capped, paginated catalog into a randomized,
//! duplicate-free stream of new observations and stores each one exactly once.
//!
//! Data flows one way:
//!
//! ```text
//! IdentityRegistry ──► PoolBuilder ──► AcquisitionPipeline ──► RecordSink
//!                          │                   │
//!                          └── CatalogSource ◄─┘ (asset downloads)
//! ```
//!
//! All remote and storage calls of one run are issued sequentially. Runs in
//! separate processes coordinate only through the sink's insert-or-ignore.

mod cancel;
mod error;
mod pipeline;
mod pool;
mod progress;
mod registry;
mod traits;

pub use cancel::CancelFlag;
pub use error::{AcquireError, CandidateFailure, RunFailure};
pub use pipeline::{AcquisitionPipeline, HaltReason, RunReport};
pub use pool::{CandidatePool, PoolBuilder, PoolStrategy};
pub use progress::{AcquireEvent, ProgressReporter, SilentReporter, SkipReason, TracingReporter};
pub use registry::IdentityRegistry;
pub use traits::{CatalogSource, RecordSink};

#[cfg(feature = "duckdb")]
pub use traits::Persistence;
