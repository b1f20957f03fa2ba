pub mod annotation;
pub mod config;
pub mod coords;
pub mod record;

pub use annotation::{AnnotationTask, LifeStage};
pub use config::SamplingConfig;
pub use coords::{Coordinates, parse_coordinates};
pub use record::{Candidate, CandidateError, ObservationId, Record};
