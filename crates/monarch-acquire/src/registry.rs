use std::collections::HashSet;

use monarch_core::ObservationId;
use monarch_store::StoreError;

use crate::traits::RecordSink;

/// Snapshot of the ids already stored, taken once at the start of a run.
///
/// Owned by a single run and grown in memory as records are accepted. It goes
/// stale the moment another writer touches storage; the sink's
/// insert-or-ignore keeps that harmless.
#[derive(Debug, Clone, Default)]
pub struct IdentityRegistry {
    known: HashSet<ObservationId>,
}

impl IdentityRegistry {
    /// One full scan of the sink's key space.
    pub fn load<S: RecordSink + ?Sized>(sink: &S) -> Result<Self, StoreError> {
        Ok(Self {
            known: sink.load_all_ids()?,
        })
    }

    pub fn contains(&self, id: ObservationId) -> bool {
        self.known.contains(&id)
    }

    /// Returns `false` if the id was already known.
    pub fn add(&mut self, id: ObservationId) -> bool {
        self.known.insert(id)
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

impl FromIterator<ObservationId> for IdentityRegistry {
    fn from_iter<I: IntoIterator<Item = ObservationId>>(iter: I) -> Self {
        Self {
            known: iter.into_iter().collect(),
        }
    }
}
