//! Owned result of one request.

use usched_core::{EntryId, EntryRecord};

/// What a request produced, copied out of the engine's buffer.
///
/// Run and stop requests produce entry IDs; show requests produce full
/// records in the order the engine reported them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultSet {
    Ids(Vec<EntryId>),
    Records(Vec<EntryRecord>),
}

impl ResultSet {
    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Ids(ids) => ids.len(),
            Self::Records(records) => records.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The IDs, if this came from a run or stop request.
    #[must_use]
    pub fn ids(&self) -> Option<&[EntryId]> {
        match self {
            Self::Ids(ids) => Some(ids),
            Self::Records(_) => None,
        }
    }

    /// The records, if this came from a show request.
    #[must_use]
    pub fn records(&self) -> Option<&[EntryRecord]> {
        match self {
            Self::Records(records) => Some(records),
            Self::Ids(_) => None,
        }
    }

    #[must_use]
    pub fn into_ids(self) -> Option<Vec<EntryId>> {
        match self {
            Self::Ids(ids) => Some(ids),
            Self::Records(_) => None,
        }
    }

    #[must_use]
    pub fn into_records(self) -> Option<Vec<EntryRecord>> {
        match self {
            Self::Records(records) => Some(records),
            Self::Ids(_) => None,
        }
    }
}
