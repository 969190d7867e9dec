//! Per-site operation log, the unit of propagating a site's writes

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ids::{GlobalId, OperationIndex, SiteId};

/// Consecutive operations of one site, starting at `starting_index`.
///
/// The operation at `starting_index + n` produced `operations[n]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationLogEntry {
    pub starting_index: OperationIndex,
    pub operations: Vec<GlobalId>,
}

impl OperationLogEntry {
    #[must_use]
    pub const fn new(starting_index: OperationIndex, operations: Vec<GlobalId>) -> Self {
        Self {
            starting_index,
            operations,
        }
    }

    /// Pair each target id with the operation index that produced it
    pub fn indexed(&self) -> impl Iterator<Item = (u64, GlobalId)> + '_ {
        self.operations
            .iter()
            .enumerate()
            .map(|(offset, id)| (u64::from(self.starting_index) + offset as u64, *id))
    }

    /// Index one past the last operation in this entry
    #[must_use]
    pub fn end_index(&self) -> u64 {
        u64::from(self.starting_index) + self.operations.len() as u64
    }
}

/// What each site has done, keyed by the site that performed the operations
pub type OperationLog = BTreeMap<SiteId, OperationLogEntry>;
