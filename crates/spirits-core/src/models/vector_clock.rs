//! Vector clock used as the change-feed resume token

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ids::{GlobalId, OperationIndex, SiteId};

/// Highest operation index observed per site.
///
/// A site missing from the map has had none of its operations observed.
/// The empty clock is the "null token".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock {
    map: BTreeMap<SiteId, OperationIndex>,
}

/// Resume token handed back by change-feed queries.
pub type Token = VectorClock;

impl VectorClock {
    /// The empty clock
    #[must_use]
    pub const fn new() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Highest index observed from `site`, if any
    #[must_use]
    pub fn get(&self, site: SiteId) -> Option<OperationIndex> {
        self.map.get(&site).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SiteId, OperationIndex)> + '_ {
        self.map.iter().map(|(site, index)| (*site, *index))
    }

    /// Record that `id` has been observed. Wildcard ids carry no information.
    pub fn observe(&mut self, id: GlobalId) {
        if id.is_wildcard() {
            return;
        }
        let entry = self.map.entry(id.site).or_insert(id.index);
        *entry = (*entry).max(id.index);
    }

    /// Pointwise maximum
    pub fn merge(&mut self, other: &Self) {
        for (site, index) in other.iter() {
            let entry = self.map.entry(site).or_insert(index);
            *entry = (*entry).max(index);
        }
    }

    #[must_use]
    pub fn merged(mut self, other: &Self) -> Self {
        self.merge(other);
        self
    }

    /// `self >= other`: every site in `other` is present here with an index at least as high
    #[must_use]
    pub fn dominates(&self, other: &Self) -> bool {
        other
            .iter()
            .all(|(site, index)| self.get(site).is_some_and(|mine| mine >= index))
    }

    /// Whether the operation `id` is newer than anything observed from its site
    #[must_use]
    pub fn is_unobserved(&self, id: GlobalId) -> bool {
        self.get(id.site).is_none_or(|seen| id.index > seen)
    }
}

impl FromIterator<GlobalId> for VectorClock {
    fn from_iter<I: IntoIterator<Item = GlobalId>>(iter: I) -> Self {
        let mut clock = Self::new();
        for id in iter {
            clock.observe(id);
        }
        clock
    }
}
