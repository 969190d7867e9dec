//! Identity primitives: sites, operation indices, global ids, and Lamport time

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Per-site operation counter.
pub type OperationIndex = u32;

/// Store-local logical clock used only as a recency tiebreak.
pub type LamportClock = u64;

/// Reserved index meaning "unassigned / any index for this site".
///
/// Never handed out by allocation.
pub const WILDCARD_INDEX: OperationIndex = OperationIndex::MAX;

/// Opaque identifier of one installation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(Uuid);

impl SiteId {
    /// Generate a fresh site id (UUID v7)
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SiteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SiteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

/// Identifies one write: the owning site plus its operation index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GlobalId {
    pub site: SiteId,
    pub index: OperationIndex,
}

impl GlobalId {
    #[must_use]
    pub const fn new(site: SiteId, index: OperationIndex) -> Self {
        Self { site, index }
    }

    /// Placeholder id for a record the site has not committed yet
    #[must_use]
    pub const fn wildcard(site: SiteId) -> Self {
        Self::new(site, WILDCARD_INDEX)
    }

    #[must_use]
    pub const fn is_wildcard(&self) -> bool {
        self.index == WILDCARD_INDEX
    }

    /// Whether this id was minted by (or reserved for) `site`
    #[must_use]
    pub fn is_owned_by(&self, site: SiteId) -> bool {
        self.site == site
    }
}

/// Renders as `<site>:<index>`, with `*` for the wildcard index.
impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_wildcard() {
            write!(f, "{}:*", self.site)
        } else {
            write!(f, "{}:{}", self.site, self.index)
        }
    }
}

impl FromStr for GlobalId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || crate::Error::InvalidInput(format!("invalid global id: {s}"));
        let (site, index) = s.trim().rsplit_once(':').ok_or_else(invalid)?;
        let site = site.parse::<SiteId>().map_err(|_| invalid())?;
        let index = if index == "*" {
            WILDCARD_INDEX
        } else {
            index.parse::<OperationIndex>().map_err(|_| invalid())?
        };
        Ok(Self::new(site, index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_id_unique() {
        assert_ne!(SiteId::new(), SiteId::new());
    }

    #[test]
    fn test_site_id_parse() {
        let id = SiteId::new();
        let parsed: SiteId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_wildcard_is_max_index() {
        let id = GlobalId::wildcard(SiteId::new());
        assert!(id.is_wildcard());
        assert_eq!(id.index, u32::MAX);
        assert!(!GlobalId::new(id.site, 0).is_wildcard());
    }

    #[test]
    fn test_global_id_display_and_parse() {
        let site: SiteId = "aaaaaaaa-aaaa-7aaa-8aaa-aaaaaaaaaaaa".parse().unwrap();
        let id = GlobalId::new(site, 42);
        assert_eq!(id.to_string(), "aaaaaaaa-aaaa-7aaa-8aaa-aaaaaaaaaaaa:42");
        assert_eq!(id.to_string().parse::<GlobalId>().unwrap(), id);

        let wildcard = GlobalId::wildcard(site);
        assert_eq!(wildcard.to_string(), "aaaaaaaa-aaaa-7aaa-8aaa-aaaaaaaaaaaa:*");
        assert_eq!(wildcard.to_string().parse::<GlobalId>().unwrap(), wildcard);
    }

    #[test]
    fn test_global_id_parse_rejects_garbage() {
        assert!("nonsense".parse::<GlobalId>().is_err());
        assert!("aaaaaaaa-aaaa-7aaa-8aaa-aaaaaaaaaaaa:-1"
            .parse::<GlobalId>()
            .is_err());
    }
}
