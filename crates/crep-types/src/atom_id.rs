use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::site::SiteId;

/// Identity of a single atom.
///
/// `timestamp` is the authoring site's logical clock and must be strictly
/// greater than the timestamp of the atom's cause. `priority` is a tie-break
/// weight: siblings with a higher priority sort earlier.
///
/// Two ids are equal only when all three fields match, but a weave indexes
/// atoms by `(site, timestamp)` alone (see [`AtomId::key`]).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AtomId {
    pub site: SiteId,
    pub timestamp: u64,
    #[serde(default)]
    pub priority: u32,
}

impl AtomId {
    pub fn new(site: SiteId, timestamp: u64, priority: u32) -> Self {
        Self {
            site,
            timestamp,
            priority,
        }
    }

    /// The `"site@timestamp"` key used by weave and atom indexes.
    pub fn key(&self) -> String {
        format!("{}@{}", self.site, self.timestamp)
    }

    /// Split a key produced by [`AtomId::key`] back into its parts.
    pub fn parse_key(key: &str) -> Result<(SiteId, u64), TypeError> {
        let (site, timestamp) = key
            .rsplit_once('@')
            .ok_or_else(|| TypeError::InvalidAtomKey(key.to_string()))?;
        let timestamp = timestamp
            .parse()
            .map_err(|_| TypeError::InvalidAtomKey(key.to_string()))?;
        Ok((SiteId::new(site)?, timestamp))
    }

    /// Order of two siblings under the same cause.
    ///
    /// `Less` means `self` is placed before `other`: priority descending,
    /// then timestamp descending, then site ascending.
    pub fn sibling_cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then(other.timestamp.cmp(&self.timestamp))
            .then(self.site.cmp(&other.site))
    }
}

impl fmt::Debug for AtomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.priority == 0 {
            write!(f, "AtomId({}@{})", self.site, self.timestamp)
        } else {
            write!(
                f,
                "AtomId({}@{}!{})",
                self.site, self.timestamp, self.priority
            )
        }
    }
}

impl fmt::Display for AtomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.site, self.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(site: &str, timestamp: u64, priority: u32) -> AtomId {
        AtomId::new(SiteId::new(site).unwrap(), timestamp, priority)
    }

    #[test]
    fn equality_requires_all_fields() {
        assert_eq!(id("a", 1, 0), id("a", 1, 0));
        assert_ne!(id("a", 1, 0), id("a", 1, 1));
        assert_ne!(id("a", 1, 0), id("b", 1, 0));
    }

    #[test]
    fn key_ignores_priority() {
        assert_eq!(id("a", 7, 0).key(), "a@7");
        assert_eq!(id("a", 7, 3).key(), id("a", 7, 0).key());
    }

    #[test]
    fn parse_key_splits_parts() {
        let (site, ts) = AtomId::parse_key("site-1@42").unwrap();
        assert_eq!(site.as_str(), "site-1");
        assert_eq!(ts, 42);
        assert!(AtomId::parse_key("no-separator").is_err());
        assert!(AtomId::parse_key("a@notanumber").is_err());
    }

    #[test]
    fn higher_priority_sorts_first() {
        assert_eq!(id("a", 1, 5).sibling_cmp(&id("a", 9, 0)), Ordering::Less);
    }

    #[test]
    fn newer_timestamp_sorts_first() {
        assert_eq!(id("z", 9, 0).sibling_cmp(&id("a", 2, 0)), Ordering::Less);
    }

    #[test]
    fn site_breaks_ties() {
        assert_eq!(id("a", 3, 0).sibling_cmp(&id("b", 3, 0)), Ordering::Less);
        assert_eq!(id("b", 3, 0).sibling_cmp(&id("a", 3, 0)), Ordering::Greater);
    }

    #[test]
    fn missing_priority_deserializes_as_zero() {
        let parsed: AtomId = serde_json::from_str(r#"{"site":"a","timestamp":4}"#).unwrap();
        assert_eq!(parsed, id("a", 4, 0));
    }

    proptest! {
        #[test]
        fn sibling_cmp_is_antisymmetric(
            s1 in "[a-c]", t1 in 0u64..4, p1 in 0u32..3,
            s2 in "[a-c]", t2 in 0u64..4, p2 in 0u32..3,
        ) {
            let a = id(&s1, t1, p1);
            let b = id(&s2, t2, p2);
            prop_assert_eq!(a.sibling_cmp(&b), b.sibling_cmp(&a).reverse());
            prop_assert_eq!(a.sibling_cmp(&b) == Ordering::Equal, a == b);
        }
    }
}
