use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identity of one independent author of atoms.
///
/// Sites disambiguate concurrent authors and break ordering ties
/// deterministically, so every replica must agree on the exact string. A
/// site never contains `@`, which separates the site from the timestamp in
/// an atom key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SiteId(String);

impl SiteId {
    /// Create a site from an explicit identifier.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        if id.is_empty() || id.contains('@') {
            return Err(TypeError::InvalidSite(id));
        }
        Ok(Self(id))
    }

    /// Create a fresh, globally unique site (UUID v7).
    pub fn random() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SiteId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SiteId> for String {
    fn from(site: SiteId) -> Self {
        site.0
    }
}

impl fmt::Debug for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SiteId({})", self.0)
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
