//! Configuration locks

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Who holds the configuration lock.
///
/// While a cluster is locked, only changes carrying the lock token are
/// accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockContext {
    /// Secret presented by the lock holder
    pub token: String,
    /// Name of the holder
    pub owner_name: String,
    /// Free-form tags describing the holder
    pub owner_tags: String,
}

impl LockContext {
    /// Create a lock owned by `owner_name`
    pub fn new(
        token: impl Into<String>,
        owner_name: impl Into<String>,
        owner_tags: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            owner_name: owner_name.into(),
            owner_tags: owner_tags.into(),
        }
    }
}

impl Display for LockContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.owner_name, self.owner_tags)
    }
}
