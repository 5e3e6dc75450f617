use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cache partition. Each category has its own TTL and its own top-level map
/// in the snapshot document.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CacheCategory {
    Repositories,
    Branches,
    Commits,
    Employees,
}

impl CacheCategory {
    pub const ALL: [CacheCategory; 4] = [
        CacheCategory::Repositories,
        CacheCategory::Branches,
        CacheCategory::Commits,
        CacheCategory::Employees,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheCategory::Repositories => "repositories",
            CacheCategory::Branches => "branches",
            CacheCategory::Commits => "commits",
            CacheCategory::Employees => "employees",
        }
    }
}

impl fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored value as it appears in the snapshot document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRecord {
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheRecord {
    /// Readable strictly before `expires_at`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// A typed cache hit.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub category: CacheCategory,
    pub data: T,
    pub timestamp: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
