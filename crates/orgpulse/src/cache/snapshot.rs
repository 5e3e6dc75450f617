//! On-disk snapshot document and atomic file replacement.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use super::CacheError;
use super::entry::{CacheCategory, CacheRecord};

/// The whole cache as one JSON document: one map per category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    #[serde(default)]
    pub repositories: BTreeMap<String, CacheRecord>,
    #[serde(default)]
    pub branches: BTreeMap<String, CacheRecord>,
    #[serde(default)]
    pub commits: BTreeMap<String, CacheRecord>,
    #[serde(default)]
    pub employees: BTreeMap<String, CacheRecord>,
}

impl CacheSnapshot {
    pub fn map(&self, category: CacheCategory) -> &BTreeMap<String, CacheRecord> {
        match category {
            CacheCategory::Repositories => &self.repositories,
            CacheCategory::Branches => &self.branches,
            CacheCategory::Commits => &self.commits,
            CacheCategory::Employees => &self.employees,
        }
    }

    pub fn map_mut(&mut self, category: CacheCategory) -> &mut BTreeMap<String, CacheRecord> {
        match category {
            CacheCategory::Repositories => &mut self.repositories,
            CacheCategory::Branches => &mut self.branches,
            CacheCategory::Commits => &mut self.commits,
            CacheCategory::Employees => &mut self.employees,
        }
    }

    /// Consume the snapshot, yielding every record with its category.
    pub fn into_records(self) -> impl Iterator<Item = (CacheCategory, String, CacheRecord)> {
        let Self {
            repositories,
            branches,
            commits,
            employees,
        } = self;
        [
            (CacheCategory::Repositories, repositories),
            (CacheCategory::Branches, branches),
            (CacheCategory::Commits, commits),
            (CacheCategory::Employees, employees),
        ]
        .into_iter()
        .flat_map(|(category, map)| map.into_iter().map(move |(k, r)| (category, k, r)))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
        serde_json::from_slice(bytes).map_err(|e| CacheError::Corrupt(e.to_string()))
    }
}

/// Serialized size of the empty document (`{"repositories":{},...}`).
pub fn envelope_size() -> usize {
    serde_json::to_vec(&CacheSnapshot::default()).map_or(0, |v| v.len())
}

/// Upper bound on the bytes one entry adds to the compact document:
/// the quoted key, a colon, the record, and a separating comma.
pub fn entry_size(key: &str, record: &CacheRecord) -> Result<usize, CacheError> {
    let key_len = serde_json::to_vec(key)?.len();
    let record_len = serde_json::to_vec(record)?.len();
    Ok(key_len + 1 + record_len + 1)
}

/// Read a file, treating a missing file as `None`.
pub async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, CacheError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CacheError::Io(e)),
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "snapshot".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replace `path` with `bytes` atomically.
///
/// Writes a sibling temp file, fsyncs it and renames it over the target, so
/// readers see either the old document or the new one, never a torn write.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = temp_sibling(path);
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(CacheError::Io(e));
    }
    fsync_dir(path.parent()).await
}

/// Make a rename in `dir` durable.
#[cfg(unix)]
async fn fsync_dir(dir: Option<&Path>) -> Result<(), CacheError> {
    let dir = match dir {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    tokio::fs::File::open(dir).await?.sync_all().await?;
    Ok(())
}

#[cfg(not(unix))]
async fn fsync_dir(_dir: Option<&Path>) -> Result<(), CacheError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_has_all_four_maps() {
        let json = serde_json::to_value(CacheSnapshot::default()).unwrap();
        for category in CacheCategory::ALL {
            assert!(json.get(category.as_str()).is_some(), "{category}");
        }
        assert_eq!(
            envelope_size(),
            serde_json::to_vec(&CacheSnapshot::default()).unwrap().len()
        );
    }

    #[test]
    fn missing_maps_default_to_empty() {
        let snapshot = CacheSnapshot::decode(br#"{"commits":{}}"#).unwrap();
        assert_eq!(snapshot, CacheSnapshot::default());
    }

    #[test]
    fn garbage_is_corrupt() {
        let err = CacheSnapshot::decode(b"{\"commits\": [").unwrap_err();
        assert!(matches!(err, CacheError::Corrupt(_)));
    }

    #[test]
    fn temp_file_is_a_sibling() {
        let tmp = temp_sibling(Path::new("/var/cache/orgpulse/cache.json"));
        assert_eq!(tmp, Path::new("/var/cache/orgpulse/cache.json.tmp"));
    }

    #[tokio::test]
    async fn write_atomic_creates_parent_and_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        write_atomic(&path, b"first").await.unwrap();
        write_atomic(&path, b"second").await.unwrap();

        assert_eq!(read_optional(&path).await.unwrap().as_deref(), Some(&b"second"[..]));
        assert!(!temp_sibling(&path).exists());
        assert!(read_optional(&dir.path().join("absent.json")).await.unwrap().is_none());
    }
}
