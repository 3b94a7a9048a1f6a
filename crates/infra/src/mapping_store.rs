//! Mapping Store persistence.
//!
//! The mapping is a single JSON document. Writes go to a temp file in the same
//! directory, are fsynced, then renamed over the target so readers never see a
//! partial file.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use tracing::{debug, info};

use woosync_catalog::MappingDocument;
use woosync_core::DomainError;

/// Mapping store error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("mapping file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("mapping file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error(transparent)]
    Invalid(#[from] DomainError),
    #[error("failed to serialize mapping: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Storage of the mapping document.
pub trait MappingStore: Send + Sync {
    /// Load the document. A store that was never written yields an empty document.
    fn load(&self) -> Result<MappingDocument, StoreError>;

    /// Validate and replace the document.
    fn save(&self, doc: &MappingDocument) -> Result<(), StoreError>;
}

/// JSON file on local disk.
#[derive(Debug, Clone)]
pub struct JsonFileMappingStore {
    path: PathBuf,
}

impl JsonFileMappingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl MappingStore for JsonFileMappingStore {
    fn load(&self) -> Result<MappingDocument, StoreError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no mapping file yet");
                return Ok(MappingDocument::default());
            }
            Err(e) => return Err(self.io(e)),
        };

        if raw.trim().is_empty() {
            return Ok(MappingDocument::default());
        }

        let legacy = raw.trim_start().starts_with('[');
        let doc = MappingDocument::from_json_str(&raw).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        if legacy {
            info!(path = %self.path.display(), entries = doc.auto.len(), "migrated legacy mapping file");
        }
        Ok(doc)
    }

    fn save(&self, doc: &MappingDocument) -> Result<(), StoreError> {
        doc.validate()?;
        let body = serde_json::to_vec_pretty(doc)?;

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| self.io(e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| self.io(e))?;
        tmp.write_all(&body).map_err(|e| self.io(e))?;
        tmp.as_file().sync_all().map_err(|e| self.io(e))?;
        tmp.persist(&self.path).map_err(|e| self.io(e.error))?;

        debug!(
            path = %self.path.display(),
            auto = doc.auto.len(),
            overrides = doc.overrides.len(),
            "mapping saved"
        );
        Ok(())
    }
}

/// In-memory mapping store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryMappingStore {
    doc: RwLock<MappingDocument>,
    saves: RwLock<usize>,
}

impl InMemoryMappingStore {
    pub fn new(doc: MappingDocument) -> Self {
        Self {
            doc: RwLock::new(doc),
            saves: RwLock::new(0),
        }
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        *self.saves.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MappingStore for InMemoryMappingStore {
    fn load(&self) -> Result<MappingDocument, StoreError> {
        Ok(self.doc.read().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save(&self, doc: &MappingDocument) -> Result<(), StoreError> {
        doc.validate()?;
        *self.doc.write().unwrap_or_else(PoisonError::into_inner) = doc.clone();
        *self.saves.write().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use woosync_catalog::{MappingEntry, MappingStatus, OverrideEntry, SCHEMA_VERSION};
    use woosync_core::{ItemCode, WcProductId};

    fn entry(code: &str, id: u64) -> MappingEntry {
        MappingEntry {
            wc_product_id: Some(WcProductId::new(id).unwrap()),
            status: MappingStatus::Matched,
            ..MappingEntry::unmatched(ItemCode::new(code).unwrap())
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileMappingStore::new(dir.path().join("nested/mapping.json"));
        let doc = store.load().unwrap();
        assert!(doc.auto.is_empty() && doc.overrides.is_empty());
        assert_eq!(doc.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn save_then_load_round_trips_and_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileMappingStore::new(dir.path().join("nested/mapping.json"));
        let doc = MappingDocument {
            generated_at: Some(Utc::now()),
            auto: vec![entry("A", 1)],
            overrides: vec![OverrideEntry {
                erp_item_code: ItemCode::new("B").unwrap(),
                forced_wc_product_id: None,
                note: Some("released".into()),
            }],
            ..MappingDocument::default()
        };

        store.save(&doc).unwrap();
        assert_eq!(store.load().unwrap(), doc);

        // no temp files left behind
        let names: Vec<_> = std::fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("mapping.json")]);
    }

    #[test]
    fn legacy_file_is_migrated_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.json");
        std::fs::write(
            &path,
            r#"[{"erp_item_code":"SKU1","wc_sku":"SKU1","wc_product_id":3,"status":"updated"}]"#,
        )
        .unwrap();

        let doc = JsonFileMappingStore::new(&path).load().unwrap();
        assert_eq!(doc.auto.len(), 1);
        assert_eq!(doc.auto[0].status, MappingStatus::Matched);
        assert!(doc.overrides.is_empty());
    }

    #[test]
    fn corrupt_file_is_an_error_and_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = JsonFileMappingStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn invalid_document_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.json");
        let store = JsonFileMappingStore::new(&path);
        let doc = MappingDocument {
            auto: vec![entry("A", 1), entry("A", 2)],
            ..MappingDocument::default()
        };

        assert!(matches!(store.save(&doc), Err(StoreError::Invalid(_))));
        assert!(!path.exists());
    }

    #[test]
    fn in_memory_store_counts_saves() {
        let store = InMemoryMappingStore::default();
        store.save(&MappingDocument::default()).unwrap();
        assert_eq!(store.save_count(), 1);
    }
}
