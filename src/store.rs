use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::StorageConfig;
use crate::error::{Result, StoreError};
use crate::models::{CanonicalRecord, IndexEntry, ProvenanceEntry};
use crate::raw::RawRecord;

/// Serialize `value` as pretty JSON and swap it into place, so readers see
/// either the old file or the new one.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let mut body = serde_json::to_vec_pretty(value).map_err(|e| StoreError::json(path, e))?;
    body.push(b'\n');

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &body).map_err(|e| StoreError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))
}

/// Persist one canonical record at its id-keyed path, replacing any earlier
/// version.
pub fn save_record(storage: &StorageConfig, record: &CanonicalRecord) -> Result<PathBuf> {
    let path = storage.record_path(&record.id);
    write_json_atomic(&path, record)?;
    Ok(path)
}

pub fn read_object(path: &Path) -> Result<Value> {
    let body = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    let value: Value = serde_json::from_str(&body).map_err(|e| StoreError::json(path, e))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(StoreError::NotAnObject {
            path: path.to_path_buf(),
        })
    }
}

pub fn load_raw(path: &Path) -> Result<RawRecord> {
    RawRecord::from_value(read_object(path)?).ok_or_else(|| StoreError::NotAnObject {
        path: path.to_path_buf(),
    })
}

fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(dir, e)),
    };
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| StoreError::io(dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Every record file: the records directory first, then loose files in the
/// storage root. Index files are never records.
pub fn record_files(storage: &StorageConfig) -> Result<Vec<PathBuf>> {
    let mut files = json_files(&storage.records_root)?;
    files.extend(
        json_files(&storage.root)?
            .into_iter()
            .filter(|p| !storage.is_index_file(p)),
    );
    Ok(files)
}

/// The master index as last written; an absent index is empty.
pub fn load_index(path: &Path) -> Result<Vec<IndexEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let body = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    serde_json::from_str(&body).map_err(|e| StoreError::json(path, e))
}

pub fn load_provenance(path: &Path) -> Result<Vec<ProvenanceEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let body = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&body).map_err(|_| StoreError::CorruptProvenance {
        path: path.to_path_buf(),
    })
}

/// Append a provenance entry unless one with the same id exists. Returns
/// whether the entry was written.
pub fn upsert_provenance(storage: &StorageConfig, entry: ProvenanceEntry) -> Result<bool> {
    let path = &storage.provenance_path;
    let mut entries = load_provenance(path)?;
    if entries.iter().any(|e| e.property_id == entry.property_id) {
        info!("Provenance for {} already recorded", entry.property_id);
        return Ok(false);
    }
    entries.push(entry);
    write_json_atomic(path, &entries)?;
    Ok(true)
}

/// Remove a file that has been superseded; failures are only logged.
pub fn remove_superseded(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!("Could not remove {}: {}", path.display(), e);
    }
}

// ── Tests ──
