use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::error::Result;
use crate::identity;
use crate::models::{CanonicalRecord, IndexEntry};
use crate::normalize::Normalizer;
use crate::store;

/// A record read back from disk, with what is needed to pick between
/// files that claim the same id.
struct StoredRecord {
    record: CanonicalRecord,
    path: PathBuf,
    modified: Option<SystemTime>,
    in_records_root: bool,
}

impl StoredRecord {
    /// Newest file first, then the records directory, then path order.
    fn supersedes(&self, other: &StoredRecord) -> bool {
        (self.modified, self.in_records_root, std::cmp::Reverse(&self.path))
            > (other.modified, other.in_records_root, std::cmp::Reverse(&other.path))
    }
}

pub struct ReconcileReport {
    pub entries: Vec<IndexEntry>,
    pub skipped: usize,
}

/// Rebuild the master index from every record file in storage and write it
/// in one step. Unreadable files are logged and counted, never fatal.
pub fn reconcile(normalizer: &Normalizer) -> Result<ReconcileReport> {
    let storage = normalizer.storage();
    let files = store::record_files(storage)?;

    let loaded: Vec<Option<StoredRecord>> = files
        .par_iter()
        .map(|path| load_record(normalizer, path))
        .collect();
    let skipped = loaded.iter().filter(|r| r.is_none()).count();

    let mut by_id: BTreeMap<String, StoredRecord> = BTreeMap::new();
    for stored in loaded.into_iter().flatten() {
        match by_id.get(&stored.record.id) {
            Some(current) if !stored.supersedes(current) => {
                info!(
                    "Duplicate id {}: keeping {} over {}",
                    stored.record.id,
                    current.path.display(),
                    stored.path.display()
                );
            }
            _ => {
                by_id.insert(stored.record.id.clone(), stored);
            }
        }
    }

    let entries: Vec<IndexEntry> = by_id
        .values()
        .map(|s| IndexEntry::from_record(&s.record, storage.relative(&s.path)))
        .collect();
    store::write_json_atomic(&storage.index_path, &entries)?;

    if skipped > 0 {
        warn!("{} record files skipped", skipped);
    }
    info!("Indexed {} properties", entries.len());
    Ok(ReconcileReport { entries, skipped })
}

/// Fields checked for coverage, in report order.
pub const COVERAGE_FIELDS: [&str; 6] = [
    "bhk",
    "price",
    "area",
    "url",
    "location.address",
    "location.locality",
];

/// How many records lack each of `COVERAGE_FIELDS`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldCoverage {
    pub records: usize,
    pub missing: [usize; COVERAGE_FIELDS.len()],
}

impl FieldCoverage {
    fn add(&mut self, record: &CanonicalRecord) {
        self.records += 1;
        for (slot, missing) in self.missing.iter_mut().zip(missing_fields(record)) {
            if missing {
                *slot += 1;
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageReport {
    pub overall: FieldCoverage,
    pub by_source: BTreeMap<&'static str, FieldCoverage>,
}

fn is_missing(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        None => true,
        Some(v) => v.is_empty() || v.eq_ignore_ascii_case("unknown"),
    }
}

fn missing_fields(record: &CanonicalRecord) -> [bool; COVERAGE_FIELDS.len()] {
    [
        record.bhk.is_none(),
        is_missing(record.price.as_deref()),
        is_missing(record.area.as_deref()),
        is_missing(record.url.as_deref()),
        is_missing(Some(&record.location.address)),
        is_missing(record.location.locality.as_deref()),
    ]
}

/// Missing-field counts, overall and per source.
pub fn field_coverage<'a, I>(records: I) -> CoverageReport
where
    I: IntoIterator<Item = &'a CanonicalRecord>,
{
    let mut report = CoverageReport::default();
    for record in records {
        report.overall.add(record);
        report
            .by_source
            .entry(record.source.label())
            .or_default()
            .add(record);
    }
    report
}

/// The records behind index entries. Unreadable files are logged and left
/// out.
pub fn load_indexed(normalizer: &Normalizer, entries: &[IndexEntry]) -> Vec<CanonicalRecord> {
    let root = &normalizer.storage().root;
    entries
        .par_iter()
        .filter_map(|entry| match store::load_raw(&root.join(&entry.file_path)) {
            Ok(raw) => Some(normalizer.normalize_or(&raw, &entry.id)),
            Err(e) => {
                warn!("Skipping {}: {}", entry.file_path, e);
                None
            }
        })
        .collect()
}

fn load_record(normalizer: &Normalizer, path: &Path) -> Option<StoredRecord> {
    let raw = match store::load_raw(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Skipping {}: {}", path.display(), e);
            return None;
        }
    };
    let stem = path
        .file_stem()
        .map(|s| identity::file_stem(&s.to_string_lossy()))
        .unwrap_or_default();
    let storage = normalizer.storage();
    Some(StoredRecord {
        record: normalizer.normalize_or(&raw, &stem),
        modified: path.metadata().and_then(|m| m.modified()).ok(),
        in_records_root: path.starts_with(&storage.records_root),
        path: path.to_path_buf(),
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RegionDefaults, StorageConfig};
    use crate::models::{ListingType, Location, Source};
    use std::fs;

    fn normalizer(root: &Path) -> Normalizer {
        Normalizer::new(StorageConfig::under(root), RegionDefaults::default(), 10_240)
    }

    fn record(id: &str, price: &str) -> CanonicalRecord {
        CanonicalRecord {
            id: id.into(),
            source: Source::Acres,
            title: format!("2 BHK Flat for Rent in Sector {}, Noida", id.len()),
            listing_type: ListingType::Rent,
            bhk: Some(2),
            price: Some(price.into()),
            area: None,
            location: Location {
                address: "Sector 2, Noida".into(),
                city: "Noida".into(),
                locality: Some("Sector 2".into()),
            },
            url: None,
            images: Vec::new(),
            features: Default::default(),
            keywords: Default::default(),
            scraped_at: None,
        }
    }

    #[test]
    fn latest_save_wins_for_same_id() {
        let dir = tempfile::tempdir().unwrap();
        let n = normalizer(dir.path());
        store::save_record(n.storage(), &record("A1", "10,000")).unwrap();
        reconcile(&n).unwrap();
        store::save_record(n.storage(), &record("A1", "15,000")).unwrap();

        let report = reconcile(&n).unwrap();
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].file_path, "properties/A1.json");

        let saved = store::load_raw(&dir.path().join(&report.entries[0].file_path)).unwrap();
        assert_eq!(saved.view().price().as_deref(), Some("15,000"));
    }

    #[test]
    fn reconcile_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let n = normalizer(dir.path());
        for id in ["C3", "A1", "B2"] {
            store::save_record(n.storage(), &record(id, "9,000")).unwrap();
        }
        fs::write(
            dir.path().join("raw_listing.json"),
            r#"{"property_id": "R9", "property_name": "1 BHK Flat for Rent", "bhk": 1}"#,
        )
        .unwrap();

        let first = reconcile(&n).unwrap();
        let bytes = fs::read(&n.storage().index_path).unwrap();
        let second = reconcile(&n).unwrap();
        assert_eq!(fs::read(&n.storage().index_path).unwrap(), bytes);

        let ids: Vec<&str> = first.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["A1", "B2", "C3", "R9"]);
        assert_eq!(second.entries, first.entries);
        assert_eq!(first.entries[3].file_path, "raw_listing.json");
    }

    #[test]
    fn corrupt_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let n = normalizer(dir.path());
        store::save_record(n.storage(), &record("A1", "9,000")).unwrap();
        fs::write(n.storage().records_root.join("broken.json"), "{\"id\": ").unwrap();
        fs::write(n.storage().records_root.join("array.json"), "[]").unwrap();

        let report = reconcile(&n).unwrap();
        assert_eq!(report.skipped, 2);
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].id, "A1");
    }

    #[test]
    fn records_root_preferred_on_tie() {
        let a = StoredRecord {
            record: record("A1", "1"),
            path: PathBuf::from("data/properties/A1.json"),
            modified: None,
            in_records_root: true,
        };
        let b = StoredRecord {
            record: record("A1", "2"),
            path: PathBuf::from("data/A1.json"),
            modified: None,
            in_records_root: false,
        };
        assert!(a.supersedes(&b));
        assert!(!b.supersedes(&a));
    }

    #[test]
    fn coverage_counts_missing_and_unknown_values() {
        let mut full = record("A1", "9,000");
        full.area = Some("950 sqft".into());
        full.url = Some("https://www.99acres.com/x-spid-A1".into());

        let mut sparse = record("74093847294839201", "Unknown");
        sparse.source = Source::MagicBricks;
        sparse.bhk = None;
        sparse.location.locality = Some("unknown".into());

        let report = field_coverage([&full, &sparse]);
        assert_eq!(report.overall.records, 2);
        // bhk, price, area, url, address, locality
        assert_eq!(report.overall.missing, [1, 1, 1, 1, 0, 1]);
        assert_eq!(report.by_source["99Acres"].missing, [0, 0, 0, 0, 0, 0]);
        assert_eq!(report.by_source["MagicBricks"].missing, [1, 1, 1, 1, 0, 1]);
        assert_eq!(report.by_source.len(), 2);
    }

    #[test]
    fn indexed_records_are_loaded_back() {
        let dir = tempfile::tempdir().unwrap();
        let n = normalizer(dir.path());
        store::save_record(n.storage(), &record("A1", "9,000")).unwrap();
        store::save_record(n.storage(), &record("B2", "9,500")).unwrap();
        let report = reconcile(&n).unwrap();
        fs::remove_file(n.storage().records_root.join("B2.json")).unwrap();

        let records = load_indexed(&n, &report.entries);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "A1");
    }

    #[test]
    fn missing_storage_yields_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let n = normalizer(&dir.path().join("fresh"));
        let report = reconcile(&n).unwrap();
        assert!(report.entries.is_empty());
        assert_eq!(fs::read_to_string(&n.storage().index_path).unwrap(), "[]\n");
    }
}
