pub mod resolve;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{RegionDefaults, Settings, StorageConfig};
use crate::identity;
use crate::media;
use crate::models::{CanonicalRecord, ImageRef};
use crate::raw::{ListingView, RawRecord};

/// Maps any raw record shape onto `CanonicalRecord`.
#[derive(Debug, Clone)]
pub struct Normalizer {
    storage: StorageConfig,
    region: RegionDefaults,
    min_image_bytes: u64,
}

impl Normalizer {
    pub fn new(storage: StorageConfig, region: RegionDefaults, min_image_bytes: u64) -> Self {
        Normalizer {
            storage,
            region,
            min_image_bytes,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Normalizer::new(settings.storage(), settings.region(), settings.min_image_bytes)
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    pub fn normalize(&self, raw: &RawRecord) -> CanonicalRecord {
        let view = raw.view();
        let id = view
            .identifier()
            .unwrap_or_else(|| derived_id(view.url().as_deref()));
        self.normalize_as(view, id)
    }

    /// Like `normalize`, but records without an identifier take `fallback_id`
    /// (the stem of the file they were read from).
    pub fn normalize_or(&self, raw: &RawRecord, fallback_id: &str) -> CanonicalRecord {
        let view = raw.view();
        let id = view.identifier().unwrap_or_else(|| fallback_id.to_string());
        self.normalize_as(view, id)
    }

    fn normalize_as(&self, view: &dyn ListingView, id: String) -> CanonicalRecord {
        let source = resolve::source(view, &id);
        let title = resolve::title(view, &self.region);
        let bhk = resolve::bhk(view, &title, source);
        let listing_type = resolve::listing_type(&title);
        let area = resolve::area(view, &title);
        let price = resolve::price(view);
        let location = resolve::location(view, &title, &self.region);
        let features = view.features();
        let keywords = resolve::keywords(bhk, listing_type, &location, area.as_deref(), &features);
        let images = self.rehome_images(view.images());

        CanonicalRecord {
            id,
            source,
            title,
            listing_type,
            bhk,
            price,
            area,
            location,
            url: view.url(),
            images,
            features,
            keywords,
            scraped_at: view.scraped_at(),
        }
    }

    /// Curated refs (relative paths under the media root) are kept as they
    /// are. Anything else is looked up on disk, re-filtered and rewritten
    /// relative to the storage root; refs without a file are dropped.
    fn rehome_images(&self, images: Vec<ImageRef>) -> Vec<ImageRef> {
        let media_prefix = PathBuf::from(self.storage.relative(&self.storage.images_root));
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for image in images {
            if seen.contains(&image.source_url) {
                continue;
            }
            let Some(local) = image.local_path.as_deref() else {
                continue;
            };
            let local_path = Path::new(local);
            let rehomed = if local_path.is_relative() && local_path.starts_with(&media_prefix) {
                Some(local.to_string())
            } else {
                self.locate(local_path)
                    .filter(|p| !media::curate_local(&[p], self.min_image_bytes).is_empty())
                    .map(|p| self.relative_to_root(&p))
            };
            match rehomed {
                Some(path) => {
                    seen.insert(image.source_url.clone());
                    out.push(ImageRef {
                        source_url: image.source_url,
                        local_path: Some(path),
                    });
                }
                None => debug!("Dropping image {}", local),
            }
        }
        out
    }

    /// First existing candidate for a stored path: as given, below the
    /// storage root, or below the storage root's parent.
    fn locate(&self, path: &Path) -> Option<PathBuf> {
        let mut candidates = vec![path.to_path_buf()];
        if path.is_relative() {
            candidates.push(self.storage.root.join(path));
            if let Some(parent) = self.storage.root.parent() {
                candidates.push(parent.join(path));
            }
        }
        candidates.into_iter().find(|p| p.is_file())
    }

    fn relative_to_root(&self, path: &Path) -> String {
        if path.starts_with(&self.storage.root) {
            return self.storage.relative(path);
        }
        match (path.canonicalize(), self.storage.root.canonicalize()) {
            (Ok(abs), Ok(root)) => match abs.strip_prefix(&root) {
                Ok(rel) => rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/"),
                Err(_) => abs.to_string_lossy().into_owned(),
            },
            _ => path.to_string_lossy().into_owned(),
        }
    }
}

fn derived_id(url: Option<&str>) -> String {
    identity::derive_property_id(url.unwrap_or_default()).value
}

// ── Tests ──
