use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::{FetchError, Result};
use crate::identity;
use crate::index::{self, ReconcileReport};
use crate::media::{Fetcher, HttpFetcher, ImageCurator};
use crate::models::{CanonicalRecord, ProvenanceEntry};
use crate::normalize::Normalizer;
use crate::parser::document::Document;
use crate::parser::extract::FieldExtractor;
use crate::store;

/// What one ingested page produced.
pub struct Ingested {
    pub record: CanonicalRecord,
    pub path: PathBuf,
    /// Whether this was the first time the id was seen.
    pub first_seen: bool,
}

pub struct OrganizeCounts {
    pub normalized: usize,
    pub skipped: usize,
}

/// Page → record → storage, one page at a time.
pub struct Pipeline<F = HttpFetcher> {
    extractor: FieldExtractor,
    curator: ImageCurator<F>,
    normalizer: Normalizer,
}

impl Pipeline<HttpFetcher> {
    pub fn from_settings(settings: &Settings) -> std::result::Result<Self, FetchError> {
        Ok(Pipeline::new(
            ImageCurator::http(settings.curation())?,
            Normalizer::from_settings(settings),
        ))
    }
}

impl<F: Fetcher> Pipeline<F> {
    pub fn new(curator: ImageCurator<F>, normalizer: Normalizer) -> Self {
        Pipeline {
            extractor: FieldExtractor::default(),
            curator,
            normalizer,
        }
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Extract, curate images, normalize and persist one rendered page.
    /// Without a caller-supplied id the id is derived from the URL.
    pub async fn ingest(&self, html: &str, url: &str, property_id: Option<&str>) -> Result<Ingested> {
        let property_id = match property_id {
            Some(id) => id.to_string(),
            None => {
                let derived = identity::derive_property_id(url);
                if !derived.stable {
                    warn!("No id in {}; using {}", url, derived.value);
                }
                derived.value
            }
        };

        let storage = self.normalizer.storage();
        let media_dir = storage.media_dir(&property_id);
        std::fs::create_dir_all(&media_dir)
            .map_err(|e| crate::error::StoreError::io(&media_dir, e))?;

        // The parsed document is not Send; drop it before awaiting fetches.
        let mut extracted = {
            let doc = Document::parse(html, url);
            self.extractor.extract(&doc, &property_id)
        };

        let max = self.curator.settings().max_images;
        let mut images = self
            .curator
            .curate(&extracted.core.image_urls, &media_dir, max)
            .await;
        for image in &mut images {
            if let Some(local) = image.local_path.take() {
                image.local_path = Some(storage.relative(Path::new(&local)));
            }
        }
        extracted.core.images = images;

        let record = self.normalizer.normalize(&extracted.into_raw());
        let path = store::save_record(storage, &record)?;
        let first_seen = store::upsert_provenance(
            storage,
            ProvenanceEntry {
                property_id: record.id.clone(),
                url: url.to_string(),
                saved_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            },
        )?;
        info!(
            "Saved {} ({} images) to {}",
            record.id,
            record.images.len(),
            path.display()
        );

        Ok(Ingested {
            record,
            path,
            first_seen,
        })
    }

    /// Re-normalize every stored record, move loose root files into the
    /// records directory under their id, then rebuild the index.
    pub fn organize(&self) -> Result<(OrganizeCounts, ReconcileReport)> {
        let storage = self.normalizer.storage();
        let mut files = store::record_files(storage)?;
        // Oldest first, so the newest file for an id is written last.
        files.sort_by_key(|p| p.metadata().and_then(|m| m.modified()).ok());

        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let mut counts = OrganizeCounts {
            normalized: 0,
            skipped: 0,
        };
        for path in &files {
            pb.inc(1);
            let raw = match store::load_raw(path) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    counts.skipped += 1;
                    continue;
                }
            };
            let stem = path
                .file_stem()
                .map(|s| identity::file_stem(&s.to_string_lossy()))
                .unwrap_or_default();
            let record = self.normalizer.normalize_or(&raw, &stem);
            let target = store::save_record(storage, &record)?;
            if &target != path {
                store::remove_superseded(path);
            }
            counts.normalized += 1;
        }
        pb.finish_and_clear();

        let report = index::reconcile(&self.normalizer)?;
        Ok((counts, report))
    }
}

// ── Tests ──
