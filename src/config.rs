use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

const ENV_PREFIX: &str = "ESTATE";

/// Runtime settings, read from `ESTATE_*` environment variables on top of
/// built-in defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub max_images: usize,
    pub min_image_bytes: u64,
    pub max_download_bytes: u64,
    pub fetch_timeout_secs: u64,
    pub default_city: String,
    pub city_token: String,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("data_dir", "scraped_data")?
            .set_default("max_images", 5_i64)?
            .set_default("min_image_bytes", 10_240_i64)?
            .set_default("max_download_bytes", 20_971_520_i64)?
            .set_default("fetch_timeout_secs", 10_i64)?
            .set_default("default_city", "Greater Noida")?
            .set_default("city_token", "Noida")?
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn storage(&self) -> StorageConfig {
        StorageConfig::under(&self.data_dir)
    }

    pub fn curation(&self) -> CurationSettings {
        CurationSettings {
            max_images: self.max_images,
            min_bytes: self.min_image_bytes,
            max_bytes: self.max_download_bytes,
            timeout: Duration::from_secs(self.fetch_timeout_secs),
        }
    }

    pub fn region(&self) -> RegionDefaults {
        RegionDefaults {
            default_city: self.default_city.clone(),
            city_token: self.city_token.clone(),
        }
    }
}

/// Where records, media and indexes live. Passed explicitly to every
/// component that touches the file system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub records_root: PathBuf,
    pub images_root: PathBuf,
    pub index_path: PathBuf,
    pub provenance_path: PathBuf,
}

impl StorageConfig {
    /// Standard layout below one data directory.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        StorageConfig {
            records_root: root.join("properties"),
            images_root: root.join("images"),
            index_path: root.join("index.json"),
            provenance_path: root.join("properties_index.json"),
            root,
        }
    }

    pub fn media_dir(&self, property_id: &str) -> PathBuf {
        self.images_root.join(crate::identity::file_stem(property_id))
    }

    pub fn record_path(&self, property_id: &str) -> PathBuf {
        self.records_root
            .join(format!("{}.json", crate::identity::file_stem(property_id)))
    }

    /// Files in the storage root that are indexes, not records.
    pub fn is_index_file(&self, path: &Path) -> bool {
        path == self.index_path || path == self.provenance_path
    }

    /// `path` relative to the storage root with `/` separators, or the path
    /// unchanged when it lies outside the root.
    pub fn relative(&self, path: &Path) -> String {
        let Ok(rel) = path.strip_prefix(&self.root) else {
            return path.to_string_lossy().into_owned();
        };
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[derive(Debug, Clone)]
pub struct CurationSettings {
    pub max_images: usize,
    pub min_bytes: u64,
    /// Bodies larger than this are abandoned mid-download.
    pub max_bytes: u64,
    pub timeout: Duration,
}

impl Default for CurationSettings {
    fn default() -> Self {
        CurationSettings {
            max_images: 5,
            min_bytes: 10_240,
            max_bytes: 20 * 1024 * 1024,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegionDefaults {
    pub default_city: String,
    pub city_token: String,
}

impl Default for RegionDefaults {
    fn default() -> Self {
        RegionDefaults {
            default_city: "Greater Noida".to_string(),
            city_token: "Noida".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_under_root() {
        let storage = StorageConfig::under("/data");
        assert_eq!(storage.records_root, PathBuf::from("/data/properties"));
        assert_eq!(storage.record_path("A1"), PathBuf::from("/data/properties/A1.json"));
        assert_eq!(storage.media_dir("A_1"), PathBuf::from("/data/images/A_1"));
        assert_ne!(storage.record_path("A/1"), storage.record_path("A_1"));
        assert!(storage.is_index_file(Path::new("/data/index.json")));
    }

    #[test]
    fn relative_paths_use_forward_slashes() {
        let storage = StorageConfig::under("/data");
        assert_eq!(
            storage.relative(Path::new("/data/images/A1/front.jpg")),
            "images/A1/front.jpg"
        );
        assert_eq!(storage.relative(Path::new("elsewhere/x.jpg")), "elsewhere/x.jpg");
    }

    #[test]
    fn defaults_load_without_environment() {
        let settings = Settings::load().unwrap();
        assert_eq!(settings.max_images, 5);
        assert_eq!(settings.min_image_bytes, 10_240);
        assert_eq!(settings.curation().max_bytes, 20 * 1024 * 1024);
        assert_eq!(settings.curation().timeout, Duration::from_secs(10));
    }
}
