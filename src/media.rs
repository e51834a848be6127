use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::CurationSettings;
use crate::error::FetchError;
use crate::models::ImageRef;

/// File-name tokens that mark UI chrome rather than listing photos.
const BLOCKLIST: &[&str] = &[
    "logo",
    "icon",
    "blueheart",
    "shortlist",
    "videocam",
    "mute",
    "fullscreen",
    "time2",
    "landmarkgroup",
    "nearme",
    "voicesearch",
    "projectnoimage",
    "loader",
    "spinner",
    "arrow",
    "star",
    "rating",
    "whatsapp",
    "facebook",
    "twitter",
    "share",
    "email",
    "call",
    "dealer",
    "request-photo",
    "img_not_avail",
    "placeholder",
    "pixel",
];

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "avif"];

/// Something that can fetch a URL's body.
pub trait Fetcher {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(settings: &CurationSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("estate_index/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(HttpFetcher {
            client,
            max_bytes: settings.max_bytes,
        })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        if let Some(len) = resp.content_length() {
            check_size(len, self.max_bytes)?;
        }
        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await? {
            body.extend_from_slice(&chunk);
            check_size(body.len() as u64, self.max_bytes)?;
        }
        Ok(body)
    }
}

fn check_size(len: u64, limit: u64) -> Result<(), FetchError> {
    if len > limit {
        Err(FetchError::TooLarge { limit })
    } else {
        Ok(())
    }
}

/// Last path segment of a URL or file path, query stripped.
fn last_segment(reference: &str) -> &str {
    let path = reference.split(['?', '#']).next().unwrap_or(reference);
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn file_name(reference: &str) -> String {
    last_segment(reference).to_lowercase()
}

fn words(name: &str) -> impl Iterator<Item = &str> {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
}

/// `shortlistIcon` → `shortlist`, `icon`.
fn camel_parts(word: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in word.chars() {
        if c.is_ascii_uppercase() && prev_lower {
            parts.push(current.to_lowercase());
            current.clear();
        }
        prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        current.push(c);
    }
    if !current.is_empty() {
        parts.push(current.to_lowercase());
    }
    parts
}

/// Whether the file name carries a blocklisted token. Tokens match whole
/// words of the name (split on punctuation and camel case), so
/// `decorating-ideas.jpg` is not a rating glyph.
pub fn is_blocked(reference: &str) -> bool {
    let name = last_segment(reference);
    let lowered: Vec<String> = words(name).map(str::to_lowercase).collect();
    let mut tokens: HashSet<String> = lowered.iter().cloned().collect();
    tokens.extend(words(name).flat_map(camel_parts));

    BLOCKLIST.iter().any(|entry| {
        let needle: Vec<&str> = words(entry).collect();
        match needle.as_slice() {
            [] => false,
            [single] => tokens.contains(*single),
            _ => lowered
                .windows(needle.len())
                .any(|w| w.iter().map(String::as_str).eq(needle.iter().copied())),
        }
    })
}

/// Name for the n-th accepted download: the URL's own file name when it
/// looks like an image, else a numbered one.
fn target_name(url: &str, n: usize, taken: &HashSet<String>) -> String {
    let name = file_name(url);
    let usable = Path::new(&name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e));
    let name = if usable {
        name.chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
            .collect()
    } else {
        format!("image_{}.jpg", n)
    };
    if taken.contains(&name) {
        format!("{}_{}", n, name)
    } else {
        name
    }
}

/// Filters, fetches and stores candidate listing images.
pub struct ImageCurator<F = HttpFetcher> {
    fetcher: F,
    settings: CurationSettings,
}

impl ImageCurator<HttpFetcher> {
    pub fn http(settings: CurationSettings) -> Result<Self, FetchError> {
        let fetcher = HttpFetcher::new(&settings)?;
        Ok(ImageCurator { fetcher, settings })
    }
}

impl<F: Fetcher> ImageCurator<F> {
    pub fn new(fetcher: F, settings: CurationSettings) -> Self {
        ImageCurator { fetcher, settings }
    }

    pub fn settings(&self) -> &CurationSettings {
        &self.settings
    }

    /// Fetch up to `max_count` candidates into `dest`. Every failure only
    /// drops its candidate; the returned refs point at the written files.
    pub async fn curate(&self, candidates: &[String], dest: &Path, max_count: usize) -> Vec<ImageRef> {
        let mut seen = HashSet::new();
        let eligible: Vec<&String> = candidates
            .iter()
            .filter(|u| seen.insert(u.as_str()))
            .filter(|u| {
                let blocked = is_blocked(u);
                if blocked {
                    debug!("Blocklisted image {}", u);
                }
                !blocked
            })
            .take(max_count)
            .collect();

        let mut accepted = Vec::new();
        let mut taken = HashSet::new();
        for url in eligible {
            let body = match self.fetcher.fetch(url).await {
                Ok(body) => body,
                Err(e) => {
                    warn!("Image {} dropped: {}", url, e);
                    continue;
                }
            };
            if (body.len() as u64) < self.settings.min_bytes {
                debug!("Image {} dropped: only {} bytes", url, body.len());
                continue;
            }
            if let Err(e) = check_size(body.len() as u64, self.settings.max_bytes) {
                warn!("Image {} dropped: {}", url, e);
                continue;
            }

            if accepted.is_empty() {
                if let Err(e) = tokio::fs::create_dir_all(dest).await {
                    warn!("Cannot create {}: {}", dest.display(), e);
                    return Vec::new();
                }
            }
            let name = target_name(url, accepted.len() + 1, &taken);
            let path = dest.join(&name);
            if let Err(e) = tokio::fs::write(&path, &body).await {
                warn!("Image {} dropped: cannot write {}: {}", url, path.display(), e);
                continue;
            }
            taken.insert(name);
            accepted.push(ImageRef {
                source_url: url.clone(),
                local_path: Some(path.to_string_lossy().into_owned()),
            });
        }
        accepted
    }
}

/// Apply the blocklist and size floor to files already on disk. Missing
/// files are dropped.
pub fn curate_local<P: AsRef<Path>>(paths: &[P], min_bytes: u64) -> Vec<PathBuf> {
    paths
        .iter()
        .map(|p| p.as_ref())
        .filter(|p| !is_blocked(&p.to_string_lossy()))
        .filter(|p| match std::fs::metadata(p) {
            Ok(meta) => meta.is_file() && meta.len() >= min_bytes,
            Err(_) => false,
        })
        .map(Path::to_path_buf)
        .collect()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned bodies and records which URLs were requested.
    #[derive(Default)]
    struct StubFetcher {
        bodies: HashMap<String, Result<usize, u16>>,
        requested: Mutex<Vec<String>>,
    }

    impl StubFetcher {
        fn with(mut self, url: &str, outcome: Result<usize, u16>) -> Self {
            self.bodies.insert(url.to_string(), outcome);
            self
        }
    }

    impl Fetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.requested.lock().unwrap().push(url.to_string());
            match self.bodies.get(url) {
                Some(Ok(len)) => Ok(vec![0u8; *len]),
                Some(Err(code)) => Err(FetchError::Status(*code)),
                None => Err(FetchError::Status(404)),
            }
        }
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn keeps_large_images_and_drops_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = StubFetcher::default()
            .with("https://cdn.example.com/hall.jpg", Ok(20_000))
            .with("https://cdn.example.com/tiny.jpg", Ok(500))
            .with("https://cdn.example.com/gone.jpg", Err(500));
        let curator = ImageCurator::new(fetcher, CurationSettings::default());

        let candidates = urls(&[
            "https://cdn.example.com/hall.jpg",
            "https://cdn.example.com/hall.jpg",
            "https://cdn.example.com/site-logo.png",
            "https://cdn.example.com/tiny.jpg",
            "https://cdn.example.com/gone.jpg",
        ]);
        let refs = curator.curate(&candidates, dir.path(), 5).await;

        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].source_url, "https://cdn.example.com/hall.jpg");
        let written = PathBuf::from(refs[0].local_path.as_deref().unwrap());
        assert_eq!(written, dir.path().join("hall.jpg"));
        assert_eq!(std::fs::metadata(&written).unwrap().len(), 20_000);

        let requested = curator.fetcher.requested.lock().unwrap().clone();
        assert_eq!(
            requested,
            urls(&[
                "https://cdn.example.com/hall.jpg",
                "https://cdn.example.com/tiny.jpg",
                "https://cdn.example.com/gone.jpg",
            ])
        );
    }

    #[tokio::test]
    async fn fetches_at_most_max_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = StubFetcher::default();
        let candidates: Vec<String> = (0..8)
            .map(|i| format!("https://cdn.example.com/photo{}.jpg", i))
            .collect();
        for url in &candidates {
            fetcher = fetcher.with(url, Ok(12_000));
        }
        let curator = ImageCurator::new(fetcher, CurationSettings::default());

        let refs = curator.curate(&candidates, dir.path(), 3).await;
        assert_eq!(refs.len(), 3);
        assert_eq!(curator.fetcher.requested.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn nothing_fetched_leaves_no_directory() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("A1");
        let curator = ImageCurator::new(StubFetcher::default(), CurationSettings::default());
        let refs = curator
            .curate(&urls(&["https://cdn.example.com/missing.jpg"]), &dest, 5)
            .await;
        assert!(refs.is_empty());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn oversized_bodies_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = StubFetcher::default()
            .with("https://cdn.example.com/huge.jpg", Ok(60_000))
            .with("https://cdn.example.com/hall.jpg", Ok(20_000));
        let settings = CurationSettings {
            max_bytes: 50_000,
            ..CurationSettings::default()
        };
        let curator = ImageCurator::new(fetcher, settings);

        let refs = curator
            .curate(
                &urls(&["https://cdn.example.com/huge.jpg", "https://cdn.example.com/hall.jpg"]),
                dir.path(),
                5,
            )
            .await;
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].source_url, "https://cdn.example.com/hall.jpg");
        assert!(!dir.path().join("huge.jpg").exists());
    }

    #[test]
    fn size_check_is_inclusive_of_limit() {
        assert!(check_size(1_000, 1_000).is_ok());
        assert!(matches!(
            check_size(1_001, 1_000),
            Err(FetchError::TooLarge { limit: 1_000 })
        ));
    }

    #[test]
    fn blocklist_matches_whole_tokens() {
        assert!(!is_blocked("https://cdn.example.com/decorating-ideas.jpg"));
        assert!(!is_blocked("https://cdn.example.com/narrow-balcony.jpg"));
        assert!(!is_blocked("https://cdn.example.com/starlight_tower.jpg"));
        assert!(is_blocked("https://cdn.example.com/site-logo.png"));
        assert!(is_blocked("https://cdn.example.com/shortlistIcon.svg?v=2"));
        assert!(is_blocked("https://cdn.example.com/projectNoImage.png"));
        assert!(is_blocked("https://cdn.example.com/img_not_avail.png"));
        assert!(is_blocked("https://cdn.example.com/request-photo.jpg"));
        assert!(!is_blocked("https://cdn.example.com/request.jpg"));
    }

    #[test]
    fn unnamed_urls_get_numbered_files() {
        let taken = HashSet::new();
        assert_eq!(target_name("https://cdn.example.com/render?id=4", 2, &taken), "image_2.jpg");
        let taken: HashSet<String> = ["front.jpg".to_string()].into();
        assert_eq!(target_name("https://b.example.com/front.jpg", 3, &taken), "3_front.jpg");
    }

    #[test]
    fn local_filter_applies_blocklist_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let big = dir.path().join("bedroom.jpg");
        let small = dir.path().join("thumb.jpg");
        let icon = dir.path().join("whatsapp-share.png");
        std::fs::write(&big, vec![1u8; 10_240]).unwrap();
        std::fs::write(&small, vec![1u8; 10_239]).unwrap();
        std::fs::write(&icon, vec![1u8; 50_000]).unwrap();
        let missing = dir.path().join("missing.jpg");

        let kept = curate_local(&[&big, &small, &icon, &missing], 10_240);
        assert_eq!(kept, vec![big]);
    }
}
