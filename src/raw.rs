use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::{CanonicalRecord, FactMap, Features, ImageRef, Review, Source};

/// Fields shared by every scraper-produced record shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingCore {
    #[serde(default)]
    pub property_id: String,
    #[serde(default)]
    pub property_name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub locality: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub images: Vec<ImageRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub local_images: Vec<String>,
    #[serde(default)]
    pub youtube_video: Option<String>,
    #[serde(default)]
    pub features: Features,
    #[serde(default)]
    pub nearby_places: Vec<String>,
    #[serde(default)]
    pub reviews: Vec<Review>,
    #[serde(default)]
    pub scraped_at: Option<String>,
    #[serde(default)]
    pub meta_data: BTreeMap<String, String>,
    #[serde(default)]
    pub structured_data: Vec<Value>,
    #[serde(default)]
    pub dynamic_facts: FactMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
}

impl ListingCore {
    /// Downloaded images: curated refs first, then legacy bare paths paired
    /// with the candidate URL that has the same file name.
    fn image_refs(&self) -> Vec<ImageRef> {
        let mut refs = self.images.clone();
        for path in &self.local_images {
            let name = file_name(path);
            let source_url = self
                .image_urls
                .iter()
                .find(|u| !name.is_empty() && file_name(url_path(u)) == name)
                .cloned()
                .unwrap_or_else(|| path.clone());
            refs.push(ImageRef {
                source_url,
                local_path: Some(path.clone()),
            });
        }
        refs
    }

    fn society_names(&self) -> Vec<String> {
        self.dynamic_facts
            .get("Society")
            .map(str::to_string)
            .into_iter()
            .chain(self.features.society.iter().cloned())
            .collect()
    }
}

/// Plain listing shape: what the extractor emits for most hosts, and what
/// the short-id site's scraper saved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    #[serde(flatten)]
    pub core: ListingCore,
    #[serde(default)]
    pub bhk: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingDetails {
    #[serde(default)]
    pub configuration: Option<String>,
    #[serde(default)]
    pub bedrooms: Option<String>,
    #[serde(default)]
    pub rent: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub super_builtup_area: Option<String>,
    #[serde(default)]
    pub carpet_area: Option<String>,
    #[serde(default)]
    pub furnishing: Option<String>,
    #[serde(default)]
    pub available_for: Option<String>,
    #[serde(default)]
    pub available_from: Option<String>,
    #[serde(default)]
    pub posted_by: Option<String>,
}

/// Listing shape with a `basic_details` block and a textual BHK
/// (`"3 BHK"`), as produced for the long-id site.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailedListing {
    #[serde(flatten)]
    pub core: ListingCore,
    #[serde(default)]
    pub bhk: Option<String>,
    #[serde(default)]
    pub basic_details: ListingDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// Any other JSON object. Fields are probed by a small set of known keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenericListing(pub Map<String, Value>);

impl GenericListing {
    fn text(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| value_text(self.0.get(*k)?))
    }

    fn details(&self) -> Option<&Map<String, Value>> {
        ["details", "basic_details"]
            .iter()
            .find_map(|k| self.0.get(*k)?.as_object())
    }

    /// A key of the nested `location` object, as canonical records saved
    /// by older tooling carry it.
    fn location_text(&self, key: &str) -> Option<String> {
        value_text(self.0.get("location")?.as_object()?.get(key)?)
    }

    fn detail_text(&self, key: &str) -> Option<String> {
        value_text(self.details()?.get(key)?)
    }

    fn strings(&self, key: &str) -> Vec<String> {
        self.0
            .get(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(value_text).collect())
            .unwrap_or_default()
    }

    fn feature_lists(&self) -> Features {
        let Some(map) = self.0.get("features").and_then(Value::as_object) else {
            return Features::default();
        };
        let list = |key: &str| -> Vec<String> {
            map.get(key)
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(value_text).collect())
                .unwrap_or_default()
        };
        Features {
            property: list("property"),
            society: list("society"),
        }
    }
}

/// One record as found on disk or produced by the extractor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawRecord {
    Listing(ListingRecord),
    Detailed(DetailedListing),
    Canonical(CanonicalRecord),
    Generic(GenericListing),
}

impl RawRecord {
    /// Classify a JSON value by its shape. Returns `None` for non-objects.
    /// A value that looks like a known shape but fails to deserialize as
    /// one falls back to `Generic`.
    pub fn from_value(value: Value) -> Option<RawRecord> {
        let Value::Object(map) = value else {
            return None;
        };

        let looks_canonical = map.contains_key("id")
            && map.get("location").is_some_and(Value::is_object)
            && map.contains_key("keywords");
        if looks_canonical {
            if let Ok(record) = serde_json::from_value(Value::Object(map.clone())) {
                return Some(RawRecord::Canonical(record));
            }
        }

        let looks_detailed = map.contains_key("basic_details")
            || map.get("bhk").is_some_and(Value::is_string);
        if looks_detailed && map.contains_key("property_id") {
            if let Ok(record) = serde_json::from_value(Value::Object(map.clone())) {
                return Some(RawRecord::Detailed(record));
            }
        }

        if map.contains_key("property_id") {
            if let Ok(record) = serde_json::from_value(Value::Object(map.clone())) {
                return Some(RawRecord::Listing(record));
            }
        }

        Some(RawRecord::Generic(GenericListing(map)))
    }

    pub fn view(&self) -> &dyn ListingView {
        match self {
            RawRecord::Listing(r) => r,
            RawRecord::Detailed(r) => r,
            RawRecord::Canonical(r) => r,
            RawRecord::Generic(r) => r,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detail {
    Bedrooms,
    Area,
    SuperBuiltupArea,
    CarpetArea,
    Price,
    Rent,
}

/// Read access shared by every raw record shape; the normalizer only ever
/// sees records through this trait.
pub trait ListingView {
    fn identifier(&self) -> Option<String>;
    /// Explicit origin tag, when the producer recorded one.
    fn origin(&self) -> Option<Source>;
    fn title(&self) -> Option<String>;
    fn bhk(&self) -> Option<u32>;
    fn detail(&self, key: Detail) -> Option<String>;
    fn url(&self) -> Option<String>;
    fn price(&self) -> Option<String>;
    fn locality(&self) -> Option<String>;
    fn address(&self) -> Option<String>;
    fn city(&self) -> Option<String> {
        None
    }
    fn features(&self) -> Features;
    fn society_names(&self) -> Vec<String>;
    fn nearby_places(&self) -> Vec<String>;
    fn images(&self) -> Vec<ImageRef>;
    fn scraped_at(&self) -> Option<String>;
}

impl ListingView for ListingRecord {
    fn identifier(&self) -> Option<String> {
        non_empty(Some(&self.core.property_id))
    }
    fn origin(&self) -> Option<Source> {
        self.core.source
    }
    fn title(&self) -> Option<String> {
        non_empty(self.core.property_name.as_ref())
    }
    fn bhk(&self) -> Option<u32> {
        self.bhk.filter(|n| *n > 0)
    }
    fn detail(&self, key: Detail) -> Option<String> {
        match key {
            Detail::Area => non_empty(self.core.area.as_ref()),
            _ => None,
        }
    }
    fn url(&self) -> Option<String> {
        non_empty(self.core.url.as_ref())
    }
    fn price(&self) -> Option<String> {
        non_empty(self.core.price.as_ref())
    }
    fn locality(&self) -> Option<String> {
        non_empty(self.core.locality.as_ref())
    }
    fn address(&self) -> Option<String> {
        non_empty(self.core.address.as_ref())
    }
    fn features(&self) -> Features {
        self.core.features.clone()
    }
    fn society_names(&self) -> Vec<String> {
        self.core.society_names()
    }
    fn nearby_places(&self) -> Vec<String> {
        self.core.nearby_places.clone()
    }
    fn images(&self) -> Vec<ImageRef> {
        self.core.image_refs()
    }
    fn scraped_at(&self) -> Option<String> {
        self.core.scraped_at.clone()
    }
}

impl ListingView for DetailedListing {
    fn identifier(&self) -> Option<String> {
        non_empty(Some(&self.core.property_id))
    }
    fn origin(&self) -> Option<Source> {
        self.core.source
    }
    fn title(&self) -> Option<String> {
        non_empty(self.core.property_name.as_ref())
    }
    fn bhk(&self) -> Option<u32> {
        self.bhk.as_deref().and_then(leading_number)
    }
    fn detail(&self, key: Detail) -> Option<String> {
        let d = &self.basic_details;
        let value = match key {
            Detail::Bedrooms => d.bedrooms.as_ref().or(d.configuration.as_ref()),
            Detail::Area => d.area.as_ref().or(self.core.area.as_ref()),
            Detail::SuperBuiltupArea => d.super_builtup_area.as_ref(),
            Detail::CarpetArea => d.carpet_area.as_ref(),
            Detail::Price => d.price.as_ref(),
            Detail::Rent => d.rent.as_ref(),
        };
        non_empty(value)
    }
    fn url(&self) -> Option<String> {
        non_empty(self.core.url.as_ref()).or_else(|| non_empty(self.link.as_ref()))
    }
    fn price(&self) -> Option<String> {
        non_empty(self.core.price.as_ref())
    }
    fn locality(&self) -> Option<String> {
        non_empty(self.core.locality.as_ref())
    }
    fn address(&self) -> Option<String> {
        non_empty(self.core.address.as_ref())
    }
    fn features(&self) -> Features {
        self.core.features.clone()
    }
    fn society_names(&self) -> Vec<String> {
        self.core.society_names()
    }
    fn nearby_places(&self) -> Vec<String> {
        self.core.nearby_places.clone()
    }
    fn images(&self) -> Vec<ImageRef> {
        self.core.image_refs()
    }
    fn scraped_at(&self) -> Option<String> {
        self.core.scraped_at.clone()
    }
}

impl ListingView for CanonicalRecord {
    fn identifier(&self) -> Option<String> {
        non_empty(Some(&self.id))
    }
    fn origin(&self) -> Option<Source> {
        Some(self.source)
    }
    fn title(&self) -> Option<String> {
        non_empty(Some(&self.title))
    }
    fn bhk(&self) -> Option<u32> {
        self.bhk
    }
    fn detail(&self, key: Detail) -> Option<String> {
        match key {
            Detail::Area => non_empty(self.area.as_ref()),
            _ => None,
        }
    }
    fn url(&self) -> Option<String> {
        non_empty(self.url.as_ref())
    }
    fn price(&self) -> Option<String> {
        non_empty(self.price.as_ref())
    }
    fn locality(&self) -> Option<String> {
        non_empty(self.location.locality.as_ref())
    }
    fn address(&self) -> Option<String> {
        non_empty(Some(&self.location.address))
    }
    fn city(&self) -> Option<String> {
        non_empty(Some(&self.location.city))
    }
    fn features(&self) -> Features {
        self.features.clone()
    }
    fn society_names(&self) -> Vec<String> {
        self.features.society.clone()
    }
    fn nearby_places(&self) -> Vec<String> {
        Vec::new()
    }
    fn images(&self) -> Vec<ImageRef> {
        self.images.clone()
    }
    fn scraped_at(&self) -> Option<String> {
        self.scraped_at.clone()
    }
}

impl ListingView for GenericListing {
    fn identifier(&self) -> Option<String> {
        self.text(&["id", "property_id"])
    }
    fn origin(&self) -> Option<Source> {
        self.0
            .get("source")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
    fn title(&self) -> Option<String> {
        self.text(&["title", "property_name", "name"])
    }
    fn bhk(&self) -> Option<u32> {
        match self.0.get("bhk")? {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).filter(|n| *n > 0),
            Value::String(s) => leading_number(s),
            _ => None,
        }
    }
    fn detail(&self, key: Detail) -> Option<String> {
        match key {
            Detail::Bedrooms => self
                .detail_text("bedrooms")
                .or_else(|| self.detail_text("configuration")),
            Detail::Area => self.detail_text("area").or_else(|| self.text(&["area"])),
            Detail::SuperBuiltupArea => self.detail_text("super_builtup_area"),
            Detail::CarpetArea => self.detail_text("carpet_area"),
            Detail::Price => self.detail_text("price"),
            Detail::Rent => self.detail_text("rent"),
        }
    }
    fn url(&self) -> Option<String> {
        self.text(&["url", "link"])
    }
    fn price(&self) -> Option<String> {
        self.text(&["price"])
    }
    fn locality(&self) -> Option<String> {
        self.text(&["locality"])
            .or_else(|| self.location_text("locality"))
    }
    fn address(&self) -> Option<String> {
        self.text(&["address"])
            .or_else(|| self.location_text("address"))
    }
    fn city(&self) -> Option<String> {
        self.text(&["city"]).or_else(|| self.location_text("city"))
    }
    fn features(&self) -> Features {
        self.feature_lists()
    }
    fn society_names(&self) -> Vec<String> {
        let fact = self
            .0
            .get("dynamic_facts")
            .and_then(|f| f.get("Society"))
            .and_then(value_text);
        fact.into_iter().chain(self.feature_lists().society).collect()
    }
    fn nearby_places(&self) -> Vec<String> {
        let nearby = self.strings("nearby_places");
        if nearby.is_empty() {
            self.strings("location")
        } else {
            nearby
        }
    }
    fn images(&self) -> Vec<ImageRef> {
        let urls = self.strings("image_urls");
        let mut refs: Vec<ImageRef> = self
            .0
            .get("images")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(path) => Some(ImageRef {
                            source_url: path.clone(),
                            local_path: Some(path.clone()),
                        }),
                        other => serde_json::from_value(other.clone()).ok(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        for path in self.strings("local_images") {
            let name = file_name(&path).to_string();
            let source_url = urls
                .iter()
                .find(|u| !name.is_empty() && file_name(url_path(u)) == name)
                .cloned()
                .unwrap_or_else(|| path.clone());
            refs.push(ImageRef {
                source_url,
                local_path: Some(path),
            });
        }
        refs
    }
    fn scraped_at(&self) -> Option<String> {
        self.text(&["scraped_at"])
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => non_empty(Some(s)),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First run of digits in `text`, e.g. `"3 BHK"` → 3.
pub(crate) fn leading_number(text: &str) -> Option<u32> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok().filter(|n| *n > 0)
}

fn file_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
}

fn url_path(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}
