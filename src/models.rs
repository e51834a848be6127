use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    #[serde(rename = "99Acres", alias = "99Acers")]
    Acres,
    MagicBricks,
    Unknown,
}

impl Source {
    pub fn label(&self) -> &'static str {
        match self {
            Source::Acres => "99Acres",
            Source::MagicBricks => "MagicBricks",
            Source::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListingType {
    Rent,
    Sale,
}

impl ListingType {
    pub fn label(&self) -> &'static str {
        match self {
            ListingType::Rent => "Rent",
            ListingType::Sale => "Sale",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub source_url: String,
    #[serde(default)]
    pub local_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
    #[serde(default)]
    pub property: Vec<String>,
    #[serde(default)]
    pub society: Vec<String>,
}

impl Features {
    /// Categories in serialization order, paired with their items.
    pub fn categories(&self) -> [(&'static str, &[String]); 2] {
        [("property", &self.property), ("society", &self.society)]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub text: String,
    #[serde(default)]
    pub rating: Option<String>,
}

/// Label → value facts mined from one page. The first value offered for a
/// label is kept; later offers for the same label are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactMap(BTreeMap<String, String>);

impl FactMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `label` unless the label is already set or the
    /// value is blank. Returns whether the value was stored.
    pub fn offer(&mut self, label: &str, value: &str) -> bool {
        let label = label.trim();
        let value = value.trim();
        if label.is_empty() || value.is_empty() || self.0.contains_key(label) {
            return false;
        }
        self.0.insert(label.to_string(), value.to_string());
        true
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.0.get(label).map(String::as_str)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.0.contains_key(label)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub address: String,
    pub city: String,
    #[serde(default)]
    pub locality: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub id: String,
    pub source: Source,
    pub title: String,
    #[serde(rename = "type")]
    pub listing_type: ListingType,
    #[serde(default)]
    pub bhk: Option<u32>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub area: Option<String>,
    pub location: Location,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageRef>,
    #[serde(default)]
    pub features: Features,
    #[serde(default)]
    pub keywords: BTreeSet<String>,
    #[serde(default)]
    pub scraped_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub title: String,
    pub source: Source,
    #[serde(rename = "type")]
    pub listing_type: ListingType,
    pub bhk: Option<u32>,
    pub location: Location,
    pub file_path: String,
    pub image_count: usize,
}

impl IndexEntry {
    pub fn from_record(record: &CanonicalRecord, file_path: String) -> Self {
        IndexEntry {
            id: record.id.clone(),
            title: record.title.clone(),
            source: record.source,
            listing_type: record.listing_type,
            bhk: record.bhk,
            location: record.location.clone(),
            file_path,
            image_count: record.images.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    pub property_id: String,
    pub url: String,
    pub saved_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fact_map_keeps_first_value() {
        let mut facts = FactMap::new();
        assert!(facts.offer("Floor", "3 out of 12"));
        assert!(!facts.offer("Floor", "Ground"));
        assert!(!facts.offer("Facing", "   "));
        assert_eq!(facts.get("Floor"), Some("3 out of 12"));
        assert_eq!(facts.len(), 1);
    }

    #[test]
    fn source_reads_legacy_spelling() {
        let s: Source = serde_json::from_str("\"99Acers\"").unwrap();
        assert_eq!(s, Source::Acres);
        assert_eq!(serde_json::to_string(&s).unwrap(), "\"99Acres\"");
    }

    #[test]
    fn canonical_record_uses_type_key() {
        let record = CanonicalRecord {
            id: "A1".into(),
            source: Source::Acres,
            title: "2 BHK Flat for Rent".into(),
            listing_type: ListingType::Rent,
            bhk: Some(2),
            price: None,
            area: None,
            location: Location {
                address: "Greater Noida".into(),
                city: "Greater Noida".into(),
                locality: None,
            },
            url: None,
            images: Vec::new(),
            features: Features::default(),
            keywords: BTreeSet::new(),
            scraped_at: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "Rent");
        assert_eq!(json["source"], "99Acres");
        assert!(json["price"].is_null());
    }
}
