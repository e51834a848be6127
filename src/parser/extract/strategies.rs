use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::Selector;
use serde_json::Value;
use tracing::debug;

use crate::parser::document::{element_text, Document};
use crate::parser::facts::{collapse_whitespace, MinedFacts};

use super::collect;

static PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:₹|\bRs\.?|\bINR)\s*([\d,]+(?:\.\d+)?(?:\s*(?:Cr|Crore|Lac|Lakh|K)\b)?)").unwrap()
});
static BHK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*BHK").unwrap());
static URL_BHK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)(\d+)-bhk").unwrap());

/// Entity types that describe the site rather than the listing.
const SITE_ENTITY_TYPES: &[&str] = &[
    "Organization",
    "WebSite",
    "WebPage",
    "BreadcrumbList",
    "SiteNavigationElement",
    "SearchAction",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    Price,
    Bhk,
    Area,
    Locality,
    Address,
    Description,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListField {
    Images,
    PropertyFeatures,
    SocietyFeatures,
    NearbyPlaces,
}

/// Everything a strategy may look at for one page.
pub struct Evidence<'a> {
    pub doc: &'a Document,
    pub facts: &'a MinedFacts,
}

/// One evidence channel. Scalar lookups return the channel's best value
/// for a field; list lookups return everything the channel sees.
pub trait ExtractionStrategy {
    fn name(&self) -> &'static str;

    fn try_extract(&self, field: Field, ev: &Evidence<'_>) -> Option<String>;

    fn collect(&self, _field: ListField, _ev: &Evidence<'_>) -> Vec<String> {
        Vec::new()
    }
}

/// Strategies in precedence order.
pub struct StrategyChain {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl Default for StrategyChain {
    fn default() -> Self {
        StrategyChain::new(vec![
            Box::new(StructuredData),
            Box::new(MetaTags),
            Box::new(DomSelectors),
            Box::new(TextPatterns),
        ])
    }
}

impl StrategyChain {
    pub fn new(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        StrategyChain { strategies }
    }

    /// First non-empty value in chain order; later strategies are not
    /// consulted once one answers.
    pub fn resolve(&self, field: Field, ev: &Evidence<'_>) -> Option<String> {
        self.strategies.iter().find_map(|s| {
            let value = s
                .try_extract(field, ev)
                .map(|v| collapse_whitespace(&v))
                .filter(|v| !v.is_empty())?;
            debug!("{:?} resolved by {}", field, s.name());
            Some(value)
        })
    }

    /// Union of every strategy's values, first occurrence kept.
    pub fn gather(&self, field: ListField, ev: &Evidence<'_>) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for strategy in &self.strategies {
            for value in strategy.collect(field, ev) {
                let value = value.trim().to_string();
                if !value.is_empty() && seen.insert(value.clone()) {
                    out.push(value);
                }
            }
        }
        out
    }
}

// ── Structured data (JSON-LD) ──

pub struct StructuredData;

impl StructuredData {
    fn listing_entities(doc: &Document) -> impl Iterator<Item = &Value> {
        doc.entities.iter().filter(|e| !is_site_entity(e))
    }
}

impl ExtractionStrategy for StructuredData {
    fn name(&self) -> &'static str {
        "structured-data"
    }

    fn try_extract(&self, field: Field, ev: &Evidence<'_>) -> Option<String> {
        let mut entities = Self::listing_entities(ev.doc);
        match field {
            Field::Name => entities.find_map(|e| json_text(e.get("name")?)),
            Field::Description => entities.find_map(|e| json_text(e.get("description")?)),
            Field::Price => entities.find_map(entity_price),
            Field::Bhk => entities.find_map(|e| {
                ["numberOfBedrooms", "numberOfRooms"]
                    .iter()
                    .find_map(|k| json_text(e.get(*k)?))
            }),
            Field::Area => entities.find_map(|e| floor_size(e.get("floorSize")?)),
            Field::Locality => {
                entities.find_map(|e| json_text(e.get("address")?.get("addressLocality")?))
            }
            Field::Address => entities.find_map(|e| postal_address(e.get("address")?)),
            Field::Video => entities.find_map(|e| {
                let video = e.get("video")?;
                ["embedUrl", "contentUrl"]
                    .iter()
                    .find_map(|k| json_text(video.get(*k)?))
            }),
        }
    }

    fn collect(&self, field: ListField, ev: &Evidence<'_>) -> Vec<String> {
        let entities = Self::listing_entities(ev.doc);
        match field {
            ListField::Images => entities
                .filter_map(|e| e.get("image"))
                .flat_map(image_urls)
                .filter_map(|u| ev.doc.absolute_url(&u))
                .collect(),
            ListField::PropertyFeatures => entities
                .filter_map(|e| e.get("amenityFeature"))
                .flat_map(as_list)
                .filter_map(|a| json_text(a.get("name").unwrap_or(a)))
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn is_site_entity(entity: &Value) -> bool {
    match entity.get("@type") {
        Some(Value::String(t)) => SITE_ENTITY_TYPES.contains(&t.as_str()),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|t| SITE_ENTITY_TYPES.contains(&t)),
        _ => false,
    }
}

fn json_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

fn entity_price(entity: &Value) -> Option<String> {
    if let Some(price) = entity.get("price").and_then(json_text) {
        return Some(price);
    }
    as_list(entity.get("offers")?).into_iter().find_map(|offer| {
        offer
            .get("price")
            .and_then(json_text)
            .or_else(|| json_text(offer.get("priceSpecification")?.get("price")?))
    })
}

fn floor_size(value: &Value) -> Option<String> {
    if let Some(text) = json_text(value) {
        return Some(text);
    }
    let amount = json_text(value.get("value")?)?;
    let unit = ["unitText", "unitCode"]
        .iter()
        .find_map(|k| json_text(value.get(*k)?));
    Some(match unit {
        Some(unit) => format!("{} {}", amount, unit),
        None => amount,
    })
}

fn postal_address(value: &Value) -> Option<String> {
    if let Some(text) = json_text(value) {
        return Some(text);
    }
    let parts: Vec<String> = ["streetAddress", "addressLocality", "addressRegion"]
        .iter()
        .filter_map(|k| json_text(value.get(*k)?))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

fn image_urls(value: &Value) -> Vec<String> {
    as_list(value)
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(_) => ["url", "contentUrl"]
                .iter()
                .find_map(|k| json_text(item.get(*k)?)),
            other => json_text(other),
        })
        .collect()
}

// ── Meta tags ──

pub struct MetaTags;

impl MetaTags {
    fn first(ev: &Evidence<'_>, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| ev.doc.meta.get(*k).cloned())
    }
}

impl ExtractionStrategy for MetaTags {
    fn name(&self) -> &'static str {
        "meta-tags"
    }

    fn try_extract(&self, field: Field, ev: &Evidence<'_>) -> Option<String> {
        match field {
            Field::Name => Self::first(ev, &["og:title", "twitter:title"]),
            Field::Price => Self::first(ev, &["product:price:amount", "og:price:amount", "price"]),
            Field::Description => {
                Self::first(ev, &["og:description", "twitter:description", "description"])
            }
            Field::Locality => Self::first(ev, &["geo.placename"]),
            Field::Video => Self::first(ev, &["og:video:url", "og:video"]),
            Field::Bhk | Field::Area | Field::Address => None,
        }
    }

    fn collect(&self, field: ListField, ev: &Evidence<'_>) -> Vec<String> {
        match field {
            ListField::Images => ["og:image", "og:image:secure_url", "twitter:image"]
                .iter()
                .filter_map(|k| ev.doc.meta.get(*k))
                .filter_map(|u| ev.doc.absolute_url(u))
                .collect(),
            _ => Vec::new(),
        }
    }
}

// ── DOM selectors ──

/// Field → selectors, in the order they are tried.
static FIELD_SELECTORS: LazyLock<Vec<(Field, Vec<Selector>)>> = LazyLock::new(|| {
    let table: &[(Field, &[&str])] = &[
        (
            Field::Name,
            &[
                "h1.property-title",
                "h1.PDCP__title",
                "h1.component__pdPropName",
                "h1.mb-srp__card--title",
                "h1.ProjectInfo__projectName",
                "span.ProjectInfo__projectName",
                "h1.mb-pd__title",
            ],
        ),
        (Field::Price, &["#pdPrice2", "span.mb-pd__price", "#pdPrice"]),
        (Field::Bhk, &["span#pdConfig"]),
        (Field::Area, &["#superbuiltupArea_span", "#carpetArea_span"]),
        (Field::Locality, &["span.mb-pd__loc__name"]),
        (Field::Address, &["span.mb-pd__dtls__address"]),
        (
            Field::Description,
            &["div.mb-ldp__more-dtl__description--content"],
        ),
    ];
    table
        .iter()
        .map(|(field, sels)| {
            let parsed = sels.iter().map(|s| Selector::parse(s).unwrap()).collect();
            (*field, parsed)
        })
        .collect()
});

static VIDEO_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"iframe[src*="youtube.com"], iframe[src*="youtu.be"]"#).unwrap()
});

pub struct DomSelectors;

impl ExtractionStrategy for DomSelectors {
    fn name(&self) -> &'static str {
        "dom-selectors"
    }

    fn try_extract(&self, field: Field, ev: &Evidence<'_>) -> Option<String> {
        if field == Field::Video {
            return ev
                .doc
                .html
                .select(&VIDEO_SEL)
                .find_map(|f| f.value().attr("src"))
                .and_then(|src| ev.doc.absolute_url(src));
        }
        let (_, selectors) = FIELD_SELECTORS.iter().find(|(f, _)| *f == field)?;
        selectors.iter().find_map(|sel| {
            ev.doc
                .html
                .select(sel)
                .map(element_text)
                .find(|t| !t.is_empty())
        })
    }

    fn collect(&self, field: ListField, ev: &Evidence<'_>) -> Vec<String> {
        match field {
            ListField::Images => collect::image_sources(ev.doc),
            ListField::PropertyFeatures => collect::features(ev.doc).property,
            ListField::SocietyFeatures => collect::features(ev.doc).society,
            ListField::NearbyPlaces => collect::nearby_places(ev.doc),
        }
    }
}

// ── Free-text patterns ──

pub struct TextPatterns;

impl ExtractionStrategy for TextPatterns {
    fn name(&self) -> &'static str {
        "text-patterns"
    }

    fn try_extract(&self, field: Field, ev: &Evidence<'_>) -> Option<String> {
        match field {
            Field::Name => ev.doc.title_text(),
            Field::Price => PRICE_RE
                .captures(&ev.doc.text)
                .map(|caps| caps[1].trim().to_string()),
            Field::Bhk => BHK_RE
                .captures(&ev.doc.text)
                .or_else(|| URL_BHK_RE.captures(&ev.doc.url))
                .map(|caps| caps[1].to_string()),
            Field::Area => ev.facts.area.clone(),
            Field::Locality | Field::Address | Field::Description | Field::Video => None,
        }
    }
}

// ── Tests ──
