use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::RegionDefaults;
use crate::identity;
use crate::models::{Features, ListingType, Location, Source};
use crate::parser::facts::collapse_whitespace;
use crate::raw::{leading_number, Detail, ListingView};

static TITLE_BHK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*BHK").unwrap());
static URL_BHK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)(\d+)-BHK").unwrap());
static RENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)rent|lease").unwrap());
static SALE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)sale|buy").unwrap());
static TITLE_AREA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*(?:sq-ft|sqft|sq ft)").unwrap());
static TITLE_PLACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bin\s+([^,]+),\s*([^,]+)$").unwrap());

const PLACEHOLDER_TITLES: &[&str] = &["", "Unknown Property"];
const UNKNOWN_LOCALITY: &str = "Unknown";
const KEYWORD_FEATURES_PER_CATEGORY: usize = 5;

/// An explicit origin tag wins; otherwise the identifier's shape decides.
pub fn source(view: &dyn ListingView, id: &str) -> Source {
    match view.origin() {
        Some(tag) if tag != Source::Unknown => tag,
        _ => identity::source_from_id(id),
    }
}

pub fn title(view: &dyn ListingView, region: &RegionDefaults) -> String {
    if let Some(title) = view
        .title()
        .filter(|t| !PLACEHOLDER_TITLES.contains(&t.as_str()))
    {
        return title;
    }
    let place = view
        .society_names()
        .into_iter()
        .find(|s| !s.trim().is_empty())
        .unwrap_or_else(|| region.default_city.clone());
    format!("Property for Rent in {}", place)
}

pub fn bhk(view: &dyn ListingView, title: &str, source: Source) -> Option<u32> {
    if let Some(n) = view.bhk() {
        return Some(n);
    }
    if let Some(n) = view.detail(Detail::Bedrooms).as_deref().and_then(leading_number) {
        return Some(n);
    }
    if let Some(n) = first_number(&TITLE_BHK_RE, title) {
        return Some(n);
    }
    if matches!(source, Source::Acres | Source::MagicBricks) {
        if let Some(n) = view.url().and_then(|u| first_number(&URL_BHK_RE, &u)) {
            return Some(n);
        }
    }
    view.features()
        .property
        .iter()
        .filter(|f| f.contains("Bedroom"))
        .find_map(|f| leading_number(f))
}

fn first_number(re: &Regex, text: &str) -> Option<u32> {
    re.captures(text)?[1].parse().ok().filter(|n| *n > 0)
}

pub fn listing_type(title: &str) -> ListingType {
    if RENT_RE.is_match(title) {
        ListingType::Rent
    } else if SALE_RE.is_match(title) {
        ListingType::Sale
    } else {
        ListingType::Rent
    }
}

pub fn area(view: &dyn ListingView, title: &str) -> Option<String> {
    [Detail::Area, Detail::SuperBuiltupArea, Detail::CarpetArea]
        .into_iter()
        .find_map(|d| view.detail(d))
        .or_else(|| {
            TITLE_AREA_RE
                .captures(title)
                .map(|caps| format!("{} Sq-ft", &caps[1]))
        })
}

pub fn price(view: &dyn ListingView) -> Option<String> {
    view.price()
        .or_else(|| view.detail(Detail::Price))
        .or_else(|| view.detail(Detail::Rent))
}

/// Scraped locality first, then the title's trailing `in X, Y` clause,
/// then the first society name, then the first nearby place.
pub fn location(view: &dyn ListingView, title: &str, region: &RegionDefaults) -> Location {
    let mut city = view.city();
    let mut locality = view.locality().filter(|l| l != UNKNOWN_LOCALITY);

    if locality.is_none() {
        if let Some(caps) = TITLE_PLACE_RE.captures(title) {
            locality = Some(caps[1].trim().to_string());
            let candidate = caps[2].trim();
            if city.is_none() && candidate.contains(region.city_token.as_str()) {
                city = Some(candidate.to_string());
            }
        }
    }
    if locality.is_none() {
        locality = view
            .society_names()
            .into_iter()
            .chain(view.nearby_places())
            .map(|s| s.trim().to_string())
            .find(|s| !s.is_empty());
    }

    let city = city.unwrap_or_else(|| region.default_city.clone());
    let address = view.address().unwrap_or_else(|| match &locality {
        Some(locality) => format!("{}, {}", locality, city),
        None => city.clone(),
    });
    Location {
        address,
        city,
        locality,
    }
}

fn keyword(text: &str) -> String {
    collapse_whitespace(text).to_lowercase()
}

pub fn keywords(
    bhk: Option<u32>,
    listing_type: ListingType,
    location: &Location,
    area: Option<&str>,
    features: &Features,
) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    if let Some(n) = bhk {
        out.insert(format!("{} bhk", n));
    }
    out.insert(keyword(listing_type.label()));
    out.insert(keyword(&location.city));
    if let Some(locality) = &location.locality {
        out.insert(keyword(locality));
    }
    if let Some(area) = area {
        out.insert(keyword(area));
    }
    for (_, items) in features.categories() {
        out.extend(items.iter().take(KEYWORD_FEATURES_PER_CATEGORY).map(|f| keyword(f)));
    }
    out.remove("");
    out
}

// ── Tests ──
