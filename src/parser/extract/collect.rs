use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{ElementRef, Selector};

use crate::models::{Features, Review};
use crate::parser::document::{element_text, Document};
use crate::raw::ListingDetails;

const MAX_FEATURE_LEN: usize = 40;
const SOCIETY_WORDS: &[&str] = &["society", "club", "security", "garden", "pool", "gym"];

fn sel(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

static IMG_SEL: LazyLock<Selector> = LazyLock::new(|| sel("img"));
static BLOCK_SEL: LazyLock<Selector> = LazyLock::new(|| sel("div, ul"));
static ITEM_SEL: LazyLock<Selector> = LazyLock::new(|| sel("li, span, div"));
static AMENITY_SEL: LazyLock<Selector> = LazyLock::new(|| sel("ul.mb-pd__amenitiesList li"));
static SOCIETY_AMENITY_SEL: LazyLock<Selector> =
    LazyLock::new(|| sel("ul.mb-pd__societyAmenityList li"));
static NEARBY_SEL: LazyLock<Selector> =
    LazyLock::new(|| sel("span.NearByLocation__infoText, ul.mb-pd__nearbyList li"));
static SOCIETY_LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| sel("a.mb-ldp__about-proj__projname"));
static FRAGMENT_SEL: LazyLock<Selector> =
    LazyLock::new(|| sel("ul > li, div[class*='fact'], div[class*='summary']"));
static LABEL_SEL: LazyLock<Selector> = LazyLock::new(|| sel("div, span"));

/// (card, rating) selector pairs for the review layouts we know about.
static REVIEW_SELS: LazyLock<Vec<(Selector, Selector)>> = LazyLock::new(|| {
    vec![
        (sel("div.cb___Wrap"), sel("div.cb__desktopStarFont")),
        (sel("div.mb-review__ReviewCard"), sel("span.mb-review__Rating")),
    ]
});

fn class_contains(el: &ElementRef<'_>, needle: &str) -> bool {
    el.value()
        .attr("class")
        .is_some_and(|c| c.to_lowercase().contains(needle))
}

fn first_text(doc: &Document, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    doc.html
        .select(&selector)
        .map(element_text)
        .find(|t| !t.is_empty())
}

/// `src`/`data-src` of every `<img>`, resolved to absolute http(s) URLs.
pub fn image_sources(doc: &Document) -> Vec<String> {
    doc.html
        .select(&IMG_SEL)
        .filter_map(|img| {
            let attrs = img.value();
            attrs.attr("src").or_else(|| attrs.attr("data-src"))
        })
        .filter_map(|src| doc.absolute_url(src))
        .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
        .collect()
}

/// Amenity blocks, split into property and society features. Items
/// already seen in either category are skipped.
pub fn features(doc: &Document) -> Features {
    let mut out = Features::default();
    let mut seen = HashSet::new();

    for item in doc.html.select(&AMENITY_SEL) {
        let text = element_text(item);
        if !text.is_empty() && seen.insert(text.clone()) {
            out.property.push(text);
        }
    }
    for item in doc.html.select(&SOCIETY_AMENITY_SEL) {
        let text = element_text(item);
        if !text.is_empty() && seen.insert(text.clone()) {
            out.society.push(text);
        }
    }

    for block in doc.html.select(&BLOCK_SEL) {
        let is_feature_block = ["feature", "amenity", "highlight"]
            .iter()
            .any(|k| class_contains(&block, k));
        if !is_feature_block {
            continue;
        }
        for item in block.select(&ITEM_SEL) {
            let text = element_text(item);
            if text.is_empty() || text.chars().count() >= MAX_FEATURE_LEN || !seen.insert(text.clone()) {
                continue;
            }
            let lower = text.to_lowercase();
            if SOCIETY_WORDS.iter().any(|w| lower.contains(w)) {
                out.society.push(text);
            } else {
                out.property.push(text);
            }
        }
    }
    out
}

pub fn nearby_places(doc: &Document) -> Vec<String> {
    doc.html
        .select(&NEARBY_SEL)
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect()
}

pub fn reviews(doc: &Document) -> Vec<Review> {
    let mut out = Vec::new();
    for (card_sel, rating_sel) in REVIEW_SELS.iter() {
        for card in doc.html.select(card_sel) {
            let text = element_text(card);
            if text.is_empty() {
                continue;
            }
            let rating = card
                .select(rating_sel)
                .map(element_text)
                .map(|r| r.trim_matches('★').trim().to_string())
                .find(|r| !r.is_empty());
            out.push(Review { text, rating });
        }
    }
    out
}

/// Project name from the "about project" link, when the page has one.
pub fn society_link(doc: &Document) -> Option<String> {
    doc.html
        .select(&SOCIETY_LINK_SEL)
        .map(element_text)
        .find(|t| !t.is_empty())
}

/// Short text blocks that may carry `Key: Value` facts.
pub fn fact_fragments(doc: &Document) -> Vec<String> {
    doc.html.select(&FRAGMENT_SEL).map(element_text).collect()
}

/// Label and title elements paired with the text of their next sibling
/// element.
pub fn label_pairs(doc: &Document) -> Vec<(String, String)> {
    doc.html
        .select(&LABEL_SEL)
        .filter(|el| class_contains(el, "label") || class_contains(el, "title"))
        .filter_map(|label| {
            let value = label.next_siblings().find_map(ElementRef::wrap)?;
            let (key, value) = (element_text(label), element_text(value));
            if key.is_empty() || value.is_empty() {
                None
            } else {
                Some((key, value))
            }
        })
        .collect()
}

/// The detail block rendered on long-id listing pages.
pub fn listing_details(doc: &Document) -> ListingDetails {
    ListingDetails {
        configuration: first_text(doc, "span#pdConfig"),
        bedrooms: None,
        rent: first_text(doc, "#pdPrice2").or_else(|| first_text(doc, "span.mb-pd__price")),
        price: None,
        area: None,
        super_builtup_area: first_text(doc, "#superbuiltupArea_span"),
        carpet_area: first_text(doc, "#carpetArea_span"),
        furnishing: first_text(doc, "#furnishingLabel"),
        available_for: first_text(doc, "#availableForLabel"),
        available_from: first_text(doc, "div.component__availableFrom"),
        posted_by: first_text(doc, "#postedOnAndByLabel"),
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str) -> Document {
        Document::parse(
            &format!("<html><body>{}</body></html>", body),
            "https://www.example.com/listing",
        )
    }

    #[test]
    fn splits_features_by_category() {
        let d = doc(r#"
            <ul class="amenityList"><li>Club House</li><li>Modular Kitchen</li><li>24x7 Security</li>
            <li>A very long description of the balcony view that goes on</li></ul>
            <ul class="mb-pd__societyAmenityList"><li>Power Backup</li></ul>"#);
        let f = features(&d);
        assert_eq!(f.property, vec!["Modular Kitchen".to_string()]);
        assert_eq!(
            f.society,
            vec!["Power Backup".to_string(), "Club House".to_string(), "24x7 Security".to_string()]
        );
    }

    #[test]
    fn pairs_labels_with_next_sibling() {
        let d = doc(r#"<div class="row"><span class="kv__label">Floor</span> <span>4 of 12</span></div>
            <div class="summary-label">Lonely</div>"#);
        assert_eq!(
            label_pairs(&d),
            vec![("Floor".to_string(), "4 of 12".to_string())]
        );
    }

    #[test]
    fn title_classes_also_start_pairs() {
        let d = doc(r#"<div class="mb-ldp__dtls__title">Water Availability</div><div>24 Hours Available</div>"#);
        assert_eq!(
            label_pairs(&d),
            vec![("Water Availability".to_string(), "24 Hours Available".to_string())]
        );
    }

    #[test]
    fn reads_reviews_and_strips_stars() {
        let d = doc(r#"<div class="mb-review__ReviewCard">Nice society <span class="mb-review__Rating">4.5 ★</span></div>"#);
        let r = reviews(&d);
        assert_eq!(r.len(), 1);
        assert_eq!(r[0].rating.as_deref(), Some("4.5"));
        assert!(r[0].text.starts_with("Nice society"));
    }

    #[test]
    fn detail_block_fields() {
        let d = doc(r#"<span id="pdConfig">3 BHK</span><div id="pdPrice2">₹ 25,000</div>
            <span id="superbuiltupArea_span">1450 sqft</span>"#);
        let details = listing_details(&d);
        assert_eq!(details.configuration.as_deref(), Some("3 BHK"));
        assert_eq!(details.rent.as_deref(), Some("₹ 25,000"));
        assert_eq!(details.super_builtup_area.as_deref(), Some("1450 sqft"));
        assert_eq!(details.carpet_area, None);
    }

    #[test]
    fn images_skip_inline_data() {
        let d = doc(r#"<img src="data:image/gif;base64,R0lG"><img data-src="/p/1.jpg"><img src="https://cdn.example.com/2.jpg">"#);
        assert_eq!(
            image_sources(&d),
            vec![
                "https://www.example.com/p/1.jpg".to_string(),
                "https://cdn.example.com/2.jpg".to_string()
            ]
        );
    }
}
