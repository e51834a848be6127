pub mod collect;
pub mod strategies;

use chrono::{SecondsFormat, Utc};
use tracing::debug;

use crate::identity;
use crate::models::Source;
use crate::parser::document::Document;
use crate::parser::facts::{FactMiner, MinedFacts};
use crate::raw::{leading_number, DetailedListing, ListingCore, ListingDetails, ListingRecord, RawRecord};

use strategies::{Evidence, ExtractionStrategy, Field, ListField, StrategyChain, StructuredData};

/// Everything pulled from one page, before images are curated.
#[derive(Debug, Clone)]
pub struct ExtractedListing {
    pub source: Source,
    pub bhk: Option<u32>,
    pub details: ListingDetails,
    pub core: ListingCore,
}

impl ExtractedListing {
    /// Long-id pages keep their detail block and a textual BHK; every
    /// other page becomes a plain listing.
    pub fn into_raw(self) -> RawRecord {
        match self.source {
            Source::MagicBricks => RawRecord::Detailed(DetailedListing {
                core: self.core,
                bhk: self.bhk.map(|n| format!("{} BHK", n)),
                basic_details: self.details,
                link: None,
            }),
            _ => RawRecord::Listing(ListingRecord {
                core: self.core,
                bhk: self.bhk,
            }),
        }
    }
}

/// Runs the strategy chain and the fact miner over a parsed page.
#[derive(Default)]
pub struct FieldExtractor {
    chain: StrategyChain,
    miner: FactMiner,
}

impl FieldExtractor {
    pub fn new(chain: StrategyChain, miner: FactMiner) -> Self {
        FieldExtractor { chain, miner }
    }

    pub fn extract(&self, doc: &Document, property_id: &str) -> ExtractedListing {
        let mined = self.mine_facts(doc);
        let ev = Evidence { doc, facts: &mined };

        let origin = identity::source_from_url(&doc.url);
        let source = origin.unwrap_or(Source::Unknown);
        let bhk = self.chain.resolve(Field::Bhk, &ev).as_deref().and_then(leading_number);
        let details = if source == Source::MagicBricks {
            collect::listing_details(doc)
        } else {
            ListingDetails::default()
        };

        let core = ListingCore {
            property_id: property_id.to_string(),
            property_name: self.chain.resolve(Field::Name, &ev),
            url: Some(doc.url.clone()),
            price: self.chain.resolve(Field::Price, &ev),
            area: self.chain.resolve(Field::Area, &ev),
            locality: self.chain.resolve(Field::Locality, &ev),
            address: self.chain.resolve(Field::Address, &ev),
            description: self.chain.resolve(Field::Description, &ev),
            image_urls: self.chain.gather(ListField::Images, &ev),
            images: Vec::new(),
            local_images: Vec::new(),
            youtube_video: self.chain.resolve(Field::Video, &ev),
            features: crate::models::Features {
                property: self.chain.gather(ListField::PropertyFeatures, &ev),
                society: self.chain.gather(ListField::SocietyFeatures, &ev),
            },
            nearby_places: self.chain.gather(ListField::NearbyPlaces, &ev),
            reviews: collect::reviews(doc),
            scraped_at: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
            meta_data: doc.meta.clone(),
            structured_data: doc.structured_blocks.clone(),
            dynamic_facts: mined.facts.clone(),
            source: origin,
        };

        debug!(
            "{}: {} facts, {} image candidates",
            property_id,
            core.dynamic_facts.len(),
            core.image_urls.len()
        );

        ExtractedListing {
            source,
            bhk,
            details,
            core,
        }
    }

    /// Structural evidence first, free-text rules last; an earlier layer
    /// always keeps its value for a label.
    fn mine_facts(&self, doc: &Document) -> MinedFacts {
        let mut mined = MinedFacts::default();

        let structured_address = StructuredData.try_extract(
            Field::Address,
            &Evidence {
                doc,
                facts: &MinedFacts::default(),
            },
        );
        if let Some(address) = structured_address {
            mined.facts.offer("Address", &address);
        }
        if let Some(society) = collect::society_link(doc) {
            mined.facts.offer("Society", &society);
        }

        self.miner.mine_pairs(collect::label_pairs(doc), &mut mined);
        self.miner.mine_fragments(collect::fact_fragments(doc), &mut mined);
        self.miner.mine_into(&doc.text, &mut mined);
        mined
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::Detail;

    fn load(fixture: &str, url: &str) -> Document {
        let html = std::fs::read_to_string(format!("tests/fixtures/{}.html", fixture)).unwrap();
        Document::parse(&html, url)
    }

    const ACRES_URL: &str =
        "https://www.99acres.com/3-bhk-flat-for-rent-in-palm-residency-sector-150-noida-spid-R71234567";
    const BRICKS_URL: &str =
        "https://www.magicbricks.com/propertyDetails/2-BHK-1100-Sq-ft-Multistorey-Apartment-FOR-Rent-Gaur-City-in-Greater-Noida&id=4d423735373836303437";

    #[test]
    fn acres_page_fields() {
        let doc = load("acres_listing", ACRES_URL);
        let listing = FieldExtractor::default().extract(&doc, "R71234567");
        let core = &listing.core;

        assert_eq!(listing.source, Source::Acres);
        assert_eq!(listing.bhk, Some(3));
        assert_eq!(core.property_name.as_deref(), Some("3 BHK Flat for Rent in Palm Residency"));
        assert_eq!(core.price.as_deref(), Some("32000"));
        assert_eq!(core.area.as_deref(), Some("1650 sq.ft."));
        assert_eq!(core.dynamic_facts.get("Society"), Some("Palm Residency"));
        assert_eq!(core.dynamic_facts.get("Floor"), Some("7 out of 14"));
        assert_eq!(core.dynamic_facts.get("Furnishing"), Some("Semi-Furnished"));
        assert!(core.image_urls.iter().any(|u| u.ends_with("/living-room.jpg")));
        assert!(core.features.society.contains(&"Swimming Pool".to_string()));
        assert_eq!(core.source, Some(Source::Acres));
        assert!(matches!(listing.into_raw(), RawRecord::Listing(_)));
    }

    #[test]
    fn bricks_page_is_detailed() {
        let doc = load("magicbricks_listing", BRICKS_URL);
        let raw = FieldExtractor::default()
            .extract(&doc, "4d423735373836303437")
            .into_raw();

        let RawRecord::Detailed(detailed) = &raw else {
            panic!("expected detailed record");
        };
        assert_eq!(detailed.bhk.as_deref(), Some("2 BHK"));
        assert_eq!(detailed.core.locality.as_deref(), Some("Gaur City 2"));
        assert_eq!(detailed.core.dynamic_facts.get("Society"), Some("Gaur City 2"));
        assert_eq!(detailed.core.nearby_places.len(), 2);
        assert_eq!(detailed.core.reviews.len(), 1);

        let view = raw.view();
        assert_eq!(view.detail(Detail::Rent).as_deref(), Some("₹18,000"));
        assert_eq!(view.detail(Detail::CarpetArea).as_deref(), Some("950 sqft"));
        assert!(view
            .features()
            .property
            .contains(&"Modular Kitchen".to_string()));
    }

    #[test]
    fn structural_society_beats_text_rule() {
        let doc = Document::parse(
            r#"<html><body>
            <a class="mb-ldp__about-proj__projname">Supertech Capetown</a>
            <p>2 BHK flat in Gaur City Apartments, close to the metro</p>
            </body></html>"#,
            "https://www.magicbricks.com/propertyDetails/x&id=4d4237353738363034",
        );
        let listing = FieldExtractor::default().extract(&doc, "4d4237353738363034");
        assert_eq!(listing.core.dynamic_facts.get("Society"), Some("Supertech Capetown"));
    }

    #[test]
    fn title_pairs_become_facts() {
        let doc = Document::parse(
            r#"<html><body>
            <div class="mb-ldp__dtls__title">Water Availability</div><div>24 Hours Available</div>
            </body></html>"#,
            BRICKS_URL,
        );
        let listing = FieldExtractor::default().extract(&doc, "4d423735373836303437");
        assert_eq!(
            listing.core.dynamic_facts.get("Water Availability"),
            Some("24 Hours Available")
        );
    }

    #[test]
    fn unknown_host_with_bare_page() {
        let doc = Document::parse(
            "<html><head><title>Flat</title></head><body></body></html>",
            "https://listings.example.org/flat",
        );
        let listing = FieldExtractor::default().extract(&doc, "unknown_1700000000");
        assert_eq!(listing.source, Source::Unknown);
        assert_eq!(listing.core.property_name.as_deref(), Some("Flat"));
        assert_eq!(listing.core.price, None);
        assert_eq!(listing.bhk, None);
        assert!(listing.core.image_urls.is_empty());
        assert_eq!(listing.core.source, None);
        assert!(matches!(listing.into_raw(), RawRecord::Listing(_)));
    }

    #[test]
    fn unknown_host_ignores_long_id_shape() {
        let doc = Document::parse(
            r#"<html><body><span id="pdConfig">3 BHK</span><div id="pdPrice2">25,000</div></body></html>"#,
            "https://listings.example.org/flat",
        );
        let listing = FieldExtractor::default().extract(&doc, "74093847294839201");
        assert_eq!(listing.source, Source::Unknown);
        assert_eq!(listing.details, ListingDetails::default());
        assert!(matches!(listing.into_raw(), RawRecord::Listing(_)));
    }
}
