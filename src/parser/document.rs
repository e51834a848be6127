use std::collections::BTreeMap;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Node, Selector};
use serde_json::Value;
use tracing::debug;

use super::facts::collapse_whitespace;

static JSON_LD_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());
static META_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("meta").unwrap());
static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());

const SKIPPED_TEXT_PARENTS: &[&str] = &["script", "style", "noscript", "template"];

/// A rendered listing page, parsed once, with the derived views every
/// extraction channel reads from.
pub struct Document {
    pub html: Html,
    pub url: String,
    /// Visible text, whitespace-collapsed.
    pub text: String,
    /// Entities from embedded JSON-LD blocks (`@graph` members flattened).
    pub entities: Vec<Value>,
    /// The JSON-LD blocks as they appeared, for the raw record.
    pub structured_blocks: Vec<Value>,
    /// `name`/`property` → `content`; the first tag for a key wins.
    pub meta: BTreeMap<String, String>,
}

impl Document {
    pub fn parse(html: &str, url: &str) -> Self {
        let html = Html::parse_document(html);
        let text = visible_text(&html);
        let structured_blocks = json_ld_blocks(&html);
        let entities = structured_blocks.iter().flat_map(flatten_entities).collect();
        let meta = meta_tags(&html);
        Document {
            html,
            url: url.to_string(),
            text,
            entities,
            structured_blocks,
            meta,
        }
    }

    pub fn title_text(&self) -> Option<String> {
        self.html
            .select(&TITLE_SEL)
            .map(element_text)
            .find(|t| !t.is_empty())
    }

    /// Resolve a possibly relative reference against the page URL.
    pub fn absolute_url(&self, reference: &str) -> Option<String> {
        let reference = reference.trim();
        if reference.is_empty() || reference.starts_with("data:") {
            return None;
        }
        match url::Url::parse(reference) {
            Ok(u) => Some(u.to_string()),
            Err(_) => url::Url::parse(&self.url)
                .ok()?
                .join(reference)
                .ok()
                .map(|u| u.to_string()),
        }
    }
}

/// Text of one element, whitespace-collapsed.
pub fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

fn visible_text(html: &Html) -> String {
    let parts: Vec<&str> = html
        .root_element()
        .descendants()
        .filter_map(|node| {
            let Node::Text(text) = node.value() else {
                return None;
            };
            let hidden = node
                .parent()
                .and_then(|p| p.value().as_element().map(|e| e.name()))
                .is_some_and(|name| SKIPPED_TEXT_PARENTS.contains(&name));
            if hidden {
                None
            } else {
                Some(&**text)
            }
        })
        .collect();
    collapse_whitespace(&parts.join(" "))
}

fn json_ld_blocks(html: &Html) -> Vec<Value> {
    html.select(&JSON_LD_SEL)
        .filter_map(|script| {
            let body: String = script.text().collect();
            match serde_json::from_str::<Value>(body.trim()) {
                Ok(value) => Some(value),
                Err(e) => {
                    debug!("Skipping malformed JSON-LD block: {}", e);
                    None
                }
            }
        })
        .collect()
}

fn flatten_entities(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.iter().flat_map(flatten_entities).collect(),
        Value::Object(map) => {
            let mut out = vec![value.clone()];
            if let Some(graph) = map.get("@graph") {
                out.extend(flatten_entities(graph));
            }
            out
        }
        _ => Vec::new(),
    }
}

fn meta_tags(html: &Html) -> BTreeMap<String, String> {
    let mut meta = BTreeMap::new();
    for tag in html.select(&META_SEL) {
        let attrs = tag.value();
        let Some(name) = attrs.attr("name").or_else(|| attrs.attr("property")) else {
            continue;
        };
        let Some(content) = attrs.attr("content").map(str::trim).filter(|c| !c.is_empty()) else {
            continue;
        };
        meta.entry(name.trim().to_string())
            .or_insert_with(|| content.to_string());
    }
    meta
}
