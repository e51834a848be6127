use std::sync::LazyLock;

use regex::Regex;

use crate::models::FactMap;

const MAX_FRAGMENT_KEY: usize = 30;
const MAX_FRAGMENT_VALUE: usize = 50;
const MAX_PAIR_KEY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactKind {
    /// Also fills the top-level area when it is still empty.
    Area,
    Fact,
    /// Also fills the `Society` fact when it is still empty.
    Society,
}

#[derive(Debug, Clone)]
pub struct FactRule {
    pub label: &'static str,
    pub pattern: Regex,
    pub kind: FactKind,
}

impl FactRule {
    pub fn new(label: &'static str, pattern: &str, kind: FactKind) -> Result<Self, regex::Error> {
        Ok(FactRule {
            label,
            pattern: Regex::new(pattern)?,
            kind,
        })
    }
}

static DEFAULT_RULES: LazyLock<Vec<FactRule>> = LazyLock::new(|| {
    let rule = |label, pattern, kind| FactRule::new(label, pattern, kind).unwrap();
    vec![
        rule(
            "Super Area",
            r"(?i)super (?:built-?up )?area[:\s]*([\d,.]+\s*sq\.?\s*-?\s*ft\.?)",
            FactKind::Area,
        ),
        rule(
            "Carpet Area",
            r"(?i)carpet area[:\s]*([\d,.]+\s*sq\.?\s*-?\s*ft\.?)",
            FactKind::Area,
        ),
        rule(
            "Floor",
            r"(?i)\bfloor[:\s]*(\d+\s*(?:\(?\s*out of\s*\d+\s*\)?)?|(?:lower |upper )?ground)",
            FactKind::Fact,
        ),
        rule(
            "Transaction Type",
            r"(?i)transaction type[:\s]*(new property|resale)",
            FactKind::Fact,
        ),
        rule(
            "Status",
            r"(?i)\bstatus[:\s]*(ready to move|under construction|immediately|available(?: from [A-Za-z]+ \d{4})?)",
            FactKind::Fact,
        ),
        rule(
            "Facing",
            r"(?i)\bfacing[:\s]*((?:north|south)[- ]?(?:east|west)?|east|west)\b",
            FactKind::Fact,
        ),
        rule(
            "Society",
            r"(?i:\b(?:in|at))\s+([A-Z0-9][A-Za-z0-9 ]{0,40}?(?:Apartments|Heights|Enclave|Residency|Towers?|City|Park|Villas))\b",
            FactKind::Society,
        ),
        rule("Bathrooms", r"(?i)(\d+)\s*bath(?:room)?s?\b", FactKind::Fact),
        rule("Balcony", r"(?i)(\d+)\s*balcon(?:y|ies)\b", FactKind::Fact),
        rule(
            "Furnishing",
            r"(?i)furnishing[:\s]*(furnished|semi-?furnished|unfurnished)",
            FactKind::Fact,
        ),
    ]
});

/// Facts mined from one page, plus the area picked up along the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MinedFacts {
    pub facts: FactMap,
    pub area: Option<String>,
}

/// Pattern-based fact extraction over flattened page text. Passes can be
/// layered over the same `MinedFacts`; an earlier pass always keeps its
/// values.
#[derive(Debug, Clone)]
pub struct FactMiner {
    rules: Vec<FactRule>,
}

impl Default for FactMiner {
    fn default() -> Self {
        FactMiner {
            rules: DEFAULT_RULES.clone(),
        }
    }
}

impl FactMiner {
    pub fn new(rules: Vec<FactRule>) -> Self {
        FactMiner { rules }
    }

    pub fn mine(&self, text: &str) -> MinedFacts {
        let mut mined = MinedFacts::default();
        self.mine_into(text, &mut mined);
        mined
    }

    /// Run every rule, in order, against `text`.
    pub fn mine_into(&self, text: &str, mined: &mut MinedFacts) {
        let text = collapse_whitespace(text);
        for rule in &self.rules {
            let Some(value) = rule
                .pattern
                .captures(&text)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().trim())
                .filter(|v| !v.is_empty())
            else {
                continue;
            };

            mined.facts.offer(rule.label, value);
            match rule.kind {
                FactKind::Area if mined.area.is_none() => mined.area = Some(value.to_string()),
                FactKind::Society => {
                    mined.facts.offer("Society", value);
                }
                _ => {}
            }
        }
    }

    /// `Key: Value` text fragments (exactly one colon, short key and value).
    pub fn mine_fragments<I, S>(&self, fragments: I, mined: &mut MinedFacts)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for fragment in fragments {
            let fragment = collapse_whitespace(fragment.as_ref());
            let mut parts = fragment.split(':');
            let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            if key.chars().count() < MAX_FRAGMENT_KEY && value.chars().count() < MAX_FRAGMENT_VALUE {
                mined.facts.offer(key, value);
            }
        }
    }

    /// Label/value pairs taken from adjacent elements.
    pub fn mine_pairs<I>(&self, pairs: I, mined: &mut MinedFacts)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in pairs {
            let key = collapse_whitespace(&key);
            if key.chars().count() > MAX_PAIR_KEY {
                continue;
            }
            mined.facts.offer(&key, &collapse_whitespace(&value));
        }
    }
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mines_labeled_facts_from_text() {
        let text = "Super Built-up Area: 1,450 sq.ft. Carpet Area 1100 sqft \
                    Floor: 7 out of 14 Furnishing: Semi-Furnished Facing: North-East \
                    3 Bathrooms 2 Balconies";
        let mined = FactMiner::default().mine(text);
        assert_eq!(mined.facts.get("Super Area"), Some("1,450 sq.ft."));
        assert_eq!(mined.facts.get("Carpet Area"), Some("1100 sqft"));
        assert_eq!(mined.facts.get("Floor"), Some("7 out of 14"));
        assert_eq!(mined.facts.get("Furnishing"), Some("Semi-Furnished"));
        assert_eq!(mined.facts.get("Facing"), Some("North-East"));
        assert_eq!(mined.facts.get("Bathrooms"), Some("3"));
        assert_eq!(mined.facts.get("Balcony"), Some("2"));
        assert_eq!(mined.area.as_deref(), Some("1,450 sq.ft."));
    }

    #[test]
    fn society_rule_fills_society_fact() {
        let mined = FactMiner::default().mine("3 BHK Flat for Rent in Palm Residency, Noida");
        assert_eq!(mined.facts.get("Society"), Some("Palm Residency"));
    }

    #[test]
    fn society_suffix_must_be_capitalised() {
        let mined = FactMiner::default().mine("close to everything in the city centre");
        assert!(!mined.facts.contains("Society"));
    }

    #[test]
    fn later_rule_never_overwrites_label() {
        let miner = FactMiner::new(vec![
            FactRule::new("Floor", r"(?i)floor (\d+)", FactKind::Fact).unwrap(),
            FactRule::new("Floor", r"(?i)level (\d+)", FactKind::Fact).unwrap(),
        ]);
        let mined = miner.mine("floor 3 and level 9");
        assert_eq!(mined.facts.get("Floor"), Some("3"));
    }

    #[test]
    fn later_pass_never_overwrites_label() {
        let miner = FactMiner::default();
        let mut mined = MinedFacts::default();
        miner.mine_fragments(["Floor: Ground", "Status:Ready to Move"], &mut mined);
        miner.mine_into("Floor: 12 out of 20 Status: Under Construction", &mut mined);
        assert_eq!(mined.facts.get("Floor"), Some("Ground"));
        assert_eq!(mined.facts.get("Status"), Some("Ready to Move"));
    }

    #[test]
    fn area_kind_does_not_replace_existing_area() {
        let miner = FactMiner::default();
        let mut mined = MinedFacts {
            area: Some("900 sqft".into()),
            ..Default::default()
        };
        miner.mine_into("Carpet Area: 1200 sqft", &mut mined);
        assert_eq!(mined.area.as_deref(), Some("900 sqft"));
        assert_eq!(mined.facts.get("Carpet Area"), Some("1200 sqft"));
    }

    #[test]
    fn pairs_skip_overlong_keys() {
        let miner = FactMiner::default();
        let mut mined = MinedFacts::default();
        miner.mine_pairs(
            [
                ("Water Availability".to_string(), "24 Hours Available".to_string()),
                ("x".repeat(51), "ignored".to_string()),
            ],
            &mut mined,
        );
        assert_eq!(mined.facts.get("Water Availability"), Some("24 Hours Available"));
        assert_eq!(mined.facts.len(), 1);
    }

    #[test]
    fn fragments_respect_shape_limits() {
        let miner = FactMiner::default();
        let mut mined = MinedFacts::default();
        miner.mine_fragments(
            [
                "Age of Construction: 5 to 10 years",
                "Time: 10:30",
                "A very long label that keeps going on: value",
                "No colon here",
            ],
            &mut mined,
        );
        assert_eq!(mined.facts.get("Age of Construction"), Some("5 to 10 years"));
        assert_eq!(mined.facts.len(), 1);
    }
}
