//! Vocabulary normalization from chain-native labels to canonical tokens
//!
//! Every chain names sizes and crusts differently (`12"`, `Medium (12")`,
//! `x_large`, `Thin 'n' Crispy`, `Crunchy Thin Crust`). The normalizer maps
//! those labels onto two fixed enumerations and derives a product key that is
//! a pure function of (chain, recipe, size, crust).
//!
//! Labels outside the mapping tables fail with `UnmappedToken` instead of
//! passing through, so vocabulary drift shows up in the logs the day it
//! happens. Canonical tokens always map to themselves.

use super::adapter::RawObservation;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CanonicalSize {
    Personal,
    Small,
    Medium,
    Large,
    XLarge,
    Party,
}

impl CanonicalSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalSize::Personal => "Personal",
            CanonicalSize::Small => "Small",
            CanonicalSize::Medium => "Medium",
            CanonicalSize::Large => "Large",
            CanonicalSize::XLarge => "X-Large",
            CanonicalSize::Party => "Party",
        }
    }

    /// Short code used inside product keys
    pub fn code(&self) -> &'static str {
        match self {
            CanonicalSize::Personal => "PS",
            CanonicalSize::Small => "SM",
            CanonicalSize::Medium => "MD",
            CanonicalSize::Large => "LG",
            CanonicalSize::XLarge => "XL",
            CanonicalSize::Party => "PARTY",
        }
    }

    pub fn all() -> [CanonicalSize; 6] {
        [
            CanonicalSize::Personal,
            CanonicalSize::Small,
            CanonicalSize::Medium,
            CanonicalSize::Large,
            CanonicalSize::XLarge,
            CanonicalSize::Party,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CanonicalCrust {
    RegularDough,
    HandTossed,
    Handcrafted,
    Thin,
    Pan,
    StuffedCrust,
    GlutenFree,
    Brooklyn,
    NewYorkStyle,
    Cauliflower,
}

impl CanonicalCrust {
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalCrust::RegularDough => "Regular Dough",
            CanonicalCrust::HandTossed => "Hand Tossed",
            CanonicalCrust::Handcrafted => "Handcrafted",
            CanonicalCrust::Thin => "Thin",
            CanonicalCrust::Pan => "Pan",
            CanonicalCrust::StuffedCrust => "Stuffed Crust",
            CanonicalCrust::GlutenFree => "Gluten Free",
            CanonicalCrust::Brooklyn => "Brooklyn",
            CanonicalCrust::NewYorkStyle => "New York Style",
            CanonicalCrust::Cauliflower => "Cauliflower",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CanonicalCrust::RegularDough => "REG",
            CanonicalCrust::HandTossed => "HT",
            CanonicalCrust::Handcrafted => "HC",
            CanonicalCrust::Thin => "THIN",
            CanonicalCrust::Pan => "PAN",
            CanonicalCrust::StuffedCrust => "STUFFED",
            CanonicalCrust::GlutenFree => "GF",
            CanonicalCrust::Brooklyn => "BROOKLYN",
            CanonicalCrust::NewYorkStyle => "NY",
            CanonicalCrust::Cauliflower => "CAULI",
        }
    }

    pub fn all() -> [CanonicalCrust; 10] {
        [
            CanonicalCrust::RegularDough,
            CanonicalCrust::HandTossed,
            CanonicalCrust::Handcrafted,
            CanonicalCrust::Thin,
            CanonicalCrust::Pan,
            CanonicalCrust::StuffedCrust,
            CanonicalCrust::GlutenFree,
            CanonicalCrust::Brooklyn,
            CanonicalCrust::NewYorkStyle,
            CanonicalCrust::Cauliflower,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Size,
    Crust,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Size => write!(f, "size"),
            TokenKind::Crust => write!(f, "crust"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    #[error("unmapped {kind} label '{label}' for chain {chain}")]
    UnmappedToken {
        chain: String,
        kind: TokenKind,
        label: String,
    },

    #[error("empty recipe name for chain {chain}")]
    EmptyRecipe { chain: String },
}

/// Chain-specific inch → size table.
///
/// Named labels ("Medium") are chain-independent; inch labels are not
/// (a 12" pizza is Medium at one chain and Large at another).
#[derive(Debug, Clone, PartialEq)]
pub struct Vocabulary {
    inches: BTreeMap<u8, CanonicalSize>,
}

impl Vocabulary {
    pub fn new(inches: &[(u8, CanonicalSize)]) -> Self {
        Self {
            inches: inches.iter().copied().collect(),
        }
    }

    pub fn size_for_inches(&self, inches: u8) -> Option<CanonicalSize> {
        self.inches.get(&inches).copied()
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new(&[
            (8, CanonicalSize::Personal),
            (10, CanonicalSize::Small),
            (12, CanonicalSize::Medium),
            (14, CanonicalSize::Large),
            (16, CanonicalSize::XLarge),
            (18, CanonicalSize::Party),
        ])
    }
}

/// An observation whose size/crust are canonical and whose product key is derived.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedObservation {
    pub chain_key: String,
    pub store_key: String,
    pub city: String,
    pub province: String,
    pub category: String,
    pub recipe: String,
    pub product_key: String,
    pub size: CanonicalSize,
    pub crust: CanonicalCrust,
    pub price: f64,
}

pub struct Normalizer {
    chain_key: String,
    vocabulary: Vocabulary,
}

impl Normalizer {
    pub fn new(chain_key: impl Into<String>, vocabulary: Vocabulary) -> Self {
        Self {
            chain_key: chain_key.into(),
            vocabulary,
        }
    }

    pub fn normalize_tokens(
        &self,
        size_label: &str,
        crust_label: &str,
    ) -> Result<(CanonicalSize, CanonicalCrust), NormalizeError> {
        let size = self.normalize_size(size_label)?;
        let crust = self.normalize_crust(crust_label)?;
        Ok((size, crust))
    }

    pub fn normalize_size(&self, label: &str) -> Result<CanonicalSize, NormalizeError> {
        let cleaned = clean_label(label).replace('_', "-");
        if cleaned.is_empty() {
            return Err(self.unmapped(TokenKind::Size, label));
        }

        let named = match cleaned.as_str() {
            "personal" | "p" => Some(CanonicalSize::Personal),
            "small" | "sm" | "s" => Some(CanonicalSize::Small),
            "medium" | "med" | "md" | "m" => Some(CanonicalSize::Medium),
            "large" | "lg" | "l" => Some(CanonicalSize::Large),
            "x-large" | "xlarge" | "xl" | "x large" | "extra large" | "extra-large" => {
                Some(CanonicalSize::XLarge)
            }
            "party" | "party size" | "party pizza" => Some(CanonicalSize::Party),
            _ => None,
        };
        if let Some(size) = named.or_else(|| size_keyword(&cleaned)) {
            return Ok(size);
        }

        if let Some(inches) = inch_value(&cleaned) {
            return self
                .vocabulary
                .size_for_inches(inches)
                .ok_or_else(|| self.unmapped(TokenKind::Size, label));
        }

        Err(self.unmapped(TokenKind::Size, label))
    }

    pub fn normalize_crust(&self, label: &str) -> Result<CanonicalCrust, NormalizeError> {
        let cleaned = clean_label(label)
            .replace(['’', '‘'], "'")
            .replace('-', " ");
        if cleaned.is_empty() {
            return Err(self.unmapped(TokenKind::Crust, label));
        }

        let exact = match cleaned.as_str() {
            "regular dough" | "regular" | "original" | "classic" => Some(CanonicalCrust::RegularDough),
            "hand tossed" | "handtossed" | "handtoss" => Some(CanonicalCrust::HandTossed),
            "handcrafted" => Some(CanonicalCrust::Handcrafted),
            "thin" | "thin crust" | "thin 'n' crispy" | "thin n crispy" => Some(CanonicalCrust::Thin),
            "pan" | "original pan" | "pan pizza" | "handmade pan" => Some(CanonicalCrust::Pan),
            "stuffed crust" | "stuffed" => Some(CanonicalCrust::StuffedCrust),
            "gluten free" => Some(CanonicalCrust::GlutenFree),
            "brooklyn" | "brooklyn style" => Some(CanonicalCrust::Brooklyn),
            "new york style" | "new york" => Some(CanonicalCrust::NewYorkStyle),
            "cauliflower" => Some(CanonicalCrust::Cauliflower),
            _ => None,
        };
        exact
            .or_else(|| crust_keyword(&cleaned))
            .ok_or_else(|| self.unmapped(TokenKind::Crust, label))
    }

    /// Normalize one adapter observation and derive its product key.
    pub fn normalize(&self, observation: &RawObservation) -> Result<NormalizedObservation, NormalizeError> {
        let (size, crust) = self.normalize_tokens(&observation.size_label, &observation.crust_label)?;
        let recipe = canonical_recipe(&observation.recipe);
        if recipe.is_empty() {
            return Err(NormalizeError::EmptyRecipe {
                chain: self.chain_key.clone(),
            });
        }

        Ok(NormalizedObservation {
            chain_key: observation.chain_key.clone(),
            store_key: observation.store_key.clone(),
            city: observation.city.clone(),
            province: observation.province.clone(),
            category: observation.category.clone(),
            product_key: product_key(&observation.chain_key, &recipe, size, crust),
            recipe,
            size,
            crust,
            price: observation.price,
        })
    }

    fn unmapped(&self, kind: TokenKind, label: &str) -> NormalizeError {
        NormalizeError::UnmappedToken {
            chain: self.chain_key.clone(),
            kind,
            label: label.to_string(),
        }
    }
}

/// `{CHAIN}_{recipe_slug}_{SIZE}_{CRUST}`, e.g. `PP_pepperoni_MD_HT`.
pub fn product_key(chain_key: &str, recipe: &str, size: CanonicalSize, crust: CanonicalCrust) -> String {
    format!(
        "{}_{}_{}_{}",
        chain_key,
        recipe_slug(&canonical_recipe(recipe)),
        size.code(),
        crust.code()
    )
}

/// Cleaned recipe name used for grouping: trailing menu codes dropped,
/// "BBQ" casing fixed, build-your-own variants collapsed to `CYO`.
pub fn canonical_recipe(name: &str) -> String {
    static TRAILING_CODE: OnceLock<Regex> = OnceLock::new();
    static BBQ: OnceLock<Regex> = OnceLock::new();
    let trailing = TRAILING_CODE.get_or_init(|| {
        Regex::new(r"(?:\s+[A-Za-z0-9]{0,2}\d[A-Za-z0-9]{0,2})+$").expect("static regex")
    });
    let bbq = BBQ.get_or_init(|| Regex::new(r"(?i)\bbbq\b").expect("static regex"));

    let tidied = name.split_whitespace().collect::<Vec<_>>().join(" ");
    let stripped = trailing.replace(&tidied, "");
    let recipe = bbq.replace_all(&stripped, "BBQ").trim().to_string();

    match recipe.to_lowercase().as_str() {
        "pizza" | "create your own" | "create your own pizza" | "build your own" | "cyo" => "CYO".to_string(),
        _ => recipe,
    }
}

fn recipe_slug(recipe: &str) -> String {
    let mut slug = String::with_capacity(recipe.len());
    let mut pending_sep = false;
    for c in recipe.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            slug.push(c.to_ascii_lowercase());
            pending_sep = false;
        } else {
            pending_sep = true;
        }
    }
    slug
}

fn clean_label(label: &str) -> String {
    label
        .replace(['”', '″', '“'], "\"")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn size_keyword(cleaned: &str) -> Option<CanonicalSize> {
    if ["x-large", "xlarge", "x large", "extra large", "extra-large"]
        .iter()
        .any(|k| cleaned.contains(k))
    {
        return Some(CanonicalSize::XLarge);
    }
    let words: Vec<&str> = cleaned
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let has = |word: &str| words.contains(&word);
    if has("xl") {
        Some(CanonicalSize::XLarge)
    } else if has("party") {
        Some(CanonicalSize::Party)
    } else if has("personal") {
        Some(CanonicalSize::Personal)
    } else if has("small") {
        Some(CanonicalSize::Small)
    } else if has("medium") {
        Some(CanonicalSize::Medium)
    } else if has("large") {
        Some(CanonicalSize::Large)
    } else {
        None
    }
}

fn crust_keyword(cleaned: &str) -> Option<CanonicalCrust> {
    let words: Vec<&str> = cleaned
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let has = |word: &str| words.contains(&word);
    if has("stuffed") {
        Some(CanonicalCrust::StuffedCrust)
    } else if has("thin") || has("thins") {
        Some(CanonicalCrust::Thin)
    } else if has("brooklyn") {
        Some(CanonicalCrust::Brooklyn)
    } else if cleaned.contains("new york") {
        Some(CanonicalCrust::NewYorkStyle)
    } else if has("cauliflower") {
        Some(CanonicalCrust::Cauliflower)
    } else if cleaned.contains("gluten free") {
        Some(CanonicalCrust::GlutenFree)
    } else if cleaned.contains("hand tossed") {
        Some(CanonicalCrust::HandTossed)
    } else if has("handcrafted") {
        Some(CanonicalCrust::Handcrafted)
    } else if has("pan") {
        Some(CanonicalCrust::Pan)
    } else if has("regular") || has("original") || has("classic") {
        Some(CanonicalCrust::RegularDough)
    } else {
        None
    }
}

/// Inches from `12"`, `12 in`, `12-inch`, or a bare `12` / `12.0`.
fn inch_value(cleaned: &str) -> Option<u8> {
    static INCHES: OnceLock<Regex> = OnceLock::new();
    static BARE: OnceLock<Regex> = OnceLock::new();
    let re = INCHES.get_or_init(|| {
        Regex::new(r#"(?:^|[^0-9])(\d{1,2})\s*(?:"|in\b|inch)"#).expect("static regex")
    });
    let bare = BARE.get_or_init(|| Regex::new(r"^(\d{1,2})(?:\.0+)?$").expect("static regex"));
    re.captures(cleaned)
        .or_else(|| bare.captures(cleaned))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pizza_pizza() -> Normalizer {
        Normalizer::new("PP", Vocabulary::default())
    }

    #[test]
    fn test_inch_label_maps_through_chain_table() {
        let n = pizza_pizza();
        assert_eq!(n.normalize_size("12\"").unwrap(), CanonicalSize::Medium);
        assert_eq!(n.normalize_size("12”").unwrap(), CanonicalSize::Medium);
        assert_eq!(n.normalize_size("16 inch").unwrap(), CanonicalSize::XLarge);

        let hut = Normalizer::new("PH", Vocabulary::new(&[(12, CanonicalSize::Medium), (14, CanonicalSize::Large)]));
        assert!(matches!(
            hut.normalize_size("10\""),
            Err(NormalizeError::UnmappedToken { kind: TokenKind::Size, .. })
        ));
    }

    #[test]
    fn test_named_sizes_win_over_inches() {
        let n = pizza_pizza();
        assert_eq!(n.normalize_size("Medium (12\")").unwrap(), CanonicalSize::Medium);
        assert_eq!(n.normalize_size("x_large").unwrap(), CanonicalSize::XLarge);
        assert_eq!(n.normalize_size("Large 14\"").unwrap(), CanonicalSize::Large);
        assert_eq!(n.normalize_size("Party Size").unwrap(), CanonicalSize::Party);
    }

    #[test]
    fn test_unknown_labels_are_unmapped() {
        let n = pizza_pizza();
        assert!(n.normalize_size("Jumbo").is_err());
        assert!(n.normalize_size("").is_err());
        assert!(n.normalize_crust("Pretzel").is_err());
        assert!(n.normalize_crust("  ").is_err());
    }

    #[test]
    fn test_bare_numbers_are_inches() {
        let pizza_hut = Normalizer::new(
            "PH",
            Vocabulary::new(&[(12, CanonicalSize::Medium), (14, CanonicalSize::Large)]),
        );
        assert_eq!(pizza_hut.normalize_size("12").unwrap(), CanonicalSize::Medium);
        assert_eq!(pizza_hut.normalize_size(" 14 ").unwrap(), CanonicalSize::Large);
        assert_eq!(pizza_hut.normalize_size("14.0").unwrap(), CanonicalSize::Large);
        assert!(matches!(
            pizza_hut.normalize_size("20"),
            Err(NormalizeError::UnmappedToken { .. })
        ));
        assert!(pizza_hut.normalize_size("120").is_err());
    }

    #[test]
    fn test_crust_aliases() {
        let n = pizza_pizza();
        assert_eq!(n.normalize_crust("Thin ’n’ Crispy").unwrap(), CanonicalCrust::Thin);
        assert_eq!(n.normalize_crust("Crunchy Thin Crust").unwrap(), CanonicalCrust::Thin);
        assert_eq!(n.normalize_crust("Parmesan Stuffed Crust").unwrap(), CanonicalCrust::StuffedCrust);
        assert_eq!(n.normalize_crust("New-York Style").unwrap(), CanonicalCrust::NewYorkStyle);
        assert_eq!(n.normalize_crust("Handmade Pan").unwrap(), CanonicalCrust::Pan);
        assert_eq!(n.normalize_crust("hand tossed").unwrap(), CanonicalCrust::HandTossed);
    }

    #[test]
    fn test_canonical_tokens_are_fixed_points() {
        let n = pizza_pizza();
        for size in CanonicalSize::all() {
            assert_eq!(n.normalize_size(size.as_str()).unwrap(), size);
        }
        for crust in CanonicalCrust::all() {
            assert_eq!(n.normalize_crust(crust.as_str()).unwrap(), crust);
        }
    }

    #[test]
    fn test_canonical_recipe() {
        assert_eq!(canonical_recipe("Pizza"), "CYO");
        assert_eq!(canonical_recipe("Create Your Own"), "CYO");
        assert_eq!(canonical_recipe("Hawaiian  bbq"), "Hawaiian BBQ");
        assert_eq!(canonical_recipe("Pepperoni Lovers 2X"), "Pepperoni Lovers");
        assert_eq!(canonical_recipe("Super Supreme"), "Super Supreme");
        let once = canonical_recipe("Veggie 2X 3");
        assert_eq!(once, "Veggie");
        assert_eq!(canonical_recipe(&once), once);
    }

    #[test]
    fn test_product_key_shape() {
        let key = product_key("PP", "Pepperoni Deluxe", CanonicalSize::Medium, CanonicalCrust::HandTossed);
        assert_eq!(key, "PP_pepperoni_deluxe_MD_HT");
        assert_eq!(
            product_key("PP", "  pepperoni   deluxe ", CanonicalSize::Medium, CanonicalCrust::HandTossed),
            key
        );
    }
}
