//! Beverage knowledge-base model
//!
//! A [`Beverage`] is looked up by display name on every crawl and every
//! enrichment write. Descriptive fields use the empty string (and `0.0` for
//! ABV) to mean "unknown"; fusion relies on that convention.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Attribute holding a search-friendly name when it differs from the
/// (possibly decorated) display name.
pub const SEARCH_NAME_ATTRIBUTE: &str = "SearchName";

/// Stable opaque beverage identifier, assigned at first persistence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BeverageId(Uuid);

impl BeverageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BeverageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BeverageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BeverageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for BeverageId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// A rating from one source, as a percentage (0-100)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub source: String,
    pub percentage_rating: u32,
}

impl Rating {
    /// Create a rating, clamping the percentage to 100
    pub fn new(source: impl Into<String>, percentage_rating: u32) -> Self {
        Self {
            source: source.into(),
            percentage_rating: percentage_rating.min(100),
        }
    }
}

/// Canonical knowledge-base record for one drink
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Beverage {
    /// Assigned by the repository; `None` until first persisted
    #[serde(default)]
    pub id: Option<BeverageId>,
    /// Human label as it appears on a menu, possibly decorated ("(cask)")
    pub display_name: String,
    /// Canonical name as reported by a metadata source
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Style or type ("IPA", "Stout")
    #[serde(default)]
    pub bev_type: String,
    #[serde(default)]
    pub brewer: String,
    /// Alcohol by volume; 0.0 means unknown
    #[serde(default)]
    pub abv: f64,
    /// External canonical link
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub ratings: Vec<Rating>,
    /// Source-namespaced extra facts
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Accuracy of the most trustworthy source that wrote the core fields
    #[serde(default)]
    pub accuracy_score: i32,
    /// Last enrichment attempt
    #[serde(default)]
    pub sync_time: Option<DateTime<Utc>>,
    /// Last repository write; maintained by the repository
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Set by whoever touched the record and wants it persisted
    #[serde(skip)]
    pub need_sync: bool,
}

impl Beverage {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            ..Default::default()
        }
    }

    pub fn with_brewer(display_name: impl Into<String>, brewer: impl Into<String>) -> Self {
        Self {
            brewer: brewer.into(),
            ..Self::new(display_name)
        }
    }

    /// Name to use for external searches
    ///
    /// Falls back to the display name when no search name was recorded.
    pub fn search_name(&self) -> &str {
        match self.attributes.get(SEARCH_NAME_ATTRIBUTE) {
            Some(name) if !name.is_empty() => name,
            _ => &self.display_name,
        }
    }

    pub fn set_search_name(&mut self, name: impl Into<String>) {
        self.set_attribute(SEARCH_NAME_ATTRIBUTE, name);
    }

    /// Attribute value, or "" when absent
    pub fn attribute(&self, name: &str) -> &str {
        self.attributes.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn has_abv(&self) -> bool {
        self.abv > 0.0
    }

    pub fn has_rating(&self) -> bool {
        !self.ratings.is_empty()
    }

    /// Add or replace the rating for `rating.source`
    ///
    /// A zero rating means "no rating" and is never stored. Returns true if
    /// the rating list changed.
    pub fn add_rating(&mut self, rating: Rating) -> bool {
        if rating.percentage_rating == 0 {
            return false;
        }
        match self.ratings.iter_mut().find(|r| r.source == rating.source) {
            Some(existing) => {
                if existing.percentage_rating == rating.percentage_rating {
                    return false;
                }
                existing.percentage_rating = rating.percentage_rating;
                true
            }
            None => {
                self.ratings.push(rating);
                true
            }
        }
    }

    /// Rating for one source
    pub fn rating(&self, source: &str) -> Option<u32> {
        self.ratings
            .iter()
            .find(|r| r.source == source)
            .map(|r| r.percentage_rating)
    }

    pub fn clear_ratings(&mut self) {
        self.ratings.clear();
    }
}

impl fmt::Display for Beverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name)
    }
}

/// One venue whose menu is periodically crawled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuProvider {
    pub id: String,
    pub name: String,
    pub url: String,
    /// Selects the menu source implementation
    pub menu_format: String,
}

impl MenuProvider {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
        menu_format: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
            menu_format: menu_format.into(),
        }
    }
}

impl fmt::Display for MenuProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
