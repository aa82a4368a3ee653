//! JSON menu feed
//!
//! Reads a provider URL serving:
//!
//! ```json
//! {"beverages": [{"name": "Marstons Pedigree (cask)", "type": "Bitter",
//!                 "search_name": "Marstons Pedigree"}]}
//! ```
//!
//! Only `name` is required. Names are whitespace-normalized; items with a
//! blank name are skipped.

use super::http::{build_client, get_json};
use super::{MenuSource, SourceError};
use crate::text::normalize;
use async_trait::async_trait;
use bevly_common::{Beverage, MenuProvider};
use serde::Deserialize;
use tracing::debug;

/// Format tag providers use to select this source
pub const FORMAT: &str = "json";

#[derive(Debug, Deserialize)]
struct MenuDocument {
    #[serde(default)]
    beverages: Vec<MenuItem>,
}

#[derive(Debug, Deserialize)]
struct MenuItem {
    name: String,
    #[serde(rename = "type", default)]
    bev_type: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    search_name: String,
    #[serde(default)]
    brewer: String,
    #[serde(default)]
    abv: f64,
    #[serde(default)]
    link: String,
}

impl MenuItem {
    fn into_beverage(self) -> Option<Beverage> {
        let display_name = normalize(&self.name);
        if display_name.is_empty() {
            return None;
        }
        let mut beverage = Beverage::with_brewer(display_name, normalize(&self.brewer));
        beverage.bev_type = normalize(&self.bev_type);
        beverage.description = self.description.trim().to_string();
        beverage.abv = self.abv.max(0.0);
        beverage.link = self.link.trim().to_string();

        let search_name = normalize(&self.search_name);
        if !search_name.is_empty() && search_name != beverage.display_name {
            beverage.set_search_name(search_name);
        }
        Some(beverage)
    }
}

pub struct JsonMenuSource {
    client: reqwest::Client,
}

impl JsonMenuSource {
    pub fn new() -> Result<Self, SourceError> {
        Ok(Self {
            client: build_client()?,
        })
    }
}

#[async_trait]
impl MenuSource for JsonMenuSource {
    async fn fetch_menu(&self, provider: &MenuProvider) -> Result<Vec<Beverage>, SourceError> {
        let document: MenuDocument = get_json(&self.client, &provider.url).await?;
        let beverages = parse_items(document);
        debug!(provider = %provider.id, count = beverages.len(), "Parsed JSON menu");
        Ok(beverages)
    }
}

fn parse_items(document: MenuDocument) -> Vec<Beverage> {
    document
        .beverages
        .into_iter()
        .filter_map(MenuItem::into_beverage)
        .collect()
}

/// Parse a menu document from a string
pub fn parse_menu(json: &str) -> Result<Vec<Beverage>, SourceError> {
    let document: MenuDocument =
        serde_json::from_str(json).map_err(|e| SourceError::Parse(e.to_string()))?;
    Ok(parse_items(document))
}
