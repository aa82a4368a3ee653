//! Menu and metadata source capabilities
//!
//! A [`MenuSource`] lists what a venue is pouring right now; a
//! [`MetadataSource`] enriches one beverage from one external reference.
//! Menu sources are chosen per provider by its `menu_format` tag through a
//! [`MenuSourceRegistry`]. Metadata sources are tried in a fixed priority
//! order, each behind its own [`Throttle`].

pub mod http;
pub mod json_menu;
pub mod search_api;

use crate::throttle::Throttle;
use async_trait::async_trait;
use bevly_common::config::MetadataSourceConfig;
use bevly_common::{Beverage, MenuProvider};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use json_menu::JsonMenuSource;
pub use search_api::SearchApiMetadataSource;

/// Default web search used as a beverage's external link when its menu
/// gives none
pub const DEFAULT_LINK_SEARCH_URL: &str = "https://www.google.com/search";

/// Source failure
///
/// `NoMatch` is not an I/O problem: the source answered but nothing it had
/// plausibly named the beverage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("No match found: {0}")]
    NoMatch(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("No menu source registered for format {0:?}")]
    UnknownFormat(String),

    /// A menu that lists nothing is treated as a failed fetch
    #[error("Empty menu")]
    EmptyMenu,
}

impl SourceError {
    pub fn is_no_match(&self) -> bool {
        matches!(self, Self::NoMatch(_))
    }
}

/// Lists the beverages currently on one provider's menu
///
/// Must be side-effect free on failure.
#[async_trait]
pub trait MenuSource: Send + Sync {
    async fn fetch_menu(&self, provider: &MenuProvider) -> Result<Vec<Beverage>, SourceError>;
}

/// Enriches one beverage from one external reference
///
/// Implementations mutate the beverage through [`fuse`](crate::fusion::fuse)
/// with their own accuracy score, and set `need_sync` whenever the record
/// was looked at and is worth persisting.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Source name; also the rating source and attribute prefix
    fn name(&self) -> &str;

    /// Trust ranking used when fusing this source's data
    fn accuracy_score(&self) -> i32;

    async fn fetch_metadata(&self, beverage: &mut Beverage) -> Result<(), SourceError>;
}

/// A metadata source paired with the throttle pacing calls to it
#[derive(Clone)]
pub struct MetadataSourceEntry {
    pub source: Arc<dyn MetadataSource>,
    pub throttle: Arc<Throttle>,
}

impl MetadataSourceEntry {
    pub fn new(source: Arc<dyn MetadataSource>, throttle: Throttle) -> Self {
        Self {
            source,
            throttle: Arc::new(throttle),
        }
    }

    /// Pair with a throttle that never sleeps
    pub fn unthrottled(source: Arc<dyn MetadataSource>) -> Self {
        let throttle = Throttle::disabled(source.name());
        Self::new(source, throttle)
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }
}

impl std::fmt::Debug for MetadataSourceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataSourceEntry")
            .field("source", &self.source.name())
            .field("throttle", &self.throttle)
            .finish()
    }
}

/// Menu format tag to menu source
#[derive(Clone)]
pub struct MenuSourceRegistry {
    sources: HashMap<String, Arc<dyn MenuSource>>,
    link_search_url: Option<String>,
}

impl Default for MenuSourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MenuSourceRegistry {
    /// Empty registry that fills missing links with a web search URL
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
            link_search_url: Some(DEFAULT_LINK_SEARCH_URL.to_string()),
        }
    }

    /// Leave missing links empty
    pub fn without_default_links(mut self) -> Self {
        self.link_search_url = None;
        self
    }

    pub fn register(&mut self, format: impl Into<String>, source: Arc<dyn MenuSource>) {
        let format = format.into();
        if self.sources.insert(format.clone(), source).is_some() {
            warn!(format = %format, "Replacing registered menu source");
        }
    }

    pub fn with(mut self, format: impl Into<String>, source: Arc<dyn MenuSource>) -> Self {
        self.register(format, source);
        self
    }

    pub fn formats(&self) -> Vec<&str> {
        let mut formats: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        formats.sort_unstable();
        formats
    }

    /// Fetch a provider's menu with the source registered for its format
    pub async fn fetch_menu(&self, provider: &MenuProvider) -> Result<Vec<Beverage>, SourceError> {
        let Some(source) = self.sources.get(&provider.menu_format) else {
            warn!(
                provider = %provider.id,
                format = %provider.menu_format,
                "No menu source for format"
            );
            return Err(SourceError::UnknownFormat(provider.menu_format.clone()));
        };

        info!(provider = %provider.id, format = %provider.menu_format, "Fetching menu");
        let mut beverages = source.fetch_menu(provider).await?;
        if beverages.is_empty() {
            return Err(SourceError::EmptyMenu);
        }

        if let Some(base) = &self.link_search_url {
            for beverage in beverages.iter_mut().filter(|b| b.link.is_empty()) {
                beverage.link = search_link(base, &beverage.display_name);
            }
        }

        debug!(provider = %provider.id, count = beverages.len(), "Menu fetched");
        Ok(beverages)
    }
}

/// Build the configured metadata sources, in configuration order
pub fn metadata_sources_from_config(
    configs: &[MetadataSourceConfig],
) -> Result<Vec<MetadataSourceEntry>, SourceError> {
    configs
        .iter()
        .map(|config| {
            let source = SearchApiMetadataSource::from_config(config)?;
            let throttle =
                Throttle::from_millis(config.name.clone(), config.min_delay_ms, config.max_delay_ms);
            info!(
                source = %config.name,
                accuracy = config.accuracy_score,
                "Registered metadata source"
            );
            Ok(MetadataSourceEntry::new(Arc::new(source), throttle))
        })
        .collect()
}

/// `base?q=<terms>`, form-encoded
pub fn search_link(base: &str, terms: &str) -> String {
    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("q", terms)
        .finish();
    format!("{}?{}", base, query)
}
