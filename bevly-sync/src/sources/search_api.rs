//! Metadata from a JSON search endpoint
//!
//! The endpoint is configured as a URL template whose `{query}` placeholder
//! receives the form-encoded search name. It must answer with:
//!
//! ```json
//! {"results": [{"title": "Lagunitas Sucks - Lagunitas Brewing",
//!               "url": "https://example.org/beer/123",
//!               "brewer": "Lagunitas", "style": "Strong Ale",
//!               "abv": 8.0, "rating": 91, "description": "..."}]}
//! ```
//!
//! Results are scanned in order and the first whose title clears the
//! confidence threshold is fused into the beverage.

use super::http::{build_client, get_json};
use super::{MetadataSource, SourceError};
use crate::fusion::fuse;
use crate::text::{first_confident_match, normalize};
use async_trait::async_trait;
use bevly_common::config::MetadataSourceConfig;
use bevly_common::{Beverage, Rating};
use serde::Deserialize;
use tracing::{debug, info};

/// Placeholder replaced by the encoded search name
pub const QUERY_PLACEHOLDER: &str = "{query}";

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Candidate>,
}

/// One search hit
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Candidate {
    pub title: String,
    #[serde(default)]
    pub url: String,
    /// Canonical name when the endpoint reports one separately from the title
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub brewer: String,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub abv: f64,
    /// Percentage, 0 = unrated
    #[serde(default)]
    pub rating: u32,
    #[serde(default)]
    pub description: String,
}

pub struct SearchApiMetadataSource {
    name: String,
    search_url: String,
    accuracy_score: i32,
    confidence_threshold: f64,
    client: reqwest::Client,
}

impl SearchApiMetadataSource {
    pub fn new(
        name: impl Into<String>,
        search_url: impl Into<String>,
        accuracy_score: i32,
        confidence_threshold: f64,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            name: name.into(),
            search_url: search_url.into(),
            accuracy_score,
            confidence_threshold,
            client: build_client()?,
        })
    }

    pub fn from_config(config: &MetadataSourceConfig) -> Result<Self, SourceError> {
        Self::new(
            config.name.clone(),
            config.search_url.clone(),
            config.accuracy_score,
            config.confidence_threshold,
        )
    }

    /// Search URL for `terms`
    pub fn query_url(&self, terms: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(terms.as_bytes()).collect();
        self.search_url.replace(QUERY_PLACEHOLDER, &encoded)
    }

    pub fn link_attribute(&self) -> String {
        format!("{}Link", self.name)
    }

    pub fn description_attribute(&self) -> String {
        format!("{}Description", self.name)
    }

    /// Snapshot carrying this source's accuracy, rating slot and attributes
    pub fn snapshot(&self, display_name: &str, candidate: &Candidate) -> Beverage {
        let mut snapshot = Beverage::with_brewer(display_name, normalize(&candidate.brewer));
        snapshot.accuracy_score = self.accuracy_score;
        snapshot.name = if candidate.name.trim().is_empty() {
            normalize(&candidate.title)
        } else {
            normalize(&candidate.name)
        };
        snapshot.bev_type = normalize(&candidate.style);
        snapshot.abv = candidate.abv.max(0.0);
        snapshot.description = candidate.description.trim().to_string();
        snapshot.link = candidate.url.trim().to_string();
        snapshot.add_rating(Rating::new(self.name.clone(), candidate.rating));
        snapshot.set_attribute(self.link_attribute(), snapshot.link.clone());
        snapshot.set_attribute(self.description_attribute(), snapshot.description.clone());
        snapshot
    }

    /// Pick the first acceptable candidate and fuse it into `beverage`
    pub fn apply_candidates(
        &self,
        beverage: &mut Beverage,
        candidates: &[Candidate],
    ) -> Result<(), SourceError> {
        let target = beverage.search_name().to_string();
        let Some((candidate, confidence)) = first_confident_match(
            &target,
            candidates,
            |c| c.title.as_str(),
            self.confidence_threshold,
        ) else {
            return Err(SourceError::NoMatch(format!(
                "{}: no result for {:?} among {} candidates",
                self.name,
                target,
                candidates.len()
            )));
        };

        let snapshot = self.snapshot(&beverage.display_name, candidate);
        let outcome = fuse(beverage, &snapshot);
        beverage.need_sync = true;

        info!(
            source = %self.name,
            beverage = %beverage.display_name,
            matched = %candidate.title,
            confidence = format!("{:.2}", confidence),
            changed_fields = outcome.changed_fields,
            "Metadata match"
        );
        Ok(())
    }
}

#[async_trait]
impl MetadataSource for SearchApiMetadataSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn accuracy_score(&self) -> i32 {
        self.accuracy_score
    }

    async fn fetch_metadata(&self, beverage: &mut Beverage) -> Result<(), SourceError> {
        let url = self.query_url(beverage.search_name());
        debug!(source = %self.name, beverage = %beverage.display_name, "Searching");

        let response: SearchResponse = get_json(&self.client, &url).await?;
        self.apply_candidates(beverage, &response.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SearchApiMetadataSource {
        SearchApiMetadataSource::new("rb", "http://localhost/search?q={query}&fmt=json", 9, 0.2)
            .unwrap()
    }

    fn candidate(title: &str) -> Candidate {
        Candidate {
            title: title.to_string(),
            url: format!("http://rb/{}", title.len()),
            ..Default::default()
        }
    }

    #[test]
    fn test_query_url_encodes_terms() {
        assert_eq!(
            source().query_url("Push Ob\"session\""),
            "http://localhost/search?q=Push+Ob%22session%22&fmt=json"
        );
    }

    #[test]
    fn test_snapshot_namespaces_attributes() {
        let mut hit = candidate("Lagunitas Sucks");
        hit.rating = 91;
        hit.description = " Big and hoppy ".to_string();
        let snapshot = source().snapshot("Lagunitas Sucks", &hit);

        assert_eq!(snapshot.accuracy_score, 9);
        assert_eq!(snapshot.name, "Lagunitas Sucks");
        assert_eq!(snapshot.rating("rb"), Some(91));
        assert_eq!(snapshot.attribute("rbLink"), hit.url);
        assert_eq!(snapshot.attribute("rbDescription"), "Big and hoppy");
    }

    #[test]
    fn test_rejected_top_hit_skipped() {
        let mut bev = Beverage::new("Lagunitas Sucks");
        let mut good = candidate("Lagunitas Sucks (Brown Shugga Substitute)");
        good.brewer = "Lagunitas".to_string();
        let results = vec![candidate("Green Flash Hop Head Red Ale"), good];

        source().apply_candidates(&mut bev, &results).unwrap();

        assert_eq!(bev.brewer, "Lagunitas");
        assert_eq!(bev.accuracy_score, 9);
        assert!(bev.need_sync);
    }

    #[test]
    fn test_no_acceptable_candidate_is_no_match() {
        let mut bev = Beverage::new("Push Ob\"session\"");
        let err = source()
            .apply_candidates(&mut bev, &[candidate("Green Flash Hop Head Red Ale")])
            .unwrap_err();
        assert!(err.is_no_match());
        assert!(!bev.need_sync);

        let err = source().apply_candidates(&mut bev, &[]).unwrap_err();
        assert!(err.is_no_match());
    }

    #[test]
    fn test_search_name_drives_matching() {
        let mut bev = Beverage::new("Marstons Pedigree (cask) 4.5% pint");
        bev.set_search_name("Marstons Pedigree");
        let results = vec![candidate("Pedigree | Marston, Thompson & Evershed")];

        source().apply_candidates(&mut bev, &results).unwrap();
        assert_eq!(bev.display_name, "Marstons Pedigree (cask) 4.5% pint");
    }
}
