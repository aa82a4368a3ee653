//! Durable beverage and provider store
//!
//! The [`Repository`] owns all durable state. Two implementations share the
//! same semantics: [`MemoryRepository`] and [`SqliteRepository`]. Both
//! locate beverages by display name, merge writes through
//! [`fuse`](crate::fusion::fuse), and answer the resync and discard
//! questions through an injected [`SyncPolicy`](crate::policy::SyncPolicy).
//!
//! `save_beverage` (find by name, fuse, write) is atomic per entity, and
//! `set_beverage_menu` either saves every beverage and replaces the
//! provider's association or changes nothing.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use bevly_common::{Beverage, BeverageId, Error, MenuProvider, Result};
use chrono::{DateTime, Utc};

pub use memory::MemoryRepository;
pub use sqlite::SqliteRepository;

#[async_trait]
pub trait Repository: Send + Sync {
    /// All known providers, in registration order
    async fn menu_providers(&self) -> Result<Vec<MenuProvider>>;

    async fn provider_by_id(&self, id: &str) -> Result<Option<MenuProvider>>;

    /// Create or update a provider; its menu is left as is
    async fn register_provider(&self, provider: &MenuProvider) -> Result<()>;

    /// Beverages on the provider's current menu, in menu order
    ///
    /// Empty for a provider that was never crawled.
    async fn provider_beverages(&self, provider: &MenuProvider) -> Result<Vec<Beverage>>;

    /// Like [`provider_beverages`](Self::provider_beverages), by provider id
    async fn provider_beverages_by_id(&self, id: &str) -> Result<Vec<Beverage>> {
        match self.provider_by_id(id).await? {
            Some(provider) => self.provider_beverages(&provider).await,
            None => Err(Error::NotFound(format!("provider {}", id))),
        }
    }

    /// Save every beverage, then make them the provider's whole menu
    ///
    /// Registers the provider if it is unknown.
    async fn set_beverage_menu(&self, provider: &MenuProvider, beverages: &[Beverage])
        -> Result<()>;

    /// Referenced beverages whose sync time is unset or stale
    async fn beverages_needing_sync(&self) -> Result<Vec<Beverage>>;

    /// Find by display name and fuse, or insert; stamps `updated_at`
    async fn save_beverage(&self, beverage: &Beverage) -> Result<BeverageId>;

    async fn beverage_by_name(&self, display_name: &str) -> Result<Option<Beverage>>;

    /// Delete unreferenced beverages past the discard threshold
    ///
    /// Returns the number removed.
    async fn garbage_collect(&self) -> Result<u64>;

    /// Remove every provider, menu and beverage
    async fn purge(&self) -> Result<()>;
}

/// First-time record for `beverage`
///
/// Keeps one rating per source and drops the transient flag.
pub(crate) fn new_record(beverage: &Beverage, now: DateTime<Utc>) -> Beverage {
    let mut record = beverage.clone();
    record.id = Some(beverage.id.unwrap_or_default());
    record.ratings.clear();
    for rating in &beverage.ratings {
        record.add_rating(rating.clone());
    }
    record.updated_at = Some(now);
    record.need_sync = false;
    record
}

/// Stored record after fusing `incoming` into `stored`
pub(crate) fn merged_record(
    mut stored: Beverage,
    incoming: &Beverage,
    now: DateTime<Utc>,
) -> Beverage {
    crate::fusion::fuse(&mut stored, incoming);
    stored.updated_at = Some(now);
    stored.need_sync = false;
    stored
}
