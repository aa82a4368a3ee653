//! In-process repository
//!
//! Every operation runs under one `RwLock`, which makes each of them atomic.
//! Used by tests and for running without a database file.

use super::{merged_record, new_record, Repository};
use crate::policy::SyncPolicy;
use async_trait::async_trait;
use bevly_common::{Beverage, BeverageId, MenuProvider, Result};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct State {
    providers: Vec<MenuProvider>,
    menus: HashMap<String, Vec<BeverageId>>,
    beverages: HashMap<BeverageId, Beverage>,
    by_name: HashMap<String, BeverageId>,
}

impl State {
    fn save(&mut self, beverage: &Beverage, now: DateTime<Utc>) -> BeverageId {
        if let Some(id) = self.by_name.get(&beverage.display_name).copied() {
            if let Some(stored) = self.beverages.remove(&id) {
                debug!(beverage = %beverage.display_name, id = %id, "Updating beverage");
                self.beverages.insert(id, merged_record(stored, beverage, now));
                return id;
            }
        }

        let record = new_record(beverage, now);
        let id = record.id.unwrap_or_default();
        debug!(beverage = %record.display_name, id = %id, "Inserting beverage");
        self.by_name.insert(record.display_name.clone(), id);
        self.beverages.insert(id, record);
        id
    }

    fn upsert_provider(&mut self, provider: &MenuProvider) {
        match self.providers.iter_mut().find(|p| p.id == provider.id) {
            Some(existing) => *existing = provider.clone(),
            None => self.providers.push(provider.clone()),
        }
    }

    fn referenced(&self) -> HashSet<BeverageId> {
        self.menus.values().flatten().copied().collect()
    }
}

#[derive(Debug)]
pub struct MemoryRepository {
    policy: SyncPolicy,
    state: RwLock<State>,
}

impl MemoryRepository {
    pub fn new(policy: SyncPolicy) -> Self {
        Self {
            policy,
            state: RwLock::new(State::default()),
        }
    }

    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    /// Number of stored beverages
    pub async fn beverage_count(&self) -> usize {
        self.state.read().await.beverages.len()
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new(SyncPolicy::default())
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn menu_providers(&self) -> Result<Vec<MenuProvider>> {
        Ok(self.state.read().await.providers.clone())
    }

    async fn provider_by_id(&self, id: &str) -> Result<Option<MenuProvider>> {
        let state = self.state.read().await;
        Ok(state.providers.iter().find(|p| p.id == id).cloned())
    }

    async fn register_provider(&self, provider: &MenuProvider) -> Result<()> {
        self.state.write().await.upsert_provider(provider);
        Ok(())
    }

    async fn provider_beverages(&self, provider: &MenuProvider) -> Result<Vec<Beverage>> {
        let state = self.state.read().await;
        let Some(ids) = state.menus.get(&provider.id) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| state.beverages.get(id))
            .cloned()
            .collect())
    }

    async fn set_beverage_menu(
        &self,
        provider: &MenuProvider,
        beverages: &[Beverage],
    ) -> Result<()> {
        let now = self.policy.now();
        let mut state = self.state.write().await;
        let ids: Vec<BeverageId> = beverages.iter().map(|b| state.save(b, now)).collect();
        state.upsert_provider(provider);
        debug!(provider = %provider.id, count = ids.len(), "Replacing menu");
        state.menus.insert(provider.id.clone(), ids);
        Ok(())
    }

    async fn beverages_needing_sync(&self) -> Result<Vec<Beverage>> {
        let state = self.state.read().await;
        let referenced = state.referenced();
        let mut due: Vec<Beverage> = state
            .beverages
            .values()
            .filter(|b| {
                let is_referenced = b.id.map(|id| referenced.contains(&id)).unwrap_or(false);
                self.policy.needs_sync(b, is_referenced)
            })
            .cloned()
            .collect();
        due.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        info!("Found {} beverages needing sync", due.len());
        Ok(due)
    }

    async fn save_beverage(&self, beverage: &Beverage) -> Result<BeverageId> {
        let now = self.policy.now();
        Ok(self.state.write().await.save(beverage, now))
    }

    async fn beverage_by_name(&self, display_name: &str) -> Result<Option<Beverage>> {
        let state = self.state.read().await;
        Ok(state
            .by_name
            .get(display_name)
            .and_then(|id| state.beverages.get(id))
            .cloned())
    }

    async fn garbage_collect(&self) -> Result<u64> {
        let mut state = self.state.write().await;
        let referenced = state.referenced();
        let doomed: Vec<(BeverageId, String)> = state
            .beverages
            .iter()
            .filter(|(id, b)| self.policy.eligible_for_discard(b, referenced.contains(id)))
            .map(|(id, b)| (*id, b.display_name.clone()))
            .collect();

        for (id, name) in &doomed {
            state.beverages.remove(id);
            state.by_name.remove(name);
        }

        info!(
            "GarbageCollect(older:{}): removed {} beverages",
            self.policy.discard_threshold_time().to_rfc3339(),
            doomed.len()
        );
        Ok(doomed.len() as u64)
    }

    async fn purge(&self) -> Result<()> {
        *self.state.write().await = State::default();
        Ok(())
    }
}
