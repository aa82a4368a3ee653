//! Test Helper Utilities
//!
//! Scripted menu/metadata sources, a repository wrapper that can be told to
//! fail, and event waiting helpers shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bevly_common::events::SyncEvent;
use bevly_common::time::{days, ManualClock};
use bevly_common::{Beverage, BeverageId, Error, MenuProvider, Result};
use bevly_sync::fusion::fuse;
use bevly_sync::policy::SyncPolicy;
use bevly_sync::repository::{MemoryRepository, Repository};
use bevly_sync::sources::{MenuSource, MetadataSource, SourceError};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, Semaphore};

pub fn start_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn manual_clock() -> ManualClock {
    ManualClock::new(start_time())
}

/// 3 day resync, 35 day discard on the given clock
pub fn policy(clock: &ManualClock) -> SyncPolicy {
    SyncPolicy::new(days(3), days(35), Arc::new(clock.clone())).unwrap()
}

pub fn memory_repo(clock: &ManualClock) -> Arc<MemoryRepository> {
    Arc::new(MemoryRepository::new(policy(clock)))
}

pub fn provider(id: &str) -> MenuProvider {
    MenuProvider::new(id, format!("{} taproom", id), format!("http://{}/menu", id), "scripted")
}

pub fn names(beverages: &[Beverage]) -> Vec<String> {
    beverages.iter().map(|b| b.display_name.clone()).collect()
}

/// Menu source answering from a per-provider script
#[derive(Default)]
pub struct ScriptedMenuSource {
    menus: Mutex<HashMap<String, std::result::Result<Vec<Beverage>, SourceError>>>,
    calls: AtomicUsize,
}

impl ScriptedMenuSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_menu(&self, provider_id: &str, names: &[&str]) {
        let menu = names.iter().map(|n| Beverage::new(*n)).collect();
        self.menus
            .lock()
            .unwrap()
            .insert(provider_id.to_string(), Ok(menu));
    }

    pub fn set_failure(&self, provider_id: &str, error: SourceError) {
        self.menus
            .lock()
            .unwrap()
            .insert(provider_id.to_string(), Err(error));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MenuSource for ScriptedMenuSource {
    async fn fetch_menu(
        &self,
        provider: &MenuProvider,
    ) -> std::result::Result<Vec<Beverage>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.menus
            .lock()
            .unwrap()
            .get(&provider.id)
            .cloned()
            .unwrap_or_else(|| Err(SourceError::Network(format!("no script for {}", provider.id))))
    }
}

/// Menu source that reports each call, then waits for a gate permit
pub struct GatedMenuSource {
    gate: Arc<Semaphore>,
    started: mpsc::UnboundedSender<()>,
    menu: Vec<Beverage>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl GatedMenuSource {
    pub fn new(
        gate: Arc<Semaphore>,
        started: mpsc::UnboundedSender<()>,
        names: &[&str],
    ) -> Arc<Self> {
        Arc::new(Self {
            gate,
            started,
            menu: names.iter().map(|n| Beverage::new(*n)).collect(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MenuSource for GatedMenuSource {
    async fn fetch_menu(
        &self,
        _provider: &MenuProvider,
    ) -> std::result::Result<Vec<Beverage>, SourceError> {
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        let _ = self.started.send(());

        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| SourceError::Network("gate closed".to_string()))?;
        permit.forget();

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(self.menu.clone())
    }
}

/// Metadata source answering from per-beverage snapshots
///
/// A scripted snapshot is fused with this source's accuracy; unscripted
/// beverages get `NoMatch`.
pub struct ScriptedMetadataSource {
    name: String,
    accuracy: i32,
    snapshots: Mutex<HashMap<String, Beverage>>,
    failures: Mutex<HashMap<String, SourceError>>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedMetadataSource {
    pub fn new(name: &str, accuracy: i32) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            accuracy,
            snapshots: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Script the snapshot this source reports for `display_name`
    pub fn respond(&self, display_name: &str, fill: impl FnOnce(&mut Beverage)) {
        let mut snapshot = Beverage::new(display_name);
        snapshot.accuracy_score = self.accuracy;
        fill(&mut snapshot);
        self.snapshots
            .lock()
            .unwrap()
            .insert(display_name.to_string(), snapshot);
    }

    pub fn fail(&self, display_name: &str, error: SourceError) {
        self.failures
            .lock()
            .unwrap()
            .insert(display_name.to_string(), error);
    }

    /// Display names looked up, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn call_instants(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }
}

#[async_trait]
impl MetadataSource for ScriptedMetadataSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn accuracy_score(&self) -> i32 {
        self.accuracy
    }

    async fn fetch_metadata(&self, beverage: &mut Beverage) -> std::result::Result<(), SourceError> {
        self.calls
            .lock()
            .unwrap()
            .push((beverage.display_name.clone(), Instant::now()));

        if let Some(error) = self.failures.lock().unwrap().get(&beverage.display_name) {
            return Err(error.clone());
        }
        let snapshot = self
            .snapshots
            .lock()
            .unwrap()
            .get(&beverage.display_name)
            .cloned();
        match snapshot {
            Some(snapshot) => {
                fuse(beverage, &snapshot);
                beverage.need_sync = true;
                Ok(())
            }
            None => Err(SourceError::NoMatch(beverage.display_name.clone())),
        }
    }
}

/// Memory repository whose reads and writes can be made to fail
pub struct FlakyRepository {
    pub inner: MemoryRepository,
    pub fail_providers: AtomicBool,
    pub fail_needing_sync: AtomicBool,
    pub fail_saves: AtomicBool,
}

impl FlakyRepository {
    pub fn new(policy: SyncPolicy) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryRepository::new(policy),
            fail_providers: AtomicBool::new(false),
            fail_needing_sync: AtomicBool::new(false),
            fail_saves: AtomicBool::new(false),
        })
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(Error::Internal(format!("{} unavailable", what)));
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for FlakyRepository {
    async fn menu_providers(&self) -> Result<Vec<MenuProvider>> {
        Self::check(&self.fail_providers, "providers")?;
        self.inner.menu_providers().await
    }

    async fn provider_by_id(&self, id: &str) -> Result<Option<MenuProvider>> {
        self.inner.provider_by_id(id).await
    }

    async fn register_provider(&self, provider: &MenuProvider) -> Result<()> {
        self.inner.register_provider(provider).await
    }

    async fn provider_beverages(&self, provider: &MenuProvider) -> Result<Vec<Beverage>> {
        self.inner.provider_beverages(provider).await
    }

    async fn set_beverage_menu(&self, provider: &MenuProvider, beverages: &[Beverage]) -> Result<()> {
        self.inner.set_beverage_menu(provider, beverages).await
    }

    async fn beverages_needing_sync(&self) -> Result<Vec<Beverage>> {
        Self::check(&self.fail_needing_sync, "beverages")?;
        self.inner.beverages_needing_sync().await
    }

    async fn save_beverage(&self, beverage: &Beverage) -> Result<BeverageId> {
        Self::check(&self.fail_saves, "save")?;
        self.inner.save_beverage(beverage).await
    }

    async fn beverage_by_name(&self, display_name: &str) -> Result<Option<Beverage>> {
        self.inner.beverage_by_name(display_name).await
    }

    async fn garbage_collect(&self) -> Result<u64> {
        self.inner.garbage_collect().await
    }

    async fn purge(&self) -> Result<()> {
        self.inner.purge().await
    }
}

/// Wait for the next event matching `pred`, skipping others
pub async fn wait_for_event(
    rx: &mut broadcast::Receiver<SyncEvent>,
    pred: impl Fn(&SyncEvent) -> bool,
) -> SyncEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(e) => panic!("event stream ended: {}", e),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

pub fn is_pass_completed(event: &SyncEvent) -> bool {
    matches!(event, SyncEvent::PassCompleted { .. })
}

/// Drain buffered events without waiting
pub fn drain_events(rx: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
