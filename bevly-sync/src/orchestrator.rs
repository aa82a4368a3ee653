//! Sync passes and the single-worker trigger loop
//!
//! A pass ([`Syncer::sync`]) runs in two phases:
//!
//! 1. **Crawl**: fetch every provider's menu, tag beverages new to that
//!    provider with a discovery timestamp, and replace the provider's menu.
//!    A failed provider keeps its previous menu and the pass moves on.
//! 2. **Enrich**: for each beverage the repository reports as due, run
//!    every metadata source in priority order, each behind its throttle,
//!    and persist the beverage if any source marked it.
//!
//! [`SyncOrchestrator`] owns one worker task that runs passes strictly one
//! after another. Triggers go through a one-slot channel: a non-blocking
//! trigger that finds the slot full is dropped, so any burst of triggers
//! during a pass yields at most one further pass.

use crate::error::SyncError;
use crate::repository::Repository;
use crate::sources::{MenuSourceRegistry, MetadataSourceEntry};
use bevly_common::events::{EventBus, SyncEvent};
use bevly_common::time::{Clock, SystemClock};
use bevly_common::{Beverage, MenuProvider};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Attribute recording when a beverage first appeared on a provider's menu
pub fn discovery_attribute(provider_id: &str) -> String {
    format!("{}MenuAt", provider_id)
}

/// Stamp beverages absent from the provider's prior menu
///
/// Compares by display name. Returns how many were newly discovered.
pub fn set_beverage_discover_times(
    provider: &MenuProvider,
    beverages: &mut [Beverage],
    prior: &[Beverage],
    now: DateTime<Utc>,
) -> usize {
    let seen: HashSet<&str> = prior.iter().map(|b| b.display_name.as_str()).collect();
    let stamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    let key = discovery_attribute(&provider.id);

    let mut discovered = 0;
    for beverage in beverages.iter_mut() {
        if !seen.contains(beverage.display_name.as_str()) {
            beverage.set_attribute(key.clone(), stamp.clone());
            discovered += 1;
        }
    }
    discovered
}

/// Everything one pass did
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub pass: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub providers_crawled: usize,
    pub beverages_discovered: usize,
    pub beverages_enriched: usize,
    pub beverages_saved: usize,
    pub errors: Vec<SyncError>,
}

impl SyncReport {
    fn new(pass: u64, started_at: DateTime<Utc>) -> Self {
        Self {
            pass,
            started_at,
            finished_at: started_at,
            providers_crawled: 0,
            beverages_discovered: 0,
            beverages_enriched: 0,
            beverages_saved: 0,
            errors: Vec::new(),
        }
    }

    /// Whether the pass was abandoned early
    pub fn is_fatal(&self) -> bool {
        self.errors.iter().any(SyncError::is_fatal)
    }

    pub fn summary(&self) -> PassSummary {
        PassSummary {
            pass: self.pass,
            started_at: self.started_at,
            finished_at: self.finished_at,
            providers_crawled: self.providers_crawled,
            beverages_discovered: self.beverages_discovered,
            beverages_enriched: self.beverages_enriched,
            beverages_saved: self.beverages_saved,
            error_count: self.errors.len(),
            fatal: self.is_fatal(),
        }
    }
}

/// Serializable digest of a [`SyncReport`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub pass: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub providers_crawled: usize,
    pub beverages_discovered: usize,
    pub beverages_enriched: usize,
    pub beverages_saved: usize,
    pub error_count: usize,
    pub fatal: bool,
}

/// Runs sync passes against one repository
pub struct Syncer {
    repo: Arc<dyn Repository>,
    menus: MenuSourceRegistry,
    metadata: Vec<MetadataSourceEntry>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    passes: AtomicU64,
}

impl Syncer {
    /// `metadata` is tried in order for every beverage
    pub fn new(
        repo: Arc<dyn Repository>,
        menus: MenuSourceRegistry,
        metadata: Vec<MetadataSourceEntry>,
    ) -> Self {
        Self {
            repo,
            menus,
            metadata,
            clock: Arc::new(SystemClock),
            events: EventBus::default(),
            passes: AtomicU64::new(0),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    /// Run one full pass: crawl all providers, then enrich due beverages
    ///
    /// Never fails as a whole; every problem lands in the report. Only an
    /// inability to list providers or due beverages cuts the pass short.
    pub async fn sync(&self) -> SyncReport {
        let pass = self.passes.fetch_add(1, Ordering::SeqCst) + 1;
        let mut report = SyncReport::new(pass, self.clock.now());

        info!(pass, "Syncing all providers");
        self.events.emit_lossy(SyncEvent::PassStarted {
            pass,
            timestamp: report.started_at,
        });

        if self.crawl(&mut report).await {
            self.enrich_all(&mut report).await;
        }

        report.finished_at = self.clock.now();
        if report.is_fatal() {
            error!(pass, errors = report.errors.len(), "Sync pass aborted");
        } else {
            info!(
                pass,
                providers = report.providers_crawled,
                enriched = report.beverages_enriched,
                saved = report.beverages_saved,
                errors = report.errors.len(),
                "Sync pass complete"
            );
        }
        self.events.emit_lossy(SyncEvent::PassCompleted {
            pass,
            error_count: report.errors.len(),
            fatal: report.is_fatal(),
            timestamp: report.finished_at,
        });
        report
    }

    /// Returns false when providers could not be listed
    async fn crawl(&self, report: &mut SyncReport) -> bool {
        let providers = match self.repo.menu_providers().await {
            Ok(providers) => providers,
            Err(e) => {
                report
                    .errors
                    .push(SyncError::Fatal(format!("cannot list menu providers: {}", e)));
                return false;
            }
        };

        for provider in &providers {
            info!(provider = %provider.id, "Syncing provider");
            if let Err(e) = self.crawl_provider(provider, report).await {
                warn!(provider = %provider.id, error = %e, "Provider sync failed");
                self.events.emit_lossy(SyncEvent::ProviderFailed {
                    provider_id: provider.id.clone(),
                    error: e.to_string(),
                });
                report.errors.push(e);
            }
        }
        true
    }

    async fn crawl_provider(
        &self,
        provider: &MenuProvider,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let mut beverages =
            self.menus
                .fetch_menu(provider)
                .await
                .map_err(|source| SyncError::Menu {
                    provider: provider.id.clone(),
                    source,
                })?;

        let prior = self
            .repo
            .provider_beverages(provider)
            .await
            .map_err(|e| SyncError::storage(format!("provider {}", provider.id), &e))?;

        let discovered =
            set_beverage_discover_times(provider, &mut beverages, &prior, self.clock.now());

        self.repo
            .set_beverage_menu(provider, &beverages)
            .await
            .map_err(|e| SyncError::storage(format!("provider {} menu", provider.id), &e))?;

        debug!(
            provider = %provider.id,
            beverages = beverages.len(),
            discovered,
            "Menu replaced"
        );
        report.providers_crawled += 1;
        report.beverages_discovered += discovered;
        self.events.emit_lossy(SyncEvent::ProviderCrawled {
            provider_id: provider.id.clone(),
            beverage_count: beverages.len(),
            discovered,
        });
        Ok(())
    }

    async fn enrich_all(&self, report: &mut SyncReport) {
        let due = match self.repo.beverages_needing_sync().await {
            Ok(due) => due,
            Err(e) => {
                report.errors.push(SyncError::Fatal(format!(
                    "cannot list beverages needing sync: {}",
                    e
                )));
                return;
            }
        };

        for mut beverage in due {
            self.enrich(&mut beverage, &mut report.errors).await;
            report.beverages_enriched += 1;

            let persisted = if beverage.need_sync {
                match self.repo.save_beverage(&beverage).await {
                    Ok(_) => {
                        report.beverages_saved += 1;
                        true
                    }
                    Err(e) => {
                        warn!(beverage = %beverage, error = %e, "Save failed");
                        report
                            .errors
                            .push(SyncError::storage(format!("beverage {}", beverage), &e));
                        false
                    }
                }
            } else {
                false
            };

            self.events.emit_lossy(SyncEvent::BeverageEnriched {
                display_name: beverage.display_name.clone(),
                persisted,
            });
        }
    }

    /// Run every metadata source over one beverage
    ///
    /// Marks the beverage synced now if at least one source completed its
    /// attempt, match or not.
    pub async fn enrich(&self, beverage: &mut Beverage, errors: &mut Vec<SyncError>) {
        beverage.need_sync = false;
        let mut attempted = false;

        for entry in &self.metadata {
            entry.throttle.delay_invocation().await;
            match entry.source.fetch_metadata(beverage).await {
                Ok(()) => attempted = true,
                Err(e) if e.is_no_match() => {
                    info!(beverage = %beverage, source = %entry.name(), "{}", e);
                    attempted = true;
                }
                Err(e) => {
                    warn!(beverage = %beverage, source = %entry.name(), error = %e, "Metadata fetch failed");
                    errors.push(SyncError::Metadata {
                        beverage: beverage.display_name.clone(),
                        source_name: entry.name().to_string(),
                        error: e,
                    });
                }
            }
        }

        if attempted {
            beverage.sync_time = Some(self.clock.now());
            beverage.need_sync = true;
        }
    }
}

/// Single-worker sync loop with coalescing triggers
pub struct SyncOrchestrator {
    signal_tx: mpsc::Sender<()>,
    last_summary: Arc<RwLock<Option<PassSummary>>>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SyncOrchestrator {
    /// Start the worker task; it idles until the first trigger
    pub fn spawn(syncer: Syncer) -> Self {
        let (signal_tx, signal_rx) = mpsc::channel(1);
        let last_summary = Arc::new(RwLock::new(None));
        let cancel = CancellationToken::new();

        let worker = tokio::spawn(worker_loop(
            Arc::new(syncer),
            signal_rx,
            last_summary.clone(),
            cancel.clone(),
        ));

        Self {
            signal_tx,
            last_summary,
            cancel,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Request a sync pass
    ///
    /// Blocking: waits until the signal slot accepts the request (the pass
    /// may not have started yet). Non-blocking: drops the request if one is
    /// already pending. Returns whether the request was accepted.
    pub async fn trigger_sync(&self, blocking: bool) -> bool {
        info!(blocking, "Triggering beverage sync");
        if blocking {
            return self.signal_tx.send(()).await.is_ok();
        }
        match self.signal_tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => {
                debug!("Sync already pending, trigger coalesced");
                false
            }
            Err(TrySendError::Closed(())) => {
                warn!("Sync worker stopped, trigger ignored");
                false
            }
        }
    }

    /// Digest of the most recently finished pass
    pub async fn last_summary(&self) -> Option<PassSummary> {
        self.last_summary.read().await.clone()
    }

    /// Stop accepting passes; a running pass is allowed to finish
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!("Sync worker panicked: {}", e);
            }
        }
    }
}

async fn worker_loop(
    syncer: Arc<Syncer>,
    mut signal_rx: mpsc::Receiver<()>,
    last_summary: Arc<RwLock<Option<PassSummary>>>,
    cancel: CancellationToken,
) {
    debug!("Sync worker started");
    loop {
        let signal = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            signal = signal_rx.recv() => signal,
        };
        if signal.is_none() {
            break;
        }

        let report = syncer.sync().await;
        *last_summary.write().await = Some(report.summary());
    }
    info!("Sync worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> MenuProvider {
        MenuProvider::new("frisco", "Frisco Grille", "http://frisco", "json")
    }

    #[test]
    fn test_discovery_attribute_name() {
        assert_eq!(discovery_attribute("frisco"), "friscoMenuAt");
    }

    #[test]
    fn test_only_new_names_get_discovery_time() {
        let now = DateTime::parse_from_rfc3339("2024-03-01T18:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let prior = vec![Beverage::new("Pale Ale")];
        let mut menu = vec![Beverage::new("Pale Ale"), Beverage::new("Stout")];

        let discovered = set_beverage_discover_times(&provider(), &mut menu, &prior, now);

        assert_eq!(discovered, 1);
        assert_eq!(menu[0].attribute("friscoMenuAt"), "");
        assert_eq!(menu[1].attribute("friscoMenuAt"), "2024-03-01T18:00:00Z");
    }

    #[test]
    fn test_first_crawl_discovers_everything() {
        let mut menu = vec![Beverage::new("A"), Beverage::new("B")];
        let discovered =
            set_beverage_discover_times(&provider(), &mut menu, &[], bevly_common::time::now());
        assert_eq!(discovered, 2);
    }
}
