//! Periodic removal of stale unreferenced beverages

use crate::repository::Repository;
use bevly_common::events::{EventBus, SyncEvent};
use bevly_common::Result;
use std::sync::Arc;
use tracing::{info, warn};

pub struct GarbageCollector {
    repo: Arc<dyn Repository>,
    events: EventBus,
}

impl GarbageCollector {
    pub fn new(repo: Arc<dyn Repository>, events: EventBus) -> Self {
        Self { repo, events }
    }

    /// One sweep; the discard rule itself lives in the repository's policy
    pub async fn sweep(&self) -> Result<u64> {
        match self.repo.garbage_collect().await {
            Ok(removed) => {
                info!(removed, "Garbage collection sweep complete");
                self.events.emit_lossy(SyncEvent::GarbageCollected { removed });
                Ok(removed)
            }
            Err(e) => {
                warn!(error = %e, "Garbage collection sweep failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::SyncPolicy;
    use crate::repository::MemoryRepository;
    use bevly_common::time::{days, ManualClock};
    use bevly_common::Beverage;

    #[tokio::test]
    async fn test_sweep_reports_removed_count() {
        let clock = ManualClock::default();
        let policy = SyncPolicy::new(days(3), days(35), Arc::new(clock.clone())).unwrap();
        let repo = Arc::new(MemoryRepository::new(policy));
        repo.save_beverage(&Beverage::new("Orphan")).await.unwrap();

        let events = EventBus::new(10);
        let mut rx = events.subscribe();
        let gc = GarbageCollector::new(repo.clone(), events);

        clock.advance(days(36));
        assert_eq!(gc.sweep().await.unwrap(), 1);
        assert_eq!(
            rx.recv().await.unwrap(),
            SyncEvent::GarbageCollected { removed: 1 }
        );
    }
}
