//! Accuracy-ranked field fusion
//!
//! Merges an incoming, possibly partial snapshot of a beverage into the
//! stored record. The incoming snapshot's `accuracy_score` decides whether
//! it may overwrite populated fields:
//!
//! - `incoming >= stored`: every non-empty incoming field wins
//! - `incoming < stored`: incoming fields only fill empty stored fields
//!
//! Ratings are upserted by source and attributes are written per key no
//! matter the accuracy, since each source owns its own rating slot and
//! attribute namespace. Empty incoming values never replace anything.

use bevly_common::Beverage;
use tracing::trace;

/// Outcome of one merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FusionOutcome {
    /// Whether the incoming snapshot outranked the stored record
    pub overwrite: bool,
    /// Number of fields (including individual ratings/attributes) changed
    pub changed_fields: usize,
}

impl FusionOutcome {
    pub fn changed(&self) -> bool {
        self.changed_fields > 0
    }
}

/// Merge `incoming` into `stored` in place
///
/// On any change, raises `stored.accuracy_score` to the incoming score (never
/// lowers it) and sets `stored.need_sync`.
pub fn fuse(stored: &mut Beverage, incoming: &Beverage) -> FusionOutcome {
    let overwrite = incoming.accuracy_score >= stored.accuracy_score;
    let mut changed = 0;

    if let Some(sync_time) = incoming.sync_time {
        if stored.sync_time != Some(sync_time) {
            stored.sync_time = Some(sync_time);
            changed += 1;
        }
    }

    changed += merge_string(&mut stored.bev_type, &incoming.bev_type, overwrite) as usize;
    changed += merge_string(&mut stored.name, &incoming.name, overwrite) as usize;
    changed += merge_string(&mut stored.description, &incoming.description, overwrite) as usize;
    changed += merge_string(&mut stored.brewer, &incoming.brewer, overwrite) as usize;
    changed += merge_string(&mut stored.link, &incoming.link, overwrite) as usize;

    if incoming.abv > 0.0 && (overwrite || stored.abv <= 0.0) && stored.abv != incoming.abv {
        stored.abv = incoming.abv;
        changed += 1;
    }

    for rating in &incoming.ratings {
        if stored.add_rating(rating.clone()) {
            changed += 1;
        }
    }

    for (key, value) in &incoming.attributes {
        if value.is_empty() || stored.attributes.get(key) == Some(value) {
            continue;
        }
        stored.attributes.insert(key.clone(), value.clone());
        changed += 1;
    }

    if changed > 0 {
        stored.accuracy_score = stored.accuracy_score.max(incoming.accuracy_score);
        stored.need_sync = true;
    }

    trace!(
        beverage = %stored.display_name,
        overwrite,
        changed_fields = changed,
        "Fused snapshot"
    );

    FusionOutcome {
        overwrite,
        changed_fields: changed,
    }
}

/// Returns true if `stored` changed
fn merge_string(stored: &mut String, incoming: &str, overwrite: bool) -> bool {
    if incoming.is_empty() || stored == incoming {
        return false;
    }
    if overwrite || stored.is_empty() {
        *stored = incoming.to_string();
        return true;
    }
    false
}
