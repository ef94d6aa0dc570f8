use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::store::{StoreError, SyncStore};

/// Post-walk identity reconciliation. A track flagged missing whose
/// persistent identity reappeared elsewhere after the scan started is the
/// same logical track at a new path: its annotations move to the new row and
/// the missing row is retired. Returns the number of reconciled tracks and
/// the album ids touched.
///
/// When several fresh candidates share one identity (duplicate content), the
/// most recently updated one wins. This is a heuristic, not a uniqueness
/// guarantee; the losers are simply left alone.
pub(crate) fn reconcile_library(
    store: &dyn SyncStore,
    library_id: &str,
    since: u64,
) -> Result<(usize, BTreeSet<String>), StoreError> {
    let groups = store.missing_with_candidates(library_id, since)?;
    let mut reconciled = 0usize;
    let mut album_ids = BTreeSet::new();

    for group in groups {
        let best = group
            .candidates
            .iter()
            .max_by(|a, b| {
                a.updated_at
                    .cmp(&b.updated_at)
                    .then_with(|| a.created_at.cmp(&b.created_at))
                    .then_with(|| a.id.cmp(&b.id))
            })
            .cloned();
        let Some(best) = best else { continue };

        debug!(
            from = %group.missing.path,
            to = %best.path,
            "reconciled moved track"
        );
        store.transfer_annotation(&group.missing.id, &best.id)?;
        store.delete_track(&group.missing.id)?;
        album_ids.insert(group.missing.album_id.clone());
        album_ids.insert(best.album_id.clone());
        reconciled += 1;
    }

    if reconciled > 0 {
        info!(count = reconciled, "reconciled moved tracks");
    }
    Ok((reconciled, album_ids))
}
