//! Change reconciliation.
//!
//! [`combine`] overlays the local change log onto the latest
//! authoritative server fetch. Records are joined on `guid`; the server
//! id is not stable across the local/server boundary.

use indexmap::IndexMap;

use crate::infrastructure::{ChangeType, Infrastructure, InfrastructureChange};
use crate::types::{Guid, Timestamp};

/// Merge `server_records` fetched at `fetched_at` with `local_changes`.
///
/// Changes are applied in the order given, so for any guid the last
/// applicable change wins. A successful change whose `updated` time
/// predates the fetch is skipped: the server data already reflects it.
///
/// Output order follows the server list, with records first introduced by
/// local changes appended in the order they were applied. The function is
/// pure; identical inputs always give identical output.
pub fn combine(
    server_records: &[Infrastructure],
    fetched_at: Timestamp,
    local_changes: &[InfrastructureChange],
) -> Vec<Infrastructure> {
    let mut by_guid: IndexMap<Guid, Infrastructure> = server_records
        .iter()
        .map(|record| (record.guid.clone(), record.clone()))
        .collect();

    for change in local_changes {
        if change.is_stale(fetched_at) {
            continue;
        }

        let guid = &change.infrastructure.guid;
        match change.change_type {
            ChangeType::Delete => {
                by_guid.shift_remove(guid);
            }
            ChangeType::Create | ChangeType::Update => {
                by_guid.insert(guid.clone(), change.infrastructure.clone());
            }
        }
    }

    by_guid.into_values().collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
