//! Set reconciliation of one boolean status dimension.

use std::collections::HashSet;

/// Local changes needed to make one status flag match the remote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusDelta {
    /// Ids whose flag must be turned on locally
    pub to_set: HashSet<String>,
    /// Ids whose flag must be turned off locally
    pub to_clear: HashSet<String>,
}

impl StatusDelta {
    pub fn is_empty(&self) -> bool {
        self.to_set.is_empty() && self.to_clear.is_empty()
    }
}

/// Compare the remote flagged ids with the local ones.
///
/// Ids with an unpushed local change (`pending`) are taken out of the remote
/// set first, so a stale remote value never overrides a newer local write.
/// They are also never cleared locally, which covers the opposite direction
/// (a local "on" the remote has not seen yet). Applying the result and
/// reconciling again with unchanged inputs yields an empty delta.
pub fn reconcile(
    remote: &HashSet<String>,
    pending: &HashSet<String>,
    local: &HashSet<String>,
) -> StatusDelta {
    let effective: HashSet<&String> = remote.difference(pending).collect();

    let to_set = effective
        .iter()
        .filter(|id| !local.contains(id.as_str()))
        .map(|id| (*id).clone())
        .collect();
    let to_clear = local
        .iter()
        .filter(|id| !effective.contains(id) && !pending.contains(id.as_str()))
        .cloned()
        .collect();

    StatusDelta { to_set, to_clear }
}
