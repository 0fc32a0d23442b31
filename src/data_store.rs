//! Data-store collaborator trait (C4): where the repository's actual
//! content-addressed objects live. The sync engine never reads or writes
//! object bytes itself — it only learns *that* an insertion or deletion
//! happened and asks this collaborator to apply it.

use crate::action::ActionEntry;
use crate::errors::Result;
use crate::identifiers::Name;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A data object's status as reported by [`DataStoreEffects::status`] and
/// [`DataStoreEffects::enumerate`], carried in a [`crate::wire::SnapshotAnnouncement`]
/// so a late joiner can reconcile the enumerated store state, not just the
/// tree's per-creator cursors (spec §4.5/§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataStatus {
    /// Not known to this store at all.
    None,
    /// Present, but not through this peer's own applied action history
    /// (e.g. pre-loaded before sync was wired up).
    Existed,
    /// Known, and removed by an applied deletion.
    Deleted,
    /// Known, and present through an applied insertion.
    Inserted,
}

/// Applies (or queries) the effect of an [`ActionEntry`] on the underlying
/// object repository.
#[async_trait]
pub trait DataStoreEffects: Send + Sync {
    /// Apply an already-validated action: insert or delete the referenced
    /// data object. Applying the same action twice must be a no-op.
    async fn apply(&self, action: &ActionEntry) -> Result<()>;

    /// Whether the data object named by `action` is currently present,
    /// used by the snapshot builder and by tests asserting convergence.
    async fn contains(&self, action: &ActionEntry) -> Result<bool>;

    /// Current status of a named data object, independent of any one
    /// action. Used by [`crate::snapshot::SnapshotBuilder`] to enumerate the
    /// store and by snapshot-response processing to decide whether a
    /// remotely-announced item needs fetching or local deletion.
    async fn status(&self, data_name: &Name) -> Result<DataStatus>;

    /// Materialize an object a peer's snapshot reports as present
    /// (`Existed` or `Inserted`) but this store doesn't have yet. Stands in
    /// for the spec's "express a normal data Interest to fetch" step,
    /// collapsed into the collaborator boundary the same way
    /// [`DataStoreEffects::apply`] already collapses an insertion's data
    /// fetch.
    async fn adopt(&self, data_name: &Name) -> Result<()>;

    /// Remove an object a peer's snapshot reports as `Deleted` but this
    /// store still has.
    async fn discard(&self, data_name: &Name) -> Result<()>;

    /// Every data object this store currently knows of (status other than
    /// `None`), for building a [`crate::wire::SnapshotAnnouncement`].
    async fn enumerate(&self) -> Result<Vec<(Name, DataStatus)>>;
}

#[async_trait]
impl<T: DataStoreEffects + ?Sized> DataStoreEffects for Arc<T> {
    async fn apply(&self, action: &ActionEntry) -> Result<()> {
        (**self).apply(action).await
    }

    async fn contains(&self, action: &ActionEntry) -> Result<bool> {
        (**self).contains(action).await
    }

    async fn status(&self, data_name: &Name) -> Result<DataStatus> {
        (**self).status(data_name).await
    }

    async fn adopt(&self, data_name: &Name) -> Result<()> {
        (**self).adopt(data_name).await
    }

    async fn discard(&self, data_name: &Name) -> Result<()> {
        (**self).discard(data_name).await
    }

    async fn enumerate(&self) -> Result<Vec<(Name, DataStatus)>> {
        (**self).enumerate().await
    }
}
