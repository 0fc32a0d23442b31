//! Network collaborator trait (C6): the engine's only window onto the
//! outside world. Expressing an Interest and publishing Data are both
//! fire-and-forget from the engine's point of view — the engine learns of
//! inbound Interests and Data exclusively through the `SyncEngine::on_*`
//! callbacks the host process drives.

use crate::errors::Result;
use crate::identifiers::Name;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Host-provided networking effects, the seam a real deployment swaps an
/// NDN forwarder face into and a test swaps an in-memory broadcast bus
/// into.
#[async_trait]
pub trait NetworkEffects: Send + Sync {
    /// Express an Interest for `name`, to be answered (or to time out)
    /// within `lifetime`.
    async fn express_interest(&self, name: Name, lifetime: Duration) -> Result<()>;

    /// Publish a Data packet named `name` with the given content, valid
    /// for `freshness` before a forwarder may evict it from its cache.
    async fn publish_data(&self, name: Name, content: Vec<u8>, freshness: Duration) -> Result<()>;
}

#[async_trait]
impl<T: NetworkEffects + ?Sized> NetworkEffects for Arc<T> {
    async fn express_interest(&self, name: Name, lifetime: Duration) -> Result<()> {
        (**self).express_interest(name, lifetime).await
    }

    async fn publish_data(&self, name: Name, content: Vec<u8>, freshness: Duration) -> Result<()> {
        (**self).publish_data(name, content, freshness).await
    }
}
