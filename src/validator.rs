//! Validation collaborator trait (C8's gatekeeper): decides whether a
//! fetched action or an incoming command is authentic before the engine
//! applies or executes it. Signing and key management live outside this
//! crate; the engine only ever asks "is this valid".

use crate::action::ActionEntry;
use crate::errors::{Result, SyncError};
use async_trait::async_trait;
use std::sync::Arc;

/// Authenticity gate for actions and command payloads.
#[async_trait]
pub trait Validator: Send + Sync {
    /// Validate a fetched action before it is applied to the data store
    /// and folded into the digest tree.
    async fn validate_action(&self, action: &ActionEntry) -> Result<()>;

    /// Validate a raw command parameter block before it is decoded and
    /// executed.
    async fn validate_command(&self, payload: &[u8]) -> Result<()>;
}

#[async_trait]
impl<T: Validator + ?Sized> Validator for Arc<T> {
    async fn validate_action(&self, action: &ActionEntry) -> Result<()> {
        (**self).validate_action(action).await
    }

    async fn validate_command(&self, payload: &[u8]) -> Result<()> {
        (**self).validate_command(payload).await
    }
}

/// A validator that accepts everything. Useful for tests and for local
/// deployments that trust every writer on the sync prefix implicitly.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllValidator;

#[async_trait]
impl Validator for AllowAllValidator {
    async fn validate_action(&self, _action: &ActionEntry) -> Result<()> {
        Ok(())
    }

    async fn validate_command(&self, _payload: &[u8]) -> Result<()> {
        Ok(())
    }
}

/// A validator that rejects every action/command whose `data_name`
/// (interpreted loosely as "signer" for the command case) is absent from
/// an allow-list. Useful in tests that want to exercise the
/// `SyncError::Validation` rejection path.
#[derive(Debug, Clone, Default)]
pub struct DenyUnlistedValidator {
    allowed: Vec<crate::identifiers::Name>,
}

impl DenyUnlistedValidator {
    pub fn new(allowed: Vec<crate::identifiers::Name>) -> Self {
        DenyUnlistedValidator { allowed }
    }
}

#[async_trait]
impl Validator for DenyUnlistedValidator {
    async fn validate_action(&self, action: &ActionEntry) -> Result<()> {
        if self.allowed.contains(&action.creator) {
            Ok(())
        } else {
            Err(SyncError::Validation(format!(
                "creator {} is not on the allow list",
                action.creator
            )))
        }
    }

    async fn validate_command(&self, _payload: &[u8]) -> Result<()> {
        Ok(())
    }
}
