#![deny(clippy::dbg_macro)]
#![deny(clippy::todo)]
//! # repo-sync — multi-writer anti-entropy synchronization engine
//!
//! A content-addressed object repository needs a way for independent
//! writers to converge on the same set of objects without a central
//! coordinator. This crate implements the three-phase Interest/Data
//! protocol (sync, fetch, recovery) that lets each writer's local digest
//! tree reach agreement with its peers purely by exchanging compact root
//! digests and pulling whatever actions a digest mismatch reveals are
//! missing.
//!
//! ## Layout
//!
//! - [`identifiers`] — hierarchical names and digests
//! - [`action`] — the atomic unit of replication, `ActionEntry`
//! - [`tree`] — the in-memory digest tree (`SyncTree`)
//! - [`log`] — the append-only `ActionLog`
//! - [`store`] — durable `TreeStore` persistence
//! - [`wire`] — the `SyncWireMessage` codec
//! - [`pit`] — the pending Interest table
//! - [`snapshot`] — snapshot bootstrap and dedup
//! - [`net`], [`data_store`], [`validator`] — host collaborator traits
//! - [`command`] — the local command surface
//! - [`engine`] — `SyncEngine`, the protocol state machine
//! - [`config`] — runtime timing configuration
//! - [`errors`] — the crate's error taxonomy

pub mod action;
pub mod command;
pub mod config;
pub mod data_store;
pub mod engine;
pub mod errors;
pub mod identifiers;
pub mod log;
pub mod net;
pub mod pit;
pub mod prelude;
pub mod snapshot;
pub mod store;
#[cfg(feature = "test-support")]
pub mod testkit;
pub mod tree;
pub mod validator;
pub mod wire;

pub use engine::SyncEngine;
pub use errors::{Result, SyncError};
