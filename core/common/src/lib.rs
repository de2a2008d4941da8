//! Common utilities and types shared across SwitchVault modules.
//!
//! This module provides the error taxonomy and the identifier and timestamp
//! types used by every other crate in the workspace.

pub mod error;
pub mod types;

pub use error::{Error, Result, StoreError};
pub use types::{local_now, AccountId, SiteId, Timestamp};
