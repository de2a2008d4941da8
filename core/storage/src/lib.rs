//! Key-value store abstraction for SwitchVault.
//!
//! The vault core persists its whole state as one serialized value under a
//! single key. This module defines the store interface it consumes and two
//! implementations: an in-memory store (with an optional quota, for tests and
//! embedding) and a local-directory store.
//!
//! # Design Principles
//! - Whole-value reads and writes only; no partial records
//! - Async operations: all I/O is async
//! - Unified error semantics: every backend reports `StoreError`

pub mod local;
pub mod memory;
pub mod provider;

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use provider::KeyValueStore;
