//! FocusGate Persistence Layer
//!
//! Bridges the synchronous in-memory policy engine to an asynchronous
//! key-value backend. The engine stays the source of truth during a
//! session; this crate seeds it at startup and mirrors every mutation
//! back out, reporting write failures as a flag rather than an error.
//!
//! # Modules
//!
//! - `backend`: the async get/set/remove contract and an in-memory
//!   implementation
//! - `keys`: the persisted key layout
//! - `codec`: tolerant JSON decoding and canonical encoding
//! - `store`: the write-through `PolicyStore`

pub mod backend;
pub mod codec;
pub mod keys;
pub mod store;

pub use backend::{Backend, MemoryBackend};
pub use store::{PolicyStore, Receipt};
