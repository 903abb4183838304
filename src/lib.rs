//! Local-first synchronization core for a terminal task-management client.
//!
//! The crate mediates between an in-memory view model, a durable SQLite
//! cache, and a remote HTTP API: every edit applies instantly, survives
//! restarts, and is eventually reconciled with the server.

pub mod background;
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod flusher;
pub mod logging;
pub mod mutation;
pub mod remote;
pub mod repository;
pub mod store;

pub use error::CoreError;
