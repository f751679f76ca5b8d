//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the sync engine
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IRemoteBackend`] - Remote object store operations (create, upload, update, delete)
//! - [`INotificationSink`] - User-facing notices about synchronized objects

pub mod notification;
pub mod remote_backend;

pub use notification::{INotificationSink, SyncNotice};
pub use remote_backend::{IRemoteBackend, RemoteParent};
