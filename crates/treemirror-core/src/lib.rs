//! TreeMirror Core - Domain types, configuration and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `TrackedObject`, the per-path record of a remote object
//! - **Port definitions** - Traits for adapters: `IRemoteBackend`, `INotificationSink`
//! - **Configuration** - Typed YAML configuration with validation and a builder
//!
//! # Architecture
//!
//! The domain module contains pure data types with no I/O.
//! Ports define trait interfaces that adapter crates implement
//! (`treemirror-remote` for the backend, `treemirror-sync` for console output).

pub mod config;
pub mod domain;
pub mod ports;
