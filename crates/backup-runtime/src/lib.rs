//! Runtime layer for the backup monitor.
//!
//! Owns every side effect: subprocess execution with deadlines, the provider
//! implementations built on it, and the concurrent assembly of dashboard
//! snapshots.

pub mod command;
pub mod dashboard;
pub mod providers;

pub use backup_core as core;
pub use backup_data as data;
