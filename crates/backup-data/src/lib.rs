//! Parsing and folding layer for the backup monitor.
//!
//! Turns raw text handed over by the providers (service logs, directory
//! listings, object-storage listings, hypervisor configs, timer properties)
//! into typed records and folds them into run histories and reconciled,
//! costed inventories. Nothing in this crate spawns processes.

pub mod inventory;
pub mod log_parser;
pub mod reconcile;
pub mod runs;
pub mod timers;

pub use backup_core as core;
