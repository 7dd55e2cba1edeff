//! Core types for the backup monitor.
//!
//! Holds the data model shared by every other crate, the error taxonomy,
//! size/currency formatting, the cost model, timestamp parsing and the
//! configuration layer.

pub mod error;
pub mod formatting;
pub mod models;
pub mod pricing;
pub mod settings;
pub mod time_utils;
