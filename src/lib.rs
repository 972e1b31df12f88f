//! Order and inventory consistency engine for an olive-oil shop.
//!
//! Checkout validates every line against the catalog before reserving stock
//! with conditional decrements. Orders then move through a fixed status
//! machine; payment reports drive the one automatic transition. Cancellation
//! returns stock exactly once, and a public tracking view is projected from
//! the stored timestamps.

pub mod config;
pub mod domain;
pub mod messaging;
pub mod metrics;
pub mod store;
pub mod utils;
