//! Observability layer.
//!
//! Canonical structured event names and field helpers used by every module.
//! Library code emits events and never initializes a global subscriber; the
//! daemon binary performs one-time `tracing_subscriber` initialization at the
//! process boundary.

pub mod events;
pub mod fields;
