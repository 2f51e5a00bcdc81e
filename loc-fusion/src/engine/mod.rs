//! Request-orchestration layer.
//!
//! Owns handler selection, one-shot fan-out/fan-in with partial-failure
//! composition, response-timeout enforcement, cache short-circuiting, and
//! the continuous-tracking sessions feeding the subscription layer. All
//! state in this layer is mutated only on the engine loop task.

mod keys;
mod orchestrator;
mod pending;
mod selection;
mod tracking;

pub use orchestrator::{
    EngineClosed, EngineCommand, EngineConfig, FusionEngine, FusionEngineHandle,
};
pub use selection::{
    accuracy_threshold_meters, select_providers, AccuracyLevel, HandlerSelector, PowerLevel,
    ResponseTimeLevel, ResponseTimeouts, MAXIMUM_AGE_ACCEPT_ANY, MAXIMUM_AGE_FORCE_FRESH,
};
