/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! # loc-fusion
//!
//! `loc-fusion` is the core of an on-device location-fusion daemon: it
//! accepts position requests and tracking subscriptions, selects which
//! backend position source(s) to invoke from accuracy/power/response-time
//! criteria, fans requests out to asynchronous sources, fans the replies
//! back in under partial-failure and multi-subscriber conditions, enforces
//! response timeouts, and throttles continuous update delivery per
//! subscriber by interval and distance moved.
//!
//! Typical usage is API-first and centered on [`FusionEngine`] and the
//! [`PositionProvider`] / [`ReplySink`] / [`FixStore`] boundary traits the
//! embedding daemon implements.
//!
//! ```
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use loc_fusion::{
//!     ClientHandle, EngineCommand, EngineConfig, FusionEngine, PositionProvider,
//!     ProviderRequest, ProviderSet, Reply, ReplySink, StartFailure, NullFixStore,
//! };
//!
//! struct IdleProvider;
//!
//! #[async_trait]
//! impl PositionProvider for IdleProvider {
//!     async fn start(&self) -> Result<(), StartFailure> { Ok(()) }
//!     async fn stop(&self) {}
//!     async fn request_position(&self, _request: ProviderRequest) {}
//!     async fn request_tracking(&self, _request: ProviderRequest) {}
//! }
//!
//! struct DropSink;
//!
//! #[async_trait]
//! impl ReplySink for DropSink {
//!     async fn deliver(&self, _client: ClientHandle, _reply: Reply) {}
//! }
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let providers = ProviderSet {
//!     gps: Arc::new(IdleProvider),
//!     network: Arc::new(IdleProvider),
//!     geocode: Arc::new(IdleProvider),
//! };
//! let (engine, handle) = FusionEngine::new(
//!     providers,
//!     Arc::new(NullFixStore),
//!     Arc::new(DropSink),
//!     EngineConfig::default(),
//! );
//! tokio::spawn(engine.run());
//!
//! handle
//!     .submit(EngineCommand::CancelClient { client: ClientHandle::new(1) })
//!     .expect("engine accepts commands");
//! # });
//! ```
//!
//! ## Internal architecture map
//!
//! - Engine: handler selection, one-shot fan-out/fan-in, response timers,
//!   cache short-circuiting, tracking sessions
//! - Handler layer: per-source lifecycle, in-flight bookkeeping, generation
//!   counters, last-known-fix cache write-through
//! - Subscription layer: per-key subscriber sets, one-shot drain,
//!   criteria-based interval/distance throttling
//! - Geofence registry: arena-style id pool and boundary transitions
//!
//! ## Concurrency model
//!
//! All engine state lives on a single loop task. Provider drivers may run
//! their own worker threads but deliver results only through the channel
//! capability handed to them at issue time; force-stopped generations are
//! dropped mechanically at the loop boundary.
//!
//! ## Observability model
//!
//! The workspace uses `tracing` for logs/events. Library code emits
//! events/spans and does not initialize a global subscriber; binaries are
//! responsible for one-time `tracing_subscriber` initialization at process
//! boundaries.

mod engine;
mod error;
mod geofence;
mod handler;
#[doc(hidden)]
pub mod observability;
mod provider;
mod reply;
mod sample;
mod state;
mod store;
mod subscription;

pub use engine::{
    accuracy_threshold_meters, select_providers, AccuracyLevel, EngineClosed, EngineCommand,
    EngineConfig, FusionEngine, FusionEngineHandle, HandlerSelector, PowerLevel,
    ResponseTimeLevel, ResponseTimeouts, MAXIMUM_AGE_ACCEPT_ANY, MAXIMUM_AGE_FORCE_FRESH,
};
pub use error::{ErrorCode, IssueError, StartFailure, StopError};
pub use geofence::GeofenceTransition;
pub use handler::lifecycle::ProviderSet;
pub use handler::snapshot::FixCacheSnapshot;
pub use provider::{
    OperationKind, PositionProvider, ProviderKind, ProviderMask, ProviderOutcome, ProviderReply,
    ProviderRequest,
};
pub use reply::{ClientHandle, Reply, ReplySink};
pub use sample::PositionSample;
pub use state::{ConnectivityState, SourceAvailability, StateHandler};
pub use store::{FixStore, NullFixStore};
pub use subscription::SubscriptionKey;
