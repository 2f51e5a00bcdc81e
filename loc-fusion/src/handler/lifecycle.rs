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

//! Lifecycle manager owning provider start/stop, async issue bookkeeping and
//! the last-known-fix cache write-through.

use crate::error::{IssueError, StartFailure, StopError};
use crate::handler::snapshot::FixCacheSnapshot;
use crate::handler::state::HandlerState;
use crate::observability::{events, fields};
use crate::provider::{
    OperationKind, PositionProvider, ProviderKind, ProviderReply, ProviderRequest, ProviderSlot,
};
use crate::sample::PositionSample;
use crate::store::FixStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

const COMPONENT: &str = "handler_lifecycle";

/// Concrete provider instances, one per physical slot.
pub struct ProviderSet {
    pub gps: Arc<dyn PositionProvider>,
    pub network: Arc<dyn PositionProvider>,
    pub geocode: Arc<dyn PositionProvider>,
}

impl ProviderSet {
    fn provider(&self, slot: ProviderSlot) -> &Arc<dyn PositionProvider> {
        match slot {
            ProviderSlot::Gps => &self.gps,
            ProviderSlot::Network => &self.network,
            ProviderSlot::Geocode => &self.geocode,
        }
    }
}

/// Whether a provider callback was matched to live state or discarded.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ReplyDisposition {
    Accepted,
    Stale,
}

/// Owner of per-kind lifecycle state and the provider slot instances.
///
/// Two kinds can alias one slot (wifi/cell on the network handler); the
/// underlying driver is started when the first aliased kind starts and
/// stopped when the last one stops, the same refcount discipline the egress
/// pool applies to shared transports.
pub(crate) struct HandlerRegistry {
    providers: ProviderSet,
    states: HashMap<ProviderKind, HandlerState>,
    fix_store: Arc<dyn FixStore>,
    snapshot: FixCacheSnapshot,
    replies: UnboundedSender<ProviderReply>,
}

impl HandlerRegistry {
    pub(crate) fn new(
        providers: ProviderSet,
        fix_store: Arc<dyn FixStore>,
        snapshot: FixCacheSnapshot,
        replies: UnboundedSender<ProviderReply>,
    ) -> Self {
        let states = ProviderKind::ALL
            .into_iter()
            .map(|kind| (kind, HandlerState::default()))
            .collect();
        Self {
            providers,
            states,
            fix_store,
            snapshot,
            replies,
        }
    }

    /// Warms the in-memory cache and the shared snapshot from the store.
    pub(crate) async fn warm_cache(&mut self) {
        let persisted = self.fix_store.load().await;
        for (kind, sample) in &persisted {
            if let Some(state) = self.states.get_mut(kind) {
                state.last_fix = Some(*sample);
            }
        }
        self.snapshot.replace(persisted);
    }

    fn state(&self, kind: ProviderKind) -> &HandlerState {
        &self.states[&kind]
    }

    fn state_mut(&mut self, kind: ProviderKind) -> &mut HandlerState {
        self.states.get_mut(&kind).expect("state exists per kind")
    }

    fn slot_started_elsewhere(&self, kind: ProviderKind) -> bool {
        kind.slot()
            .kinds()
            .iter()
            .any(|other| *other != kind && self.states[other].started)
    }

    pub(crate) fn is_started(&self, kind: ProviderKind) -> bool {
        self.state(kind).started
    }

    pub(crate) fn in_flight(&self, kind: ProviderKind, operation: OperationKind) -> bool {
        self.state(kind).in_flight.contains(operation)
    }

    pub(crate) fn cached_fix(&self, kind: ProviderKind) -> Option<PositionSample> {
        self.state(kind).last_fix
    }

    /// Starts one kind, bringing the underlying driver up only when no
    /// aliased kind already holds the slot. Idempotent on a started kind.
    pub(crate) async fn start(&mut self, kind: ProviderKind) -> Result<(), StartFailure> {
        if self.state(kind).started {
            return Ok(());
        }

        if !self.slot_started_elsewhere(kind) {
            if let Err(err) = self.providers.provider(kind.slot()).start().await {
                warn!(
                    event = events::HANDLER_START_FAILED,
                    component = COMPONENT,
                    provider = kind.label(),
                    err = %err,
                    "provider start failed"
                );
                return Err(err);
            }
        }

        self.state_mut(kind).started = true;
        debug!(
            event = events::HANDLER_START_OK,
            component = COMPONENT,
            provider = kind.label(),
            "provider started"
        );
        Ok(())
    }

    /// Stops one kind. `force = false` refuses while any in-flight bit is
    /// set; `force = true` clears flags and bumps the generation so stale
    /// callbacks are dropped. Stopping an already-stopped kind is a no-op.
    pub(crate) async fn stop(&mut self, kind: ProviderKind, force: bool) -> Result<(), StopError> {
        if !self.state(kind).started {
            return Ok(());
        }

        let state = self.state_mut(kind);
        if !state.is_idle() {
            if !force {
                debug!(
                    event = events::HANDLER_STOP_REFUSED_BUSY,
                    component = COMPONENT,
                    provider = kind.label(),
                    in_flight = ?state.in_flight,
                    "stop refused while operations in flight"
                );
                return Err(StopError::Busy);
            }
            state.force_clear();
            warn!(
                event = events::HANDLER_FORCE_STOP,
                component = COMPONENT,
                provider = kind.label(),
                generation = state.generation,
                "force-stopped with operations in flight"
            );
        }
        state.started = false;

        if !self.slot_started_elsewhere(kind) {
            self.providers.provider(kind.slot()).stop().await;
        }
        debug!(
            event = events::HANDLER_STOP_OK,
            component = COMPONENT,
            provider = kind.label(),
            "provider stopped"
        );
        Ok(())
    }

    /// Issues one async operation. A duplicate of an outstanding kind is
    /// refused here without a second call reaching the backend.
    pub(crate) async fn issue(
        &mut self,
        kind: ProviderKind,
        operation: OperationKind,
    ) -> Result<(), IssueError> {
        // No wire method drives the NMEA/satellite classes yet; the bits
        // exist so force-stop semantics cover every operation class.
        if matches!(operation, OperationKind::GetNmea | OperationKind::GetSatellite) {
            return Err(IssueError::NotStarted);
        }

        let replies = self.replies.clone();
        let state = self.state_mut(kind);
        if let Err(err) = state.begin(operation) {
            if err == IssueError::Duplicate {
                debug!(
                    event = events::HANDLER_ISSUE_DUPLICATE,
                    component = COMPONENT,
                    provider = kind.label(),
                    operation = operation.label(),
                    "operation already in flight"
                );
            }
            return Err(err);
        }
        let request = ProviderRequest::new(kind, operation, state.generation, replies);

        let provider = self.providers.provider(kind.slot());
        match operation {
            OperationKind::GetPosition => provider.request_position(request).await,
            OperationKind::StartTracking => provider.request_tracking(request).await,
            OperationKind::GetNmea | OperationKind::GetSatellite => unreachable!(),
        }
        Ok(())
    }

    /// Matches one provider callback against live state. Stale generations
    /// are discarded; accepted success fixes overwrite the cache slot and
    /// are written through to the store.
    pub(crate) async fn on_reply(
        &mut self,
        kind: ProviderKind,
        operation: OperationKind,
        generation: u64,
        outcome: &Result<PositionSample, crate::error::ErrorCode>,
    ) -> ReplyDisposition {
        let state = self.state_mut(kind);
        if generation != state.generation || !state.started {
            warn!(
                event = events::HANDLER_REPLY_STALE_GENERATION,
                component = COMPONENT,
                provider = kind.label(),
                operation = operation.label(),
                generation,
                live_generation = state.generation,
                reason = fields::REASON_STALE_GENERATION,
                "discarding callback for stopped generation"
            );
            return ReplyDisposition::Stale;
        }

        if operation == OperationKind::GetPosition {
            state.finish(operation);
        }

        if let Ok(sample) = outcome {
            state.last_fix = Some(*sample);
            self.snapshot.record(kind, *sample);
            self.fix_store.persist(kind, *sample).await;
            debug!(
                event = events::HANDLER_FIX_CACHED,
                component = COMPONENT,
                provider = kind.label(),
                "fix cached and persisted"
            );
        }
        ReplyDisposition::Accepted
    }
}

#[cfg(test)]
mod tests {
    use super::{HandlerRegistry, ProviderSet, ReplyDisposition};
    use crate::error::{ErrorCode, IssueError, StartFailure, StopError};
    use crate::handler::snapshot::FixCacheSnapshot;
    use crate::provider::{
        OperationKind, PositionProvider, ProviderKind, ProviderReply, ProviderRequest,
    };
    use crate::sample::PositionSample;
    use crate::store::NullFixStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio::sync::mpsc::UnboundedReceiver;

    #[derive(Default)]
    struct CountingProvider {
        start_count: AtomicUsize,
        stop_count: AtomicUsize,
        position_count: AtomicUsize,
        tracking_count: AtomicUsize,
    }

    impl CountingProvider {
        fn starts(&self) -> usize {
            self.start_count.load(Ordering::Relaxed)
        }

        fn stops(&self) -> usize {
            self.stop_count.load(Ordering::Relaxed)
        }

        fn position_requests(&self) -> usize {
            self.position_count.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl PositionProvider for CountingProvider {
        async fn start(&self) -> Result<(), StartFailure> {
            self.start_count.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        async fn stop(&self) {
            self.stop_count.fetch_add(1, Ordering::Relaxed);
        }

        async fn request_position(&self, _request: ProviderRequest) {
            self.position_count.fetch_add(1, Ordering::Relaxed);
        }

        async fn request_tracking(&self, _request: ProviderRequest) {
            self.tracking_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    struct RefusingProvider;

    #[async_trait]
    impl PositionProvider for RefusingProvider {
        async fn start(&self) -> Result<(), StartFailure> {
            Err(StartFailure::Unavailable)
        }

        async fn stop(&self) {}

        async fn request_position(&self, _request: ProviderRequest) {}

        async fn request_tracking(&self, _request: ProviderRequest) {}
    }

    fn registry_with(
        gps: Arc<dyn PositionProvider>,
        network: Arc<dyn PositionProvider>,
    ) -> (HandlerRegistry, UnboundedReceiver<ProviderReply>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = HandlerRegistry::new(
            ProviderSet {
                gps,
                network,
                geocode: Arc::new(CountingProvider::default()),
            },
            Arc::new(NullFixStore),
            FixCacheSnapshot::default(),
            tx,
        );
        (registry, rx)
    }

    fn sample() -> PositionSample {
        PositionSample {
            timestamp_millis: 5_000,
            latitude: 37.39,
            longitude: -122.08,
            altitude: 0.0,
            speed: 0.0,
            direction: 0.0,
            horizontal_accuracy: 25.0,
            vertical_accuracy: 0.0,
        }
    }

    #[tokio::test]
    async fn aliased_kinds_share_one_driver_start() {
        let network = Arc::new(CountingProvider::default());
        let (mut registry, _rx) =
            registry_with(Arc::new(CountingProvider::default()), network.clone());

        registry.start(ProviderKind::WifiNetwork).await.unwrap();
        registry.start(ProviderKind::CellNetwork).await.unwrap();

        assert_eq!(network.starts(), 1);

        registry.stop(ProviderKind::WifiNetwork, false).await.unwrap();
        assert_eq!(network.stops(), 0);

        registry.stop(ProviderKind::CellNetwork, false).await.unwrap();
        assert_eq!(network.stops(), 1);
    }

    #[tokio::test]
    async fn duplicate_position_request_does_not_reach_backend_twice() {
        let gps = Arc::new(CountingProvider::default());
        let (mut registry, _rx) = registry_with(gps.clone(), Arc::new(CountingProvider::default()));
        registry.start(ProviderKind::Gps).await.unwrap();

        assert!(registry
            .issue(ProviderKind::Gps, OperationKind::GetPosition)
            .await
            .is_ok());
        assert_eq!(
            registry
                .issue(ProviderKind::Gps, OperationKind::GetPosition)
                .await,
            Err(IssueError::Duplicate)
        );

        assert_eq!(gps.position_requests(), 1);
    }

    #[tokio::test]
    async fn stop_refuses_busy_then_force_drops_late_callback() {
        let gps = Arc::new(CountingProvider::default());
        let (mut registry, _rx) = registry_with(gps.clone(), Arc::new(CountingProvider::default()));
        registry.start(ProviderKind::Gps).await.unwrap();
        registry
            .issue(ProviderKind::Gps, OperationKind::GetPosition)
            .await
            .unwrap();

        assert_eq!(
            registry.stop(ProviderKind::Gps, false).await,
            Err(StopError::Busy)
        );

        assert!(registry.stop(ProviderKind::Gps, true).await.is_ok());

        // The callback for the force-stopped generation must be discarded.
        let disposition = registry
            .on_reply(ProviderKind::Gps, OperationKind::GetPosition, 0, &Ok(sample()))
            .await;
        assert_eq!(disposition, ReplyDisposition::Stale);
        assert!(registry.cached_fix(ProviderKind::Gps).is_none());
    }

    #[tokio::test]
    async fn stop_on_stopped_provider_is_a_no_op() {
        let gps = Arc::new(CountingProvider::default());
        let (mut registry, _rx) = registry_with(gps.clone(), Arc::new(CountingProvider::default()));

        assert!(registry.stop(ProviderKind::Gps, false).await.is_ok());
        assert_eq!(gps.stops(), 0);
    }

    #[tokio::test]
    async fn start_failure_is_propagated_and_leaves_kind_stopped() {
        let (mut registry, _rx) =
            registry_with(Arc::new(RefusingProvider), Arc::new(CountingProvider::default()));

        assert!(registry.start(ProviderKind::Gps).await.is_err());
        assert!(!registry.is_started(ProviderKind::Gps));
    }

    #[tokio::test]
    async fn accepted_success_overwrites_cache_slot() {
        let (mut registry, _rx) = registry_with(
            Arc::new(CountingProvider::default()),
            Arc::new(CountingProvider::default()),
        );
        registry.start(ProviderKind::Gps).await.unwrap();
        registry
            .issue(ProviderKind::Gps, OperationKind::GetPosition)
            .await
            .unwrap();

        let disposition = registry
            .on_reply(ProviderKind::Gps, OperationKind::GetPosition, 0, &Ok(sample()))
            .await;

        assert_eq!(disposition, ReplyDisposition::Accepted);
        let cached = registry.cached_fix(ProviderKind::Gps).expect("fix cached");
        assert_eq!(cached.timestamp_millis, 5_000);
        assert!(!registry.in_flight(ProviderKind::Gps, OperationKind::GetPosition));
    }

    #[tokio::test]
    async fn failure_reply_clears_in_flight_without_caching() {
        let (mut registry, _rx) = registry_with(
            Arc::new(CountingProvider::default()),
            Arc::new(CountingProvider::default()),
        );
        registry.start(ProviderKind::Gps).await.unwrap();
        registry
            .issue(ProviderKind::Gps, OperationKind::GetPosition)
            .await
            .unwrap();

        let disposition = registry
            .on_reply(
                ProviderKind::Gps,
                OperationKind::GetPosition,
                0,
                &Err(ErrorCode::PosNotAvailable),
            )
            .await;

        assert_eq!(disposition, ReplyDisposition::Accepted);
        assert!(registry.cached_fix(ProviderKind::Gps).is_none());
        assert!(!registry.in_flight(ProviderKind::Gps, OperationKind::GetPosition));
    }
}
