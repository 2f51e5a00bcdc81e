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

//! The fusion engine: a single-threaded event loop owning all orchestration
//! state, fed by bus commands, provider callbacks and timer firings.

use crate::engine::keys;
use crate::engine::pending::{PendingRequest, PendingTable, ResolutionCause};
use crate::engine::selection::{
    accuracy_threshold_meters, select_providers, AccuracyLevel, HandlerSelector, PowerLevel,
    ResponseTimeLevel, ResponseTimeouts, MAXIMUM_AGE_ACCEPT_ANY, MAXIMUM_AGE_FORCE_FRESH,
};
use crate::engine::tracking::TrackingSession;
use crate::error::{ErrorCode, IssueError};
use crate::geofence::GeofenceTable;
use crate::handler::lifecycle::{HandlerRegistry, ProviderSet, ReplyDisposition};
use crate::handler::snapshot::FixCacheSnapshot;
use crate::observability::events;
use crate::observability::fields;
use crate::provider::{OperationKind, ProviderKind, ProviderMask, ProviderReply};
use crate::reply::{ClientHandle, Reply, ReplySink};
use crate::sample::PositionSample;
use crate::state::{ConnectivityState, SourceAvailability, StateHandler};
use crate::store::FixStore;
use crate::subscription::criteria::{CriteriaFilter, CriteriaUpdateResult};
use crate::subscription::multiplexer::SubscriptionMultiplexer;
use crate::subscription::SubscriptionKey;
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

const COMPONENT: &str = "fusion_engine";

/// Engine tuning knobs. Defaults match production behavior; tests shrink the
/// deadlines.
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    pub response_timeouts: ResponseTimeouts,
    /// Publish-rate cap for the plain tracking stream after the first fix.
    pub tracking_publish_interval: Duration,
    /// Accuracy floor the first tracking fix must meet.
    pub tracking_min_accuracy_meters: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            response_timeouts: ResponseTimeouts::default(),
            tracking_publish_interval: Duration::from_secs(60),
            tracking_min_accuracy_meters: 100.0,
        }
    }
}

/// Inbound API surface of the engine, one variant per bus method plus the
/// platform-driven state updates.
#[derive(Debug)]
pub enum EngineCommand {
    GetCurrentPosition {
        client: ClientHandle,
        accuracy: Option<AccuracyLevel>,
        response_time: Option<ResponseTimeLevel>,
        maximum_age: Option<i64>,
    },
    StartTracking {
        client: ClientHandle,
        persistent: bool,
    },
    GetLocationUpdates {
        client: ClientHandle,
        selector: HandlerSelector,
        minimum_interval: Duration,
        minimum_distance_meters: f64,
        response_timeout: Option<Duration>,
        persistent: bool,
    },
    StartTrackingCriteriaBased {
        client: ClientHandle,
        selector: Option<HandlerSelector>,
        accuracy: Option<AccuracyLevel>,
        power: Option<PowerLevel>,
        minimum_interval: Duration,
        minimum_distance_meters: f64,
        persistent: bool,
    },
    SetState {
        client: ClientHandle,
        handler: StateHandler,
        enabled: bool,
    },
    GetState {
        client: ClientHandle,
        handler: StateHandler,
        persistent: bool,
    },
    AddGeofenceArea {
        client: ClientHandle,
        latitude: f64,
        longitude: f64,
        radius_meters: f64,
        persistent: bool,
    },
    RemoveGeofenceArea {
        client: ClientHandle,
        geofence_id: u32,
    },
    SetConnectivity {
        wifi_available: bool,
        data_available: bool,
    },
    /// Transport-level disconnect or explicit unsubscribe.
    CancelClient { client: ClientHandle },
}

pub(crate) enum EngineEvent {
    Command(EngineCommand),
    TimerFired { timer_id: u64 },
}

/// The engine loop has shut down and no longer accepts commands.
#[derive(Debug)]
pub struct EngineClosed;

impl Display for EngineClosed {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "fusion engine loop has shut down")
    }
}

impl Error for EngineClosed {}

/// Cloneable command submitter held by the bus layer.
#[derive(Clone)]
pub struct FusionEngineHandle {
    commands: UnboundedSender<EngineEvent>,
}

impl FusionEngineHandle {
    pub fn submit(&self, command: EngineCommand) -> Result<(), EngineClosed> {
        self.commands
            .send(EngineEvent::Command(command))
            .map_err(|_| EngineClosed)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// The request orchestration and subscription-multiplexing engine.
///
/// All collections are owned by the loop task and mutated without locks; the
/// only cross-thread boundaries are the command mailbox, the provider reply
/// channel and the timer tasks feeding back into the mailbox.
pub struct FusionEngine {
    handlers: HandlerRegistry,
    pending: PendingTable,
    multiplexer: SubscriptionMultiplexer,
    criteria: CriteriaFilter,
    tracking: TrackingSession,
    geofences: GeofenceTable,
    availability: SourceAvailability,
    connectivity: ConnectivityState,
    config: EngineConfig,
    sink: Arc<dyn ReplySink>,
    snapshot: FixCacheSnapshot,
    events_tx: UnboundedSender<EngineEvent>,
    events_rx: UnboundedReceiver<EngineEvent>,
    provider_rx: UnboundedReceiver<ProviderReply>,
    /// First-fix deadline timers for update subscriptions.
    update_deadlines: Vec<(u64, ClientHandle)>,
    next_timer_id: u64,
}

impl FusionEngine {
    pub fn new(
        providers: ProviderSet,
        fix_store: Arc<dyn FixStore>,
        sink: Arc<dyn ReplySink>,
        config: EngineConfig,
    ) -> (Self, FusionEngineHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (provider_tx, provider_rx) = mpsc::unbounded_channel();
        let snapshot = FixCacheSnapshot::default();
        let handlers =
            HandlerRegistry::new(providers, fix_store, snapshot.clone(), provider_tx);

        let engine = Self {
            handlers,
            pending: PendingTable::default(),
            multiplexer: SubscriptionMultiplexer::default(),
            criteria: CriteriaFilter::default(),
            tracking: TrackingSession::new(
                config.tracking_min_accuracy_meters,
                config.tracking_publish_interval,
            ),
            geofences: GeofenceTable::default(),
            availability: SourceAvailability::default(),
            connectivity: ConnectivityState::default(),
            config,
            sink,
            snapshot,
            events_tx: events_tx.clone(),
            events_rx,
            provider_rx,
            update_deadlines: Vec::new(),
            next_timer_id: 0,
        };
        let handle = FusionEngineHandle {
            commands: events_tx,
        };
        (engine, handle)
    }

    /// Shared cached-fix view for answering `getCachedPosition` without a
    /// loop round-trip.
    pub fn fix_cache(&self) -> FixCacheSnapshot {
        self.snapshot.clone()
    }

    /// Runs the engine loop for the life of the service.
    pub async fn run(mut self) {
        self.handlers.warm_cache().await;
        info!(
            event = events::ENGINE_STARTED,
            component = COMPONENT,
            "fusion engine loop running"
        );
        loop {
            tokio::select! {
                event = self.events_rx.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
                reply = self.provider_rx.recv() => match reply {
                    Some(reply) => self.on_provider_reply(reply).await,
                    None => break,
                },
            }
        }
        info!(
            event = events::ENGINE_STOPPED,
            component = COMPONENT,
            "fusion engine loop stopped"
        );
    }

    async fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Command(command) => self.handle_command(command).await,
            EngineEvent::TimerFired { timer_id } => self.on_timer(timer_id).await,
        }
    }

    async fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::GetCurrentPosition {
                client,
                accuracy,
                response_time,
                maximum_age,
            } => {
                self.get_current_position(client, accuracy, response_time, maximum_age)
                    .await
            }
            EngineCommand::StartTracking { client, persistent } => {
                self.start_tracking(client, persistent).await
            }
            EngineCommand::GetLocationUpdates {
                client,
                selector,
                minimum_interval,
                minimum_distance_meters,
                response_timeout,
                persistent,
            } => {
                self.register_update_subscription(
                    client,
                    keys::updates_key(selector),
                    selector,
                    minimum_interval,
                    minimum_distance_meters,
                    response_timeout,
                    persistent,
                )
                .await
            }
            EngineCommand::StartTrackingCriteriaBased {
                client,
                selector,
                accuracy,
                power,
                minimum_interval,
                minimum_distance_meters,
                persistent,
            } => {
                let selector = Self::criteria_selector(selector, accuracy, power);
                self.register_update_subscription(
                    client,
                    keys::criteria_key(selector),
                    selector,
                    minimum_interval,
                    minimum_distance_meters,
                    None,
                    persistent,
                )
                .await
            }
            EngineCommand::SetState {
                client,
                handler,
                enabled,
            } => self.set_state(client, handler, enabled).await,
            EngineCommand::GetState {
                client,
                handler,
                persistent,
            } => self.get_state(client, handler, persistent).await,
            EngineCommand::AddGeofenceArea {
                client,
                latitude,
                longitude,
                radius_meters,
                persistent,
            } => {
                self.add_geofence(client, latitude, longitude, radius_meters, persistent)
                    .await
            }
            EngineCommand::RemoveGeofenceArea {
                client,
                geofence_id,
            } => self.remove_geofence(client, geofence_id).await,
            EngineCommand::SetConnectivity {
                wifi_available,
                data_available,
            } => {
                self.connectivity = ConnectivityState {
                    wifi_available,
                    data_available,
                };
            }
            EngineCommand::CancelClient { client } => self.cancel_client(client).await,
        }
    }

    // ---- one-shot position requests ------------------------------------

    async fn get_current_position(
        &mut self,
        client: ClientHandle,
        accuracy: Option<AccuracyLevel>,
        response_time: Option<ResponseTimeLevel>,
        maximum_age: Option<i64>,
    ) {
        if let Some(sample) = self.cache_match(accuracy, maximum_age) {
            debug!(
                event = events::REQUEST_CACHE_HIT,
                component = COMPONENT,
                client = %client,
                sample = %fields::format_sample(&sample),
                "served from cache"
            );
            self.sink.deliver(client, Reply::Position(sample)).await;
            return;
        }

        if self.availability.all_off() {
            self.reject(client, ErrorCode::LocationOff).await;
            return;
        }

        let selected = select_providers(accuracy, response_time);
        let (usable, rejection) = self.usable_mask(selected);
        if usable.is_empty() {
            self.reject(client, rejection.unwrap_or(ErrorCode::UnknownError))
                .await;
            return;
        }

        let (started, start_failure) = self.fan_out(usable, OperationKind::GetPosition).await;
        if started.is_empty() {
            self.reject(client, start_failure.unwrap_or(ErrorCode::UnknownError))
                .await;
            return;
        }

        let deadline = self
            .config
            .response_timeouts
            .deadline(accuracy, response_time);
        let timer_id = self.arm_timer(deadline);
        self.pending.insert(PendingRequest {
            client,
            providers: started,
            timer_id,
            created_at: Instant::now(),
        });
        debug!(
            event = events::REQUEST_FAN_OUT,
            component = COMPONENT,
            client = %client,
            providers = %fields::format_mask(started),
            deadline_ms = deadline.as_millis() as u64,
            "request fanned out"
        );
    }

    /// Cache short-circuit: the best cached fix meeting the accuracy
    /// threshold and, unless the accept-any sentinel is given, the age
    /// bound. A missing or force-fresh `maximumAge` disables the cache.
    fn cache_match(
        &self,
        accuracy: Option<AccuracyLevel>,
        maximum_age: Option<i64>,
    ) -> Option<PositionSample> {
        let age = maximum_age?;
        if age == MAXIMUM_AGE_FORCE_FRESH {
            return None;
        }
        let threshold = accuracy_threshold_meters(accuracy);
        let now = now_millis();
        let mut best: Option<PositionSample> = None;
        for kind in ProviderKind::ALL {
            let Some(sample) = self.handlers.cached_fix(kind) else {
                continue;
            };
            if sample.horizontal_accuracy > threshold {
                continue;
            }
            if age != MAXIMUM_AGE_ACCEPT_ANY && sample.age_millis(now) > age.unsigned_abs() * 1000 {
                continue;
            }
            let better = match best {
                Some(current) => sample.horizontal_accuracy < current.horizontal_accuracy,
                None => true,
            };
            if better {
                best = Some(sample);
            }
        }
        best
    }

    /// Filters a selected mask down to kinds that are enabled and whose
    /// connectivity precondition holds. When nothing survives, composes the
    /// rejection code from what was missing.
    fn usable_mask(&self, selected: ProviderMask) -> (ProviderMask, Option<ErrorCode>) {
        let mut usable = ProviderMask::EMPTY;
        for kind in selected.iter() {
            if self.availability.allows(kind) && self.connectivity.satisfied_for(kind) {
                usable.insert(kind);
            }
        }
        if !usable.is_empty() {
            return (usable, None);
        }

        let all_disabled = selected.iter().all(|kind| !self.availability.allows(kind));
        let code = if all_disabled {
            ErrorCode::LocationOff
        } else if selected.contains(ProviderKind::WifiNetwork) && !self.connectivity.wifi_available
        {
            ErrorCode::WifiConnectionOff
        } else {
            ErrorCode::DataConnectionOff
        };
        (usable, Some(code))
    }

    /// Starts and issues one operation on every usable provider, returning
    /// the mask of providers actually carrying the request and the first
    /// start-failure code for rejection composition. A duplicate issue
    /// rides the outstanding backend call.
    async fn fan_out(
        &mut self,
        usable: ProviderMask,
        operation: OperationKind,
    ) -> (ProviderMask, Option<ErrorCode>) {
        let mut started = ProviderMask::EMPTY;
        let mut start_failure = None;
        for kind in usable.iter() {
            match self.handlers.start(kind).await {
                Ok(()) => {}
                Err(err) => {
                    start_failure.get_or_insert(err.error_code());
                    continue;
                }
            }
            match self.handlers.issue(kind, operation).await {
                Ok(()) | Err(IssueError::Duplicate) => started.insert(kind),
                Err(_) => {
                    let _ = self.handlers.stop(kind, false).await;
                }
            }
        }
        (started, start_failure)
    }

    async fn reject(&mut self, client: ClientHandle, code: ErrorCode) {
        warn!(
            event = events::REQUEST_REJECTED,
            component = COMPONENT,
            client = %client,
            err = %code,
            "request rejected"
        );
        self.sink.deliver(client, Reply::Failure(code)).await;
    }

    // ---- provider callbacks --------------------------------------------

    async fn on_provider_reply(&mut self, reply: ProviderReply) {
        let ProviderReply {
            kind,
            operation,
            generation,
            outcome,
        } = reply;
        let disposition = self
            .handlers
            .on_reply(kind, operation, generation, &outcome)
            .await;
        if disposition == ReplyDisposition::Stale {
            return;
        }

        match operation {
            OperationKind::GetPosition => self.resolve_pending(kind, &outcome).await,
            OperationKind::StartTracking => self.on_tracking_update(kind, &outcome).await,
            OperationKind::GetNmea | OperationKind::GetSatellite => {}
        }
    }

    async fn resolve_pending(
        &mut self,
        kind: ProviderKind,
        outcome: &Result<PositionSample, ErrorCode>,
    ) {
        // The provider's one-shot duty is done; stop falls through as Busy
        // while a tracking stream still holds the handler.
        let _ = self.handlers.stop(kind, false).await;

        let resolutions = self.pending.on_provider_outcome(kind, outcome.is_ok());
        for resolution in resolutions {
            let reply = match (resolution.cause, outcome) {
                (ResolutionCause::Success, Ok(sample)) => Reply::Position(*sample),
                _ => Reply::Failure(ErrorCode::PosNotAvailable),
            };
            debug!(
                event = events::REQUEST_REPLY_SENT,
                component = COMPONENT,
                client = %resolution.client,
                provider = kind.label(),
                success = !reply.is_failure(),
                "one-shot reply sent"
            );
            self.sink.deliver(resolution.client, reply).await;
        }
    }

    async fn on_tracking_update(
        &mut self,
        kind: ProviderKind,
        outcome: &Result<PositionSample, ErrorCode>,
    ) {
        let now = Instant::now();
        match outcome {
            Ok(sample) => {
                if self.tracking.is_active() && self.tracking.providers.contains(kind) {
                    if self.tracking.throttle.admit(sample, now) {
                        let key = keys::start_tracking_key();
                        let publish = self
                            .multiplexer
                            .publish(&key, &Reply::Position(*sample), self.sink.as_ref())
                            .await;
                        debug!(
                            event = events::TRACKING_PUBLISH,
                            component = COMPONENT,
                            provider = kind.label(),
                            delivered = publish.delivered,
                            "tracking fix published"
                        );
                        if publish.emptied {
                            self.release_unneeded().await;
                        }
                    } else {
                        debug!(
                            event = events::TRACKING_THROTTLED,
                            component = COMPONENT,
                            provider = kind.label(),
                            "tracking fix withheld"
                        );
                    }
                }

                let result = self
                    .criteria
                    .on_raw_update(kind, outcome, now, self.sink.as_ref())
                    .await;
                self.apply_criteria_result(result).await;

                if kind == ProviderKind::Gps {
                    let transitions = self.geofences.on_fix(sample);
                    for (id, transition) in transitions {
                        info!(
                            event = events::GEOFENCE_TRANSITION,
                            component = COMPONENT,
                            geofence_id = id,
                            transition = ?transition,
                            "fence boundary crossed"
                        );
                        let key = keys::geofence_key(id);
                        self.multiplexer
                            .publish(&key, &Reply::GeofenceEvent { id, transition }, self.sink.as_ref())
                            .await;
                    }
                }
            }
            Err(code) => {
                warn!(
                    event = events::TRACKING_SOURCE_LOST,
                    component = COMPONENT,
                    provider = kind.label(),
                    err = %code,
                    "tracking source failed"
                );
                if self.tracking.is_active() && self.tracking.providers.contains(kind) {
                    let session_over = self.tracking.source_lost(kind);
                    if session_over {
                        let key = keys::start_tracking_key();
                        self.multiplexer
                            .broadcast_and_clear(&key, &Reply::Failure(*code), self.sink.as_ref())
                            .await;
                        self.tracking.end();
                    }
                }

                let result = self
                    .criteria
                    .on_raw_update(kind, outcome, now, self.sink.as_ref())
                    .await;
                self.apply_criteria_result(result).await;

                let _ = self.handlers.stop(kind, true).await;
                self.release_unneeded().await;
            }
        }
    }

    async fn apply_criteria_result(&mut self, result: CriteriaUpdateResult) {
        if result.session_failed || !result.emptied_keys.is_empty() {
            self.release_unneeded().await;
        }
    }

    // ---- timers ---------------------------------------------------------

    fn arm_timer(&mut self, duration: Duration) -> u64 {
        let timer_id = self.next_timer_id;
        self.next_timer_id += 1;
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = events.send(EngineEvent::TimerFired { timer_id });
        });
        timer_id
    }

    async fn on_timer(&mut self, timer_id: u64) {
        if let Some(entry) = self.pending.take_by_timer(timer_id) {
            warn!(
                event = events::REQUEST_TIMEOUT,
                component = COMPONENT,
                client = %entry.client,
                providers = %fields::format_mask(entry.providers),
                "response deadline elapsed"
            );
            for kind in entry.providers.iter() {
                if !self.provider_needed(kind) {
                    let _ = self.handlers.stop(kind, true).await;
                }
            }
            self.sink
                .deliver(entry.client, Reply::Failure(ErrorCode::TimeOut))
                .await;
            return;
        }

        if let Some(index) = self
            .update_deadlines
            .iter()
            .position(|(id, _)| *id == timer_id)
        {
            let (_, client) = self.update_deadlines.remove(index);
            if self.criteria.has_undelivered(client) {
                self.criteria.cancel(client);
                self.sink
                    .deliver(client, Reply::Failure(ErrorCode::TimeOut))
                    .await;
                self.release_unneeded().await;
            }
            return;
        }

        debug!(
            event = events::REQUEST_TIMER_STALE,
            component = COMPONENT,
            timer_id,
            "timer fired for already-resolved request"
        );
    }

    // ---- continuous tracking -------------------------------------------

    async fn start_tracking(&mut self, client: ClientHandle, persistent: bool) {
        if self.availability.all_off() {
            self.reject(client, ErrorCode::LocationOff).await;
            return;
        }
        let (usable, rejection) = self.usable_mask(select_providers(None, None));
        if usable.is_empty() {
            self.reject(client, rejection.unwrap_or(ErrorCode::UnknownError))
                .await;
            return;
        }

        let (started, start_failure) = self.fan_out(usable, OperationKind::StartTracking).await;
        if started.is_empty() {
            self.reject(client, start_failure.unwrap_or(ErrorCode::UnknownError))
                .await;
            return;
        }
        self.tracking.add_providers(started);

        let key = keys::start_tracking_key();
        if self.multiplexer.subscribe(&key, client, persistent).is_err() {
            self.reject(client, ErrorCode::InvalidInput).await;
            self.release_unneeded().await;
            return;
        }
        info!(
            event = events::TRACKING_STARTED,
            component = COMPONENT,
            client = %client,
            providers = %fields::format_mask(started),
            "tracking subscription added"
        );
    }

    #[allow(clippy::too_many_arguments)]
    async fn register_update_subscription(
        &mut self,
        client: ClientHandle,
        key: SubscriptionKey,
        selector: HandlerSelector,
        minimum_interval: Duration,
        minimum_distance_meters: f64,
        response_timeout: Option<Duration>,
        persistent: bool,
    ) {
        if minimum_distance_meters < 0.0 {
            self.reject(client, ErrorCode::InvalidInput).await;
            return;
        }
        if self.availability.all_off() {
            self.reject(client, ErrorCode::LocationOff).await;
            return;
        }
        let (usable, rejection) = self.usable_mask(selector.providers());
        if usable.is_empty() {
            self.reject(client, rejection.unwrap_or(ErrorCode::UnknownError))
                .await;
            return;
        }

        let (started, start_failure) = self.fan_out(usable, OperationKind::StartTracking).await;
        if started.is_empty() {
            self.reject(client, start_failure.unwrap_or(ErrorCode::UnknownError))
                .await;
            return;
        }

        self.criteria.register(
            &key,
            client,
            persistent,
            started,
            minimum_interval,
            minimum_distance_meters,
        );
        self.criteria.add_session_providers(started);

        if let Some(deadline) = response_timeout {
            let timer_id = self.arm_timer(deadline);
            self.update_deadlines.push((timer_id, client));
        }
        info!(
            event = events::TRACKING_STARTED,
            component = COMPONENT,
            client = %client,
            key = %key,
            providers = %fields::format_mask(started),
            "criteria subscription added"
        );
    }

    fn criteria_selector(
        selector: Option<HandlerSelector>,
        accuracy: Option<AccuracyLevel>,
        power: Option<PowerLevel>,
    ) -> HandlerSelector {
        if let Some(explicit) = selector {
            return explicit;
        }
        match (accuracy, power) {
            (Some(AccuracyLevel::High), _) => HandlerSelector::Gps,
            (_, Some(PowerLevel::High)) => HandlerSelector::Network,
            (Some(AccuracyLevel::Low), _) => HandlerSelector::Network,
            _ => HandlerSelector::Combined,
        }
    }

    // ---- state and connectivity ----------------------------------------

    async fn set_state(&mut self, client: ClientHandle, handler: StateHandler, enabled: bool) {
        let changed = self.availability.enabled(handler) != enabled;
        self.availability.set(handler, enabled);
        self.sink
            .deliver(client, Reply::State { handler, enabled })
            .await;
        if !changed {
            return;
        }
        info!(
            event = events::ENGINE_STATE_CHANGED,
            component = COMPONENT,
            handler = handler.label(),
            enabled,
            "source state changed"
        );

        let key = keys::state_key(handler);
        self.multiplexer
            .publish(&key, &Reply::State { handler, enabled }, self.sink.as_ref())
            .await;

        if !enabled {
            let kinds: &[ProviderKind] = match handler {
                StateHandler::Gps => &[ProviderKind::Gps],
                StateHandler::Network => &[
                    ProviderKind::WifiNetwork,
                    ProviderKind::CellNetwork,
                    ProviderKind::Geocode,
                ],
            };
            for kind in kinds {
                self.on_source_disabled(*kind).await;
            }
        }
    }

    /// A disabled source composes like a failed one: waiting one-shots lose
    /// the bit, tracking masks cascade, and the handler is force-stopped.
    async fn on_source_disabled(&mut self, kind: ProviderKind) {
        let resolutions = self.pending.on_provider_outcome(kind, false);
        for resolution in resolutions {
            debug_assert_eq!(resolution.cause, ResolutionCause::Exhausted);
            self.sink
                .deliver(resolution.client, Reply::Failure(ErrorCode::LocationOff))
                .await;
        }

        if self.tracking.is_active() && self.tracking.providers.contains(kind) {
            let session_over = self.tracking.source_lost(kind);
            if session_over {
                let key = keys::start_tracking_key();
                self.multiplexer
                    .broadcast_and_clear(
                        &key,
                        &Reply::Failure(ErrorCode::LocationOff),
                        self.sink.as_ref(),
                    )
                    .await;
                self.tracking.end();
            }
        }

        let result = self
            .criteria
            .on_raw_update(
                kind,
                &Err(ErrorCode::LocationOff),
                Instant::now(),
                self.sink.as_ref(),
            )
            .await;
        self.apply_criteria_result(result).await;

        let _ = self.handlers.stop(kind, true).await;
    }

    async fn get_state(&mut self, client: ClientHandle, handler: StateHandler, persistent: bool) {
        let enabled = self.availability.enabled(handler);
        self.sink
            .deliver(client, Reply::State { handler, enabled })
            .await;
        if persistent {
            let key = keys::state_key(handler);
            let _ = self.multiplexer.subscribe(&key, client, true);
        }
    }

    // ---- geofences ------------------------------------------------------

    async fn add_geofence(
        &mut self,
        client: ClientHandle,
        latitude: f64,
        longitude: f64,
        radius_meters: f64,
        persistent: bool,
    ) {
        if !(-90.0..=90.0).contains(&latitude)
            || !(-180.0..=180.0).contains(&longitude)
            || radius_meters <= 0.0
        {
            self.reject(client, ErrorCode::InvalidInput).await;
            return;
        }
        if !self.availability.gps_enabled {
            self.reject(client, ErrorCode::LocationOff).await;
            return;
        }

        let id = match self.geofences.add(latitude, longitude, radius_meters) {
            Ok(id) => id,
            Err(code) => {
                warn!(
                    event = events::GEOFENCE_REJECTED,
                    component = COMPONENT,
                    client = %client,
                    err = %code,
                    "geofence registration refused"
                );
                self.sink.deliver(client, Reply::Failure(code)).await;
                return;
            }
        };

        // Fence monitoring rides the GPS tracking stream; without a
        // subscriber there is nobody to hear transitions, so nothing starts.
        if persistent {
            let key = keys::geofence_key(id);
            let _ = self.multiplexer.subscribe(&key, client, true);
            let _ = self
                .fan_out(
                    ProviderMask::of(&[ProviderKind::Gps]),
                    OperationKind::StartTracking,
                )
                .await;
        }
        info!(
            event = events::GEOFENCE_ADDED,
            component = COMPONENT,
            client = %client,
            geofence_id = id,
            "geofence registered"
        );
        self.sink.deliver(client, Reply::GeofenceAdded { id }).await;
    }

    async fn remove_geofence(&mut self, client: ClientHandle, geofence_id: u32) {
        match self.geofences.remove(geofence_id) {
            Ok(()) => {
                let key = keys::geofence_key(geofence_id);
                self.multiplexer
                    .broadcast_and_clear(&key, &Reply::Ack, self.sink.as_ref())
                    .await;
                info!(
                    event = events::GEOFENCE_REMOVED,
                    component = COMPONENT,
                    geofence_id,
                    "geofence removed"
                );
                self.sink.deliver(client, Reply::Ack).await;
                self.release_unneeded().await;
            }
            Err(code) => {
                self.sink.deliver(client, Reply::Failure(code)).await;
            }
        }
    }

    // ---- cancellation and provider release ------------------------------

    async fn cancel_client(&mut self, client: ClientHandle) {
        debug!(
            event = events::ENGINE_CLIENT_CANCELLED,
            component = COMPONENT,
            client = %client,
            reason = fields::REASON_DISCONNECT,
            "client cancelled"
        );
        let removed_pending = self.pending.remove_client(client);
        let emptied_mux = self.multiplexer.cancel(client);
        let emptied_criteria = self.criteria.cancel(client);
        self.update_deadlines
            .retain(|(_, deadline_client)| *deadline_client != client);

        if !removed_pending.is_empty()
            || !emptied_mux.is_empty()
            || !emptied_criteria.is_empty()
        {
            self.release_unneeded().await;
        }
    }

    /// Whether any live consumer still requires this provider.
    fn provider_needed(&self, kind: ProviderKind) -> bool {
        if self.pending.waiting_on(kind) {
            return true;
        }
        if self.tracking.providers.contains(kind)
            && !self.multiplexer.is_empty(&keys::start_tracking_key())
        {
            return true;
        }
        if self.criteria.needs_provider(kind) {
            return true;
        }
        if kind == ProviderKind::Gps {
            for id in self.geofences.ids() {
                if !self.multiplexer.is_empty(&keys::geofence_key(id)) {
                    return true;
                }
            }
        }
        false
    }

    /// Force-stops every started provider with no remaining consumer.
    /// Composite keys were already checked independently by the caller's
    /// emptiness bookkeeping; this is the single stop point.
    async fn release_unneeded(&mut self) {
        for kind in ProviderKind::ALL {
            if self.handlers.is_started(kind) && !self.provider_needed(kind) {
                debug!(
                    event = events::TRACKING_STOPPED,
                    component = COMPONENT,
                    provider = kind.label(),
                    reason = fields::REASON_KEY_EMPTY,
                    "stopping unneeded provider"
                );
                self.tracking.providers.remove(kind);
                let _ = self.handlers.stop(kind, true).await;
            }
        }
        if !self.tracking.is_active() {
            self.tracking.end();
        }
    }
}
