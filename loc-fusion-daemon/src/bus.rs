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

//! JSON request/reply bus over a Unix domain socket.
//!
//! One line per message. Requests carry `{"id", "method", "payload",
//! "subscribe"}`; every reply echoes the request id inside the generic
//! success/failure envelope. A connection drop cancels every handle the
//! connection allocated.

use crate::config::ConnectivityConfig;
use loc_fusion::{
    AccuracyLevel, ClientHandle, EngineCommand, ErrorCode, FixCacheSnapshot, FusionEngineHandle,
    GeofenceTransition, HandlerSelector, PowerLevel, ProviderKind, Reply, ReplySink,
    ResponseTimeLevel, StateHandler,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

const COMPONENT: &str = "bus";

static HANDLE_SEQ: AtomicU64 = AtomicU64::new(1);

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Deserialize)]
struct RequestEnvelope {
    id: u64,
    method: String,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    subscribe: bool,
}

#[derive(Deserialize, Default)]
struct GetCurrentPositionParams {
    accuracy: Option<u8>,
    #[serde(rename = "responseTime")]
    response_time: Option<u8>,
    #[serde(rename = "maximumAge")]
    maximum_age: Option<i64>,
}

#[derive(Deserialize, Default)]
struct GetLocationUpdatesParams {
    #[serde(rename = "Handler")]
    handler: Option<HandlerSelector>,
    #[serde(rename = "minimumInterval")]
    minimum_interval_ms: Option<u64>,
    #[serde(rename = "minimumDistance")]
    minimum_distance: Option<f64>,
    #[serde(rename = "responseTimeout")]
    response_timeout_secs: Option<u64>,
    /// Accepted for wire compatibility; power management is the platform's
    /// concern, not the fusion core's.
    #[serde(rename = "wakelock")]
    _wakelock: Option<bool>,
}

#[derive(Deserialize, Default)]
struct CriteriaTrackingParams {
    #[serde(rename = "Handler")]
    handler: Option<HandlerSelector>,
    #[serde(rename = "accuracyLevel")]
    accuracy_level: Option<u8>,
    #[serde(rename = "powerLevel")]
    power_level: Option<u8>,
    #[serde(rename = "minimumInterval")]
    minimum_interval_ms: Option<u64>,
    #[serde(rename = "minimumDistance")]
    minimum_distance: Option<f64>,
}

#[derive(Deserialize, Default)]
struct GetCachedPositionParams {
    #[serde(rename = "Handler")]
    handler: Option<HandlerSelector>,
    #[serde(rename = "maximumAge")]
    maximum_age: Option<i64>,
}

#[derive(Deserialize)]
struct SetStateParams {
    #[serde(rename = "Handler")]
    handler: StateHandler,
    state: bool,
}

#[derive(Deserialize)]
struct GetStateParams {
    #[serde(rename = "Handler")]
    handler: StateHandler,
}

#[derive(Deserialize)]
struct AddGeofenceParams {
    latitude: f64,
    longitude: f64,
    radius: f64,
}

#[derive(Deserialize)]
struct RemoveGeofenceParams {
    geofenceid: u32,
}

fn accuracy_from_wire(value: Option<u8>) -> Result<Option<AccuracyLevel>, ErrorCode> {
    match value {
        None => Ok(None),
        Some(1) => Ok(Some(AccuracyLevel::High)),
        Some(2) => Ok(Some(AccuracyLevel::Medium)),
        Some(3) => Ok(Some(AccuracyLevel::Low)),
        Some(_) => Err(ErrorCode::InvalidInput),
    }
}

fn response_time_from_wire(value: Option<u8>) -> Result<Option<ResponseTimeLevel>, ErrorCode> {
    match value {
        None => Ok(None),
        Some(1) => Ok(Some(ResponseTimeLevel::Low)),
        Some(2) => Ok(Some(ResponseTimeLevel::Medium)),
        Some(3) => Ok(Some(ResponseTimeLevel::High)),
        Some(_) => Err(ErrorCode::InvalidInput),
    }
}

fn power_from_wire(value: Option<u8>) -> Result<Option<PowerLevel>, ErrorCode> {
    match value {
        None => Ok(None),
        Some(1) => Ok(Some(PowerLevel::Low)),
        Some(2) => Ok(Some(PowerLevel::Medium)),
        Some(3) => Ok(Some(PowerLevel::High)),
        Some(_) => Err(ErrorCode::InvalidInput),
    }
}

fn success_envelope(extra: Value) -> Value {
    let mut envelope = json!({
        "returnValue": true,
        "errorCode": 0,
    });
    if let (Value::Object(envelope_map), Value::Object(extra_map)) = (&mut envelope, extra) {
        envelope_map.extend(extra_map);
    }
    envelope
}

fn failure_envelope(code: ErrorCode) -> Value {
    json!({
        "returnValue": false,
        "errorCode": code.code(),
        "errorText": code.message(),
    })
}

fn transition_label(transition: GeofenceTransition) -> &'static str {
    match transition {
        GeofenceTransition::Entered => "entered",
        GeofenceTransition::Exited => "exited",
    }
}

pub(crate) fn envelope_for(reply: &Reply) -> Value {
    match reply {
        Reply::Position(sample) => {
            success_envelope(serde_json::to_value(sample).unwrap_or(Value::Null))
        }
        Reply::Ack => success_envelope(json!({})),
        Reply::State { handler, enabled } => success_envelope(json!({
            "Handler": handler.label(),
            "state": enabled,
        })),
        Reply::GeofenceAdded { id } => success_envelope(json!({ "geofenceid": id })),
        Reply::GeofenceEvent { id, transition } => success_envelope(json!({
            "geofenceid": id,
            "status": transition_label(*transition),
        })),
        Reply::Failure(code) => failure_envelope(*code),
    }
}

struct ReplyRoute {
    writer: UnboundedSender<String>,
    request_id: u64,
    subscription: bool,
}

/// Routes engine replies back to the connection and request they belong to.
/// One-shot routes are dropped after their single delivery.
pub(crate) struct BusReplySink {
    routes: StdMutex<HashMap<u64, ReplyRoute>>,
}

impl BusReplySink {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            routes: StdMutex::new(HashMap::new()),
        })
    }

    fn register(&self, client: ClientHandle, route: ReplyRoute) {
        self.routes
            .lock()
            .expect("lock reply routes")
            .insert(client.raw(), route);
    }

    fn unregister(&self, client: ClientHandle) {
        self.routes
            .lock()
            .expect("lock reply routes")
            .remove(&client.raw());
    }
}

#[async_trait]
impl ReplySink for BusReplySink {
    async fn deliver(&self, client: ClientHandle, reply: Reply) {
        let (writer, request_id, drop_route) = {
            let mut routes = self.routes.lock().expect("lock reply routes");
            let Some(route) = routes.get(&client.raw()) else {
                debug!(
                    component = COMPONENT,
                    client = %client,
                    "dropping reply for unrouted client"
                );
                return;
            };
            let writer = route.writer.clone();
            let request_id = route.request_id;
            let drop_route = !route.subscription;
            if drop_route {
                routes.remove(&client.raw());
            }
            (writer, request_id, drop_route)
        };

        let mut envelope = envelope_for(&reply);
        if let Value::Object(envelope_map) = &mut envelope {
            envelope_map.insert("id".to_string(), json!(request_id));
        }
        let _ = writer.send(envelope.to_string());
        debug!(
            component = COMPONENT,
            client = %client,
            request_id,
            one_shot = drop_route,
            "reply routed"
        );
    }
}

pub(crate) struct BusServer {
    engine: FusionEngineHandle,
    sink: Arc<BusReplySink>,
    fix_cache: FixCacheSnapshot,
}

impl BusServer {
    pub(crate) fn new(
        engine: FusionEngineHandle,
        sink: Arc<BusReplySink>,
        fix_cache: FixCacheSnapshot,
        connectivity: &ConnectivityConfig,
    ) -> Self {
        // Seed the engine's connectivity view before accepting traffic.
        let _ = engine.submit(EngineCommand::SetConnectivity {
            wifi_available: connectivity.wifi_available,
            data_available: connectivity.data_available,
        });
        Self {
            engine,
            sink,
            fix_cache,
        }
    }

    /// Binds the socket and serves connections until the task is aborted.
    /// A bind failure is fatal to service startup.
    pub(crate) async fn serve(self, socket_path: &str) -> std::io::Result<()> {
        let _ = std::fs::remove_file(socket_path);
        let listener = UnixListener::bind(socket_path)?;
        info!(
            component = COMPONENT,
            socket_path, "bus listening for connections"
        );

        let server = Arc::new(self);
        loop {
            let (stream, _addr) = listener.accept().await?;
            let server = server.clone();
            tokio::spawn(async move {
                server.handle_connection(stream).await;
            });
        }
    }

    async fn handle_connection(&self, stream: UnixStream) {
        let (reader, mut writer) = stream.into_split();
        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<String>();

        let writer_task = tokio::spawn(async move {
            while let Some(line) = write_rx.recv().await {
                if writer.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if writer.write_all(b"\n").await.is_err() {
                    break;
                }
            }
        });

        let mut connection_clients: Vec<ClientHandle> = Vec::new();
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            self.handle_line(&line, &write_tx, &mut connection_clients);
        }

        // Transport-level disconnect: cancel everything this connection owns.
        for client in connection_clients {
            self.sink.unregister(client);
            let _ = self.engine.submit(EngineCommand::CancelClient { client });
        }
        writer_task.abort();
        debug!(component = COMPONENT, "connection closed");
    }

    fn handle_line(
        &self,
        line: &str,
        writer: &UnboundedSender<String>,
        connection_clients: &mut Vec<ClientHandle>,
    ) {
        let envelope: RequestEnvelope = match serde_json::from_str(line) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(
                    component = COMPONENT,
                    err = %err,
                    "malformed request line"
                );
                let mut reply = failure_envelope(ErrorCode::InvalidInput);
                if let Value::Object(map) = &mut reply {
                    map.insert("id".to_string(), json!(0));
                }
                let _ = writer.send(reply.to_string());
                return;
            }
        };

        let request_id = envelope.id;
        let write_error = |code: ErrorCode| {
            let mut reply = failure_envelope(code);
            if let Value::Object(map) = &mut reply {
                map.insert("id".to_string(), json!(request_id));
            }
            let _ = writer.send(reply.to_string());
        };

        // getCachedPosition reads the lock-free snapshot; no engine trip.
        if envelope.method == "getCachedPosition" {
            match serde_json::from_value::<GetCachedPositionParams>(envelope.payload) {
                Ok(params) => {
                    let reply = self.cached_position(&params);
                    let mut value = envelope_for(&reply);
                    if let Value::Object(map) = &mut value {
                        map.insert("id".to_string(), json!(request_id));
                    }
                    let _ = writer.send(value.to_string());
                }
                Err(_) => write_error(ErrorCode::InvalidInput),
            }
            return;
        }

        let client = ClientHandle::new(HANDLE_SEQ.fetch_add(1, Ordering::Relaxed));
        let command = match self.build_command(&envelope, client) {
            Ok(command) => command,
            Err(code) => {
                write_error(code);
                return;
            }
        };

        self.sink.register(
            client,
            ReplyRoute {
                writer: writer.clone(),
                request_id,
                subscription: envelope.subscribe,
            },
        );
        connection_clients.push(client);

        if self.engine.submit(command).is_err() {
            self.sink.unregister(client);
            write_error(ErrorCode::UnknownError);
        }
    }

    fn cached_position(&self, params: &GetCachedPositionParams) -> Reply {
        let kinds: Vec<ProviderKind> = match params.handler {
            Some(selector) => selector.providers().iter().collect(),
            None => ProviderKind::ALL.to_vec(),
        };
        let max_age_millis = params
            .maximum_age
            .filter(|age| *age > 0)
            .map(|age| age as u64 * 1000);
        match self
            .fix_cache
            .best_fix(&kinds, max_age_millis, now_millis())
        {
            Some(sample) => Reply::Position(sample),
            None => Reply::Failure(ErrorCode::PosNotAvailable),
        }
    }

    fn build_command(
        &self,
        envelope: &RequestEnvelope,
        client: ClientHandle,
    ) -> Result<EngineCommand, ErrorCode> {
        let payload = envelope.payload.clone();
        match envelope.method.as_str() {
            "getCurrentPosition" => {
                let params: GetCurrentPositionParams =
                    serde_json::from_value(payload).map_err(|_| ErrorCode::InvalidInput)?;
                Ok(EngineCommand::GetCurrentPosition {
                    client,
                    accuracy: accuracy_from_wire(params.accuracy)?,
                    response_time: response_time_from_wire(params.response_time)?,
                    maximum_age: params.maximum_age,
                })
            }
            "startTracking" => Ok(EngineCommand::StartTracking {
                client,
                persistent: envelope.subscribe,
            }),
            "getLocationUpdates" => {
                let params: GetLocationUpdatesParams =
                    serde_json::from_value(payload).map_err(|_| ErrorCode::InvalidInput)?;
                Ok(EngineCommand::GetLocationUpdates {
                    client,
                    selector: params.handler.unwrap_or_default(),
                    minimum_interval: std::time::Duration::from_millis(
                        params.minimum_interval_ms.unwrap_or(0),
                    ),
                    minimum_distance_meters: params.minimum_distance.unwrap_or(0.0),
                    response_timeout: params
                        .response_timeout_secs
                        .map(std::time::Duration::from_secs),
                    persistent: envelope.subscribe,
                })
            }
            "startTrackingCriteriaBased" => {
                let params: CriteriaTrackingParams =
                    serde_json::from_value(payload).map_err(|_| ErrorCode::InvalidInput)?;
                Ok(EngineCommand::StartTrackingCriteriaBased {
                    client,
                    selector: params.handler,
                    accuracy: accuracy_from_wire(params.accuracy_level)?,
                    power: power_from_wire(params.power_level)?,
                    minimum_interval: std::time::Duration::from_millis(
                        params.minimum_interval_ms.unwrap_or(0),
                    ),
                    minimum_distance_meters: params.minimum_distance.unwrap_or(0.0),
                    persistent: envelope.subscribe,
                })
            }
            "setState" => {
                let params: SetStateParams =
                    serde_json::from_value(payload).map_err(|_| ErrorCode::InvalidInput)?;
                Ok(EngineCommand::SetState {
                    client,
                    handler: params.handler,
                    enabled: params.state,
                })
            }
            "getState" => {
                let params: GetStateParams =
                    serde_json::from_value(payload).map_err(|_| ErrorCode::InvalidInput)?;
                Ok(EngineCommand::GetState {
                    client,
                    handler: params.handler,
                    persistent: envelope.subscribe,
                })
            }
            "addGeofenceArea" => {
                let params: AddGeofenceParams =
                    serde_json::from_value(payload).map_err(|_| ErrorCode::InvalidInput)?;
                Ok(EngineCommand::AddGeofenceArea {
                    client,
                    latitude: params.latitude,
                    longitude: params.longitude,
                    radius_meters: params.radius,
                    persistent: envelope.subscribe,
                })
            }
            "removeGeofenceArea" => {
                let params: RemoveGeofenceParams =
                    serde_json::from_value(payload).map_err(|_| ErrorCode::InvalidInput)?;
                Ok(EngineCommand::RemoveGeofenceArea {
                    client,
                    geofence_id: params.geofenceid,
                })
            }
            _ => Err(ErrorCode::InvalidInput),
        }
    }
}
