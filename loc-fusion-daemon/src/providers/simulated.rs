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

//! Scripted position source driven by the daemon configuration.

use crate::config::{SimulatedFix, SimulatedSourceConfig};
use async_trait::async_trait;
use loc_fusion::{ErrorCode, PositionProvider, ProviderRequest, StartFailure};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;
use uuid::Uuid;

const COMPONENT: &str = "simulated_provider";

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

fn outcome_of(fix: &SimulatedFix) -> Result<loc_fusion::PositionSample, ErrorCode> {
    if let Some(code) = fix.error_code {
        return Err(ErrorCode::from_code(code).unwrap_or(ErrorCode::UnknownError));
    }
    Ok(loc_fusion::PositionSample {
        timestamp_millis: now_millis(),
        latitude: fix.latitude,
        longitude: fix.longitude,
        altitude: fix.altitude,
        speed: fix.speed,
        direction: fix.direction,
        horizontal_accuracy: fix.horizontal_accuracy,
        vertical_accuracy: fix.vertical_accuracy,
    })
}

/// Replays configured fixes. Each tracking session replays the tracking
/// script from the start; one-shot answers are consumed in order and an
/// exhausted script goes silent, which exercises the engine's timeout path.
pub(crate) struct SimulatedProvider {
    source_id: String,
    config: SimulatedSourceConfig,
    position_queue: StdMutex<VecDeque<SimulatedFix>>,
    /// Bumped on stop; running session loops observe it and end.
    session_epoch: Arc<AtomicU64>,
}

impl SimulatedProvider {
    pub(crate) fn new(label: &str, config: SimulatedSourceConfig) -> Arc<Self> {
        let source_id = format!("{label}-{}", Uuid::new_v4().simple());
        let position_queue = StdMutex::new(config.position_fixes.iter().cloned().collect());
        Arc::new(Self {
            source_id,
            config,
            position_queue,
            session_epoch: Arc::new(AtomicU64::new(0)),
        })
    }
}

#[async_trait]
impl PositionProvider for SimulatedProvider {
    async fn start(&self) -> Result<(), StartFailure> {
        if self.config.unavailable {
            return Err(StartFailure::Unavailable);
        }
        if self.config.startup_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.startup_delay_ms)).await;
        }
        debug!(
            component = COMPONENT,
            source_id = %self.source_id,
            "simulated source started"
        );
        Ok(())
    }

    async fn stop(&self) {
        self.session_epoch.fetch_add(1, Ordering::Relaxed);
        debug!(
            component = COMPONENT,
            source_id = %self.source_id,
            "simulated source stopped"
        );
    }

    async fn request_position(&self, request: ProviderRequest) {
        let scripted = self
            .position_queue
            .lock()
            .expect("lock position queue")
            .pop_front();
        let Some(fix) = scripted else {
            debug!(
                component = COMPONENT,
                source_id = %self.source_id,
                "position script exhausted; staying silent"
            );
            return;
        };
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(fix.delay_ms)).await;
            request.deliver(outcome_of(&fix));
        });
    }

    async fn request_tracking(&self, request: ProviderRequest) {
        let script = self.config.tracking_fixes.clone();
        let epoch = self.session_epoch.clone();
        let session = epoch.load(Ordering::Relaxed);
        tokio::spawn(async move {
            for fix in script {
                tokio::time::sleep(Duration::from_millis(fix.delay_ms)).await;
                if epoch.load(Ordering::Relaxed) != session {
                    break;
                }
                request.deliver(outcome_of(&fix));
            }
        });
    }
}
