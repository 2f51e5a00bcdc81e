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

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub(crate) daemon: DaemonConfig,
    #[serde(default)]
    pub(crate) connectivity: ConnectivityConfig,
    #[serde(default)]
    pub(crate) engine: EngineTuning,
    pub(crate) providers: ProvidersConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    /// Unix domain socket the JSON bus listens on.
    pub(crate) socket_path: String,
    /// Last-known-fix store file.
    pub(crate) fix_store_path: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ConnectivityConfig {
    pub(crate) wifi_available: bool,
    pub(crate) data_available: bool,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            wifi_available: true,
            data_available: true,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct EngineTuning {
    pub(crate) response_timeout_low_secs: u64,
    pub(crate) response_timeout_medium_secs: u64,
    pub(crate) response_timeout_high_accuracy_secs: u64,
    pub(crate) tracking_publish_interval_secs: u64,
    pub(crate) tracking_min_accuracy_meters: f64,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            response_timeout_low_secs: 10,
            response_timeout_medium_secs: 100,
            response_timeout_high_accuracy_secs: 150,
            tracking_publish_interval_secs: 60,
            tracking_min_accuracy_meters: 100.0,
        }
    }
}

impl EngineTuning {
    pub(crate) fn to_engine_config(&self) -> loc_fusion::EngineConfig {
        loc_fusion::EngineConfig {
            response_timeouts: loc_fusion::ResponseTimeouts {
                low: Duration::from_secs(self.response_timeout_low_secs),
                medium: Duration::from_secs(self.response_timeout_medium_secs),
                high_with_high_accuracy: Duration::from_secs(
                    self.response_timeout_high_accuracy_secs,
                ),
            },
            tracking_publish_interval: Duration::from_secs(self.tracking_publish_interval_secs),
            tracking_min_accuracy_meters: self.tracking_min_accuracy_meters,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ProvidersConfig {
    pub(crate) gps: SimulatedSourceConfig,
    pub(crate) network: SimulatedSourceConfig,
    #[serde(default)]
    pub(crate) geocode: SimulatedSourceConfig,
}

/// Scripted source behavior. Real GPS chip bridges or network positioning
/// clients plug in behind the same provider trait; the simulated source is
/// what ships for development and integration testing.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct SimulatedSourceConfig {
    /// Driver warm-up before the first fix can be produced.
    #[serde(default)]
    pub(crate) startup_delay_ms: u64,
    /// Refuse to start, simulating absent hardware.
    #[serde(default)]
    pub(crate) unavailable: bool,
    /// One-shot position answers, consumed in order; empty means silent.
    #[serde(default)]
    pub(crate) position_fixes: Vec<SimulatedFix>,
    /// Tracking stream, replayed from the start for every tracking session.
    #[serde(default)]
    pub(crate) tracking_fixes: Vec<SimulatedFix>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct SimulatedFix {
    #[serde(default)]
    pub(crate) delay_ms: u64,
    #[serde(default)]
    pub(crate) latitude: f64,
    #[serde(default)]
    pub(crate) longitude: f64,
    #[serde(default)]
    pub(crate) altitude: f64,
    #[serde(default)]
    pub(crate) speed: f64,
    #[serde(default)]
    pub(crate) direction: f64,
    #[serde(default = "default_accuracy")]
    pub(crate) horizontal_accuracy: f64,
    #[serde(default = "default_accuracy")]
    pub(crate) vertical_accuracy: f64,
    /// Wire error code to deliver instead of a fix.
    #[serde(default)]
    pub(crate) error_code: Option<i32>,
}

fn default_accuracy() -> f64 {
    50.0
}
