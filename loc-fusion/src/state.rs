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

//! Explicit source-enabled and connectivity state owned by the engine.
//!
//! These flags are configuration state queried through the engine interface,
//! never ambient globals. `setState`/`getState` operate on
//! [`StateHandler`]-level granularity; connectivity is updated by the
//! platform integration in the daemon.

use crate::provider::ProviderKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};

/// Handler granularity exposed by `setState`/`getState`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateHandler {
    Gps,
    Network,
}

impl StateHandler {
    pub const fn label(self) -> &'static str {
        match self {
            StateHandler::Gps => "gps",
            StateHandler::Network => "network",
        }
    }
}

impl Display for StateHandler {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-source enabled flags.
#[derive(Clone, Copy, Debug)]
pub struct SourceAvailability {
    pub gps_enabled: bool,
    pub network_enabled: bool,
}

impl Default for SourceAvailability {
    fn default() -> Self {
        Self {
            gps_enabled: true,
            network_enabled: true,
        }
    }
}

impl SourceAvailability {
    pub fn enabled(&self, handler: StateHandler) -> bool {
        match handler {
            StateHandler::Gps => self.gps_enabled,
            StateHandler::Network => self.network_enabled,
        }
    }

    pub fn set(&mut self, handler: StateHandler, enabled: bool) {
        match handler {
            StateHandler::Gps => self.gps_enabled = enabled,
            StateHandler::Network => self.network_enabled = enabled,
        }
    }

    /// Whether a provider kind is usable under the current flags.
    pub fn allows(&self, kind: ProviderKind) -> bool {
        match kind {
            ProviderKind::Gps => self.gps_enabled,
            ProviderKind::WifiNetwork | ProviderKind::CellNetwork | ProviderKind::Geocode => {
                self.network_enabled
            }
        }
    }

    /// True when every position source is globally disabled.
    pub fn all_off(&self) -> bool {
        !self.gps_enabled && !self.network_enabled
    }
}

/// Connectivity preconditions for the network-backed kinds.
#[derive(Clone, Copy, Debug)]
pub struct ConnectivityState {
    pub wifi_available: bool,
    pub data_available: bool,
}

impl Default for ConnectivityState {
    fn default() -> Self {
        Self {
            wifi_available: true,
            data_available: true,
        }
    }
}

impl ConnectivityState {
    /// Whether the connectivity precondition for `kind` holds. GPS needs no
    /// connectivity; geocoding rides the data connection.
    pub fn satisfied_for(&self, kind: ProviderKind) -> bool {
        match kind {
            ProviderKind::Gps => true,
            ProviderKind::WifiNetwork => self.wifi_available,
            ProviderKind::CellNetwork | ProviderKind::Geocode => self.data_available,
        }
    }
}
