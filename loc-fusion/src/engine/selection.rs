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

//! Handler selection: a pure function from request criteria to the provider
//! set to fan out to, plus the accuracy and response-timeout tables.

use crate::provider::{ProviderKind, ProviderMask};
use serde::Deserialize;
use std::time::Duration;

/// Requested accuracy class.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccuracyLevel {
    High,
    Medium,
    Low,
}

/// Requested response-time class.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseTimeLevel {
    Low,
    Medium,
    High,
}

/// Requested power class for criteria-based tracking.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerLevel {
    Low,
    Medium,
    High,
}

/// Provider combination a client can name explicitly.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerSelector {
    Gps,
    Network,
    #[default]
    Combined,
}

impl HandlerSelector {
    pub fn providers(self) -> ProviderMask {
        match self {
            HandlerSelector::Gps => ProviderMask::of(&[ProviderKind::Gps]),
            HandlerSelector::Network => {
                ProviderMask::of(&[ProviderKind::WifiNetwork, ProviderKind::CellNetwork])
            }
            HandlerSelector::Combined => ProviderMask::of(&[
                ProviderKind::Gps,
                ProviderKind::WifiNetwork,
                ProviderKind::CellNetwork,
            ]),
        }
    }
}

/// `maximumAge` sentinel requesting a fresh fix regardless of cache state.
pub const MAXIMUM_AGE_FORCE_FRESH: i64 = 0;
/// `maximumAge` sentinel accepting any cached fix regardless of age.
pub const MAXIMUM_AGE_ACCEPT_ANY: i64 = -1;

/// Computes the provider fan-out set for one request.
///
/// With neither criterion supplied every source is tried best-effort and the
/// first success wins. The low/low corner avoids the GPS cold-start cost
/// entirely.
pub fn select_providers(
    accuracy: Option<AccuracyLevel>,
    response_time: Option<ResponseTimeLevel>,
) -> ProviderMask {
    match (accuracy, response_time) {
        (None, None) => ProviderMask::of(&[
            ProviderKind::Gps,
            ProviderKind::WifiNetwork,
            ProviderKind::CellNetwork,
        ]),
        (Some(AccuracyLevel::Low), Some(ResponseTimeLevel::Low)) => {
            ProviderMask::of(&[ProviderKind::CellNetwork, ProviderKind::WifiNetwork])
        }
        (accuracy, _) => {
            let mut mask = ProviderMask::EMPTY;
            if accuracy != Some(AccuracyLevel::High) {
                mask.insert(ProviderKind::WifiNetwork);
            }
            if accuracy != Some(AccuracyLevel::Low) {
                mask.insert(ProviderKind::Gps);
            }
            mask
        }
    }
}

/// Accuracy class to the meter threshold used for cache matching.
pub fn accuracy_threshold_meters(accuracy: Option<AccuracyLevel>) -> f64 {
    match accuracy {
        Some(AccuracyLevel::High) => 100.0,
        Some(AccuracyLevel::Medium) => 500.0,
        Some(AccuracyLevel::Low) | None => 2000.0,
    }
}

/// Response-deadline table, overridable so tests can run on short deadlines.
#[derive(Clone, Copy, Debug)]
pub struct ResponseTimeouts {
    pub low: Duration,
    pub medium: Duration,
    pub high_with_high_accuracy: Duration,
}

impl Default for ResponseTimeouts {
    fn default() -> Self {
        Self {
            low: Duration::from_secs(10),
            medium: Duration::from_secs(100),
            high_with_high_accuracy: Duration::from_secs(150),
        }
    }
}

impl ResponseTimeouts {
    /// Deadline for one request. An unspecified response time gets the
    /// medium deadline.
    pub fn deadline(
        &self,
        accuracy: Option<AccuracyLevel>,
        response_time: Option<ResponseTimeLevel>,
    ) -> Duration {
        match response_time {
            Some(ResponseTimeLevel::Low) => self.low,
            Some(ResponseTimeLevel::Medium) | None => self.medium,
            Some(ResponseTimeLevel::High) => {
                if accuracy == Some(AccuracyLevel::High) {
                    self.high_with_high_accuracy
                } else {
                    self.medium
                }
            }
        }
    }
}
