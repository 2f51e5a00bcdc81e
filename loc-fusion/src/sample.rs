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

//! Position fix data model shared by providers, the engine and the wire layer.

use serde::{Deserialize, Serialize};

/// A single position fix produced by one provider.
///
/// One cache slot exists per provider; every successful fix overwrites it.
/// Angles are degrees, distances meters, speed meters per second.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    /// Milliseconds since the Unix epoch at which the fix was taken.
    #[serde(rename = "timestamp")]
    pub timestamp_millis: u64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub speed: f64,
    pub direction: f64,
    #[serde(rename = "horizAccuracy")]
    pub horizontal_accuracy: f64,
    #[serde(rename = "vertAccuracy")]
    pub vertical_accuracy: f64,
}

impl PositionSample {
    /// Age of this fix relative to `now_millis`, saturating at zero for
    /// clock skew between the provider and the daemon.
    pub fn age_millis(&self, now_millis: u64) -> u64 {
        now_millis.saturating_sub(self.timestamp_millis)
    }
}
