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

//! Canonical structured field keys and value-format helpers.

use crate::provider::{ProviderKind, ProviderMask};
use crate::sample::PositionSample;

pub const EVENT: &str = "event";
pub const COMPONENT: &str = "component";
pub const PROVIDER: &str = "provider";
pub const OPERATION: &str = "operation";
pub const GENERATION: &str = "generation";
pub const CLIENT: &str = "client";
pub const KEY: &str = "key";
pub const REASON: &str = "reason";
pub const ERR: &str = "err";

pub const NONE: &str = "none";
pub const REASON_STALE_GENERATION: &str = "stale_generation";
pub const REASON_KEY_EMPTY: &str = "key_empty";
pub const REASON_DISCONNECT: &str = "disconnect";

pub fn format_mask(mask: ProviderMask) -> String {
    let labels: Vec<&str> = mask.iter().map(ProviderKind::label).collect();
    if labels.is_empty() {
        NONE.to_string()
    } else {
        labels.join("+")
    }
}

/// Compact fix summary for debug events; full samples never hit the log.
pub fn format_sample(sample: &PositionSample) -> String {
    format!(
        "{:.5},{:.5}~{:.0}m@{}",
        sample.latitude, sample.longitude, sample.horizontal_accuracy, sample.timestamp_millis
    )
}

#[cfg(test)]
mod tests {
    use super::{format_mask, format_sample, NONE};
    use crate::provider::{ProviderKind, ProviderMask};
    use crate::sample::PositionSample;

    #[test]
    fn format_mask_joins_labels_in_order() {
        let mask = ProviderMask::of(&[ProviderKind::CellNetwork, ProviderKind::Gps]);

        assert_eq!(format_mask(mask), "gps+cell");
        assert_eq!(format_mask(ProviderMask::EMPTY), NONE);
    }

    #[test]
    fn format_sample_is_compact() {
        let sample = PositionSample {
            timestamp_millis: 1000,
            latitude: 37.390123,
            longitude: -122.081456,
            altitude: 0.0,
            speed: 0.0,
            direction: 0.0,
            horizontal_accuracy: 25.4,
            vertical_accuracy: 0.0,
        };

        assert_eq!(format_sample(&sample), "37.39012,-122.08146~25m@1000");
    }
}
