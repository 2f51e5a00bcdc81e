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

//! Criteria-based delivery: per-subscriber minimum-interval and
//! minimum-distance throttling over a shared stream of raw updates.

use crate::error::ErrorCode;
use crate::observability::events;
use crate::provider::{ProviderKind, ProviderMask};
use crate::reply::{ClientHandle, Reply, ReplySink};
use crate::sample::PositionSample;
use crate::subscription::distance::great_circle_distance_meters;
use crate::subscription::SubscriptionKey;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const COMPONENT: &str = "criteria_filter";

struct CriteriaRow {
    key: SubscriptionKey,
    client: ClientHandle,
    persistent: bool,
    providers: ProviderMask,
    min_interval: Duration,
    min_distance_meters: f64,
    last_latitude: f64,
    last_longitude: f64,
    last_report_at: Option<Instant>,
    first_reply: bool,
}

impl CriteriaRow {
    /// Interval gate: first reply always passes; a zero interval passes
    /// every call after the first.
    fn interval_passes(&self, now: Instant) -> bool {
        if self.first_reply {
            return true;
        }
        if self.min_interval.is_zero() {
            return true;
        }
        match self.last_report_at {
            Some(last) => now.duration_since(last) > self.min_interval,
            None => true,
        }
    }

    /// Distance gate, only consulted once the interval gate passed.
    fn distance_passes(&self, sample: &PositionSample) -> bool {
        if self.first_reply || self.min_distance_meters == 0.0 {
            return true;
        }
        great_circle_distance_meters(
            sample.latitude,
            sample.longitude,
            self.last_latitude,
            self.last_longitude,
        ) >= self.min_distance_meters
    }

    fn mark_delivered(&mut self, sample: &PositionSample, now: Instant) {
        self.first_reply = false;
        self.last_latitude = sample.latitude;
        self.last_longitude = sample.longitude;
        self.last_report_at = Some(now);
    }
}

/// Result of feeding one raw update through the filter.
#[derive(Debug, Default)]
pub(crate) struct CriteriaUpdateResult {
    /// The shared session mask emptied; a failure was fanned out to every
    /// key and all rows were dropped.
    pub(crate) session_failed: bool,
    /// One-shot subscribers that received their single delivery.
    pub(crate) removed_one_shots: Vec<ClientHandle>,
    /// Keys left with no rows after this update.
    pub(crate) emptied_keys: Vec<SubscriptionKey>,
}

/// Per-subscriber throttle state over the shared tracking stream.
///
/// Membership mirrors the multiplexer; this filter owns only the criteria
/// metadata and the shared provider bitmask of the tracking session feeding
/// it.
#[derive(Default)]
pub(crate) struct CriteriaFilter {
    rows: Vec<CriteriaRow>,
    session_providers: ProviderMask,
}

impl CriteriaFilter {
    pub(crate) fn register(
        &mut self,
        key: &SubscriptionKey,
        client: ClientHandle,
        persistent: bool,
        providers: ProviderMask,
        min_interval: Duration,
        min_distance_meters: f64,
    ) {
        self.rows.push(CriteriaRow {
            key: key.clone(),
            client,
            persistent,
            providers,
            min_interval,
            min_distance_meters,
            last_latitude: 0.0,
            last_longitude: 0.0,
            last_report_at: None,
            first_reply: true,
        });
    }

    /// Adds providers to the shared tracking-session bitmask.
    pub(crate) fn add_session_providers(&mut self, providers: ProviderMask) {
        for kind in providers.iter() {
            self.session_providers.insert(kind);
        }
    }

    pub(crate) fn session_providers(&self) -> ProviderMask {
        self.session_providers
    }

    pub(crate) fn has_rows(&self) -> bool {
        !self.rows.is_empty()
    }

    pub(crate) fn needs_provider(&self, kind: ProviderKind) -> bool {
        self.rows.iter().any(|row| row.providers.contains(kind))
    }

    pub(crate) fn is_empty(&self, key: &SubscriptionKey) -> bool {
        !self.rows.iter().any(|row| &row.key == key)
    }

    /// Whether the client still awaits its first delivery. Drives the
    /// optional first-fix response timeout.
    pub(crate) fn has_undelivered(&self, client: ClientHandle) -> bool {
        self.rows
            .iter()
            .any(|row| row.client == client && row.first_reply)
    }

    /// Removes the client's rows, returning keys left without rows.
    pub(crate) fn cancel(&mut self, client: ClientHandle) -> Vec<SubscriptionKey> {
        let removed_keys: Vec<SubscriptionKey> = self
            .rows
            .iter()
            .filter(|row| row.client == client)
            .map(|row| row.key.clone())
            .collect();
        self.rows.retain(|row| row.client != client);

        let mut emptied = Vec::new();
        for key in removed_keys {
            if self.is_empty(&key) && !emptied.contains(&key) {
                emptied.push(key);
            }
        }
        if self.rows.is_empty() {
            self.session_providers = ProviderMask::EMPTY;
        }
        emptied
    }

    /// Feeds one raw provider update through every matching row.
    pub(crate) async fn on_raw_update(
        &mut self,
        kind: ProviderKind,
        outcome: &Result<PositionSample, ErrorCode>,
        now: Instant,
        sink: &dyn ReplySink,
    ) -> CriteriaUpdateResult {
        let mut result = CriteriaUpdateResult::default();

        let sample = match outcome {
            Ok(sample) => *sample,
            Err(code) => {
                self.session_providers.remove(kind);
                if !self.session_providers.is_empty() {
                    return result;
                }
                // Last source lost: one throttle-bypassing failure per
                // touched key, then the session ends.
                warn!(
                    event = events::CRITERIA_SESSION_FAILED,
                    component = COMPONENT,
                    provider = kind.label(),
                    err = %code,
                    "all tracking sources failed"
                );
                for row in &self.rows {
                    sink.deliver(row.client, Reply::Failure(*code)).await;
                    if !result.emptied_keys.contains(&row.key) {
                        result.emptied_keys.push(row.key.clone());
                    }
                }
                self.rows.clear();
                result.session_failed = true;
                return result;
            }
        };

        let mut delivered_one_shots = Vec::new();
        for row in self
            .rows
            .iter_mut()
            .filter(|row| row.providers.contains(kind))
        {
            if !row.interval_passes(now) {
                debug!(
                    event = events::CRITERIA_THROTTLED,
                    component = COMPONENT,
                    key = %row.key,
                    client = %row.client,
                    reason = "interval",
                    "update withheld"
                );
                continue;
            }
            if !row.distance_passes(&sample) {
                debug!(
                    event = events::CRITERIA_THROTTLED,
                    component = COMPONENT,
                    key = %row.key,
                    client = %row.client,
                    reason = "distance",
                    "update withheld"
                );
                continue;
            }

            sink.deliver(row.client, Reply::Position(sample)).await;
            row.mark_delivered(&sample, now);
            debug!(
                event = events::CRITERIA_DELIVERED,
                component = COMPONENT,
                key = %row.key,
                client = %row.client,
                "update delivered"
            );
            if !row.persistent {
                delivered_one_shots.push(row.client);
            }
        }

        for client in &delivered_one_shots {
            let keys: Vec<SubscriptionKey> = self
                .rows
                .iter()
                .filter(|row| row.client == *client && !row.persistent)
                .map(|row| row.key.clone())
                .collect();
            self.rows
                .retain(|row| !(row.client == *client && !row.persistent));
            for key in keys {
                if self.is_empty(&key) && !result.emptied_keys.contains(&key) {
                    result.emptied_keys.push(key);
                }
            }
        }
        result.removed_one_shots = delivered_one_shots;
        if self.rows.is_empty() {
            self.session_providers = ProviderMask::EMPTY;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::CriteriaFilter;
    use crate::error::ErrorCode;
    use crate::provider::{ProviderKind, ProviderMask};
    use crate::reply::{ClientHandle, Reply, ReplySink};
    use crate::sample::PositionSample;
    use crate::subscription::SubscriptionKey;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct RecordingSink {
        deliveries: StdMutex<Vec<(ClientHandle, Reply)>>,
    }

    impl RecordingSink {
        fn count(&self) -> usize {
            self.deliveries.lock().expect("lock deliveries").len()
        }

        fn failures(&self) -> usize {
            self.deliveries
                .lock()
                .expect("lock deliveries")
                .iter()
                .filter(|(_, reply)| reply.is_failure())
                .count()
        }
    }

    #[async_trait]
    impl ReplySink for RecordingSink {
        async fn deliver(&self, client: ClientHandle, reply: Reply) {
            self.deliveries
                .lock()
                .expect("lock deliveries")
                .push((client, reply));
        }
    }

    fn sample_at(latitude: f64, longitude: f64) -> PositionSample {
        PositionSample {
            timestamp_millis: 0,
            latitude,
            longitude,
            altitude: 0.0,
            speed: 0.0,
            direction: 0.0,
            horizontal_accuracy: 20.0,
            vertical_accuracy: 0.0,
        }
    }

    fn gps_filter(min_interval: Duration, min_distance: f64) -> CriteriaFilter {
        let mut filter = CriteriaFilter::default();
        filter.register(
            &SubscriptionKey::new("startTrackingCriteriaBased:gps"),
            ClientHandle::new(1),
            true,
            ProviderMask::of(&[ProviderKind::Gps]),
            min_interval,
            min_distance,
        );
        filter.add_session_providers(ProviderMask::of(&[ProviderKind::Gps]));
        filter
    }

    #[tokio::test]
    async fn zero_criteria_deliver_every_update() {
        let mut filter = gps_filter(Duration::ZERO, 0.0);
        let sink = RecordingSink::default();
        let start = Instant::now();

        for step in 0..3u64 {
            filter
                .on_raw_update(
                    ProviderKind::Gps,
                    &Ok(sample_at(37.39, -122.08)),
                    start + Duration::from_millis(step),
                    &sink,
                )
                .await;
        }

        assert_eq!(sink.count(), 3);
    }

    #[tokio::test]
    async fn interval_throttle_withholds_until_elapsed() {
        let mut filter = gps_filter(Duration::from_millis(1000), 0.0);
        let sink = RecordingSink::default();
        let start = Instant::now();
        let fix = sample_at(37.39, -122.08);

        filter
            .on_raw_update(ProviderKind::Gps, &Ok(fix), start, &sink)
            .await;
        filter
            .on_raw_update(
                ProviderKind::Gps,
                &Ok(fix),
                start + Duration::from_millis(500),
                &sink,
            )
            .await;
        filter
            .on_raw_update(
                ProviderKind::Gps,
                &Ok(fix),
                start + Duration::from_millis(1100),
                &sink,
            )
            .await;

        assert_eq!(sink.count(), 2);
    }

    #[tokio::test]
    async fn distance_throttle_compares_against_last_reported_point() {
        let sink = RecordingSink::default();
        let start = Instant::now();

        // ~11m apart; a 50m floor withholds the second update.
        let mut strict = gps_filter(Duration::ZERO, 50.0);
        strict
            .on_raw_update(
                ProviderKind::Gps,
                &Ok(sample_at(37.3900, -122.0800)),
                start,
                &sink,
            )
            .await;
        strict
            .on_raw_update(
                ProviderKind::Gps,
                &Ok(sample_at(37.3901, -122.0800)),
                start + Duration::from_millis(1),
                &sink,
            )
            .await;
        assert_eq!(sink.count(), 1);

        // The same two points pass a 5m floor.
        let mut loose = gps_filter(Duration::ZERO, 5.0);
        loose
            .on_raw_update(
                ProviderKind::Gps,
                &Ok(sample_at(37.3900, -122.0800)),
                start,
                &sink,
            )
            .await;
        loose
            .on_raw_update(
                ProviderKind::Gps,
                &Ok(sample_at(37.3901, -122.0800)),
                start + Duration::from_millis(1),
                &sink,
            )
            .await;
        assert_eq!(sink.count(), 3);
    }

    #[tokio::test]
    async fn skipped_update_does_not_advance_throttle_state() {
        let mut filter = gps_filter(Duration::ZERO, 50.0);
        let sink = RecordingSink::default();
        let start = Instant::now();

        filter
            .on_raw_update(
                ProviderKind::Gps,
                &Ok(sample_at(37.3900, -122.0800)),
                start,
                &sink,
            )
            .await;
        // Two ~11m steps are each withheld against the first point, but the
        // accumulated ~22m passes on the third update.
        filter
            .on_raw_update(
                ProviderKind::Gps,
                &Ok(sample_at(37.3901, -122.0800)),
                start + Duration::from_millis(1),
                &sink,
            )
            .await;
        filter
            .on_raw_update(
                ProviderKind::Gps,
                &Ok(sample_at(37.3905, -122.0800)),
                start + Duration::from_millis(2),
                &sink,
            )
            .await;

        assert_eq!(sink.count(), 2);
    }

    #[tokio::test]
    async fn partial_source_failure_is_absorbed_until_mask_empties() {
        let mut filter = CriteriaFilter::default();
        let sink = RecordingSink::default();
        filter.register(
            &SubscriptionKey::new("startTrackingCriteriaBased"),
            ClientHandle::new(1),
            true,
            ProviderMask::of(&[ProviderKind::Gps, ProviderKind::WifiNetwork]),
            Duration::ZERO,
            0.0,
        );
        filter.add_session_providers(ProviderMask::of(&[
            ProviderKind::Gps,
            ProviderKind::WifiNetwork,
        ]));

        let result = filter
            .on_raw_update(
                ProviderKind::WifiNetwork,
                &Err(ErrorCode::PosNotAvailable),
                Instant::now(),
                &sink,
            )
            .await;
        assert!(!result.session_failed);
        assert_eq!(sink.failures(), 0);

        let result = filter
            .on_raw_update(
                ProviderKind::Gps,
                &Err(ErrorCode::PosNotAvailable),
                Instant::now(),
                &sink,
            )
            .await;
        assert!(result.session_failed);
        assert_eq!(sink.failures(), 1);
        assert!(!filter.has_rows());
    }

    #[tokio::test]
    async fn one_shot_row_is_removed_after_first_delivery() {
        let mut filter = CriteriaFilter::default();
        let sink = RecordingSink::default();
        let key = SubscriptionKey::new("getLocationUpdates:gps");
        filter.register(
            &key,
            ClientHandle::new(7),
            false,
            ProviderMask::of(&[ProviderKind::Gps]),
            Duration::ZERO,
            0.0,
        );

        let result = filter
            .on_raw_update(
                ProviderKind::Gps,
                &Ok(sample_at(37.39, -122.08)),
                Instant::now(),
                &sink,
            )
            .await;

        assert_eq!(result.removed_one_shots, vec![ClientHandle::new(7)]);
        assert_eq!(result.emptied_keys, vec![key]);
        assert!(!filter.has_rows());
    }

    #[tokio::test]
    async fn update_only_feeds_rows_selecting_that_provider() {
        let mut filter = CriteriaFilter::default();
        let sink = RecordingSink::default();
        filter.register(
            &SubscriptionKey::new("startTrackingCriteriaBased:network"),
            ClientHandle::new(2),
            true,
            ProviderMask::of(&[ProviderKind::WifiNetwork, ProviderKind::CellNetwork]),
            Duration::ZERO,
            0.0,
        );

        filter
            .on_raw_update(
                ProviderKind::Gps,
                &Ok(sample_at(37.39, -122.08)),
                Instant::now(),
                &sink,
            )
            .await;

        assert_eq!(sink.count(), 0);
    }
}
