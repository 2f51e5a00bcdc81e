//! Continuous-tracking session state and the shared delivery throttle.

use crate::provider::{ProviderKind, ProviderMask};
use crate::sample::PositionSample;
use std::time::{Duration, Instant};

/// Delivery policy for the shared tracking stream: wait for a first fix
/// meeting the minimal accuracy, deliver it immediately, then cap the
/// publish rate at the configured interval.
#[derive(Debug)]
pub(crate) struct TrackingThrottle {
    min_accuracy_meters: f64,
    interval: Duration,
    delivered_first: bool,
    last_publish_at: Option<Instant>,
}

impl TrackingThrottle {
    pub(crate) fn new(min_accuracy_meters: f64, interval: Duration) -> Self {
        Self {
            min_accuracy_meters,
            interval,
            delivered_first: false,
            last_publish_at: None,
        }
    }

    /// Whether this fix should be published, updating throttle state when it
    /// is admitted.
    pub(crate) fn admit(&mut self, sample: &PositionSample, now: Instant) -> bool {
        if !self.delivered_first {
            if sample.horizontal_accuracy > self.min_accuracy_meters {
                return false;
            }
            self.delivered_first = true;
            self.last_publish_at = Some(now);
            return true;
        }
        match self.last_publish_at {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last_publish_at = Some(now);
                true
            }
        }
    }

    pub(crate) fn reset(&mut self) {
        self.delivered_first = false;
        self.last_publish_at = None;
    }
}

/// Tracking-scoped provider mask and throttle for the plain tracking
/// methods. Criteria-based sessions carry their own mask in the filter.
#[derive(Debug)]
pub(crate) struct TrackingSession {
    pub(crate) providers: ProviderMask,
    pub(crate) throttle: TrackingThrottle,
}

impl TrackingSession {
    pub(crate) fn new(min_accuracy_meters: f64, interval: Duration) -> Self {
        Self {
            providers: ProviderMask::EMPTY,
            throttle: TrackingThrottle::new(min_accuracy_meters, interval),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        !self.providers.is_empty()
    }

    pub(crate) fn add_providers(&mut self, providers: ProviderMask) {
        for kind in providers.iter() {
            self.providers.insert(kind);
        }
    }

    /// Clears one failed source. True when the mask emptied and the session
    /// is over.
    pub(crate) fn source_lost(&mut self, kind: ProviderKind) -> bool {
        self.providers.remove(kind);
        self.providers.is_empty()
    }

    pub(crate) fn end(&mut self) {
        self.providers = ProviderMask::EMPTY;
        self.throttle.reset();
    }
}
