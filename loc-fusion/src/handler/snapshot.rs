//! Lock-free last-known-fix snapshot readable outside the engine loop.

use crate::provider::ProviderKind;
use crate::sample::PositionSample;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared, atomically-replaced view of the per-provider fix cache.
///
/// The engine loop is the only writer; the bus layer reads it to answer
/// cached-position queries without entering the loop.
#[derive(Clone)]
pub struct FixCacheSnapshot {
    fixes: Arc<ArcSwap<HashMap<ProviderKind, PositionSample>>>,
}

impl Default for FixCacheSnapshot {
    fn default() -> Self {
        Self {
            fixes: Arc::new(ArcSwap::from_pointee(HashMap::new())),
        }
    }
}

impl FixCacheSnapshot {
    pub(crate) fn replace(&self, fixes: HashMap<ProviderKind, PositionSample>) {
        self.fixes.store(Arc::new(fixes));
    }

    pub(crate) fn record(&self, kind: ProviderKind, sample: PositionSample) {
        let mut next = HashMap::clone(&self.fixes.load());
        next.insert(kind, sample);
        self.fixes.store(Arc::new(next));
    }

    /// Fix for one provider kind, if any has been cached.
    pub fn fix(&self, kind: ProviderKind) -> Option<PositionSample> {
        self.fixes.load().get(&kind).copied()
    }

    /// Best cached fix by horizontal accuracy across the given kinds,
    /// optionally bounded by a maximum age.
    pub fn best_fix(
        &self,
        kinds: &[ProviderKind],
        max_age_millis: Option<u64>,
        now_millis: u64,
    ) -> Option<PositionSample> {
        let fixes = self.fixes.load();
        kinds
            .iter()
            .filter_map(|kind| fixes.get(kind))
            .filter(|sample| match max_age_millis {
                Some(max_age) => sample.age_millis(now_millis) <= max_age,
                None => true,
            })
            .min_by(|a, b| {
                a.horizontal_accuracy
                    .partial_cmp(&b.horizontal_accuracy)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::FixCacheSnapshot;
    use crate::provider::ProviderKind;
    use crate::sample::PositionSample;

    fn sample(timestamp_millis: u64, horizontal_accuracy: f64) -> PositionSample {
        PositionSample {
            timestamp_millis,
            latitude: 37.39,
            longitude: -122.08,
            altitude: 0.0,
            speed: 0.0,
            direction: 0.0,
            horizontal_accuracy,
            vertical_accuracy: 0.0,
        }
    }

    #[test]
    fn record_overwrites_one_slot_per_kind() {
        let snapshot = FixCacheSnapshot::default();

        snapshot.record(ProviderKind::Gps, sample(1_000, 30.0));
        snapshot.record(ProviderKind::Gps, sample(2_000, 20.0));

        let fix = snapshot.fix(ProviderKind::Gps).expect("gps fix cached");
        assert_eq!(fix.timestamp_millis, 2_000);
        assert!(snapshot.fix(ProviderKind::WifiNetwork).is_none());
    }

    #[test]
    fn best_fix_prefers_lowest_accuracy_within_age() {
        let snapshot = FixCacheSnapshot::default();
        snapshot.record(ProviderKind::Gps, sample(9_000, 15.0));
        snapshot.record(ProviderKind::WifiNetwork, sample(10_000, 80.0));

        let best = snapshot
            .best_fix(
                &[ProviderKind::Gps, ProviderKind::WifiNetwork],
                None,
                10_000,
            )
            .expect("a fix should match");
        assert_eq!(best.horizontal_accuracy, 15.0);

        // Age bound of 500ms excludes the more accurate but older gps fix.
        let recent = snapshot
            .best_fix(
                &[ProviderKind::Gps, ProviderKind::WifiNetwork],
                Some(500),
                10_000,
            )
            .expect("wifi fix should match");
        assert_eq!(recent.horizontal_accuracy, 80.0);
    }
}
