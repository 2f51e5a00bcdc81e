//! Subscription-key vocabulary and key-to-provider mapping.

use crate::engine::selection::HandlerSelector;
use crate::state::StateHandler;
use crate::subscription::SubscriptionKey;

pub(crate) const START_TRACKING: &str = "startTracking";
pub(crate) const LOCATION_UPDATES: &str = "getLocationUpdates";
pub(crate) const LOCATION_UPDATES_GPS: &str = "getLocationUpdates:gps";
pub(crate) const LOCATION_UPDATES_NETWORK: &str = "getLocationUpdates:network";
pub(crate) const CRITERIA_TRACKING: &str = "startTrackingCriteriaBased";
pub(crate) const CRITERIA_TRACKING_GPS: &str = "startTrackingCriteriaBased:gps";
pub(crate) const CRITERIA_TRACKING_NETWORK: &str = "startTrackingCriteriaBased:network";
pub(crate) const STATE_GPS: &str = "getState:gps";
pub(crate) const STATE_NETWORK: &str = "getState:network";

pub(crate) fn start_tracking_key() -> SubscriptionKey {
    SubscriptionKey::new(START_TRACKING)
}

pub(crate) fn updates_key(selector: HandlerSelector) -> SubscriptionKey {
    SubscriptionKey::new(match selector {
        HandlerSelector::Gps => LOCATION_UPDATES_GPS,
        HandlerSelector::Network => LOCATION_UPDATES_NETWORK,
        HandlerSelector::Combined => LOCATION_UPDATES,
    })
}

pub(crate) fn criteria_key(selector: HandlerSelector) -> SubscriptionKey {
    SubscriptionKey::new(match selector {
        HandlerSelector::Gps => CRITERIA_TRACKING_GPS,
        HandlerSelector::Network => CRITERIA_TRACKING_NETWORK,
        HandlerSelector::Combined => CRITERIA_TRACKING,
    })
}

pub(crate) fn state_key(handler: StateHandler) -> SubscriptionKey {
    SubscriptionKey::new(match handler {
        StateHandler::Gps => STATE_GPS,
        StateHandler::Network => STATE_NETWORK,
    })
}

pub(crate) fn geofence_key(id: u32) -> SubscriptionKey {
    SubscriptionKey::new(format!("geofence:{id}"))
}
