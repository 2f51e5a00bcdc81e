//! Canonical structured event names used across `loc-fusion`.

// Handler lifecycle events.
pub const HANDLER_START_OK: &str = "handler_start_ok";
pub const HANDLER_START_FAILED: &str = "handler_start_failed";
pub const HANDLER_STOP_OK: &str = "handler_stop_ok";
pub const HANDLER_STOP_REFUSED_BUSY: &str = "handler_stop_refused_busy";
pub const HANDLER_FORCE_STOP: &str = "handler_force_stop";
pub const HANDLER_ISSUE_DUPLICATE: &str = "handler_issue_duplicate";
pub const HANDLER_REPLY_STALE_GENERATION: &str = "handler_reply_stale_generation";
pub const HANDLER_FIX_CACHED: &str = "handler_fix_cached";

// Orchestrator request events.
pub const REQUEST_CACHE_HIT: &str = "request_cache_hit";
pub const REQUEST_REJECTED: &str = "request_rejected";
pub const REQUEST_FAN_OUT: &str = "request_fan_out";
pub const REQUEST_REPLY_SENT: &str = "request_reply_sent";
pub const REQUEST_TIMEOUT: &str = "request_timeout";
pub const REQUEST_TIMER_STALE: &str = "request_timer_stale";

// Subscription multiplexer events.
pub const SUBSCRIPTION_ADDED: &str = "subscription_added";
pub const SUBSCRIPTION_CANCELLED: &str = "subscription_cancelled";
pub const SUBSCRIPTION_KEY_EMPTIED: &str = "subscription_key_emptied";
pub const SUBSCRIPTION_PUBLISH: &str = "subscription_publish";

// Criteria filter events.
pub const CRITERIA_DELIVERED: &str = "criteria_delivered";
pub const CRITERIA_THROTTLED: &str = "criteria_throttled";
pub const CRITERIA_SESSION_FAILED: &str = "criteria_session_failed";

// Tracking events.
pub const TRACKING_STARTED: &str = "tracking_started";
pub const TRACKING_PUBLISH: &str = "tracking_publish";
pub const TRACKING_THROTTLED: &str = "tracking_throttled";
pub const TRACKING_SOURCE_LOST: &str = "tracking_source_lost";
pub const TRACKING_STOPPED: &str = "tracking_stopped";

// Geofence events.
pub const GEOFENCE_ADDED: &str = "geofence_added";
pub const GEOFENCE_REMOVED: &str = "geofence_removed";
pub const GEOFENCE_TRANSITION: &str = "geofence_transition";
pub const GEOFENCE_REJECTED: &str = "geofence_rejected";

// Engine runtime events.
pub const ENGINE_STARTED: &str = "engine_started";
pub const ENGINE_STOPPED: &str = "engine_stopped";
pub const ENGINE_CLIENT_CANCELLED: &str = "engine_client_cancelled";
pub const ENGINE_STATE_CHANGED: &str = "engine_state_changed";
