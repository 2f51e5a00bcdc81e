//! Subscription layer.
//!
//! Owns per-key subscriber sets, one-shot drain semantics, emptiness
//! detection that drives provider shutdown, and the criteria-based
//! interval/distance throttle applied on top of the multiplexer.

pub(crate) mod criteria;
pub(crate) mod distance;
pub(crate) mod multiplexer;

use std::fmt;
use std::fmt::{Display, Formatter};

/// Opaque key identifying an API method and, where relevant, a provider
/// combination. Distinct keys exist for GPS-only, network-only and combined
/// tracking so composite emptiness can be checked independently.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SubscriptionKey(String);

impl SubscriptionKey {
    pub fn new(key: impl Into<String>) -> Self {
        SubscriptionKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SubscriptionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
