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

//! Per-key subscriber sets with one-shot drain and emptiness reporting.

use crate::observability::events;
use crate::reply::{ClientHandle, Reply, ReplySink};
use crate::subscription::SubscriptionKey;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};
use tracing::debug;

const COMPONENT: &str = "subscription_multiplexer";

#[derive(Debug, Eq, PartialEq)]
pub(crate) enum SubscribeError {
    AlreadySubscribed,
}

impl Display for SubscribeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SubscribeError::AlreadySubscribed => {
                write!(f, "client already subscribed under this key")
            }
        }
    }
}

impl Error for SubscribeError {}

#[derive(Clone, Copy, Debug)]
struct Subscriber {
    client: ClientHandle,
    persistent: bool,
}

/// Outcome of one publish call.
#[derive(Debug, Default, Eq, PartialEq)]
pub(crate) struct PublishOutcome {
    pub(crate) delivered: usize,
    /// The key's subscriber set transitioned to empty during this call.
    pub(crate) emptied: bool,
}

/// Maps a key to its subscriber set and reports empty transitions so the
/// owner can stop the provider(s) the key represents.
#[derive(Default)]
pub(crate) struct SubscriptionMultiplexer {
    keys: HashMap<SubscriptionKey, Vec<Subscriber>>,
}

impl SubscriptionMultiplexer {
    /// Adds one subscriber under a key. A client subscribes at most once per
    /// key; a second subscribe is refused rather than silently merged.
    pub(crate) fn subscribe(
        &mut self,
        key: &SubscriptionKey,
        client: ClientHandle,
        persistent: bool,
    ) -> Result<(), SubscribeError> {
        let subscribers = self.keys.entry(key.clone()).or_default();
        if subscribers.iter().any(|existing| existing.client == client) {
            return Err(SubscribeError::AlreadySubscribed);
        }
        subscribers.push(Subscriber { client, persistent });
        debug!(
            event = events::SUBSCRIPTION_ADDED,
            component = COMPONENT,
            key = %key,
            client = %client,
            persistent,
            "subscriber added"
        );
        Ok(())
    }

    /// Removes the client from every key it appears under, returning the
    /// keys whose subscriber set became empty.
    pub(crate) fn cancel(&mut self, client: ClientHandle) -> Vec<SubscriptionKey> {
        let mut emptied = Vec::new();
        self.keys.retain(|key, subscribers| {
            let before = subscribers.len();
            subscribers.retain(|subscriber| subscriber.client != client);
            if subscribers.len() != before {
                debug!(
                    event = events::SUBSCRIPTION_CANCELLED,
                    component = COMPONENT,
                    key = %key,
                    client = %client,
                    "subscriber cancelled"
                );
            }
            if subscribers.is_empty() {
                emptied.push(key.clone());
                false
            } else {
                true
            }
        });
        for key in &emptied {
            debug!(
                event = events::SUBSCRIPTION_KEY_EMPTIED,
                component = COMPONENT,
                key = %key,
                "subscriber set emptied"
            );
        }
        emptied
    }

    /// Delivers a payload to every persistent subscriber and to exactly one
    /// pending one-shot subscriber, removing the latter afterwards.
    pub(crate) async fn publish(
        &mut self,
        key: &SubscriptionKey,
        reply: &Reply,
        sink: &dyn ReplySink,
    ) -> PublishOutcome {
        let Some(subscribers) = self.keys.get_mut(key) else {
            return PublishOutcome::default();
        };

        let mut targets: Vec<ClientHandle> = Vec::new();
        let mut one_shot_taken = false;
        subscribers.retain(|subscriber| {
            if subscriber.persistent {
                targets.push(subscriber.client);
                true
            } else if !one_shot_taken {
                one_shot_taken = true;
                targets.push(subscriber.client);
                false
            } else {
                true
            }
        });

        let emptied = subscribers.is_empty();
        if emptied {
            self.keys.remove(key);
            debug!(
                event = events::SUBSCRIPTION_KEY_EMPTIED,
                component = COMPONENT,
                key = %key,
                "subscriber set emptied after one-shot drain"
            );
        }

        for client in &targets {
            sink.deliver(*client, reply.clone()).await;
        }
        debug!(
            event = events::SUBSCRIPTION_PUBLISH,
            component = COMPONENT,
            key = %key,
            delivered = targets.len(),
            "published payload"
        );

        PublishOutcome {
            delivered: targets.len(),
            emptied,
        }
    }

    /// Delivers to every subscriber under the key, persistent or not, then
    /// removes the key entirely. Used for throttle-bypassing failure
    /// notifications that end a stream.
    pub(crate) async fn broadcast_and_clear(
        &mut self,
        key: &SubscriptionKey,
        reply: &Reply,
        sink: &dyn ReplySink,
    ) -> usize {
        let Some(subscribers) = self.keys.remove(key) else {
            return 0;
        };
        for subscriber in &subscribers {
            sink.deliver(subscriber.client, reply.clone()).await;
        }
        debug!(
            event = events::SUBSCRIPTION_KEY_EMPTIED,
            component = COMPONENT,
            key = %key,
            delivered = subscribers.len(),
            "key cleared after broadcast"
        );
        subscribers.len()
    }

    pub(crate) fn is_empty(&self, key: &SubscriptionKey) -> bool {
        self.keys
            .get(key)
            .map(|subscribers| subscribers.is_empty())
            .unwrap_or(true)
    }

    pub(crate) fn subscriber_count(&self, key: &SubscriptionKey) -> usize {
        self.keys
            .get(key)
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }
}
