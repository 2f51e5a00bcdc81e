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

//! Pending one-shot request table with linear fan-in scanning.

use crate::provider::{ProviderKind, ProviderMask};
use crate::reply::ClientHandle;
use std::time::Instant;

/// One waiting one-shot request.
///
/// Identity is the client handle. Destroyed when the provider mask empties,
/// when any source reports success, or when the response timer fires —
/// whichever comes first.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    pub(crate) client: ClientHandle,
    pub(crate) providers: ProviderMask,
    pub(crate) timer_id: u64,
    #[allow(dead_code)]
    pub(crate) created_at: Instant,
}

/// Why a pending request resolved on a provider callback.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ResolutionCause {
    /// A source reported success; the success payload wins.
    Success,
    /// The last awaited source failed.
    Exhausted,
}

#[derive(Debug)]
pub(crate) struct Resolution {
    pub(crate) client: ClientHandle,
    pub(crate) cause: ResolutionCause,
}

/// Ordered pending-request collection.
///
/// Scanned linearly on every provider reply; expected concurrency is low and
/// several requests from different clients may legitimately wait on the same
/// provider, so the scan must visit every entry rather than dedupe by
/// handle.
#[derive(Default)]
pub(crate) struct PendingTable {
    entries: Vec<PendingRequest>,
}

impl PendingTable {
    pub(crate) fn insert(&mut self, request: PendingRequest) {
        self.entries.push(request);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether any entry still awaits this provider.
    pub(crate) fn waiting_on(&self, kind: ProviderKind) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.providers.contains(kind))
    }

    /// Applies one provider outcome to every entry awaiting that provider.
    ///
    /// On success every matching entry resolves; on failure the provider bit
    /// is cleared and entries whose mask emptied resolve as exhausted.
    pub(crate) fn on_provider_outcome(
        &mut self,
        kind: ProviderKind,
        success: bool,
    ) -> Vec<Resolution> {
        let mut resolutions = Vec::new();
        self.entries.retain_mut(|entry| {
            if !entry.providers.contains(kind) {
                return true;
            }
            entry.providers.remove(kind);
            if success {
                resolutions.push(Resolution {
                    client: entry.client,
                    cause: ResolutionCause::Success,
                });
                false
            } else if entry.providers.is_empty() {
                resolutions.push(Resolution {
                    client: entry.client,
                    cause: ResolutionCause::Exhausted,
                });
                false
            } else {
                true
            }
        });
        resolutions
    }

    /// Takes the entry owning a fired timer. A missing entry means the
    /// request already resolved and the timer is stale.
    pub(crate) fn take_by_timer(&mut self, timer_id: u64) -> Option<PendingRequest> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.timer_id == timer_id)?;
        Some(self.entries.remove(index))
    }

    /// Drops every entry owned by a disconnected client.
    pub(crate) fn remove_client(&mut self, client: ClientHandle) -> Vec<PendingRequest> {
        let mut removed = Vec::new();
        self.entries.retain_mut(|entry| {
            if entry.client == client {
                removed.push(PendingRequest {
                    client: entry.client,
                    providers: entry.providers,
                    timer_id: entry.timer_id,
                    created_at: entry.created_at,
                });
                false
            } else {
                true
            }
        });
        removed
    }
}
