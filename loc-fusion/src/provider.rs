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

//! Provider identity, operation bitsets and the async provider boundary.

use crate::error::{ErrorCode, StartFailure};
use crate::sample::PositionSample;
use async_trait::async_trait;
use std::fmt;
use std::fmt::{Debug, Formatter};
use tokio::sync::mpsc::UnboundedSender;

/// Identity of one position source as seen by the orchestrator.
///
/// `WifiNetwork` and `CellNetwork` share a single underlying network handler
/// instance but keep independent in-flight state.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ProviderKind {
    Gps = 0,
    WifiNetwork = 1,
    CellNetwork = 2,
    Geocode = 3,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Gps,
        ProviderKind::WifiNetwork,
        ProviderKind::CellNetwork,
        ProviderKind::Geocode,
    ];

    pub(crate) const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    pub const fn label(self) -> &'static str {
        match self {
            ProviderKind::Gps => "gps",
            ProviderKind::WifiNetwork => "wifi",
            ProviderKind::CellNetwork => "cell",
            ProviderKind::Geocode => "geocode",
        }
    }

    /// The handler slot backing this kind. Wifi and Cell alias the shared
    /// network handler.
    pub(crate) const fn slot(self) -> ProviderSlot {
        match self {
            ProviderKind::Gps => ProviderSlot::Gps,
            ProviderKind::WifiNetwork | ProviderKind::CellNetwork => ProviderSlot::Network,
            ProviderKind::Geocode => ProviderSlot::Geocode,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Physical handler slots. One provider instance exists per slot.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ProviderSlot {
    Gps = 0,
    Network = 1,
    Geocode = 2,
}

impl ProviderSlot {
    /// Kinds multiplexed onto this slot.
    pub(crate) const fn kinds(self) -> &'static [ProviderKind] {
        match self {
            ProviderSlot::Gps => &[ProviderKind::Gps],
            ProviderSlot::Network => &[ProviderKind::WifiNetwork, ProviderKind::CellNetwork],
            ProviderSlot::Geocode => &[ProviderKind::Geocode],
        }
    }
}

/// Bitset over [`ProviderKind`].
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
pub struct ProviderMask(u8);

impl ProviderMask {
    pub const EMPTY: ProviderMask = ProviderMask(0);

    pub fn of(kinds: &[ProviderKind]) -> Self {
        let mut mask = Self::EMPTY;
        for kind in kinds {
            mask.insert(*kind);
        }
        mask
    }

    pub fn insert(&mut self, kind: ProviderKind) {
        self.0 |= kind.bit();
    }

    pub fn remove(&mut self, kind: ProviderKind) {
        self.0 &= !kind.bit();
    }

    pub fn with(mut self, kind: ProviderKind) -> Self {
        self.insert(kind);
        self
    }

    pub fn contains(self, kind: ProviderKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}

impl Debug for ProviderMask {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Async operation classes tracked per provider kind.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum OperationKind {
    GetPosition = 0,
    StartTracking = 1,
    GetNmea = 2,
    GetSatellite = 3,
}

impl OperationKind {
    const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    pub const fn label(self) -> &'static str {
        match self {
            OperationKind::GetPosition => "get_position",
            OperationKind::StartTracking => "start_tracking",
            OperationKind::GetNmea => "get_nmea",
            OperationKind::GetSatellite => "get_satellite",
        }
    }
}

/// Bitset over [`OperationKind`]. One bit is set iff an async call of that
/// kind is outstanding for the provider.
#[derive(Clone, Copy, Default, Eq, PartialEq)]
pub struct OperationMask(u8);

impl OperationMask {
    pub const EMPTY: OperationMask = OperationMask(0);

    pub fn insert(&mut self, operation: OperationKind) {
        self.0 |= operation.bit();
    }

    pub fn remove(&mut self, operation: OperationKind) {
        self.0 &= !operation.bit();
    }

    pub fn contains(self, operation: OperationKind) -> bool {
        self.0 & operation.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

impl Debug for OperationMask {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let operations = [
            OperationKind::GetPosition,
            OperationKind::StartTracking,
            OperationKind::GetNmea,
            OperationKind::GetSatellite,
        ];
        f.debug_set()
            .entries(
                operations
                    .into_iter()
                    .filter(|operation| self.contains(*operation)),
            )
            .finish()
    }
}

/// Result of one asynchronous provider operation.
pub type ProviderOutcome = Result<PositionSample, ErrorCode>;

/// Events a provider hands back to the engine loop.
///
/// Providers never touch engine state directly; worker threads and driver
/// callbacks deliver through this message and the engine loop applies it.
#[derive(Debug)]
pub struct ProviderReply {
    pub kind: ProviderKind,
    pub operation: OperationKind,
    pub generation: u64,
    pub outcome: ProviderOutcome,
}

/// Capability handed to a provider at issue time for delivering one
/// operation's result(s) back to the engine loop.
///
/// Tracking operations deliver repeatedly through the same request; one-shot
/// operations deliver once. The generation is captured when the operation is
/// issued so results of a force-stopped generation are mechanically dropped
/// at the loop boundary.
#[derive(Clone)]
pub struct ProviderRequest {
    kind: ProviderKind,
    operation: OperationKind,
    generation: u64,
    replies: UnboundedSender<ProviderReply>,
}

impl ProviderRequest {
    pub(crate) fn new(
        kind: ProviderKind,
        operation: OperationKind,
        generation: u64,
        replies: UnboundedSender<ProviderReply>,
    ) -> Self {
        Self {
            kind,
            operation,
            generation,
            replies,
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    /// Delivers one outcome to the engine loop. Send failure means the
    /// engine is gone; there is nothing useful left to do with the result.
    pub fn deliver(&self, outcome: ProviderOutcome) {
        let _ = self.replies.send(ProviderReply {
            kind: self.kind,
            operation: self.operation,
            generation: self.generation,
            outcome,
        });
    }
}

impl Debug for ProviderRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRequest")
            .field("kind", &self.kind)
            .field("operation", &self.operation)
            .field("generation", &self.generation)
            .finish()
    }
}

/// The driver boundary behind which a concrete position source lives.
///
/// Implementations may run their own worker threads; results cross back into
/// the engine only through [`ProviderRequest::deliver`]. Calls must not
/// block the caller beyond queueing work.
#[async_trait]
pub trait PositionProvider: Send + Sync {
    /// Brings the source up. Called once per slot while any kind using the
    /// slot is started.
    async fn start(&self) -> Result<(), StartFailure>;

    /// Tears the source down, ending any tracking delivery loop.
    async fn stop(&self);

    /// Issues a single position request; the result arrives through
    /// `request.deliver` exactly once.
    async fn request_position(&self, request: ProviderRequest);

    /// Begins continuous tracking; fixes arrive through `request.deliver`
    /// until the source is stopped.
    async fn request_tracking(&self, request: ProviderRequest);
}
