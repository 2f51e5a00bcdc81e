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

//! Error taxonomy crossing the API boundary, and internal lifecycle errors.

use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};

/// Client-visible error codes with stable wire discriminants.
///
/// Per-source failures are absorbed and composed inside the engine; only a
/// final composed outcome carrying one of these codes crosses the API
/// boundary. `DuplicateRequest` never does — it is recovered silently.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    Success = 0,
    TimeOut = 1,
    PosNotAvailable = 2,
    UnknownError = 3,
    SourceUnavailable = 4,
    LocationOff = 5,
    InvalidInput = 6,
    DataConnectionOff = 7,
    WifiConnectionOff = 8,
    OutOfMemory = 9,
    StartFailure = 10,
    DuplicateRequest = 11,
    GeofenceTooManyGeofence = 100,
    GeofenceIdExist = 101,
    GeofenceIdUnknown = 102,
    GeofenceInvalidTransition = 103,
}

impl ErrorCode {
    /// Wire integer carried in the `errorCode` field.
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Wire text carried in the `errorText` field.
    pub const fn message(self) -> &'static str {
        match self {
            ErrorCode::Success => "Success",
            ErrorCode::TimeOut => "Response timed out",
            ErrorCode::PosNotAvailable => "Position not available",
            ErrorCode::UnknownError => "Unknown error",
            ErrorCode::SourceUnavailable => "Source unavailable",
            ErrorCode::LocationOff => "All location sources are off",
            ErrorCode::InvalidInput => "Invalid input",
            ErrorCode::DataConnectionOff => "Data connection is off",
            ErrorCode::WifiConnectionOff => "Wifi connection is off",
            ErrorCode::OutOfMemory => "Out of memory",
            ErrorCode::StartFailure => "Failed to start location source",
            ErrorCode::DuplicateRequest => "Request already in flight",
            ErrorCode::GeofenceTooManyGeofence => "Too many geofences",
            ErrorCode::GeofenceIdExist => "Geofence id already exists",
            ErrorCode::GeofenceIdUnknown => "Unknown geofence id",
            ErrorCode::GeofenceInvalidTransition => "Invalid geofence transition",
        }
    }

    pub const fn is_success(self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Parses a wire integer back into a code.
    pub const fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => ErrorCode::Success,
            1 => ErrorCode::TimeOut,
            2 => ErrorCode::PosNotAvailable,
            3 => ErrorCode::UnknownError,
            4 => ErrorCode::SourceUnavailable,
            5 => ErrorCode::LocationOff,
            6 => ErrorCode::InvalidInput,
            7 => ErrorCode::DataConnectionOff,
            8 => ErrorCode::WifiConnectionOff,
            9 => ErrorCode::OutOfMemory,
            10 => ErrorCode::StartFailure,
            11 => ErrorCode::DuplicateRequest,
            100 => ErrorCode::GeofenceTooManyGeofence,
            101 => ErrorCode::GeofenceIdExist,
            102 => ErrorCode::GeofenceIdUnknown,
            103 => ErrorCode::GeofenceInvalidTransition,
            _ => return None,
        })
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

/// Failure bringing a provider up at the driver boundary.
#[derive(Debug)]
pub enum StartFailure {
    /// The driver rejected the start request.
    Rejected(String),
    /// The source is not present on this device.
    Unavailable,
}

impl Display for StartFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StartFailure::Rejected(reason) => write!(f, "provider start rejected: {reason}"),
            StartFailure::Unavailable => write!(f, "provider unavailable on this device"),
        }
    }
}

impl Error for StartFailure {}

impl StartFailure {
    pub(crate) fn error_code(&self) -> ErrorCode {
        match self {
            StartFailure::Rejected(_) => ErrorCode::StartFailure,
            StartFailure::Unavailable => ErrorCode::SourceUnavailable,
        }
    }
}

/// Refusal to stop a provider whose in-flight mask is non-empty.
#[derive(Debug, Eq, PartialEq)]
pub enum StopError {
    Busy,
}

impl Display for StopError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StopError::Busy => write!(f, "provider busy with in-flight operations"),
        }
    }
}

impl Error for StopError {}

/// Refusal to issue an async operation through the lifecycle manager.
#[derive(Debug, Eq, PartialEq)]
pub enum IssueError {
    /// The provider has not been started.
    NotStarted,
    /// An operation of the same kind is already outstanding. Recovered
    /// silently by the orchestrator, never surfaced to clients.
    Duplicate,
}

impl Display for IssueError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            IssueError::NotStarted => write!(f, "provider not started"),
            IssueError::Duplicate => write!(f, "operation of this kind already in flight"),
        }
    }
}

impl Error for IssueError {}
