//
// Copyright 2024 RoomRTC Contributors
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Common error codes.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::common::{CallId, RoomId};

/// Reasons a call failed or ended.
///
/// These are surfaced to the owner on the error channel and, where a hangup
/// goes out on the wire, carried as its `reason` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallErrorCode {
    /// The user chose to end the call.
    UserHangup,

    /// The local offer could not be created.
    LocalOfferFailed,

    /// Local media could not be acquired.
    NoUserMedia,

    /// The transport reported unknown devices in the room.
    UnknownDevices,

    /// The invite could not be sent.
    SendInvite,

    /// The answer could not be created.
    CreateAnswer,

    /// The answer could not be sent.
    SendAnswer,

    /// The remote description could not be applied.
    SetRemoteDescription,

    /// The local description could not be applied.
    SetLocalDescription,

    /// Another of our devices answered the call.
    AnsweredElsewhere,

    /// ICE connectivity could not be established or was lost.
    IceFailed,

    /// Nobody answered before the invite timed out.
    InviteTimeout,

    /// The call was replaced by another during glare resolution.
    Replaced,

    /// A mid-call signaling message could not be sent.
    SignallingFailed,
}

impl fmt::Display for CallErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// An error surfaced to the call owner on the error channel.
#[derive(Clone, Debug, Error)]
#[error("{code}: {message}")]
pub struct CallError {
    pub code: CallErrorCode,
    pub message: String,
}

impl CallError {
    pub fn new(code: CallErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Internal error conditions.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Mutex poisoned: {0}")]
    MutexPoisoned(&'static str),

    #[error("Expecting non-none option value in: {0}, var: {1}")]
    OptionValueNotSet(String, String),

    #[error("No call observer registered")]
    ObserverNotSet,

    #[error("Call already in progress for room: {0}")]
    CallAlreadyInProgress(RoomId),

    #[error("CallId not found in call map: {0}")]
    CallIdNotFound(CallId),

    #[error("Peer connection not created yet")]
    PeerConnectionNotSet,

    #[error("Event stream closed while sending")]
    EventStreamClosed,
}
