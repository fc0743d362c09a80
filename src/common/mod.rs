//
// Copyright 2024 RoomRTC Contributors
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Common types used throughout the library.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Common Result type, using `anyhow::Error` for Error.
pub type Result<T> = std::result::Result<T, anyhow::Error>;

/// Unique call identifier, carried on every signaling message.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId {
    id: String,
}

impl CallId {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn random() -> Self {
        Self::new(format!("c{:016x}", rand::random::<u64>()))
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl fmt::Debug for CallId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl From<&str> for CallId {
    fn from(item: &str) -> Self {
        CallId::new(item)
    }
}

/// Per-device identifier used to disambiguate when multiple devices of the
/// same user race to answer an invite.
pub type PartyId = String;

/// Routing key for the signaling transport.
pub type RoomId = String;

/// The call direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallDirection {
    /// Incoming call.
    Inbound,

    /// Outgoing call.
    Outbound,
}

impl CallDirection {
    /// The polite peer of the perfect-negotiation pattern yields its own
    /// offer on collision. Politeness is fixed by direction for the life of
    /// the call.
    pub fn is_polite(self) -> bool {
        match self {
            CallDirection::Inbound => true,
            CallDirection::Outbound => false,
        }
    }
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Type of media for a call at time of origination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallMediaType {
    /// Call should start as audio only.
    Voice,

    /// Call should start as audio/video.
    Video,
}

impl fmt::Display for CallMediaType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Tracks the state of a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallState {
    /// The call exists but nothing has happened yet.
    Fledgling,

    /// Waiting for local media acquisition.
    WaitLocalMedia,

    /// Outbound: media attached, waiting for the offer to be created.
    CreateOffer,

    /// Outbound: the invite is on the wire, waiting for an answer.
    InviteSent,

    /// Inbound: the remote offer is applied, waiting for the user to answer.
    Ringing,

    /// Inbound: media attached, creating and sending the answer.
    CreateAnswer,

    /// Descriptions exchanged, ICE is connecting.
    Connecting,

    /// The call is established.
    Connected,

    /// Terminal state. Absorbing.
    Ended,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        self == CallState::Ended
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Which side of the call an action is attributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallParty {
    Local,
    Remote,
}

impl fmt::Display for CallParty {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The committed remote party of a call.
///
/// Three-valued: no partner has committed yet, a partner committed without
/// reporting a party id (legacy peer), or a partner committed with an id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpponentPartyId {
    /// No partner has committed to this call yet.
    Unchosen,

    /// A partner committed; `None` means a legacy peer that sent no id.
    Chosen(Option<PartyId>),
}

impl OpponentPartyId {
    pub fn is_chosen(&self) -> bool {
        matches!(self, OpponentPartyId::Chosen(_))
    }

    /// Whether a message carrying `party_id` comes from the committed
    /// partner. Missing ids compare equal to a null-chosen partner.
    pub fn matches(&self, party_id: Option<&PartyId>) -> bool {
        match self {
            OpponentPartyId::Unchosen => false,
            OpponentPartyId::Chosen(chosen) => chosen.as_ref() == party_id,
        }
    }
}

impl fmt::Display for OpponentPartyId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OpponentPartyId::Unchosen => write!(f, "unchosen"),
            OpponentPartyId::Chosen(None) => write!(f, "null"),
            OpponentPartyId::Chosen(Some(id)) => write!(f, "{}", id),
        }
    }
}
