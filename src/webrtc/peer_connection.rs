//
// Copyright 2024 RoomRTC Contributors
// SPDX-License-Identifier: AGPL-3.0-only
//

//! The peer connection capability.
//!
//! The engine drives offer/answer negotiation through this trait; the
//! platform backs it with a real WebRTC peer connection (or the simulation
//! in tests). State change and candidate callbacks flow back through
//! [`crate::webrtc::peer_connection_observer::PeerConnectionObserver`].

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::signaling::{CandidateInit, SessionDescription};
use crate::webrtc::media::MediaStream;

/// Mirror of the W3C signaling states the engine cares about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IceGatheringState {
    New,
    Gathering,
    Complete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl IceConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::Completed)
    }
}

impl fmt::Display for IceConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A failed peer connection operation. The engine classifies failures by the
/// operation it attempted, so the payload is only a diagnostic.
#[derive(Clone, Debug, Error)]
#[error("peer connection: {0}")]
pub struct PeerConnectionError(pub String);

/// The operations the engine needs from a WebRTC peer connection.
#[async_trait]
pub trait PeerConnectionInterface: Clone + Send + Sync + 'static {
    async fn create_offer(&self) -> Result<SessionDescription, PeerConnectionError>;

    async fn create_answer(&self) -> Result<SessionDescription, PeerConnectionError>;

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), PeerConnectionError>;

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), PeerConnectionError>;

    async fn add_ice_candidate(&self, candidate: CandidateInit)
        -> Result<(), PeerConnectionError>;

    /// Attach the local stream's tracks for sending. Fires
    /// negotiation-needed once media changes the session.
    fn add_stream(&self, stream: &MediaStream);

    /// The current local description, including any candidates gathered so
    /// far.
    fn local_description(&self) -> Option<SessionDescription>;

    /// Streams the remote description exposed.
    fn remote_streams(&self) -> Vec<MediaStream>;

    fn signaling_state(&self) -> SignalingState;

    fn ice_gathering_state(&self) -> IceGatheringState;

    fn ice_connection_state(&self) -> IceConnectionState;

    /// Whether the current remote description disables our sending
    /// direction, i.e. the remote has put us on hold.
    fn remote_paused_sending(&self) -> bool;

    fn close(&self);

    fn is_closed(&self) -> bool;
}
