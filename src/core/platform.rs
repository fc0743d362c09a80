//
// Copyright 2024 RoomRTC Contributors
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Platform trait describing the capabilities a host application must
/// implement for calling, plus the observer interface events flow out on.
use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::common::{CallId, CallState, Result};
use crate::error::CallError;
use crate::webrtc::media::{MediaConstraints, MediaStream};
use crate::webrtc::peer_connection::PeerConnectionInterface;
use crate::webrtc::peer_connection_observer::PeerConnectionObserver;

/// One ICE server used when building a peer connection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: String,
    pub password: String,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            ..Default::default()
        }
    }
}

/// Local media could not be acquired.
#[derive(Clone, Debug, Error)]
#[error("media acquisition failed: {0}")]
pub struct MediaError(pub String);

/// A trait describing the WebRTC and media capabilities a host platform must
/// implement for calling.
#[async_trait]
pub trait Platform: Send + Sync + Sized + 'static {
    /// Platform specific peer connection object.
    type PeerConnection: PeerConnectionInterface;

    /// Create a peer connection for one call, wired to deliver its callbacks
    /// through `observer`.
    fn create_peer_connection(
        &self,
        observer: PeerConnectionObserver<Self>,
        ice_servers: &[IceServer],
    ) -> Result<Self::PeerConnection>;

    /// Acquire local capture media.
    async fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> std::result::Result<MediaStream, MediaError>;
}

/// Events a call emits to its owner.
///
/// Implementations must not call back into the engine from these methods.
pub trait CallObserver: Send + Sync + 'static {
    /// The call transitioned between states.
    fn on_state_changed(&self, call_id: &CallId, new_state: CallState, old_state: CallState);

    /// The remote put us on hold, or released us.
    fn on_local_hold_changed(&self, call_id: &CallId, on_hold: bool);

    /// Something went wrong; the call is terminating.
    fn on_error(&self, call_id: &CallId, error: CallError);

    /// The call reached its terminal state.
    fn on_hangup(&self, call_id: &CallId);

    /// The call lost a glare tiebreak and was replaced.
    fn on_replaced(&self, call_id: &CallId, replacement_id: &CallId);
}

impl fmt::Debug for dyn CallObserver {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CallObserver")
    }
}
