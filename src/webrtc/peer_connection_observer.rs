//
// Copyright 2024 RoomRTC Contributors
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Peer connection observer.
//!
//! The platform's peer connection calls back into the engine through this
//! object; each callback becomes an event on the owning call's event pump.

use std::fmt;

use crate::core::call::Call;
use crate::core::platform::Platform;
use crate::core::signaling::CandidateInit;
use crate::webrtc::peer_connection::IceConnectionState;

/// Forwards peer connection callbacks into the call FSM.
pub struct PeerConnectionObserver<T>
where
    T: Platform,
{
    call: Call<T>,
}

impl<T> PeerConnectionObserver<T>
where
    T: Platform,
{
    pub fn new(call: Call<T>) -> Self {
        Self { call }
    }

    /// The session needs (re)negotiation, e.g. after tracks were attached.
    pub fn on_negotiation_needed(&self) {
        self.call
            .inject_negotiation_needed()
            .unwrap_or_else(|e| warn!("on_negotiation_needed(): inject failed: {}", e));
    }

    /// A local ICE candidate is ready to be signaled.
    pub fn on_ice_candidate(&self, candidate: CandidateInit) {
        self.call
            .inject_local_ice_candidate(candidate)
            .unwrap_or_else(|e| warn!("on_ice_candidate(): inject failed: {}", e));
    }

    /// Local candidate gathering finished.
    pub fn on_ice_gathering_complete(&self) {
        self.call
            .inject_ice_gathering_complete()
            .unwrap_or_else(|e| warn!("on_ice_gathering_complete(): inject failed: {}", e));
    }

    /// The ICE connection changed state.
    pub fn on_ice_connection_change(&self, state: IceConnectionState) {
        self.call
            .inject_ice_connection_change(state)
            .unwrap_or_else(|e| warn!("on_ice_connection_change(): inject failed: {}", e));
    }
}

impl<T> fmt::Debug for PeerConnectionObserver<T>
where
    T: Platform,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PeerConnectionObserver({})", self.call.call_id())
    }
}
