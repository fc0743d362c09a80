//
// Copyright 2024 RoomRTC Contributors
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Simulation platform.
//!
//! A scriptable stand-in for the WebRTC stack, the room transport, and the
//! owner: the peer connection hands out canned descriptions and lets tests
//! drive ICE, the transport records every envelope and can be made to fail,
//! and the observer records everything a real owner would see.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::common::{CallId, CallState, Result, RoomId};
use crate::core::platform::{CallObserver, IceServer, MediaError, Platform};
use crate::core::signaling::{CandidateInit, Envelope, MessageType, SdpType, SessionDescription};
use crate::core::transport::{SignalingTransport, TransportError};
use crate::error::CallError;
use crate::webrtc::media::{MediaConstraints, MediaStream, MediaTrack, TrackKind};
use crate::webrtc::peer_connection::{
    IceConnectionState, IceGatheringState, PeerConnectionError, PeerConnectionInterface,
    SignalingState,
};
use crate::webrtc::peer_connection_observer::PeerConnectionObserver;

/// A fake track that remembers what was done to it.
pub struct SimMediaTrack {
    kind: TrackKind,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

impl SimMediaTrack {
    pub fn new(kind: TrackKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        })
    }
}

impl MediaTrack for SimMediaTrack {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

struct SimPeerConnectionState {
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    signaling: SignalingState,
    gathering: IceGatheringState,
    ice: IceConnectionState,
    closed: bool,
    local_streams: Vec<MediaStream>,
    remote_streams: Vec<MediaStream>,
    added_remote_candidates: Vec<CandidateInit>,
    remote_paused_sending: bool,
    /// Applied to `remote_paused_sending` when the next remote
    /// description lands, as a real hold renegotiation would.
    next_remote_description_pauses_sending: Option<bool>,
    // Fault injection
    fail_create_offer: bool,
    fail_create_answer: bool,
    fail_set_local_description: bool,
    fail_set_remote_description: bool,
    fail_add_ice_candidate: bool,
    // Auto-create a remote stream when a remote description is applied.
    auto_remote_stream: bool,
    auto_remote_stream_has_video: bool,
}

struct SimPeerConnectionInner {
    state: Mutex<SimPeerConnectionState>,
    observer: Mutex<Option<PeerConnectionObserver<SimPlatform>>>,
    offer_counter: AtomicU32,
}

/// Simulation peer connection.
#[derive(Clone)]
pub struct SimPeerConnection {
    inner: Arc<SimPeerConnectionInner>,
}

impl SimPeerConnection {
    fn new(gathering: IceGatheringState, auto_remote_stream_has_video: bool) -> Self {
        Self {
            inner: Arc::new(SimPeerConnectionInner {
                state: Mutex::new(SimPeerConnectionState {
                    local_description: None,
                    remote_description: None,
                    signaling: SignalingState::Stable,
                    gathering,
                    ice: IceConnectionState::New,
                    closed: false,
                    local_streams: Vec::new(),
                    remote_streams: Vec::new(),
                    added_remote_candidates: Vec::new(),
                    remote_paused_sending: false,
                    next_remote_description_pauses_sending: None,
                    fail_create_offer: false,
                    fail_create_answer: false,
                    fail_set_local_description: false,
                    fail_set_remote_description: false,
                    fail_add_ice_candidate: false,
                    auto_remote_stream: true,
                    auto_remote_stream_has_video,
                }),
                observer: Mutex::new(None),
                offer_counter: AtomicU32::new(0),
            }),
        }
    }

    fn set_observer(&self, observer: PeerConnectionObserver<SimPlatform>) {
        *self.inner.observer.lock().unwrap() = Some(observer);
    }

    fn with_observer(&self, f: impl FnOnce(&PeerConnectionObserver<SimPlatform>)) {
        let observer = self.inner.observer.lock().unwrap();
        if let Some(observer) = observer.as_ref() {
            f(observer);
        }
    }

    // -- Test drivers ---------------------------------------------------

    /// Make ICE connect and notify the call.
    pub fn connect_ice(&self) {
        self.inner.state.lock().unwrap().ice = IceConnectionState::Connected;
        self.with_observer(|o| o.on_ice_connection_change(IceConnectionState::Connected));
    }

    /// Make ICE fail and notify the call.
    pub fn fail_ice(&self) {
        self.inner.state.lock().unwrap().ice = IceConnectionState::Failed;
        self.with_observer(|o| o.on_ice_connection_change(IceConnectionState::Failed));
    }

    /// Surface a locally gathered candidate.
    pub fn emit_local_candidate(&self, candidate: CandidateInit) {
        self.with_observer(|o| o.on_ice_candidate(candidate));
    }

    /// Finish local candidate gathering.
    pub fn complete_gathering(&self) {
        self.inner.state.lock().unwrap().gathering = IceGatheringState::Complete;
        self.with_observer(|o| o.on_ice_gathering_complete());
    }

    /// Fire negotiation-needed, as a real connection would after a
    /// direction change.
    pub fn trigger_negotiation_needed(&self) {
        self.with_observer(|o| o.on_negotiation_needed());
    }

    pub fn set_gathering_state(&self, gathering: IceGatheringState) {
        self.inner.state.lock().unwrap().gathering = gathering;
    }

    pub fn set_remote_paused_sending(&self, paused: bool) {
        self.inner.state.lock().unwrap().remote_paused_sending = paused;
    }

    /// The next remote description puts us on hold (or releases us).
    pub fn set_next_remote_description_pauses_sending(&self, paused: bool) {
        self.inner
            .state
            .lock()
            .unwrap()
            .next_remote_description_pauses_sending = Some(paused);
    }

    pub fn set_fail_create_offer(&self, fail: bool) {
        self.inner.state.lock().unwrap().fail_create_offer = fail;
    }

    pub fn set_fail_create_answer(&self, fail: bool) {
        self.inner.state.lock().unwrap().fail_create_answer = fail;
    }

    pub fn set_fail_set_local_description(&self, fail: bool) {
        self.inner.state.lock().unwrap().fail_set_local_description = fail;
    }

    pub fn set_fail_set_remote_description(&self, fail: bool) {
        self.inner.state.lock().unwrap().fail_set_remote_description = fail;
    }

    pub fn set_fail_add_ice_candidate(&self, fail: bool) {
        self.inner.state.lock().unwrap().fail_add_ice_candidate = fail;
    }

    pub fn set_auto_remote_stream(&self, auto: bool) {
        self.inner.state.lock().unwrap().auto_remote_stream = auto;
    }

    // -- Test accessors -------------------------------------------------

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.inner.state.lock().unwrap().remote_description.clone()
    }

    pub fn added_remote_candidates(&self) -> Vec<CandidateInit> {
        self.inner
            .state
            .lock()
            .unwrap()
            .added_remote_candidates
            .clone()
    }

    pub fn local_stream_count(&self) -> usize {
        self.inner.state.lock().unwrap().local_streams.len()
    }
}

#[async_trait]
impl PeerConnectionInterface for SimPeerConnection {
    async fn create_offer(&self) -> std::result::Result<SessionDescription, PeerConnectionError> {
        let state = self.inner.state.lock().unwrap();
        if state.fail_create_offer {
            return Err(PeerConnectionError("create_offer fault".to_string()));
        }
        let n = self.inner.offer_counter.fetch_add(1, Ordering::SeqCst);
        Ok(SessionDescription::offer(format!("v=0 sim-offer-{}", n)))
    }

    async fn create_answer(&self) -> std::result::Result<SessionDescription, PeerConnectionError> {
        let state = self.inner.state.lock().unwrap();
        if state.fail_create_answer {
            return Err(PeerConnectionError("create_answer fault".to_string()));
        }
        Ok(SessionDescription::answer("v=0 sim-answer"))
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> std::result::Result<(), PeerConnectionError> {
        let mut state = self.inner.state.lock().unwrap();
        if state.fail_set_local_description {
            return Err(PeerConnectionError("set_local_description fault".to_string()));
        }
        state.signaling = match description.sdp_type {
            SdpType::Offer => SignalingState::HaveLocalOffer,
            SdpType::Answer => SignalingState::Stable,
        };
        state.local_description = Some(description);
        Ok(())
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> std::result::Result<(), PeerConnectionError> {
        let mut state = self.inner.state.lock().unwrap();
        if state.fail_set_remote_description {
            return Err(PeerConnectionError(
                "set_remote_description fault".to_string(),
            ));
        }
        state.signaling = match description.sdp_type {
            SdpType::Offer => SignalingState::HaveRemoteOffer,
            SdpType::Answer => SignalingState::Stable,
        };
        state.remote_description = Some(description);
        if let Some(paused) = state.next_remote_description_pauses_sending.take() {
            state.remote_paused_sending = paused;
        }
        if state.auto_remote_stream && state.remote_streams.is_empty() {
            let mut tracks: Vec<Arc<dyn MediaTrack>> =
                vec![SimMediaTrack::new(TrackKind::Audio)];
            if state.auto_remote_stream_has_video {
                tracks.push(SimMediaTrack::new(TrackKind::Video));
            }
            state.remote_streams.push(MediaStream::new(tracks));
        }
        Ok(())
    }

    async fn add_ice_candidate(
        &self,
        candidate: CandidateInit,
    ) -> std::result::Result<(), PeerConnectionError> {
        let mut state = self.inner.state.lock().unwrap();
        if state.fail_add_ice_candidate {
            return Err(PeerConnectionError("add_ice_candidate fault".to_string()));
        }
        state.added_remote_candidates.push(candidate);
        Ok(())
    }

    fn add_stream(&self, stream: &MediaStream) {
        let fire = {
            let mut state = self.inner.state.lock().unwrap();
            state.local_streams.push(stream.clone());
            // Real connections only renegotiate from a stable session.
            state.signaling == SignalingState::Stable
        };
        if fire {
            self.with_observer(|o| o.on_negotiation_needed());
        }
    }

    fn local_description(&self) -> Option<SessionDescription> {
        self.inner.state.lock().unwrap().local_description.clone()
    }

    fn remote_streams(&self) -> Vec<MediaStream> {
        self.inner.state.lock().unwrap().remote_streams.clone()
    }

    fn signaling_state(&self) -> SignalingState {
        let state = self.inner.state.lock().unwrap();
        if state.closed {
            SignalingState::Closed
        } else {
            state.signaling
        }
    }

    fn ice_gathering_state(&self) -> IceGatheringState {
        self.inner.state.lock().unwrap().gathering
    }

    fn ice_connection_state(&self) -> IceConnectionState {
        self.inner.state.lock().unwrap().ice
    }

    fn remote_paused_sending(&self) -> bool {
        self.inner.state.lock().unwrap().remote_paused_sending
    }

    fn close(&self) {
        self.inner.state.lock().unwrap().closed = true;
    }

    fn is_closed(&self) -> bool {
        self.inner.state.lock().unwrap().closed
    }
}

struct SimPlatformInner {
    peer_connections: Mutex<Vec<SimPeerConnection>>,
    ice_servers_seen: Mutex<Vec<Vec<IceServer>>>,
    constraints_seen: Mutex<Vec<MediaConstraints>>,
    local_tracks: Mutex<Vec<Arc<SimMediaTrack>>>,
    fail_get_user_media: AtomicBool,
    media_delay: Mutex<Option<Duration>>,
    default_gathering_state: Mutex<IceGatheringState>,
    remote_streams_have_video: AtomicBool,
}

/// Simulation platform: scriptable peer connections and media.
#[derive(Clone)]
pub struct SimPlatform {
    inner: Arc<SimPlatformInner>,
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl SimPlatform {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SimPlatformInner {
                peer_connections: Mutex::new(Vec::new()),
                ice_servers_seen: Mutex::new(Vec::new()),
                constraints_seen: Mutex::new(Vec::new()),
                local_tracks: Mutex::new(Vec::new()),
                fail_get_user_media: AtomicBool::new(false),
                media_delay: Mutex::new(None),
                default_gathering_state: Mutex::new(IceGatheringState::New),
                remote_streams_have_video: AtomicBool::new(false),
            }),
        }
    }

    /// The most recently created peer connection.
    pub fn last_peer_connection(&self) -> Option<SimPeerConnection> {
        self.inner.peer_connections.lock().unwrap().last().cloned()
    }

    pub fn peer_connection_count(&self) -> usize {
        self.inner.peer_connections.lock().unwrap().len()
    }

    pub fn last_ice_servers(&self) -> Option<Vec<IceServer>> {
        self.inner.ice_servers_seen.lock().unwrap().last().cloned()
    }

    pub fn last_constraints(&self) -> Option<MediaConstraints> {
        self.inner.constraints_seen.lock().unwrap().last().cloned()
    }

    /// Every local track ever handed out.
    pub fn local_tracks(&self) -> Vec<Arc<SimMediaTrack>> {
        self.inner.local_tracks.lock().unwrap().clone()
    }

    pub fn force_media_failure(&self, fail: bool) {
        self.inner.fail_get_user_media.store(fail, Ordering::SeqCst);
    }

    /// Delay media acquisition, to hold calls in WaitLocalMedia.
    pub fn set_media_delay(&self, delay: Option<Duration>) {
        *self.inner.media_delay.lock().unwrap() = delay;
    }

    /// Gathering state new connections start in.
    pub fn set_default_gathering_state(&self, state: IceGatheringState) {
        *self.inner.default_gathering_state.lock().unwrap() = state;
    }

    /// Auto-created remote streams carry a video track.
    pub fn set_remote_streams_have_video(&self, video: bool) {
        self.inner
            .remote_streams_have_video
            .store(video, Ordering::SeqCst);
    }
}

#[async_trait]
impl Platform for SimPlatform {
    type PeerConnection = SimPeerConnection;

    fn create_peer_connection(
        &self,
        observer: PeerConnectionObserver<Self>,
        ice_servers: &[IceServer],
    ) -> Result<Self::PeerConnection> {
        let gathering = *self.inner.default_gathering_state.lock().unwrap();
        let has_video = self.inner.remote_streams_have_video.load(Ordering::SeqCst);
        let pc = SimPeerConnection::new(gathering, has_video);
        pc.set_observer(observer);
        self.inner
            .ice_servers_seen
            .lock()
            .unwrap()
            .push(ice_servers.to_vec());
        self.inner.peer_connections.lock().unwrap().push(pc.clone());
        Ok(pc)
    }

    async fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> std::result::Result<MediaStream, MediaError> {
        let delay = *self.inner.media_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner
            .constraints_seen
            .lock()
            .unwrap()
            .push(constraints.clone());
        if self.inner.fail_get_user_media.load(Ordering::SeqCst) {
            return Err(MediaError("intentional media fault".to_string()));
        }
        let mut tracks: Vec<Arc<dyn MediaTrack>> = Vec::new();
        let mut sim_tracks = Vec::new();
        if constraints.audio {
            let track = SimMediaTrack::new(TrackKind::Audio);
            sim_tracks.push(track.clone());
            tracks.push(track);
        }
        if constraints.video {
            let track = SimMediaTrack::new(TrackKind::Video);
            sim_tracks.push(track.clone());
            tracks.push(track);
        }
        self.inner.local_tracks.lock().unwrap().extend(sim_tracks);
        Ok(MediaStream::new(tracks))
    }
}

struct SimTransportInner {
    sent: Mutex<Vec<(RoomId, Envelope)>>,
    cancelled: Mutex<Vec<(CallId, MessageType)>>,
    fail_next_sends: AtomicU32,
    fail_all_sends: AtomicBool,
    fail_with_unknown_devices: AtomicBool,
    allow_ice_fallback: AtomicBool,
}

/// Simulation transport: records envelopes, fails on demand.
#[derive(Clone)]
pub struct SimTransport {
    inner: Arc<SimTransportInner>,
}

impl Default for SimTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SimTransport {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SimTransportInner {
                sent: Mutex::new(Vec::new()),
                cancelled: Mutex::new(Vec::new()),
                fail_next_sends: AtomicU32::new(0),
                fail_all_sends: AtomicBool::new(false),
                fail_with_unknown_devices: AtomicBool::new(false),
                allow_ice_fallback: AtomicBool::new(false),
            }),
        }
    }

    /// Everything successfully sent, in order.
    pub fn sent_messages(&self) -> Vec<(RoomId, Envelope)> {
        self.inner.sent.lock().unwrap().clone()
    }

    pub fn sent_of_type(&self, typ: MessageType) -> Vec<Envelope> {
        self.inner
            .sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, envelope)| envelope.body.typ() == typ)
            .map(|(_, envelope)| envelope.clone())
            .collect()
    }

    /// The order of message types sent, for sequencing assertions.
    pub fn sent_types(&self) -> Vec<MessageType> {
        self.inner
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, envelope)| envelope.body.typ())
            .collect()
    }

    pub fn cancelled(&self) -> Vec<(CallId, MessageType)> {
        self.inner.cancelled.lock().unwrap().clone()
    }

    /// Fail the next `n` sends.
    pub fn fail_next_sends(&self, n: u32) {
        self.inner.fail_next_sends.store(n, Ordering::SeqCst);
    }

    pub fn fail_all_sends(&self, fail: bool) {
        self.inner.fail_all_sends.store(fail, Ordering::SeqCst);
    }

    /// Failures report the unknown-devices sentinel.
    pub fn fail_with_unknown_devices(&self, unknown: bool) {
        self.inner
            .fail_with_unknown_devices
            .store(unknown, Ordering::SeqCst);
    }

    pub fn set_allow_ice_fallback(&self, allow: bool) {
        self.inner.allow_ice_fallback.store(allow, Ordering::SeqCst);
    }

    fn should_fail(&self) -> bool {
        if self.inner.fail_all_sends.load(Ordering::SeqCst) {
            return true;
        }
        self.inner
            .fail_next_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n > 0 {
                    Some(n - 1)
                } else {
                    None
                }
            })
            .is_ok()
    }
}

#[async_trait]
impl SignalingTransport for SimTransport {
    async fn send(
        &self,
        room_id: &RoomId,
        envelope: Envelope,
    ) -> std::result::Result<(), TransportError> {
        if self.should_fail() {
            return Err(if self.inner.fail_with_unknown_devices.load(Ordering::SeqCst) {
                TransportError::UnknownDevices
            } else {
                TransportError::Failed("intentional send fault".to_string())
            });
        }
        self.inner
            .sent
            .lock()
            .unwrap()
            .push((room_id.clone(), envelope));
        Ok(())
    }

    async fn cancel_pending(&self, _room_id: &RoomId, call_id: &CallId, typ: MessageType) {
        self.inner
            .cancelled
            .lock()
            .unwrap()
            .push((call_id.clone(), typ));
    }

    fn allow_ice_fallback(&self) -> bool {
        self.inner.allow_ice_fallback.load(Ordering::SeqCst)
    }
}

struct SimObserverInner {
    state_changes: Mutex<Vec<(CallId, CallState, CallState)>>,
    errors: Mutex<Vec<(CallId, CallError)>>,
    hangups: Mutex<Vec<CallId>>,
    replaced: Mutex<Vec<(CallId, CallId)>>,
    hold_changes: Mutex<Vec<(CallId, bool)>>,
}

/// Simulation observer: records every owner-facing event.
#[derive(Clone)]
pub struct SimObserver {
    inner: Arc<SimObserverInner>,
}

impl Default for SimObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimObserver {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SimObserverInner {
                state_changes: Mutex::new(Vec::new()),
                errors: Mutex::new(Vec::new()),
                hangups: Mutex::new(Vec::new()),
                replaced: Mutex::new(Vec::new()),
                hold_changes: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The states a call moved through, in order.
    pub fn state_trace(&self, call_id: &CallId) -> Vec<CallState> {
        self.inner
            .state_changes
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _, _)| id == call_id)
            .map(|(_, new_state, _)| *new_state)
            .collect()
    }

    pub fn errors(&self) -> Vec<(CallId, CallError)> {
        self.inner.errors.lock().unwrap().clone()
    }

    pub fn hangups(&self) -> Vec<CallId> {
        self.inner.hangups.lock().unwrap().clone()
    }

    pub fn replaced(&self) -> Vec<(CallId, CallId)> {
        self.inner.replaced.lock().unwrap().clone()
    }

    pub fn hold_changes(&self) -> Vec<(CallId, bool)> {
        self.inner.hold_changes.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A description built from an inbound offer, fed to a fresh
    // connection, yields an answer of answer type.
    #[tokio::test]
    async fn offer_answer_round_trip_types() {
        let pc = SimPeerConnection::new(IceGatheringState::New, false);
        pc.set_remote_description(SessionDescription::offer("v=0 offer"))
            .await
            .unwrap();
        assert_eq!(pc.signaling_state(), SignalingState::HaveRemoteOffer);

        let answer = pc.create_answer().await.unwrap();
        assert_eq!(answer.sdp_type, SdpType::Answer);

        let fresh = SimPeerConnection::new(IceGatheringState::New, false);
        fresh
            .set_remote_description(SessionDescription::offer("v=0 offer"))
            .await
            .unwrap();
        let again = fresh.create_answer().await.unwrap();
        assert_eq!(again.sdp_type, answer.sdp_type);
    }

    #[tokio::test]
    async fn signaling_state_follows_descriptions() {
        let pc = SimPeerConnection::new(IceGatheringState::New, false);
        assert_eq!(pc.signaling_state(), SignalingState::Stable);

        pc.set_local_description(SessionDescription::offer("v=0"))
            .await
            .unwrap();
        assert_eq!(pc.signaling_state(), SignalingState::HaveLocalOffer);

        pc.set_remote_description(SessionDescription::answer("v=0"))
            .await
            .unwrap();
        assert_eq!(pc.signaling_state(), SignalingState::Stable);

        pc.close();
        assert_eq!(pc.signaling_state(), SignalingState::Closed);
    }
}

impl CallObserver for SimObserver {
    fn on_state_changed(&self, call_id: &CallId, new_state: CallState, old_state: CallState) {
        self.inner
            .state_changes
            .lock()
            .unwrap()
            .push((call_id.clone(), new_state, old_state));
    }

    fn on_local_hold_changed(&self, call_id: &CallId, on_hold: bool) {
        self.inner
            .hold_changes
            .lock()
            .unwrap()
            .push((call_id.clone(), on_hold));
    }

    fn on_error(&self, call_id: &CallId, error: CallError) {
        self.inner
            .errors
            .lock()
            .unwrap()
            .push((call_id.clone(), error));
    }

    fn on_hangup(&self, call_id: &CallId) {
        self.inner.hangups.lock().unwrap().push(call_id.clone());
    }

    fn on_replaced(&self, call_id: &CallId, replacement_id: &CallId) {
        self.inner
            .replaced
            .lock()
            .unwrap()
            .push((call_id.clone(), replacement_id.clone()));
    }
}
