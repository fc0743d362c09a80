//
// Copyright 2024 RoomRTC Contributors
// SPDX-License-Identifier: AGPL-3.0-only
//

//! A peer-to-peer call over a room-based signaling transport.
//!
//! `Call` is a cheaply clonable handle; all mutable state lives behind
//! shared interior locks so the handle can travel into spawned operations
//! and timers. Events are processed serially by the call's state machine
//! ([`crate::core::call_fsm`]); operations with suspension points run as
//! spawned tasks so inbound signaling can interleave with them.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::channel::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::common::{
    CallDirection, CallId, CallMediaType, CallParty, CallState, OpponentPartyId, PartyId, Result,
    RoomId,
};
use crate::core::call_fsm::{CallEvent, CallStateMachine};
use crate::core::call_mutex::CallMutex;
use crate::core::candidate_queue::CandidateQueue;
use crate::core::platform::{CallObserver, IceServer, Platform};
use crate::core::signaling::{
    self, Answer, CandidateInit, Candidates, Envelope, Hangup, Invite, Message, MessageType,
    Negotiate, ReceivedAnswer, ReceivedInvite, ReceivedNegotiate, ReceivedReject,
    ReceivedSelectAnswer, Reject, SelectAnswer, SessionDescription,
};
use crate::core::transport::{SignalingTransport, TransportError};
use crate::error::{CallError, CallErrorCode, EngineError};
use crate::webrtc::media::{MediaConstraints, MediaStream, TrackKind};
use crate::webrtc::peer_connection::{
    IceConnectionState, IceGatheringState, PeerConnectionInterface, SignalingState,
};
use crate::webrtc::peer_connection_observer::PeerConnectionObserver;

/// How long an unanswered invite rings before we give up.
const INVITE_TIMEOUT: Duration = Duration::from_secs(60);

/// How long to wait for initial candidates after setting a local
/// description, so the description carries them inline.
const GATHER_GRACE: Duration = Duration::from_millis(200);

/// Perfect negotiation flags, only meaningful mid-negotiation.
pub(crate) struct NegotiationState {
    /// A local offer is being created or sent.
    pub making_offer: bool,
    /// The last colliding remote offer was ignored (impolite side).
    pub ignore_offer: bool,
}

/// The committed remote partner.
pub(crate) struct OpponentState {
    pub party_id: OpponentPartyId,
    pub version: u32,
}

/// Streams and user-requested track states.
pub(crate) struct MediaState {
    pub local_stream: Option<MediaStream>,
    pub remote_stream: Option<MediaStream>,
    pub mic_muted: bool,
    pub vid_muted: bool,
    pub remote_on_hold: bool,
    /// Glare: the predecessor call will hand its media over, do not acquire.
    pub awaiting_media_handoff: bool,
    /// Glare: media handed over before this call finished initializing.
    pub pending_handoff: Option<MediaStream>,
}

/// Set exactly once, at termination.
#[derive(Clone, Copy, Debug)]
pub struct TerminationInfo {
    pub party: CallParty,
    pub reason: CallErrorCode,
}

struct Timers {
    invite: Option<JoinHandle<()>>,
    ring: Option<JoinHandle<()>>,
    flush: Option<JoinHandle<()>>,
}

impl Timers {
    fn new() -> Self {
        Self {
            invite: None,
            ring: None,
            flush: None,
        }
    }
}

/// Clears `making_offer` on every exit path of the offer operation.
struct MakingOfferGuard {
    negotiation: Arc<CallMutex<NegotiationState>>,
}

impl Drop for MakingOfferGuard {
    fn drop(&mut self) {
        if let Ok(mut negotiation) = self.negotiation.lock() {
            negotiation.making_offer = false;
        }
    }
}

/// A peer-to-peer call.
pub struct Call<T>
where
    T: Platform,
{
    /// Unique identifier, carried on every outbound signaling message.
    call_id: CallId,
    /// Routing key for the signaling transport.
    room_id: RoomId,
    /// The call direction, fixed once chosen.
    direction: CallDirection,
    /// Stable identifier for this device.
    our_party_id: PartyId,
    /// ICE servers resolved at construction.
    ice_servers: Arc<Vec<IceServer>>,
    /// WebRTC and media capabilities.
    platform: Arc<T>,
    /// The room transport.
    transport: Arc<dyn SignalingTransport>,
    /// Owner event sink.
    observer: Arc<dyn CallObserver>,
    /// Injects events into the call state machine.
    fsm_sender: mpsc::Sender<(Call<T>, CallEvent<T>)>,
    /// The current state of the call.
    state: Arc<CallMutex<CallState>>,
    /// Voice or video; refined for inbound calls from the remote tracks.
    media_type: Arc<CallMutex<CallMediaType>>,
    opponent: Arc<CallMutex<OpponentState>>,
    negotiation: Arc<CallMutex<NegotiationState>>,
    candidates: Arc<CallMutex<CandidateQueue>>,
    media: Arc<CallMutex<MediaState>>,
    peer_connection: Arc<CallMutex<Option<T::PeerConnection>>>,
    /// Remote candidates that arrived before the remote description.
    remote_candidate_buffer: Arc<CallMutex<Vec<CandidateInit>>>,
    have_remote_description: Arc<AtomicBool>,
    /// Gate for releasing local candidates onto the wire.
    invite_or_answer_sent: Arc<AtomicBool>,
    termination: Arc<CallMutex<Option<TerminationInfo>>>,
    timers: Arc<CallMutex<Timers>>,
    /// Spawned operations, awaited by Synchronize.
    operations: Arc<CallMutex<Vec<JoinHandle<()>>>>,
    /// The replacement call, once glare resolution picked one.
    successor: Arc<CallMutex<Option<Call<T>>>>,
}

impl<T> fmt::Display for Call<T>
where
    T: Platform,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = match self.state() {
            Ok(v) => format!("{}", v),
            Err(_) => "unavailable".to_string(),
        };
        write!(
            f,
            "direction: {}, call_id: {}, state: {}",
            self.direction, self.call_id, state
        )
    }
}

impl<T> fmt::Debug for Call<T>
where
    T: Platform,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl<T> Clone for Call<T>
where
    T: Platform,
{
    fn clone(&self) -> Self {
        Self {
            call_id: self.call_id.clone(),
            room_id: self.room_id.clone(),
            direction: self.direction,
            our_party_id: self.our_party_id.clone(),
            ice_servers: Arc::clone(&self.ice_servers),
            platform: Arc::clone(&self.platform),
            transport: Arc::clone(&self.transport),
            observer: Arc::clone(&self.observer),
            fsm_sender: self.fsm_sender.clone(),
            state: Arc::clone(&self.state),
            media_type: Arc::clone(&self.media_type),
            opponent: Arc::clone(&self.opponent),
            negotiation: Arc::clone(&self.negotiation),
            candidates: Arc::clone(&self.candidates),
            media: Arc::clone(&self.media),
            peer_connection: Arc::clone(&self.peer_connection),
            remote_candidate_buffer: Arc::clone(&self.remote_candidate_buffer),
            have_remote_description: Arc::clone(&self.have_remote_description),
            invite_or_answer_sent: Arc::clone(&self.invite_or_answer_sent),
            termination: Arc::clone(&self.termination),
            timers: Arc::clone(&self.timers),
            operations: Arc::clone(&self.operations),
            successor: Arc::clone(&self.successor),
        }
    }
}

impl<T> Call<T>
where
    T: Platform,
{
    /// Create a new Call and spawn its state machine.
    ///
    /// Must run within a tokio runtime.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        call_id: CallId,
        room_id: RoomId,
        direction: CallDirection,
        media_type: CallMediaType,
        our_party_id: PartyId,
        ice_servers: Vec<IceServer>,
        platform: Arc<T>,
        transport: Arc<dyn SignalingTransport>,
        observer: Arc<dyn CallObserver>,
    ) -> Self {
        info!(
            "new(): call_id: {}, direction: {}, type: {}",
            call_id, direction, media_type
        );

        let (fsm_sender, fsm_receiver) = mpsc::channel(256);

        let call = Self {
            call_id,
            room_id,
            direction,
            our_party_id,
            ice_servers: Arc::new(ice_servers),
            platform,
            transport,
            observer,
            fsm_sender,
            state: Arc::new(CallMutex::new(CallState::Fledgling, "state")),
            media_type: Arc::new(CallMutex::new(media_type, "media_type")),
            opponent: Arc::new(CallMutex::new(
                OpponentState {
                    party_id: OpponentPartyId::Unchosen,
                    version: 0,
                },
                "opponent",
            )),
            negotiation: Arc::new(CallMutex::new(
                NegotiationState {
                    making_offer: false,
                    ignore_offer: false,
                },
                "negotiation",
            )),
            candidates: Arc::new(CallMutex::new(CandidateQueue::new(), "candidates")),
            media: Arc::new(CallMutex::new(
                MediaState {
                    local_stream: None,
                    remote_stream: None,
                    mic_muted: false,
                    vid_muted: false,
                    remote_on_hold: false,
                    awaiting_media_handoff: false,
                    pending_handoff: None,
                },
                "media",
            )),
            peer_connection: Arc::new(CallMutex::new(None, "peer_connection")),
            remote_candidate_buffer: Arc::new(CallMutex::new(
                Vec::new(),
                "remote_candidate_buffer",
            )),
            have_remote_description: Arc::new(AtomicBool::new(false)),
            invite_or_answer_sent: Arc::new(AtomicBool::new(false)),
            termination: Arc::new(CallMutex::new(None, "termination")),
            timers: Arc::new(CallMutex::new(Timers::new(), "timers")),
            operations: Arc::new(CallMutex::new(Vec::new(), "operations")),
            successor: Arc::new(CallMutex::new(None, "successor")),
        };

        tokio::spawn(CallStateMachine::new(fsm_receiver).run());

        call
    }

    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    pub fn our_party_id(&self) -> &PartyId {
        &self.our_party_id
    }

    /// Return the current Call state.
    pub fn state(&self) -> Result<CallState> {
        let state = self.state.lock()?;
        Ok(*state)
    }

    pub fn media_type(&self) -> Result<CallMediaType> {
        let media_type = self.media_type.lock()?;
        Ok(*media_type)
    }

    pub fn opponent_party_id(&self) -> Result<OpponentPartyId> {
        self.opponent.with(|opponent| opponent.party_id.clone())
    }

    pub fn opponent_version(&self) -> Result<u32> {
        self.opponent.with(|opponent| opponent.version)
    }

    pub fn is_microphone_muted(&self) -> Result<bool> {
        self.media.with(|media| media.mic_muted)
    }

    pub fn is_local_video_muted(&self) -> Result<bool> {
        self.media.with(|media| media.vid_muted)
    }

    pub fn is_remote_on_hold(&self) -> Result<bool> {
        self.media.with(|media| media.remote_on_hold)
    }

    /// How and why the call ended, once terminal.
    pub fn termination_info(&self) -> Result<Option<TerminationInfo>> {
        Ok(*self.termination.lock()?)
    }

    pub fn local_stream(&self) -> Result<Option<MediaStream>> {
        Ok(self.media.lock()?.local_stream.clone())
    }

    /// Retry counter of the candidate queue; zero when no send is in
    /// flight.
    pub fn candidate_send_tries(&self) -> Result<u32> {
        self.candidates.with(|queue| queue.send_tries())
    }

    pub fn remote_stream(&self) -> Result<Option<MediaStream>> {
        Ok(self.media.lock()?.remote_stream.clone())
    }

    pub(crate) fn successor(&self) -> Result<Option<Call<T>>> {
        Ok(self.successor.lock()?.clone())
    }

    pub fn is_terminal(&self) -> bool {
        self.state().map(|s| s.is_terminal()).unwrap_or(true)
    }

    /// True when the remote put us on hold: connected, the remote
    /// description pauses our sending, and we did not initiate the hold
    /// ourselves.
    pub fn is_local_on_hold(&self) -> bool {
        if self.state().map(|s| s != CallState::Connected).unwrap_or(true) {
            return false;
        }
        let remote_paused = self
            .peer_connection()
            .map(|pc| pc.remote_paused_sending())
            .unwrap_or(false);
        let we_hold_them = self
            .media
            .lock()
            .map(|media| media.remote_on_hold)
            .unwrap_or(false);
        remote_paused && !we_hold_them
    }

    // ------------------------------------------------------------------
    // User API: these inject events; the state machine does the work.

    /// End the call.
    pub fn hangup(&self) -> Result<()> {
        self.inject_event(CallEvent::LocalHangup {
            reason: CallErrorCode::UserHangup,
        })
    }

    /// Answer a ringing inbound call.
    pub fn answer(&self) -> Result<()> {
        self.inject_event(CallEvent::AcceptCall)
    }

    /// Decline a ringing inbound call.
    pub fn reject(&self) -> Result<()> {
        self.inject_event(CallEvent::RejectCall)
    }

    pub fn set_microphone_muted(&self, muted: bool) -> Result<()> {
        self.inject_event(CallEvent::SetMicrophoneMuted(muted))
    }

    pub fn set_local_video_muted(&self, muted: bool) -> Result<()> {
        self.inject_event(CallEvent::SetVideoMuted(muted))
    }

    /// Put the remote party on hold, or release them.
    pub fn set_remote_on_hold(&self, on_hold: bool) -> Result<()> {
        self.inject_event(CallEvent::SetRemoteOnHold(on_hold))
    }

    /// Flush the event pump and the operations it spawned. Test hook.
    pub async fn synchronize(&self) -> Result<()> {
        // Operations queue events behind the synchronize marker, and may
        // themselves spawn further operations, so settle in rounds.
        for _ in 0..3 {
            let (done_sender, done_receiver) = oneshot::channel();
            self.inject_event(CallEvent::Synchronize(done_sender))?;
            let _ = done_receiver.await;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Event injection.

    fn inject_event(&self, event: CallEvent<T>) -> Result<()> {
        let mut sender = self.fsm_sender.clone();
        if sender.is_closed() {
            // The stream is closed, just eat the request.
            debug!("inject_event(): stream is closed while sending: {}", event);
            return Ok(());
        }
        sender
            .try_send((self.clone(), event))
            .map_err(|_| EngineError::EventStreamClosed.into())
    }

    pub(crate) fn inject_place_call(&self) -> Result<()> {
        self.inject_event(CallEvent::PlaceCall)
    }

    pub(crate) fn inject_received_invite(&self, invite: ReceivedInvite) -> Result<()> {
        self.inject_event(CallEvent::ReceivedInvite(invite))
    }

    pub(crate) fn inject_received_answer(&self, answer: ReceivedAnswer) -> Result<()> {
        self.inject_event(CallEvent::ReceivedAnswer(answer))
    }

    pub(crate) fn inject_received_candidates(
        &self,
        candidates: signaling::ReceivedCandidates,
    ) -> Result<()> {
        self.inject_event(CallEvent::ReceivedCandidates(candidates))
    }

    pub(crate) fn inject_received_negotiate(&self, negotiate: ReceivedNegotiate) -> Result<()> {
        self.inject_event(CallEvent::ReceivedNegotiate(negotiate))
    }

    pub(crate) fn inject_received_hangup(&self, hangup: signaling::ReceivedHangup) -> Result<()> {
        self.inject_event(CallEvent::ReceivedHangup(hangup))
    }

    pub(crate) fn inject_received_reject(&self, reject: ReceivedReject) -> Result<()> {
        self.inject_event(CallEvent::ReceivedReject(reject))
    }

    pub(crate) fn inject_received_select_answer(
        &self,
        select_answer: ReceivedSelectAnswer,
    ) -> Result<()> {
        self.inject_event(CallEvent::ReceivedSelectAnswer(select_answer))
    }

    pub(crate) fn inject_replace(&self, new_call: Call<T>) -> Result<()> {
        self.inject_event(CallEvent::Replace(new_call))
    }

    pub(crate) fn inject_local_media_acquired(&self, stream: MediaStream) -> Result<()> {
        self.inject_event(CallEvent::LocalMediaAcquired(stream))
    }

    pub(crate) fn inject_local_media_failed(&self, error: String) -> Result<()> {
        self.inject_event(CallEvent::LocalMediaFailed(error))
    }

    pub(crate) fn inject_negotiation_needed(&self) -> Result<()> {
        self.inject_event(CallEvent::NegotiationNeeded)
    }

    pub(crate) fn inject_local_ice_candidate(&self, candidate: CandidateInit) -> Result<()> {
        self.inject_event(CallEvent::LocalIceCandidate(candidate))
    }

    pub(crate) fn inject_ice_gathering_complete(&self) -> Result<()> {
        self.inject_event(CallEvent::IceGatheringComplete)
    }

    pub(crate) fn inject_ice_connection_change(&self, state: IceConnectionState) -> Result<()> {
        self.inject_event(CallEvent::IceConnectionChange(state))
    }

    fn inject_invite_timeout(&self) -> Result<()> {
        self.inject_event(CallEvent::InviteTimeout)
    }

    fn inject_ring_lifetime_expired(&self) -> Result<()> {
        self.inject_event(CallEvent::RingLifetimeExpired)
    }

    fn inject_candidate_flush(&self) -> Result<()> {
        self.inject_event(CallEvent::CandidateFlush)
    }

    // ------------------------------------------------------------------
    // State and plumbing.

    /// Transition to a new state, disarming timers the old state owned and
    /// emitting exactly one change event. The terminal state is absorbing.
    pub(crate) fn set_state(&self, new_state: CallState) -> Result<()> {
        let old_state = {
            let mut state = self.state.lock()?;
            let old = *state;
            if old == new_state {
                return Ok(());
            }
            if old.is_terminal() {
                warn!(
                    "set_state(): ignoring transition {} -> {} out of terminal state",
                    old, new_state
                );
                return Ok(());
            }
            *state = new_state;
            old
        };

        {
            let mut timers = self.timers.lock()?;
            match old_state {
                CallState::InviteSent => {
                    if let Some(timer) = timers.invite.take() {
                        timer.abort();
                    }
                }
                CallState::Ringing => {
                    if let Some(timer) = timers.ring.take() {
                        timer.abort();
                    }
                }
                _ => {}
            }
        }

        info!(
            "state: {} -> {}: call_id: {}",
            old_state, new_state, self.call_id
        );
        self.observer
            .on_state_changed(&self.call_id, new_state, old_state);
        Ok(())
    }

    fn peer_connection(&self) -> Result<T::PeerConnection> {
        self.peer_connection
            .lock()?
            .clone()
            .ok_or_else(|| EngineError::PeerConnectionNotSet.into())
    }

    fn create_peer_connection_now(&self) -> Result<()> {
        let observer = PeerConnectionObserver::new(self.clone());
        let pc = self
            .platform
            .create_peer_connection(observer, &self.ice_servers)?;
        *self.peer_connection.lock()? = Some(pc);
        Ok(())
    }

    /// Track a spawned operation so Synchronize can await it.
    fn spawn_operation<F>(&self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        if let Ok(mut operations) = self.operations.lock() {
            operations.retain(|handle| !handle.is_finished());
            operations.push(tokio::spawn(future));
        }
    }

    pub(crate) fn take_operations(&self) -> Result<Vec<JoinHandle<()>>> {
        Ok(std::mem::take(&mut *self.operations.lock()?))
    }

    async fn send_signaling(&self, body: Message) -> std::result::Result<(), TransportError> {
        let envelope = Envelope {
            version: signaling::PROTOCOL_VERSION,
            call_id: self.call_id.clone(),
            party_id: Some(self.our_party_id.clone()),
            body,
        };
        debug!("send_signaling(): {}", envelope);
        self.transport.send(&self.room_id, envelope).await
    }

    /// Only send a wire hangup when the peer knows the call exists.
    fn should_send_hangup(&self) -> bool {
        match self.direction {
            CallDirection::Outbound => self.invite_or_answer_sent.load(Ordering::Acquire),
            CallDirection::Inbound => true,
        }
    }

    /// Emit an error to the owner and terminate without wire signaling.
    pub(crate) async fn fail_call(&self, code: CallErrorCode, message: String) {
        error!("fail_call(): call_id: {}, {}: {}", self.call_id, code, message);
        self.observer
            .on_error(&self.call_id, CallError::new(code, message));
        let _ = self
            .terminate(CallParty::Local, code, false, false)
            .await;
    }

    fn send_failure_code(error: &TransportError, typ: MessageType) -> CallErrorCode {
        match error {
            TransportError::UnknownDevices => CallErrorCode::UnknownDevices,
            TransportError::Failed(_) => match typ {
                MessageType::Invite => CallErrorCode::SendInvite,
                MessageType::Answer => CallErrorCode::SendAnswer,
                _ => CallErrorCode::SignallingFailed,
            },
        }
    }

    /// A signaling send failed: cancel the pending event so the transport
    /// does not deliver a duplicate later, then fail the call.
    async fn fail_send(&self, typ: MessageType, error: TransportError) {
        let code = Self::send_failure_code(&error, typ);
        self.transport
            .cancel_pending(&self.room_id, &self.call_id, typ)
            .await;
        self.fail_call(code, error.to_string()).await;
    }

    // ------------------------------------------------------------------
    // Outbound path.

    pub(crate) fn handle_place_call(&self) -> Result<()> {
        self.set_state(CallState::WaitLocalMedia)?;
        if let Err(e) = self.create_peer_connection_now() {
            let call = self.clone();
            let message = e.to_string();
            self.spawn_operation(async move {
                call.fail_call(CallErrorCode::LocalOfferFailed, message).await;
            });
            return Ok(());
        }
        self.spawn_media_acquisition();
        Ok(())
    }

    fn spawn_media_acquisition(&self) {
        let call = self.clone();
        self.spawn_operation(async move {
            let media_type = match call.media_type() {
                Ok(v) => v,
                Err(_) => return,
            };
            let constraints = MediaConstraints::for_media_type(media_type);
            match call.platform.get_user_media(constraints).await {
                Ok(stream) => {
                    let _ = call.inject_local_media_acquired(stream);
                }
                Err(e) => {
                    let _ = call.inject_local_media_failed(e.to_string());
                }
            }
        });
    }

    pub(crate) async fn handle_media_acquired(&self, stream: MediaStream) -> Result<()> {
        let state = self.state()?;
        match (state, self.direction) {
            (CallState::WaitLocalMedia, CallDirection::Outbound) => {
                self.adopt_local_stream(&stream)?;
                self.set_state(CallState::CreateOffer)?;
                // The peer connection fires negotiation-needed once the
                // tracks change the session; the offer is not created
                // eagerly.
                Ok(())
            }
            (CallState::WaitLocalMedia, CallDirection::Inbound)
            | (CallState::Ringing, CallDirection::Inbound) => {
                // The Ringing arm is the glare handoff: the replaced
                // outbound call handed its media over, which answers the
                // call implicitly.
                self.adopt_local_stream(&stream)?;
                self.set_state(CallState::CreateAnswer)?;
                let call = self.clone();
                self.spawn_operation(async move {
                    call.proceed_with_answer().await;
                });
                Ok(())
            }
            (CallState::Fledgling, CallDirection::Inbound) => {
                // Glare handoff raced our own initialization; park the
                // stream until the invite is applied.
                let mut media = self.media.lock()?;
                media.awaiting_media_handoff = true;
                media.pending_handoff = Some(stream);
                Ok(())
            }
            _ => {
                warn!(
                    "handle_media_acquired(): unexpected in state {}, stopping tracks",
                    state
                );
                stream.stop_all();
                Ok(())
            }
        }
    }

    fn adopt_local_stream(&self, stream: &MediaStream) -> Result<()> {
        {
            let mut media = self.media.lock()?;
            media.local_stream = Some(stream.clone());
        }
        self.apply_track_gating()?;
        self.peer_connection()?.add_stream(stream);
        Ok(())
    }

    pub(crate) async fn handle_media_failed(&self, error: String) -> Result<()> {
        self.fail_call(CallErrorCode::NoUserMedia, error).await;
        Ok(())
    }

    pub(crate) fn handle_negotiation_needed(&self) -> Result<()> {
        let state = self.state()?;
        if state != CallState::CreateOffer
            && self.opponent_version()? < signaling::MIN_VERSION_FOR_RENEGOTIATE
        {
            info!("negotiation_needed(): peer cannot renegotiate, ignoring");
            return Ok(());
        }
        {
            let mut negotiation = self.negotiation.lock()?;
            if negotiation.making_offer {
                info!("negotiation_needed(): an offer is already in progress");
                return Ok(());
            }
            negotiation.making_offer = true;
        }

        let call = self.clone();
        let guard = MakingOfferGuard {
            negotiation: Arc::clone(&self.negotiation),
        };
        self.spawn_operation(async move {
            let _guard = guard;
            let pc = match call.peer_connection() {
                Ok(pc) => pc,
                Err(_) => return,
            };
            match pc.create_offer().await {
                Ok(offer) => call.got_local_offer(offer).await,
                Err(e) => {
                    call.fail_call(CallErrorCode::LocalOfferFailed, e.to_string())
                        .await;
                }
            }
        });
        Ok(())
    }

    /// Apply and send a freshly created local offer, as an invite for a new
    /// call or a negotiate for an established one.
    async fn got_local_offer(&self, offer: SessionDescription) {
        if self.is_terminal() {
            debug!("got_local_offer(): call already ended");
            return;
        }
        let pc = match self.peer_connection() {
            Ok(pc) => pc,
            Err(_) => return,
        };

        if let Err(e) = pc.set_local_description(offer.clone()).await {
            self.fail_call(CallErrorCode::SetLocalDescription, e.to_string())
                .await;
            return;
        }

        // Give gathering a moment so the description carries initial
        // candidates.
        if pc.ice_gathering_state() == IceGatheringState::Gathering {
            tokio::time::sleep(GATHER_GRACE).await;
        }
        if self.is_terminal() {
            return;
        }

        // Anything queued rides inside the description now.
        if let Ok(mut queue) = self.candidates.lock() {
            queue.discard();
        }

        let description = pc.local_description().unwrap_or(offer);
        let is_invite = self.state().map(|s| s == CallState::CreateOffer).unwrap_or(false);
        let (typ, body) = if is_invite {
            (
                MessageType::Invite,
                Message::Invite(Invite {
                    offer: description,
                    lifetime: signaling::INVITE_LIFETIME.as_millis() as u64,
                }),
            )
        } else {
            (
                MessageType::Negotiate,
                Message::Negotiate(Negotiate {
                    description,
                }),
            )
        };

        match self.send_signaling(body).await {
            Ok(()) => {
                if is_invite {
                    self.invite_or_answer_sent.store(true, Ordering::Release);
                    let _ = self.set_state(CallState::InviteSent);
                    let _ = self.arm_invite_timeout();
                }
                self.send_candidate_queue().await;
            }
            Err(e) => {
                self.fail_send(typ, e).await;
            }
        }
    }

    fn arm_invite_timeout(&self) -> Result<()> {
        let call = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(INVITE_TIMEOUT).await;
            let _ = call.inject_invite_timeout();
        });
        self.timers.lock()?.invite = Some(handle);
        Ok(())
    }

    pub(crate) async fn handle_invite_timeout(&self) -> Result<()> {
        if self.state()? != CallState::InviteSent {
            // Already disarmed by a state exit.
            return Ok(());
        }
        info!("invite_timeout(): call_id: {}", self.call_id);
        self.terminate(CallParty::Local, CallErrorCode::InviteTimeout, true, false)
            .await
    }

    pub(crate) fn handle_received_answer(&self, received: ReceivedAnswer) -> Result<()> {
        if self.direction == CallDirection::Inbound {
            warn!("received_answer(): unexpected for inbound call, ignoring");
            return Ok(());
        }
        {
            let mut opponent = self.opponent.lock()?;
            if opponent.party_id.is_chosen() {
                info!("received_answer(): a device already answered, ignoring");
                return Ok(());
            }
            opponent.party_id = OpponentPartyId::Chosen(received.sender_party_id.clone());
            opponent.version = received.sender_version;
        }
        info!(
            "received_answer(): call_id: {}, party: {:?}",
            self.call_id, received.sender_party_id
        );
        self.set_state(CallState::Connecting)?;

        let call = self.clone();
        self.spawn_operation(async move {
            call.apply_remote_answer(received).await;
        });
        Ok(())
    }

    async fn apply_remote_answer(&self, received: ReceivedAnswer) {
        if self.is_terminal() {
            return;
        }
        let pc = match self.peer_connection() {
            Ok(pc) => pc,
            Err(_) => return,
        };
        if let Err(e) = pc.set_remote_description(received.answer).await {
            self.fail_call(CallErrorCode::SetRemoteDescription, e.to_string())
                .await;
            return;
        }
        self.have_remote_description.store(true, Ordering::Release);
        self.drain_remote_candidates().await;

        match self.adopt_remote_stream() {
            Ok(true) => {}
            Ok(false) => {
                self.fail_call(
                    CallErrorCode::SetRemoteDescription,
                    "no remote streams after applying answer".to_string(),
                )
                .await;
                return;
            }
            Err(_) => return,
        }

        // Tell the answerer it won, so devices that raced it stand down.
        if let Some(party_id) = received.sender_party_id {
            let result = self
                .send_signaling(Message::SelectAnswer(SelectAnswer {
                    selected_party_id: Some(party_id),
                }))
                .await;
            if let Err(e) = result {
                // Non-fatal; the call proceeds without the courtesy.
                warn!("apply_remote_answer(): select_answer send failed: {}", e);
            }
        }
    }

    // ------------------------------------------------------------------
    // Inbound path.

    pub(crate) fn handle_received_invite(&self, received: ReceivedInvite) -> Result<()> {
        {
            let mut opponent = self.opponent.lock()?;
            opponent.party_id = OpponentPartyId::Chosen(received.sender_party_id.clone());
            opponent.version = received.sender_version;
        }
        if let Err(e) = self.create_peer_connection_now() {
            let call = self.clone();
            let message = e.to_string();
            self.spawn_operation(async move {
                call.fail_call(CallErrorCode::SetRemoteDescription, message)
                    .await;
            });
            return Ok(());
        }

        let call = self.clone();
        self.spawn_operation(async move {
            call.init_with_invite(received).await;
        });
        Ok(())
    }

    async fn init_with_invite(&self, received: ReceivedInvite) {
        let pc = match self.peer_connection() {
            Ok(pc) => pc,
            Err(_) => return,
        };
        if let Err(e) = pc.set_remote_description(received.offer.clone()).await {
            self.fail_call(CallErrorCode::SetRemoteDescription, e.to_string())
                .await;
            return;
        }
        self.have_remote_description.store(true, Ordering::Release);
        self.drain_remote_candidates().await;

        match self.adopt_remote_stream() {
            Ok(true) => {}
            Ok(false) => {
                self.fail_call(
                    CallErrorCode::SetRemoteDescription,
                    "no remote streams after applying offer".to_string(),
                )
                .await;
                return;
            }
            Err(_) => return,
        }
        self.refine_media_type_from_remote();

        // A hangup may have arrived while the description was applied.
        if self.is_terminal() {
            return;
        }

        if self.set_state(CallState::Ringing).is_err() {
            return;
        }

        match received.remaining_lifetime() {
            Some(remaining) => {
                let _ = self.arm_ring_lifetime(remaining);
            }
            None => {
                // The invite aged out in transit: ring and immediately
                // hang up, so the owner still sees the missed call.
                info!("init_with_invite(): invite is already stale");
                let _ = self.inject_ring_lifetime_expired();
            }
        }

        // Glare: the predecessor may have handed its media over before we
        // were ready for it.
        let pending = self
            .media
            .lock()
            .ok()
            .and_then(|mut media| media.pending_handoff.take());
        if let Some(stream) = pending {
            let _ = self.inject_local_media_acquired(stream);
        }
    }

    fn arm_ring_lifetime(&self, remaining: Duration) -> Result<()> {
        let call = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            let _ = call.inject_ring_lifetime_expired();
        });
        self.timers.lock()?.ring = Some(handle);
        Ok(())
    }

    pub(crate) async fn handle_ring_lifetime_expired(&self) -> Result<()> {
        if self.state()? != CallState::Ringing {
            return Ok(());
        }
        info!("ring_lifetime_expired(): call_id: {}", self.call_id);
        // The inviter stopped waiting for us; no wire signaling needed.
        self.terminate(CallParty::Remote, CallErrorCode::UserHangup, false, false)
            .await
    }

    pub(crate) fn handle_accept_call(&self) -> Result<()> {
        self.set_state(CallState::WaitLocalMedia)?;
        let awaiting = self.media.lock()?.awaiting_media_handoff;
        if !awaiting {
            self.spawn_media_acquisition();
        }
        Ok(())
    }

    pub(crate) async fn handle_reject_call(&self) -> Result<()> {
        if self.opponent_version()? >= signaling::MIN_VERSION_FOR_RENEGOTIATE {
            if let Err(e) = self.send_signaling(Message::Reject(Reject {})).await {
                warn!("reject(): send failed: {}", e);
            }
            self.terminate(CallParty::Local, CallErrorCode::UserHangup, false, false)
                .await
        } else {
            // v0 peers treat an early hangup as a reject.
            self.terminate(CallParty::Local, CallErrorCode::UserHangup, true, false)
                .await
        }
    }

    /// Create, apply and send the answer. Runs after local media is
    /// attached on the inbound path.
    async fn proceed_with_answer(&self) {
        if self.is_terminal() {
            return;
        }
        let pc = match self.peer_connection() {
            Ok(pc) => pc,
            Err(_) => return,
        };

        let answer = match pc.create_answer().await {
            Ok(answer) => answer,
            Err(e) => {
                self.fail_call(CallErrorCode::CreateAnswer, e.to_string())
                    .await;
                return;
            }
        };
        if let Err(e) = pc.set_local_description(answer.clone()).await {
            self.fail_call(CallErrorCode::SetLocalDescription, e.to_string())
                .await;
            return;
        }
        if pc.ice_gathering_state() == IceGatheringState::Gathering {
            tokio::time::sleep(GATHER_GRACE).await;
        }
        if self.is_terminal() {
            return;
        }

        if let Ok(mut queue) = self.candidates.lock() {
            queue.discard();
        }

        let description = pc.local_description().unwrap_or(answer);
        let result = self
            .send_signaling(Message::Answer(Answer {
                answer: description,
            }))
            .await;
        match result {
            Ok(()) => {
                self.invite_or_answer_sent.store(true, Ordering::Release);
                let _ = self.set_state(CallState::Connecting);
                // ICE may have finished while the answer was in flight.
                if pc.ice_connection_state().is_connected() {
                    let _ = self.set_state(CallState::Connected);
                }
                self.send_candidate_queue().await;
            }
            Err(e) => {
                self.fail_send(MessageType::Answer, e).await;
            }
        }
    }

    // ------------------------------------------------------------------
    // Renegotiation (perfect negotiation).

    pub(crate) fn handle_received_negotiate(&self, received: ReceivedNegotiate) -> Result<()> {
        let pc = match self.peer_connection() {
            Ok(pc) => pc,
            Err(_) => {
                info!("received_negotiate(): no peer connection yet, ignoring");
                return Ok(());
            }
        };

        let is_offer = received.description.is_offer();
        let offer_collision = is_offer
            && (self.negotiation.lock()?.making_offer
                || pc.signaling_state() != SignalingState::Stable);
        let polite = self.direction.is_polite();

        {
            let mut negotiation = self.negotiation.lock()?;
            negotiation.ignore_offer = !polite && offer_collision;
            if negotiation.ignore_offer {
                info!(
                    "received_negotiate(): impolite side ignoring colliding offer: call_id: {}",
                    self.call_id
                );
                return Ok(());
            }
        }

        let call = self.clone();
        self.spawn_operation(async move {
            call.apply_remote_negotiate(received.description, is_offer)
                .await;
        });
        Ok(())
    }

    async fn apply_remote_negotiate(&self, description: SessionDescription, is_offer: bool) {
        if self.is_terminal() {
            return;
        }
        let pc = match self.peer_connection() {
            Ok(pc) => pc,
            Err(_) => return,
        };

        let was_on_hold = self.is_local_on_hold();

        if let Err(e) = pc.set_remote_description(description).await {
            self.fail_call(CallErrorCode::SetRemoteDescription, e.to_string())
                .await;
            return;
        }
        self.have_remote_description.store(true, Ordering::Release);
        self.drain_remote_candidates().await;

        if is_offer {
            let answer = match pc.create_answer().await {
                Ok(answer) => answer,
                Err(e) => {
                    self.fail_call(CallErrorCode::CreateAnswer, e.to_string())
                        .await;
                    return;
                }
            };
            if let Err(e) = pc.set_local_description(answer.clone()).await {
                self.fail_call(CallErrorCode::SetLocalDescription, e.to_string())
                    .await;
                return;
            }
            let description = pc.local_description().unwrap_or(answer);
            let result = self
                .send_signaling(Message::Negotiate(Negotiate { description }))
                .await;
            if let Err(e) = result {
                self.fail_send(MessageType::Negotiate, e).await;
                return;
            }
        }

        let now_on_hold = self.is_local_on_hold();
        if was_on_hold != now_on_hold {
            self.observer
                .on_local_hold_changed(&self.call_id, now_on_hold);
        }
    }

    // ------------------------------------------------------------------
    // Remote candidates.

    pub(crate) fn handle_received_candidates(
        &self,
        received: signaling::ReceivedCandidates,
    ) -> Result<()> {
        let mut to_apply = Vec::new();
        for candidate in received.candidates {
            // End-of-candidates passes through; otherwise a candidate that
            // names no m-line cannot be applied.
            if !candidate.is_end_of_candidates() && !candidate.is_addressable() {
                debug!("received_candidates(): dropping candidate with no sdpMid or sdpMLineIndex");
                continue;
            }
            if self.have_remote_description.load(Ordering::Acquire) {
                to_apply.push(candidate);
            } else {
                // Hold until the description these belong to is applied.
                self.remote_candidate_buffer.lock()?.push(candidate);
            }
        }
        if to_apply.is_empty() {
            return Ok(());
        }
        let call = self.clone();
        self.spawn_operation(async move {
            call.add_remote_candidates(to_apply).await;
        });
        Ok(())
    }

    async fn drain_remote_candidates(&self) {
        let buffered = match self.remote_candidate_buffer.lock() {
            Ok(mut buffer) => std::mem::take(&mut *buffer),
            Err(_) => return,
        };
        if !buffered.is_empty() {
            self.add_remote_candidates(buffered).await;
        }
    }

    async fn add_remote_candidates(&self, candidates: Vec<CandidateInit>) {
        let pc = match self.peer_connection() {
            Ok(pc) => pc,
            Err(_) => return,
        };
        for candidate in candidates {
            if let Err(e) = pc.add_ice_candidate(candidate).await {
                let ignoring = self
                    .negotiation
                    .lock()
                    .map(|negotiation| negotiation.ignore_offer)
                    .unwrap_or(false);
                if ignoring {
                    // We signaled we are ignoring this negotiation pass.
                    debug!("add_remote_candidates(): swallowing failure while ignoring offer");
                } else {
                    warn!("add_remote_candidates(): add failed: {}", e);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Local candidates.

    pub(crate) fn handle_local_candidate(&self, candidate: CandidateInit) -> Result<()> {
        self.enqueue_local_candidate(candidate)
    }

    pub(crate) fn handle_gathering_complete(&self) -> Result<()> {
        self.enqueue_local_candidate(CandidateInit::end_of_candidates())
    }

    fn enqueue_local_candidate(&self, candidate: CandidateInit) -> Result<()> {
        let state = self.state()?;
        {
            let mut queue = self.candidates.lock()?;
            if !queue.enqueue(candidate) {
                debug!("enqueue_local_candidate(): end-of-candidates already enqueued");
                return Ok(());
            }
            // Candidates ride the next description until our invite or
            // answer is out.
            if state == CallState::Ringing
                || !self.invite_or_answer_sent.load(Ordering::Acquire)
            {
                return Ok(());
            }
            if !queue.try_schedule() {
                return Ok(());
            }
        }
        self.schedule_flush_timer(CandidateQueue::flush_delay(self.direction))
    }

    pub(crate) fn handle_candidate_flush(&self) -> Result<()> {
        let state = self.state()?;
        if state == CallState::Ringing || !self.invite_or_answer_sent.load(Ordering::Acquire) {
            // The gate closed again; keep the buffer parked.
            self.candidates.lock()?.defer();
            return Ok(());
        }
        let call = self.clone();
        self.spawn_operation(async move {
            call.send_candidate_queue().await;
        });
        Ok(())
    }

    /// Send the whole buffer as one candidates message, retrying with
    /// backoff on failure. Transient failures never terminate the call.
    async fn send_candidate_queue(&self) {
        loop {
            if self.is_terminal() {
                return;
            }
            let batch = match self.candidates.lock() {
                Ok(mut queue) => queue.begin_flush(),
                Err(_) => return,
            };
            if batch.is_empty() {
                return;
            }
            info!(
                "send_candidate_queue(): call_id: {}, candidates: {}",
                self.call_id,
                batch.len()
            );
            let result = self
                .send_signaling(Message::Candidates(Candidates {
                    candidates: batch.clone(),
                }))
                .await;
            match result {
                Ok(()) => {
                    let flush_again = match self.candidates.lock() {
                        Ok(mut queue) => queue.flush_succeeded(),
                        Err(_) => false,
                    };
                    if !flush_again {
                        return;
                    }
                    // New arrivals buffered during the send; go again.
                }
                Err(e) => {
                    warn!("send_candidate_queue(): send failed: {}", e);
                    let retry_delay = match self.candidates.lock() {
                        Ok(mut queue) => queue.flush_failed(batch),
                        Err(_) => None,
                    };
                    match retry_delay {
                        Some(delay) => {
                            let _ = self.schedule_flush_timer(delay);
                        }
                        None => {
                            warn!("send_candidate_queue(): giving up for now");
                        }
                    }
                    return;
                }
            }
        }
    }

    fn schedule_flush_timer(&self, delay: Duration) -> Result<()> {
        let call = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = call.inject_candidate_flush();
        });
        self.timers.lock()?.flush = Some(handle);
        Ok(())
    }

    // ------------------------------------------------------------------
    // ICE connection state.

    pub(crate) async fn handle_ice_connection_change(
        &self,
        ice_state: IceConnectionState,
    ) -> Result<()> {
        info!(
            "ice_connection_change(): call_id: {}, state: {}",
            self.call_id, ice_state
        );
        if ice_state.is_connected() {
            if self.state()? == CallState::Connecting {
                self.set_state(CallState::Connected)?;
            }
            return Ok(());
        }
        match ice_state {
            IceConnectionState::Failed => {
                self.terminate(CallParty::Local, CallErrorCode::IceFailed, true, false)
                    .await
            }
            IceConnectionState::Disconnected => {
                info!("ice_connection_change(): disconnected, waiting for recovery");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Mute / hold.

    pub(crate) fn handle_set_microphone_muted(&self, muted: bool) -> Result<()> {
        self.media.with(|media| media.mic_muted = muted)?;
        self.apply_track_gating()
    }

    pub(crate) fn handle_set_video_muted(&self, muted: bool) -> Result<()> {
        self.media.with(|media| media.vid_muted = muted)?;
        self.apply_track_gating()
    }

    pub(crate) fn handle_set_remote_on_hold(&self, on_hold: bool) -> Result<()> {
        let changed = self.media.with(|media| {
            let changed = media.remote_on_hold != on_hold;
            media.remote_on_hold = on_hold;
            changed
        })?;
        self.apply_track_gating()?;

        // Holding pauses our sending directions, which the peer should
        // hear about. Peers that understand renegotiation get a fresh
        // offer; legacy peers only get the gated tracks.
        if changed
            && self.state()? == CallState::Connected
            && self.opponent_version()? >= signaling::MIN_VERSION_FOR_RENEGOTIATE
        {
            self.inject_negotiation_needed()?;
        }
        Ok(())
    }

    /// Outbound tracks are live iff neither muted nor held.
    fn apply_track_gating(&self) -> Result<()> {
        let media = self.media.lock()?;
        if let Some(stream) = &media.local_stream {
            stream.set_kind_enabled(
                TrackKind::Audio,
                !(media.mic_muted || media.remote_on_hold),
            );
            stream.set_kind_enabled(
                TrackKind::Video,
                !(media.vid_muted || media.remote_on_hold),
            );
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Remote streams.

    /// Adopt the first remote stream the peer connection surfaces. False
    /// means the remote description produced none, which is a protocol
    /// error.
    fn adopt_remote_stream(&self) -> Result<bool> {
        let pc = self.peer_connection()?;
        let mut media = self.media.lock()?;
        if media.remote_stream.is_none() {
            match pc.remote_streams().into_iter().next() {
                Some(stream) => media.remote_stream = Some(stream),
                None => return Ok(false),
            }
        }
        Ok(true)
    }

    /// An inbound call invites as Voice until the remote tracks prove
    /// otherwise.
    fn refine_media_type_from_remote(&self) {
        let has_video = self
            .media
            .lock()
            .map(|media| {
                media
                    .remote_stream
                    .as_ref()
                    .map(|stream| stream.has_video())
                    .unwrap_or(false)
            })
            .unwrap_or(false);
        if has_video {
            if let Ok(mut media_type) = self.media_type.lock() {
                *media_type = CallMediaType::Video;
            }
        }
    }

    // ------------------------------------------------------------------
    // Remote termination messages.

    pub(crate) async fn handle_received_hangup(
        &self,
        received: signaling::ReceivedHangup,
    ) -> Result<()> {
        let reason = received.reason.unwrap_or(CallErrorCode::UserHangup);
        info!(
            "received_hangup(): call_id: {}, reason: {}",
            self.call_id, reason
        );
        // The remote already knows; nothing goes back on the wire.
        self.terminate(CallParty::Remote, reason, false, false).await
    }

    pub(crate) async fn handle_received_reject(&self, _received: ReceivedReject) -> Result<()> {
        if self.state()? != CallState::InviteSent {
            info!("received_reject(): not awaiting an answer, ignoring");
            return Ok(());
        }
        self.terminate(CallParty::Remote, CallErrorCode::UserHangup, false, false)
            .await
    }

    pub(crate) async fn handle_received_select_answer(
        &self,
        received: ReceivedSelectAnswer,
    ) -> Result<()> {
        if self.direction != CallDirection::Inbound {
            warn!("received_select_answer(): unexpected for outbound call, ignoring");
            return Ok(());
        }
        if received.selected_party_id.as_ref() == Some(&self.our_party_id) {
            debug!("received_select_answer(): our answer was selected");
            return Ok(());
        }
        info!(
            "received_select_answer(): another device was selected: {:?}",
            received.selected_party_id
        );
        self.terminate(
            CallParty::Remote,
            CallErrorCode::AnsweredElsewhere,
            false,
            false,
        )
        .await
    }

    // ------------------------------------------------------------------
    // Glare / replacement.

    pub(crate) async fn handle_replace(&self, new_call: Call<T>) -> Result<()> {
        let state = self.state()?;
        info!(
            "replace(): call_id: {} -> {}, state: {}",
            self.call_id,
            new_call.call_id(),
            state
        );
        match state {
            CallState::WaitLocalMedia => {
                // Our media acquisition is in flight; the successor adopts
                // it when it lands.
                new_call.mark_awaiting_media_handoff()?;
            }
            CallState::CreateOffer | CallState::InviteSent => {
                let stream = self.media.lock()?.local_stream.take();
                if let Some(stream) = stream {
                    let _ = new_call.inject_local_media_acquired(stream);
                }
            }
            _ => {}
        }
        *self.successor.lock()? = Some(new_call.clone());
        self.observer.on_replaced(&self.call_id, new_call.call_id());
        // Event suppression keeps the replacement from looking like a
        // failed call to the owner.
        self.terminate(CallParty::Local, CallErrorCode::Replaced, false, true)
            .await
    }

    pub(crate) fn mark_awaiting_media_handoff(&self) -> Result<()> {
        self.media.with(|media| media.awaiting_media_handoff = true)
    }

    // ------------------------------------------------------------------
    // Termination.

    /// Tear the call down. Idempotent; the first caller wins and records
    /// the hangup attribution.
    pub(crate) async fn terminate(
        &self,
        party: CallParty,
        reason: CallErrorCode,
        send_hangup: bool,
        suppress_events: bool,
    ) -> Result<()> {
        {
            let mut termination = self.termination.lock()?;
            if termination.is_some() {
                debug!("terminate(): already terminated: call_id: {}", self.call_id);
                return Ok(());
            }
            *termination = Some(TerminationInfo { party, reason });
        }
        info!(
            "terminate(): call_id: {}, party: {}, reason: {}",
            self.call_id, party, reason
        );

        self.set_state(CallState::Ended)?;
        self.cancel_timers()?;

        if send_hangup && self.should_send_hangup() {
            let result = self
                .send_signaling(Message::Hangup(Hangup {
                    reason: Some(reason),
                }))
                .await;
            if let Err(e) = result {
                warn!("terminate(): hangup send failed: {}", e);
            }
        }

        {
            let media = self.media.lock()?;
            if let Some(stream) = &media.local_stream {
                stream.stop_all();
            }
            if let Some(stream) = &media.remote_stream {
                stream.stop_all();
            }
        }

        if let Ok(pc) = self.peer_connection() {
            if !pc.is_closed() {
                pc.close();
            }
        }

        if !suppress_events {
            self.observer.on_hangup(&self.call_id);
        }
        Ok(())
    }

    fn cancel_timers(&self) -> Result<()> {
        let mut timers = self.timers.lock()?;
        for timer in [
            timers.invite.take(),
            timers.ring.take(),
            timers.flush.take(),
        ]
        .into_iter()
        .flatten()
        {
            timer.abort();
        }
        Ok(())
    }
}
