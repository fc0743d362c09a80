//
// Copyright 2024 RoomRTC Contributors
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Call Finite State Machine
//!
//! The FSM consumes the call's event pump and dispatches on (state, event).
//! Events come from four directions:
//!
//! # Asynchronous Inputs:
//!
//! ## Control events from the owner
//!
//! - PlaceCall
//! - AcceptCall
//! - RejectCall
//! - LocalHangup
//! - SetMicrophoneMuted / SetVideoMuted / SetRemoteOnHold
//! - Replace (glare resolution)
//!
//! ## Signaling events from the transport
//!
//! - ReceivedInvite
//! - ReceivedAnswer
//! - ReceivedCandidates
//! - ReceivedNegotiate
//! - ReceivedHangup
//! - ReceivedReject
//! - ReceivedSelectAnswer
//!
//! ## From the peer connection observer
//!
//! - NegotiationNeeded
//! - LocalIceCandidate
//! - IceGatheringComplete
//! - IceConnectionChange
//!
//! ## From spawned operations and timers
//!
//! - LocalMediaAcquired / LocalMediaFailed
//! - InviteTimeout
//! - RingLifetimeExpired
//! - CandidateFlush
//! - Synchronize
//!
//! Events are processed one at a time; operations with suspension points
//! run as spawned tasks, so a remote message can be dispatched while, for
//! example, a local offer is still being created. Unlisted (state, event)
//! pairs are programmer errors: logged and ignored.

use std::fmt;

use futures::channel::{mpsc, oneshot};
use futures::StreamExt;

use crate::common::{CallParty, CallState, OpponentPartyId, PartyId, Result};
use crate::core::call::Call;
use crate::core::platform::Platform;
use crate::core::signaling::{
    CandidateInit, ReceivedAnswer, ReceivedCandidates, ReceivedHangup, ReceivedInvite,
    ReceivedNegotiate, ReceivedReject, ReceivedSelectAnswer,
};
use crate::error::CallErrorCode;
use crate::webrtc::media::MediaStream;
use crate::webrtc::peer_connection::IceConnectionState;

/// The different types of CallEvents.
pub enum CallEvent<T>
where
    T: Platform,
{
    // Control events from the owner
    /// Start an outbound call.
    PlaceCall,
    /// Answer a ringing inbound call.
    AcceptCall,
    /// Decline a ringing inbound call.
    RejectCall,
    /// Hang the call up.
    LocalHangup { reason: CallErrorCode },
    SetMicrophoneMuted(bool),
    SetVideoMuted(bool),
    SetRemoteOnHold(bool),
    /// This call lost a glare tiebreak to the given replacement.
    Replace(Call<T>),

    // Signaling events from the transport
    ReceivedInvite(ReceivedInvite),
    ReceivedAnswer(ReceivedAnswer),
    ReceivedCandidates(ReceivedCandidates),
    ReceivedNegotiate(ReceivedNegotiate),
    ReceivedHangup(ReceivedHangup),
    ReceivedReject(ReceivedReject),
    ReceivedSelectAnswer(ReceivedSelectAnswer),

    // Peer connection observer events
    NegotiationNeeded,
    LocalIceCandidate(CandidateInit),
    IceGatheringComplete,
    IceConnectionChange(IceConnectionState),

    // Operation results and timers
    LocalMediaAcquired(MediaStream),
    LocalMediaFailed(String),
    InviteTimeout,
    RingLifetimeExpired,
    CandidateFlush,
    /// Flush the pump and its spawned operations, then ack.
    Synchronize(oneshot::Sender<()>),
}

impl<T> fmt::Display for CallEvent<T>
where
    T: Platform,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let display = match self {
            CallEvent::PlaceCall => "PlaceCall".to_string(),
            CallEvent::AcceptCall => "AcceptCall".to_string(),
            CallEvent::RejectCall => "RejectCall".to_string(),
            CallEvent::LocalHangup { reason } => format!("LocalHangup, reason: {}", reason),
            CallEvent::SetMicrophoneMuted(muted) => format!("SetMicrophoneMuted({})", muted),
            CallEvent::SetVideoMuted(muted) => format!("SetVideoMuted({})", muted),
            CallEvent::SetRemoteOnHold(on_hold) => format!("SetRemoteOnHold({})", on_hold),
            CallEvent::Replace(new_call) => format!("Replace, successor: {}", new_call.call_id()),
            CallEvent::ReceivedInvite(invite) => format!(
                "ReceivedInvite, party: {:?}, v{}",
                invite.sender_party_id, invite.sender_version
            ),
            CallEvent::ReceivedAnswer(answer) => format!(
                "ReceivedAnswer, party: {:?}, v{}",
                answer.sender_party_id, answer.sender_version
            ),
            CallEvent::ReceivedCandidates(candidates) => format!(
                "ReceivedCandidates, party: {:?}, n: {}",
                candidates.sender_party_id,
                candidates.candidates.len()
            ),
            CallEvent::ReceivedNegotiate(negotiate) => {
                format!("ReceivedNegotiate, party: {:?}", negotiate.sender_party_id)
            }
            CallEvent::ReceivedHangup(hangup) => format!("ReceivedHangup, {:?}", hangup),
            CallEvent::ReceivedReject(reject) => format!("ReceivedReject, {:?}", reject),
            CallEvent::ReceivedSelectAnswer(select) => format!(
                "ReceivedSelectAnswer, selected: {:?}",
                select.selected_party_id
            ),
            CallEvent::NegotiationNeeded => "NegotiationNeeded".to_string(),
            CallEvent::LocalIceCandidate(candidate) => {
                format!("LocalIceCandidate, {}", candidate)
            }
            CallEvent::IceGatheringComplete => "IceGatheringComplete".to_string(),
            CallEvent::IceConnectionChange(state) => format!("IceConnectionChange({})", state),
            CallEvent::LocalMediaAcquired(_) => "LocalMediaAcquired".to_string(),
            CallEvent::LocalMediaFailed(error) => format!("LocalMediaFailed: {}", error),
            CallEvent::InviteTimeout => "InviteTimeout".to_string(),
            CallEvent::RingLifetimeExpired => "RingLifetimeExpired".to_string(),
            CallEvent::CandidateFlush => "CandidateFlush".to_string(),
            CallEvent::Synchronize(_) => "Synchronize".to_string(),
        };
        write!(f, "({})", display)
    }
}

impl<T> fmt::Debug for CallEvent<T>
where
    T: Platform,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// A mpsc::Receiver for receiving CallEvents, paired with the Call to
/// apply them to.
pub type EventStream<T> = mpsc::Receiver<(Call<T>, CallEvent<T>)>;

/// CallStateMachine Object.
///
/// Consumes the event stream serially until every sender is dropped, which
/// happens when the last Call handle goes away.
pub struct CallStateMachine<T>
where
    T: Platform,
{
    /// Receiving end of the event pump.
    event_stream: EventStream<T>,
}

impl<T> CallStateMachine<T>
where
    T: Platform,
{
    pub fn new(event_stream: EventStream<T>) -> Self {
        Self { event_stream }
    }

    pub async fn run(mut self) {
        while let Some((call, event)) = self.event_stream.next().await {
            let state = match call.state() {
                Ok(state) => state,
                Err(e) => {
                    error!("state unavailable: {}", e);
                    continue;
                }
            };
            info!("state: {}, event: {}", state, event);
            if let Err(e) = self.handle_event(call, state, event).await {
                error!("Handling event failed: {:?}", e);
            }
        }
        info!("No more events!");
    }

    /// Top level event dispatch.
    async fn handle_event(
        &mut self,
        call: Call<T>,
        state: CallState,
        event: CallEvent<T>,
    ) -> Result<()> {
        // A few events are meaningful even in the terminal state.
        let event = match event {
            CallEvent::Synchronize(done) => {
                return self.handle_synchronize(call, done).await;
            }
            CallEvent::LocalMediaAcquired(stream) => {
                // After glare replacement, media outcomes belong to the
                // successor.
                if let Some(successor) = call.successor()? {
                    info!("media acquired for replaced call: delegating to successor");
                    return successor.inject_local_media_acquired(stream);
                }
                if state.is_terminal() {
                    stream.stop_all();
                    return Ok(());
                }
                return call.handle_media_acquired(stream).await;
            }
            CallEvent::LocalMediaFailed(error) => {
                if let Some(successor) = call.successor()? {
                    info!("media failure for replaced call: delegating to successor");
                    return successor.inject_local_media_failed(error);
                }
                if state.is_terminal() {
                    return Ok(());
                }
                return call.handle_media_failed(error).await;
            }
            CallEvent::LocalHangup { reason } => {
                return if state.is_terminal() {
                    // Hanging up twice is the same as once.
                    debug!("hangup(): already ended");
                    Ok(())
                } else {
                    call.terminate(CallParty::Local, reason, true, false).await
                };
            }
            event => event,
        };

        // Terminal is absorbing: everything else is dropped.
        if state.is_terminal() {
            debug!("handle_event(): dropping {} in terminal state", event);
            return Ok(());
        }

        // Once a partner is committed, messages from other parties are
        // ignored.
        if let Some(sender_party_id) = Self::filtered_party(&event) {
            if !Self::passes_party_filter(&call, &event, sender_party_id)? {
                return Ok(());
            }
        }

        match event {
            CallEvent::PlaceCall => {
                if state == CallState::Fledgling {
                    call.handle_place_call()
                } else {
                    self.unexpected_state(state, "PlaceCall");
                    Ok(())
                }
            }
            CallEvent::ReceivedInvite(invite) => {
                if state == CallState::Fledgling {
                    call.handle_received_invite(invite)
                } else {
                    self.unexpected_state(state, "ReceivedInvite");
                    Ok(())
                }
            }
            CallEvent::AcceptCall => {
                if state == CallState::Ringing {
                    call.handle_accept_call()
                } else {
                    self.unexpected_state(state, "AcceptCall");
                    Ok(())
                }
            }
            CallEvent::RejectCall => {
                if state == CallState::Ringing {
                    call.handle_reject_call().await
                } else {
                    self.unexpected_state(state, "RejectCall");
                    Ok(())
                }
            }
            CallEvent::ReceivedAnswer(answer) => call.handle_received_answer(answer),
            CallEvent::ReceivedCandidates(candidates) => {
                call.handle_received_candidates(candidates)
            }
            CallEvent::ReceivedNegotiate(negotiate) => call.handle_received_negotiate(negotiate),
            CallEvent::ReceivedHangup(hangup) => call.handle_received_hangup(hangup).await,
            CallEvent::ReceivedReject(reject) => call.handle_received_reject(reject).await,
            CallEvent::ReceivedSelectAnswer(select_answer) => {
                call.handle_received_select_answer(select_answer).await
            }
            CallEvent::NegotiationNeeded => call.handle_negotiation_needed(),
            CallEvent::LocalIceCandidate(candidate) => call.handle_local_candidate(candidate),
            CallEvent::IceGatheringComplete => call.handle_gathering_complete(),
            CallEvent::IceConnectionChange(ice_state) => {
                call.handle_ice_connection_change(ice_state).await
            }
            CallEvent::InviteTimeout => call.handle_invite_timeout().await,
            CallEvent::RingLifetimeExpired => call.handle_ring_lifetime_expired().await,
            CallEvent::CandidateFlush => call.handle_candidate_flush(),
            CallEvent::SetMicrophoneMuted(muted) => call.handle_set_microphone_muted(muted),
            CallEvent::SetVideoMuted(muted) => call.handle_set_video_muted(muted),
            CallEvent::SetRemoteOnHold(on_hold) => call.handle_set_remote_on_hold(on_hold),
            CallEvent::Replace(new_call) => call.handle_replace(new_call).await,
            CallEvent::Synchronize(_)
            | CallEvent::LocalHangup { .. }
            | CallEvent::LocalMediaAcquired(_)
            | CallEvent::LocalMediaFailed(_) => Ok(()),
        }
    }

    /// The sender party id of events subject to the party filter.
    fn filtered_party<'a>(event: &'a CallEvent<T>) -> Option<&'a Option<PartyId>> {
        match event {
            CallEvent::ReceivedAnswer(answer) => Some(&answer.sender_party_id),
            CallEvent::ReceivedCandidates(candidates) => Some(&candidates.sender_party_id),
            CallEvent::ReceivedNegotiate(negotiate) => Some(&negotiate.sender_party_id),
            CallEvent::ReceivedHangup(hangup) => Some(&hangup.sender_party_id),
            CallEvent::ReceivedReject(reject) => Some(&reject.sender_party_id),
            CallEvent::ReceivedSelectAnswer(select) => Some(&select.sender_party_id),
            _ => None,
        }
    }

    /// Apply the party filter: after a partner commits, only its messages
    /// pass. Before commitment, the messages that can commit, end, or
    /// collide with the call pass (`answer`; `hangup` and `reject`, which
    /// double as an early decline from v0 peers; `negotiate`, which the
    /// collision handler must see). Stray pre-answer candidates and
    /// select_answers are dropped.
    fn passes_party_filter(
        call: &Call<T>,
        event: &CallEvent<T>,
        sender_party_id: &Option<PartyId>,
    ) -> Result<bool> {
        let opponent = call.opponent_party_id()?;
        let passes = match &opponent {
            OpponentPartyId::Unchosen => matches!(
                event,
                CallEvent::ReceivedAnswer(_)
                    | CallEvent::ReceivedHangup(_)
                    | CallEvent::ReceivedReject(_)
                    | CallEvent::ReceivedNegotiate(_)
            ),
            chosen => chosen.matches(sender_party_id.as_ref()),
        };
        if !passes {
            info!(
                "party filter: dropping {} from party {:?}, committed: {}",
                event, sender_party_id, opponent
            );
        }
        Ok(passes)
    }

    async fn handle_synchronize(
        &mut self,
        call: Call<T>,
        done: oneshot::Sender<()>,
    ) -> Result<()> {
        for operation in call.take_operations()? {
            let _ = operation.await;
        }
        let _ = done.send(());
        Ok(())
    }

    fn unexpected_state(&self, state: CallState, event: &str) {
        warn!("Unexpected event {}, while in state {:?}", event, state);
    }
}
