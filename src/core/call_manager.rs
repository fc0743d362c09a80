//
// Copyright 2024 RoomRTC Contributors
// SPDX-License-Identifier: AGPL-3.0-only
//

//! The main Call Manager object definitions.
//!
//! The manager is the call factory and registry: it owns the
//! `call_id -> Call` map the transport routes inbound messages through,
//! resolves ICE servers, enforces the one-active-call-per-room rule, and
//! arbitrates glare between simultaneous invites. Calls own their own
//! lifecycle; the manager only looks them up, so dropping the manager's
//! entry is enough to let a terminated call unwind.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::common::{CallDirection, CallId, CallMediaType, CallState, PartyId, Result, RoomId};
use crate::core::call::Call;
use crate::core::call_mutex::CallMutex;
use crate::core::platform::{CallObserver, IceServer, Platform};
use crate::core::signaling::{Message, ReceivedAnswer, ReceivedCandidates, ReceivedHangup,
    ReceivedInvite, ReceivedMessage, ReceivedNegotiate, ReceivedReject, ReceivedSelectAnswer};
use crate::core::transport::SignalingTransport;
use crate::error::EngineError;

/// Appended when the caller supplied no ICE servers and the transport
/// permits falling back to the well-known server.
pub const FALLBACK_ICE_SERVER: &str = "stun:turn.matrix.org";

pub struct CallManager<T>
where
    T: Platform,
{
    platform: Arc<T>,
    transport: Arc<dyn SignalingTransport>,
    /// Stable identifier for this device, placed on every outbound message.
    our_party_id: PartyId,
    observer: Arc<CallMutex<Option<Arc<dyn CallObserver>>>>,
    /// Active calls by id. Lookup-only: lifetime is anchored here, the
    /// transport never holds its own strong references.
    call_map: Arc<CallMutex<HashMap<CallId, Call<T>>>>,
    /// Ids of concluded calls, kept for replay protection.
    finished_calls: Arc<CallMutex<HashSet<CallId>>>,
}

impl<T> Clone for CallManager<T>
where
    T: Platform,
{
    fn clone(&self) -> Self {
        Self {
            platform: Arc::clone(&self.platform),
            transport: Arc::clone(&self.transport),
            our_party_id: self.our_party_id.clone(),
            observer: Arc::clone(&self.observer),
            call_map: Arc::clone(&self.call_map),
            finished_calls: Arc::clone(&self.finished_calls),
        }
    }
}

impl<T> CallManager<T>
where
    T: Platform,
{
    pub fn new(
        platform: T,
        transport: impl SignalingTransport,
        our_party_id: PartyId,
    ) -> Self {
        info!("new(): party_id: {}", our_party_id);
        Self {
            platform: Arc::new(platform),
            transport: Arc::new(transport),
            our_party_id,
            observer: Arc::new(CallMutex::new(None, "observer")),
            call_map: Arc::new(CallMutex::new(HashMap::new(), "call_map")),
            finished_calls: Arc::new(CallMutex::new(HashSet::new(), "finished_calls")),
        }
    }

    /// Register the owner's event sink. Required before any call exists.
    pub fn set_observer(&self, observer: impl CallObserver) -> Result<()> {
        *self.observer.lock()? = Some(Arc::new(observer));
        Ok(())
    }

    fn observer(&self) -> Result<Arc<dyn CallObserver>> {
        self.observer
            .lock()?
            .clone()
            .ok_or_else(|| EngineError::ObserverNotSet.into())
    }

    pub fn our_party_id(&self) -> &PartyId {
        &self.our_party_id
    }

    /// Place an outbound call.
    ///
    /// Fails fast without an observer: a call whose errors nobody would see
    /// is a programmer error, caught before any side effect.
    pub fn place_call(
        &self,
        room_id: RoomId,
        media_type: CallMediaType,
        ice_servers: Vec<IceServer>,
    ) -> Result<Call<T>> {
        let observer = self.observer()?;
        self.prune_terminated()?;

        if self.active_call_for_room(&room_id)?.is_some() {
            return Err(EngineError::CallAlreadyInProgress(room_id).into());
        }

        let call = Call::new(
            CallId::random(),
            room_id,
            CallDirection::Outbound,
            media_type,
            self.our_party_id.clone(),
            self.resolve_ice_servers(ice_servers),
            Arc::clone(&self.platform),
            Arc::clone(&self.transport),
            observer,
        );
        info!("place_call(): call_id: {}", call.call_id());

        self.call_map
            .lock()?
            .insert(call.call_id().clone(), call.clone());
        call.inject_place_call()?;
        Ok(call)
    }

    /// Route one inbound signaling message.
    pub fn received_message(&self, message: ReceivedMessage) -> Result<()> {
        // The transport echoes the room's events back to us; our own are
        // not signaling input.
        if message.sender_party_id.as_ref() == Some(&self.our_party_id) {
            debug!("received_message(): dropping our own echo");
            return Ok(());
        }

        self.prune_terminated()?;

        if self.finished_calls.lock()?.contains(&message.call_id) {
            debug!(
                "received_message(): dropping {} for concluded call: {}",
                message.body.typ(),
                message.call_id
            );
            return Ok(());
        }

        let existing = self.call_map.lock()?.get(&message.call_id).cloned();
        match existing {
            Some(call) => self.route_to_call(&call, message),
            None => match message.body {
                Message::Invite(ref invite) => {
                    let received = ReceivedInvite {
                        offer: invite.offer.clone(),
                        lifetime: invite.lifetime,
                        age: message.age,
                        sender_party_id: message.sender_party_id.clone(),
                        sender_version: message.sender_version,
                    };
                    self.received_invite(message.room_id, message.call_id, received)
                }
                ref body => {
                    info!(
                        "received_message(): dropping {} for unknown call: {}",
                        body.typ(),
                        message.call_id
                    );
                    Ok(())
                }
            },
        }
    }

    fn route_to_call(&self, call: &Call<T>, message: ReceivedMessage) -> Result<()> {
        let sender_party_id = message.sender_party_id;
        match message.body {
            Message::Invite(_) => {
                // The call already exists; a second invite is a replay.
                info!(
                    "route_to_call(): dropping duplicate invite for call: {}",
                    call.call_id()
                );
                Ok(())
            }
            Message::Answer(answer) => call.inject_received_answer(ReceivedAnswer {
                answer: answer.answer,
                sender_party_id,
                sender_version: message.sender_version,
            }),
            Message::Candidates(candidates) => {
                call.inject_received_candidates(ReceivedCandidates {
                    candidates: candidates.candidates,
                    sender_party_id,
                })
            }
            Message::Negotiate(negotiate) => {
                call.inject_received_negotiate(ReceivedNegotiate {
                    description: negotiate.description,
                    sender_party_id,
                })
            }
            Message::SelectAnswer(select_answer) => {
                call.inject_received_select_answer(ReceivedSelectAnswer {
                    selected_party_id: select_answer.selected_party_id,
                    sender_party_id,
                })
            }
            Message::Hangup(hangup) => call.inject_received_hangup(ReceivedHangup {
                reason: hangup.reason,
                sender_party_id,
            }),
            Message::Reject(_) => call.inject_received_reject(ReceivedReject { sender_party_id }),
        }
    }

    /// Handle an invite for a call we do not know yet, arbitrating glare
    /// against any outbound call to the same room.
    fn received_invite(
        &self,
        room_id: RoomId,
        call_id: CallId,
        received: ReceivedInvite,
    ) -> Result<()> {
        let observer = self.observer()?;

        if let Some(existing) = self.active_call_for_room(&room_id)? {
            if !Self::eligible_for_replacement(&existing)? {
                info!(
                    "received_invite(): already in call {} for room, ignoring invite {}",
                    existing.call_id(),
                    call_id
                );
                return Ok(());
            }
            if !self.remote_wins_glare(&received.sender_party_id) {
                info!(
                    "received_invite(): glare, local call {} wins tiebreak, dropping invite {}",
                    existing.call_id(),
                    call_id
                );
                return Ok(());
            }
            info!(
                "received_invite(): glare, local call {} loses tiebreak to invite {}",
                existing.call_id(),
                call_id
            );
            let new_call = self.make_inbound_call(call_id, room_id, observer);
            new_call.inject_received_invite(received)?;
            existing.inject_replace(new_call)?;
            return Ok(());
        }

        let call = self.make_inbound_call(call_id, room_id, observer);
        call.inject_received_invite(received)
    }

    fn make_inbound_call(
        &self,
        call_id: CallId,
        room_id: RoomId,
        observer: Arc<dyn CallObserver>,
    ) -> Call<T> {
        let call = Call::new(
            call_id,
            room_id,
            CallDirection::Inbound,
            // Voice until the remote tracks prove otherwise.
            CallMediaType::Voice,
            self.our_party_id.clone(),
            self.resolve_ice_servers(Vec::new()),
            Arc::clone(&self.platform),
            Arc::clone(&self.transport),
            observer,
        );
        if let Ok(mut call_map) = self.call_map.lock() {
            call_map.insert(call.call_id().clone(), call.clone());
        }
        call
    }

    /// Only an outbound call that has not been answered yet can lose a
    /// glare tiebreak.
    fn eligible_for_replacement(call: &Call<T>) -> Result<bool> {
        if call.direction() != CallDirection::Outbound {
            return Ok(false);
        }
        Ok(matches!(
            call.state()?,
            CallState::Fledgling
                | CallState::WaitLocalMedia
                | CallState::CreateOffer
                | CallState::InviteSent
        ))
    }

    /// Deterministic and symmetric: exactly one side yields. A missing
    /// party id compares as the empty string, so legacy inviters lose.
    fn remote_wins_glare(&self, sender_party_id: &Option<PartyId>) -> bool {
        sender_party_id.as_deref().unwrap_or("") > self.our_party_id.as_str()
    }

    fn resolve_ice_servers(&self, ice_servers: Vec<IceServer>) -> Vec<IceServer> {
        if ice_servers.is_empty() && self.transport.allow_ice_fallback() {
            vec![IceServer::stun(FALLBACK_ICE_SERVER)]
        } else {
            ice_servers
        }
    }

    /// Drop concluded calls from the map, remembering their ids so late
    /// messages cannot resurrect them.
    fn prune_terminated(&self) -> Result<()> {
        let mut call_map = self.call_map.lock()?;
        let mut finished_calls = self.finished_calls.lock()?;
        call_map.retain(|call_id, call| {
            if call.is_terminal() {
                debug!("prune_terminated(): concluding call: {}", call_id);
                finished_calls.insert(call_id.clone());
                false
            } else {
                true
            }
        });
        Ok(())
    }

    pub fn call_by_id(&self, call_id: &CallId) -> Result<Option<Call<T>>> {
        Ok(self.call_map.lock()?.get(call_id).cloned())
    }

    /// The non-terminal call for a room, if any.
    pub fn active_call_for_room(&self, room_id: &RoomId) -> Result<Option<Call<T>>> {
        let call_map = self.call_map.lock()?;
        Ok(call_map
            .values()
            .find(|call| call.room_id() == room_id && !call.is_terminal())
            .cloned())
    }
}
