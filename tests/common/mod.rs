//
// Copyright 2024 RoomRTC Contributors
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Common test utilities

use std::time::Duration;

use roomrtc::common::{CallId, CallMediaType, PartyId, RoomId};
use roomrtc::core::call::Call;
use roomrtc::core::call_manager::CallManager;
use roomrtc::core::signaling::{
    Answer, Candidates, Hangup, Invite, Message, Negotiate, ReceivedMessage, Reject, SelectAnswer,
    SessionDescription,
};
use roomrtc::error::CallErrorCode;
use roomrtc::sim::sim_platform::{SimObserver, SimPeerConnection, SimPlatform, SimTransport};

#[macro_export]
macro_rules! error_line {
    () => {
        concat!(module_path!(), ":", line!())
    };
}

pub fn test_init() {
    let _ = env_logger::try_init();
}

pub struct TestContext {
    pub platform: SimPlatform,
    pub transport: SimTransport,
    pub observer: SimObserver,
    pub call_manager: CallManager<SimPlatform>,
}

#[allow(dead_code)]
impl TestContext {
    pub fn new(our_party_id: &str) -> Self {
        test_init();

        let platform = SimPlatform::new();
        let transport = SimTransport::new();
        let observer = SimObserver::new();
        let call_manager = CallManager::new(
            platform.clone(),
            transport.clone(),
            our_party_id.to_string(),
        );
        call_manager
            .set_observer(observer.clone())
            .expect(error_line!());

        Self {
            platform,
            transport,
            observer,
            call_manager,
        }
    }

    /// A context whose manager has no observer registered.
    pub fn new_without_observer(our_party_id: &str) -> Self {
        test_init();

        let platform = SimPlatform::new();
        let transport = SimTransport::new();
        let call_manager = CallManager::new(
            platform.clone(),
            transport.clone(),
            our_party_id.to_string(),
        );

        Self {
            platform,
            transport,
            observer: SimObserver::new(),
            call_manager,
        }
    }

    /// Let the event pumps and spawned operations run to quiescence.
    /// Yields without advancing the (paused) clock, so pending timers stay
    /// pending.
    pub async fn settle(&self) {
        for _ in 0..64 {
            tokio::task::yield_now().await;
        }
    }

    /// The peer connection of the most recently created call.
    pub fn pc(&self) -> SimPeerConnection {
        self.platform
            .last_peer_connection()
            .expect("no peer connection created yet")
    }

    pub fn place_voice_call(&self, room_id: &str) -> Call<SimPlatform> {
        self.call_manager
            .place_call(room_id.to_string(), CallMediaType::Voice, Vec::new())
            .expect(error_line!())
    }

    fn deliver(
        &self,
        room_id: &str,
        call_id: &CallId,
        sender_party_id: Option<&str>,
        sender_version: u32,
        age: Duration,
        body: Message,
    ) {
        let message = ReceivedMessage {
            room_id: RoomId::from(room_id),
            call_id: call_id.clone(),
            sender_party_id: sender_party_id.map(PartyId::from),
            sender_version,
            age,
            body,
        };
        self.call_manager
            .received_message(message)
            .expect(error_line!());
    }

    pub fn deliver_invite(
        &self,
        room_id: &str,
        call_id: &CallId,
        sender_party_id: Option<&str>,
        sender_version: u32,
        lifetime_ms: u64,
        age: Duration,
    ) {
        self.deliver(
            room_id,
            call_id,
            sender_party_id,
            sender_version,
            age,
            Message::Invite(Invite {
                offer: SessionDescription::offer("v=0 remote-offer"),
                lifetime: lifetime_ms,
            }),
        );
    }

    pub fn deliver_answer(
        &self,
        room_id: &str,
        call_id: &CallId,
        sender_party_id: Option<&str>,
        sender_version: u32,
    ) {
        self.deliver(
            room_id,
            call_id,
            sender_party_id,
            sender_version,
            Duration::ZERO,
            Message::Answer(Answer {
                answer: SessionDescription::answer("v=0 remote-answer"),
            }),
        );
    }

    pub fn deliver_candidates(
        &self,
        room_id: &str,
        call_id: &CallId,
        sender_party_id: Option<&str>,
        candidates: Candidates,
    ) {
        self.deliver(
            room_id,
            call_id,
            sender_party_id,
            0,
            Duration::ZERO,
            Message::Candidates(candidates),
        );
    }

    pub fn deliver_negotiate_offer(
        &self,
        room_id: &str,
        call_id: &CallId,
        sender_party_id: Option<&str>,
    ) {
        self.deliver(
            room_id,
            call_id,
            sender_party_id,
            1,
            Duration::ZERO,
            Message::Negotiate(Negotiate {
                description: SessionDescription::offer("v=0 remote-renegotiate"),
            }),
        );
    }

    pub fn deliver_hangup(
        &self,
        room_id: &str,
        call_id: &CallId,
        sender_party_id: Option<&str>,
        reason: Option<CallErrorCode>,
    ) {
        self.deliver(
            room_id,
            call_id,
            sender_party_id,
            0,
            Duration::ZERO,
            Message::Hangup(Hangup { reason }),
        );
    }

    pub fn deliver_reject(&self, room_id: &str, call_id: &CallId, sender_party_id: Option<&str>) {
        self.deliver(
            room_id,
            call_id,
            sender_party_id,
            1,
            Duration::ZERO,
            Message::Reject(Reject {}),
        );
    }

    pub fn deliver_select_answer(
        &self,
        room_id: &str,
        call_id: &CallId,
        sender_party_id: Option<&str>,
        selected_party_id: Option<&str>,
    ) {
        self.deliver(
            room_id,
            call_id,
            sender_party_id,
            1,
            Duration::ZERO,
            Message::SelectAnswer(SelectAnswer {
                selected_party_id: selected_party_id.map(PartyId::from),
            }),
        );
    }
}
