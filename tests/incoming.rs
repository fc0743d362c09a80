//
// Copyright 2024 RoomRTC Contributors
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Tests for inbound calls and glare

extern crate roomrtc;

use std::time::Duration;

use roomrtc::common::{CallId, CallMediaType, CallParty, CallState, OpponentPartyId};
use roomrtc::core::call::Call;
use roomrtc::core::signaling::{CandidateInit, Candidates, MessageType};
use roomrtc::error::CallErrorCode;
use roomrtc::sim::sim_platform::SimPlatform;
use roomrtc::webrtc::media::MediaTrack;
use roomrtc::webrtc::peer_connection::PeerConnectionInterface;

#[macro_use]
mod common;
use common::TestContext;

fn candidate(n: u32) -> CandidateInit {
    CandidateInit::new(
        format!("candidate:{} 1 UDP 1 10.0.0.{} 9 typ host", n, n),
        Some("0".to_string()),
        Some(0),
    )
}

// Deliver an invite and drive the call to Ringing.
async fn start_inbound_call(
    context: &TestContext,
    call_id: &str,
    sender_version: u32,
) -> Call<SimPlatform> {
    let call_id = CallId::from(call_id);
    context.deliver_invite("!room", &call_id, Some("CALLER"), sender_version, 60_000, Duration::ZERO);
    context.settle().await;

    let call = context
        .call_manager
        .call_by_id(&call_id)
        .expect(error_line!())
        .expect(error_line!());
    assert_eq!(call.state().expect(error_line!()), CallState::Ringing);
    call
}

#[tokio::test(start_paused = true)]
async fn inbound_ring_and_answer() {
    let context = TestContext::new("D1");
    let call = start_inbound_call(&context, "c1", 0).await;

    // The caller committed as our opponent at the invite.
    assert_eq!(
        call.opponent_party_id().expect(error_line!()),
        OpponentPartyId::Chosen(Some("CALLER".to_string()))
    );
    assert_eq!(
        context.observer.state_trace(call.call_id()),
        vec![CallState::Ringing]
    );

    call.answer().expect(error_line!());
    context.settle().await;
    assert_eq!(call.state().expect(error_line!()), CallState::Connecting);
    assert_eq!(
        context.observer.state_trace(call.call_id()),
        vec![
            CallState::Ringing,
            CallState::WaitLocalMedia,
            CallState::CreateAnswer,
            CallState::Connecting,
        ]
    );

    let answers = context.transport.sent_of_type(MessageType::Answer);
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0].version, 0);
    assert_eq!(answers[0].party_id.as_deref(), Some("D1"));
    assert_eq!(answers[0].call_id, *call.call_id());

    context.pc().connect_ice();
    context.settle().await;
    assert_eq!(call.state().expect(error_line!()), CallState::Connected);
}

// Candidates gathered while ringing ride the answer itself; candidates
// gathered afterwards are batched with the inbound 500 ms delay.
#[tokio::test(start_paused = true)]
async fn ringing_candidates_ride_the_answer() {
    let context = TestContext::new("D1");
    let call = start_inbound_call(&context, "c1", 0).await;

    // Gathered while ringing: parked, then discarded when the answer
    // carries the description.
    context.pc().emit_local_candidate(candidate(1));
    context.settle().await;

    call.answer().expect(error_line!());
    context.settle().await;
    tokio::time::sleep(Duration::from_millis(600)).await;
    context.settle().await;
    assert_eq!(
        context.transport.sent_of_type(MessageType::Candidates).len(),
        0
    );

    // Gathered after the answer: sent as a batch after 500 ms.
    context.pc().emit_local_candidate(candidate(2));
    context.settle().await;
    tokio::time::sleep(Duration::from_millis(600)).await;
    context.settle().await;

    let batches = context.transport.sent_of_type(MessageType::Candidates);
    assert_eq!(batches.len(), 1);

    // And they follow the answer on the wire.
    let types = context.transport.sent_types();
    assert_eq!(types, vec![MessageType::Answer, MessageType::Candidates]);
}

// An invite that aged past its lifetime in transit rings and immediately
// hangs up.
#[tokio::test(start_paused = true)]
async fn stale_invite_rings_and_hangs_up() {
    let context = TestContext::new("D1");
    let call_id = CallId::from("c-stale");
    context.deliver_invite(
        "!room",
        &call_id,
        Some("CALLER"),
        0,
        60_000,
        Duration::from_secs(61),
    );
    context.settle().await;

    let call = context
        .call_manager
        .call_by_id(&call_id)
        .expect(error_line!())
        .expect(error_line!());
    assert_eq!(call.state().expect(error_line!()), CallState::Ended);
    // It did ring, so the owner sees the missed call.
    assert_eq!(
        context.observer.state_trace(&call_id),
        vec![CallState::Ringing, CallState::Ended]
    );
    let info = call
        .termination_info()
        .expect(error_line!())
        .expect(error_line!());
    assert_eq!(info.party, CallParty::Remote);
    assert_eq!(info.reason, CallErrorCode::UserHangup);
    assert_eq!(context.transport.sent_messages().len(), 0);
}

#[tokio::test(start_paused = true)]
async fn ring_lifetime_expires() {
    let context = TestContext::new("D1");
    let call_id = CallId::from("c-expiring");
    context.deliver_invite(
        "!room",
        &call_id,
        Some("CALLER"),
        0,
        60_000,
        Duration::from_secs(50),
    );
    context.settle().await;

    let call = context
        .call_manager
        .call_by_id(&call_id)
        .expect(error_line!())
        .expect(error_line!());
    assert_eq!(call.state().expect(error_line!()), CallState::Ringing);

    // 10 seconds of lifetime remain.
    tokio::time::sleep(Duration::from_secs(9)).await;
    context.settle().await;
    assert_eq!(call.state().expect(error_line!()), CallState::Ringing);

    tokio::time::sleep(Duration::from_secs(2)).await;
    context.settle().await;
    assert_eq!(call.state().expect(error_line!()), CallState::Ended);
    let info = call
        .termination_info()
        .expect(error_line!())
        .expect(error_line!());
    assert_eq!(info.party, CallParty::Remote);
}

// S5: the caller picked another of our devices.
#[tokio::test(start_paused = true)]
async fn select_answer_for_other_device_terminates() {
    let context = TestContext::new("D1");
    let call = start_inbound_call(&context, "c1", 1).await;

    call.answer().expect(error_line!());
    context.settle().await;
    assert_eq!(call.state().expect(error_line!()), CallState::Connecting);

    context.deliver_select_answer("!room", call.call_id(), Some("CALLER"), Some("D9"));
    context.settle().await;

    assert_eq!(call.state().expect(error_line!()), CallState::Ended);
    let info = call
        .termination_info()
        .expect(error_line!())
        .expect(error_line!());
    assert_eq!(info.party, CallParty::Remote);
    assert_eq!(info.reason, CallErrorCode::AnsweredElsewhere);
}

#[tokio::test(start_paused = true)]
async fn select_answer_for_us_is_a_no_op() {
    let context = TestContext::new("D1");
    let call = start_inbound_call(&context, "c1", 1).await;

    call.answer().expect(error_line!());
    context.settle().await;

    context.deliver_select_answer("!room", call.call_id(), Some("CALLER"), Some("D1"));
    context.settle().await;
    assert_eq!(call.state().expect(error_line!()), CallState::Connecting);
}

// Invariant: once a partner is committed, messages from other party ids
// change nothing.
#[tokio::test(start_paused = true)]
async fn party_filter_drops_other_parties() {
    let context = TestContext::new("D1");
    let call = start_inbound_call(&context, "c1", 0).await;

    // A hangup from a different party is ignored.
    context.deliver_hangup("!room", call.call_id(), Some("IMPOSTOR"), None);
    context.settle().await;
    assert_eq!(call.state().expect(error_line!()), CallState::Ringing);

    // Candidates from a different party are ignored.
    let before = context.pc().added_remote_candidates().len();
    context.deliver_candidates(
        "!room",
        call.call_id(),
        Some("IMPOSTOR"),
        Candidates {
            candidates: vec![candidate(9)],
        },
    );
    context.settle().await;
    assert_eq!(context.pc().added_remote_candidates().len(), before);

    // The committed party's hangup works.
    context.deliver_hangup("!room", call.call_id(), Some("CALLER"), None);
    context.settle().await;
    assert_eq!(call.state().expect(error_line!()), CallState::Ended);
}

// Our own events come back from the room; they are not signaling input.
#[tokio::test(start_paused = true)]
async fn own_echo_is_dropped() {
    let context = TestContext::new("D1");
    let call = start_inbound_call(&context, "c1", 0).await;

    context.deliver_hangup("!room", call.call_id(), Some("D1"), None);
    context.settle().await;
    assert_eq!(call.state().expect(error_line!()), CallState::Ringing);
}

// Rejecting a call from a legacy peer sends a hangup; from a v1 peer, a
// reject.
#[tokio::test(start_paused = true)]
async fn reject_uses_peer_protocol_version() {
    let context = TestContext::new("D1");
    let call = start_inbound_call(&context, "c-v0", 0).await;
    call.reject().expect(error_line!());
    context.settle().await;
    assert_eq!(call.state().expect(error_line!()), CallState::Ended);
    assert_eq!(context.transport.sent_of_type(MessageType::Hangup).len(), 1);
    assert_eq!(context.transport.sent_of_type(MessageType::Reject).len(), 0);

    let context = TestContext::new("D1");
    let call = start_inbound_call(&context, "c-v1", 1).await;
    call.reject().expect(error_line!());
    context.settle().await;
    assert_eq!(call.state().expect(error_line!()), CallState::Ended);
    assert_eq!(context.transport.sent_of_type(MessageType::Reject).len(), 1);
    assert_eq!(context.transport.sent_of_type(MessageType::Hangup).len(), 0);
}

// Remote candidates are applied once the description is in, unaddressable
// ones are dropped, and end-of-candidates passes through.
#[tokio::test(start_paused = true)]
async fn remote_candidate_dispatch() {
    let context = TestContext::new("D1");
    let call = start_inbound_call(&context, "c1", 0).await;

    context.deliver_candidates(
        "!room",
        call.call_id(),
        Some("CALLER"),
        Candidates {
            candidates: vec![
                candidate(1),
                // Neither sdpMid nor sdpMLineIndex: dropped.
                CandidateInit::new("candidate:bogus", None, None),
                CandidateInit::end_of_candidates(),
            ],
        },
    );
    context.settle().await;

    let added = context.pc().added_remote_candidates();
    assert_eq!(added.len(), 2);
    assert!(added[0].candidate.starts_with("candidate:1"));
    assert!(added[1].is_end_of_candidates());
}

// A failed candidate add is non-fatal.
#[tokio::test(start_paused = true)]
async fn remote_candidate_failure_is_non_fatal() {
    let context = TestContext::new("D1");
    let call = start_inbound_call(&context, "c1", 0).await;

    context.pc().set_fail_add_ice_candidate(true);
    context.deliver_candidates(
        "!room",
        call.call_id(),
        Some("CALLER"),
        Candidates {
            candidates: vec![candidate(1)],
        },
    );
    context.settle().await;

    assert_eq!(call.state().expect(error_line!()), CallState::Ringing);
    assert!(context.observer.errors().is_empty());
}

// An inbound call starts as voice and is refined to video by the remote
// tracks.
#[tokio::test(start_paused = true)]
async fn inbound_media_type_refined_from_remote_tracks() {
    let context = TestContext::new("D1");
    context.platform.set_remote_streams_have_video(true);
    let call = start_inbound_call(&context, "c1", 0).await;

    assert_eq!(call.media_type().expect(error_line!()), CallMediaType::Video);
}

// Invariant: termination stops every owned track and closes the peer
// connection.
#[tokio::test(start_paused = true)]
async fn termination_releases_resources() {
    let context = TestContext::new("D1");
    let call = start_inbound_call(&context, "c1", 0).await;
    call.answer().expect(error_line!());
    context.settle().await;
    context.pc().connect_ice();
    context.settle().await;
    assert_eq!(call.state().expect(error_line!()), CallState::Connected);

    context.deliver_hangup("!room", call.call_id(), Some("CALLER"), None);
    context.settle().await;

    assert_eq!(call.state().expect(error_line!()), CallState::Ended);
    for track in context.platform.local_tracks() {
        assert!(track.is_stopped());
    }
    let remote_stream = call
        .remote_stream()
        .expect(error_line!())
        .expect(error_line!());
    for track in remote_stream.tracks() {
        assert!(track.is_stopped());
    }
    assert!(context.pc().is_closed());

    // The finalizer has nothing left to do; a duplicate hangup for the
    // concluded call is dropped by the router.
    context.deliver_hangup("!room", call.call_id(), Some("CALLER"), None);
    context.settle().await;
    assert_eq!(context.observer.hangups().len(), 1);
}

// A remote hold shows up as a local-hold change after renegotiation.
#[tokio::test(start_paused = true)]
async fn remote_hold_emits_hold_change() {
    let context = TestContext::new("D1");
    let call = start_inbound_call(&context, "c1", 1).await;
    call.answer().expect(error_line!());
    context.settle().await;
    context.pc().connect_ice();
    context.settle().await;
    assert_eq!(call.state().expect(error_line!()), CallState::Connected);

    // The incoming renegotiation pauses our sending direction.
    context
        .pc()
        .set_next_remote_description_pauses_sending(true);
    context.deliver_negotiate_offer("!room", call.call_id(), Some("CALLER"));
    context.settle().await;

    // We are the polite side: the offer is applied and answered.
    let negotiates = context.transport.sent_of_type(MessageType::Negotiate);
    assert_eq!(negotiates.len(), 1);
    assert!(call.is_local_on_hold());
    assert_eq!(
        context.observer.hold_changes(),
        vec![(call.call_id().clone(), true)]
    );
}

// Glare: the remote invite wins the tiebreak, our outbound call is
// replaced and its media flows into the replacement.
#[tokio::test(start_paused = true)]
async fn glare_remote_wins_replaces_our_call() {
    let context = TestContext::new("AAA");
    let our_call = context.place_voice_call("!r");
    context.settle().await;
    assert_eq!(our_call.state().expect(error_line!()), CallState::InviteSent);

    let remote_call_id = CallId::from("c-remote");
    context.deliver_invite(
        "!r",
        &remote_call_id,
        Some("ZZZ"),
        0,
        60_000,
        Duration::ZERO,
    );
    context.settle().await;
    context.settle().await;

    // Our call ended as Replaced, quietly: no hangup event, no wire
    // hangup.
    assert_eq!(our_call.state().expect(error_line!()), CallState::Ended);
    let info = our_call
        .termination_info()
        .expect(error_line!())
        .expect(error_line!());
    assert_eq!(info.reason, CallErrorCode::Replaced);
    assert_eq!(
        context.observer.replaced(),
        vec![(our_call.call_id().clone(), remote_call_id.clone())]
    );
    assert!(!context.observer.hangups().contains(our_call.call_id()));
    assert_eq!(context.transport.sent_of_type(MessageType::Hangup).len(), 0);

    // The replacement adopted our media and answered implicitly.
    let new_call = context
        .call_manager
        .call_by_id(&remote_call_id)
        .expect(error_line!())
        .expect(error_line!());
    assert_eq!(new_call.state().expect(error_line!()), CallState::Connecting);
    let answers = context.transport.sent_of_type(MessageType::Answer);
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0].call_id, remote_call_id);
    // No second acquisition happened.
    assert_eq!(context.platform.last_constraints().is_some(), true);
    assert_eq!(
        context
            .platform
            .local_tracks()
            .len(),
        1
    );
}

// Glare: we win the tiebreak and the remote invite is dropped.
#[tokio::test(start_paused = true)]
async fn glare_local_wins_keeps_our_call() {
    let context = TestContext::new("ZZZ");
    let our_call = context.place_voice_call("!r");
    context.settle().await;

    let remote_call_id = CallId::from("c-remote");
    context.deliver_invite(
        "!r",
        &remote_call_id,
        Some("AAA"),
        0,
        60_000,
        Duration::ZERO,
    );
    context.settle().await;

    assert_eq!(our_call.state().expect(error_line!()), CallState::InviteSent);
    assert!(context
        .call_manager
        .call_by_id(&remote_call_id)
        .expect(error_line!())
        .is_none());
    assert!(context.observer.replaced().is_empty());
}

// Glare while our media is still being acquired: the replacement waits for
// the handoff instead of acquiring its own.
#[tokio::test(start_paused = true)]
async fn glare_during_media_acquisition_hands_off() {
    let context = TestContext::new("AAA");
    context
        .platform
        .set_media_delay(Some(Duration::from_millis(500)));
    let our_call = context.place_voice_call("!r");
    context.settle().await;
    assert_eq!(
        our_call.state().expect(error_line!()),
        CallState::WaitLocalMedia
    );

    let remote_call_id = CallId::from("c-remote");
    context.deliver_invite(
        "!r",
        &remote_call_id,
        Some("ZZZ"),
        0,
        60_000,
        Duration::ZERO,
    );
    context.settle().await;
    assert_eq!(our_call.state().expect(error_line!()), CallState::Ended);

    // Media lands after the replacement and flows to it.
    tokio::time::sleep(Duration::from_millis(600)).await;
    context.settle().await;
    context.settle().await;

    let new_call = context
        .call_manager
        .call_by_id(&remote_call_id)
        .expect(error_line!())
        .expect(error_line!());
    assert_eq!(new_call.state().expect(error_line!()), CallState::Connecting);
    // One acquisition total.
    assert_eq!(context.platform.local_tracks().len(), 1);
}

// A second invite with a new call id while an inbound call is active is
// ignored.
#[tokio::test(start_paused = true)]
async fn second_invite_while_ringing_is_dropped() {
    let context = TestContext::new("D1");
    let call = start_inbound_call(&context, "c1", 0).await;

    let other_id = CallId::from("c2");
    context.deliver_invite("!room", &other_id, Some("OTHER"), 0, 60_000, Duration::ZERO);
    context.settle().await;

    assert_eq!(call.state().expect(error_line!()), CallState::Ringing);
    assert!(context
        .call_manager
        .call_by_id(&other_id)
        .expect(error_line!())
        .is_none());
}

// A duplicate invite for a known call is a replay and is dropped.
#[tokio::test(start_paused = true)]
async fn duplicate_invite_is_dropped() {
    let context = TestContext::new("D1");
    let call = start_inbound_call(&context, "c1", 0).await;

    context.deliver_invite(
        "!room",
        call.call_id(),
        Some("CALLER"),
        0,
        60_000,
        Duration::ZERO,
    );
    context.settle().await;

    assert_eq!(call.state().expect(error_line!()), CallState::Ringing);
    assert_eq!(context.platform.peer_connection_count(), 1);
}
