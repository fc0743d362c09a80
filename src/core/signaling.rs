//
// Copyright 2024 RoomRTC Contributors
// SPDX-License-Identifier: AGPL-3.0-only
//

/// The messages we send over the signaling transport to establish a call.
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common::{CallId, PartyId, RoomId};
use crate::core::util::redact_sdp;
use crate::error::CallErrorCode;

/// The protocol version this implementation reports on the wire.
///
/// Version 0 is legacy-compatible; peers reporting `>= 1` additionally
/// support `reject`, `select_answer`, and mid-call renegotiation.
pub const PROTOCOL_VERSION: u32 = 0;

/// Versions from this one on understand reject/select_answer/negotiate.
pub const MIN_VERSION_FOR_RENEGOTIATE: u32 = 1;

/// Advisory expiry carried in every invite.
pub const INVITE_LIFETIME: Duration = Duration::from_secs(60);

/// A session description as carried on the wire.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    pub fn is_offer(&self) -> bool {
        self.sdp_type == SdpType::Offer
    }
}

impl fmt::Display for SessionDescription {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({:?}, {})", self.sdp_type, redact_sdp(&self.sdp))
    }
}

impl fmt::Debug for SessionDescription {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// One ICE candidate as carried on the wire. An empty `candidate` string
/// denotes the end of the candidate stream.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateInit {
    pub candidate: String,
    #[serde(rename = "sdpMid", skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u32>,
}

impl CandidateInit {
    pub fn new(
        candidate: impl Into<String>,
        sdp_mid: Option<String>,
        sdp_m_line_index: Option<u32>,
    ) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid,
            sdp_m_line_index,
        }
    }

    /// The end-of-candidates sentinel.
    pub fn end_of_candidates() -> Self {
        Self::new("", None, None)
    }

    pub fn is_end_of_candidates(&self) -> bool {
        self.candidate.is_empty()
    }

    /// A candidate that names neither an m-line id nor an index cannot be
    /// applied and is dropped by the receiver.
    pub fn is_addressable(&self) -> bool {
        self.sdp_mid.is_some() || self.sdp_m_line_index.is_some()
    }
}

impl fmt::Display for CandidateInit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_end_of_candidates() {
            write!(f, "(end-of-candidates)")
        } else {
            write!(f, "(candidate {} bytes)", self.candidate.len())
        }
    }
}

impl fmt::Debug for CandidateInit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// The caller sends this to initiate a call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Invite {
    pub offer: SessionDescription,
    /// Advisory expiry in milliseconds.
    pub lifetime: u64,
}

/// The callee sends this in response to an invite.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Answer {
    pub answer: SessionDescription,
}

/// Either side sends these after its invite or answer is on the wire.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Candidates {
    pub candidates: Vec<CandidateInit>,
}

/// Mid-call session description exchange (renegotiation and glare).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Negotiate {
    pub description: SessionDescription,
}

/// The caller tells the chosen answerer it won, so racing devices learn they
/// lost.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelectAnswer {
    pub selected_party_id: Option<PartyId>,
}

/// Either side ends the call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Hangup {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<CallErrorCode>,
}

/// The callee declines the call. Nothing beyond the envelope.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Reject {}

/// An enum representing the different types of signaling messages that
/// can be sent and received.
#[derive(Clone, Serialize)]
#[serde(untagged)]
pub enum Message {
    Invite(Invite),
    Answer(Answer),
    Candidates(Candidates),
    Negotiate(Negotiate),
    SelectAnswer(SelectAnswer),
    Hangup(Hangup),
    Reject(Reject),
}

impl Message {
    pub fn typ(&self) -> MessageType {
        match self {
            Self::Invite(_) => MessageType::Invite,
            Self::Answer(_) => MessageType::Answer,
            Self::Candidates(_) => MessageType::Candidates,
            Self::Negotiate(_) => MessageType::Negotiate,
            Self::SelectAnswer(_) => MessageType::SelectAnswer,
            Self::Hangup(_) => MessageType::Hangup,
            Self::Reject(_) => MessageType::Reject,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let display = match self {
            Self::Invite(invite) => {
                format!("Invite({}, lifetime: {}ms)", invite.offer, invite.lifetime)
            }
            Self::Answer(answer) => format!("Answer({})", answer.answer),
            Self::Candidates(candidates) => {
                format!("Candidates(n: {})", candidates.candidates.len())
            }
            Self::Negotiate(negotiate) => format!("Negotiate({})", negotiate.description),
            Self::SelectAnswer(select) => {
                format!("SelectAnswer({:?})", select.selected_party_id)
            }
            Self::Hangup(hangup) => format!("Hangup({:?})", hangup.reason),
            Self::Reject(_) => "Reject".to_string(),
        };
        write!(f, "({})", display)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

// It's convenient to know the type of a message without having an entire
// message, so we have the related MessageType enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageType {
    Invite,
    Answer,
    Candidates,
    Negotiate,
    SelectAnswer,
    Hangup,
    Reject,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Invite => "invite",
            Self::Answer => "answer",
            Self::Candidates => "candidates",
            Self::Negotiate => "negotiate",
            Self::SelectAnswer => "select_answer",
            Self::Hangup => "hangup",
            Self::Reject => "reject",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An outbound message with the fields every payload is extended with.
#[derive(Clone, Serialize)]
pub struct Envelope {
    pub version: u32,
    pub call_id: CallId,
    pub party_id: Option<PartyId>,
    #[serde(flatten)]
    pub body: Message,
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}: call_id: {}, party_id: {:?}, v{}",
            self.body.typ(),
            self.call_id,
            self.party_id,
            self.version
        )
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// An inbound message with the context the transport provides.
#[derive(Clone)]
pub struct ReceivedMessage {
    pub room_id: RoomId,
    pub call_id: CallId,
    pub sender_party_id: Option<PartyId>,
    pub sender_version: u32,
    /// The approximate age of the message as observed locally.
    pub age: Duration,
    pub body: Message,
}

/// An invite with extra info specific to receiving.
#[derive(Clone)]
pub struct ReceivedInvite {
    pub offer: SessionDescription,
    /// Advisory expiry in milliseconds.
    pub lifetime: u64,
    /// The approximate age of the invite.
    pub age: Duration,
    pub sender_party_id: Option<PartyId>,
    pub sender_version: u32,
}

impl ReceivedInvite {
    /// How much longer the invite is worth ringing for. `None` means the
    /// invite is already stale.
    pub fn remaining_lifetime(&self) -> Option<Duration> {
        let lifetime = Duration::from_millis(self.lifetime);
        let remaining = lifetime.saturating_sub(self.age);
        if remaining.is_zero() {
            None
        } else {
            Some(remaining)
        }
    }
}

/// An answer with extra info specific to receiving.
#[derive(Clone)]
pub struct ReceivedAnswer {
    pub answer: SessionDescription,
    pub sender_party_id: Option<PartyId>,
    pub sender_version: u32,
}

/// A candidate batch with extra info specific to receiving.
#[derive(Clone)]
pub struct ReceivedCandidates {
    pub candidates: Vec<CandidateInit>,
    pub sender_party_id: Option<PartyId>,
}

/// A negotiate message with extra info specific to receiving.
#[derive(Clone)]
pub struct ReceivedNegotiate {
    pub description: SessionDescription,
    pub sender_party_id: Option<PartyId>,
}

/// A select_answer message with extra info specific to receiving.
#[derive(Clone)]
pub struct ReceivedSelectAnswer {
    pub selected_party_id: Option<PartyId>,
    pub sender_party_id: Option<PartyId>,
}

/// A hangup message with extra info specific to receiving.
#[derive(Clone, Debug)]
pub struct ReceivedHangup {
    pub reason: Option<CallErrorCode>,
    pub sender_party_id: Option<PartyId>,
}

/// A reject message with extra info specific to receiving.
#[derive(Clone, Debug)]
pub struct ReceivedReject {
    pub sender_party_id: Option<PartyId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serializes_wire_field_names() {
        let envelope = Envelope {
            version: PROTOCOL_VERSION,
            call_id: CallId::from("c1"),
            party_id: Some("D1".to_string()),
            body: Message::Candidates(Candidates {
                candidates: vec![CandidateInit::new(
                    "candidate:0 1 UDP 1 10.0.0.1 9 typ host",
                    Some("0".to_string()),
                    Some(0),
                )],
            }),
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["version"], 0);
        assert_eq!(json["call_id"], "c1");
        assert_eq!(json["party_id"], "D1");
        assert_eq!(json["candidates"][0]["sdpMid"], "0");
        assert_eq!(json["candidates"][0]["sdpMLineIndex"], 0);
    }

    #[test]
    fn invite_carries_offer_and_lifetime() {
        let json = serde_json::to_value(Message::Invite(Invite {
            offer: SessionDescription::offer("v=0"),
            lifetime: 60_000,
        }))
        .unwrap();
        assert_eq!(json["offer"]["type"], "offer");
        assert_eq!(json["offer"]["sdp"], "v=0");
        assert_eq!(json["lifetime"], 60_000);
    }

    #[test]
    fn hangup_reason_is_snake_case() {
        let json = serde_json::to_value(Message::Hangup(Hangup {
            reason: Some(CallErrorCode::IceFailed),
        }))
        .unwrap();
        assert_eq!(json["reason"], "ice_failed");
    }

    #[test]
    fn display_redacts_sdp() {
        let invite = Message::Invite(Invite {
            offer: SessionDescription::offer("a=candidate 192.168.1.20"),
            lifetime: 60_000,
        });
        let display = format!("{}", invite);
        assert!(!display.contains("192.168"));
    }

    #[test]
    fn remaining_lifetime_accounts_for_age() {
        let mut invite = ReceivedInvite {
            offer: SessionDescription::offer("v=0"),
            lifetime: 60_000,
            age: Duration::from_secs(10),
            sender_party_id: None,
            sender_version: 0,
        };
        assert_eq!(invite.remaining_lifetime(), Some(Duration::from_secs(50)));

        invite.age = Duration::from_secs(61);
        assert_eq!(invite.remaining_lifetime(), None);
    }

    #[test]
    fn reject_is_envelope_only() {
        let envelope = Envelope {
            version: PROTOCOL_VERSION,
            call_id: CallId::from("c1"),
            party_id: Some("D1".to_string()),
            body: Message::Reject(Reject {}),
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["version"], 0);
        assert_eq!(json["call_id"], "c1");
        assert_eq!(json["party_id"], "D1");
    }

    #[test]
    fn end_of_candidates_is_not_addressable() {
        let sentinel = CandidateInit::end_of_candidates();
        assert!(sentinel.is_end_of_candidates());
        assert!(!sentinel.is_addressable());
    }
}
