//
// Copyright 2024 RoomRTC Contributors
// SPDX-License-Identifier: AGPL-3.0-only
//

//! # RoomRTC -- a call signaling engine in Rust
//!
//! This crate implements the signaling side of 1:1 voice/video calls carried
//! over a room-based messaging transport: the per-call state machine,
//! offer/answer negotiation with perfect-negotiation collision handling, ICE
//! candidate batching with retry, glare resolution between simultaneous
//! invites, and media lifecycle coordination.
//!
//! The WebRTC stack itself and the room transport are external capabilities,
//! supplied through the [`core::platform::Platform`] and
//! [`core::transport::SignalingTransport`] traits.

#[macro_use]
extern crate log;

pub mod common;
pub mod error;

/// Core, platform independent functionality.
pub mod core {
    pub mod call;
    pub mod call_fsm;
    pub mod call_manager;
    pub mod call_mutex;
    pub mod candidate_queue;
    pub mod devices;
    pub mod platform;
    pub mod signaling;
    pub mod transport;
    pub mod util;
}

/// Abstract interface to the WebRTC stack.
pub mod webrtc {
    pub mod media;
    pub mod peer_connection;
    pub mod peer_connection_observer;
}

/// Simulation platform, used by the integration tests.
pub mod sim {
    pub mod sim_platform;
}
