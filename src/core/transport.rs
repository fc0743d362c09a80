//
// Copyright 2024 RoomRTC Contributors
// SPDX-License-Identifier: AGPL-3.0-only
//

//! The signaling transport capability.
//!
//! The engine sends typed messages into a room and receives them back
//! through [`crate::core::call_manager::CallManager::received_message`]. How
//! the messages travel (federation, encryption, retries below this layer) is
//! the transport's business.

use async_trait::async_trait;
use thiserror::Error;

use crate::common::{CallId, RoomId};
use crate::core::signaling::{Envelope, MessageType};

/// Transport level send failures.
#[derive(Clone, Debug, Error)]
pub enum TransportError {
    /// The room contains devices the transport cannot deliver to. The engine
    /// treats this as a distinguished call failure.
    #[error("unknown devices in the room")]
    UnknownDevices,

    /// Any other delivery failure.
    #[error("signaling send failed: {0}")]
    Failed(String),
}

/// The narrow interface the engine drives the room transport through.
#[async_trait]
pub trait SignalingTransport: Send + Sync + 'static {
    /// Send one signaling message to the room. Messages for the same call
    /// must reach the room in the order they were submitted.
    async fn send(&self, room_id: &RoomId, envelope: Envelope) -> Result<(), TransportError>;

    /// Drop a failed send from the transport's outbound queue, if it is
    /// still there, so a terminating call does not leave a duplicate behind.
    async fn cancel_pending(&self, room_id: &RoomId, call_id: &CallId, typ: MessageType);

    /// Whether the engine may fall back to the well-known STUN server when
    /// the caller supplied no ICE servers.
    fn allow_ice_fallback(&self) -> bool;
}
