//
// Copyright 2024 RoomRTC Contributors
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Media stream and track handles.
//!
//! The engine never touches samples; it only gates tracks on and off and
//! stops them at termination. Tracks are therefore a narrow trait the
//! platform implements over its real capture/playout objects.

use std::fmt;
use std::sync::Arc;

use crate::common::CallMediaType;
use crate::core::devices;

/// The kind of media a track carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// One media track owned by a stream.
pub trait MediaTrack: Send + Sync {
    fn kind(&self) -> TrackKind;

    /// Enable or disable the track. Disabled tracks transmit silence/black.
    fn set_enabled(&self, enabled: bool);

    fn is_enabled(&self) -> bool;

    /// Permanently stop the track, releasing the underlying device.
    fn stop(&self);

    /// Whether the track has been stopped.
    fn is_stopped(&self) -> bool;
}

/// A group of tracks owned by a call, local or remote.
#[derive(Clone)]
pub struct MediaStream {
    tracks: Vec<Arc<dyn MediaTrack>>,
}

impl MediaStream {
    pub fn new(tracks: Vec<Arc<dyn MediaTrack>>) -> Self {
        Self { tracks }
    }

    pub fn tracks(&self) -> &[Arc<dyn MediaTrack>] {
        &self.tracks
    }

    pub fn has_video(&self) -> bool {
        self.tracks
            .iter()
            .any(|track| track.kind() == TrackKind::Video)
    }

    /// Apply an enabled state to every track of one kind.
    pub fn set_kind_enabled(&self, kind: TrackKind, enabled: bool) {
        for track in &self.tracks {
            if track.kind() == kind {
                track.set_enabled(enabled);
            }
        }
    }

    /// Stop every track. Used at call termination.
    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "MediaStream(tracks: {})", self.tracks.len())
    }
}

/// What to acquire from the platform, and from which devices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
    pub audio_input_device: Option<String>,
    pub video_input_device: Option<String>,
}

impl MediaConstraints {
    /// The constraint set for a call of the given type, reading the
    /// process-wide default devices at acquisition time.
    pub fn for_media_type(media_type: CallMediaType) -> Self {
        let devices = devices::snapshot();
        Self {
            audio: true,
            video: media_type == CallMediaType::Video,
            audio_input_device: devices.audio_input.clone(),
            video_input_device: devices.video_input.clone(),
        }
    }
}
