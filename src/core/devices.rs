//
// Copyright 2024 RoomRTC Contributors
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Process-wide default media device identifiers.
//!
//! Three optionally-unset slots, settable at runtime. A setter replaces the
//! whole record, so readers always observe a consistent snapshot. The slots
//! are read once per call when local media is acquired; changing them does
//! not affect calls already in flight.

use std::sync::{Arc, RwLock};

use lazy_static::lazy_static;

/// The default device identifiers in effect for new acquisitions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceSettings {
    pub audio_output: Option<String>,
    pub audio_input: Option<String>,
    pub video_input: Option<String>,
}

lazy_static! {
    static ref DEFAULT_DEVICES: RwLock<Arc<DeviceSettings>> =
        RwLock::new(Arc::new(DeviceSettings::default()));
}

/// The current settings record.
pub fn snapshot() -> Arc<DeviceSettings> {
    DEFAULT_DEVICES
        .read()
        .map(|settings| Arc::clone(&settings))
        .unwrap_or_default()
}

fn replace(update: impl FnOnce(&mut DeviceSettings)) {
    if let Ok(mut slot) = DEFAULT_DEVICES.write() {
        let mut settings = (**slot).clone();
        update(&mut settings);
        *slot = Arc::new(settings);
    }
}

pub fn set_default_audio_output(device_id: Option<String>) {
    replace(|settings| settings.audio_output = device_id);
}

pub fn set_default_audio_input(device_id: Option<String>) {
    replace(|settings| settings.audio_input = device_id);
}

pub fn set_default_video_input(device_id: Option<String>) {
    replace(|settings| settings.video_input = device_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_replace_the_record_wholesale() {
        let before = snapshot();
        set_default_audio_input(Some("mic-1".to_string()));
        let after = snapshot();

        // The old snapshot is unchanged; the new one carries the update.
        assert_eq!(before.audio_input, None);
        assert_eq!(after.audio_input.as_deref(), Some("mic-1"));

        set_default_audio_input(None);
        assert_eq!(snapshot().audio_input, None);
    }
}
