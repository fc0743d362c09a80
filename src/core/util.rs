//
// Copyright 2024 RoomRTC Contributors
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Logging helpers.
//!
//! SDP bodies and ICE candidate strings carry addresses and credentials, so
//! they are never written to the log verbatim. Loggable types format
//! themselves through these summaries instead.

/// Summarize an SDP body for logging.
pub fn redact_sdp(sdp: &str) -> String {
    format!("[ sdp {} bytes ]", sdp.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_sdp_hides_contents() {
        let redacted = redact_sdp("a=candidate 192.168.1.1");
        assert!(!redacted.contains("192.168"));
    }
}
