//
// Copyright 2024 RoomRTC Contributors
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Local ICE candidate batching.
//!
//! Candidates are buffered and sent as one signaling message per burst,
//! with exponential backoff on failure. The queue holds only data and
//! control state; the owning call drives the timers and the transport.
//!
//! Release is two-phase: the call keeps the queue parked until its invite or
//! answer is on the wire, so the peer never sees candidates for a session it
//! has not accepted. A batch that fails to send is re-prepended so candidate
//! order is preserved across retries.

use std::time::Duration;

use crate::common::CallDirection;
use crate::core::signaling::CandidateInit;

/// Abandon the buffer after this many consecutive failed sends.
pub const MAX_SEND_TRIES: u32 = 5;

const RETRY_BASE: Duration = Duration::from_millis(500);

/// Control state of the flush pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushState {
    /// Nothing scheduled or in flight.
    Idle,

    /// A flush timer is running to aggregate a burst.
    Scheduled,

    /// A batch is on its way to the transport.
    InFlight,

    /// A send failed; a backoff timer is running.
    CoolingDown,
}

pub struct CandidateQueue {
    buffer: Vec<CandidateInit>,
    state: FlushState,
    send_tries: u32,
    sent_end_of_candidates: bool,
}

impl CandidateQueue {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            state: FlushState::Idle,
            send_tries: 0,
            sent_end_of_candidates: false,
        }
    }

    /// Append a candidate to the buffer. The end-of-candidates sentinel is
    /// accepted at most once per call; returns false when dropped.
    pub fn enqueue(&mut self, candidate: CandidateInit) -> bool {
        if candidate.is_end_of_candidates() {
            if self.sent_end_of_candidates {
                return false;
            }
            self.sent_end_of_candidates = true;
        }
        self.buffer.push(candidate);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn state(&self) -> FlushState {
        self.state
    }

    pub fn send_tries(&self) -> u32 {
        self.send_tries
    }

    pub fn sent_end_of_candidates(&self) -> bool {
        self.sent_end_of_candidates
    }

    /// Ask to start the aggregation timer. True only when there is something
    /// to send and no flush is already scheduled or in flight.
    pub fn try_schedule(&mut self) -> bool {
        if self.buffer.is_empty() || self.state != FlushState::Idle {
            return false;
        }
        self.state = FlushState::Scheduled;
        true
    }

    /// How long to aggregate before the first flush. Outbound waits longer
    /// because the callee is still deciding whether to accept.
    pub fn flush_delay(direction: CallDirection) -> Duration {
        match direction {
            CallDirection::Inbound => Duration::from_millis(500),
            CallDirection::Outbound => Duration::from_millis(2000),
        }
    }

    /// The flush (or retry) timer fired: take the whole buffer for sending.
    /// An empty result means there is nothing to do.
    pub fn begin_flush(&mut self) -> Vec<CandidateInit> {
        if self.buffer.is_empty() {
            self.state = FlushState::Idle;
            return Vec::new();
        }
        self.state = FlushState::InFlight;
        self.send_tries += 1;
        std::mem::take(&mut self.buffer)
    }

    /// The batch was sent. True when candidates arrived meanwhile and an
    /// immediate follow-up flush is wanted.
    pub fn flush_succeeded(&mut self) -> bool {
        self.send_tries = 0;
        if self.buffer.is_empty() {
            self.state = FlushState::Idle;
            false
        } else {
            self.state = FlushState::Scheduled;
            true
        }
    }

    /// The batch failed to send. Re-prepends it, preserving order, and
    /// returns the backoff delay before the next try, or None when the
    /// queue is abandoned.
    pub fn flush_failed(&mut self, mut batch: Vec<CandidateInit>) -> Option<Duration> {
        batch.append(&mut self.buffer);
        self.buffer = batch;

        if self.send_tries > MAX_SEND_TRIES {
            self.send_tries = 0;
            self.state = FlushState::Idle;
            return None;
        }

        self.state = FlushState::CoolingDown;
        Some(RETRY_BASE * 2u32.pow(self.send_tries))
    }

    /// The release gate closed before the timer fired; park the buffer and
    /// go back to idle so a later enqueue can reschedule.
    pub fn defer(&mut self) {
        if self.state != FlushState::InFlight {
            self.state = FlushState::Idle;
        }
    }

    /// Drop everything buffered. Used when the local description is about to
    /// go out in an invite or answer, which carries these candidates itself.
    pub fn discard(&mut self) {
        self.buffer.clear();
        if self.state == FlushState::Scheduled {
            self.state = FlushState::Idle;
        }
    }
}

impl Default for CandidateQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(n: u32) -> CandidateInit {
        CandidateInit::new(format!("candidate-{}", n), Some("0".to_string()), Some(0))
    }

    #[test]
    fn schedule_only_from_idle() {
        let mut queue = CandidateQueue::new();
        assert!(!queue.try_schedule());

        queue.enqueue(candidate(1));
        assert!(queue.try_schedule());
        assert_eq!(queue.state(), FlushState::Scheduled);

        queue.enqueue(candidate(2));
        assert!(!queue.try_schedule());
    }

    #[test]
    fn flush_takes_whole_buffer_and_counts_tries() {
        let mut queue = CandidateQueue::new();
        queue.enqueue(candidate(1));
        queue.enqueue(candidate(2));
        queue.try_schedule();

        let batch = queue.begin_flush();
        assert_eq!(batch.len(), 2);
        assert_eq!(queue.state(), FlushState::InFlight);
        assert_eq!(queue.send_tries(), 1);
        assert!(queue.is_empty());

        assert!(!queue.flush_succeeded());
        assert_eq!(queue.state(), FlushState::Idle);
        assert_eq!(queue.send_tries(), 0);
    }

    #[test]
    fn arrivals_during_flight_trigger_follow_up() {
        let mut queue = CandidateQueue::new();
        queue.enqueue(candidate(1));
        queue.try_schedule();
        let _ = queue.begin_flush();

        queue.enqueue(candidate(2));
        assert!(queue.flush_succeeded());
        assert_eq!(queue.state(), FlushState::Scheduled);
    }

    #[test]
    fn failure_reprepends_in_order_and_backs_off() {
        let mut queue = CandidateQueue::new();
        queue.enqueue(candidate(1));
        queue.enqueue(candidate(2));
        queue.try_schedule();

        let batch = queue.begin_flush();
        queue.enqueue(candidate(3));

        let delay = queue.flush_failed(batch).unwrap();
        assert_eq!(delay, Duration::from_millis(1000));
        assert_eq!(queue.state(), FlushState::CoolingDown);
        assert_eq!(queue.len(), 3);

        let batch = queue.begin_flush();
        let labels: Vec<&str> = batch.iter().map(|c| c.candidate.as_str()).collect();
        assert_eq!(labels, ["candidate-1", "candidate-2", "candidate-3"]);
    }

    #[test]
    fn backoff_doubles_each_try() {
        let mut queue = CandidateQueue::new();
        queue.enqueue(candidate(1));
        queue.try_schedule();

        let mut delays = Vec::new();
        for _ in 0..MAX_SEND_TRIES {
            let batch = queue.begin_flush();
            if let Some(delay) = queue.flush_failed(batch) {
                delays.push(delay.as_millis());
            }
        }
        assert_eq!(delays, [1000, 2000, 4000, 8000, 16000]);
    }

    #[test]
    fn abandons_after_max_tries_but_keeps_buffer() {
        let mut queue = CandidateQueue::new();
        queue.enqueue(candidate(1));
        queue.try_schedule();

        for _ in 0..MAX_SEND_TRIES {
            let batch = queue.begin_flush();
            assert!(queue.flush_failed(batch).is_some());
        }
        let batch = queue.begin_flush();
        assert_eq!(queue.send_tries(), MAX_SEND_TRIES + 1);
        assert!(queue.flush_failed(batch).is_none());

        // Abandoned: counter reset, buffer retained for a later enqueue.
        assert_eq!(queue.send_tries(), 0);
        assert_eq!(queue.state(), FlushState::Idle);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn end_of_candidates_enqueued_at_most_once() {
        let mut queue = CandidateQueue::new();
        assert!(queue.enqueue(CandidateInit::end_of_candidates()));
        assert!(!queue.enqueue(CandidateInit::end_of_candidates()));
        assert_eq!(queue.len(), 1);
        assert!(queue.sent_end_of_candidates());
    }

    #[test]
    fn defer_parks_the_buffer() {
        let mut queue = CandidateQueue::new();
        queue.enqueue(candidate(1));
        queue.try_schedule();
        queue.defer();
        assert_eq!(queue.state(), FlushState::Idle);
        assert_eq!(queue.len(), 1);

        // A later enqueue can schedule again.
        queue.enqueue(candidate(2));
        assert!(queue.try_schedule());
    }

    #[test]
    fn discard_clears_buffer_and_pending_schedule() {
        let mut queue = CandidateQueue::new();
        queue.enqueue(candidate(1));
        queue.try_schedule();
        queue.discard();
        assert!(queue.is_empty());
        assert_eq!(queue.state(), FlushState::Idle);

        // The stale timer firing later finds nothing to do.
        assert!(queue.begin_flush().is_empty());
        assert_eq!(queue.state(), FlushState::Idle);
    }
}
