//! Polling channel over the vendor library.
//!
//! Turns the vendor's submit-then-poll protocol into either a single
//! bounded probe (`poll_once`) or a single blocking call
//! (`poll_until_final`). All reinterpretation of vendor responses happens
//! here; callers only ever see the typed [`ResponseBody`] union.

use super::{FinalBody, LibraryApi, ResponseKind, SeqNo, NO_LOCK};
use crate::error::AcsError;
use acs_proto::{DriveAddr, VolumeId};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// One submittable library operation.
#[derive(Debug, Clone, PartialEq)]
pub enum LibraryOp {
    Mount {
        vid: VolumeId,
        drive: DriveAddr,
        read_only: bool,
        bypass: bool,
    },
    Dismount {
        vid: VolumeId,
        drive: DriveAddr,
        force: bool,
    },
    QueryVolume { vids: Vec<VolumeId> },
}

/// A typed response delivered by the channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelResponse {
    pub seq: SeqNo,
    pub body: ResponseBody,
}

/// Tagged response union produced by the typed decode step.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Acknowledge,
    Intermediate,
    Final(FinalBody),
}

pub struct LibraryChannel {
    api: Box<dyn LibraryApi>,
}

impl LibraryChannel {
    pub fn new(api: Box<dyn LibraryApi>) -> Self {
        Self { api }
    }

    /// Issue a library call under the given sequence number.
    ///
    /// Only the vendor's immediate accept status is checked here; the
    /// operation's outcome arrives later through polling.
    pub fn submit(&mut self, seq: SeqNo, op: &LibraryOp) -> Result<(), AcsError> {
        let status = match op {
            LibraryOp::Mount {
                vid,
                drive,
                read_only,
                bypass,
            } => self
                .api
                .mount(seq, NO_LOCK, vid, *drive, *read_only, *bypass),
            LibraryOp::Dismount { vid, drive, force } => {
                self.api.dismount(seq, NO_LOCK, vid, *drive, *force)
            }
            LibraryOp::QueryVolume { vids } => self.api.query_volume(seq, vids),
        };

        if status.is_success() {
            debug!(seq, ?op, "library call submitted");
            Ok(())
        } else {
            Err(AcsError::LibrarySubmit(status))
        }
    }

    /// One bounded wait for any pending response.
    ///
    /// Returns `Ok(None)` when the library reports nothing within the
    /// timeout. When `expected` is given and the response correlates to a
    /// different sequence number, fails with `SequenceMismatch`.
    pub fn poll_once(
        &mut self,
        timeout: Duration,
        expected: Option<SeqNo>,
    ) -> Result<Option<ChannelResponse>, AcsError> {
        let outcome = self.api.poll_response(timeout);
        if outcome.kind == ResponseKind::None {
            return Ok(None);
        }

        if let Some(expected) = expected {
            if outcome.seq != expected {
                return Err(AcsError::SequenceMismatch {
                    expected,
                    actual: outcome.seq,
                });
            }
        }

        let body = match outcome.kind {
            ResponseKind::Acknowledge => ResponseBody::Acknowledge,
            ResponseKind::Intermediate => ResponseBody::Intermediate,
            ResponseKind::Final => match outcome.body {
                Some(body) => ResponseBody::Final(body),
                None => {
                    return Err(AcsError::BadLibraryResponse(format!(
                        "final response for seq {} has no payload (status {})",
                        outcome.seq, outcome.status
                    )))
                }
            },
            ResponseKind::None => unreachable!("handled above"),
        };

        trace!(seq = outcome.seq, kind = ?outcome.kind, "library response received");
        Ok(Some(ChannelResponse {
            seq: outcome.seq,
            body,
        }))
    }

    /// Poll until the final response for `seq` arrives.
    ///
    /// Each iteration waits at most `query_interval`; accumulated
    /// wall-clock time is bounded by `total_timeout`, after which the
    /// operation fails with `RequestTimedOut`. This loop is the single
    /// polling mechanism used by every blocking executor.
    pub fn poll_until_final(
        &mut self,
        seq: SeqNo,
        query_interval: Duration,
        total_timeout: Duration,
    ) -> Result<FinalBody, AcsError> {
        let start = Instant::now();
        loop {
            let elapsed = start.elapsed();
            if elapsed >= total_timeout {
                return Err(AcsError::RequestTimedOut(total_timeout));
            }

            let wait = query_interval.min(total_timeout - elapsed);
            match self.poll_once(wait, Some(seq))? {
                Some(ChannelResponse {
                    body: ResponseBody::Final(body),
                    ..
                }) => return Ok(body),
                Some(response) => {
                    trace!(seq, body = ?response.body, "still waiting for final response");
                }
                None => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::sim::ScriptedLibrary;
    use crate::library::{LibStatus, PollOutcome};

    fn vid() -> VolumeId {
        VolumeId::new("VOL001").unwrap()
    }

    fn drive() -> DriveAddr {
        "1:2:3:4".parse().unwrap()
    }

    #[test]
    fn test_submit_rejected_by_library() {
        let lib = ScriptedLibrary::new().with_accept(LibStatus::DriveInUse);
        let mut channel = LibraryChannel::new(Box::new(lib));

        let err = channel
            .submit(
                5,
                &LibraryOp::Mount {
                    vid: vid(),
                    drive: drive(),
                    read_only: false,
                    bypass: false,
                },
            )
            .unwrap_err();
        assert!(matches!(err, AcsError::LibrarySubmit(LibStatus::DriveInUse)));
    }

    #[test]
    fn test_poll_until_final_skips_acknowledge() {
        let lib = ScriptedLibrary::new()
            .then_poll(PollOutcome::acknowledge(5, 1))
            .then_poll(PollOutcome::final_response(
                5,
                1,
                FinalBody::Mount {
                    status: LibStatus::Success,
                },
            ));
        let mut channel = LibraryChannel::new(Box::new(lib));

        let body = channel
            .poll_until_final(5, Duration::from_millis(5), Duration::from_secs(1))
            .unwrap();
        assert_eq!(
            body,
            FinalBody::Mount {
                status: LibStatus::Success
            }
        );
    }

    #[test]
    fn test_poll_once_detects_sequence_mismatch() {
        let lib = ScriptedLibrary::new().then_poll(PollOutcome::final_response(
            6,
            1,
            FinalBody::Mount {
                status: LibStatus::Success,
            },
        ));
        let mut channel = LibraryChannel::new(Box::new(lib));

        let err = channel
            .poll_once(Duration::ZERO, Some(5))
            .unwrap_err();
        assert!(matches!(
            err,
            AcsError::SequenceMismatch {
                expected: 5,
                actual: 6
            }
        ));
    }

    #[test]
    fn test_poll_until_final_times_out() {
        // Script is empty: every poll waits out its timeout with nothing.
        let lib = ScriptedLibrary::new();
        let mut channel = LibraryChannel::new(Box::new(lib));

        let start = Instant::now();
        let err = channel
            .poll_until_final(5, Duration::from_millis(5), Duration::from_millis(25))
            .unwrap_err();
        assert!(matches!(err, AcsError::RequestTimedOut(_)));
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn test_final_without_payload_is_a_protocol_fault() {
        let bad = PollOutcome {
            seq: 5,
            request_id: 1,
            kind: ResponseKind::Final,
            body: None,
            status: LibStatus::LibraryFailure,
        };
        let lib = ScriptedLibrary::new().then_poll(bad);
        let mut channel = LibraryChannel::new(Box::new(lib));

        let err = channel.poll_once(Duration::ZERO, Some(5)).unwrap_err();
        assert!(matches!(err, AcsError::BadLibraryResponse(_)));
    }
}
