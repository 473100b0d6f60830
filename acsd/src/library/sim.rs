//! In-tree library backends.
//!
//! [`SimulatedLibrary`] models a robot with configurable move latency and
//! stands in for the vendor binding in the demo daemon and the one-shot
//! commands. [`ScriptedLibrary`] replays an exact sequence of accept
//! statuses and poll outcomes and records every call; the test suites are
//! built on it.

use super::{
    FinalBody, LibStatus, LibraryApi, LockId, PollOutcome, ResponseKind, SeqNo, VolumeStatus,
};
use acs_proto::{DriveAddr, VolumeId};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

struct QueuedFinal {
    seq: SeqNo,
    ready_at: Instant,
    body: FinalBody,
}

/// A latency-based library model: every accepted call produces one final
/// response that becomes available after the configured move latency.
pub struct SimulatedLibrary {
    latency: Duration,
    accept_status: LibStatus,
    mount_status: LibStatus,
    dismount_status: LibStatus,
    queue: VecDeque<QueuedFinal>,
    next_request_id: u32,
}

impl SimulatedLibrary {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            accept_status: LibStatus::Success,
            mount_status: LibStatus::Success,
            dismount_status: LibStatus::Success,
            queue: VecDeque::new(),
            next_request_id: 1,
        }
    }

    /// A robot with zero move latency.
    pub fn instant() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Status returned as the immediate accept status of every call.
    pub fn with_accept_status(mut self, status: LibStatus) -> Self {
        self.accept_status = status;
        self
    }

    /// Final status reported for mounts.
    pub fn with_mount_status(mut self, status: LibStatus) -> Self {
        self.mount_status = status;
        self
    }

    /// Final status reported for dismounts.
    pub fn with_dismount_status(mut self, status: LibStatus) -> Self {
        self.dismount_status = status;
        self
    }

    fn enqueue(&mut self, seq: SeqNo, body: FinalBody) {
        self.queue.push_back(QueuedFinal {
            seq,
            ready_at: Instant::now() + self.latency,
            body,
        });
    }

    fn take_request_id(&mut self) -> u32 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }
}

impl LibraryApi for SimulatedLibrary {
    fn mount(
        &mut self,
        seq: SeqNo,
        _lock: LockId,
        vid: &VolumeId,
        drive: DriveAddr,
        read_only: bool,
        _bypass: bool,
    ) -> LibStatus {
        if !self.accept_status.is_success() {
            return self.accept_status;
        }
        debug!(seq, %vid, %drive, read_only, "simulated mount accepted");
        let status = self.mount_status;
        self.enqueue(seq, FinalBody::Mount { status });
        LibStatus::Success
    }

    fn dismount(
        &mut self,
        seq: SeqNo,
        _lock: LockId,
        vid: &VolumeId,
        drive: DriveAddr,
        force: bool,
    ) -> LibStatus {
        if !self.accept_status.is_success() {
            return self.accept_status;
        }
        debug!(seq, %vid, %drive, force, "simulated dismount accepted");
        let status = self.dismount_status;
        self.enqueue(seq, FinalBody::Dismount { status });
        LibStatus::Success
    }

    fn query_volume(&mut self, seq: SeqNo, vids: &[VolumeId]) -> LibStatus {
        if !self.accept_status.is_success() {
            return self.accept_status;
        }
        let volumes = vids
            .iter()
            .map(|vid| VolumeStatus {
                vid: vid.clone(),
                status: LibStatus::Success,
                location: "home cell 0,1,10,4".to_string(),
            })
            .collect();
        self.enqueue(
            seq,
            FinalBody::QueryVolume {
                status: LibStatus::Success,
                volumes,
            },
        );
        LibStatus::Success
    }

    fn poll_response(&mut self, timeout: Duration) -> PollOutcome {
        let deadline = Instant::now() + timeout;
        let Some(front) = self.queue.front() else {
            std::thread::sleep(timeout);
            return PollOutcome::none();
        };

        if front.ready_at > deadline {
            std::thread::sleep(timeout);
            return PollOutcome::none();
        }

        let wait = front.ready_at.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
        let queued = self.queue.pop_front().expect("front checked above");
        let request_id = self.take_request_id();
        PollOutcome::final_response(queued.seq, request_id, queued.body)
    }
}

/// A record of one call made against a [`ScriptedLibrary`].
#[derive(Debug, Clone, PartialEq)]
pub enum LibraryCall {
    Mount {
        seq: SeqNo,
        vid: String,
        drive: DriveAddr,
        read_only: bool,
        bypass: bool,
    },
    Dismount {
        seq: SeqNo,
        vid: String,
        drive: DriveAddr,
        force: bool,
    },
    QueryVolume { seq: SeqNo, vids: Vec<String> },
}

/// Shared view of the calls a [`ScriptedLibrary`] has received. Survives
/// the library being boxed into a channel.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<LibraryCall>>>);

impl CallLog {
    pub fn calls(&self) -> Vec<LibraryCall> {
        self.0.lock().unwrap().clone()
    }

    fn push(&self, call: LibraryCall) {
        self.0.lock().unwrap().push(call);
    }
}

/// A deterministic library: submits consume a queue of accept statuses
/// (success once exhausted), polls replay a queue of scripted outcomes
/// (no-response once exhausted, waiting out the requested timeout the way
/// the real control interface would). Every call is recorded in a
/// [`CallLog`].
#[derive(Default)]
pub struct ScriptedLibrary {
    accepts: VecDeque<LibStatus>,
    polls: VecDeque<PollOutcome>,
    log: CallLog,
}

impl ScriptedLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an accept status for the next submitted call.
    pub fn with_accept(mut self, status: LibStatus) -> Self {
        self.accepts.push_back(status);
        self
    }

    /// Queue the next poll outcome.
    pub fn then_poll(mut self, outcome: PollOutcome) -> Self {
        self.polls.push_back(outcome);
        self
    }

    /// Queue a no-response poll.
    pub fn then_poll_none(self) -> Self {
        self.then_poll(PollOutcome::none())
    }

    /// Handle onto the recorded calls.
    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    fn next_accept(&mut self) -> LibStatus {
        self.accepts.pop_front().unwrap_or(LibStatus::Success)
    }
}

impl LibraryApi for ScriptedLibrary {
    fn mount(
        &mut self,
        seq: SeqNo,
        _lock: LockId,
        vid: &VolumeId,
        drive: DriveAddr,
        read_only: bool,
        bypass: bool,
    ) -> LibStatus {
        self.log.push(LibraryCall::Mount {
            seq,
            vid: vid.to_string(),
            drive,
            read_only,
            bypass,
        });
        self.next_accept()
    }

    fn dismount(
        &mut self,
        seq: SeqNo,
        _lock: LockId,
        vid: &VolumeId,
        drive: DriveAddr,
        force: bool,
    ) -> LibStatus {
        self.log.push(LibraryCall::Dismount {
            seq,
            vid: vid.to_string(),
            drive,
            force,
        });
        self.next_accept()
    }

    fn query_volume(&mut self, seq: SeqNo, vids: &[VolumeId]) -> LibStatus {
        self.log.push(LibraryCall::QueryVolume {
            seq,
            vids: vids.iter().map(|v| v.to_string()).collect(),
        });
        self.next_accept()
    }

    fn poll_response(&mut self, timeout: Duration) -> PollOutcome {
        match self.polls.pop_front() {
            Some(outcome) => {
                if outcome.kind == ResponseKind::None {
                    std::thread::sleep(timeout);
                }
                outcome
            }
            None => {
                std::thread::sleep(timeout);
                PollOutcome::none()
            }
        }
    }
}
