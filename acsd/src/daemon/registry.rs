//! Pending-request registry.
//!
//! Owns every in-flight asynchronous request, hands out sequence numbers,
//! routes unsolicited library responses by sequence number, and runs the
//! completed/failed/to-delete sweep. All in-flight operations share one
//! library channel: the vendor side exposes a single response queue no
//! matter how many operations are outstanding, so sequence numbers are
//! the only demultiplexing key.

use super::request::{AsyncRequest, RequestState};
use super::{ClientToken, ConnTable};
use crate::config::DaemonConfig;
use crate::error::AcsError;
use crate::library::channel::LibraryChannel;
use crate::library::SeqNo;
use acs_proto::{DriveAddr, VolumeId};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub struct PendingRequestRegistry {
    channel: LibraryChannel,
    requests: BTreeMap<SeqNo, AsyncRequest>,
    max_seq: SeqNo,
    command_timeout: Duration,
    probe_interval: Duration,
    probe_timeout: Duration,
    last_probe: Option<Instant>,
}

impl PendingRequestRegistry {
    pub fn new(channel: LibraryChannel, config: &DaemonConfig) -> Self {
        Self {
            channel,
            requests: BTreeMap::new(),
            max_seq: config.max_seq,
            command_timeout: config.command_timeout,
            probe_interval: config.probe_interval,
            probe_timeout: config.probe_timeout,
            last_probe: None,
        }
    }

    /// Pick a sequence number for a new request.
    ///
    /// The in-use range is only ever extended at its ends: below the
    /// minimum while the minimum is above 1, above the maximum while the
    /// maximum is below `max_seq`. Interior gaps left by finished
    /// requests are not reused, so the space can exhaust while released
    /// numbers exist between the ends. This matches the deployed
    /// allocator; the registry tests carry a known-gap scenario for it.
    pub fn allocate_seq(&self) -> Result<SeqNo, AcsError> {
        let Some(&min) = self.requests.keys().next() else {
            return Ok(1);
        };
        if min > 1 {
            return Ok(min - 1);
        }
        match self.requests.keys().next_back() {
            Some(&max) if max < self.max_seq => Ok(max + 1),
            _ => Err(AcsError::SequenceSpaceExhausted),
        }
    }

    /// Admit a new dismount request.
    ///
    /// Rejects with `ConflictingRequest` when an in-flight request
    /// already targets the same drive, or when the volume labels overlap
    /// by substring containment in either direction: label families
    /// sharing a prefix are treated as one resource, deliberately looser
    /// than an exact match.
    pub fn admit(
        &mut self,
        vid: VolumeId,
        drive: DriveAddr,
        force: bool,
        client: ClientToken,
    ) -> Result<SeqNo, AcsError> {
        for req in self.requests.values() {
            if req.drive() == drive {
                return Err(AcsError::ConflictingRequest(format!(
                    "drive {drive} is targeted by in-flight request {}",
                    req.seq()
                )));
            }
            let in_flight = req.vid().as_str();
            let candidate = vid.as_str();
            if in_flight.contains(candidate) || candidate.contains(in_flight) {
                return Err(AcsError::ConflictingRequest(format!(
                    "volume {vid} overlaps in-flight volume {in_flight} (request {})",
                    req.seq()
                )));
            }
        }

        let seq = self.allocate_seq()?;
        info!(seq, %vid, %drive, force, "admitted dismount request");
        self.requests
            .insert(seq, AsyncRequest::new(seq, vid, drive, force, client));
        Ok(seq)
    }

    /// Advance every request, then probe the library at most once.
    ///
    /// The probe runs only when at least one request is waiting on the
    /// library and the probe interval has elapsed; its response is routed
    /// to the owning request by sequence number.
    pub fn tick(&mut self) {
        let timeout = self.command_timeout;
        for req in self.requests.values_mut() {
            req.tick(&mut self.channel, timeout);
        }

        let any_running = self
            .requests
            .values()
            .any(|r| r.state() == RequestState::Running);
        if !any_running {
            return;
        }
        let probe_due = self
            .last_probe
            .map_or(true, |at| at.elapsed() >= self.probe_interval);
        if !probe_due {
            return;
        }
        self.last_probe = Some(Instant::now());

        match self.channel.poll_once(self.probe_timeout, None) {
            Ok(Some(response)) => match self.requests.get_mut(&response.seq) {
                Some(req) => req.handle_response(response),
                None => {
                    warn!(seq = response.seq, "library response for unknown sequence number")
                }
            },
            Ok(None) => {}
            Err(err) => warn!(error = %err, "library probe failed"),
        }
    }

    /// Deliver replies for finished requests and drop deleted ones.
    pub fn sweep(&mut self, conns: &ConnTable) {
        for req in self.requests.values_mut() {
            if matches!(req.state(), RequestState::Completed | RequestState::Failed) {
                if let Err(err) = req.send_reply_once(conns) {
                    // Only reachable through a lifecycle bug.
                    error!(seq = req.seq(), error = %err, "reply path fault");
                }
                req.mark_to_delete();
            }
        }

        let before = self.requests.len();
        self.requests
            .retain(|_, req| req.state() != RequestState::ToDelete);
        let removed = before - self.requests.len();
        if removed > 0 {
            debug!(removed, pending = self.requests.len(), "swept finished requests");
        }
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// State of one request, if still registered.
    pub fn request_state(&self, seq: SeqNo) -> Option<RequestState> {
        self.requests.get(&seq).map(|r| r.state())
    }
}
