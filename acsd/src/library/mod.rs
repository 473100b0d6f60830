//! Vendor tape-library control interface.
//!
//! The vendor API is request/response and polling-based: a call is
//! submitted with a caller-chosen sequence number and returns only an
//! immediate accept status; the actual outcome arrives later as an
//! unsolicited response fetched with `poll_response` and correlated by
//! that sequence number. Everything vendor-specific stays behind the
//! [`LibraryApi`] trait; the rest of the daemon sees only the typed
//! responses produced by [`channel::LibraryChannel`].

pub mod channel;
pub mod ops;
pub mod sim;

pub use channel::{ChannelResponse, LibraryChannel, LibraryOp, ResponseBody};

use acs_proto::{DriveAddr, VolumeId};
use std::fmt;
use std::time::Duration;

/// Correlation id for a library call, chosen by the caller.
/// 0 is reserved and never assigned to a request.
pub type SeqNo = u16;

/// Vendor lock id; 0 means no lock.
pub type LockId = u32;

pub const NO_LOCK: LockId = 0;

/// Vendor status codes, as surfaced by every library call and response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibStatus {
    Success,
    Pending,
    DriveInUse,
    VolumeInUse,
    VolumeNotInLibrary,
    InvalidDrive,
    InvalidVolume,
    LibraryBusy,
    LibraryFailure,
    IpcFailure,
    Cancelled,
}

impl LibStatus {
    pub fn is_success(self) -> bool {
        matches!(self, LibStatus::Success)
    }
}

impl fmt::Display for LibStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LibStatus::Success => "success",
            LibStatus::Pending => "pending",
            LibStatus::DriveInUse => "drive in use",
            LibStatus::VolumeInUse => "volume in use",
            LibStatus::VolumeNotInLibrary => "volume not in library",
            LibStatus::InvalidDrive => "invalid drive",
            LibStatus::InvalidVolume => "invalid volume",
            LibStatus::LibraryBusy => "library busy",
            LibStatus::LibraryFailure => "library failure",
            LibStatus::IpcFailure => "ipc failure",
            LibStatus::Cancelled => "cancelled",
        };
        f.write_str(text)
    }
}

/// Response classification: only `Final` terminates a sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    None,
    Acknowledge,
    Intermediate,
    Final,
}

/// Typed payload of a final response.
#[derive(Debug, Clone, PartialEq)]
pub enum FinalBody {
    Mount { status: LibStatus },
    Dismount { status: LibStatus },
    QueryVolume {
        status: LibStatus,
        volumes: Vec<VolumeStatus>,
    },
}

/// Per-volume result inside a query-volume response.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeStatus {
    pub vid: VolumeId,
    pub status: LibStatus,
    pub location: String,
}

/// One `poll_response` outcome, as delivered by the vendor side.
#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    pub seq: SeqNo,
    pub request_id: u32,
    pub kind: ResponseKind,
    pub body: Option<FinalBody>,
    pub status: LibStatus,
}

impl PollOutcome {
    /// The no-response-within-timeout outcome.
    pub fn none() -> Self {
        Self {
            seq: 0,
            request_id: 0,
            kind: ResponseKind::None,
            body: None,
            status: LibStatus::Pending,
        }
    }

    pub fn final_response(seq: SeqNo, request_id: u32, body: FinalBody) -> Self {
        Self {
            seq,
            request_id,
            kind: ResponseKind::Final,
            body: Some(body),
            status: LibStatus::Success,
        }
    }

    pub fn acknowledge(seq: SeqNo, request_id: u32) -> Self {
        Self {
            seq,
            request_id,
            kind: ResponseKind::Acknowledge,
            body: None,
            status: LibStatus::Success,
        }
    }
}

/// The vendor control interface.
///
/// Implementations may block inside `poll_response` for up to the given
/// timeout. A production deployment provides a binding to the site's
/// library control software; the in-tree [`sim`] backends stand in for it
/// everywhere else.
pub trait LibraryApi: Send {
    fn mount(
        &mut self,
        seq: SeqNo,
        lock: LockId,
        vid: &VolumeId,
        drive: DriveAddr,
        read_only: bool,
        bypass: bool,
    ) -> LibStatus;

    fn dismount(
        &mut self,
        seq: SeqNo,
        lock: LockId,
        vid: &VolumeId,
        drive: DriveAddr,
        force: bool,
    ) -> LibStatus;

    fn query_volume(&mut self, seq: SeqNo, vids: &[VolumeId]) -> LibStatus;

    /// Bounded wait for any pending response.
    fn poll_response(&mut self, timeout: Duration) -> PollOutcome;
}
