//! Service error types.

use crate::library::{LibStatus, SeqNo};
use acs_proto::{FrameError, InvalidArgument};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum AcsError {
    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgument),

    /// The vendor library's immediate accept status was not success.
    #[error("library rejected request: {0}")]
    LibrarySubmit(LibStatus),

    /// A response correlated to the wrong request; protocol integrity fault.
    #[error("sequence mismatch: expected {expected}, got {actual}")]
    SequenceMismatch { expected: SeqNo, actual: SeqNo },

    /// A response that the typed decode at the library boundary cannot
    /// accept (e.g. a final response with no payload).
    #[error("malformed library response: {0}")]
    BadLibraryResponse(String),

    #[error("no final response within {0:?}")]
    RequestTimedOut(Duration),

    #[error("mount of {vid} on drive {drive} failed: {reason}")]
    MountFailed {
        vid: String,
        drive: String,
        reason: String,
    },

    #[error("dismount of {vid} from drive {drive} failed: {reason}")]
    DismountFailed {
        vid: String,
        drive: String,
        reason: String,
    },

    #[error("volume query failed: {0}")]
    QueryVolumeFailed(String),

    #[error("conflicting request: {0}")]
    ConflictingRequest(String),

    #[error("sequence number space exhausted")]
    SequenceSpaceExhausted,

    /// Lifecycle fault: the reply path was invoked twice for one request.
    #[error("reply already sent for request {0}")]
    DuplicateReply(SeqNo),

    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl AcsError {
    /// Client-visible numeric code carried in exception replies.
    pub fn code(&self) -> i32 {
        match self {
            AcsError::InvalidArgument(_) | AcsError::Frame(_) => libc::EINVAL,
            AcsError::RequestTimedOut(_) => libc::ETIMEDOUT,
            AcsError::ConflictingRequest(_) => libc::EBUSY,
            AcsError::SequenceSpaceExhausted => libc::EAGAIN,
            AcsError::SequenceMismatch { .. } | AcsError::BadLibraryResponse(_) => libc::EPROTO,
            AcsError::DuplicateReply(_) => libc::EALREADY,
            AcsError::LibrarySubmit(_)
            | AcsError::MountFailed { .. }
            | AcsError::DismountFailed { .. }
            | AcsError::QueryVolumeFailed(_) => libc::EIO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_map_to_errno() {
        assert_eq!(
            AcsError::RequestTimedOut(Duration::from_secs(1)).code(),
            libc::ETIMEDOUT
        );
        assert_eq!(
            AcsError::ConflictingRequest("drive".to_string()).code(),
            libc::EBUSY
        );
        assert_eq!(AcsError::SequenceSpaceExhausted.code(), libc::EAGAIN);
        assert_eq!(
            AcsError::LibrarySubmit(LibStatus::DriveInUse).code(),
            libc::EIO
        );
    }

    #[test]
    fn test_messages_chain_cause_text() {
        let err = AcsError::MountFailed {
            vid: "VOL001".to_string(),
            drive: "001:002:003:004".to_string(),
            reason: AcsError::RequestTimedOut(Duration::from_secs(610)).to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("VOL001"));
        assert!(text.contains("no final response within"));
    }
}
