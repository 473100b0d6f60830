//! Wire protocol for the ACS tape mount/dismount service.
//!
//! `acs-proto` defines everything that crosses the client socket:
//!
//! - **Frames**: a two-part envelope (header + payload) with an integrity
//!   digest over the payload
//! - **Requests**: typed mount/dismount payloads selected by the header's
//!   message-type code
//! - **Replies**: `ReturnValue` on success, `Exception` on failure
//! - **Identifiers**: validated volume labels and drive addresses
//! - **Client**: a small blocking client for tools and tests
//!
//! # Frame Format
//!
//! ```text
//! +------------+-----------+----------+
//! | header len |  header   | payload  |
//! | (4 bytes)  | (N bytes) | (M bytes)|
//! +------------+-----------+----------+
//! ```
//!
//! The header length is a big-endian u32. The header is bincode-serialized
//! and carries the payload length and the payload digest; the payload bytes
//! follow it verbatim. Decoding never checks the digest; callers verify
//! explicitly before trusting payload contents.

pub mod client;
pub mod frame;
pub mod request;
pub mod response;
pub mod types;

pub use frame::{
    read_frame, read_frame_async, verify, write_frame, write_frame_async, Frame, FrameError,
    FrameHeader, HashAlg, MessageType, SigAlg, FRAME_MAGIC, MAX_PAYLOAD_SIZE, PROTOCOL_ID,
    PROTOCOL_VERSION,
};
pub use request::{AcsRequest, DismountParams, MountParams};
pub use response::AcsReply;
pub use types::{DriveAddr, InvalidArgument, VolumeId, MAX_DRIVE_COMPONENT, MAX_VID_LEN};
