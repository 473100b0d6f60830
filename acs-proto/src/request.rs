//! Client request payloads.

use crate::frame::{Frame, FrameError, MessageType};
use crate::types::DriveAddr;
use serde::{Deserialize, Serialize};

/// Payload of the mount message types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountParams {
    /// Volume label as supplied by the client; validated server-side.
    pub vid: String,
    pub drive: DriveAddr,
}

/// Payload of the dismount message types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DismountParams {
    pub vid: String,
    pub drive: DriveAddr,
}

/// A decoded client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcsRequest {
    MountReadOnly(MountParams),
    MountReadWrite(MountParams),
    Dismount(DismountParams),
    ForceDismount(DismountParams),
}

impl AcsRequest {
    pub fn message_type(&self) -> MessageType {
        match self {
            AcsRequest::MountReadOnly(_) => MessageType::MountTapeReadOnly,
            AcsRequest::MountReadWrite(_) => MessageType::MountTapeReadWrite,
            AcsRequest::Dismount(_) => MessageType::DismountTape,
            AcsRequest::ForceDismount(_) => MessageType::ForceDismountTape,
        }
    }

    pub fn vid(&self) -> &str {
        match self {
            AcsRequest::MountReadOnly(p) | AcsRequest::MountReadWrite(p) => &p.vid,
            AcsRequest::Dismount(p) | AcsRequest::ForceDismount(p) => &p.vid,
        }
    }

    pub fn drive(&self) -> DriveAddr {
        match self {
            AcsRequest::MountReadOnly(p) | AcsRequest::MountReadWrite(p) => p.drive,
            AcsRequest::Dismount(p) | AcsRequest::ForceDismount(p) => p.drive,
        }
    }

    /// Serialize into a frame whose header carries this request's
    /// message-type code.
    pub fn to_frame(&self) -> Result<Frame, FrameError> {
        let payload = match self {
            AcsRequest::MountReadOnly(p) | AcsRequest::MountReadWrite(p) => bincode::serialize(p),
            AcsRequest::Dismount(p) | AcsRequest::ForceDismount(p) => bincode::serialize(p),
        }
        .map_err(|e| FrameError::Encode(e.to_string()))?;
        Ok(Frame::new(self.message_type(), payload))
    }

    /// Decode a request from a frame, using the header's message-type code
    /// to select the payload schema.
    pub fn from_frame(frame: &Frame) -> Result<Self, FrameError> {
        let decode_err = |e: bincode::Error| FrameError::Decode(e.to_string());
        match frame.header.msg_type {
            MessageType::MountTapeReadOnly => bincode::deserialize(&frame.payload)
                .map(AcsRequest::MountReadOnly)
                .map_err(decode_err),
            MessageType::MountTapeReadWrite => bincode::deserialize(&frame.payload)
                .map(AcsRequest::MountReadWrite)
                .map_err(decode_err),
            MessageType::DismountTape => bincode::deserialize(&frame.payload)
                .map(AcsRequest::Dismount)
                .map_err(decode_err),
            MessageType::ForceDismountTape => bincode::deserialize(&frame.payload)
                .map(AcsRequest::ForceDismount)
                .map_err(decode_err),
            other => Err(FrameError::Decode(format!(
                "message type {other:?} is not a request"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> MountParams {
        MountParams {
            vid: "VOL001".to_string(),
            drive: "1:2:3:4".parse().unwrap(),
        }
    }

    #[test]
    fn test_request_frame_round_trip() {
        let request = AcsRequest::MountReadOnly(params());
        let frame = request.to_frame().unwrap();
        assert_eq!(frame.header.msg_type, MessageType::MountTapeReadOnly);
        assert!(frame.verify());

        let decoded = AcsRequest::from_frame(&frame).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_force_dismount_keeps_its_message_type() {
        let request = AcsRequest::ForceDismount(DismountParams {
            vid: "VOL001".to_string(),
            drive: "1:2:3:4".parse().unwrap(),
        });
        let frame = request.to_frame().unwrap();
        assert_eq!(frame.header.msg_type, MessageType::ForceDismountTape);
        assert_eq!(AcsRequest::from_frame(&frame).unwrap(), request);
    }

    #[test]
    fn test_from_frame_rejects_reply_types() {
        let frame = Frame::new(MessageType::ReturnValue, Vec::new());
        assert!(matches!(
            AcsRequest::from_frame(&frame),
            Err(FrameError::Decode(_))
        ));
    }
}
