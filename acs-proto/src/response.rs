//! Reply payloads: one reply frame per request.

use crate::frame::{Frame, FrameError, MessageType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ReturnValueBody {
    value: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ExceptionBody {
    code: i32,
    message: String,
}

/// A decoded reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcsReply {
    /// Success, carrying the operation's integer result.
    ReturnValue(i32),
    /// Failure, carrying a numeric code and a human-readable message.
    Exception { code: i32, message: String },
}

impl AcsReply {
    /// The standard success reply.
    pub fn ok() -> Self {
        AcsReply::ReturnValue(0)
    }

    pub fn exception(code: i32, message: impl Into<String>) -> Self {
        AcsReply::Exception {
            code,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, AcsReply::ReturnValue(_))
    }

    /// The error code, if this is an exception reply.
    pub fn code(&self) -> Option<i32> {
        match self {
            AcsReply::Exception { code, .. } => Some(*code),
            AcsReply::ReturnValue(_) => None,
        }
    }

    pub fn to_frame(&self) -> Result<Frame, FrameError> {
        let (msg_type, payload) = match self {
            AcsReply::ReturnValue(value) => (
                MessageType::ReturnValue,
                bincode::serialize(&ReturnValueBody { value: *value }),
            ),
            AcsReply::Exception { code, message } => (
                MessageType::Exception,
                bincode::serialize(&ExceptionBody {
                    code: *code,
                    message: message.clone(),
                }),
            ),
        };
        let payload = payload.map_err(|e| FrameError::Encode(e.to_string()))?;
        Ok(Frame::new(msg_type, payload))
    }

    pub fn from_frame(frame: &Frame) -> Result<Self, FrameError> {
        let decode_err = |e: bincode::Error| FrameError::Decode(e.to_string());
        match frame.header.msg_type {
            MessageType::ReturnValue => bincode::deserialize::<ReturnValueBody>(&frame.payload)
                .map(|b| AcsReply::ReturnValue(b.value))
                .map_err(decode_err),
            MessageType::Exception => bincode::deserialize::<ExceptionBody>(&frame.payload)
                .map(|b| AcsReply::Exception {
                    code: b.code,
                    message: b.message,
                })
                .map_err(decode_err),
            other => Err(FrameError::Decode(format!(
                "message type {other:?} is not a reply"
            ))),
        }
    }
}
