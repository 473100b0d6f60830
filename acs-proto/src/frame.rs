//! Frame codec: the two-part envelope exchanged with clients.
//!
//! A frame is a header plus an opaque payload. The header carries the
//! protocol identity, a digest of the payload, the message-type code that
//! selects the payload schema, and the payload length. Encoding and
//! decoding are pure functions over byte buffers; the digest check is a
//! separate, explicit [`verify`] step that never fails with an error.

use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};

/// Frame magic, ASCII "ACSF".
pub const FRAME_MAGIC: u32 = 0x4143_5346;

/// Protocol identifier of the mount service, ASCII "MT".
pub const PROTOCOL_ID: u32 = 0x4d54;

/// Current protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum payload size (64 KB). Requests and replies are tiny; anything
/// larger is corruption.
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Maximum serialized header size.
pub const MAX_HEADER_SIZE: usize = 4 * 1024;

/// Message-type code carried in the frame header; selects the payload
/// schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    MountTapeReadOnly,
    MountTapeReadWrite,
    DismountTape,
    ForceDismountTape,
    ReturnValue,
    Exception,
}

impl MessageType {
    pub fn is_request(self) -> bool {
        matches!(
            self,
            MessageType::MountTapeReadOnly
                | MessageType::MountTapeReadWrite
                | MessageType::DismountTape
                | MessageType::ForceDismountTape
        )
    }
}

/// Payload digest algorithm tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashAlg {
    /// No digest present; such frames never verify.
    None,
    /// SHA-1 over the payload, base64-encoded.
    Sha1Base64,
}

/// Payload signature algorithm tag. No algorithms are assigned yet; the
/// tag is carried for forward compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigAlg {
    None,
}

/// Frame header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameHeader {
    pub magic: u32,
    pub protocol: u32,
    pub version: u32,
    pub hash_alg: HashAlg,
    pub sig_alg: SigAlg,
    /// Digest of the payload, per `hash_alg`.
    pub payload_hash: String,
    pub msg_type: MessageType,
    pub payload_len: u32,
}

impl FrameHeader {
    /// Build a complete header for the given payload.
    pub fn new(msg_type: MessageType, payload: &[u8]) -> Self {
        Self {
            magic: FRAME_MAGIC,
            protocol: PROTOCOL_ID,
            version: PROTOCOL_VERSION,
            hash_alg: HashAlg::Sha1Base64,
            sig_alg: SigAlg::None,
            payload_hash: payload_digest(payload),
            msg_type,
            payload_len: payload.len() as u32,
        }
    }

    fn check(&self) -> Result<(), String> {
        if self.magic != FRAME_MAGIC {
            return Err(format!("bad magic {:#010x}", self.magic));
        }
        if self.protocol != PROTOCOL_ID {
            return Err(format!("unknown protocol {:#06x}", self.protocol));
        }
        if self.version != PROTOCOL_VERSION {
            return Err(format!("unsupported version {}", self.version));
        }
        if self.hash_alg != HashAlg::None && self.payload_hash.is_empty() {
            return Err("missing payload hash".to_string());
        }
        if self.payload_len as usize > MAX_PAYLOAD_SIZE {
            return Err(format!("payload too large: {} bytes", self.payload_len));
        }
        Ok(())
    }
}

/// Digest of a payload: SHA-1, base64-encoded.
pub fn payload_digest(payload: &[u8]) -> String {
    use base64::Engine;
    use sha1::{Digest, Sha1};

    let mut hasher = Sha1::new();
    hasher.update(payload);
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// Recompute the payload digest and compare it to the header's stored
/// value. Returns false on mismatch or on an unverifiable algorithm tag;
/// never fails with an error. Callers must check this before trusting
/// payload contents.
pub fn verify(header: &FrameHeader, payload: &[u8]) -> bool {
    match header.hash_alg {
        HashAlg::Sha1Base64 => header.payload_hash == payload_digest(payload),
        HashAlg::None => false,
    }
}

/// Codec failures.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame encode failed: {0}")]
    Encode(String),

    #[error("frame decode failed: {0}")]
    Decode(String),
}

/// A complete frame: header plus opaque payload bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build a frame with a freshly computed header.
    pub fn new(msg_type: MessageType, payload: Vec<u8>) -> Self {
        Self {
            header: FrameHeader::new(msg_type, &payload),
            payload,
        }
    }

    /// Check this frame's payload against the header digest.
    pub fn verify(&self) -> bool {
        verify(&self.header, &self.payload)
    }

    /// Serialize to bytes: header length prefix, header, payload.
    ///
    /// Fails if the header is incomplete or its declared payload length
    /// does not match the actual payload.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        self.header.check().map_err(FrameError::Encode)?;
        if self.header.payload_len as usize != self.payload.len() {
            return Err(FrameError::Encode(format!(
                "declared payload length {} does not match actual {}",
                self.header.payload_len,
                self.payload.len()
            )));
        }

        let header_bytes =
            bincode::serialize(&self.header).map_err(|e| FrameError::Encode(e.to_string()))?;
        if header_bytes.len() > MAX_HEADER_SIZE {
            return Err(FrameError::Encode(format!(
                "header too large: {} bytes",
                header_bytes.len()
            )));
        }

        let mut buf = Vec::with_capacity(4 + header_bytes.len() + self.payload.len());
        buf.extend_from_slice(&(header_bytes.len() as u32).to_be_bytes());
        buf.extend_from_slice(&header_bytes);
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    /// Deserialize from bytes produced by [`Frame::encode`].
    ///
    /// Fails on structural corruption only; the payload digest is not
    /// checked here.
    pub fn decode(bytes: &[u8]) -> Result<Frame, FrameError> {
        if bytes.len() < 4 {
            return Err(FrameError::Decode("short buffer: no header length".to_string()));
        }
        let header_len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        if header_len > MAX_HEADER_SIZE {
            return Err(FrameError::Decode(format!("header too large: {header_len} bytes")));
        }
        if bytes.len() < 4 + header_len {
            return Err(FrameError::Decode("short buffer: truncated header".to_string()));
        }

        let header: FrameHeader = bincode::deserialize(&bytes[4..4 + header_len])
            .map_err(|e| FrameError::Decode(e.to_string()))?;
        header.check().map_err(FrameError::Decode)?;

        let payload = &bytes[4 + header_len..];
        if payload.len() != header.payload_len as usize {
            return Err(FrameError::Decode(format!(
                "payload length {} does not match declared {}",
                payload.len(),
                header.payload_len
            )));
        }

        Ok(Frame {
            header,
            payload: payload.to_vec(),
        })
    }
}

fn invalid_data(err: impl ToString) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err.to_string())
}

/// Read one frame from a reader.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Frame> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let header_len = u32::from_be_bytes(len_buf) as usize;
    if header_len > MAX_HEADER_SIZE {
        return Err(invalid_data(format!("header too large: {header_len} bytes")));
    }

    let mut header_buf = vec![0u8; header_len];
    reader.read_exact(&mut header_buf)?;
    let header: FrameHeader = bincode::deserialize(&header_buf).map_err(invalid_data)?;
    header.check().map_err(invalid_data)?;

    let mut payload = vec![0u8; header.payload_len as usize];
    reader.read_exact(&mut payload)?;
    Ok(Frame { header, payload })
}

/// Write one frame to a writer.
pub fn write_frame<W: Write>(writer: &mut W, frame: &Frame) -> io::Result<()> {
    let bytes = frame.encode().map_err(invalid_data)?;
    writer.write_all(&bytes)
}

/// Async version of [`read_frame`] using tokio.
pub async fn read_frame_async<R: tokio::io::AsyncReadExt + Unpin>(
    reader: &mut R,
) -> io::Result<Frame> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let header_len = u32::from_be_bytes(len_buf) as usize;
    if header_len > MAX_HEADER_SIZE {
        return Err(invalid_data(format!("header too large: {header_len} bytes")));
    }

    let mut header_buf = vec![0u8; header_len];
    reader.read_exact(&mut header_buf).await?;
    let header: FrameHeader = bincode::deserialize(&header_buf).map_err(invalid_data)?;
    header.check().map_err(invalid_data)?;

    let mut payload = vec![0u8; header.payload_len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(Frame { header, payload })
}

/// Async version of [`write_frame`] using tokio.
pub async fn write_frame_async<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    frame: &Frame,
) -> io::Result<()> {
    let bytes = frame.encode().map_err(invalid_data)?;
    writer.write_all(&bytes).await
}
