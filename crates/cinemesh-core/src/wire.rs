//! Length-prefixed JSON framing for coordinator↔worker connections.
//!
//! Every frame: 4-byte big-endian unsigned length N, then exactly N bytes
//! of UTF-8 JSON (`message::Message`). Frames are self-delimiting — the
//! prefix always equals the payload byte count. Frames above
//! [`MAX_FRAME_BYTES`] are rejected before any allocation.
//!
//! Writes on a shared connection must be serialized by the caller: the
//! coordinator gives each connection a single writer task, the worker
//! guards its write half with a mutex.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::message::Message;

/// Upper bound on a single frame's payload.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Errors arising while reading or writing frames.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The peer closed the connection at a frame boundary.
    #[error("connection closed by peer")]
    Closed,

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame length {0} exceeds maximum {MAX_FRAME_BYTES}")]
    FrameTooLarge(usize),

    /// Payload was not valid JSON or used an unknown type tag.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl WireError {
    /// True for an orderly shutdown, as opposed to a fault mid-frame.
    pub fn is_clean_close(&self) -> bool {
        matches!(self, WireError::Closed)
    }
}

/// Serialize `msg` and write it as one frame.
pub async fn write_message<W>(writer: &mut W, msg: &Message) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let payload = serde_json::to_vec(msg)?;
    if payload.len() > MAX_FRAME_BYTES {
        return Err(WireError::FrameTooLarge(payload.len()));
    }

    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame and decode it.
///
/// EOF before the first prefix byte is a clean [`WireError::Closed`];
/// EOF anywhere inside a frame is an I/O error.
pub async fn read_message<R>(reader: &mut R) -> Result<Message, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 4];
    let mut filled = 0;
    while filled < prefix.len() {
        let n = reader.read(&mut prefix[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Err(WireError::Closed);
            }
            return Err(WireError::Io(std::io::ErrorKind::UnexpectedEof.into()));
        }
        filled += n;
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(WireError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(serde_json::from_slice(&payload)?)
}
