//! Length-prefixed bincode framing.
//!
//! One frame is a `u32` big-endian byte length followed by the bincode
//! encoding of one [`Message`].

use super::message::Message;
use crate::error::{NodeError, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frames larger than this are refused outright.
pub const MAX_FRAME_BYTES: u32 = 10 * 1024 * 1024;

/// Writes one message as a length-prefixed frame and flushes it.
pub async fn write_frame<W>(writer: &mut W, msg: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = bincode::serialize(msg)?;
    if bytes.len() > MAX_FRAME_BYTES as usize {
        return Err(NodeError::Wire(format!(
            "outgoing frame of {} bytes exceeds the {} byte limit",
            bytes.len(),
            MAX_FRAME_BYTES
        )));
    }
    writer.write_u32(bytes.len() as u32).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one length-prefixed frame and decodes it.
pub async fn read_frame<R>(reader: &mut R) -> Result<Message>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await?;
    if len > MAX_FRAME_BYTES {
        return Err(NodeError::Wire(format!(
            "incoming frame of {len} bytes exceeds the {MAX_FRAME_BYTES} byte limit"
        )));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(bincode::deserialize(&buf)?)
}
