//! Length-prefixed frame codec.
//!
//! Wire format, repeated per connection:
//!
//! ```text
//! [ u64 big-endian payload length ][ payload bytes ]
//! ```

use super::TransportError;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length header
pub const HEADER_LEN: usize = 8;

/// Outcome of reading one frame
#[derive(Debug, PartialEq, Eq)]
pub enum FrameRead {
    /// A complete payload
    Frame(Bytes),
    /// The peer closed the connection between frames, or announced an
    /// empty payload
    Closed,
    /// The peer closed the connection partway through a payload
    Truncated { expected: u64, received: u64 },
}

/// Read one frame, refusing payloads larger than `max_len`
pub async fn read_frame<R>(reader: &mut R, max_len: u64) -> Result<FrameRead, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(FrameRead::Closed);
            }
            return Err(TransportError::TruncatedHeader(filled));
        }
        filled += n;
    }

    let len = u64::from_be_bytes(header);
    if len > max_len {
        return Err(TransportError::FrameTooLarge { len, max: max_len });
    }

    tracing::debug!("Image data length: {}", len);

    // A zero-length payload reads as zero bytes, which means the peer is done
    if len == 0 {
        return Ok(FrameRead::Closed);
    }

    // Never trust the header for the allocation, grow as bytes arrive
    let mut payload = Vec::new();
    let received = reader.take(len).read_to_end(&mut payload).await? as u64;
    if received < len {
        return Ok(FrameRead::Truncated {
            expected: len,
            received,
        });
    }

    Ok(FrameRead::Frame(Bytes::from(payload)))
}

/// Write one frame and flush it
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&(payload.len() as u64).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}
