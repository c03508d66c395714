//! Length-prefixed framing for envelope bytes over a byte stream.
//!
//! Each frame is a big-endian `u32` length followed by that many bytes of
//! payload. This is the only structure the transport layer imposes; the
//! payload itself is an opaque, already-encoded [`kad_proto::Envelope`].

use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Maximum accepted frame length, to avoid allocating arbitrarily large
/// buffers in response to a hostile or corrupt length prefix.
pub const MAX_FRAME_LEN: u32 = 1 << 20;

pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame length {len} exceeds maximum {MAX_FRAME_LEN}"),
        ));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    bytes: &[u8],
) -> std::io::Result<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "frame too large"))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(bytes).await?;
    writer.flush().await
}
