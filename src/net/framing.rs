//! Stream framing: `[u32 little-endian length][payload]`
//!
//! WebTransport streams are byte streams, so every game message travels
//! with a length prefix. Inbound frames are capped by the caller; outbound
//! frames only need to fit the prefix, since a joining client's first
//! snapshot can be large.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Message too large: {0} bytes (max {1})")]
    MessageTooLarge(usize, usize),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn closed_on_eof(e: io::Error) -> FramingError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        FramingError::ConnectionClosed
    } else {
        FramingError::Io(e)
    }
}

/// Read one framed message of at most `max_len` bytes
pub async fn read_message<R: AsyncRead + Unpin>(
    stream: &mut R,
    max_len: usize,
) -> Result<Vec<u8>, FramingError> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.map_err(closed_on_eof)?;

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > max_len {
        return Err(FramingError::MessageTooLarge(len, max_len));
    }
    if len == 0 {
        return Ok(Vec::new());
    }

    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await.map_err(closed_on_eof)?;
    Ok(buf)
}

/// Write one framed message and flush it
pub async fn write_message<W: AsyncWrite + Unpin>(
    stream: &mut W,
    data: &[u8],
) -> Result<(), FramingError> {
    let len = u32::try_from(data.len())
        .map_err(|_| FramingError::MessageTooLarge(data.len(), u32::MAX as usize))?;
    stream.write_all(&len.to_le_bytes()).await?;
    stream.write_all(data).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::net::MAX_MESSAGE_SIZE;
    use std::io::Cursor;
    use tokio_test::io::Builder;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut out = (payload.len() as u32).to_le_bytes().to_vec();
        out.extend_from_slice(payload);
        out
    }

    #[tokio::test]
    async fn test_frames_split_across_reads() {
        let bytes = [frame(b"first"), frame(b"second")].concat();
        // Deliver in awkward chunks that cut through prefixes and payloads
        let mut stream = Builder::new()
            .read(&bytes[..2])
            .read(&bytes[2..7])
            .read(&bytes[7..12])
            .read(&bytes[12..])
            .build();

        assert_eq!(read_message(&mut stream, MAX_MESSAGE_SIZE).await.unwrap(), b"first");
        assert_eq!(read_message(&mut stream, MAX_MESSAGE_SIZE).await.unwrap(), b"second");
        assert!(matches!(
            read_message(&mut stream, MAX_MESSAGE_SIZE).await,
            Err(FramingError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_write_emits_prefix_then_payload() {
        let mut stream = Builder::new()
            .write(&5u32.to_le_bytes())
            .write(b"hello")
            .build();
        write_message(&mut stream, b"hello").await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_message() {
        let mut buffer = Vec::new();
        write_message(&mut buffer, b"").await.unwrap();
        assert_eq!(buffer, vec![0, 0, 0, 0]);

        let mut cursor = Cursor::new(buffer);
        assert!(read_message(&mut cursor, MAX_MESSAGE_SIZE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_large_outbound_frame_allowed() {
        let large = vec![7u8; MAX_MESSAGE_SIZE * 2];
        let mut buffer = Vec::new();
        write_message(&mut buffer, &large).await.unwrap();
        assert_eq!(buffer.len(), large.len() + 4);

        let mut cursor = Cursor::new(buffer);
        assert_eq!(read_message(&mut cursor, usize::MAX).await.unwrap(), large);
    }

    #[tokio::test]
    async fn test_oversized_inbound_frame_refused() {
        // The reader rejects on the prefix alone, before any payload arrives
        let prefix = ((MAX_MESSAGE_SIZE + 1) as u32).to_le_bytes();
        let mut stream = Builder::new().read(&prefix).build();
        assert!(matches!(
            read_message(&mut stream, MAX_MESSAGE_SIZE).await,
            Err(FramingError::MessageTooLarge(n, _)) if n == MAX_MESSAGE_SIZE + 1
        ));
    }

    #[tokio::test]
    async fn test_truncated_payload_is_a_close() {
        let mut bytes = 10u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[1, 2, 3]);
        let mut cursor = Cursor::new(bytes);
        assert!(matches!(
            read_message(&mut cursor, MAX_MESSAGE_SIZE).await,
            Err(FramingError::ConnectionClosed)
        ));
    }
}
