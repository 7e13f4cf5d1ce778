use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::FrameError;

/// Sanity cap on a single frame's payload. The wire format itself imposes
/// no limit; this guards against a misbehaving peer claiming an absurd
/// length and exhausting memory before we ever read a byte of payload.
pub const MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// Outcome of attempting to read one frame.
pub enum ReadOutcome {
    Frame(Vec<u8>),
    /// Clean end of stream observed between frames (no bytes of the next
    /// length header were read). Not an error.
    Eof,
}

/// Write one length-prefixed frame. Callers are responsible for holding
/// the single writer lock for the socket — see [`crate::channel`].
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame, looping on short reads until the full
/// frame is in hand or the stream ends.
pub async fn read_frame<R>(reader: &mut R) -> Result<ReadOutcome, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    let mut read = 0usize;
    while read < len_buf.len() {
        let n = reader.read(&mut len_buf[read..]).await?;
        if n == 0 {
            if read == 0 {
                return Ok(ReadOutcome::Eof);
            }
            return Err(FrameError::Incomplete {
                read,
                expected: len_buf.len(),
            });
        }
        read += n;
    }

    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge {
            len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut payload = vec![0u8; len as usize];
    let mut read = 0usize;
    while read < payload.len() {
        let n = reader.read(&mut payload[read..]).await?;
        if n == 0 {
            return Err(FrameError::Incomplete {
                read,
                expected: payload.len(),
            });
        }
        read += n;
    }

    Ok(ReadOutcome::Frame(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn round_trips_a_frame() {
        let (mut a, mut b) = duplex(4096);
        write_frame(&mut a, b"hello").await.unwrap();
        match read_frame(&mut b).await.unwrap() {
            ReadOutcome::Frame(bytes) => assert_eq!(bytes, b"hello"),
            ReadOutcome::Eof => panic!("expected a frame"),
        }
    }

    #[tokio::test]
    async fn round_trips_an_empty_frame() {
        let (mut a, mut b) = duplex(64);
        write_frame(&mut a, b"").await.unwrap();
        match read_frame(&mut b).await.unwrap() {
            ReadOutcome::Frame(bytes) => assert!(bytes.is_empty()),
            ReadOutcome::Eof => panic!("expected a frame"),
        }
    }

    #[tokio::test]
    async fn clean_eof_between_frames_is_not_an_error() {
        let (a, mut b) = duplex(64);
        drop(a);
        match read_frame(&mut b).await.unwrap() {
            ReadOutcome::Eof => {}
            ReadOutcome::Frame(_) => panic!("expected eof"),
        }
    }

    #[tokio::test]
    async fn eof_mid_length_header_is_incomplete() {
        let (mut a, mut b) = duplex(64);
        a.write_all(&[0u8, 1]).await.unwrap();
        drop(a);
        let err = read_frame(&mut b).await.unwrap_err();
        assert!(matches!(
            err,
            FrameError::Incomplete {
                read: 2,
                expected: 4
            }
        ));
    }

    #[tokio::test]
    async fn eof_mid_payload_is_incomplete() {
        let (mut a, mut b) = duplex(64);
        a.write_all(&10u32.to_be_bytes()).await.unwrap();
        a.write_all(b"abc").await.unwrap();
        drop(a);
        let err = read_frame(&mut b).await.unwrap_err();
        assert!(matches!(
            err,
            FrameError::Incomplete {
                read: 3,
                expected: 10
            }
        ));
    }

    #[tokio::test]
    async fn oversized_length_is_rejected() {
        let (mut a, mut b) = duplex(64);
        a.write_all(&(MAX_FRAME_SIZE + 1).to_be_bytes())
            .await
            .unwrap();
        let err = read_frame(&mut b).await.unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { .. }));
    }
}
