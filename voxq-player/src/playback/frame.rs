//! Length-prefixed frame reader for the encode stage output
//!
//! Wire format: a 2-byte little-endian signed length, then exactly that many
//! payload bytes, repeated until end of stream.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Size of the length prefix in bytes
pub const PREFIX_LEN: usize = 2;

/// Frame read failure
///
/// End of stream on a prefix boundary is not an error; it is reported as
/// `Ok(None)` by [`FrameReader::next_frame`].
#[derive(Error, Debug)]
pub enum FrameError {
    /// Stream ended inside a prefix or payload
    #[error("truncated frame: expected {expected} bytes, got {received}")]
    Truncated { expected: usize, received: usize },

    /// Negative length prefix
    #[error("invalid frame length {0}")]
    InvalidLength(i16),

    #[error("frame read error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pulls frames off an async byte stream
///
/// Finite and not restartable: once the stream ends or errors every later
/// call returns `Ok(None)`.
pub struct FrameReader<R> {
    inner: R,
    finished: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            finished: false,
        }
    }

    /// Read the next frame payload
    pub async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        if self.finished {
            return Ok(None);
        }

        let result = self.read_frame().await;
        if !matches!(result, Ok(Some(_))) {
            self.finished = true;
        }
        result
    }

    async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let mut prefix = [0u8; PREFIX_LEN];
        match read_full(&mut self.inner, &mut prefix).await? {
            0 => return Ok(None),
            PREFIX_LEN => {}
            received => {
                return Err(FrameError::Truncated {
                    expected: PREFIX_LEN,
                    received,
                })
            }
        }

        let len = i16::from_le_bytes(prefix);
        if len < 0 {
            return Err(FrameError::InvalidLength(len));
        }

        let expected = len as usize;
        let mut payload = vec![0u8; expected];
        let received = read_full(&mut self.inner, &mut payload).await?;
        if received < expected {
            return Err(FrameError::Truncated { expected, received });
        }
        Ok(Some(payload))
    }
}

/// Fill `buf` as far as the stream allows, returning the byte count
///
/// Unlike `read_exact`, a short count tells the caller how much arrived
/// before end of stream.
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
