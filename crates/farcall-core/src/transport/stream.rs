//! Length-prefixed framing over any async byte stream.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use farcall_protocol::{Envelope, ProtocolError, encode_message, read_frame_len};

use super::{Incoming, Transferable, Transport};
use crate::error::{TransportError, TransportResult};

/// Transport over a reader and a writer half, using the protocol framing.
///
/// Cannot move transferable resources.
pub struct StreamTransport<R, W> {
    reader: Mutex<R>,
    writer: Mutex<W>,
}

impl<R, W> StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Creates a transport from the two halves of a stream.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }
}

#[async_trait]
impl<R, W> Transport for StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&self, envelope: Envelope, transfer: Vec<Transferable>) -> TransportResult<()> {
        if !transfer.is_empty() {
            return Err(TransportError::TransferUnsupported);
        }

        let frame = encode_message(&envelope)?;
        let mut writer = self.writer.lock().await;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn recv(&self) -> TransportResult<Option<Incoming>> {
        let mut reader = self.reader.lock().await;

        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = read_frame_len(len_buf)?;
        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload).await?;

        let envelope: Envelope = serde_json::from_slice(&payload).map_err(ProtocolError::from)?;
        Ok(Some(Incoming::bare(envelope)))
    }

    async fn close(&self) {
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            tracing::debug!(error = %e, "stream shutdown failed");
        }
    }
}
