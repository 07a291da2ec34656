//! In-process transport pair.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use farcall_protocol::Envelope;

use super::{Incoming, Transferable, Transport};
use crate::channel::lock;
use crate::error::{TransportError, TransportResult};

/// One end of an in-process, unbounded message pipe.
///
/// Cloning yields another handle to the same end. Supports moving
/// [`Transferable`] resources, so dedicated sub-channels can be opened over it.
#[derive(Clone)]
pub struct MemoryTransport {
    inner: Arc<Inner>,
}

struct Inner {
    tx: Mutex<Option<mpsc::UnboundedSender<Incoming>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Incoming>>,
}

impl MemoryTransport {
    /// Creates two connected ends.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (Self::from_parts(a_tx, b_rx), Self::from_parts(b_tx, a_rx))
    }

    fn from_parts(
        tx: mpsc::UnboundedSender<Incoming>,
        rx: mpsc::UnboundedReceiver<Incoming>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                tx: Mutex::new(Some(tx)),
                rx: tokio::sync::Mutex::new(rx),
            }),
        }
    }

    fn sender(&self) -> Option<mpsc::UnboundedSender<Incoming>> {
        lock(&self.inner.tx).clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, envelope: Envelope, transfer: Vec<Transferable>) -> TransportResult<()> {
        let tx = self.sender().ok_or(TransportError::Closed)?;
        tx.send(Incoming { envelope, transfer })
            .map_err(|_| TransportError::Closed)
    }

    async fn recv(&self) -> TransportResult<Option<Incoming>> {
        let mut rx = self.inner.rx.lock().await;
        Ok(rx.recv().await)
    }

    fn supports_transfer(&self) -> bool {
        true
    }

    async fn close(&self) {
        lock(&self.inner.tx).take();
    }
}
