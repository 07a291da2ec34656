//! Physical transports a [`Channel`](crate::Channel) can run over.
//!
//! A transport moves whole [`Envelope`]s, optionally together with a list of
//! [`Transferable`] resources. Only transports that report
//! [`Transport::supports_transfer`] may be handed a non-empty list.

mod memory;
mod socket;
mod stream;

use std::fmt;

use async_trait::async_trait;

use farcall_protocol::Envelope;

use crate::channel::Channel;
use crate::error::TransportResult;

pub use memory::MemoryTransport;
pub use socket::{SocketServer, UnixTransport};
pub use stream::StreamTransport;

/// A resource moved (not copied) alongside an envelope.
#[derive(Clone)]
pub enum Transferable {
    /// One endpoint of a dedicated channel. `key` matches the `channel_hint`
    /// of the proxy value it belongs to.
    Port { key: String, port: MemoryTransport },

    /// An opaque buffer handed over to the receiver.
    Buffer(Vec<u8>),
}

impl fmt::Debug for Transferable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Port { key, .. } => f
                .debug_struct("Port")
                .field("key", key)
                .finish_non_exhaustive(),
            Self::Buffer(bytes) => f.debug_tuple("Buffer").field(&bytes.len()).finish(),
        }
    }
}

/// An envelope as delivered by a transport.
#[derive(Debug)]
pub struct Incoming {
    pub envelope: Envelope,
    pub transfer: Vec<Transferable>,
}

impl Incoming {
    /// Wraps an envelope that arrived without resources.
    pub fn bare(envelope: Envelope) -> Self {
        Self {
            envelope,
            transfer: Vec::new(),
        }
    }
}

/// A bidirectional message medium.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends one envelope together with the resources it references.
    async fn send(&self, envelope: Envelope, transfer: Vec<Transferable>) -> TransportResult<()>;

    /// Receives the next envelope. `Ok(None)` means the peer closed cleanly.
    async fn recv(&self) -> TransportResult<Option<Incoming>>;

    /// Whether [`Transferable`] resources can be moved over this transport.
    fn supports_transfer(&self) -> bool {
        false
    }

    /// Closes the sending side.
    async fn close(&self) {}
}

/// Anything `connect` and `expose` accept: an existing channel, or a raw
/// transport that gets wrapped in a fresh one.
pub trait IntoChannel {
    fn into_channel(self) -> Channel;
}

impl IntoChannel for Channel {
    fn into_channel(self) -> Channel {
        self
    }
}

impl IntoChannel for &Channel {
    fn into_channel(self) -> Channel {
        self.clone()
    }
}

impl<T: Transport> IntoChannel for T {
    fn into_channel(self) -> Channel {
        Channel::new(self)
    }
}
