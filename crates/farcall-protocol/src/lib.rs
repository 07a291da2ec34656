//! Wire protocol for farcall remote proxies.
//!
//! This crate defines the messages exchanged between a peer that
//! exposes an object and a peer that drives it through a remote handle.
//!
//! # Envelope Structure
//!
//! Every message is an [`Envelope`] with:
//! - `id`: correlation id; a `response` reuses the id of the request it answers
//! - `type`: the message kind (`connect`, `response`, `get`, `set`, `apply`,
//!   `construct`, `release-proxy`)
//! - kind-specific fields such as `proxy_id`, `path`, `value` and `args`
//!
//! Values embedded in requests and responses are [`WireValue`]s tagged
//! `raw`, `serialized`, `proxy` or `throw`.
//!
//! # Framing
//!
//! Byte-stream transports send messages as length-prefixed JSON:
//! - 4 bytes: message length (u32, big-endian)
//! - N bytes: JSON payload
//!
//! # Example
//!
//! ```rust
//! use farcall_protocol::{Envelope, Message, decode_message, encode_message};
//!
//! let request = Envelope::connect("default");
//! let bytes = encode_message(&request).unwrap();
//! let decoded: Envelope = decode_message(&bytes).unwrap();
//! assert!(matches!(decoded.message, Message::Connect { .. }));
//! ```

mod error;
mod framing;
mod structured;
mod types;

pub use error::{ProtocolError, ProtocolResult};
pub use framing::{decode_message, encode_message, read_frame_len};
pub use structured::Structured;
pub use types::{
    CorrelationId, Envelope, ErrorCode, Message, MessageKind, PropertyPath, ProxyId,
    SerializeOptions, ThrownError, WireValue,
};

/// Maximum message size (1 MB).
pub const MAX_MESSAGE_SIZE: u32 = 1024 * 1024;

/// Service name used when `connect`/`expose` are not given one.
pub const DEFAULT_SERVICE: &str = "default";
