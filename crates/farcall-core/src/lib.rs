//! Transparent remote proxies over message channels.
//!
//! One peer exposes an object with [`expose`]; the other obtains a
//! [`RemoteHandle`] with [`connect`] and drives it as if it were local:
//! member access accumulates a path, while calls, constructions, assignments
//! and awaits each cross the channel once.
//!
//! ```ignore
//! use farcall_core::{DynObject, MemoryTransport, Value, connect, expose};
//!
//! let (server, client) = MemoryTransport::pair();
//! expose(
//!     DynObject::new().with_method("add", |args| {
//!         Ok(args.iter().filter_map(Value::as_i64).sum::<i64>().into())
//!     }),
//!     server,
//!     "default",
//! )?;
//!
//! let remote = connect(client, "default").await?;
//! let sum = remote.get("add").call(vec![2.into(), 3.into()]).await?;
//! assert_eq!(sum.as_i64(), Some(5));
//! ```
//!
//! Values only leave a peer by copy unless marked: see [`mark_for_proxy`],
//! [`mark_for_serialization`] and [`mark_for_transfer`]. Handles that are no
//! longer referenced tell the exposing peer to drop its side.

mod bridge;
pub mod channel;
pub mod codec;
pub mod config;
pub mod error;
mod exposer;
mod handle;
mod lifetime;
pub mod object;
pub mod tracing;
pub mod transport;
pub mod value;

#[cfg(test)]
mod scenario_tests;

pub use channel::{Channel, Reply};
pub use codec::{Codec, JsonCodec};
pub use config::{ChannelConfig, ServerConfig, default_socket_path};
pub use error::{RemoteError, RemoteResult, TransportError, TransportResult};
pub use exposer::expose;
pub use handle::RemoteHandle;
pub use lifetime::ExportRegistry;
pub use object::{DynObject, RemoteClass, RemoteFn, RemoteObject};
pub use transport::{
    Incoming, IntoChannel, MemoryTransport, SocketServer, StreamTransport, Transferable,
    Transport, UnixTransport,
};
pub use value::{
    Value, mark_for_proxy, mark_for_proxy_in, mark_for_serialization, mark_for_transfer,
};

pub use farcall_protocol::{DEFAULT_SERVICE, PropertyPath, ProxyId, SerializeOptions};

use farcall_protocol::Message;

/// Asks the peer on `channel` for the object exposed under `name`.
///
/// # Errors
///
/// Fails with [`RemoteError::Thrown`] when the peer serves no such name, or
/// with a type error when it answers with something other than a handle.
pub async fn connect(channel: impl IntoChannel, name: &str) -> RemoteResult<RemoteHandle> {
    let channel = channel.into_channel();
    let reply = channel
        .request(
            Message::Connect {
                name: name.to_string(),
            },
            Vec::new(),
        )
        .await?;

    match channel.bridge().lift(reply.value, reply.transfer)? {
        Value::Remote(handle) => Ok(handle),
        other => Err(RemoteError::type_error(format!(
            "service {name} answered with {} instead of a handle",
            other.type_name()
        ))),
    }
}
