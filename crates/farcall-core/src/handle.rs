//! Client-side stand-in for an exposed object.

use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tracing::debug;

use farcall_protocol::{Message, PropertyPath, ProxyId};

use crate::bridge::ValueBridge;
use crate::channel::Channel;
use crate::error::{RemoteError, RemoteResult};
use crate::lifetime::Lease;
use crate::transport::Transferable;
use crate::value::Value;

/// A path into an object exposed by the peer.
///
/// Member access is local: [`RemoteHandle::get`] only extends the path.
/// Traffic happens on [`call`](RemoteHandle::call),
/// [`construct`](RemoteHandle::construct), [`set`](RemoteHandle::set) and
/// when the handle is awaited.
///
/// ```ignore
/// let remote = farcall_core::connect(transport, "default").await?;
/// let sum = remote.get("add").call(vec![2.into(), 3.into()]).await?;
/// let version = remote.get("version").await?;
/// ```
///
/// Clones and sub-path handles share one lease; the peer is told to release
/// the object once the last of them is dropped.
#[derive(Clone)]
pub struct RemoteHandle {
    lease: Arc<Lease>,
    path: PropertyPath,
}

impl RemoteHandle {
    pub(crate) fn new(lease: Lease) -> Self {
        Self {
            lease: Arc::new(lease),
            path: PropertyPath::root(),
        }
    }

    /// Identifier of the exposed object.
    pub fn proxy_id(&self) -> &ProxyId {
        self.lease.proxy_id()
    }

    /// Path of this handle inside the exposed object.
    pub fn path(&self) -> &PropertyPath {
        &self.path
    }

    /// Returns a handle to member `name`. No traffic.
    #[must_use]
    pub fn get(&self, name: impl Into<String>) -> Self {
        Self {
            lease: Arc::clone(&self.lease),
            path: self.path.child(name),
        }
    }

    /// Calls the function at this path.
    pub async fn call(&self, args: Vec<Value>) -> RemoteResult<Value> {
        let channel = self.live()?;
        let mut bridge = channel.bridge();
        let mut transfer = Vec::new();
        let args = bridge.to_wire_all(args, &mut transfer)?;
        self.round_trip(
            bridge,
            Message::Apply {
                proxy_id: self.proxy_id().clone(),
                path: self.path.clone(),
                args,
            },
            transfer,
        )
        .await
    }

    /// Calls method `name` of the object at this path.
    pub async fn call_method(&self, name: &str, args: Vec<Value>) -> RemoteResult<Value> {
        self.get(name).call(args).await
    }

    /// Instantiates the constructor at this path. The instance always comes
    /// back by reference.
    pub async fn construct(&self, args: Vec<Value>) -> RemoteResult<RemoteHandle> {
        let channel = self.live()?;
        let mut bridge = channel.bridge();
        let mut transfer = Vec::new();
        let args = bridge.to_wire_all(args, &mut transfer)?;
        let value = self
            .round_trip(
                bridge,
                Message::Construct {
                    proxy_id: self.proxy_id().clone(),
                    path: self.path.clone(),
                    args,
                },
                transfer,
            )
            .await?;
        match value {
            Value::Remote(handle) => Ok(handle),
            other => Err(RemoteError::type_error(format!(
                "construct answered with {} instead of a handle",
                other.type_name()
            ))),
        }
    }

    /// Assigns member `name` of the object at this path. Returns whether the
    /// peer accepted the assignment.
    ///
    /// Assigning into plain data (a map member) fails with a thrown type
    /// error, since the peer only ever hands out copies of it.
    pub async fn set(&self, name: impl Into<String>, value: impl Into<Value>) -> RemoteResult<bool> {
        let channel = self.live()?;
        let mut bridge = channel.bridge();
        let mut transfer = Vec::new();
        let value = bridge.to_wire(value.into(), &mut transfer)?;
        let answer = self
            .round_trip(
                bridge,
                Message::Set {
                    proxy_id: self.proxy_id().clone(),
                    path: self.path.child(name),
                    value,
                },
                transfer,
            )
            .await?;
        answer.as_bool().ok_or_else(|| {
            RemoteError::type_error(format!(
                "set answered with {} instead of a bool",
                answer.type_name()
            ))
        })
    }

    /// Reads the value at this path.
    ///
    /// At the root this is the handle itself and nothing is sent.
    pub async fn resolve(&self) -> RemoteResult<Value> {
        let channel = self.live()?;
        if self.path.is_root() {
            return Ok(Value::Remote(self.clone()));
        }
        self.round_trip(
            channel.bridge(),
            Message::Get {
                proxy_id: self.proxy_id().clone(),
                path: self.path.clone(),
            },
            Vec::new(),
        )
        .await
    }

    /// Deleting members through a handle is not supported.
    pub fn delete(&self, _name: &str) -> RemoteResult<bool> {
        self.live()?;
        Err(RemoteError::Unsupported {
            operation: "delete",
        })
    }

    /// Enumerating members through a handle is not supported.
    pub fn keys(&self) -> RemoteResult<Vec<String>> {
        self.live()?;
        Err(RemoteError::Unsupported {
            operation: "keys",
        })
    }

    /// Releases the exposed object now, for this handle and every handle
    /// sharing its lease. Later use fails locally.
    pub fn release(&self) {
        self.lease.release();
    }

    pub fn is_released(&self) -> bool {
        self.lease.is_released()
    }

    fn live(&self) -> RemoteResult<&Channel> {
        if self.lease.is_released() {
            return Err(RemoteError::Released {
                proxy_id: self.proxy_id().clone(),
            });
        }
        let channel = self.lease.channel();
        if channel.is_closed() {
            return Err(RemoteError::ChannelClosed);
        }
        Ok(channel)
    }

    /// Sends `message`, whose values `bridge` lowered. If it never leaves,
    /// everything the bridge exposed for it is withdrawn.
    async fn round_trip(
        &self,
        mut bridge: ValueBridge<'_>,
        message: Message,
        transfer: Vec<Transferable>,
    ) -> RemoteResult<Value> {
        let channel = self.lease.channel();
        debug!(
            channel = channel.id(),
            proxy_id = %self.proxy_id(),
            path = %self.path,
            kind = %message.kind(),
            "Remote operation"
        );
        let reply = match channel.request(message, transfer).await {
            Ok(reply) => reply,
            Err(e) => {
                bridge.rollback();
                return Err(e);
            }
        };
        bridge.lift(reply.value, reply.transfer)
    }
}

impl IntoFuture for RemoteHandle {
    type Output = RemoteResult<Value>;
    type IntoFuture = BoxFuture<'static, RemoteResult<Value>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.resolve().await })
    }
}

impl fmt::Debug for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteHandle")
            .field("proxy_id", self.proxy_id())
            .field("path", &self.path)
            .field("released", &self.is_released())
            .finish()
    }
}
