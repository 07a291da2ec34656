//! Serving exposed objects.
//!
//! [`expose`] registers a named service that answers `connect`. Every
//! connect, and every value sent with a proxy mark, goes through
//! [`expose_at`], which allocates a proxy id and spawns a serve loop for it.
//! The loop handles each request on its own task, so slow calls never hold
//! up later requests.

use tracing::{Instrument, debug, debug_span, info};

use farcall_protocol::{Message, PropertyPath, ProxyId, WireValue};

use crate::channel::Channel;
use crate::error::{RemoteError, RemoteResult};
use crate::lifetime::ExportEntry;
use crate::transport::{Incoming, IntoChannel, Transferable};
use crate::value::{Value, mark_for_proxy};

/// Serves `value` to peers that connect to `name` on `channel`.
///
/// Each connect gets its own proxy id, released independently.
///
/// # Errors
///
/// Fails with [`RemoteError::ServiceInUse`] when `name` is already served on
/// this channel.
pub fn expose(value: impl Into<Value>, channel: impl IntoChannel, name: &str) -> RemoteResult<()> {
    let channel = channel.into_channel();
    let mut connects = channel.subscribe_service(name)?;
    let root = value.into();
    let service = name.to_string();
    info!(channel = channel.id(), service = %service, "Service exposed");

    tokio::spawn(async move {
        while let Some(incoming) = connects.recv().await {
            let mut transfer = Vec::new();
            let mut bridge = channel.bridge();
            let value = match bridge.to_wire(mark_for_proxy(root.clone()), &mut transfer) {
                Ok(value) => value,
                Err(e) => WireValue::Thrown {
                    error: e.to_thrown(),
                },
            };
            if channel.is_closed() {
                bridge.rollback();
                break;
            }
            debug!(channel = channel.id(), service = %service, "Answering connect");
            channel.respond(incoming.envelope.id, value, transfer);
        }
        debug!(service = %service, "Service stopped");
    });
    Ok(())
}

/// Exposes the member at `base` inside `root` on `channel` and returns its
/// new proxy id. `dedicated` closes the channel when the proxy is released.
pub(crate) fn expose_at(
    root: Value,
    base: PropertyPath,
    channel: &Channel,
    dedicated: bool,
) -> ProxyId {
    let proxy_id = ProxyId::fresh();
    let requests = channel.subscribe_proxy(proxy_id.clone());
    channel.exports().insert(
        proxy_id.clone(),
        ExportEntry {
            root,
            base,
            channel_id: channel.id(),
            task: None,
            dedicated,
        },
    );

    let span = debug_span!("export", channel = channel.id(), proxy_id = %proxy_id);
    let task = tokio::spawn(serve(channel.clone(), proxy_id.clone(), requests).instrument(span));
    channel.exports().attach_task(&proxy_id, task.abort_handle());
    debug!(channel = channel.id(), proxy_id = %proxy_id, dedicated, "Exposed object");
    proxy_id
}

/// Undoes an [`expose_at`] whose handle never reached the peer.
pub(crate) fn withdraw(channel: &Channel, proxy_id: &ProxyId) {
    channel.unsubscribe_proxy(proxy_id);
    if let Some(entry) = channel.exports().remove(proxy_id) {
        if let Some(task) = entry.task {
            task.abort();
        }
        if entry.dedicated {
            channel.close();
        }
    }
    debug!(channel = channel.id(), proxy_id = %proxy_id, "Withdrew export");
}

async fn serve(
    channel: Channel,
    proxy_id: ProxyId,
    mut requests: tokio::sync::mpsc::UnboundedReceiver<Incoming>,
) {
    while let Some(incoming) = requests.recv().await {
        if matches!(incoming.envelope.message, Message::ReleaseProxy { .. }) {
            channel.unsubscribe_proxy(&proxy_id);
            let dedicated = channel
                .exports()
                .remove(&proxy_id)
                .is_some_and(|entry| entry.dedicated);
            debug!("Proxy released");
            if dedicated {
                channel.close();
            }
            return;
        }

        tokio::spawn(handle_request(channel.clone(), proxy_id.clone(), incoming).in_current_span());
    }
}

async fn handle_request(channel: Channel, proxy_id: ProxyId, incoming: Incoming) {
    let Incoming { envelope, transfer } = incoming;
    let kind = envelope.kind();

    let result = match channel.exports().lookup(&proxy_id) {
        Some((root, base)) => dispatch(&channel, root, base, envelope.message, transfer).await,
        None => Err(RemoteError::Released {
            proxy_id: proxy_id.clone(),
        }),
    };

    let mut out = Vec::new();
    let mut bridge = channel.bridge();
    let value = match result.and_then(|value| bridge.to_wire(value, &mut out)) {
        Ok(_) if channel.is_closed() => {
            bridge.rollback();
            debug!(%kind, "Channel closed before the answer could be sent");
            return;
        }
        Ok(value) => value,
        Err(e) => {
            debug!(%kind, error = %e, "Request failed");
            out.clear();
            WireValue::Thrown {
                error: e.to_thrown(),
            }
        }
    };
    channel.respond(envelope.id, value, out);
}

async fn dispatch(
    channel: &Channel,
    root: Value,
    base: PropertyPath,
    message: Message,
    transfer: Vec<Transferable>,
) -> RemoteResult<Value> {
    match message {
        Message::Get { path, .. } => resolve(&root, &path.rebased(&base)).await,
        Message::Set { path, value, .. } => {
            let value = channel.bridge().lift(value, transfer)?;
            assign(&root, &path.rebased(&base), value).await.map(Value::Bool)
        }
        Message::Apply { path, args, .. } => {
            let args = channel.bridge().lift_all(args, transfer)?;
            apply(&root, &path.rebased(&base), args).await
        }
        Message::Construct { path, args, .. } => {
            let args = channel.bridge().lift_all(args, transfer)?;
            let instance = construct(&root, &path.rebased(&base), args).await?;
            Ok(mark_for_proxy(instance))
        }
        other => Err(RemoteError::Unsupported {
            operation: other.kind().as_str(),
        }),
    }
}

/// Reads `name` from `value`.
async fn member(value: &Value, name: &str) -> RemoteResult<Value> {
    match value {
        Value::Object(object) => object.get(name).await,
        Value::Map(map) => Ok(map.get(name).cloned().unwrap_or_default()),
        other => Err(RemoteError::type_error(format!(
            "cannot read {name} of {}",
            other.type_name()
        ))),
    }
}

async fn resolve(root: &Value, path: &PropertyPath) -> RemoteResult<Value> {
    let mut current = root.clone();
    for segment in path.segments() {
        current = member(&current, segment).await?;
    }
    Ok(current)
}

async fn assign(root: &Value, path: &PropertyPath, value: Value) -> RemoteResult<bool> {
    let Some((parent, name)) = path.split_last() else {
        return Err(RemoteError::type_error("cannot assign to the exposed object itself"));
    };
    match resolve(root, &parent).await? {
        Value::Object(object) => object.set(name, value).await,
        Value::Map(_) => Err(RemoteError::type_error(format!(
            "cannot set {name} on plain data, which is served by copy"
        ))),
        other => Err(RemoteError::type_error(format!(
            "cannot set {name} on {}",
            other.type_name()
        ))),
    }
}

async fn apply(root: &Value, path: &PropertyPath, args: Vec<Value>) -> RemoteResult<Value> {
    let Some((parent, name)) = path.split_last() else {
        return invoke(root, args).await;
    };
    match resolve(root, &parent).await? {
        Value::Object(object) => object.call(name, args).await,
        receiver => invoke(&member(&receiver, name).await?, args).await,
    }
}

async fn invoke(target: &Value, args: Vec<Value>) -> RemoteResult<Value> {
    match target {
        Value::Object(function) => function.invoke(args).await,
        other => Err(RemoteError::type_error(format!(
            "{} is not a function",
            other.type_name()
        ))),
    }
}

async fn construct(root: &Value, path: &PropertyPath, args: Vec<Value>) -> RemoteResult<Value> {
    let Some((parent, name)) = path.split_last() else {
        return instantiate(root, args).await;
    };
    match resolve(root, &parent).await? {
        Value::Object(object) => object.construct(name, args).await,
        receiver => instantiate(&member(&receiver, name).await?, args).await,
    }
}

async fn instantiate(target: &Value, args: Vec<Value>) -> RemoteResult<Value> {
    match target {
        Value::Object(class) => class.instantiate(args).await,
        other => Err(RemoteError::type_error(format!(
            "{} is not a constructor",
            other.type_name()
        ))),
    }
}
