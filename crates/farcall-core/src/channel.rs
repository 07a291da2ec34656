//! Request/response correlation and routing on top of a transport.
//!
//! A [`Channel`] owns two background tasks:
//! - a writer draining an ordered outbound queue into the transport
//! - a reader routing every inbound envelope
//!
//! Responses resolve the pending request with the same correlation id.
//! `connect` requests go to the service registered under their name, and
//! per-object requests go to the subscription of their proxy id. Anything
//! that cannot be routed is answered with a thrown error rather than left
//! unanswered.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use farcall_protocol::{
    CorrelationId, Envelope, Message, MessageKind, ProxyId, ThrownError, WireValue,
};

use crate::bridge::ValueBridge;
use crate::config::ChannelConfig;
use crate::error::{RemoteError, RemoteResult};
use crate::lifetime::ExportRegistry;
use crate::transport::{Incoming, MemoryTransport, Transferable, Transport};

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Locks a std mutex, ignoring poisoning.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The answer to a request.
#[derive(Debug)]
pub struct Reply {
    pub value: WireValue,
    pub transfer: Vec<Transferable>,
}

enum Outbound {
    Send(Envelope, Vec<Transferable>),
    Close,
}

type Route = mpsc::UnboundedSender<Incoming>;

struct ChannelInner {
    id: u64,
    transport: Arc<dyn Transport>,
    outbound: mpsc::UnboundedSender<Outbound>,
    pending: Mutex<HashMap<CorrelationId, oneshot::Sender<Reply>>>,
    proxies: Mutex<HashMap<ProxyId, Route>>,
    services: Mutex<HashMap<String, Route>>,
    closed: watch::Sender<bool>,
    exports: Arc<ExportRegistry>,
    config: ChannelConfig,
}

/// A correlated, routed view of one transport.
///
/// Cloning is cheap; all clones share the same tasks and tables. Creating a
/// channel requires a running Tokio runtime.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Channel {
    /// Wraps a transport with the default configuration.
    pub fn new(transport: impl Transport) -> Self {
        Self::with_config(transport, ChannelConfig::default())
    }

    /// Wraps a transport.
    pub fn with_config(transport: impl Transport, config: ChannelConfig) -> Self {
        Self::start(Arc::new(transport), config, Arc::new(ExportRegistry::default()))
    }

    /// Opens a dedicated channel over a transferred port, sharing this
    /// channel's configuration and export registry.
    pub fn child(&self, port: MemoryTransport) -> Self {
        Self::start(
            Arc::new(port),
            self.inner.config.clone(),
            Arc::clone(&self.inner.exports),
        )
    }

    fn start(
        transport: Arc<dyn Transport>,
        config: ChannelConfig,
        exports: Arc<ExportRegistry>,
    ) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);
        let inner = Arc::new(ChannelInner {
            id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
            transport: Arc::clone(&transport),
            outbound,
            pending: Mutex::new(HashMap::new()),
            proxies: Mutex::new(HashMap::new()),
            services: Mutex::new(HashMap::new()),
            closed,
            exports,
            config,
        });

        debug!(channel = inner.id, "Channel opened");
        tokio::spawn(write_loop(inner.id, transport, outbound_rx));
        let channel = Self { inner };
        tokio::spawn(channel.clone().read_loop());
        channel
    }

    /// Process-unique channel id, used in logs and by the export registry.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The channel configuration.
    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    /// Objects exposed through this channel (and its dedicated children).
    pub fn exports(&self) -> &ExportRegistry {
        &self.inner.exports
    }

    /// Whether the underlying transport can move channel endpoints.
    pub fn supports_transfer(&self) -> bool {
        self.inner.transport.supports_transfer()
    }

    pub(crate) fn bridge(&self) -> ValueBridge<'_> {
        ValueBridge::new(self)
    }

    /// Sends a request and waits for its response.
    ///
    /// There is no timeout. If the transport goes away first the request
    /// stays pending; race it against [`Channel::closed`] where needed.
    pub async fn request(
        &self,
        message: Message,
        transfer: Vec<Transferable>,
    ) -> RemoteResult<Reply> {
        if self.is_closed() {
            return Err(RemoteError::ChannelClosed);
        }

        let envelope = Envelope::new(message);
        let id = envelope.id.clone();
        let (tx, rx) = oneshot::channel();
        lock(&self.inner.pending).insert(id.clone(), tx);

        debug!(
            channel = self.inner.id,
            request_id = %id,
            kind = %envelope.kind(),
            "Sending request"
        );
        if let Err(e) = self.enqueue(envelope, transfer) {
            lock(&self.inner.pending).remove(&id);
            return Err(e);
        }

        rx.await.map_err(|_| RemoteError::ChannelClosed)
    }

    /// Answers the request with the given id.
    pub fn respond(&self, id: CorrelationId, value: WireValue, transfer: Vec<Transferable>) {
        if let Err(e) = self.enqueue(Envelope::response(id.clone(), value), transfer) {
            debug!(channel = self.inner.id, request_id = %id, error = %e, "Dropping response");
        }
    }

    /// Queues a message that expects no answer. Never blocks.
    pub fn post(&self, message: Message) {
        let envelope = Envelope::new(message);
        let kind = envelope.kind();
        if let Err(e) = self.enqueue(envelope, Vec::new()) {
            debug!(channel = self.inner.id, %kind, error = %e, "Dropping notification");
        }
    }

    fn enqueue(&self, envelope: Envelope, transfer: Vec<Transferable>) -> RemoteResult<()> {
        self.inner
            .outbound
            .send(Outbound::Send(envelope, transfer))
            .map_err(|_| RemoteError::ChannelClosed)
    }

    /// Starts receiving requests addressed to `proxy_id`.
    pub(crate) fn subscribe_proxy(&self, proxy_id: ProxyId) -> mpsc::UnboundedReceiver<Incoming> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.inner.proxies).insert(proxy_id, tx);
        rx
    }

    pub(crate) fn unsubscribe_proxy(&self, proxy_id: &ProxyId) {
        lock(&self.inner.proxies).remove(proxy_id);
    }

    /// Starts receiving `connect` requests for the service `name`.
    pub(crate) fn subscribe_service(
        &self,
        name: &str,
    ) -> RemoteResult<mpsc::UnboundedReceiver<Incoming>> {
        let mut services = lock(&self.inner.services);
        if services.contains_key(name) {
            return Err(RemoteError::ServiceInUse {
                name: name.to_string(),
            });
        }
        let (tx, rx) = mpsc::unbounded_channel();
        services.insert(name.to_string(), tx);
        Ok(rx)
    }

    /// Resolves once the transport has closed.
    pub async fn closed(&self) {
        let mut rx = self.inner.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Returns true once the transport has closed.
    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// Closes the transport after all queued traffic has been written.
    pub fn close(&self) {
        let _ = self.inner.outbound.send(Outbound::Close);
    }

    async fn read_loop(self) {
        let id = self.inner.id;
        loop {
            match self.inner.transport.recv().await {
                Ok(Some(incoming)) => self.route(incoming),
                Ok(None) => {
                    debug!(channel = id, "Transport closed by peer");
                    break;
                }
                Err(e) if e.is_fatal() => {
                    warn!(channel = id, error = %e, "Transport failed");
                    break;
                }
                Err(e) => warn!(channel = id, error = %e, "Skipping undecodable message"),
            }
        }
        self.teardown();
    }

    fn route(&self, incoming: Incoming) {
        let channel = self.inner.id;
        let request_id = incoming.envelope.id.clone();
        let kind = incoming.envelope.kind();

        match &incoming.envelope.message {
            Message::Response { .. } => {
                let Some(waiter) = lock(&self.inner.pending).remove(&request_id) else {
                    warn!(channel, request_id = %request_id, "Response for unknown request");
                    return;
                };
                let Incoming { envelope, transfer } = incoming;
                if let Message::Response { value } = envelope.message {
                    // The waiter may have gone away; nothing to do then.
                    let _ = waiter.send(Reply { value, transfer });
                }
            }
            Message::Connect { name } => {
                let route = lock(&self.inner.services).get(name).cloned();
                let name = name.clone();
                if !deliver(route, incoming) {
                    warn!(channel, service = %name, "Connect to unknown service");
                    self.throw(
                        request_id,
                        ThrownError::unavailable(format!("no service named {name}")),
                    );
                }
            }
            Message::Unknown => {
                warn!(channel, request_id = %request_id, "Unknown message kind");
                self.throw(
                    request_id,
                    ThrownError::not_implemented("unsupported message kind"),
                );
            }
            message => {
                let Some(proxy_id) = message.proxy_id().cloned() else {
                    return;
                };
                let route = lock(&self.inner.proxies).get(&proxy_id).cloned();
                debug!(channel, request_id = %request_id, %kind, %proxy_id, "Routing request");
                if deliver(route, incoming) {
                    return;
                }
                if kind == MessageKind::ReleaseProxy {
                    debug!(channel, %proxy_id, "Release for unknown proxy");
                } else {
                    warn!(channel, %proxy_id, %kind, "Request for unknown proxy");
                    self.throw(
                        request_id,
                        ThrownError::unavailable(format!("proxy {proxy_id} is not exposed")),
                    );
                }
            }
        }
    }

    fn throw(&self, id: CorrelationId, error: ThrownError) {
        self.respond(id, WireValue::Thrown { error }, Vec::new());
    }

    fn teardown(&self) {
        let id = self.inner.id;
        let removed = self.inner.exports.remove_channel(id);
        lock(&self.inner.proxies).clear();
        lock(&self.inner.services).clear();
        self.inner.closed.send_replace(true);
        self.close();

        let pending = lock(&self.inner.pending).len();
        info!(channel = id, removed, pending, "Channel closed");
    }
}

fn deliver(route: Option<Route>, incoming: Incoming) -> bool {
    route.is_some_and(|route| route.send(incoming).is_ok())
}

async fn write_loop(
    channel: u64,
    transport: Arc<dyn Transport>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Send(envelope, transfer) => {
                let kind = envelope.kind();
                if let Err(e) = transport.send(envelope, transfer).await {
                    warn!(channel, %kind, error = %e, "Failed to send message");
                    if matches!(e, crate::error::TransportError::Closed) {
                        break;
                    }
                }
            }
            Outbound::Close => break,
        }
    }
    transport.close().await;
}
