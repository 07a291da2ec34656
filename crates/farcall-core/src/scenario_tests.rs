//! End-to-end scenarios: one exposing peer and one driving peer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use farcall_protocol::{
    CorrelationId, Envelope, ErrorCode, Message, MessageKind, PropertyPath, ProxyId, WireValue,
};

use crate::error::{RemoteError, RemoteResult, TransportResult};
use crate::transport::{Incoming, StreamTransport, Transferable, Transport};
use crate::{
    Channel, ChannelConfig, DynObject, MemoryTransport, RemoteObject, Value, connect, expose,
    mark_for_proxy, mark_for_serialization, mark_for_transfer,
};

fn sum(args: Vec<Value>) -> RemoteResult<Value> {
    Ok(args.iter().filter_map(Value::as_i64).sum::<i64>().into())
}

fn service() -> DynObject {
    DynObject::new()
        .with_method("add", sum)
        .with_property("counter", 0)
        .with_object(
            "a",
            DynObject::new().with_object("b", DynObject::new().with_method("c", |_| Ok(42.into()))),
        )
        .with_method("fail", |_| Err(RemoteError::failed("boom")))
        .with_constructor("Counter", |args| {
            let start = args.first().and_then(Value::as_i64).unwrap_or(0);
            Ok(DynObject::new().with_property("n", start).into())
        })
        .with_method("live", |_| Ok(mark_for_proxy(DynObject::new().with_property("value", 1))))
        .with_method("copy", |_| Ok(Value::map([("value", 1)])))
}

fn multiplexed() -> ChannelConfig {
    ChannelConfig::default().with_sub_channels(false)
}

/// Waits until `condition` holds, failing the test after two seconds.
async fn eventually(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Counts every envelope sent through it, by kind.
#[derive(Clone)]
struct Spy {
    inner: MemoryTransport,
    sent: Arc<Mutex<HashMap<MessageKind, usize>>>,
}

impl Spy {
    fn new(inner: MemoryTransport) -> Self {
        Self {
            inner,
            sent: Arc::default(),
        }
    }

    fn count(&self, kind: MessageKind) -> usize {
        self.sent.lock().unwrap().get(&kind).copied().unwrap_or(0)
    }

    fn total(&self) -> usize {
        self.sent.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl Transport for Spy {
    async fn send(&self, envelope: Envelope, transfer: Vec<Transferable>) -> TransportResult<()> {
        *self.sent.lock().unwrap().entry(envelope.kind()).or_default() += 1;
        self.inner.send(envelope, transfer).await
    }

    async fn recv(&self) -> TransportResult<Option<Incoming>> {
        self.inner.recv().await
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}

/// Holds back the first response once armed and sends it after the next.
struct Swapping {
    inner: MemoryTransport,
    armed: AtomicBool,
    held: Mutex<Option<Envelope>>,
    swaps: AtomicUsize,
}

#[async_trait]
impl Transport for Swapping {
    async fn send(&self, envelope: Envelope, transfer: Vec<Transferable>) -> TransportResult<()> {
        if !self.armed.load(Ordering::SeqCst) || envelope.kind() != MessageKind::Response {
            return self.inner.send(envelope, transfer).await;
        }
        let first = {
            let mut held = self.held.lock().unwrap();
            match held.take() {
                None => {
                    *held = Some(envelope);
                    return Ok(());
                }
                Some(first) => first,
            }
        };
        self.swaps.fetch_add(1, Ordering::SeqCst);
        self.inner.send(envelope, transfer).await?;
        self.inner.send(first, Vec::new()).await
    }

    async fn recv(&self) -> TransportResult<Option<Incoming>> {
        self.inner.recv().await
    }
}

/// Exposes `service()` on a multiplexed server channel and connects through
/// a spy.
async fn spied() -> (crate::RemoteHandle, Spy, Channel) {
    let (server_end, client_end) = MemoryTransport::pair();
    let server = Channel::with_config(server_end, multiplexed());
    expose(service(), &server, "default").unwrap();

    let spy = Spy::new(client_end);
    let client = Channel::with_config(spy.clone(), multiplexed());
    let remote = connect(&client, "default").await.unwrap();
    (remote, spy, server)
}

#[tokio::test]
async fn flat_call_round_trip() {
    let (server, client) = MemoryTransport::pair();
    expose(service(), server, "default").unwrap();

    let remote = connect(client, "default").await.unwrap();
    let result = remote.get("add").call(vec![2.into(), 3.into()]).await.unwrap();
    assert_eq!(result.as_i64(), Some(5));
}

#[tokio::test]
async fn nested_path_sends_nothing_before_apply() {
    let (remote, spy, _server) = spied().await;
    let before = spy.total();

    let c = remote.get("a").get("b").get("c");
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(spy.total(), before);

    let result = c.call(Vec::new()).await.unwrap();
    assert_eq!(result.as_i64(), Some(42));
    assert_eq!(spy.count(MessageKind::Apply), 1);
}

#[tokio::test]
async fn assignment_is_observed_by_the_exposer() {
    let object = Arc::new(service());
    let shared: Arc<dyn RemoteObject> = object.clone();

    let (server, client) = MemoryTransport::pair();
    expose(shared, server, "default").unwrap();
    let remote = connect(client, "default").await.unwrap();

    assert!(remote.set("counter", 5).await.unwrap());
    assert_eq!(object.property("counter").await, Some(Value::from(5)));
    assert_eq!(remote.get("counter").await.unwrap().as_i64(), Some(5));
}

#[tokio::test]
async fn construction_returns_a_new_handle() {
    let (server, client) = MemoryTransport::pair();
    expose(service(), server, "default").unwrap();
    let remote = connect(client, "default").await.unwrap();

    let counter = remote.get("Counter").construct(vec![10.into()]).await.unwrap();
    assert_ne!(counter.proxy_id(), remote.proxy_id());
    assert_eq!(counter.get("n").await.unwrap().as_i64(), Some(10));
}

#[tokio::test]
async fn constructed_instances_accept_assignment() {
    let (server, client) = MemoryTransport::pair();
    expose(service(), server, "default").unwrap();
    let remote = connect(client, "default").await.unwrap();

    let counter = remote.get("Counter").construct(vec![10.into()]).await.unwrap();
    assert!(counter.set("n", 11).await.unwrap());
    assert_eq!(counter.get("n").await.unwrap().as_i64(), Some(11));

    let other = remote.get("Counter").construct(vec![1.into()]).await.unwrap();
    assert_eq!(other.get("n").await.unwrap().as_i64(), Some(1));
}

#[tokio::test]
async fn assigning_into_copied_data_is_a_type_error() {
    let object = DynObject::new().with_property("settings", Value::map([("depth", 1)]));
    let (server, client) = MemoryTransport::pair();
    expose(object, server, "default").unwrap();
    let remote = connect(client, "default").await.unwrap();

    let error = remote.get("settings").set("depth", 2).await.unwrap_err();
    assert!(matches!(error, RemoteError::Thrown(ref e) if e.code == ErrorCode::TypeError));
}

#[tokio::test]
async fn dropping_every_reference_releases_once() {
    let (remote, spy, server) = spied().await;
    assert_eq!(server.exports().len(), 1);

    let copy = remote.clone();
    let member = remote.get("add");
    drop(remote);
    drop(copy);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(spy.count(MessageKind::ReleaseProxy), 0);

    drop(member);
    eventually("release", || spy.count(MessageKind::ReleaseProxy) == 1).await;
    eventually("export removal", || server.exports().is_empty()).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(spy.count(MessageKind::ReleaseProxy), 1);
}

#[tokio::test]
async fn use_after_release_is_a_local_error() {
    let (remote, spy, _server) = spied().await;
    let add = remote.get("add");
    remote.release();

    let error = add.call(vec![1.into()]).await.unwrap_err();
    assert!(matches!(error, RemoteError::Released { .. }));
    assert!(error.is_local_usage());
    assert_eq!(spy.count(MessageKind::Apply), 0);

    drop(add);
    drop(remote);
    eventually("release", || spy.count(MessageKind::ReleaseProxy) == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(spy.count(MessageKind::ReleaseProxy), 1);
}

#[tokio::test]
async fn released_sub_channel_handles_close_their_channel() {
    let (server_end, client_end) = MemoryTransport::pair();
    let server = Channel::new(server_end);
    expose(service(), &server, "default").unwrap();
    let remote = connect(client_end, "default").await.unwrap();

    let counter = remote.get("Counter").construct(vec![10.into()]).await.unwrap();
    let n = counter.get("n");
    assert_eq!(server.exports().len(), 2);

    counter.release();
    assert!(n.is_released());
    assert!(matches!(n.clone().await, Err(RemoteError::Released { .. })));
    let error = counter.get("increment").call(Vec::new()).await.unwrap_err();
    assert!(error.is_local_usage());

    eventually("instance export removal", || server.exports().len() == 1).await;
    assert!(server.exports().contains(remote.proxy_id()));
    assert_eq!(remote.get("add").call(vec![1.into()]).await.unwrap().as_i64(), Some(1));
}

#[tokio::test]
async fn transferred_resources_reach_the_caller() {
    let object = DynObject::new().with_method("snapshot", |_| {
        Ok(mark_for_transfer(1, vec![Transferable::Buffer(vec![1, 2, 3])]))
    });
    let (server, client) = MemoryTransport::pair();
    expose(object, server, "default").unwrap();
    let remote = connect(client, "default").await.unwrap();

    let value = remote.get("snapshot").call(Vec::new()).await.unwrap();
    assert_eq!(value.as_i64(), Some(1));
    assert!(matches!(value.resources(), [Transferable::Buffer(b)] if b == &[1, 2, 3]));
}

#[tokio::test]
async fn transferred_arguments_reach_the_exposed_object() {
    let object = DynObject::new()
        .with_method("size", |args| {
            let moved = args.first().map(Value::resources).unwrap_or_default();
            let bytes: usize = moved
                .iter()
                .map(|r| match r {
                    Transferable::Buffer(b) => b.len(),
                    Transferable::Port { .. } => 0,
                })
                .sum();
            Ok((bytes as u64).into())
        })
        .with_method("keep", |mut args| Ok(args.pop().unwrap_or_default()));
    let (server, client) = MemoryTransport::pair();
    expose(object, server, "default").unwrap();
    let remote = connect(client, "default").await.unwrap();

    let payload = || mark_for_transfer("frame", vec![Transferable::Buffer(vec![0; 5])]);
    let size = remote.get("size").call(vec![payload()]).await.unwrap();
    assert_eq!(size.as_i64(), Some(5));

    let back = remote.get("keep").call(vec![payload()]).await.unwrap();
    assert_eq!(back.as_str(), Some("frame"));
    assert_eq!(back.resources().len(), 1);
}

#[tokio::test]
async fn failed_answers_withdraw_their_exports() {
    let object = DynObject::new().with_method("mixed", |_| {
        Ok(mark_for_serialization(
            Value::List(vec![
                mark_for_proxy(DynObject::new()),
                Value::object(DynObject::new()),
            ]),
            Default::default(),
        ))
    });
    let (server_end, client_end) = MemoryTransport::pair();
    let server = Channel::with_config(server_end, multiplexed());
    expose(object, &server, "default").unwrap();
    let remote = connect(client_end, "default").await.unwrap();
    assert_eq!(server.exports().len(), 1);

    let error = remote.get("mixed").call(Vec::new()).await.unwrap_err();
    assert!(matches!(error, RemoteError::Thrown(ref e) if e.code == ErrorCode::Internal));
    assert_eq!(server.exports().len(), 1);
}

#[tokio::test]
async fn failed_arguments_withdraw_their_exports() {
    for config in [ChannelConfig::default(), multiplexed()] {
        let (server, client_end) = MemoryTransport::pair();
        expose(service(), server, "default").unwrap();
        let client = Channel::with_config(client_end, config);
        let remote = connect(&client, "default").await.unwrap();

        let error = remote
            .get("add")
            .call(vec![
                mark_for_proxy(DynObject::new()),
                Value::object(DynObject::new()),
            ])
            .await
            .unwrap_err();
        assert!(matches!(error, RemoteError::Bridge(_)));
        assert!(client.exports().is_empty());
    }
}

#[tokio::test]
async fn calls_on_a_closed_channel_expose_nothing() {
    let (server_end, client_end) = MemoryTransport::pair();
    let server = Channel::with_config(server_end, multiplexed());
    expose(service(), &server, "default").unwrap();
    let client = Channel::with_config(client_end, multiplexed());
    let remote = connect(&client, "default").await.unwrap();

    server.close();
    client.closed().await;

    let error = remote
        .get("add")
        .call(vec![mark_for_proxy(DynObject::new())])
        .await
        .unwrap_err();
    assert!(matches!(error, RemoteError::ChannelClosed));
    assert!(client.exports().is_empty());
}

#[tokio::test]
async fn remote_errors_propagate_and_serving_continues() {
    let (server, client) = MemoryTransport::pair();
    expose(service(), server, "default").unwrap();
    let remote = connect(client, "default").await.unwrap();

    let error = remote.get("fail").call(Vec::new()).await.unwrap_err();
    let RemoteError::Thrown(ref thrown) = error else {
        panic!("expected a thrown error, got {error:?}");
    };
    assert_eq!(thrown.code, ErrorCode::Remote);
    assert!(error.to_string().contains("boom"));
    assert!(!error.is_local_usage());

    let error = remote.get("counter").call(Vec::new()).await.unwrap_err();
    assert!(matches!(error, RemoteError::Thrown(ref e) if e.code == ErrorCode::TypeError));

    let result = remote.get("add").call(vec![1.into(), 1.into()]).await.unwrap();
    assert_eq!(result.as_i64(), Some(2));
}

#[tokio::test]
async fn marked_values_arrive_as_handles_and_unmarked_as_copies() {
    let (server, client) = MemoryTransport::pair();
    expose(service(), server, "default").unwrap();
    let remote = connect(client, "default").await.unwrap();

    let live = remote.get("live").call(Vec::new()).await.unwrap();
    let handle = live.into_handle().expect("proxy-marked value arrives as a handle");
    assert_eq!(handle.get("value").await.unwrap().as_i64(), Some(1));

    let copy = remote.get("copy").call(Vec::new()).await.unwrap();
    assert_eq!(copy, Value::map([("value", 1)]));
}

#[tokio::test]
async fn responses_are_matched_by_correlation_id() {
    let (server_end, client_end) = MemoryTransport::pair();
    let swapping = Arc::new(Swapping {
        inner: server_end,
        armed: AtomicBool::new(false),
        held: Mutex::new(None),
        swaps: AtomicUsize::new(0),
    });
    let server = Channel::with_config(SharedSwapping(Arc::clone(&swapping)), multiplexed());
    expose(service(), &server, "default").unwrap();

    let remote = connect(client_end, "default").await.unwrap();
    swapping.armed.store(true, Ordering::SeqCst);

    let add = remote.get("add");
    let (small, large) = tokio::join!(
        add.call(vec![1.into(), 2.into()]),
        add.call(vec![10.into(), 20.into()]),
    );
    assert_eq!(small.unwrap().as_i64(), Some(3));
    assert_eq!(large.unwrap().as_i64(), Some(30));
    assert_eq!(swapping.swaps.load(Ordering::SeqCst), 1);
}

struct SharedSwapping(Arc<Swapping>);

#[async_trait]
impl Transport for SharedSwapping {
    async fn send(&self, envelope: Envelope, transfer: Vec<Transferable>) -> TransportResult<()> {
        self.0.send(envelope, transfer).await
    }

    async fn recv(&self) -> TransportResult<Option<Incoming>> {
        self.0.recv().await
    }
}

#[tokio::test]
async fn sub_channel_mode_serves_and_releases() {
    let (server_end, client_end) = MemoryTransport::pair();
    let server = Channel::new(server_end);
    expose(service(), &server, "default").unwrap();

    let client_spy = Spy::new(client_end);
    let client = Channel::new(client_spy.clone());
    let remote = connect(&client, "default").await.unwrap();
    assert!(server.exports().contains(remote.proxy_id()));

    let result = remote.get("add").call(vec![4.into(), 5.into()]).await.unwrap();
    assert_eq!(result.as_i64(), Some(9));
    let counter = remote.get("Counter").construct(vec![3.into()]).await.unwrap();
    assert_eq!(counter.get("n").await.unwrap().as_i64(), Some(3));
    assert_eq!(server.exports().len(), 2);

    // Only the connect crossed the original channel.
    assert_eq!(client_spy.total(), 1);

    drop(counter);
    drop(remote);
    eventually("export removal", || server.exports().is_empty()).await;
    assert_eq!(client_spy.count(MessageKind::ReleaseProxy), 0);
}

#[tokio::test]
async fn byte_stream_transport_multiplexes() {
    let (left, right) = tokio::io::duplex(64 * 1024);
    let (lr, lw) = tokio::io::split(left);
    let (rr, rw) = tokio::io::split(right);

    expose(service(), StreamTransport::new(rr, rw), "default").unwrap();
    let remote = connect(StreamTransport::new(lr, lw), "default").await.unwrap();

    let result = remote.get("a").get("b").get("c").call(Vec::new()).await.unwrap();
    assert_eq!(result.as_i64(), Some(42));

    let counter = remote.get("Counter").construct(vec![10.into()]).await.unwrap();
    assert_eq!(counter.get("n").await.unwrap().as_i64(), Some(10));
}

#[tokio::test]
async fn awaiting_a_root_handle_sends_nothing() {
    let (remote, spy, _server) = spied().await;
    let live = remote
        .get("live")
        .call(Vec::new())
        .await
        .unwrap()
        .into_handle()
        .unwrap();
    let before = spy.total();

    let resolved = remote.clone().await.unwrap();
    assert_eq!(resolved, Value::Remote(remote.clone()));
    let resolved = live.clone().await.unwrap();
    assert_eq!(resolved, Value::Remote(live.clone()));

    assert_eq!(spy.total(), before);
    assert_eq!(spy.count(MessageKind::Get), 0);

    assert_eq!(live.get("value").await.unwrap().as_i64(), Some(1));
    assert_eq!(spy.count(MessageKind::Get), 1);
}

#[tokio::test]
async fn serialized_values_carry_nested_handles() {
    let greeter: Arc<dyn RemoteObject> =
        Arc::new(DynObject::new().with_method("greet", |_| Ok("hi".into())));
    let object = DynObject::new().with_method("profile", move |_| {
        Ok(mark_for_serialization(
            Value::map([
                ("name", Value::from("ada")),
                ("greeter", mark_for_proxy(Arc::clone(&greeter))),
            ]),
            Default::default(),
        ))
    });

    let (server, client) = MemoryTransport::pair();
    expose(object, server, "default").unwrap();
    let remote = connect(client, "default").await.unwrap();

    let Value::Map(profile) = remote.get("profile").call(Vec::new()).await.unwrap() else {
        panic!("expected a map");
    };
    assert_eq!(profile["name"], Value::from("ada"));
    let greeter = profile["greeter"].as_handle().unwrap();
    let greeting = greeter.get("greet").call(Vec::new()).await.unwrap();
    assert_eq!(greeting.as_str(), Some("hi"));
}

#[tokio::test]
async fn proxied_arguments_are_called_back() {
    let object = DynObject::new().with_async_method("twice", |args| async move {
        let callback = args
            .first()
            .and_then(Value::as_handle)
            .ok_or_else(|| RemoteError::type_error("expected a callback"))?
            .clone();
        let once = callback.call(vec![args[1].clone()]).await?;
        callback.call(vec![once]).await
    });

    let (server, client) = MemoryTransport::pair();
    expose(object, server, "default").unwrap();
    let remote = connect(client, "default").await.unwrap();

    let double = crate::RemoteFn::from_sync(|args| {
        Ok((args.first().and_then(Value::as_i64).unwrap_or(0) * 2).into())
    });
    let result = remote
        .get("twice")
        .call(vec![mark_for_proxy(Value::object(double)), 3.into()])
        .await
        .unwrap();
    assert_eq!(result.as_i64(), Some(12));
}

#[tokio::test]
async fn unknown_proxy_is_unavailable() {
    let (server_end, client_end) = MemoryTransport::pair();
    let server = Channel::new(server_end);
    expose(service(), &server, "default").unwrap();

    let client = Channel::new(client_end);
    let reply = client
        .request(
            Message::Get {
                proxy_id: ProxyId::from("missing"),
                path: PropertyPath::root(),
            },
            Vec::new(),
        )
        .await
        .unwrap();
    assert!(matches!(
        reply.value,
        WireValue::Thrown { ref error } if error.code == ErrorCode::Unavailable
    ));

    let remote = connect(&client, "default").await.unwrap();
    let result = remote.get("add").call(vec![2.into(), 2.into()]).await.unwrap();
    assert_eq!(result.as_i64(), Some(4));
}

#[tokio::test]
async fn released_proxy_answers_unavailable() {
    let (server_end, client_end) = MemoryTransport::pair();
    let server = Channel::with_config(server_end, multiplexed());
    expose(service(), &server, "default").unwrap();

    let client = Channel::with_config(client_end, multiplexed());
    let remote = connect(&client, "default").await.unwrap();
    let proxy_id = remote.proxy_id().clone();
    remote.release();
    eventually("export removal", || !server.exports().contains(&proxy_id)).await;

    let reply = client
        .request(
            Message::Get {
                proxy_id,
                path: PropertyPath::parse_dotted("counter"),
            },
            Vec::new(),
        )
        .await
        .unwrap();
    assert!(matches!(
        reply.value,
        WireValue::Thrown { ref error } if error.code == ErrorCode::Unavailable
    ));
}

#[tokio::test]
async fn unknown_kind_is_not_implemented() {
    let (left, right) = tokio::io::duplex(64 * 1024);
    let (rr, rw) = tokio::io::split(right);
    expose(service(), StreamTransport::new(rr, rw), "default").unwrap();

    let (lr, mut lw) = tokio::io::split(left);
    let payload = br#"{"id":"x-1","type":"subscribe","topic":"news"}"#;
    lw.write_all(&(payload.len() as u32).to_be_bytes()).await.unwrap();
    lw.write_all(payload).await.unwrap();

    let reader = StreamTransport::new(lr, tokio::io::sink());
    let answer = reader.recv().await.unwrap().unwrap();
    assert_eq!(answer.envelope.id, CorrelationId::from("x-1"));
    assert!(matches!(
        answer.envelope.message,
        Message::Response { value: WireValue::Thrown { ref error } } if error.code == ErrorCode::NotImplemented
    ));
}

#[tokio::test]
async fn connecting_to_a_missing_service_fails() {
    let (server, client) = MemoryTransport::pair();
    expose(service(), server, "default").unwrap();

    let error = connect(client, "nope").await.unwrap_err();
    assert!(matches!(error, RemoteError::Thrown(ref e) if e.code == ErrorCode::Unavailable));
}

#[tokio::test]
async fn closing_the_transport_tears_down_exports() {
    let (server_end, client_end) = MemoryTransport::pair();
    let server = Channel::with_config(server_end, multiplexed());
    expose(service(), &server, "default").unwrap();

    let client = Channel::with_config(client_end, multiplexed());
    let _remote = connect(&client, "default").await.unwrap();
    assert_eq!(server.exports().len(), 1);

    client.close();
    server.closed().await;
    assert!(server.exports().is_empty());
}
