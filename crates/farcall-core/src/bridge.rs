//! Conversion between [`Value`]s and [`WireValue`]s for one channel.
//!
//! Outbound, the mark decides the wire form: a proxy mark exposes the target
//! and sends its id, a serialization mark goes through the codec, and plain
//! data goes out raw. Nested marks inside a serialized value are bridged on
//! their own and embedded as [`Structured::Remote`] nodes.

use farcall_protocol::{PropertyPath, ProxyId, Structured, WireValue};
use tracing::{debug, warn};

use crate::channel::Channel;
use crate::error::{RemoteError, RemoteResult};
use crate::exposer::{expose_at, withdraw};
use crate::handle::RemoteHandle;
use crate::lifetime::Lease;
use crate::transport::{MemoryTransport, Transferable};
use crate::value::{Proxied, Serialized, Transferred, Value, mark_for_transfer};

/// Lowers and lifts values for one channel.
///
/// Every export made while lowering is recorded. A failed [`to_wire`]
/// withdraws all of them, and callers whose message never leaves call
/// [`rollback`] themselves.
///
/// [`to_wire`]: ValueBridge::to_wire
/// [`rollback`]: ValueBridge::rollback
pub(crate) struct ValueBridge<'a> {
    channel: &'a Channel,
    exported: Vec<(Channel, ProxyId)>,
}

impl<'a> ValueBridge<'a> {
    pub(crate) fn new(channel: &'a Channel) -> Self {
        Self {
            channel,
            exported: Vec::new(),
        }
    }

    /// Lowers `value`, pushing any resources it moves onto `transfer`.
    pub(crate) fn to_wire(
        &mut self,
        value: Value,
        transfer: &mut Vec<Transferable>,
    ) -> RemoteResult<WireValue> {
        let lowered = self.lower(value, transfer);
        if lowered.is_err() {
            self.rollback();
        }
        lowered
    }

    /// Lowers each argument. Nothing stays exposed if any of them fails.
    pub(crate) fn to_wire_all(
        &mut self,
        values: Vec<Value>,
        transfer: &mut Vec<Transferable>,
    ) -> RemoteResult<Vec<WireValue>> {
        values
            .into_iter()
            .map(|value| self.to_wire(value, transfer))
            .collect()
    }

    /// Withdraws every export made by this bridge.
    pub(crate) fn rollback(&mut self) {
        for (channel, proxy_id) in self.exported.drain(..) {
            withdraw(&channel, &proxy_id);
        }
    }

    fn lower(&mut self, value: Value, transfer: &mut Vec<Transferable>) -> RemoteResult<WireValue> {
        match value {
            Value::Proxied(Proxied { target, path }) => Ok(self.export(*target, path, transfer)),
            Value::Serialized(Serialized { value, options }) => {
                let tree = self.to_structured(*value, transfer)?;
                let bytes = self.channel.config().codec.serialize(&tree, &options)?;
                Ok(WireValue::Serialized { bytes, options })
            }
            Value::Transferred(Transferred { value, resources }) => {
                transfer.extend(resources);
                self.lower(*value, transfer)
            }
            Value::Object(_) => Err(RemoteError::bridge(
                "local objects must be marked for proxy",
            )),
            Value::Remote(handle) => Err(RemoteError::bridge(format!(
                "handle {} belongs to the peer and cannot be sent back",
                handle.proxy_id()
            ))),
            data => Ok(WireValue::Raw {
                value: data.to_json()?,
            }),
        }
    }

    fn export(
        &mut self,
        target: Value,
        path: PropertyPath,
        transfer: &mut Vec<Transferable>,
    ) -> WireValue {
        if self.channel.supports_transfer() && self.channel.config().sub_channels {
            let (local, remote) = MemoryTransport::pair();
            let child = self.channel.child(local);
            let id = expose_at(target, path, &child, true);
            let key = id.to_string();
            debug!(channel = child.id(), proxy_id = %id, "Exposed on dedicated channel");
            self.exported.push((child, id.clone()));
            transfer.push(Transferable::Port {
                key: key.clone(),
                port: remote,
            });
            WireValue::Proxy {
                id,
                channel_hint: Some(key),
            }
        } else {
            let id = expose_at(target, path, self.channel, false);
            self.exported.push((self.channel.clone(), id.clone()));
            WireValue::Proxy {
                id,
                channel_hint: None,
            }
        }
    }

    fn to_structured(
        &mut self,
        value: Value,
        transfer: &mut Vec<Transferable>,
    ) -> RemoteResult<Structured> {
        Ok(match value {
            Value::Null => Structured::Null,
            Value::Bool(b) => Structured::Bool(b),
            Value::Number(n) => Structured::Number(n),
            Value::String(s) => Structured::String(s),
            Value::List(items) => Structured::List(
                items
                    .into_iter()
                    .map(|item| self.to_structured(item, transfer))
                    .collect::<RemoteResult<_>>()?,
            ),
            Value::Map(map) => Structured::Map(
                map.into_iter()
                    .map(|(k, v)| Ok((k, self.to_structured(v, transfer)?)))
                    .collect::<RemoteResult<_>>()?,
            ),
            other => Structured::Remote(Box::new(self.lower(other, transfer)?)),
        })
    }

    /// Lifts a whole received value. Resources not claimed by a handle stay
    /// with the value as a transfer mark.
    pub(crate) fn lift(
        &self,
        wire: WireValue,
        mut transfer: Vec<Transferable>,
    ) -> RemoteResult<Value> {
        let value = self.from_wire(wire, &mut transfer)?;
        Ok(if transfer.is_empty() {
            value
        } else {
            mark_for_transfer(value, transfer)
        })
    }

    /// Lifts received arguments. Unclaimed resources go with the last
    /// argument, or with a trailing `Null` when there are none.
    pub(crate) fn lift_all(
        &self,
        wires: Vec<WireValue>,
        mut transfer: Vec<Transferable>,
    ) -> RemoteResult<Vec<Value>> {
        let mut values = wires
            .into_iter()
            .map(|wire| self.from_wire(wire, &mut transfer))
            .collect::<RemoteResult<Vec<_>>>()?;
        if !transfer.is_empty() {
            if values.is_empty() {
                warn!(
                    channel = self.channel.id(),
                    count = transfer.len(),
                    "Resources sent without arguments"
                );
            }
            let last = values.pop().unwrap_or_default();
            values.push(mark_for_transfer(last, transfer));
        }
        Ok(values)
    }

    /// Lifts a received value, taking the dedicated ports it refers to out of
    /// `transfer`. A thrown value becomes an error.
    pub(crate) fn from_wire(
        &self,
        wire: WireValue,
        transfer: &mut Vec<Transferable>,
    ) -> RemoteResult<Value> {
        match wire {
            WireValue::Raw { value } => Ok(Value::from_json(value)),
            WireValue::Serialized { bytes, options } => {
                let tree = self.channel.config().codec.deserialize(&bytes, &options)?;
                self.from_structured(tree, transfer)
            }
            WireValue::Proxy {
                id,
                channel_hint: None,
            } => Ok(Value::Remote(RemoteHandle::new(Lease::new(
                id,
                self.channel.clone(),
                false,
            )))),
            WireValue::Proxy {
                id,
                channel_hint: Some(key),
            } => {
                let port = take_port(transfer, &key).ok_or_else(|| {
                    farcall_protocol::ProtocolError::malformed(format!(
                        "proxy {id} names channel {key} but no such port was sent"
                    ))
                })?;
                let child = self.channel.child(port);
                debug!(channel = child.id(), proxy_id = %id, "Opened dedicated channel");
                Ok(Value::Remote(RemoteHandle::new(Lease::new(id, child, true))))
            }
            WireValue::Thrown { error } => Err(RemoteError::Thrown(error)),
        }
    }

    fn from_structured(
        &self,
        tree: Structured,
        transfer: &mut Vec<Transferable>,
    ) -> RemoteResult<Value> {
        Ok(match tree {
            Structured::Null => Value::Null,
            Structured::Bool(b) => Value::Bool(b),
            Structured::Number(n) => Value::Number(n),
            Structured::String(s) => Value::String(s),
            Structured::List(items) => Value::List(
                items
                    .into_iter()
                    .map(|item| self.from_structured(item, transfer))
                    .collect::<RemoteResult<_>>()?,
            ),
            Structured::Map(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| Ok((k, self.from_structured(v, transfer)?)))
                    .collect::<RemoteResult<_>>()?,
            ),
            Structured::Remote(wire) => self.from_wire(*wire, transfer)?,
        })
    }
}

fn take_port(transfer: &mut Vec<Transferable>, key: &str) -> Option<MemoryTransport> {
    let index = transfer
        .iter()
        .position(|t| matches!(t, Transferable::Port { key: k, .. } if k == key))?;
    match transfer.remove(index) {
        Transferable::Port { port, .. } => Some(port),
        Transferable::Buffer(_) => None,
    }
}
