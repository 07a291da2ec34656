//! Values crossing a channel and the explicit marks that decide how.
//!
//! Plain data travels as a copy. Everything else needs a mark:
//! - [`mark_for_proxy`] exposes the value and sends a handle to it
//! - [`mark_for_serialization`] runs it through the channel's codec
//! - [`mark_for_transfer`] moves resources along with it
//!
//! An unmarked [`Value::Object`] or [`Value::Remote`] cannot cross and fails
//! with a bridge error.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use farcall_protocol::{PropertyPath, SerializeOptions};

use crate::error::{RemoteError, RemoteResult};
use crate::handle::RemoteHandle;
use crate::object::RemoteObject;
use crate::transport::Transferable;

/// A value as seen by exposed objects and handle callers.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// A live local object. Exposed objects can traverse it; it never
    /// crosses unmarked.
    Object(Arc<dyn RemoteObject>),
    /// A handle received from the peer.
    Remote(RemoteHandle),
    /// Marked to cross as a handle.
    Proxied(Proxied),
    /// Marked to cross through the structured codec.
    Serialized(Serialized),
    /// Marked to move resources along with it.
    Transferred(Transferred),
}

/// A value exposed by reference, addressed at `path` inside `target`.
#[derive(Clone)]
pub struct Proxied {
    pub target: Box<Value>,
    pub path: PropertyPath,
}

#[derive(Clone)]
pub struct Serialized {
    pub value: Box<Value>,
    pub options: SerializeOptions,
}

#[derive(Clone)]
pub struct Transferred {
    pub value: Box<Value>,
    pub resources: Vec<Transferable>,
}

/// Marks `value` to be sent as a handle. The receiver drives it remotely.
pub fn mark_for_proxy(value: impl Into<Value>) -> Value {
    mark_for_proxy_in(value, PropertyPath::root())
}

/// Marks the member at `path` inside `root` to be sent as a handle.
///
/// Requests through that handle are resolved against `root`, so the member
/// is looked up on every use rather than captured once.
pub fn mark_for_proxy_in(root: impl Into<Value>, path: PropertyPath) -> Value {
    Value::Proxied(Proxied {
        target: Box::new(root.into()),
        path,
    })
}

/// Marks `value` to be encoded by the channel's codec with `options`.
pub fn mark_for_serialization(value: impl Into<Value>, options: SerializeOptions) -> Value {
    Value::Serialized(Serialized {
        value: Box::new(value.into()),
        options,
    })
}

/// Marks `value` to travel together with `resources`, which are moved to the
/// peer rather than copied.
pub fn mark_for_transfer(value: impl Into<Value>, resources: Vec<Transferable>) -> Value {
    Value::Transferred(Transferred {
        value: Box::new(value.into()),
        resources,
    })
}

impl Value {
    /// Wraps a local object.
    pub fn object(object: impl RemoteObject) -> Self {
        Self::Object(Arc::new(object))
    }

    /// Builds a map value from pairs.
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Converts JSON into plain data.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Converts plain data into JSON.
    ///
    /// Serialization and transfer marks are looked through. Objects, handles
    /// and proxy marks have no JSON form.
    pub fn to_json(&self) -> RemoteResult<serde_json::Value> {
        Ok(match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => serde_json::Value::Number(n.clone()),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => serde_json::Value::Array(
                items.iter().map(Self::to_json).collect::<RemoteResult<_>>()?,
            ),
            Self::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), v.to_json()?)))
                    .collect::<RemoteResult<_>>()?,
            ),
            Self::Serialized(Serialized { value, .. })
            | Self::Transferred(Transferred { value, .. }) => value.to_json()?,
            Self::Object(_) | Self::Remote(_) | Self::Proxied(_) => {
                return Err(RemoteError::bridge(format!(
                    "{} has no plain-data form",
                    self.type_name()
                )));
            }
        })
    }

    /// Short name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Object(_) => "object",
            Self::Remote(_) => "remote handle",
            Self::Proxied(_) => "proxied value",
            Self::Serialized(_) => "serialized value",
            Self::Transferred(_) => "transferred value",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.content(), Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.content() {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.content() {
            Self::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.content() {
            Self::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.content() {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<&RemoteHandle> {
        match self.content() {
            Self::Remote(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn into_handle(self) -> Option<RemoteHandle> {
        match self.take_transfer().0 {
            Self::Remote(handle) => Some(handle),
            _ => None,
        }
    }

    /// Resources moved along with this value. Empty unless it carries a
    /// transfer mark.
    pub fn resources(&self) -> &[Transferable] {
        match self {
            Self::Transferred(Transferred { resources, .. }) => resources,
            _ => &[],
        }
    }

    /// Splits a transfer mark into the value and the resources it moved.
    pub fn take_transfer(self) -> (Value, Vec<Transferable>) {
        match self {
            Self::Transferred(Transferred { value, resources }) => (*value, resources),
            other => (other, Vec::new()),
        }
    }

    /// The value with any transfer mark looked through.
    fn content(&self) -> &Value {
        match self {
            Self::Transferred(Transferred { value, .. }) => value.content(),
            other => other,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Self::Number(n) => f.debug_tuple("Number").field(n).finish(),
            Self::String(s) => f.debug_tuple("String").field(s).finish(),
            Self::List(items) => f.debug_tuple("List").field(items).finish(),
            Self::Map(map) => f.debug_tuple("Map").field(map).finish(),
            Self::Object(_) => f.write_str("Object(..)"),
            Self::Remote(handle) => f.debug_tuple("Remote").field(handle).finish(),
            Self::Proxied(p) => f
                .debug_struct("Proxied")
                .field("target", &p.target)
                .field("path", &p.path)
                .finish(),
            Self::Serialized(s) => f
                .debug_struct("Serialized")
                .field("value", &s.value)
                .field("options", &s.options)
                .finish(),
            Self::Transferred(t) => f
                .debug_struct("Transferred")
                .field("value", &t.value)
                .field("resources", &t.resources)
                .finish(),
        }
    }
}

/// Data compares structurally, objects by identity, handles by target.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            (Self::Remote(a), Self::Remote(b)) => {
                a.proxy_id() == b.proxy_id() && a.path() == b.path()
            }
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<f64> for Value {
    /// Non-finite numbers become `Null`, as in JSON.
    fn from(value: f64) -> Self {
        serde_json::Number::from_f64(value).map_or(Self::Null, Self::Number)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::List(value)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(value: BTreeMap<String, Value>) -> Self {
        Self::Map(value)
    }
}

impl From<Arc<dyn RemoteObject>> for Value {
    fn from(value: Arc<dyn RemoteObject>) -> Self {
        Self::Object(value)
    }
}

impl From<RemoteHandle> for Value {
    fn from(value: RemoteHandle) -> Self {
        Self::Remote(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Self::from_json(value)
    }
}
