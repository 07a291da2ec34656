//! Envelope, message and value types for the farcall protocol.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation id used to pair a request with its response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generates a fresh, process-unique id.
    pub fn fresh() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one exposed object on the exposing side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProxyId(String);

impl ProxyId {
    /// Generates a fresh id, unique for the lifetime of the process.
    pub fn fresh() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProxyId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ProxyId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ProxyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered member names locating a value inside an exposed object.
///
/// The empty path is the exposed object itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyPath(Vec<String>);

impl PropertyPath {
    /// Returns the empty (root) path.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parses a dotted path such as `a.b.c`. Empty segments are skipped.
    pub fn parse_dotted(path: &str) -> Self {
        Self(
            path.split('.')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Returns a new path extended by one segment.
    #[must_use]
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.into());
        Self(segments)
    }

    /// Returns this path appended to `base`.
    #[must_use]
    pub fn rebased(&self, base: &PropertyPath) -> Self {
        let mut segments = base.0.clone();
        segments.extend(self.0.iter().cloned());
        Self(segments)
    }

    /// Splits off the final segment, returning the parent path and the name.
    pub fn split_last(&self) -> Option<(PropertyPath, &str)> {
        let (last, parent) = self.0.split_last()?;
        Some((Self(parent.to_vec()), last.as_str()))
    }

    /// Returns true for the empty path.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the segments.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when the path has no segments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for PropertyPath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        f.write_str(&self.0.join("."))
    }
}

/// Message envelope wrapping every protocol message.
///
/// Wire shape: `{"id": "...", "type": "<kind>", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Correlation id. Responses carry the id of the request they answer.
    pub id: CorrelationId,
    /// The message kind and its fields.
    #[serde(flatten)]
    pub message: Message,
}

impl Envelope {
    /// Creates an envelope with a freshly stamped correlation id.
    pub fn new(message: Message) -> Self {
        Self {
            id: CorrelationId::fresh(),
            message,
        }
    }

    /// Creates a connect request for the named service.
    pub fn connect(name: impl Into<String>) -> Self {
        Self::new(Message::Connect { name: name.into() })
    }

    /// Creates a response to the request with the given id.
    pub fn response(id: CorrelationId, value: WireValue) -> Self {
        Self {
            id,
            message: Message::Response { value },
        }
    }

    /// Creates a get request.
    pub fn get(proxy_id: ProxyId, path: PropertyPath) -> Self {
        Self::new(Message::Get { proxy_id, path })
    }

    /// Creates a set request. `path` includes the assigned member.
    pub fn set(proxy_id: ProxyId, path: PropertyPath, value: WireValue) -> Self {
        Self::new(Message::Set {
            proxy_id,
            path,
            value,
        })
    }

    /// Creates an apply (call) request.
    pub fn apply(proxy_id: ProxyId, path: PropertyPath, args: Vec<WireValue>) -> Self {
        Self::new(Message::Apply {
            proxy_id,
            path,
            args,
        })
    }

    /// Creates a construct request.
    pub fn construct(proxy_id: ProxyId, path: PropertyPath, args: Vec<WireValue>) -> Self {
        Self::new(Message::Construct {
            proxy_id,
            path,
            args,
        })
    }

    /// Creates a release notification.
    pub fn release_proxy(proxy_id: ProxyId) -> Self {
        Self::new(Message::ReleaseProxy { proxy_id })
    }

    /// Returns the kind of the carried message.
    pub fn kind(&self) -> MessageKind {
        self.message.kind()
    }
}

/// Protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Message {
    /// Ask the peer for a handle to the object exposed under `name`.
    Connect { name: String },

    /// Answer to a request; the envelope id is the request's id.
    Response { value: WireValue },

    /// Read the value at `path`.
    Get { proxy_id: ProxyId, path: PropertyPath },

    /// Assign `value` to the last segment of `path`.
    Set {
        proxy_id: ProxyId,
        path: PropertyPath,
        value: WireValue,
    },

    /// Invoke the function at `path`.
    Apply {
        proxy_id: ProxyId,
        path: PropertyPath,
        args: Vec<WireValue>,
    },

    /// Instantiate the constructor at `path`.
    Construct {
        proxy_id: ProxyId,
        path: PropertyPath,
        args: Vec<WireValue>,
    },

    /// The sender holds no more references to `proxy_id`.
    ReleaseProxy { proxy_id: ProxyId },

    /// Any kind this version does not know.
    #[serde(other)]
    Unknown,
}

impl Message {
    /// Returns the kind of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Connect { .. } => MessageKind::Connect,
            Self::Response { .. } => MessageKind::Response,
            Self::Get { .. } => MessageKind::Get,
            Self::Set { .. } => MessageKind::Set,
            Self::Apply { .. } => MessageKind::Apply,
            Self::Construct { .. } => MessageKind::Construct,
            Self::ReleaseProxy { .. } => MessageKind::ReleaseProxy,
            Self::Unknown => MessageKind::Unknown,
        }
    }

    /// Returns the target proxy id for per-object messages.
    pub fn proxy_id(&self) -> Option<&ProxyId> {
        match self {
            Self::Get { proxy_id, .. }
            | Self::Set { proxy_id, .. }
            | Self::Apply { proxy_id, .. }
            | Self::Construct { proxy_id, .. }
            | Self::ReleaseProxy { proxy_id } => Some(proxy_id),
            Self::Connect { .. } | Self::Response { .. } | Self::Unknown => None,
        }
    }
}

/// Field-less message kind, used for logging and routing decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Connect,
    Response,
    Get,
    Set,
    Apply,
    Construct,
    ReleaseProxy,
    Unknown,
}

impl MessageKind {
    /// Wire name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Response => "response",
            Self::Get => "get",
            Self::Set => "set",
            Self::Apply => "apply",
            Self::Construct => "construct",
            Self::ReleaseProxy => "release-proxy",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options handed verbatim to the structured codec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerializeOptions(BTreeMap<String, serde_json::Value>);

impl SerializeOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set one option.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Looks up one option.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }
}

/// A value crossing the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WireValue {
    /// Transport-native data passed as-is.
    Raw { value: serde_json::Value },

    /// Payload produced by the structured codec.
    Serialized {
        bytes: Vec<u8>,
        options: SerializeOptions,
    },

    /// A handle to an object exposed by the sender.
    Proxy {
        id: ProxyId,
        /// Key of a dedicated sub-channel sent alongside this envelope.
        channel_hint: Option<String>,
    },

    /// The operation failed; only valid in responses.
    #[serde(rename = "throw")]
    Thrown { error: ThrownError },
}

impl WireValue {
    /// Wraps raw data.
    pub fn raw(value: impl Into<serde_json::Value>) -> Self {
        Self::Raw {
            value: value.into(),
        }
    }

    /// Creates a thrown error value.
    pub fn thrown(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Thrown {
            error: ThrownError::new(code, message),
        }
    }
}

/// Error codes carried by thrown values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The exposed object raised an error.
    Remote,

    /// A member was used as something it is not (e.g. calling a number).
    TypeError,

    /// The operation or message kind is not supported.
    NotImplemented,

    /// The target proxy or service does not exist (anymore).
    Unavailable,

    /// The request itself is malformed.
    InvalidRequest,

    /// Unknown or internal error.
    Internal,
}

impl ErrorCode {
    /// Returns a human-readable description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Remote => "remote error",
            Self::TypeError => "type error",
            Self::NotImplemented => "not implemented",
            Self::Unavailable => "unavailable",
            Self::InvalidRequest => "invalid request",
            Self::Internal => "internal error",
        }
    }
}

/// Error payload of a `throw` value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrownError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable error message.
    pub message: String,
}

impl ThrownError {
    /// Creates a new thrown error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unavailable, message)
    }

    /// Creates a not-implemented error.
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotImplemented, message)
    }
}

impl fmt::Display for ThrownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

impl std::error::Error for ThrownError {}
