//! Channel and socket server configuration.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::codec::{Codec, JsonCodec};

/// Channel configuration.
#[derive(Clone)]
pub struct ChannelConfig {
    /// Open a dedicated sub-channel for every proxied value when the
    /// transport can move channel endpoints.
    pub sub_channels: bool,

    /// Codec for values marked for serialization.
    pub codec: Arc<dyn Codec>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            sub_channels: true,
            codec: Arc::new(JsonCodec),
        }
    }
}

impl fmt::Debug for ChannelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelConfig")
            .field("sub_channels", &self.sub_channels)
            .finish_non_exhaustive()
    }
}

impl ChannelConfig {
    /// Builder: enable or disable dedicated sub-channels.
    pub fn with_sub_channels(mut self, enabled: bool) -> Self {
        self.sub_channels = enabled;
        self
    }

    /// Builder: set the structured codec.
    pub fn with_codec(mut self, codec: impl Codec) -> Self {
        self.codec = Arc::new(codec);
        self
    }
}

/// Socket server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path to the Unix socket.
    pub socket_path: PathBuf,

    /// Maximum concurrent connections.
    pub max_connections: usize,

    /// Whether to remove stale socket on startup.
    pub cleanup_stale_socket: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            max_connections: 100,
            cleanup_stale_socket: true,
        }
    }
}

impl ServerConfig {
    /// Creates a new server configuration with the given socket path.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            ..Default::default()
        }
    }

    /// Builder: set max connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Builder: set cleanup stale socket.
    pub fn with_cleanup_stale_socket(mut self, cleanup: bool) -> Self {
        self.cleanup_stale_socket = cleanup;
        self
    }
}

/// Returns the default socket path.
///
/// Uses `$XDG_RUNTIME_DIR/farcall.sock` if available,
/// otherwise falls back to `/tmp/farcall-$UID.sock`.
pub fn default_socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir).join("farcall.sock")
    } else {
        #[cfg(unix)]
        let uid = unsafe { libc::getuid() };
        #[cfg(not(unix))]
        let uid = 0;
        PathBuf::from(format!("/tmp/farcall-{}.sock", uid))
    }
}
