//! Structured codec seam.
//!
//! Values marked for serialization are lowered to a [`Structured`] tree by the
//! bridge and then handed to a [`Codec`]. The default codec is JSON.

use farcall_protocol::{SerializeOptions, Structured};

use crate::error::{RemoteError, RemoteResult};

/// External structured-serialization codec.
pub trait Codec: Send + Sync + 'static {
    /// Encodes a tree into bytes.
    fn serialize(&self, value: &Structured, options: &SerializeOptions) -> RemoteResult<Vec<u8>>;

    /// Decodes bytes produced by [`Codec::serialize`].
    fn deserialize(&self, bytes: &[u8], options: &SerializeOptions) -> RemoteResult<Structured>;
}

/// JSON codec backed by `serde_json`.
///
/// Honours the `pretty` option (boolean) when encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn serialize(&self, value: &Structured, options: &SerializeOptions) -> RemoteResult<Vec<u8>> {
        let pretty = options
            .get("pretty")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);

        let encoded = if pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        };
        encoded.map_err(|e| RemoteError::Codec(format!("failed to encode: {e}")))
    }

    fn deserialize(&self, bytes: &[u8], _options: &SerializeOptions) -> RemoteResult<Structured> {
        serde_json::from_slice(bytes).map_err(|e| RemoteError::Codec(format!("failed to decode: {e}")))
    }
}
