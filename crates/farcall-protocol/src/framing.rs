//! Length-prefixed message framing for byte-stream transports.
//!
//! Messages are framed with a 4-byte big-endian length prefix followed by
//! the JSON payload:
//!
//! ```text
//! +----------------+------------------+
//! | length (4 BE)  |  JSON payload    |
//! +----------------+------------------+
//! ```

use serde::{Serialize, de::DeserializeOwned};

use crate::MAX_MESSAGE_SIZE;
use crate::error::{ProtocolError, ProtocolResult};

/// Encodes a message to bytes with length prefix.
///
/// Returns the complete framed message ready for transmission.
///
/// # Example
///
/// ```rust
/// use farcall_protocol::{Envelope, encode_message};
///
/// let envelope = Envelope::connect("default");
/// let bytes = encode_message(&envelope).unwrap();
/// assert!(bytes.len() > 4); // At least length prefix
/// ```
pub fn encode_message<T: Serialize>(message: &T) -> ProtocolResult<Vec<u8>> {
    let json = serde_json::to_vec(message)?;
    if json.len() > MAX_MESSAGE_SIZE as usize {
        return Err(ProtocolError::MessageTooLarge {
            size: json.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    let len = json.len() as u32;

    let mut buffer = Vec::with_capacity(4 + json.len());
    buffer.extend_from_slice(&len.to_be_bytes());
    buffer.extend_from_slice(&json);
    Ok(buffer)
}

/// Decodes a message from bytes with length prefix.
///
/// The input should be a complete framed message (length prefix + payload).
pub fn decode_message<T: DeserializeOwned>(data: &[u8]) -> ProtocolResult<T> {
    let Some((prefix, rest)) = data.split_first_chunk::<4>() else {
        return Err(ProtocolError::IncompleteMessage {
            expected: 4,
            received: data.len(),
        });
    };

    let len = read_frame_len(*prefix)?;

    if rest.len() < len {
        return Err(ProtocolError::IncompleteMessage {
            expected: 4 + len,
            received: data.len(),
        });
    }

    let message = serde_json::from_slice(&rest[..len])?;
    Ok(message)
}

/// Validates a length prefix read from a stream and returns the payload size.
///
/// Rejects zero-length frames and frames above [`MAX_MESSAGE_SIZE`].
pub fn read_frame_len(prefix: [u8; 4]) -> ProtocolResult<usize> {
    let len = u32::from_be_bytes(prefix);

    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len as usize,
            max: MAX_MESSAGE_SIZE,
        });
    }

    if len == 0 {
        return Err(ProtocolError::EmptyMessage);
    }

    Ok(len as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Envelope, Message, PropertyPath, ProxyId};

    #[test]
    fn encode_decode_roundtrip() {
        let envelope = Envelope::get(ProxyId::from("p-1"), PropertyPath::parse_dotted("a.b"));
        let bytes = encode_message(&envelope).unwrap();

        // Verify length prefix
        let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert_eq!(len as usize, bytes.len() - 4);

        let decoded: Envelope = decode_message(&bytes).unwrap();
        assert_eq!(envelope, decoded);
    }

    #[test]
    fn decode_incomplete_length() {
        let result: ProtocolResult<Envelope> = decode_message(&[0, 0]);
        assert!(matches!(
            result,
            Err(ProtocolError::IncompleteMessage { expected: 4, .. })
        ));
    }

    #[test]
    fn decode_incomplete_payload() {
        // Claim 100 bytes but only provide 10
        let mut data = vec![0, 0, 0, 100];
        data.extend_from_slice(&[0u8; 10]);

        let result: ProtocolResult<Envelope> = decode_message(&data);
        assert!(matches!(
            result,
            Err(ProtocolError::IncompleteMessage { expected: 104, received: 14 })
        ));
    }

    #[test]
    fn message_too_large() {
        let huge_len = MAX_MESSAGE_SIZE + 1;
        let data = huge_len.to_be_bytes();

        let result: ProtocolResult<Envelope> = decode_message(&data);
        assert!(matches!(result, Err(ProtocolError::MessageTooLarge { .. })));
    }

    #[test]
    fn oversized_message_is_not_encoded() {
        let envelope = Envelope::connect("x".repeat(MAX_MESSAGE_SIZE as usize));
        let result = encode_message(&envelope);
        assert!(matches!(
            result,
            Err(ProtocolError::MessageTooLarge { size, .. }) if size > MAX_MESSAGE_SIZE as usize
        ));
    }

    #[test]
    fn zero_length_frame_rejected() {
        assert!(matches!(
            read_frame_len(0u32.to_be_bytes()),
            Err(ProtocolError::EmptyMessage)
        ));
        assert_eq!(read_frame_len(12u32.to_be_bytes()).unwrap(), 12);
    }

    #[test]
    fn unknown_kind_decodes_totally() {
        let json = br#"{"id":"c-9","type":"delete-property","proxy_id":"p","path":["x"]}"#;
        let mut framed = (json.len() as u32).to_be_bytes().to_vec();
        framed.extend_from_slice(json);

        let decoded: Envelope = decode_message(&framed).unwrap();
        assert_eq!(decoded.id.as_str(), "c-9");
        assert_eq!(decoded.message, Message::Unknown);
    }
}
