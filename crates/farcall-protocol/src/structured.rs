//! Codec-facing value tree.
//!
//! A [`Structured`] value is what the structured codec turns into bytes. It
//! is plain data except for [`Structured::Remote`], which embeds a
//! [`WireValue`] so handles nested inside a serialized structure survive the
//! trip. The externally tagged encoding keeps those nodes distinct from maps
//! that merely look similar.

use serde::{Deserialize, Serialize};

use crate::WireValue;

/// Tree handed to and returned by the structured codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Structured {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<Structured>),
    /// Ordered key/value pairs.
    Map(Vec<(String, Structured)>),
    /// A nested value that was bridged on its own.
    Remote(Box<WireValue>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProxyId;
    use serde_json::json;

    #[test]
    fn remote_nodes_do_not_collide_with_maps() {
        let tree = Structured::List(vec![
            Structured::Map(vec![("remote".into(), Structured::Bool(true))]),
            Structured::Remote(Box::new(WireValue::Proxy {
                id: ProxyId::from("p-1"),
                channel_hint: None,
            })),
        ]);

        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(
            json,
            json!({"list": [
                {"map": [["remote", {"bool": true}]]},
                {"remote": {"type": "proxy", "id": "p-1", "channel_hint": null}}
            ]})
        );

        let parsed: Structured = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, tree);
    }
}
