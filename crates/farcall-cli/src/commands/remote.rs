//! Commands that drive the served object through a remote handle.
//!
//! Paths are dotted (`math.square`). Arguments are parsed as JSON, and
//! anything that does not parse is passed as a plain string, so
//! `farcall call echo hello` and `farcall call echo '"hello"'` agree.

use std::path::Path;

use serde_json::json;
use tracing::debug;

use farcall_core::{PropertyPath, RemoteHandle, UnixTransport, Value, connect};

use crate::error::{CliError, CliResult};

/// Connects to `service` on the socket at `socket_path`.
pub async fn open(socket_path: &Path, service: &str) -> CliResult<RemoteHandle> {
    let transport = UnixTransport::connect(socket_path).await.map_err(|e| {
        CliError::Connection(format!(
            "failed to connect to {}: {} (is `farcall serve` running?)",
            socket_path.display(),
            e
        ))
    })?;
    let remote = connect(transport, service).await?;
    debug!(proxy_id = %remote.proxy_id(), service, "Connected");
    Ok(remote)
}

/// Parses one command-line argument.
pub fn parse_arg(raw: &str) -> Value {
    serde_json::from_str(raw)
        .map(Value::from_json)
        .unwrap_or_else(|_| Value::from(raw))
}

/// Extends `root` by each segment of `path`. No traffic.
pub fn walk(root: &RemoteHandle, path: &str) -> RemoteHandle {
    walk_path(root, &PropertyPath::parse_dotted(path))
}

fn walk_path(root: &RemoteHandle, path: &PropertyPath) -> RemoteHandle {
    path.segments()
        .iter()
        .fold(root.clone(), |handle, segment| handle.get(segment.as_str()))
}

/// Renders a received value as JSON. Handles show up as
/// `{"remote": "<proxy id>"}`.
pub fn render(value: &Value) -> serde_json::Value {
    match value {
        Value::Remote(handle) => {
            if handle.path().is_root() {
                json!({ "remote": handle.proxy_id().as_str() })
            } else {
                json!({ "remote": handle.proxy_id().as_str(), "path": handle.path().to_string() })
            }
        }
        Value::List(items) => items.iter().map(render).collect(),
        Value::Map(map) => map
            .iter()
            .map(|(key, value)| (key.clone(), render(value)))
            .collect::<serde_json::Map<_, _>>()
            .into(),
        other => other
            .to_json()
            .unwrap_or_else(|_| json!({ "unrepresentable": other.type_name() })),
    }
}

/// Calls the function at `path`.
pub async fn call(remote: &RemoteHandle, path: &str, args: &[String]) -> CliResult<serde_json::Value> {
    let args = args.iter().map(|arg| parse_arg(arg)).collect();
    let value = walk(remote, path).call(args).await?;
    Ok(render(&value))
}

/// Reads the value at `path`.
pub async fn get(remote: &RemoteHandle, path: &str) -> CliResult<serde_json::Value> {
    let value = walk(remote, path).await?;
    Ok(render(&value))
}

/// Assigns `raw` at `path`.
pub async fn set(remote: &RemoteHandle, path: &str, raw: &str) -> CliResult<serde_json::Value> {
    let path = PropertyPath::parse_dotted(path);
    let Some((parent, name)) = path.split_last() else {
        return Err(CliError::Usage("set needs a member path, e.g. `counter`".into()));
    };
    let accepted = walk_path(remote, &parent)
        .set(name, parse_arg(raw))
        .await?;
    Ok(json!({ "accepted": accepted }))
}

/// Instantiates the constructor at `path` and reads `reads` from the new
/// instance.
pub async fn construct(
    remote: &RemoteHandle,
    path: &str,
    args: &[String],
    reads: &[String],
) -> CliResult<serde_json::Value> {
    let args = args.iter().map(|arg| parse_arg(arg)).collect();
    let instance = walk(remote, path).construct(args).await?;

    let mut members = serde_json::Map::new();
    for member in reads {
        let value = walk(&instance, member).await?;
        members.insert(member.clone(), render(&value));
    }

    let mut out = serde_json::Map::new();
    out.insert("remote".into(), instance.proxy_id().as_str().into());
    if !members.is_empty() {
        out.insert("members".into(), members.into());
    }
    Ok(out.into())
}

/// Prints a rendered value.
pub fn print(value: &serde_json::Value) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::Usage(format!("failed to render output: {}", e)))?;
    println!("{}", text);
    Ok(())
}
