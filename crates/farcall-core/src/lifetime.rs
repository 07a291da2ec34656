//! Lifetime tracking on both sides of a channel.
//!
//! The peer holding handles owns a [`Lease`] per received proxy value. All
//! clones and sub-path handles share it, so the single `release-proxy` goes
//! out when the last of them is dropped (or on an explicit release).
//!
//! The exposing peer keeps an [`ExportRegistry`] of live exports. An entry is
//! removed on `release-proxy`, and every entry of a channel is removed when its
//! transport closes.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::AbortHandle;
use tracing::debug;

use farcall_protocol::{Message, PropertyPath, ProxyId};

use crate::channel::{Channel, lock};
use crate::value::Value;

/// Client-side claim on one exposed object.
pub(crate) struct Lease {
    proxy_id: ProxyId,
    channel: Channel,
    released: AtomicBool,
    /// The channel was opened for this proxy alone and closes with it.
    dedicated: bool,
}

impl Lease {
    pub(crate) fn new(proxy_id: ProxyId, channel: Channel, dedicated: bool) -> Self {
        Self {
            proxy_id,
            channel,
            released: AtomicBool::new(false),
            dedicated,
        }
    }

    pub(crate) fn proxy_id(&self) -> &ProxyId {
        &self.proxy_id
    }

    pub(crate) fn channel(&self) -> &Channel {
        &self.channel
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Posts `release-proxy` on the first call only.
    pub(crate) fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(
            channel = self.channel.id(),
            proxy_id = %self.proxy_id,
            "Releasing proxy"
        );
        self.channel.post(Message::ReleaseProxy {
            proxy_id: self.proxy_id.clone(),
        });
        if self.dedicated {
            self.channel.close();
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.release();
    }
}

/// One exposed object.
pub(crate) struct ExportEntry {
    /// The exposed value.
    pub root: Value,
    /// Path inside `root` the proxy addresses.
    pub base: PropertyPath,
    pub channel_id: u64,
    pub task: Option<AbortHandle>,
    pub dedicated: bool,
}

/// Live exports, keyed by proxy id.
#[derive(Default)]
pub struct ExportRegistry {
    entries: Mutex<HashMap<ProxyId, ExportEntry>>,
}

impl ExportRegistry {
    pub(crate) fn insert(&self, proxy_id: ProxyId, entry: ExportEntry) {
        lock(&self.entries).insert(proxy_id, entry);
    }

    pub(crate) fn attach_task(&self, proxy_id: &ProxyId, task: AbortHandle) {
        match lock(&self.entries).get_mut(proxy_id) {
            Some(entry) => entry.task = Some(task),
            // Released before the serve loop was attached.
            None => task.abort(),
        }
    }

    /// Returns the exposed value and base path for `proxy_id`.
    pub(crate) fn lookup(&self, proxy_id: &ProxyId) -> Option<(Value, PropertyPath)> {
        lock(&self.entries)
            .get(proxy_id)
            .map(|entry| (entry.root.clone(), entry.base.clone()))
    }

    pub(crate) fn remove(&self, proxy_id: &ProxyId) -> Option<ExportEntry> {
        lock(&self.entries).remove(proxy_id)
    }

    /// Drops every export served over channel `channel_id`, stopping their
    /// serve loops. Returns how many were removed.
    pub(crate) fn remove_channel(&self, channel_id: u64) -> usize {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|_, entry| {
            if entry.channel_id != channel_id {
                return true;
            }
            if let Some(task) = &entry.task {
                task.abort();
            }
            false
        });
        before - entries.len()
    }

    /// Number of live exports.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Returns true when nothing is exposed.
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    /// Returns true while `proxy_id` is exposed.
    pub fn contains(&self, proxy_id: &ProxyId) -> bool {
        lock(&self.entries).contains_key(proxy_id)
    }
}
