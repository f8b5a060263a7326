//! Address registry for time-signal recipients.
//!
//! Tracks every correspondent the service has successfully echoed to,
//! keyed by their JID, for later broadcast fan-out.

use std::fmt;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use jid::Jid;
use tracing::{debug, info};

/// Delivery metadata for one remembered correspondent.
///
/// Captured from the first successfully echoed message: the sender becomes
/// the broadcast recipient, the original recipient becomes the address the
/// service replies from, and the conversation thread is carried on every
/// later message in the exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressInfo {
    /// The correspondent's JID (broadcast recipient)
    pub client: Jid,
    /// The JID the service sends from when messaging this correspondent
    pub reply_from: Jid,
    /// Opaque conversation thread carried on all messages in this exchange
    pub thread: Option<String>,
}

impl AddressInfo {
    /// Create a new address record.
    pub fn new(client: Jid, reply_from: Jid, thread: Option<String>) -> Self {
        Self {
            client,
            reply_from,
            thread,
        }
    }
}

/// Registry of remembered correspondents.
///
/// Thread-safe map from client JID to [`AddressInfo`]. Uses DashMap for
/// concurrent access without explicit locking, so echo handlers on worker
/// tasks and the broadcast tick never serialize behind each other.
///
/// Entries are added only after a successful echo and removed only by the
/// broadcast cycle after a failed send. Nothing is persisted; the registry
/// is dropped with the service.
pub struct AddressRegistry {
    entries: DashMap<Jid, AddressInfo>,
}

impl AddressRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        info!("Creating address registry");
        Self {
            entries: DashMap::new(),
        }
    }

    /// Insert a record keyed by its client JID, only if none exists yet.
    ///
    /// A second registration for an already-present client is a no-op: the
    /// `reply_from`/`thread` pair from the first successful echo is
    /// retained even if a later message uses a different thread.
    pub fn insert_if_absent(&self, info: AddressInfo) {
        match self.entries.entry(info.client.clone()) {
            Entry::Occupied(_) => {
                debug!(client = %info.client, "Correspondent already registered");
            }
            Entry::Vacant(slot) => {
                debug!(client = %info.client, "Registered correspondent");
                slot.insert(info);
            }
        }
    }

    /// Snapshot of all current records.
    ///
    /// Safe to take while concurrent inserts and removals occur elsewhere;
    /// the returned vector is independent of later mutation.
    pub fn snapshot(&self) -> Vec<AddressInfo> {
        self.entries.iter().map(|r| r.value().clone()).collect()
    }

    /// Remove the record for a client JID, if present. Idempotent.
    ///
    /// Returns true if a record was removed.
    pub fn remove(&self, client: &Jid) -> bool {
        let removed = self.entries.remove(client).is_some();
        if removed {
            debug!(client = %client, "Removed correspondent");
        }
        removed
    }

    /// Check whether a client JID is registered.
    pub fn contains(&self, client: &Jid) -> bool {
        self.entries.contains_key(client)
    }

    /// Get the record for a client JID, if present.
    pub fn get(&self, client: &Jid) -> Option<AddressInfo> {
        self.entries.get(client).map(|r| r.value().clone())
    }

    /// Number of registered correspondents.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for AddressRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AddressRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressRegistry")
            .field("len", &self.entries.len())
            .finish()
    }
}
