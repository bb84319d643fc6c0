//! Fragment reassembly keyed by `(host_id, comm_id)`, with a "closed" set
//! to suppress replay of an already-delivered message.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

type Key = (String, u32);

struct Inner {
    buckets: HashMap<Key, BTreeMap<u32, Vec<u8>>>,
    closed: HashSet<Key>,
}

/// Tracks in-flight and already-delivered `(host_id, comm_id)` messages for
/// one listener. All mutation is serialized behind a single mutex so
/// concurrent packet workers see a consistent snapshot per operation.
pub struct Reassembler {
    inner: Mutex<Inner>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                buckets: HashMap::new(),
                closed: HashSet::new(),
            }),
        }
    }

    /// Feeds one fragment into the reassembler. Returns `Some(message)` the
    /// moment a `FIN` fragment completes reassembly of a message that was
    /// not already closed; otherwise `None` (more fragments needed, or the
    /// fragment was dropped per the rules below).
    ///
    /// - `SYN` always starts a fresh bucket, discarding any existing one.
    /// - A fragment with no corresponding bucket (no prior `SYN` seen, or
    ///   the communication is already closed and its bucket was dropped)
    ///   is silently discarded.
    /// - `FIN` on an already-closed communication discards the bucket
    ///   without re-enqueuing (duplicate-FIN suppression).
    pub fn process_fragment(
        &self,
        host_id: &str,
        comm_id: u32,
        seq: u32,
        payload: Vec<u8>,
        syn: bool,
        fin: bool,
    ) -> Option<Vec<u8>> {
        let key: Key = (host_id.to_string(), comm_id);
        let mut inner = self.inner.lock().unwrap();

        if syn {
            inner.buckets.insert(key.clone(), BTreeMap::new());
        }

        match inner.buckets.get_mut(&key) {
            Some(bucket) => {
                bucket.insert(seq, payload);
            }
            None => return None,
        }

        if !fin {
            return None;
        }

        if inner.closed.contains(&key) {
            inner.buckets.remove(&key);
            return None;
        }

        let bucket = inner.buckets.remove(&key).expect("just inserted above");
        inner.closed.insert(key);
        Some(bucket.into_values().collect())
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}
