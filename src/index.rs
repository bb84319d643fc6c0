//! In-memory directory index: `(host_id, filename) -> (host_ip, filesize)`,
//! substring-searchable, with self-exclusion and an optional host filter on
//! query. Backed by a plain mutex-guarded `Vec` rather than a database
//! connection; any mapping or relational store satisfying the same
//! operations would do.

use std::sync::Mutex;

#[derive(Debug, Clone)]
struct DirectoryEntry {
    host_id: String,
    host_ip: String,
    filename: String,
    filesize: u64,
}

/// One server's view of every host's currently-shared files. All mutation
/// goes through a single lock so readers always see a consistent snapshot.
pub struct DirectoryIndex {
    entries: Mutex<Vec<DirectoryEntry>>,
}

impl DirectoryIndex {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Inserts one entry per `(filename, filesize)` pair, unconditionally
    /// (duplicates from the same host are tolerated). Returns the number of
    /// entries inserted.
    pub fn add(&self, host_id: &str, host_ip: &str, files: &[(String, u64)]) -> usize {
        let mut entries = self.entries.lock().unwrap();
        entries.extend(files.iter().map(|(filename, filesize)| DirectoryEntry {
            host_id: host_id.to_string(),
            host_ip: host_ip.to_string(),
            filename: filename.clone(),
            filesize: *filesize,
        }));
        files.len()
    }

    /// Deletes entries matching `(host_id, filename)`; size is ignored.
    /// Returns the number of entries removed.
    pub fn remove_files(&self, host_id: &str, files: &[(String, u64)]) -> usize {
        let names: std::collections::HashSet<&str> =
            files.iter().map(|(name, _)| name.as_str()).collect();
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| !(e.host_id == host_id && names.contains(e.filename.as_str())));
        before - entries.len()
    }

    /// Drops every entry owned by `host_id`. Returns the number removed.
    pub fn remove_host(&self, host_id: &str) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| e.host_id != host_id);
        before - entries.len()
    }

    /// Case-sensitive substring match on `filename`, optionally restricted to
    /// `host_filter`, always excluding `requesting_host_id`'s own entries.
    pub fn query(
        &self,
        requesting_host_id: &str,
        substring: &str,
        host_filter: Option<&str>,
    ) -> Vec<(String, String, String, u64)> {
        let entries = self.entries.lock().unwrap();
        entries
            .iter()
            .filter(|e| e.host_id != requesting_host_id)
            .filter(|e| e.filename.contains(substring))
            .filter(|e| host_filter.map_or(true, |h| e.host_id == h))
            .map(|e| (e.host_id.clone(), e.host_ip.clone(), e.filename.clone(), e.filesize))
            .collect()
    }

    /// Every distinct `(host_id, host_ip)` with at least one entry.
    pub fn distinct_clients(&self) -> Vec<(String, String)> {
        let entries = self.entries.lock().unwrap();
        let mut seen = Vec::new();
        for e in entries.iter() {
            let pair = (e.host_id.clone(), e.host_ip.clone());
            if !seen.contains(&pair) {
                seen.push(pair);
            }
        }
        seen
    }
}

impl Default for DirectoryIndex {
    fn default() -> Self {
        Self::new()
    }
}
