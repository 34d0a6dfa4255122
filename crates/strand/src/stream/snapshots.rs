//! Per-session cache of last known file contents.
//!
//! Fed from completed read/write/edit blocks; consulted when an edit arrives
//! so its diff can be computed against the whole file.

use std::collections::{HashMap, VecDeque};

use crate::config::SnapshotConfig;

#[derive(Debug)]
pub struct FileSnapshots {
    entries: HashMap<String, String>,
    /// Least recently recorded first.
    order: VecDeque<String>,
    config: SnapshotConfig,
}

impl FileSnapshots {
    pub fn new(config: SnapshotConfig) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            config,
        }
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    /// Remember `content` as the current content of `path`. Oversized content
    /// forgets the path instead, since the old content is stale.
    pub fn record(&mut self, path: &str, content: String) {
        if content.len() > self.config.max_file_bytes {
            self.forget(path);
            return;
        }
        if self.entries.insert(path.to_string(), content).is_some() {
            self.order.retain(|p| p != path);
        }
        self.order.push_back(path.to_string());

        while self.entries.len() > self.config.max_files {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }

    pub fn forget(&mut self, path: &str) {
        if self.entries.remove(path).is_some() {
            self.order.retain(|p| p != path);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
