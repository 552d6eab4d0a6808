//! Delivery record set: the bounded, persisted list of identities already sent.

use std::{
    collections::{HashSet, VecDeque},
    fs,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{domain::ItemId, Result};

const STATE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    updated_at: Option<String>,
    ids: Vec<String>,
}

/// Ordered (oldest first), duplicate-free, capacity-bounded set of delivered ids.
#[derive(Debug)]
pub struct DeliveryStore {
    path: PathBuf,
    capacity: usize,
    order: VecDeque<ItemId>,
    members: HashSet<ItemId>,
}

impl DeliveryStore {
    /// Empty store backed by `path`. Capacity is clamped to at least 1.
    pub fn new(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            path: path.into(),
            capacity: capacity.max(1),
            order: VecDeque::new(),
            members: HashSet::new(),
        }
    }

    /// Load persisted state. Missing or unreadable state yields an empty store.
    pub fn load(path: impl Into<PathBuf>, capacity: usize) -> Self {
        let mut store = Self::new(path, capacity);

        let txt = match fs::read_to_string(&store.path) {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %store.path.display(), "no delivery state yet, starting empty");
                return store;
            }
            Err(e) => {
                tracing::warn!(path = %store.path.display(), "failed to read delivery state, starting empty: {e}");
                return store;
            }
        };

        let Some(ids) = parse_state(&txt) else {
            tracing::warn!(path = %store.path.display(), "delivery state is malformed, starting empty");
            return store;
        };

        for id in ids {
            store.append(ItemId(id));
        }
        tracing::info!(
            path = %store.path.display(),
            entries = store.len(),
            "loaded delivery state"
        );
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.members.contains(id)
    }

    /// Identities, oldest first.
    pub fn ids(&self) -> impl Iterator<Item = &ItemId> {
        self.order.iter()
    }

    /// Add `id` if absent, evicting the oldest entries beyond capacity.
    ///
    /// Returns `true` when the id was inserted.
    pub fn append(&mut self, id: ItemId) -> bool {
        if self.members.contains(&id) {
            return false;
        }
        self.members.insert(id.clone());
        self.order.push_back(id);

        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }
        true
    }

    /// Write the current set to disk via a temp file + rename.
    pub fn persist(&self) -> Result<()> {
        let data = StateFile {
            version: STATE_VERSION,
            updated_at: Some(Utc::now().to_rfc3339()),
            ids: self.order.iter().map(|id| id.0.clone()).collect(),
        };
        let txt = serde_json::to_string_pretty(&data)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = tmp_path(&self.path);
        fs::write(&tmp, txt)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Append + persist. A persistence failure is logged and the in-memory
    /// state stays authoritative.
    pub fn record(&mut self, id: ItemId) {
        self.append(id);
        if let Err(e) = self.persist() {
            tracing::error!(
                path = %self.path.display(),
                "failed to persist delivery state (continuing in memory): {e}"
            );
        }
    }
}

/// Accepts the JSON layout or line-delimited ids (one per line).
fn parse_state(txt: &str) -> Option<Vec<String>> {
    let trimmed = txt.trim();
    if trimmed.is_empty() {
        return Some(Vec::new());
    }

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(data) = serde_json::from_str::<StateFile>(trimmed) {
            return Some(clean_ids(data.ids));
        }
        if let Ok(ids) = serde_json::from_str::<Vec<String>>(trimmed) {
            return Some(clean_ids(ids));
        }
        return None;
    }

    let ids = trimmed
        .lines()
        .map(|l| l.trim().to_string())
        .collect::<Vec<_>>();
    if ids.iter().any(|l| l.chars().any(char::is_whitespace)) {
        return None;
    }
    Some(clean_ids(ids))
}

fn clean_ids(ids: Vec<String>) -> Vec<String> {
    ids.into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "state".into());
    name.push(".tmp");
    path.with_file_name(name)
}
