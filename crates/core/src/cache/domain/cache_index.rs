use std::collections::HashMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Index record for one tracked source image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub path: String,
    /// Source modification time, milliseconds since the Unix epoch.
    pub mtime: u64,
    pub faces: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_file: Option<String>,
    #[serde(default)]
    pub no_faces: bool,
}

impl IndexEntry {
    pub fn embedded(path: impl Into<String>, mtime: u64, faces: usize, file: String) -> Self {
        Self {
            path: path.into(),
            mtime,
            faces,
            embedding_file: Some(file),
            no_faces: false,
        }
    }

    /// Marker for an image that was processed and holds no face.
    pub fn no_faces(path: impl Into<String>, mtime: u64) -> Self {
        Self {
            path: path.into(),
            mtime,
            faces: 0,
            embedding_file: None,
            no_faces: true,
        }
    }
}

/// Insertion-ordered map of `path -> IndexEntry`.
///
/// The order survives a save/load round trip: entries are written as a JSON
/// object in iteration order and read back in document order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheIndex {
    entries: OrderedEntries,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
}

impl CacheIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&IndexEntry> {
        self.entries.get(path)
    }

    /// Replaces an existing entry in place or appends a new one.
    pub fn upsert(&mut self, entry: IndexEntry) {
        self.entries.upsert(entry);
    }

    pub fn remove(&mut self, path: &str) -> Option<IndexEntry> {
        self.entries.remove(path)
    }

    /// Keeps entries matching `keep`; returns how many were dropped.
    pub fn retain(&mut self, keep: impl FnMut(&IndexEntry) -> bool) -> usize {
        self.entries.retain(keep)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.items.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.items.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
struct OrderedEntries {
    items: Vec<IndexEntry>,
    positions: HashMap<String, usize>,
}

impl PartialEq for OrderedEntries {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl OrderedEntries {
    fn get(&self, path: &str) -> Option<&IndexEntry> {
        self.positions.get(path).map(|&i| &self.items[i])
    }

    fn upsert(&mut self, entry: IndexEntry) {
        match self.positions.get(&entry.path) {
            Some(&i) => self.items[i] = entry,
            None => {
                self.positions.insert(entry.path.clone(), self.items.len());
                self.items.push(entry);
            }
        }
    }

    fn remove(&mut self, path: &str) -> Option<IndexEntry> {
        let i = self.positions.remove(path)?;
        let removed = self.items.remove(i);
        self.reindex();
        Some(removed)
    }

    fn retain(&mut self, keep: impl FnMut(&IndexEntry) -> bool) -> usize {
        let before = self.items.len();
        self.items.retain(keep);
        let dropped = before - self.items.len();
        if dropped > 0 {
            self.reindex();
        }
        dropped
    }

    fn reindex(&mut self) {
        self.positions = self
            .items
            .iter()
            .enumerate()
            .map(|(i, e)| (e.path.clone(), i))
            .collect();
    }
}

impl Serialize for OrderedEntries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.items.len()))?;
        for entry in &self.items {
            map.serialize_entry(&entry.path, entry)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for OrderedEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = OrderedEntries;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of path to index entry")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = OrderedEntries::default();
                while let Some((key, mut entry)) = access.next_entry::<String, IndexEntry>()? {
                    // The map key is authoritative for the path.
                    entry.path = key;
                    entries.upsert(entry);
                }
                Ok(entries)
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}
