//! The generator's in-memory output: path → document.

use bytes::Bytes;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One output document: raw contents plus arbitrary fields (front matter,
/// remote attributes).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileEntry {
    pub contents: Bytes,
    pub fields: Map<String, Value>,
}

impl FileEntry {
    pub fn new(contents: impl Into<Bytes>) -> Self {
        Self {
            contents: contents.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// Output path → document, ordered by path.
///
/// Owned by the generator; a sync run borrows it mutably and only ever
/// inserts or overwrites entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileSet {
    files: BTreeMap<String, FileEntry>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite, returning the previous entry at `path`.
    pub fn insert(&mut self, path: impl Into<String>, entry: FileEntry) -> Option<FileEntry> {
        self.files.insert(path.into(), entry)
    }

    pub fn get(&self, path: &str) -> Option<&FileEntry> {
        self.files.get(path)
    }

    pub fn remove(&mut self, path: &str) -> Option<FileEntry> {
        self.files.remove(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileEntry)> {
        self.files.iter().map(|(path, entry)| (path.as_str(), entry))
    }
}

impl FromIterator<(String, FileEntry)> for FileSet {
    fn from_iter<I: IntoIterator<Item = (String, FileEntry)>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}
