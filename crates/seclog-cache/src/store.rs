//! The chunk directory: listing, sizing, and deleting chunk files.
//!
//! The directory is owned by one `LogCache`; files whose names do not parse
//! as chunk names are left alone and never listed.

use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};

use crate::names::is_chunk_name;

/// A chunk file and its on-disk size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkInfo {
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct ChunkStore {
    dir: PathBuf,
}

impl ChunkStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn ensure_dir(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)
    }

    /// All chunks, oldest first. A missing directory lists as empty.
    pub fn list(&self) -> io::Result<Vec<ChunkInfo>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut chunks = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if !is_chunk_name(&name) {
                continue;
            }
            let meta = match entry.metadata() {
                Ok(meta) => meta,
                // deleted between read_dir and stat
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            if meta.is_file() {
                chunks.push(ChunkInfo {
                    name,
                    size: meta.len(),
                });
            }
        }

        chunks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(chunks)
    }

    pub fn size_of(&self, name: &str) -> Option<u64> {
        std::fs::metadata(self.path_of(name))
            .ok()
            .filter(|meta| meta.is_file())
            .map(|meta| meta.len())
    }

    /// Delete one chunk. Already gone counts as success.
    pub fn remove(&self, name: &str) -> io::Result<()> {
        match std::fs::remove_file(self.path_of(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Remove the whole directory tree and recreate it empty.
    pub fn reset(&self) -> io::Result<()> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        self.ensure_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::chunk_name;

    #[test]
    fn missing_dir_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::new(dir.path().join("absent"));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn list_sorts_and_ignores_strays() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::new(dir.path());
        std::fs::write(store.path_of(&chunk_name(300)), b"ccc").unwrap();
        std::fs::write(store.path_of(&chunk_name(100)), b"a").unwrap();
        std::fs::write(store.path_of(&chunk_name(200)), b"bb").unwrap();
        std::fs::write(store.path_of("notes.txt"), b"stray").unwrap();
        std::fs::create_dir(store.path_of(&chunk_name(400))).unwrap();

        let listed = store.list().unwrap();
        let names: Vec<_> = listed.iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec![chunk_name(100), chunk_name(200), chunk_name(300)]);
        assert_eq!(listed.iter().map(|c| c.size).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::new(dir.path());
        let name = chunk_name(1);
        std::fs::write(store.path_of(&name), b"x").unwrap();

        assert_eq!(store.size_of(&name), Some(1));
        store.remove(&name).unwrap();
        store.remove(&name).unwrap();
        assert_eq!(store.size_of(&name), None);
    }

    #[test]
    fn reset_empties_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::new(dir.path().join("logs"));
        store.ensure_dir().unwrap();
        store.ensure_dir().unwrap();
        std::fs::write(store.path_of(&chunk_name(1)), b"x").unwrap();
        std::fs::write(store.path_of("stray"), b"y").unwrap();

        store.reset().unwrap();

        assert!(store.dir().is_dir());
        assert_eq!(std::fs::read_dir(store.dir()).unwrap().count(), 0);
    }
}
