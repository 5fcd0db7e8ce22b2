//! The record store contract — the only external dependency of the
//! persistent backend. Also ships two concrete implementations: an
//! in-process `MemRecordStore` for tests and demos, and a disk-backed
//! `FileRecordStore` that serializes nodes with `bincode` and persists
//! them to their underlying storage devices.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use log::trace;
use serde::{de::DeserializeOwned, Serialize};

use crate::errors::{Error, Result};

/// Namespaces multiple trees within one store.
pub type FileId = u64;

/// A record store: an external key-value store of opaque locations to
/// node objects, the durability substrate for the persistent backend.
/// `Location` values are what internal nodes store as child pointers in
/// the persistent backend.
pub trait RecordStore<T> {
    type Location: Clone + Eq + std::hash::Hash + std::fmt::Debug;

    /// A fixed, distinguished location reserved to hold *the pointer to
    /// the current root node*. Never stores a node body itself.
    fn first(&self) -> Self::Location;

    /// Stores `obj` at a fresh location, returns it.
    fn add(&mut self, file_id: FileId, obj: T) -> Result<Self::Location>;

    /// Retrieves the object at `loc`, or `None` if the location has never
    /// been written or has been removed.
    fn get(&self, file_id: FileId, loc: &Self::Location) -> Result<Option<T>>;

    /// Overwrites the object at an existing location, returning the
    /// displaced value.
    fn put(&mut self, file_id: FileId, loc: &Self::Location, obj: T) -> Result<Option<T>>;

    /// Clears the location, returning the displaced value.
    fn remove(&mut self, file_id: FileId, loc: &Self::Location) -> Result<Option<T>>;
}

/// A record location inside a `MemRecordStore` or `FileRecordStore`: a
/// per-`FileId` monotonically increasing slot number. Slot `0` is always
/// `first()` and never holds a node body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, serde::Deserialize)]
pub struct Slot(pub u64);

/// An in-process record store backed by a `HashMap`. Useful for tests and
/// for demoing the persistent backend without touching disk.
#[derive(Debug, Default)]
pub struct MemRecordStore<T> {
    files: HashMap<FileId, HashMap<Slot, T>>,
    next_slot: HashMap<FileId, u64>,
}

impl<T> MemRecordStore<T> {
    pub fn new() -> Self {
        MemRecordStore {
            files: HashMap::new(),
            next_slot: HashMap::new(),
        }
    }

    fn next(&mut self, file_id: FileId) -> Slot {
        let counter = self.next_slot.entry(file_id).or_insert(1);
        let slot = Slot(*counter);
        *counter += 1;
        slot
    }
}

impl<T: Clone> RecordStore<T> for MemRecordStore<T> {
    type Location = Slot;

    fn first(&self) -> Slot {
        Slot(0)
    }

    fn add(&mut self, file_id: FileId, obj: T) -> Result<Slot> {
        let slot = self.next(file_id);
        self.files.entry(file_id).or_default().insert(slot, obj);
        Ok(slot)
    }

    fn get(&self, file_id: FileId, loc: &Slot) -> Result<Option<T>> {
        Ok(self
            .files
            .get(&file_id)
            .and_then(|f| f.get(loc))
            .cloned())
    }

    fn put(&mut self, file_id: FileId, loc: &Slot, obj: T) -> Result<Option<T>> {
        Ok(self.files.entry(file_id).or_default().insert(*loc, obj))
    }

    fn remove(&mut self, file_id: FileId, loc: &Slot) -> Result<Option<T>> {
        Ok(self.files.entry(file_id).or_default().remove(loc))
    }
}

/// A disk-backed record store: each location is a file under `base_dir`,
/// serialized with `bincode`. A fresh `next_id` counter is kept per file
/// namespace; `first()` is the reserved slot `0`, written through the same
/// path as every other slot so the root pointer survives a restart.
pub struct FileRecordStore<T> {
    base_dir: PathBuf,
    next_id: AtomicU64,
    _marker: std::marker::PhantomData<T>,
}

impl<T> FileRecordStore<T> {
    pub fn open(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;
        Ok(FileRecordStore {
            base_dir,
            next_id: AtomicU64::new(1),
            _marker: std::marker::PhantomData,
        })
    }

    fn path(&self, file_id: FileId, loc: &Slot) -> PathBuf {
        self.base_dir.join(format!("{file_id}.{}.node", loc.0))
    }
}

impl<T> RecordStore<T> for FileRecordStore<T>
where
    T: Serialize + DeserializeOwned,
{
    type Location = Slot;

    fn first(&self) -> Slot {
        Slot(0)
    }

    fn add(&mut self, file_id: FileId, obj: T) -> Result<Slot> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let slot = Slot(id);
        self.put(file_id, &slot, obj)?;
        Ok(slot)
    }

    fn get(&self, file_id: FileId, loc: &Slot) -> Result<Option<T>> {
        let path = self.path(file_id, loc);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(Error::Corrupt)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn put(&mut self, file_id: FileId, loc: &Slot, obj: T) -> Result<Option<T>> {
        let prior = self.get(file_id, loc)?;
        let path = self.path(file_id, loc);
        let bytes = bincode::serialize(&obj).map_err(Error::Corrupt)?;
        fs::write(&path, bytes)?;
        trace!("FileRecordStore: wrote {file_id}/{loc:?}");
        Ok(prior)
    }

    fn remove(&mut self, file_id: FileId, loc: &Slot) -> Result<Option<T>> {
        let prior = self.get(file_id, loc)?;
        let path = self.path(file_id, loc);
        match fs::remove_file(&path) {
            Ok(()) => Ok(prior),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }
}
