//! Persistent backend: nodes live in an external `RecordStore`, addressed
//! by opaque locations. `child(n, i)` goes through `store.get`, `save`
//! writes back through `store.put`, and disposal removes the record
//! outright — a node reference is always a location to be resolved
//! through the storage pool rather than a live pointer.
//!
//! The record store contract is generic over the stored object type. This
//! backend stores two kinds of record under one `FileId`
//! namespace: node bodies, and the single reserved root pointer kept at
//! `store.first()`. `Record` tags which one a given location holds, since
//! a `RecordStore<T>` fixes `T` to one type.

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::node::Node;
use crate::store::{FileId, RecordStore};
use crate::tree::Backend;

/// What a persistent backend stores at one location: either a node body,
/// or (only ever at `store.first()`) the current root pointer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Record<K, V, Loc> {
    Root(Option<Loc>),
    Body(Node<K, V, Loc>),
}

/// A persistent backend over record store `S`, namespaced under
/// `file_id`. `S::Location` is what internal nodes store as child
/// pointers.
pub struct PersistentBackend<K, V, S: RecordStore<Record<K, V, S::Location>>> {
    store: S,
    file_id: FileId,
}

impl<K, V, S: RecordStore<Record<K, V, S::Location>>> PersistentBackend<K, V, S> {
    pub fn new(store: S, file_id: FileId) -> Self {
        PersistentBackend { store, file_id }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

impl<K, V, S> Backend<K, V> for PersistentBackend<K, V, S>
where
    S: RecordStore<Record<K, V, S::Location>>,
{
    type Pointer = S::Location;

    fn root(&self) -> Result<Option<S::Location>> {
        match self.store.get(self.file_id, &self.store.first())? {
            None => Ok(None),
            Some(Record::Root(ptr)) => Ok(ptr),
            Some(Record::Body(_)) => Err(Error::InvalidLocation(
                crate::errors::LocationDebug::of(&self.store.first()),
            )),
        }
    }

    fn install_root(&mut self, ptr: S::Location) -> Result<()> {
        let first = self.store.first();
        self.store.put(self.file_id, &first, Record::Root(Some(ptr)))?;
        Ok(())
    }

    fn clear_root(&mut self) -> Result<()> {
        let first = self.store.first();
        self.store.put(self.file_id, &first, Record::Root(None))?;
        Ok(())
    }

    fn load(&mut self, ptr: &S::Location) -> Result<Node<K, V, S::Location>> {
        match self.store.get(self.file_id, ptr)? {
            Some(Record::Body(node)) => Ok(node),
            Some(Record::Root(_)) => {
                Err(Error::InvalidLocation(crate::errors::LocationDebug::of(ptr)))
            }
            None => Err(Error::InvalidLocation(crate::errors::LocationDebug::of(ptr))),
        }
    }

    fn alloc(&mut self, node: Node<K, V, S::Location>) -> Result<S::Location> {
        self.store.add(self.file_id, Record::Body(node))
    }

    fn save(&mut self, ptr: &S::Location, node: Node<K, V, S::Location>) -> Result<()> {
        self.store.put(self.file_id, ptr, Record::Body(node))?;
        Ok(())
    }

    fn dispose(&mut self, ptr: S::Location) -> Result<()> {
        self.store.remove(self.file_id, &ptr)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemRecordStore;
    use crate::tree::Tree;

    type TestBackend = PersistentBackend<i32, &'static str, MemRecordStore<Record<i32, &'static str, crate::store::Slot>>>;

    fn tree(degree: usize) -> Tree<i32, &'static str, TestBackend> {
        let store = MemRecordStore::new();
        let backend = PersistentBackend::new(store, 1);
        Tree::new(degree, backend).unwrap()
    }

    fn leaf_chain(t: &mut Tree<i32, &'static str, TestBackend>) -> Vec<i32> {
        let mut out = Vec::new();
        let root = match t.root().unwrap() {
            None => return out,
            Some(p) => p,
        };
        let mut ptr = root;
        loop {
            match t.backend_mut().load(&ptr).unwrap() {
                Node::Leaf(_) => break,
                Node::Internal(i) => ptr = i.children()[0].clone(),
            }
        }
        loop {
            match t.backend_mut().load(&ptr).unwrap() {
                Node::Leaf(l) => {
                    out.extend(l.keys().iter().copied());
                    match l.successor() {
                        Some(next) => ptr = next.clone(),
                        None => break,
                    }
                }
                Node::Internal(_) => unreachable!(),
            }
        }
        out
    }

    #[test]
    fn empty_tree_has_no_root() {
        let mut t = tree(3);
        assert_eq!(t.root().unwrap(), None);
        assert_eq!(t.search(&1).unwrap(), None);
    }

    #[test]
    fn persistent_backend_splits_and_merges_like_the_in_memory_one() {
        let mut t = tree(3);
        t.insert(1, "a").unwrap();
        t.insert(2, "b").unwrap();
        t.insert(3, "c").unwrap();
        assert_eq!(leaf_chain(&mut t), vec![1, 2, 3]);
        t.insert(4, "d").unwrap();
        t.insert(5, "e").unwrap();
        assert_eq!(leaf_chain(&mut t), vec![1, 2, 3, 4, 5]);
        t.delete(&1).unwrap();
        t.delete(&2).unwrap();
        assert_eq!(leaf_chain(&mut t), vec![3, 4, 5]);
    }

    #[test]
    fn disposed_nodes_are_actually_removed_from_the_store() {
        let mut t = tree(3);
        t.insert(1, "a").unwrap();
        t.insert(2, "b").unwrap();
        t.insert(3, "c").unwrap();
        let root_ptr = t.root().unwrap().unwrap();
        let internal = t.backend_mut().load(&root_ptr).unwrap();
        let right_ptr = internal.as_internal().unwrap().children()[1].clone();
        t.delete(&3).unwrap();
        // The right leaf merged away; its location must no longer resolve.
        assert!(t.backend_mut().load(&right_ptr).is_err());
    }
}
