//! In-memory backend: the tree owns its nodes outright.
//!
//! Root held as a direct owning reference; child access dereferences the
//! stored pointer directly; `save` is a no-op in spirit. A literal Rust
//! reading of that (raw `Box<Node>` recursion with parent back-references)
//! would force every structural operation into unsafe pointer juggling or
//! a second, divergent implementation of `find`/`insertInParent`/
//! `deleteEntry` just for this backend. Instead this backend hands out a
//! stable, `Copy + Eq + Hash` arena slot index as its `Pointer`, so the
//! *one* tree engine in `tree::mod` drives both backends identically.
//! Externally the behavior is unchanged: nodes are never aliased, `save`
//! never needs to durably flush anything beyond the process's own memory,
//! and disposal is synchronous.

use crate::errors::Result;
use crate::node::Node;
use crate::tree::Backend;

/// An arena slot index. Cheap to copy, hashable, meaningless outside the
/// `MemoryBackend` that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemPtr(usize);

/// An in-memory backend: a `Vec`-backed arena of nodes plus a free list
/// for slots vacated by `dispose` (merge) — a process-local object store
/// with no durability story.
#[derive(Debug, Default)]
pub struct MemoryBackend<K, V> {
    slots: Vec<Option<Node<K, V, MemPtr>>>,
    free: Vec<usize>,
    root: Option<MemPtr>,
}

impl<K, V> MemoryBackend<K, V> {
    pub fn new() -> Self {
        MemoryBackend {
            slots: Vec::new(),
            free: Vec::new(),
            root: None,
        }
    }
}

impl<K: Clone, V: Clone> Backend<K, V> for MemoryBackend<K, V> {
    type Pointer = MemPtr;

    fn root(&self) -> Result<Option<MemPtr>> {
        Ok(self.root)
    }

    fn install_root(&mut self, ptr: MemPtr) -> Result<()> {
        self.root = Some(ptr);
        Ok(())
    }

    fn clear_root(&mut self) -> Result<()> {
        self.root = None;
        Ok(())
    }

    fn load(&mut self, ptr: &MemPtr) -> Result<Node<K, V, MemPtr>> {
        Ok(self.slots[ptr.0]
            .clone()
            .expect("MemPtr always refers to a live slot until disposed"))
    }

    fn alloc(&mut self, node: Node<K, V, MemPtr>) -> Result<MemPtr> {
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(node);
            Ok(MemPtr(idx))
        } else {
            self.slots.push(Some(node));
            Ok(MemPtr(self.slots.len() - 1))
        }
    }

    fn save(&mut self, ptr: &MemPtr, node: Node<K, V, MemPtr>) -> Result<()> {
        self.slots[ptr.0] = Some(node);
        Ok(())
    }

    fn dispose(&mut self, ptr: MemPtr) -> Result<()> {
        self.slots[ptr.0] = None;
        self.free.push(ptr.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Tree;

    fn tree(degree: usize) -> Tree<i32, &'static str, MemoryBackend<i32, &'static str>> {
        Tree::new(degree, MemoryBackend::new()).unwrap()
    }

    fn leaf_chain(t: &mut Tree<i32, &'static str, MemoryBackend<i32, &'static str>>) -> Vec<i32> {
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
                Node::Internal(_) => unreachable!("successor never points at an internal node"),
            }
        }
        out
    }

    #[test]
    fn leaf_root_splits_into_two_on_overflow() {
        let mut t = tree(3);
        t.insert(1, "a").unwrap();
        t.insert(2, "b").unwrap();
        t.insert(3, "c").unwrap();
        assert_eq!(leaf_chain(&mut t), vec![1, 2, 3]);

        let root_ptr = t.root().unwrap().unwrap();
        let root = t.backend_mut().load(&root_ptr).unwrap();
        let internal = root.as_internal().unwrap();
        assert_eq!(internal.keys(), &[2]);
        let left = t.backend_mut().load(&internal.children()[0]).unwrap();
        let right = t.backend_mut().load(&internal.children()[1]).unwrap();
        assert_eq!(left.as_leaf().unwrap().keys(), &[1]);
        assert_eq!(right.as_leaf().unwrap().keys(), &[2, 3]);
    }

    #[test]
    fn repeated_splits_cascade_to_a_new_root() {
        let mut t = tree(3);
        for (k, v) in [(1, "a"), (2, "b"), (3, "c"), (4, "d"), (5, "e")] {
            t.insert(k, v).unwrap();
        }
        assert_eq!(leaf_chain(&mut t), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn underflowing_leaf_merges_with_sibling_on_delete() {
        let mut t = tree(3);
        t.insert(1, "a").unwrap();
        t.insert(2, "b").unwrap();
        t.insert(3, "c").unwrap();
        t.delete(&3).unwrap();
        assert_eq!(leaf_chain(&mut t), vec![1, 2]);
        let root_ptr = t.root().unwrap().unwrap();
        let root = t.backend_mut().load(&root_ptr).unwrap();
        assert!(root.is_leaf(), "root collapses to a single leaf");
    }

    #[test]
    fn repeated_merges_cascade_to_a_root_collapse() {
        let mut t = tree(3);
        for (k, v) in [(1, "a"), (2, "b"), (3, "c"), (4, "d"), (5, "e")] {
            t.insert(k, v).unwrap();
        }
        t.delete(&1).unwrap();
        t.delete(&2).unwrap();
        assert_eq!(leaf_chain(&mut t), vec![3, 4, 5]);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut t = tree(3);
        t.insert(100, "x1").unwrap();
        let err = t.insert(100, "x2").unwrap_err();
        assert!(matches!(err, crate::errors::Error::InvalidInsertion));
        assert_eq!(leaf_chain(&mut t), vec![100]);
    }

    #[test]
    fn delete_of_absent_key_signals_and_is_a_no_op() {
        let mut t = tree(3);
        t.insert(1, "a").unwrap();
        let err = t.delete(&99).unwrap_err();
        assert!(matches!(err, crate::errors::Error::InvalidDeletion));
        assert_eq!(leaf_chain(&mut t), vec![1]);
    }

    #[test]
    fn insert_then_delete_restores_key_set() {
        let mut t: Tree<i32, i32, MemoryBackend<i32, i32>> =
            Tree::new(4, MemoryBackend::new()).unwrap();
        for k in 1..=20 {
            t.insert(k, k * 10).unwrap();
        }
        for k in (1..=20).step_by(2) {
            t.delete(&k).unwrap();
        }
        let mut chain = Vec::new();
        let root = t.root().unwrap().unwrap();
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
                    chain.extend(l.keys().iter().copied());
                    match l.successor() {
                        Some(next) => ptr = next.clone(),
                        None => break,
                    }
                }
                Node::Internal(_) => unreachable!(),
            }
        }
        assert_eq!(chain, vec![2, 4, 6, 8, 10, 12, 14, 16, 18, 20]);
    }

    #[test]
    fn search_finds_every_inserted_key_and_nothing_else() {
        let mut t: Tree<i32, String, MemoryBackend<i32, String>> =
            Tree::new(4, MemoryBackend::new()).unwrap();
        for k in 1..=30 {
            t.insert(k, format!("v{k}")).unwrap();
        }
        for k in 1..=30 {
            assert_eq!(t.search(&k).unwrap(), Some(format!("v{k}")));
        }
        assert_eq!(t.search(&0).unwrap(), None);
        assert_eq!(t.search(&31).unwrap(), None);
    }
}
