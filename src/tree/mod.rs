//! The tree engine: one generic implementation of `find`/`insert`/`delete`
//! shared by both backends, parameterized over the storage abstraction
//! (`Backend`) rather than duplicated for "in memory" and "on disk".
//!
//! Structural changes (split, merge, redistribute, root collapse) are
//! logged at `trace`/`debug` so a caller can follow a mutation end to end
//! without a debugger.

pub mod memory;
pub mod persistent;

use log::{debug, trace};

use crate::errors::{Error, Result};
use crate::node::{min_occupancy, InternalNode, LeafNode, Node};

/// The storage abstraction a `Tree` is generic over ("backend
/// polymorphism"). Both the in-memory arena and the record-store-backed
/// persistent store implement this with a `Pointer` type that is `Clone +
/// Eq + Hash` — an arena slot index for the former, a `RecordStore::
/// Location` for the latter — so the engine never needs to know which one
/// it's driving.
pub trait Backend<K, V> {
    type Pointer: Clone + Eq + std::hash::Hash + std::fmt::Debug;

    /// The current root, if the tree holds any entries.
    fn root(&self) -> Result<Option<Self::Pointer>>;

    /// Installs `ptr` as the root, replacing whatever was there.
    fn install_root(&mut self, ptr: Self::Pointer) -> Result<()>;

    /// Clears the root, leaving the tree empty.
    fn clear_root(&mut self) -> Result<()>;

    /// Loads the node at `ptr`.
    fn load(&mut self, ptr: &Self::Pointer) -> Result<Node<K, V, Self::Pointer>>;

    /// Allocates a fresh location for `node` and returns its pointer.
    fn alloc(&mut self, node: Node<K, V, Self::Pointer>) -> Result<Self::Pointer>;

    /// Overwrites the node at `ptr`.
    fn save(&mut self, ptr: &Self::Pointer, node: Node<K, V, Self::Pointer>) -> Result<()>;

    /// Releases the node at `ptr`; it is never read again.
    fn dispose(&mut self, ptr: Self::Pointer) -> Result<()>;
}

/// A B+-tree of degree `d` over some `Backend`. See `memory::MemoryBackend`
/// and `persistent::PersistentBackend` for the two concrete instantiations.
pub struct Tree<K, V, B: Backend<K, V>> {
    degree: usize,
    backend: B,
    _marker: std::marker::PhantomData<(K, V)>,
}

/// The chain of internal ancestors visited during a single descent:
/// `(pointer, node, index of the child that continued the descent)`. Built
/// once per operation and walked back to front on the way up, replacing a
/// hash-map-of-parents with an explicit stack — the `(ptr, node)` pairs
/// already carry the identity a hash map would otherwise provide.
type Ancestors<K, P> = Vec<(P, InternalNode<K, P>, usize)>;

impl<K, V, B> Tree<K, V, B>
where
    K: Ord + Clone + std::fmt::Debug,
    V: Clone,
    B: Backend<K, V>,
{
    /// Builds a tree of the given degree over an already-constructed
    /// backend. `degree` must be at least 3: below that a node can't both
    /// split and keep either half at a meaningful minimum occupancy.
    pub fn new(degree: usize, backend: B) -> Result<Self> {
        if degree < 3 {
            return Err(Error::InvalidDegree(degree));
        }
        Ok(Tree {
            degree,
            backend,
            _marker: std::marker::PhantomData,
        })
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn root(&self) -> Result<Option<B::Pointer>> {
        self.backend.root()
    }

    /// The child of `internal` responsible for `key`.
    pub fn child(&self, internal: &InternalNode<K, B::Pointer>, key: &K) -> B::Pointer {
        internal.child(key).clone()
    }

    /// Descends from the root along separator keys, returning the payload
    /// at `key` if present.
    pub fn search(&mut self, key: &K) -> Result<Option<V>> {
        let mut ptr = match self.backend.root()? {
            None => return Ok(None),
            Some(p) => p,
        };
        loop {
            match self.backend.load(&ptr)? {
                Node::Leaf(leaf) => return Ok(leaf.get(key).cloned()),
                Node::Internal(internal) => {
                    ptr = internal.child(key).clone();
                }
            }
        }
    }

    /// Inserts `(key, value)`. Rejects a duplicate key without changing
    /// any state.
    pub fn insert(&mut self, key: K, value: V) -> Result<()> {
        trace!("insert: descending for {:?}", key);
        let root_ptr = match self.backend.root()? {
            None => {
                let mut l = LeafNode::new();
                l.insert(key, value);
                let ptr = self.backend.alloc(Node::Leaf(l))?;
                self.backend.install_root(ptr)?;
                debug!("insert: first entry, leaf root created");
                return Ok(());
            }
            Some(p) => p,
        };

        // Descend, remembering every internal ancestor and which child
        // index led onward, so a split can walk back up without a second
        // traversal.
        let mut ancestors: Ancestors<K, B::Pointer> = Vec::new();
        let mut ptr = root_ptr;
        let mut leaf = loop {
            match self.backend.load(&ptr)? {
                Node::Leaf(leaf) => break leaf,
                Node::Internal(internal) => {
                    let idx = internal.child_index(&key);
                    let next = internal.children()[idx].clone();
                    ancestors.push((ptr, internal, idx));
                    ptr = next;
                }
            }
        };

        if leaf.contains(&key) {
            return Err(Error::InvalidInsertion);
        }

        if !leaf.is_full(self.degree) {
            leaf.insert(key, value);
            self.backend.save(&ptr, Node::Leaf(leaf))?;
            return Ok(());
        }

        // Leaf is full: build an oversize working leaf holding every old
        // entry plus the new one, then split it in two.
        let mut temp = LeafNode::new();
        let old_count = leaf.key_count();
        let old_successor = leaf.successor().cloned();
        temp.append(&mut leaf, 0, old_count);
        temp.insert(key, value);

        let d = self.degree;
        let m = min_occupancy(d);
        // Splitting an oversize leaf of `temp.key_count()` entries keeps
        // `floor(d/2)` on the left and gives the newly allocated right leaf
        // the remaining `ceil(d/2)` (see DESIGN.md for the boundary
        // arithmetic).
        let boundary = temp.key_count() - m;
        let mut left = LeafNode::new();
        left.append(&mut temp, 0, boundary);
        let mut right = LeafNode::new();
        let remaining = temp.key_count();
        right.append(&mut temp, 0, remaining);
        right.set_successor(old_successor);

        let separator = right
            .first_key()
            .cloned()
            .expect("freshly split leaf is never empty");

        let right_ptr = self.backend.alloc(Node::Leaf(right))?;
        left.set_successor(Some(right_ptr.clone()));
        self.backend.save(&ptr, Node::Leaf(left))?;

        debug!(
            "insert: split leaf at {:?}, promoting separator {:?}",
            ptr, separator
        );
        self.insert_in_parent(ancestors, ptr, separator, right_ptr)
    }

    /// Installs `(separator, right)` immediately right of `left` in
    /// `left`'s parent, splitting that parent (and recursing upward) if it
    /// is already full, or creating a new root if `left` had no parent.
    fn insert_in_parent(
        &mut self,
        mut ancestors: Ancestors<K, B::Pointer>,
        left: B::Pointer,
        separator: K,
        right: B::Pointer,
    ) -> Result<()> {
        let (parent_ptr, mut parent) = match ancestors.pop() {
            None => {
                let new_root = InternalNode::new(left, separator, right);
                let ptr = self.backend.alloc(Node::Internal(new_root))?;
                self.backend.install_root(ptr)?;
                debug!("insert: new root created, height increases by one");
                return Ok(());
            }
            Some((parent_ptr, parent, _idx)) => (parent_ptr, parent),
        };

        if !parent.is_full(self.degree) {
            parent.insert_after(separator, right, &left);
            self.backend.save(&parent_ptr, Node::Internal(parent))?;
            return Ok(());
        }

        // Parent is full: build an oversize working internal of degree
        // `d+1`, insert the new entry into it, then split in two.
        let d = self.degree;
        let mut temp = InternalNode::empty();
        temp.absorb(parent);
        temp.insert_after(separator, right, &left);

        let m = min_occupancy(d + 1);
        let mut new_left = InternalNode::empty();
        new_left.copy(&temp, 0, m - 1);
        let mut new_right = InternalNode::empty();
        new_right.copy(&temp, m, temp.key_count());
        let promoted = temp
            .key_at(m - 1)
            .cloned()
            .expect("oversize internal always has at least m keys after insertion");

        let right_ptr = self.backend.alloc(Node::Internal(new_right))?;
        self.backend.save(&parent_ptr, Node::Internal(new_left))?;

        debug!(
            "insert: split internal at {:?}, promoting separator {:?}",
            parent_ptr, promoted
        );
        self.insert_in_parent(ancestors, parent_ptr, promoted, right_ptr)
    }

    /// Removes `key`, rebalancing leaf-to-root as needed. Fails without
    /// changing any state if `key` is absent.
    pub fn delete(&mut self, key: &K) -> Result<()> {
        trace!("delete: descending for {:?}", key);
        let root_ptr = match self.backend.root()? {
            None => return Err(Error::InvalidDeletion),
            Some(p) => p,
        };

        let mut ancestors: Ancestors<K, B::Pointer> = Vec::new();
        let mut ptr = root_ptr;
        let (mut cur_ptr, mut cur_node) = loop {
            match self.backend.load(&ptr)? {
                Node::Leaf(leaf) => break (ptr, Node::Leaf(leaf)),
                Node::Internal(internal) => {
                    let idx = internal.child_index(key);
                    let next = internal.children()[idx].clone();
                    ancestors.push((ptr, internal, idx));
                    ptr = next;
                }
            }
        };

        let mut key_to_remove = key.clone();
        let mut pending_child: Option<B::Pointer> = None;

        loop {
            Self::remove_from(&mut cur_node, &key_to_remove, pending_child.take())?;

            match ancestors.pop() {
                None => {
                    // `cur_node` is the root: collapse an internal root
                    // left with a single child, and clear a leaf root left
                    // with no keys, so an empty tree reports `root() ->
                    // None` rather than a dangling empty leaf.
                    match &cur_node {
                        Node::Internal(internal) if internal.child_count() == 1 => {
                            let only = internal.children()[0].clone();
                            self.backend.dispose(cur_ptr)?;
                            self.backend.install_root(only)?;
                            debug!("delete: root collapsed, height decreases by one");
                            return Ok(());
                        }
                        Node::Leaf(leaf) if leaf.key_count() == 0 => {
                            self.backend.dispose(cur_ptr)?;
                            self.backend.clear_root()?;
                            debug!("delete: last entry removed, tree is now empty");
                            return Ok(());
                        }
                        _ => {}
                    }
                    self.backend.save(&cur_ptr, cur_node)?;
                    return Ok(());
                }
                Some((parent_ptr, mut parent, idx)) => {
                    if !cur_node.is_under_utilized(self.degree) {
                        self.backend.save(&cur_ptr, cur_node)?;
                        return Ok(());
                    }

                    // Choose a sibling: left if one exists, else right.
                    let (left_biased, sib_idx) = if idx > 0 {
                        (true, idx - 1)
                    } else {
                        let right_idx = idx + 1;
                        assert!(
                            right_idx < parent.child_count(),
                            "an under-utilized non-root node always has a sibling"
                        );
                        (false, right_idx)
                    };
                    let k_prime_idx = if left_biased { sib_idx } else { idx };
                    let k_prime = parent
                        .key_at(k_prime_idx)
                        .cloned()
                        .expect("separator between N and its chosen sibling must exist");
                    let sib_ptr = parent.children()[sib_idx].clone();
                    let sib_node = self.backend.load(&sib_ptr)?;

                    if cur_node.mergeable(&sib_node, self.degree) {
                        let (left_ptr, mut left_node, right_ptr, right_node) = if left_biased {
                            (sib_ptr, sib_node, cur_ptr, cur_node)
                        } else {
                            (cur_ptr, cur_node, sib_ptr, sib_node)
                        };
                        Self::merge(&mut left_node, k_prime.clone(), right_node);
                        debug!(
                            "delete: merged {:?} and {:?} under separator {:?}",
                            left_ptr, right_ptr, k_prime
                        );
                        self.backend.save(&left_ptr, left_node)?;
                        self.backend.dispose(right_ptr.clone())?;

                        // Recurse deleteEntry(par, KPrime) to remove the
                        // now-defunct separator and the pointer to `right`.
                        cur_ptr = parent_ptr;
                        cur_node = Node::Internal(parent);
                        key_to_remove = k_prime;
                        pending_child = Some(right_ptr);
                    } else {
                        let mut n_prime = sib_node;
                        let new_k_prime =
                            Self::redistribute(&mut cur_node, &mut n_prime, left_biased, k_prime);
                        parent.replace_key_at(k_prime_idx, new_k_prime);
                        debug!(
                            "delete: redistributed between {:?} and {:?}",
                            cur_ptr, sib_ptr
                        );
                        self.backend.save(&cur_ptr, cur_node)?;
                        self.backend.save(&sib_ptr, n_prime)?;
                        self.backend.save(&parent_ptr, Node::Internal(parent))?;
                        return Ok(());
                    }
                }
            }
        }
    }

    fn remove_from(
        node: &mut Node<K, V, B::Pointer>,
        key: &K,
        pending_child: Option<B::Pointer>,
    ) -> Result<()> {
        match node {
            Node::Leaf(leaf) => {
                if leaf.remove(key).is_none() {
                    return Err(Error::InvalidDeletion);
                }
            }
            Node::Internal(internal) => {
                if internal.remove_key(key).is_none() {
                    return Err(Error::InvalidDeletion);
                }
                if let Some(child) = pending_child {
                    let pos = internal
                        .children()
                        .iter()
                        .position(|c| *c == child)
                        .expect("merged-away child pointer must still be present");
                    internal.remove_child_at(pos);
                }
            }
        }
        Ok(())
    }

    /// Merge step: the left of the pair absorbs the right.
    fn merge(left: &mut Node<K, V, B::Pointer>, k_prime: K, right: Node<K, V, B::Pointer>) {
        match (left, right) {
            (Node::Leaf(l), Node::Leaf(r)) => {
                let mut r = r;
                let successor = r.successor().cloned();
                let count = r.key_count();
                l.append(&mut r, 0, count);
                l.set_successor(successor);
            }
            (Node::Internal(l), Node::Internal(r)) => {
                l.merge_from(k_prime, r);
            }
            _ => unreachable!("siblings at the same level are always the same kind"),
        }
    }

    /// Redistribute step: borrows one entry across the sibling boundary
    /// between `n` and `n_prime`, returning the new `KPrime` the caller
    /// must install back into the parent at the separator index.
    fn redistribute(
        n: &mut Node<K, V, B::Pointer>,
        n_prime: &mut Node<K, V, B::Pointer>,
        left_biased: bool,
        k_prime: K,
    ) -> K {
        match (n, n_prime) {
            (Node::Leaf(n), Node::Leaf(np)) => {
                if left_biased {
                    let (k, v) = np.remove_at(np.key_count() - 1);
                    n.insert(k, v);
                    n.first_key().cloned().expect("n just gained an entry")
                } else {
                    let (k, v) = np.remove_at(0);
                    n.insert(k, v);
                    np.first_key()
                        .cloned()
                        .expect("np still has its remaining entries")
                }
            }
            (Node::Internal(n), Node::Internal(np)) => {
                if left_biased {
                    let m = np.child_count() - 1;
                    let moved_child = np.child_at(m).cloned().expect("np has a last child");
                    let moved_key = np
                        .key_at(m - 1)
                        .cloned()
                        .expect("np has a separator before its last child");
                    np.remove_child_at(m);
                    np.remove_key(&moved_key);
                    n.insert_front(k_prime, moved_child);
                    moved_key
                } else {
                    let moved_child = np.child_at(0).cloned().expect("np has a first child");
                    let moved_key = np
                        .key_at(0)
                        .cloned()
                        .expect("np has a separator after its first child");
                    np.remove_child_at(0);
                    np.remove_key(&moved_key);
                    n.insert_back(k_prime, moved_child);
                    moved_key
                }
            }
            _ => unreachable!("siblings at the same level are always the same kind"),
        }
    }
}
