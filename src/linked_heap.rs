use tracing::trace;

use crate::{
    Error, Result,
    utils::{NIL, NodeArena, NodeRef, NodeView, Side},
};

/// Read-only view of a node in a [`LinkedHeap`]
pub type HeapNode<'a, K, V> = NodeView<'a, K, V, ()>;

/// A binary min-heap stored as a linked, complete binary tree.
///
/// Positions are addressed with 1-indexed binary paths: index 1 is the root and
/// the children of index `k` are `2k` and `2k + 1`. Sifting relinks whole nodes
/// instead of exchanging payloads, so the [`NodeRef`] returned by
/// [`insert`](Self::insert) keeps naming the same entry until that entry is
/// extracted or deleted, which is what allows removing arbitrary entries by
/// reference.
///
/// # Examples
///
/// ```
/// # use ta_price_window::LinkedHeap;
/// let mut heap = LinkedHeap::new();
/// for key in [1, 4, 10, 6, 8, 15, 12, 9, 13] {
///     heap.insert(key, key * 10);
/// }
/// let six = heap.node_at(4).unwrap().handle();
///
/// assert_eq!(heap.extract(), Ok((1, 10)));
/// assert_eq!(heap.extract(), Ok((4, 40)));
/// assert_eq!(heap.len(), 7);
///
/// // The reference still names key 6 after the sifts above
/// assert_eq!(heap.delete_node(six), Ok((6, 60)));
/// assert_eq!(heap.peek(), Some((&8, &80)));
/// ```
#[derive(Debug, Clone)]
pub struct LinkedHeap<K, V> {
    /// Node storage; links are indices into it
    arena: NodeArena<K, V, ()>,
    /// Index of the root node, `NIL` when empty
    root: usize,
    /// Number of linked nodes
    len: usize,
}

impl<K: Ord, V> Default for LinkedHeap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, V> LinkedHeap<K, V> {
    /// Creates an empty heap
    pub fn new() -> Self {
        Self {
            arena: NodeArena::new(),
            root: NIL,
            len: 0,
        }
    }

    /// Creates an empty heap with room for `capacity` nodes before reallocating
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            arena: NodeArena::with_capacity(capacity),
            root: NIL,
            len: 0,
        }
    }

    /// Returns the number of nodes linked into the heap
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no nodes are linked into the heap
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns a view of the root, the node with the smallest key
    #[inline]
    pub fn root(&self) -> Option<HeapNode<'_, K, V>> {
        (self.root != NIL).then(|| self.arena.view(self.root))
    }

    /// Returns the smallest key and its value without removing them
    #[inline]
    pub fn peek(&self) -> Option<(&K, &V)> {
        self.root().map(|node| (node.key(), node.value()))
    }

    /// Returns a view of the node named by `handle`.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidNode`] - the node was removed or never belonged to this heap
    pub fn get(&self, handle: NodeRef) -> Result<HeapNode<'_, K, V>> {
        self.arena.resolve(handle).map(|idx| self.arena.view(idx))
    }

    /// Returns `true` if `handle` names a node currently linked into the heap
    pub fn contains(&self, handle: NodeRef) -> bool {
        self.arena
            .resolve(handle)
            .is_ok_and(|idx| self.is_linked(idx))
    }

    /// Removes every node, invalidating all outstanding references
    pub fn clear(&mut self) {
        self.arena.clear();
        self.root = NIL;
        self.len = 0;
    }

    /// Returns the node at 1-indexed position `index` in level order.
    ///
    /// The bits of `index` below its leading one spell the path from the root,
    /// `0` stepping left and `1` stepping right.
    ///
    /// # Errors
    ///
    /// * [`Error::OutOfRange`] - `index` is 0 or larger than [`len`](Self::len)
    pub fn node_at(&self, index: usize) -> Result<HeapNode<'_, K, V>> {
        self.locate(index).map(|idx| self.arena.view(idx))
    }

    /// Creates a node that is not yet part of the heap.
    ///
    /// The returned reference can be stored before the node is linked with
    /// [`insert_node`](Self::insert_node).
    pub fn allocate(&mut self, key: K, value: V) -> NodeRef {
        let idx = self.arena.allocate(key, value);
        self.arena.handle(idx)
    }

    /// Frees a node obtained from [`allocate`](Self::allocate) that was never linked.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidNode`] - `handle` is stale or foreign
    /// * [`Error::InvalidStructure`] - the node is linked into the heap
    pub fn release(&mut self, handle: NodeRef) -> Result<(K, V)> {
        let idx = self.arena.resolve(handle)?;
        if self.is_linked(idx) {
            return Err(Error::InvalidStructure("node is linked into the heap"));
        }
        Ok(self.arena.deallocate(idx))
    }

    /// Creates a node for `key` and `value` and links it into the heap.
    ///
    /// # Returns
    ///
    /// * `NodeRef` - A reference that stays valid until the node is removed
    pub fn insert(&mut self, key: K, value: V) -> NodeRef {
        let idx = self.arena.allocate(key, value);
        self.link_new(idx);
        self.arena.handle(idx)
    }

    /// Links a node created by [`allocate`](Self::allocate) into the heap.
    ///
    /// The node becomes the next leaf in level order and is sifted up.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidNode`] - `handle` is stale or foreign
    /// * [`Error::InvalidStructure`] - the node is already linked
    pub fn insert_node(&mut self, handle: NodeRef) -> Result<NodeRef> {
        let idx = self.arena.resolve(handle)?;
        if self.is_linked(idx) {
            return Err(Error::InvalidStructure("node is already linked into the heap"));
        }
        self.link_new(idx);
        Ok(handle)
    }

    /// Removes the node with the smallest key.
    ///
    /// The last leaf takes over the root position and is sifted down.
    ///
    /// # Errors
    ///
    /// * [`Error::Empty`] - the heap has no nodes
    pub fn extract(&mut self) -> Result<(K, V)> {
        if self.len == 0 {
            return Err(Error::Empty);
        }

        let old_root = self.root;
        if self.len == 1 {
            self.root = NIL;
        } else {
            let last = self.locate(self.len)?;
            self.replace_with_leaf(old_root, last)?;
            self.sift_down(last);
        }
        self.len -= 1;

        #[cfg(debug_assertions)]
        debug_assert!(
            self.verify_heap_invariants(),
            "heap invariants violated after extraction"
        );

        Ok(self.arena.deallocate(old_root))
    }

    /// Removes the node named by `handle`, wherever it sits in the heap.
    ///
    /// The last leaf takes over the removed node's position and is sifted up or
    /// down, whichever restores heap order.
    ///
    /// # Errors
    ///
    /// * [`Error::Empty`] - the heap has no nodes
    /// * [`Error::InvalidNode`] - `handle` is stale or foreign
    /// * [`Error::InvalidStructure`] - the node is not linked into the heap
    pub fn delete_node(&mut self, handle: NodeRef) -> Result<(K, V)> {
        if self.len == 0 {
            return Err(Error::Empty);
        }
        let idx = self.arena.resolve(handle)?;
        if !self.is_linked(idx) {
            return Err(Error::InvalidStructure("node is not linked into the heap"));
        }

        if self.len == 1 {
            self.root = NIL;
        } else {
            let last = self.locate(self.len)?;
            if last == idx {
                let parent = self.arena.parent(idx);
                self.arena.remove_leaf(parent, idx)?;
            } else {
                self.replace_with_leaf(idx, last)?;
                let parent = self.arena.parent(last);
                if parent != NIL && self.arena.node(last).key < self.arena.node(parent).key {
                    self.sift_up(last);
                } else {
                    self.sift_down(last);
                }
            }
        }
        self.len -= 1;

        #[cfg(debug_assertions)]
        debug_assert!(
            self.verify_heap_invariants(),
            "heap invariants violated after deletion"
        );

        Ok(self.arena.deallocate(idx))
    }

    #[inline]
    fn is_linked(&self, idx: usize) -> bool {
        idx == self.root || self.arena.parent(idx) != NIL
    }

    /// Attaches the isolated node `idx` as the next leaf and sifts it up
    fn link_new(&mut self, idx: usize) {
        if self.root == NIL {
            self.root = idx;
            self.len = 1;
            return;
        }

        let position = self.len + 1;
        let side = if position & 1 == 0 {
            Side::Left
        } else {
            Side::Right
        };
        // position / 2 is in [1, len] and every such position is occupied
        let Ok(parent) = self.locate(position / 2) else {
            unreachable!("complete heap of {} nodes has no position {}", self.len, position / 2);
        };
        self.arena.set_child(parent, side, idx);
        self.len += 1;
        self.sift_up(idx);

        #[cfg(debug_assertions)]
        debug_assert!(
            self.verify_heap_invariants(),
            "heap invariants violated after insertion"
        );
    }

    fn locate(&self, index: usize) -> Result<usize> {
        if index == 0 || index > self.len {
            return Err(Error::OutOfRange {
                index,
                size: self.len,
            });
        }

        let depth = usize::BITS - 1 - index.leading_zeros();
        let mut current = self.root;
        for bit in (0..depth).rev() {
            current = if (index >> bit) & 1 == 0 {
                self.arena.left(current)
            } else {
                self.arena.right(current)
            };
            if current == NIL {
                return Err(Error::InvalidStructure("heap is not complete"));
            }
        }
        Ok(current)
    }

    fn sift_up(&mut self, idx: usize) {
        loop {
            let parent = self.arena.parent(idx);
            if parent == NIL || self.arena.node(idx).key >= self.arena.node(parent).key {
                return;
            }
            self.swap_with_parent(idx, parent);
        }
    }

    fn sift_down(&mut self, idx: usize) {
        loop {
            let mut smallest = idx;
            for child in [self.arena.left(idx), self.arena.right(idx)] {
                if child != NIL && self.arena.node(child).key < self.arena.node(smallest).key {
                    smallest = child;
                }
            }
            if smallest == idx {
                return;
            }
            self.swap_with_parent(smallest, idx);
        }
    }

    /// Moves `x` into the position of its parent `p` and `p` into `x`'s.
    ///
    /// Nodes are relinked, not their payloads: afterwards `x` holds the
    /// grandparent link, its former sibling and `p` as children, and `p`
    /// adopts `x`'s old children.
    fn swap_with_parent(&mut self, x: usize, p: usize) {
        debug_assert_eq!(self.arena.parent(x), p, "swapping with a non-parent");
        trace!(node = x, parent = p, "heap swap with parent");

        let (p_left, p_right) = (self.arena.left(p), self.arena.right(p));
        self.arena.set_child(p, Side::Left, NIL);
        self.arena.set_child(p, Side::Right, NIL);

        let grandparent = self.arena.parent(p);
        match self.arena.side_of(grandparent, p) {
            Some(side) => self.arena.set_child(grandparent, side, x),
            None => self.root = x,
        }

        let (x_left, x_right) = (self.arena.left(x), self.arena.right(x));
        self.arena.set_child(x, Side::Left, NIL);
        self.arena.set_child(x, Side::Right, NIL);
        if x == p_left {
            self.arena.set_child(x, Side::Left, p);
            self.arena.set_child(x, Side::Right, p_right);
        } else {
            self.arena.set_child(x, Side::Left, p_left);
            self.arena.set_child(x, Side::Right, p);
        }

        self.arena.set_child(p, Side::Left, x_left);
        self.arena.set_child(p, Side::Right, x_right);
    }

    /// Puts `leaf` in the position of `node`, leaving `node` isolated.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidStructure`] - `leaf` has children or no parent
    fn replace_with_leaf(&mut self, node: usize, leaf: usize) -> Result<()> {
        if !self.arena.is_leaf(leaf) {
            return Err(Error::InvalidStructure("replacement node is not a leaf"));
        }
        let leaf_parent = self.arena.parent(leaf);
        if leaf_parent == NIL {
            return Err(Error::InvalidStructure("replacement leaf has no parent"));
        }
        self.arena.remove_leaf(leaf_parent, leaf)?;

        let (left, right) = (self.arena.left(node), self.arena.right(node));
        self.arena.set_child(node, Side::Left, NIL);
        self.arena.set_child(node, Side::Right, NIL);
        self.arena.set_child(leaf, Side::Left, left);
        self.arena.set_child(leaf, Side::Right, right);

        let parent = self.arena.parent(node);
        match self.arena.side_of(parent, node) {
            Some(side) => self.arena.set_child(parent, side, leaf),
            None => self.root = leaf,
        }
        Ok(())
    }

    #[cfg(debug_assertions)]
    fn verify_heap_invariants(&self) -> bool {
        if self.root == NIL {
            return self.len == 0;
        }
        if self.arena.parent(self.root) != NIL {
            return false;
        }
        // A complete tree of len nodes occupies exactly positions 1..=len
        self.verify_position(self.root, 1)
            && self.count_nodes(self.root) == self.len
    }

    #[cfg(debug_assertions)]
    fn verify_position(&self, idx: usize, position: usize) -> bool {
        if position > self.len {
            return false;
        }
        let node = self.arena.node(idx);
        [(node.left, 2 * position), (node.right, 2 * position + 1)]
            .into_iter()
            .filter(|&(child, _)| child != NIL)
            .all(|(child, child_position)| {
                self.arena.parent(child) == idx
                    && self.arena.node(child).key >= node.key
                    && self.verify_position(child, child_position)
            })
    }

    #[cfg(debug_assertions)]
    fn count_nodes(&self, idx: usize) -> usize {
        if idx == NIL {
            0
        } else {
            1 + self.count_nodes(self.arena.left(idx)) + self.count_nodes(self.arena.right(idx))
        }
    }
}
