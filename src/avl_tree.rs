use core::{cmp::Ordering, mem};

use tracing::trace;

use crate::{
    Error, Result,
    traits::OrderedTree,
    utils::{Height, NIL, NodeArena, NodeView, Side},
};

/// Read-only view of a node in an [`AvlTree`]
pub type AvlNode<'a, K, V> = NodeView<'a, K, V, Height>;

/// A height-balanced binary search tree with parent-linked nodes.
///
/// Keys are unique. Every node caches the height of its subtree, and after
/// each insertion or deletion the path from the edited node up to the root is
/// rebalanced with single or double rotations, so the heights of any node's
/// two subtrees never differ by more than one. Lookups, insertions and
/// deletions are O(log n); [`range_query`](crate::range_query) visits only the
/// subtrees that can hold keys inside the requested bounds.
///
/// # Examples
///
/// ```
/// # use ta_price_window::AvlTree;
/// let mut tree = AvlTree::new();
/// tree.insert(10, "ten");
/// tree.insert(5, "five");
/// tree.insert(15, "fifteen");
///
/// let root = tree.root().unwrap();
/// assert_eq!(*root.key(), 10);
/// assert_eq!(*root.left().unwrap().key(), 5);
/// assert_eq!(*root.right().unwrap().key(), 15);
/// assert_eq!(tree.len(), 3);
///
/// assert_eq!(tree.delete(&5), Ok("five"));
/// assert!(tree.get(&5).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct AvlTree<K, V> {
    /// Node storage; links are indices into it
    arena: NodeArena<K, V, Height>,
    /// Index of the root node, `NIL` when empty
    root: usize,
    /// Number of entries
    len: usize,
}

impl<K: Ord, V> Default for AvlTree<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, V> AvlTree<K, V> {
    /// Creates an empty tree
    pub fn new() -> Self {
        Self {
            arena: NodeArena::new(),
            root: NIL,
            len: 0,
        }
    }

    /// Creates an empty tree with room for `capacity` nodes before reallocating
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            arena: NodeArena::with_capacity(capacity),
            root: NIL,
            len: 0,
        }
    }

    /// Returns the number of entries
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the tree holds no entries
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the height of the tree, 0 when empty
    #[inline]
    pub fn height(&self) -> usize {
        self.height_of(self.root)
    }

    /// Returns a view of the root node
    #[inline]
    pub fn root(&self) -> Option<AvlNode<'_, K, V>> {
        (self.root != NIL).then(|| self.arena.view(self.root))
    }

    /// Removes every entry
    pub fn clear(&mut self) {
        self.arena.clear();
        self.root = NIL;
        self.len = 0;
    }

    /// Finds the node holding `key`.
    ///
    /// # Errors
    ///
    /// * [`Error::NotFound`] - `key` is not in the tree
    pub fn search(&self, key: &K) -> Result<AvlNode<'_, K, V>> {
        self.find_node(key)
            .map(|idx| self.arena.view(idx))
            .ok_or(Error::NotFound)
    }

    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// * [`Error::NotFound`] - `key` is not in the tree
    pub fn get(&self, key: &K) -> Result<&V> {
        self.find_node(key)
            .map(|idx| &self.arena.node(idx).value)
            .ok_or(Error::NotFound)
    }

    /// Returns a mutable reference to the value stored under `key`.
    ///
    /// # Errors
    ///
    /// * [`Error::NotFound`] - `key` is not in the tree
    pub fn get_mut(&mut self, key: &K) -> Result<&mut V> {
        let idx = self.find_node(key).ok_or(Error::NotFound)?;
        Ok(&mut self.arena.node_mut(idx).value)
    }

    /// Returns `true` if `key` is in the tree
    #[inline]
    pub fn contains_key(&self, key: &K) -> bool {
        self.find_node(key).is_some()
    }

    /// Returns the entry with the smallest key
    pub fn first(&self) -> Option<(&K, &V)> {
        let idx = self.arena.leftmost(self.root);
        (idx != NIL).then(|| {
            let node = self.arena.node(idx);
            (&node.key, &node.value)
        })
    }

    /// Returns the entry with the largest key
    pub fn last(&self) -> Option<(&K, &V)> {
        let idx = self.arena.rightmost(self.root);
        (idx != NIL).then(|| {
            let node = self.arena.node(idx);
            (&node.key, &node.value)
        })
    }

    /// Returns every entry with `low <= key <= high` in ascending key order
    #[inline]
    pub fn range(&self, low: &K, high: &K) -> alloc::vec::Vec<(&K, &V)> {
        crate::range_query(self, low, high)
    }

    /// Inserts `value` under `key`.
    ///
    /// If the key is already present its value is replaced in place and the
    /// shape of the tree is left untouched; otherwise a new leaf is attached
    /// and the tree is rebalanced from the leaf's parent up to the root.
    ///
    /// # Returns
    ///
    /// * `Option<V>` - The previous value stored under `key`, if any
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let mut current = self.root;
        let mut parent = NIL;
        let mut side = Side::Left;

        while current != NIL {
            parent = current;
            let node = self.arena.node(current);
            match key.cmp(&node.key) {
                Ordering::Less => {
                    side = Side::Left;
                    current = node.left;
                }
                Ordering::Greater => {
                    side = Side::Right;
                    current = node.right;
                }
                Ordering::Equal => {
                    return Some(mem::replace(&mut self.arena.node_mut(current).value, value));
                }
            }
        }

        let new_idx = self.arena.allocate(key, value);
        if parent == NIL {
            self.root = new_idx;
        } else {
            self.arena.set_child(parent, side, new_idx);
            self.restore_balance_from(parent);
        }
        self.len += 1;

        #[cfg(debug_assertions)]
        debug_assert!(
            self.verify_avl_invariants(),
            "AVL invariants violated after insertion"
        );

        None
    }

    /// Removes `key` from the tree.
    ///
    /// # Returns
    ///
    /// * `V` - The value that was stored under `key`
    ///
    /// # Errors
    ///
    /// * [`Error::NotFound`] - `key` is not in the tree
    pub fn delete(&mut self, key: &K) -> Result<V> {
        let idx = self.find_node(key).ok_or(Error::NotFound)?;
        let (_, value) = self.remove_node(idx)?;

        #[cfg(debug_assertions)]
        debug_assert!(
            self.verify_avl_invariants(),
            "AVL invariants violated after deletion"
        );

        Ok(value)
    }

    fn find_node(&self, key: &K) -> Option<usize> {
        let mut current = self.root;
        while current != NIL {
            let node = self.arena.node(current);
            match key.cmp(&node.key) {
                Ordering::Equal => return Some(current),
                Ordering::Less => current = node.left,
                Ordering::Greater => current = node.right,
            }
        }
        None
    }

    /// Unlinks the node at `idx` and returns its payload
    fn remove_node(&mut self, idx: usize) -> Result<(K, V)> {
        let left = self.arena.left(idx);
        let right = self.arena.right(idx);

        if left != NIL && right != NIL {
            // The in-order successor has no left child, so removing it falls
            // into one of the cases below, which rebalance and update len.
            let successor = self.arena.leftmost(right);
            self.arena.swap_payloads(idx, successor);
            return self.remove_node(successor);
        }

        let parent = self.arena.parent(idx);
        if left == NIL && right == NIL {
            if parent == NIL {
                self.root = NIL;
            } else {
                self.arena.remove_leaf(parent, idx)?;
                self.restore_balance_from(parent);
            }
        } else {
            let child = if left == NIL { right } else { left };
            match self.arena.side_of(parent, idx) {
                Some(side) => self.arena.set_child(parent, side, child),
                None => {
                    self.arena.detach(child);
                    self.root = child;
                }
            }
            self.restore_balance_from(child);
        }

        self.len -= 1;
        Ok(self.arena.deallocate(idx))
    }

    /// Rebalances every subtree on the path from `idx` to the root.
    ///
    /// Each level re-hangs its (possibly rotated) subtree under the parent,
    /// which also refreshes the parent's cached height.
    fn restore_balance_from(&mut self, mut idx: usize) {
        while idx != NIL {
            let parent = self.arena.parent(idx);
            let side = self.arena.side_of(parent, idx);
            let subtree = self.rebalance(idx);
            match side {
                Some(side) => self.arena.set_child(parent, side, subtree),
                None => self.root = subtree,
            }
            idx = parent;
        }
    }

    /// Restores balance at `idx` and returns the new local subtree root
    fn rebalance(&mut self, idx: usize) -> usize {
        let balance = self.balance_of(idx);
        if balance > 1 {
            let left = self.arena.left(idx);
            if self.balance_of(left) < 0 {
                let rotated = self.rotate_left(left);
                self.arena.set_child(idx, Side::Left, rotated);
            }
            self.rotate_right(idx)
        } else if balance < -1 {
            let right = self.arena.right(idx);
            if self.balance_of(right) > 0 {
                let rotated = self.rotate_right(right);
                self.arena.set_child(idx, Side::Right, rotated);
            }
            self.rotate_left(idx)
        } else {
            idx
        }
    }

    /// Lifts the right child of `x` above it and returns that child.
    ///
    /// The returned node is left without a parent; the caller re-hangs it.
    fn rotate_left(&mut self, x: usize) -> usize {
        let y = self.arena.right(x);
        debug_assert!(y != NIL, "rotate_left without a right child");
        trace!(pivot = x, lifted = y, "avl rotate left");

        let y_left = self.arena.left(y);
        self.arena.set_child(x, Side::Right, y_left);
        self.arena.set_child(y, Side::Left, x);
        y
    }

    /// Lifts the left child of `y` above it and returns that child.
    ///
    /// The returned node is left without a parent; the caller re-hangs it.
    fn rotate_right(&mut self, y: usize) -> usize {
        let x = self.arena.left(y);
        debug_assert!(x != NIL, "rotate_right without a left child");
        trace!(pivot = y, lifted = x, "avl rotate right");

        let x_right = self.arena.right(x);
        self.arena.set_child(y, Side::Left, x_right);
        self.arena.set_child(x, Side::Right, y);
        x
    }

    #[inline]
    fn height_of(&self, idx: usize) -> usize {
        if idx == NIL {
            0
        } else {
            self.arena.node(idx).aug.get()
        }
    }

    #[inline]
    fn balance_of(&self, idx: usize) -> isize {
        if idx == NIL {
            return 0;
        }
        let left = self.height_of(self.arena.left(idx)) as isize;
        let right = self.height_of(self.arena.right(idx)) as isize;
        left - right
    }

    #[cfg(debug_assertions)]
    fn verify_avl_invariants(&self) -> bool {
        if self.root == NIL {
            return self.len == 0;
        }
        if self.arena.parent(self.root) != NIL {
            return false;
        }
        match self.verify_subtree(self.root, None, None) {
            Some((_, count)) => count == self.len && count == self.arena.live(),
            None => false,
        }
    }

    /// Returns `(height, node count)` of a valid subtree, `None` otherwise
    #[cfg(debug_assertions)]
    fn verify_subtree(&self, idx: usize, low: Option<&K>, high: Option<&K>) -> Option<(usize, usize)> {
        if idx == NIL {
            return Some((0, 0));
        }
        let node = self.arena.node(idx);
        if low.is_some_and(|low| node.key <= *low) || high.is_some_and(|high| node.key >= *high) {
            return None;
        }
        for child in [node.left, node.right] {
            if child != NIL && self.arena.parent(child) != idx {
                return None;
            }
        }

        let (left_height, left_count) = self.verify_subtree(node.left, low, Some(&node.key))?;
        let (right_height, right_count) = self.verify_subtree(node.right, Some(&node.key), high)?;

        let height = 1 + left_height.max(right_height);
        if node.aug.get() != height || left_height.abs_diff(right_height) > 1 {
            return None;
        }
        Some((height, 1 + left_count + right_count))
    }
}

impl<K: Ord, V> OrderedTree for AvlTree<K, V> {
    type Key = K;
    type Value = V;
    type Node<'a>
        = AvlNode<'a, K, V>
    where
        Self: 'a;

    #[inline]
    fn root(&self) -> Option<AvlNode<'_, K, V>> {
        AvlTree::root(self)
    }
}
