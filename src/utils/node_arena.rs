use alloc::vec::Vec;
use core::{
    fmt, mem,
    sync::atomic::{AtomicU32, Ordering},
};

use crate::{Error, Result, traits::TreeNode};

/// Sentinel index standing in for an absent parent or child
pub(crate) const NIL: usize = usize::MAX;

/// Source of arena identities stamped into every `NodeRef`
static NEXT_ARENA_ID: AtomicU32 = AtomicU32::new(0);

/// Which child slot of a parent a link refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Left,
    Right,
}

/// Per-node data derived from the node's children.
///
/// Recomputed by the arena every time a child link of the node is reassigned,
/// so implementors never have to be refreshed by hand.
pub(crate) trait Augment: Sized {
    /// Value carried by a node without children
    fn leaf() -> Self;

    /// Value for a node whose children carry `left` and `right`
    fn combine(left: Option<&Self>, right: Option<&Self>) -> Self;
}

impl Augment for () {
    #[inline]
    fn leaf() -> Self {}

    #[inline]
    fn combine(_: Option<&Self>, _: Option<&Self>) -> Self {}
}

/// Cached height of an AVL subtree.
///
/// A leaf has height 1 and an absent child counts as 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Height(usize);

impl Height {
    /// Returns the subtree height
    #[inline]
    pub const fn get(self) -> usize {
        self.0
    }
}

impl Augment for Height {
    #[inline]
    fn leaf() -> Self {
        Height(1)
    }

    #[inline]
    fn combine(left: Option<&Self>, right: Option<&Self>) -> Self {
        let left = left.map_or(0, |h| h.0);
        let right = right.map_or(0, |h| h.0);
        Height(1 + left.max(right))
    }
}

/// A stable reference to a node stored in a tree or heap.
///
/// The reference keeps pointing at the same logical entry while the structure
/// relinks nodes around it, and is rejected with [`Error::InvalidNode`] once the
/// node has been removed or when it is passed to a structure other than the
/// one that issued it. A clone of a structure accepts the references of the
/// original, which name the same entries in the copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    arena: u32,
    index: usize,
    generation: u32,
}

/// A linked node: payload plus parent and child indices
#[derive(Debug, Clone)]
pub(crate) struct Node<K, V, A> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) parent: usize,
    pub(crate) left: usize,
    pub(crate) right: usize,
    pub(crate) aug: A,
}

#[derive(Debug, Clone)]
struct Slot<K, V, A> {
    /// Bumped every time the slot is vacated, invalidating older references
    generation: u32,
    node: Option<Node<K, V, A>>,
}

/// Slot storage for linked nodes.
///
/// Nodes are addressed by index; the parent index is a lookup relation only,
/// ownership of a subtree follows the child links from whichever root the
/// owning structure holds. Vacated slots are recycled through a free list.
#[derive(Debug, Clone)]
pub(crate) struct NodeArena<K, V, A> {
    /// Identity checked against every incoming `NodeRef`
    id: u32,
    slots: Vec<Slot<K, V, A>>,
    free_list: Vec<usize>,
    live: usize,
}

impl<K, V, A> NodeArena<K, V, A> {
    pub(crate) fn new() -> Self {
        Self::with_capacity(0)
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            id: NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed),
            slots: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            live: 0,
        }
    }

    /// Number of allocated nodes, linked or not
    #[inline]
    #[cfg_attr(not(debug_assertions), allow(dead_code))]
    pub(crate) const fn live(&self) -> usize {
        self.live
    }

    /// Vacates every slot, invalidating all outstanding references
    pub(crate) fn clear(&mut self) {
        for slot in &mut self.slots {
            if slot.node.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
        self.free_list.clear();
        self.free_list.extend((0..self.slots.len()).rev());
        self.live = 0;
    }

    /// Stores a new isolated node and returns its index
    pub(crate) fn allocate(&mut self, key: K, value: V) -> usize
    where
        A: Augment,
    {
        let node = Node {
            key,
            value,
            parent: NIL,
            left: NIL,
            right: NIL,
            aug: A::leaf(),
        };
        self.live += 1;
        match self.free_list.pop() {
            Some(idx) => {
                self.slots[idx].node = Some(node);
                idx
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                self.slots.len() - 1
            }
        }
    }

    /// Frees an isolated node and hands its payload back
    pub(crate) fn deallocate(&mut self, idx: usize) -> (K, V) {
        debug_assert!(self.is_isolated(idx), "deallocating a linked node");
        let slot = &mut self.slots[idx];
        let Some(node) = slot.node.take() else {
            unreachable!("slot {idx} is already vacant");
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(idx);
        self.live -= 1;
        (node.key, node.value)
    }

    #[inline]
    pub(crate) fn node(&self, idx: usize) -> &Node<K, V, A> {
        match &self.slots[idx].node {
            Some(node) => node,
            None => unreachable!("slot {idx} is vacant"),
        }
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, idx: usize) -> &mut Node<K, V, A> {
        match &mut self.slots[idx].node {
            Some(node) => node,
            None => unreachable!("slot {idx} is vacant"),
        }
    }

    /// Builds the external reference for a live index
    #[inline]
    pub(crate) fn handle(&self, idx: usize) -> NodeRef {
        NodeRef {
            arena: self.id,
            index: idx,
            generation: self.slots[idx].generation,
        }
    }

    /// Maps an external reference back to a live index
    pub(crate) fn resolve(&self, handle: NodeRef) -> Result<usize> {
        if handle.arena != self.id {
            return Err(Error::InvalidNode);
        }
        match self.slots.get(handle.index) {
            Some(slot) if slot.generation == handle.generation && slot.node.is_some() => {
                Ok(handle.index)
            }
            _ => Err(Error::InvalidNode),
        }
    }

    #[inline]
    pub(crate) fn parent(&self, idx: usize) -> usize {
        if idx == NIL { NIL } else { self.node(idx).parent }
    }

    #[inline]
    pub(crate) fn left(&self, idx: usize) -> usize {
        if idx == NIL { NIL } else { self.node(idx).left }
    }

    #[inline]
    pub(crate) fn right(&self, idx: usize) -> usize {
        if idx == NIL { NIL } else { self.node(idx).right }
    }

    #[inline]
    pub(crate) fn child(&self, idx: usize, side: Side) -> usize {
        match side {
            Side::Left => self.left(idx),
            Side::Right => self.right(idx),
        }
    }

    #[inline]
    pub(crate) fn is_leaf(&self, idx: usize) -> bool {
        let node = self.node(idx);
        node.left == NIL && node.right == NIL
    }

    #[inline]
    pub(crate) fn is_isolated(&self, idx: usize) -> bool {
        self.is_leaf(idx) && self.node(idx).parent == NIL
    }

    /// Which side of `parent` holds `child`, if any
    pub(crate) fn side_of(&self, parent: usize, child: usize) -> Option<Side> {
        if parent == NIL || child == NIL {
            return None;
        }
        let node = self.node(parent);
        if node.left == child {
            Some(Side::Left)
        } else if node.right == child {
            Some(Side::Right)
        } else {
            None
        }
    }

    /// Exchanges key and value between two live nodes, leaving links alone
    pub(crate) fn swap_payloads(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        let (lo, hi) = (a.min(b), a.max(b));
        let (head, tail) = self.slots.split_at_mut(hi);
        match (&mut head[lo].node, &mut tail[0].node) {
            (Some(x), Some(y)) => {
                mem::swap(&mut x.key, &mut y.key);
                mem::swap(&mut x.value, &mut y.value);
            }
            _ => unreachable!("swapping payloads with a vacant slot"),
        }
    }

    /// Leftmost node of the subtree rooted at `idx`
    pub(crate) fn leftmost(&self, mut idx: usize) -> usize {
        while idx != NIL {
            let left = self.left(idx);
            if left == NIL {
                break;
            }
            idx = left;
        }
        idx
    }

    /// Rightmost node of the subtree rooted at `idx`
    pub(crate) fn rightmost(&self, mut idx: usize) -> usize {
        while idx != NIL {
            let right = self.right(idx);
            if right == NIL {
                break;
            }
            idx = right;
        }
        idx
    }

    pub(crate) const fn view(&self, index: usize) -> NodeView<'_, K, V, A> {
        NodeView { arena: self, index }
    }
}

impl<K, V, A: Augment> NodeArena<K, V, A> {
    /// Recomputes the augmentation of `idx` from its current children
    fn refresh(&mut self, idx: usize) {
        let node = self.node(idx);
        let left = (node.left != NIL).then(|| &self.node(node.left).aug);
        let right = (node.right != NIL).then(|| &self.node(node.right).aug);
        let aug = A::combine(left, right);
        self.node_mut(idx).aug = aug;
    }

    /// Makes `child` the `side` child of `parent`.
    ///
    /// This is the only way links are written. `child` is first detached from
    /// its current parent, the child currently occupying the slot loses its
    /// parent reference, and the augmentation of every node whose children
    /// changed is refreshed. Passing [`NIL`] as `child` empties the slot.
    pub(crate) fn set_child(&mut self, parent: usize, side: Side, child: usize) {
        debug_assert!(parent != NIL, "linking a child under NIL");
        debug_assert!(parent != child, "linking a node under itself");

        if child != NIL {
            self.detach(child);
        }

        let displaced = self.child(parent, side);
        if displaced != NIL {
            self.node_mut(displaced).parent = NIL;
        }

        let node = self.node_mut(parent);
        match side {
            Side::Left => node.left = child,
            Side::Right => node.right = child,
        }
        if child != NIL {
            self.node_mut(child).parent = parent;
        }
        self.refresh(parent);
    }

    /// Cuts `idx` loose from its parent, keeping its own subtree
    pub(crate) fn detach(&mut self, idx: usize) {
        let parent = self.node(idx).parent;
        if parent == NIL {
            return;
        }
        if let Some(side) = self.side_of(parent, idx) {
            let node = self.node_mut(parent);
            match side {
                Side::Left => node.left = NIL,
                Side::Right => node.right = NIL,
            }
            self.refresh(parent);
        }
        self.node_mut(idx).parent = NIL;
    }

    /// Unlinks the leaf `leaf` from `parent`.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidStructure`] - `leaf` has children or is not a child of `parent`
    pub(crate) fn remove_leaf(&mut self, parent: usize, leaf: usize) -> Result<()> {
        if !self.is_leaf(leaf) {
            return Err(Error::InvalidStructure("cannot remove a non-leaf node"));
        }
        let side = self
            .side_of(parent, leaf)
            .ok_or(Error::InvalidStructure("node is not a child of the given parent"))?;
        self.set_child(parent, side, NIL);
        Ok(())
    }
}

/// Read-only view of a node inside a tree or heap.
///
/// Views borrow the owning structure, so they can never outlive a
/// structural edit.
pub struct NodeView<'a, K, V, A> {
    arena: &'a NodeArena<K, V, A>,
    index: usize,
}

impl<K, V, A> Clone for NodeView<'_, K, V, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V, A> Copy for NodeView<'_, K, V, A> {}

impl<'a, K, V, A> NodeView<'a, K, V, A> {
    #[inline]
    fn step(self, idx: usize) -> Option<Self> {
        (idx != NIL).then_some(Self {
            arena: self.arena,
            index: idx,
        })
    }

    /// Returns the key stored in the node
    #[inline]
    pub fn key(self) -> &'a K {
        &self.arena.node(self.index).key
    }

    /// Returns the value stored in the node
    #[inline]
    pub fn value(self) -> &'a V {
        &self.arena.node(self.index).value
    }

    /// Returns the left child, if any
    #[inline]
    pub fn left(self) -> Option<Self> {
        self.step(self.arena.left(self.index))
    }

    /// Returns the right child, if any
    #[inline]
    pub fn right(self) -> Option<Self> {
        self.step(self.arena.right(self.index))
    }

    /// Returns the parent, or `None` for the root
    #[inline]
    pub fn parent(self) -> Option<Self> {
        self.step(self.arena.parent(self.index))
    }

    /// Returns `true` if the node has no children
    #[inline]
    pub fn is_leaf(self) -> bool {
        self.arena.is_leaf(self.index)
    }

    /// Returns the depth of the node, counting the root as 1
    pub fn depth(self) -> usize {
        let mut depth = 1;
        let mut current = self.arena.parent(self.index);
        while current != NIL {
            depth += 1;
            current = self.arena.parent(current);
        }
        depth
    }

    /// Returns a stable reference to this node
    #[inline]
    pub fn handle(self) -> NodeRef {
        self.arena.handle(self.index)
    }
}

impl<K, V> NodeView<'_, K, V, Height> {
    /// Returns the height of the subtree rooted at this node, 1 for a leaf
    #[inline]
    pub fn height(self) -> usize {
        self.arena.node(self.index).aug.get()
    }

    /// Returns the left subtree height minus the right subtree height
    pub fn balance(self) -> isize {
        let left = self.left().map_or(0, |n| n.height());
        let right = self.right().map_or(0, |n| n.height());
        left as isize - right as isize
    }
}

impl<K: fmt::Debug, V: fmt::Debug, A> fmt::Debug for NodeView<'_, K, V, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("key", self.key())
            .field("value", self.value())
            .field("left", &self.left().map(|n| n.key()))
            .field("right", &self.right().map(|n| n.key()))
            .field("parent", &self.parent().map(|n| n.key()))
            .finish()
    }
}

impl<'a, K, V, A> TreeNode<'a> for NodeView<'a, K, V, A> {
    type Key = K;
    type Value = V;

    #[inline]
    fn key(self) -> &'a K {
        NodeView::key(self)
    }

    #[inline]
    fn value(self) -> &'a V {
        NodeView::value(self)
    }

    #[inline]
    fn left(self) -> Option<Self> {
        NodeView::left(self)
    }

    #[inline]
    fn right(self) -> Option<Self> {
        NodeView::right(self)
    }
}
