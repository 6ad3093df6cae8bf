use alloc::vec::Vec;

/// A node of a binary tree that can be walked without mutating it.
///
/// Implemented by node views that borrow their tree for `'a`, so the returned
/// keys and values live as long as the borrow.
pub trait TreeNode<'a>: Copy {
    /// Key type used for ordering
    type Key: 'a;
    /// Payload stored alongside the key
    type Value: 'a;

    /// Returns the node's key
    fn key(self) -> &'a Self::Key;

    /// Returns the node's value
    fn value(self) -> &'a Self::Value;

    /// Returns the left child, if any
    fn left(self) -> Option<Self>;

    /// Returns the right child, if any
    fn right(self) -> Option<Self>;
}

/// Capability of a binary search tree: it has a root, and every node orders
/// its left subtree below and its right subtree above its own key.
///
/// Anything exposing this capability can be searched by [`range_query`].
pub trait OrderedTree {
    /// Key type, totally ordered
    type Key: Ord;
    /// Payload type
    type Value;
    /// Node view handed out by the tree
    type Node<'a>: TreeNode<'a, Key = Self::Key, Value = Self::Value>
    where
        Self: 'a;

    /// Returns the root node, or `None` for an empty tree
    fn root(&self) -> Option<Self::Node<'_>>;
}

/// Returns every `(key, value)` pair of `tree` with `low <= key <= high`, in
/// ascending key order.
///
/// Subtrees that cannot hold keys inside the bounds are never visited, so the
/// cost is proportional to the tree height plus the number of matches.
///
/// # Arguments
///
/// * `tree` - Any ordered node tree
/// * `low` - Smallest key to include
/// * `high` - Largest key to include
///
/// # Returns
///
/// * `Vec<(&K, &V)>` - Matching entries, empty when nothing matches or `low > high`
///
/// # Examples
///
/// ```
/// # use ta_price_window::{AvlTree, range_query};
/// let mut tree = AvlTree::new();
/// for (k, v) in [(1, "One"), (5, "Five"), (6, "Six"), (7, "Seven"), (9, "Nine")] {
///     tree.insert(k, v);
/// }
/// let found: Vec<_> = range_query(&tree, &5, &7)
///     .into_iter()
///     .map(|(k, v)| (*k, *v))
///     .collect();
/// assert_eq!(found, [(5, "Five"), (6, "Six"), (7, "Seven")]);
/// ```
pub fn range_query<'a, T>(tree: &'a T, low: &T::Key, high: &T::Key) -> Vec<(&'a T::Key, &'a T::Value)>
where
    T: OrderedTree + ?Sized,
{
    let mut out = Vec::new();
    if let Some(root) = tree.root() {
        collect_range(root, low, high, &mut out);
    }
    out
}

fn collect_range<'a, N>(
    node: N,
    low: &N::Key,
    high: &N::Key,
    out: &mut Vec<(&'a N::Key, &'a N::Value)>,
) where
    N: TreeNode<'a>,
    N::Key: Ord,
{
    let key = node.key();
    if let Some(left) = node.left().filter(|_| key > low) {
        collect_range(left, low, high, out);
    }
    if (low..=high).contains(&key) {
        out.push((key, node.value()));
    }
    if let Some(right) = node.right().filter(|_| key < high) {
        collect_range(right, low, high, out);
    }
}
