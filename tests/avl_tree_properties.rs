use std::collections::BTreeMap;

use proptest::prelude::*;
use ta_price_window::{AvlNode, AvlTree, Error, range_query};

const KEY_SPACE: i32 = 64;

#[derive(Debug, Clone)]
enum Op {
    Insert(i32, u32),
    Delete(i32),
}

fn arbitrary_op() -> impl Strategy<Value = Op> {
    // A small key space makes inserts and deletes collide often
    prop_oneof![
        3 => (0..KEY_SPACE, any::<u32>()).prop_map(|(k, v)| Op::Insert(k, v)),
        2 => (0..KEY_SPACE).prop_map(Op::Delete),
    ]
}

/// Walks the subtree under `node`, checking parent links, cached heights and
/// the balance bound, and appends its keys in order.
fn check_subtree(node: AvlNode<'_, i32, u32>, keys: &mut Vec<i32>) -> usize {
    let mut heights = [0, 0];
    for (slot, child) in [node.left(), node.right()].into_iter().enumerate() {
        if let Some(child) = child {
            assert_eq!(child.parent().map(|p| *p.key()), Some(*node.key()));
            heights[slot] = check_subtree(child, keys);
            if slot == 0 {
                keys.push(*node.key());
            }
        } else if slot == 0 {
            keys.push(*node.key());
        }
    }
    let height = 1 + heights[0].max(heights[1]);
    assert_eq!(node.height(), height);
    assert!(node.balance().abs() <= 1, "unbalanced at {}", node.key());
    height
}

fn check_tree(tree: &AvlTree<i32, u32>, control: &BTreeMap<i32, u32>) {
    let mut keys = Vec::new();
    if let Some(root) = tree.root() {
        assert!(root.parent().is_none());
        check_subtree(root, &mut keys);
    }
    assert_eq!(keys, control.keys().copied().collect::<Vec<_>>());
    assert_eq!(tree.len(), control.len());
}

proptest! {
    /// The tree behaves like an ordered map and keeps its shape invariants
    /// after every operation.
    #[test]
    fn prop_matches_ordered_map(ops in prop::collection::vec(arbitrary_op(), 0..200)) {
        let mut tree = AvlTree::new();
        let mut control = BTreeMap::new();

        for op in ops {
            match op {
                Op::Insert(k, v) => {
                    prop_assert_eq!(tree.insert(k, v), control.insert(k, v));
                    prop_assert_eq!(tree.get(&k), Ok(&v));
                }
                Op::Delete(k) => {
                    let expected = control.remove(&k).ok_or(Error::NotFound);
                    prop_assert_eq!(tree.delete(&k), expected);
                    prop_assert_eq!(tree.search(&k).map(|n| *n.key()), Err(Error::NotFound));
                }
            }
            check_tree(&tree, &control);
        }

        prop_assert_eq!(tree.first(), control.iter().next());
        prop_assert_eq!(tree.last(), control.iter().next_back());
    }

    /// A range query returns exactly the sorted filter of the stored pairs.
    #[test]
    fn prop_range_query_is_sorted_filter(
        entries in prop::collection::btree_map(-100i32..100, any::<u32>(), 0..120),
        low in -120i32..120,
        high in -120i32..120,
    ) {
        let mut tree = AvlTree::new();
        for (&k, &v) in &entries {
            tree.insert(k, v);
        }

        let found = range_query(&tree, &low, &high);
        let expected: Vec<(&i32, &u32)> = entries
            .iter()
            .filter(|(k, _)| low <= **k && **k <= high)
            .collect();
        prop_assert_eq!(found, expected);
    }

    /// The height stays within the AVL bound of about 1.44 log2(n + 2).
    #[test]
    fn prop_height_is_logarithmic(keys in prop::collection::hash_set(any::<i32>(), 1..500)) {
        let mut tree = AvlTree::new();
        for &k in &keys {
            tree.insert(k, ());
        }
        let bound = 1.45 * ((keys.len() + 2) as f64).log2();
        prop_assert!((tree.height() as f64) <= bound);
    }
}
