mod ordered_tree;
pub use ordered_tree::{OrderedTree, TreeNode, range_query};

mod timestamp;
pub use timestamp::Timestamp;
