#![doc = include_str!("../README.md")]
#![no_std]
#![deny(
    unsafe_code,
    unused_imports,
    unused_variables,
    unused_must_use,
    missing_docs,
    clippy::all,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::dbg_macro,
    clippy::todo,
    clippy::unimplemented
)]
#![allow(clippy::just_underscores_and_digits, clippy::len_without_is_empty)]

#[cfg_attr(test, macro_use)]
extern crate alloc;

pub(crate) type Kbn<T> = compensated_summation::KahanBabuskaNeumaier<T>;

mod error;
pub use error::{Error, Result};

mod utils;
pub use utils::{Height, NodeRef, NodeView};

mod traits;
pub use traits::{OrderedTree, Timestamp, TreeNode, range_query};

mod avl_tree;
pub use avl_tree::{AvlNode, AvlTree};

mod linked_heap;
pub use linked_heap::{HeapNode, LinkedHeap};

mod price_tracker;
pub use price_tracker::{DEFAULT_WINDOW_DAYS, PriceTracker, WindowStats};
