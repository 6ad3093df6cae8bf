mod node_arena;
pub(crate) use node_arena::{NIL, NodeArena, Side};
pub use node_arena::{Height, NodeRef, NodeView};
