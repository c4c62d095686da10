/// Data model for disktree.
///
/// Re-exports the owned `Node` tree and supporting types.
pub mod node;
pub mod size;

pub use node::{display_name, percent_of, Node, SortMode};
