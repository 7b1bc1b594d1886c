//! # coedit-core: file tree model for collaborative editing rooms
//!
//! Pure, synchronous data structures shared by the sync server and clients:
//!
//! - [`node`]: `FileNode` (file or folder) and its JSON shape
//! - [`tree`]: `FileTree`, the per-room forest, with create / rename /
//!   delete / move / update-content
//! - [`op`]: `FileOp`, a tree mutation as a value
//!
//! Nothing here performs I/O or takes locks; callers serialize access.

pub mod node;
pub mod op;
pub mod tree;

pub use node::{FileNode, NodeBody, NodeKind};
pub use op::FileOp;
pub use tree::{FileTree, NodePath};
