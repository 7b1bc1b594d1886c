//! File-tree operations as values, so a room can apply them inside its own
//! critical section and log what it applied.

use crate::node::FileNode;
use crate::tree::FileTree;

/// One mutation of a room's file tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOp {
    Create {
        node: FileNode,
        parent_id: Option<String>,
    },
    Rename {
        id: String,
        name: String,
    },
    Delete {
        id: String,
    },
    Move {
        id: String,
        target_folder_id: Option<String>,
    },
    UpdateContent {
        id: String,
        content: String,
    },
}

impl FileOp {
    /// Apply to `tree`. Returns whether the tree changed.
    pub fn apply(self, tree: &mut FileTree) -> bool {
        match self {
            FileOp::Create { node, parent_id } => tree.create(node, parent_id.as_deref()),
            FileOp::Rename { id, name } => tree.rename(&id, &name),
            FileOp::Delete { id } => tree.delete(&id),
            FileOp::Move { id, target_folder_id } => tree.move_node(&id, target_folder_id.as_deref()),
            FileOp::UpdateContent { id, content } => tree.update_content(&id, &content),
        }
    }

    /// Id of the node the operation acts on.
    pub fn node_id(&self) -> &str {
        match self {
            FileOp::Create { node, .. } => &node.id,
            FileOp::Rename { id, .. }
            | FileOp::Delete { id }
            | FileOp::Move { id, .. }
            | FileOp::UpdateContent { id, .. } => id,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            FileOp::Create { .. } => "create",
            FileOp::Rename { .. } => "rename",
            FileOp::Delete { .. } => "delete",
            FileOp::Move { .. } => "move",
            FileOp::UpdateContent { .. } => "update-content",
        }
    }
}
