//! Forest of file nodes and the mutations applied to it.
//!
//! Lookups are depth-first searches that return a [`NodePath`] (child indices
//! from the forest root); mutation is then done by the caller through that
//! path. There is no persistent id index: rooms are small enough that a
//! traversal per operation is cheap.
//!
//! Every mutation is total. Unknown ids degrade to a no-op, and a missing or
//! non-folder parent/target sends the node to the forest root instead of
//! dropping it.

use serde::{Deserialize, Serialize};

use crate::node::{FileNode, NodeBody};

/// Child indices leading from the forest root to a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    /// Number of edges from the forest root (root-level nodes have depth 0).
    pub fn depth(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    /// Path of the containing folder, `None` for root-level nodes.
    pub fn parent(&self) -> Option<NodePath> {
        if self.0.len() > 1 {
            Some(NodePath(self.0[..self.0.len() - 1].to_vec()))
        } else {
            None
        }
    }
}

/// The ordered root-level nodes of a room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileTree {
    nodes: Vec<FileNode>,
}

impl FileTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nodes(nodes: Vec<FileNode>) -> Self {
        Self { nodes }
    }

    pub fn roots(&self) -> &[FileNode] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<FileNode> {
        self.nodes
    }

    /// Total node count across the forest.
    pub fn len(&self) -> usize {
        self.nodes.iter().map(FileNode::subtree_len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Depth-first, pre-order iteration over every node.
    pub fn iter(&self) -> Iter<'_> {
        Iter::new(&self.nodes)
    }

    // ─── Search ──────────────────────────────────────────────────

    /// Find the path of the node with `id`.
    pub fn locate(&self, id: &str) -> Option<NodePath> {
        let mut path = Vec::new();
        if locate_in(&self.nodes, id, &mut path) {
            Some(NodePath(path))
        } else {
            None
        }
    }

    pub fn node(&self, path: &NodePath) -> Option<&FileNode> {
        let (first, rest) = path.0.split_first()?;
        let mut node = self.nodes.get(*first)?;
        for &i in rest {
            node = node.children().get(i)?;
        }
        Some(node)
    }

    pub fn node_mut(&mut self, path: &NodePath) -> Option<&mut FileNode> {
        let (first, rest) = path.0.split_first()?;
        let mut node = self.nodes.get_mut(*first)?;
        for &i in rest {
            node = node.children_mut()?.get_mut(i)?;
        }
        Some(node)
    }

    /// Detach the node at `path` (with its subtree) and return it.
    pub fn take(&mut self, path: &NodePath) -> Option<FileNode> {
        let (&last, _) = path.0.split_last()?;
        let siblings = match path.parent() {
            None => &mut self.nodes,
            Some(parent) => self.node_mut(&parent)?.children_mut()?,
        };
        if last < siblings.len() {
            Some(siblings.remove(last))
        } else {
            None
        }
    }

    pub fn find(&self, id: &str) -> Option<&FileNode> {
        self.locate(id).and_then(|path| self.node(&path))
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut FileNode> {
        let path = self.locate(id)?;
        self.node_mut(&path)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.locate(id).is_some()
    }

    /// The folder directly containing `id`; `None` for root-level or unknown nodes.
    pub fn parent_of(&self, id: &str) -> Option<&FileNode> {
        let parent = self.locate(id)?.parent()?;
        self.node(&parent)
    }

    /// Parent chain of `id`, nearest first, ending at a root-level folder.
    pub fn ancestors(&self, id: &str) -> Vec<&FileNode> {
        let Some(path) = self.locate(id) else {
            return Vec::new();
        };
        let mut chain = Vec::with_capacity(path.depth());
        let mut current = path.parent();
        while let Some(p) = current {
            if let Some(node) = self.node(&p) {
                chain.push(node);
            }
            current = p.parent();
        }
        chain
    }

    /// Whether `id` sits strictly below `ancestor_id`.
    pub fn is_descendant(&self, id: &str, ancestor_id: &str) -> bool {
        id != ancestor_id
            && self
                .find(ancestor_id)
                .is_some_and(|ancestor| ancestor.subtree_contains(id))
    }

    /// Depth of the deepest node (0 for a flat forest, `None` when empty).
    pub fn max_depth(&self) -> Option<usize> {
        fn depth(node: &FileNode) -> usize {
            node.children().iter().map(|c| 1 + depth(c)).max().unwrap_or(0)
        }
        self.nodes.iter().map(depth).max()
    }

    /// True when no id appears twice in the forest.
    pub fn has_unique_ids(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        self.iter().all(|node| seen.insert(node.id.as_str()))
    }

    // ─── Mutations ───────────────────────────────────────────────

    /// Insert `node` under `parent_id`, or at the root when the parent is
    /// absent, unknown or not a folder.
    ///
    /// Returns `false` (and leaves the forest untouched) if any id in the new
    /// subtree is already in use.
    pub fn create(&mut self, node: FileNode, parent_id: Option<&str>) -> bool {
        if let Some(dup) = Iter::new(std::slice::from_ref(&node)).find(|n| self.contains(&n.id)) {
            log::debug!("create: id {} already exists, ignoring", dup.id);
            return false;
        }

        match parent_id {
            None => self.nodes.push(node),
            Some(pid) => match self.find_mut(pid).and_then(FileNode::children_mut) {
                Some(children) => children.push(node),
                None => {
                    log::debug!("create: parent {pid} missing or not a folder, placing {} at root", node.id);
                    self.nodes.push(node);
                }
            },
        }
        true
    }

    /// Set the display name of `id`. Empty names are allowed; renaming to the
    /// current name is not a change.
    pub fn rename(&mut self, id: &str, name: &str) -> bool {
        match self.find_mut(id) {
            Some(node) if node.name != name => {
                node.name = name.to_string();
                true
            }
            _ => false,
        }
    }

    /// Remove `id` and its subtree. Removing an unknown id is a no-op.
    pub fn delete(&mut self, id: &str) -> bool {
        match self.locate(id) {
            Some(path) => self.take(&path).is_some(),
            None => false,
        }
    }

    /// Re-parent `id` under `target_folder_id`, or at the root when the target
    /// is absent, unknown or not a folder.
    ///
    /// Moving a node into itself or into one of its own descendants is
    /// rejected: the forest is left unchanged and `false` is returned.
    pub fn move_node(&mut self, id: &str, target_folder_id: Option<&str>) -> bool {
        let Some(path) = self.locate(id) else {
            return false;
        };

        if let Some(target) = target_folder_id {
            let would_cycle = self
                .node(&path)
                .is_some_and(|node| node.subtree_contains(target));
            if would_cycle {
                log::debug!("move: rejecting move of {id} into its own subtree ({target})");
                return false;
            }
        }

        let Some(node) = self.take(&path) else {
            return false;
        };

        // Paths are recomputed after the detach since sibling indices may shift.
        match target_folder_id.and_then(|t| self.find_mut(t)).and_then(FileNode::children_mut) {
            Some(children) => children.push(node),
            None => self.nodes.push(node),
        }
        true
    }

    /// Overwrite the content of file `id`. Folders and unknown ids are ignored.
    ///
    /// Like every mutator here, returns `true` only if the forest changed, so
    /// writing the content a file already has returns `false`.
    pub fn update_content(&mut self, id: &str, content: &str) -> bool {
        match self.find_mut(id) {
            Some(FileNode {
                body: NodeBody::File { content: current },
                ..
            }) if current != content => {
                *current = content.to_string();
                true
            }
            _ => false,
        }
    }
}

impl From<Vec<FileNode>> for FileTree {
    fn from(nodes: Vec<FileNode>) -> Self {
        Self::from_nodes(nodes)
    }
}

fn locate_in(nodes: &[FileNode], id: &str, path: &mut Vec<usize>) -> bool {
    for (i, node) in nodes.iter().enumerate() {
        path.push(i);
        if node.id == id || locate_in(node.children(), id, path) {
            return true;
        }
        path.pop();
    }
    false
}

/// Pre-order iterator over a slice of nodes and all their descendants.
pub struct Iter<'a> {
    stack: Vec<&'a FileNode>,
}

impl<'a> Iter<'a> {
    fn new(nodes: &'a [FileNode]) -> Self {
        Self {
            stack: nodes.iter().rev().collect(),
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a FileNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children().iter().rev());
        Some(node)
    }
}
