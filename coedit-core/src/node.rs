//! File tree nodes.
//!
//! A node's kind is fixed by its body variant: only folders carry children and
//! only files carry content, so "a file with children" cannot be represented.
//!
//! JSON shape (flattened body, tagged by `kind`):
//! ```text
//! {"id":"f1","name":"x.js","kind":"file","content":""}
//! {"id":"d1","name":"src","kind":"folder","children":[...]}
//! ```

use serde::{Deserialize, Serialize};

/// Node kind as carried on the wire by `file-create`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Folder,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Folder => "folder",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific payload of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeBody {
    File {
        #[serde(default, alias = "code")]
        content: String,
    },
    Folder {
        #[serde(default)]
        children: Vec<FileNode>,
    },
}

/// A node of a room's file tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub body: NodeBody,
}

impl FileNode {
    /// Create an empty node of the given kind (empty content / no children).
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: NodeKind) -> Self {
        let body = match kind {
            NodeKind::File => NodeBody::File { content: String::new() },
            NodeKind::Folder => NodeBody::Folder { children: Vec::new() },
        };
        Self {
            id: id.into(),
            name: name.into(),
            body,
        }
    }

    pub fn file(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, NodeKind::File)
    }

    pub fn folder(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, NodeKind::Folder)
    }

    /// Builder-style content setter. Ignored for folders.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        if let NodeBody::File { content: c } = &mut self.body {
            *c = content.into();
        }
        self
    }

    /// Builder-style child append. Ignored for files.
    pub fn with_child(mut self, child: FileNode) -> Self {
        if let NodeBody::Folder { children } = &mut self.body {
            children.push(child);
        }
        self
    }

    pub fn kind(&self) -> NodeKind {
        match self.body {
            NodeBody::File { .. } => NodeKind::File,
            NodeBody::Folder { .. } => NodeKind::Folder,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.body, NodeBody::Folder { .. })
    }

    pub fn is_file(&self) -> bool {
        matches!(self.body, NodeBody::File { .. })
    }

    /// File content, `None` for folders.
    pub fn content(&self) -> Option<&str> {
        match &self.body {
            NodeBody::File { content } => Some(content),
            NodeBody::Folder { .. } => None,
        }
    }

    /// Children of a folder; files have none.
    pub fn children(&self) -> &[FileNode] {
        match &self.body {
            NodeBody::Folder { children } => children,
            NodeBody::File { .. } => &[],
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<FileNode>> {
        match &mut self.body {
            NodeBody::Folder { children } => Some(children),
            NodeBody::File { .. } => None,
        }
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn subtree_len(&self) -> usize {
        1 + self.children().iter().map(FileNode::subtree_len).sum::<usize>()
    }

    /// Whether `id` names this node or any node below it.
    pub fn subtree_contains(&self, id: &str) -> bool {
        self.id == id || self.children().iter().any(|c| c.subtree_contains(id))
    }
}
