//! Arena-backed element tree
//!
//! Nodes live in a flat vector and refer to each other by [`NodeId`]. A node owns its
//! ordered child list; the parent link is a plain index used for upward traversal.

use crate::error::{Error, Result};
use crate::path::{NodePath, PathSegments};

/// Index of a node inside its [`Tree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct TreeNode<D> {
    data: D,
    path: NodePath,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl<D> TreeNode<D> {
    pub fn data(&self) -> &D {
        &self.data
    }

    pub fn path(&self) -> &NodePath {
        &self.path
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

#[derive(Debug, Clone)]
pub struct Tree<D> {
    nodes: Vec<TreeNode<D>>,
}

impl<D> Tree<D> {
    pub fn new(root_data: D, root_path: NodePath) -> Self {
        Self {
            nodes: vec![TreeNode {
                data: root_data,
                path: root_path,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Appends a child to `parent`'s child list and links it back to `parent`
    pub fn add_child(&mut self, parent: NodeId, data: D, path: NodePath) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(TreeNode {
            data,
            path,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> &TreeNode<D> {
        &self.nodes[id.0]
    }

    pub fn data(&self, id: NodeId) -> &D {
        &self.nodes[id.0].data
    }

    pub fn node(&self, id: NodeId) -> NodeRef<'_, D> {
        NodeRef { tree: self, id }
    }

    pub fn root_node(&self) -> NodeRef<'_, D> {
        self.node(self.root())
    }

    /// All nodes in pre-order
    pub fn nodes(&self) -> Descendants<'_, D> {
        self.root_node().descendants()
    }
}

/// Borrowed handle on one node, used for traversal
pub struct NodeRef<'a, D> {
    tree: &'a Tree<D>,
    id: NodeId,
}

impl<D> Clone for NodeRef<'_, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D> Copy for NodeRef<'_, D> {}

impl<D> PartialEq for NodeRef<'_, D> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.id == other.id
    }
}

impl<D> std::fmt::Debug for NodeRef<'_, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("path", &self.path().to_string())
            .finish()
    }
}

impl<'a, D> NodeRef<'a, D> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tree(&self) -> &'a Tree<D> {
        self.tree
    }

    pub fn data(&self) -> &'a D {
        &self.tree.nodes[self.id.0].data
    }

    pub fn path(&self) -> &'a NodePath {
        &self.tree.nodes[self.id.0].path
    }

    pub fn path_name(&self) -> &'a str {
        self.path().path_name()
    }

    pub fn parent(&self) -> Option<NodeRef<'a, D>> {
        self.tree.nodes[self.id.0].parent.map(|id| self.tree.node(id))
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a, D>> + 'a {
        let tree = self.tree;
        tree.nodes[self.id.0]
            .children
            .iter()
            .map(move |&id| tree.node(id))
    }

    pub fn has_children(&self) -> bool {
        !self.tree.nodes[self.id.0].children.is_empty()
    }

    /// Parent's other children, in order; empty for the root
    pub fn siblings(&self) -> Vec<NodeRef<'a, D>> {
        match self.parent() {
            Some(parent) => parent.children().filter(|c| c.id != self.id).collect(),
            None => Vec::new(),
        }
    }

    pub fn root(&self) -> NodeRef<'a, D> {
        let mut node = *self;
        while let Some(parent) = node.parent() {
            node = parent;
        }
        node
    }

    /// Ancestors from the parent upwards
    pub fn ancestors(&self) -> impl Iterator<Item = NodeRef<'a, D>> + 'a {
        std::iter::successors(self.parent(), |node| node.parent())
    }

    pub fn is_descendant_of(&self, candidate: NodeId) -> bool {
        self.ancestors().any(|a| a.id == candidate)
    }

    /// This node and everything below it, depth first, children in list order
    pub fn descendants(&self) -> Descendants<'a, D> {
        Descendants {
            tree: self.tree,
            stack: vec![self.id],
        }
    }

    /// Every node at or below this one whose path equals `path`
    pub fn descendants_with_path(&self, path: &NodePath) -> Vec<NodeRef<'a, D>> {
        self.descendants().filter(|n| n.path() == path).collect()
    }

    /// The single node at `<this path>.<relative_path>`, failing if there are several
    pub fn find_unique_descendant_matching_path(
        &self,
        relative_path: &str,
    ) -> Result<Option<NodeRef<'a, D>>> {
        let full_path = self.path().join(relative_path);
        let matches = self.descendants_with_path(&full_path);
        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some(matches[0])),
            count => Err(Error::NonUniqueDescendant {
                element: self.path().to_string(),
                path: full_path.to_string(),
                count,
            }),
        }
    }
}

/// Lazy pre-order walk; restart by asking the node again
pub struct Descendants<'a, D> {
    tree: &'a Tree<D>,
    stack: Vec<NodeId>,
}

impl<'a, D> Iterator for Descendants<'a, D> {
    type Item = NodeRef<'a, D>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.tree.nodes[id.0].children.iter().rev().copied());
        Some(self.tree.node(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Tree<&'static str> {
        let mut tree = Tree::new("root", NodePath::parse("Patient"));
        let root = tree.root();
        let identifier = tree.add_child(root, "identifier", NodePath::parse("Patient.identifier"));
        tree.add_child(identifier, "system", NodePath::parse("Patient.identifier.system"));
        tree.add_child(root, "name", NodePath::parse("Patient.name"));
        tree
    }

    #[test]
    fn descendants_follow_insertion_order() {
        let tree = sample();
        let order: Vec<&str> = tree.nodes().map(|n| *n.data()).collect();
        assert_eq!(order, vec!["root", "identifier", "system", "name"]);

        // restartable
        assert_eq!(tree.nodes().count(), 4);
    }

    #[test]
    fn siblings_exclude_self() {
        let tree = sample();
        let identifier = tree.root_node().children().next().unwrap();

        let siblings: Vec<&str> = identifier.siblings().iter().map(|n| *n.data()).collect();
        assert_eq!(siblings, vec!["name"]);
        assert!(tree.root_node().siblings().is_empty());
    }

    #[test]
    fn descendant_relationships() {
        let tree = sample();
        let system = tree
            .nodes()
            .find(|n| *n.data() == "system")
            .unwrap();

        assert!(system.is_descendant_of(tree.root()));
        assert!(!tree.root_node().is_descendant_of(system.id()));
        assert_eq!(system.root().id(), tree.root());
    }

    #[test]
    fn unique_descendant_lookup() {
        let mut tree = sample();
        let root = tree.root_node();
        let found = root
            .find_unique_descendant_matching_path("identifier.system")
            .unwrap();
        assert_eq!(found.map(|n| *n.data()), Some("system"));
        assert!(root
            .find_unique_descendant_matching_path("telecom")
            .unwrap()
            .is_none());

        let root_id = tree.root();
        tree.add_child(root_id, "name2", NodePath::parse("Patient.name"));
        let err = tree
            .root_node()
            .find_unique_descendant_matching_path("name")
            .unwrap_err();
        assert!(matches!(err, Error::NonUniqueDescendant { count: 2, .. }));
    }
}
