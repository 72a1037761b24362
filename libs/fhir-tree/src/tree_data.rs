//! A materialized snapshot or differential tree with its indices and cached links.

use crate::data::{FhirNodeData, SnapshotData};
use crate::error::{Error, Result};
use crate::lookup::{FhirTreeContentsLookup, FhirTreeIdLookup, FhirTreePathLookup};
use crate::node::FhirNode;
use crate::path::NodePath;
use crate::tree::{NodeId, Tree};
use std::collections::HashMap;
use std::sync::Arc;

/// Values filled in by the caching passes. Each entry is written once.
#[derive(Debug, Default)]
pub struct ResolvedLinks {
    linked_nodes: HashMap<NodeId, NodeId>,
    discriminators: HashMap<NodeId, String>,
}

impl ResolvedLinks {
    /// `target` lives in the snapshot tree: the tree itself, or a differential's backup tree
    pub fn cache_linked_node(
        &mut self,
        node: NodeId,
        target: NodeId,
        path: &NodePath,
    ) -> Result<()> {
        if self.linked_nodes.contains_key(&node) {
            return Err(Error::AlreadyCached {
                what: "linked node",
                path: path.to_string(),
            });
        }
        self.linked_nodes.insert(node, target);
        Ok(())
    }

    pub fn cache_discriminator(
        &mut self,
        node: NodeId,
        value: String,
        path: &NodePath,
    ) -> Result<()> {
        if self.discriminators.contains_key(&node) {
            return Err(Error::AlreadyCached {
                what: "discriminator",
                path: path.to_string(),
            });
        }
        self.discriminators.insert(node, value);
        Ok(())
    }

    pub fn linked_node(&self, node: NodeId) -> Option<NodeId> {
        self.linked_nodes.get(&node).copied()
    }

    pub fn discriminator(&self, node: NodeId) -> Option<&str> {
        self.discriminators.get(&node).map(String::as_str)
    }
}

#[derive(Debug)]
pub struct FhirTreeData {
    tree: Tree<FhirNodeData>,
    backup: Option<Arc<FhirTreeData>>,
    paths: FhirTreePathLookup,
    ids: FhirTreeIdLookup,
    links: ResolvedLinks,
    contents: Option<FhirTreeContentsLookup>,
    skipped: Vec<NodePath>,
}

impl FhirTreeData {
    /// Wraps a built tree. Differential trees must come with the snapshot their nodes point into.
    pub fn new(tree: Tree<FhirNodeData>, backup: Option<Arc<FhirTreeData>>) -> Result<Self> {
        let differential_nodes = tree
            .nodes()
            .filter(|node| node.data().as_differential().is_some())
            .count();
        match (&backup, differential_nodes) {
            (None, 0) => {}
            (Some(backup), n) if n == tree.len() => {
                if backup.is_differential() {
                    return Err(Error::Inconsistent(
                        "a differential tree cannot back another differential tree".into(),
                    ));
                }
                for node in tree.nodes() {
                    if let Some(data) = node.data().backup() {
                        if data.id.index() >= backup.len() {
                            return Err(Error::Inconsistent(format!(
                                "backup of {} is outside the snapshot tree",
                                node.path()
                            )));
                        }
                    }
                }
            }
            (None, _) => {
                return Err(Error::Inconsistent(
                    "differential nodes without a snapshot tree".into(),
                ))
            }
            (Some(_), _) => {
                return Err(Error::Inconsistent(
                    "snapshot nodes in a differential tree".into(),
                ))
            }
        }

        let paths = FhirTreePathLookup::build(&tree);
        let ids = FhirTreeIdLookup::build(&tree);
        Ok(Self {
            tree,
            backup,
            paths,
            ids,
            links: ResolvedLinks::default(),
            contents: None,
            skipped: Vec::new(),
        })
    }

    pub fn tree(&self) -> &Tree<FhirNodeData> {
        &self.tree
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn is_differential(&self) -> bool {
        self.backup.is_some()
    }

    /// The snapshot tree a differential tree falls back to
    pub fn backup_tree(&self) -> Option<&FhirTreeData> {
        self.backup.as_deref()
    }

    /// The tree linked nodes point into
    pub fn snapshot_side(&self) -> &FhirTreeData {
        self.backup_tree().unwrap_or(self)
    }

    pub fn root(&self) -> FhirNode<'_> {
        FhirNode::new(self, self.tree.root())
    }

    pub fn node(&self, id: NodeId) -> FhirNode<'_> {
        FhirNode::new(self, id)
    }

    /// Every node, depth first in source order
    pub fn nodes(&self) -> impl Iterator<Item = FhirNode<'_>> {
        self.tree.nodes().map(move |node| FhirNode::new(self, node.id()))
    }

    pub fn nodes_with_path(&self, path: &NodePath) -> impl Iterator<Item = FhirNode<'_>> {
        self.paths.get(path).iter().map(move |&id| FhirNode::new(self, id))
    }

    pub fn nodes_with_id(&self, id: &str) -> impl Iterator<Item = FhirNode<'_>> {
        self.ids.get(id).iter().map(move |&node| FhirNode::new(self, node))
    }

    pub fn links(&self) -> &ResolvedLinks {
        &self.links
    }

    pub(crate) fn links_mut(&mut self) -> &mut ResolvedLinks {
        &mut self.links
    }

    pub(crate) fn snapshot_data(&self, id: NodeId) -> Result<SnapshotData> {
        self.tree.data(id).as_snapshot().cloned().ok_or_else(|| {
            Error::Inconsistent(format!("{} is not a snapshot node", self.tree.get(id).path()))
        })
    }

    /// Builds the display key index; keys depend on cached discriminators
    pub(crate) fn index_contents(&mut self) -> Result<()> {
        let contents = FhirTreeContentsLookup::build(self)?;
        self.contents = Some(contents);
        Ok(())
    }

    pub fn contents(&self) -> Result<&FhirTreeContentsLookup> {
        self.contents.as_ref().ok_or(Error::ContentsNotIndexed)
    }

    pub fn node_with_key(&self, key: &str) -> Result<FhirNode<'_>> {
        let id = self.contents()?.get(key)?;
        Ok(FhirNode::new(self, id))
    }

    /// Paths of differential elements dropped because no snapshot node matched
    pub fn skipped(&self) -> &[NodePath] {
        &self.skipped
    }

    pub(crate) fn set_skipped(&mut self, skipped: Vec<NodePath>) {
        self.skipped = skipped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_are_write_once() {
        let mut links = ResolvedLinks::default();
        let mut tree = Tree::new((), NodePath::parse("Patient"));
        let root = tree.root();
        let name = tree.add_child(root, (), NodePath::parse("Patient.name"));
        let path = NodePath::parse("Patient");

        links.cache_discriminator(root, "nhs".into(), &path).unwrap();
        let err = links
            .cache_discriminator(root, "local".into(), &path)
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyCached { what: "discriminator", .. }));
        assert_eq!(links.discriminator(root), Some("nhs"));

        links.cache_linked_node(root, name, &path).unwrap();
        let err = links.cache_linked_node(root, root, &path).unwrap_err();
        assert!(matches!(err, Error::AlreadyCached { what: "linked node", .. }));
        assert_eq!(links.linked_node(root), Some(name));
    }
}
