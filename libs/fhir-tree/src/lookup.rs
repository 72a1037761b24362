//! Whole-tree indices, built once a tree is materialized.

use crate::data::FhirNodeData;
use crate::error::{Error, Result};
use crate::path::NodePath;
use crate::tree::{NodeId, Tree};
use crate::tree_data::FhirTreeData;
use std::collections::HashMap;

/// Every node at each path; sliced siblings share a path
#[derive(Debug, Default)]
pub struct FhirTreePathLookup {
    by_path: HashMap<NodePath, Vec<NodeId>>,
}

impl FhirTreePathLookup {
    pub fn build(tree: &Tree<FhirNodeData>) -> Self {
        let mut by_path: HashMap<NodePath, Vec<NodeId>> = HashMap::new();
        for node in tree.nodes() {
            by_path.entry(node.path().clone()).or_default().push(node.id());
        }
        Self { by_path }
    }

    pub fn get(&self, path: &NodePath) -> &[NodeId] {
        self.by_path.get(path).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Nodes by declared element id. Ids should be unique, but duplicates are kept.
#[derive(Debug, Default)]
pub struct FhirTreeIdLookup {
    by_id: HashMap<String, Vec<NodeId>>,
}

impl FhirTreeIdLookup {
    pub fn build(tree: &Tree<FhirNodeData>) -> Self {
        let mut by_id: HashMap<String, Vec<NodeId>> = HashMap::new();
        for node in tree.nodes() {
            if let Some(id) = node.data().element().id() {
                by_id.entry(id.to_string()).or_default().push(node.id());
            }
        }
        Self { by_id }
    }

    pub fn get(&self, id: &str) -> &[NodeId] {
        self.by_id.get(id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Nodes by display key. Total over the tree: keys are unique and every lookup must hit.
#[derive(Debug, Default)]
pub struct FhirTreeContentsLookup {
    by_key: HashMap<String, NodeId>,
}

impl FhirTreeContentsLookup {
    pub fn build(tree_data: &FhirTreeData) -> Result<Self> {
        let mut by_key = HashMap::with_capacity(tree_data.len());
        for node in tree_data.nodes() {
            let key = node.node_key();
            if by_key.insert(key.clone(), node.id()).is_some() {
                return Err(Error::DuplicateNodeKey(key));
            }
        }
        Ok(Self { by_key })
    }

    pub fn get(&self, key: &str) -> Result<NodeId> {
        self.by_key
            .get(key)
            .copied()
            .ok_or_else(|| Error::MissingNodeKey(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.by_key.keys().map(String::as_str)
    }
}
