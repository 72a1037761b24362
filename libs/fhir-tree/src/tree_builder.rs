//! Builds a [`Tree`] from an ordered, flat list of (data, path) pairs.

use crate::error::{Error, Result};
use crate::path::{MutableNodePath, NodePath, PathSegments};
use crate::tree::{NodeId, Tree};

/// Supplies placeholder data for intermediate paths missing from the source list
pub type EmptyNodeFactory<'a, D> = Box<dyn Fn(&NodePath) -> D + 'a>;

pub struct TreeDataBuilder<'a, D> {
    tree: Option<Tree<D>>,
    current: Option<NodeId>,
    path: MutableNodePath,
    empty_node_factory: Option<EmptyNodeFactory<'a, D>>,
}

impl<'a, D> Default for TreeDataBuilder<'a, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, D> TreeDataBuilder<'a, D> {
    pub fn new() -> Self {
        Self {
            tree: None,
            current: None,
            path: MutableNodePath::new(),
            empty_node_factory: None,
        }
    }

    pub fn with_empty_node_factory(factory: EmptyNodeFactory<'a, D>) -> Self {
        Self {
            empty_node_factory: Some(factory),
            ..Self::new()
        }
    }

    /// Adds a node below the most recent node whose path is its parent path
    pub fn add_node(&mut self, data: D, path: NodePath) -> Result<NodeId> {
        if path.size() == 0 {
            return Err(Error::TreeConstruction("element with empty path".into()));
        }
        let mut parent_path = path.mutable_copy();
        let name = parent_path.step_out();

        self.step_to(&parent_path)?;
        let id = self.append(data, path)?;
        self.path.step_into(name);
        Ok(id)
    }

    pub fn into_tree(self) -> Result<Tree<D>> {
        self.tree
            .ok_or_else(|| Error::TreeConstruction("no elements to build a tree from".into()))
    }

    fn step_to(&mut self, target: &MutableNodePath) -> Result<()> {
        if self.path.is_subpath(target) {
            while self.path.size() > target.size() {
                self.step_out();
            }
            return Ok(());
        }

        if self.empty_node_factory.is_none() {
            return Err(Error::TreeConstruction(format!(
                "Cannot step to {} from {} (no empty node factory)",
                target, self.path
            )));
        }

        while !target.is_subpath(&self.path) {
            self.step_out();
        }
        let Some(factory) = self.empty_node_factory.as_ref() else {
            return Ok(());
        };
        for index in self.path.size()..target.size() {
            let segment = target.part(index).unwrap_or_default().to_string();
            self.path.step_into(segment);
            let placeholder_path = self.path.immutable_copy();
            let data = factory(&placeholder_path);
            self.current = Some(Self::attach(
                &mut self.tree,
                self.current,
                data,
                placeholder_path,
            )?);
        }
        Ok(())
    }

    fn step_out(&mut self) {
        self.path.step_out();
        self.current = self.current.and_then(|id| {
            self.tree
                .as_ref()
                .and_then(|tree| tree.get(id).parent())
        });
    }

    fn append(&mut self, data: D, path: NodePath) -> Result<NodeId> {
        let id = Self::attach(&mut self.tree, self.current, data, path)?;
        self.current = Some(id);
        self.sanity_check()?;
        Ok(id)
    }

    fn attach(
        tree: &mut Option<Tree<D>>,
        parent: Option<NodeId>,
        data: D,
        path: NodePath,
    ) -> Result<NodeId> {
        match (tree.as_mut(), parent) {
            (Some(tree), Some(parent)) => Ok(tree.add_child(parent, data, path)),
            (None, None) => {
                let new_tree = Tree::new(data, path);
                let root = new_tree.root();
                *tree = Some(new_tree);
                Ok(root)
            }
            (Some(tree), None) => Err(Error::TreeConstruction(format!(
                "second root {} (tree already rooted at {})",
                path,
                tree.root_node().path()
            ))),
            (None, Some(_)) => Err(Error::TreeConstruction(format!(
                "parent recorded for {} before any root",
                path
            ))),
        }
    }

    fn sanity_check(&self) -> Result<()> {
        let (Some(tree), Some(current)) = (self.tree.as_ref(), self.current) else {
            return Ok(());
        };
        let depth = tree.node(current).ancestors().count() + 1;
        let node_path = tree.get(current).path();
        if depth != node_path.size() || depth != self.path.size() + 1 {
            return Err(Error::TreeConstruction(format!(
                "node {} placed at depth {} while stepping at {}",
                node_path, depth, self.path
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_in_source_order() {
        let paths = [
            "Patient",
            "Patient.identifier",
            "Patient.identifier.system",
            "Patient.identifier",
            "Patient.identifier.system",
            "Patient.name",
        ];
        let mut builder = TreeDataBuilder::new();
        for (i, path) in paths.iter().enumerate() {
            builder.add_node(i, NodePath::parse(path)).unwrap();
        }
        let tree = builder.into_tree().unwrap();

        let order: Vec<usize> = tree.nodes().map(|n| *n.data()).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(tree.root_node().children().count(), 3);
    }

    #[test]
    fn missing_parent_without_factory_fails() {
        let mut builder = TreeDataBuilder::new();
        builder.add_node("root", NodePath::parse("Patient")).unwrap();
        let err = builder
            .add_node("system", NodePath::parse("Patient.identifier.system"))
            .unwrap_err();

        assert!(err.to_string().contains("Cannot step to Patient.identifier from Patient"));
    }

    #[test]
    fn factory_fills_missing_parents() {
        let mut builder =
            TreeDataBuilder::with_empty_node_factory(Box::new(|path: &NodePath| path.to_string()));
        builder.add_node("Patient".to_string(), NodePath::parse("Patient")).unwrap();
        builder
            .add_node("leaf".to_string(), NodePath::parse("Patient.identifier.system"))
            .unwrap();
        builder
            .add_node("name".to_string(), NodePath::parse("Patient.name"))
            .unwrap();
        let tree = builder.into_tree().unwrap();

        let order: Vec<String> = tree.nodes().map(|n| n.data().clone()).collect();
        assert_eq!(order, vec!["Patient", "Patient.identifier", "leaf", "name"]);
    }

    #[test]
    fn second_root_is_rejected() {
        let mut builder = TreeDataBuilder::new();
        builder.add_node(1, NodePath::parse("Patient")).unwrap();
        assert!(builder.add_node(2, NodePath::parse("Observation")).is_err());
    }
}
