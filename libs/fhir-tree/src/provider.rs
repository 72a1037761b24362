//! Builds the snapshot and differential trees of one StructureDefinition.

use crate::builder::{FhirTreeNodeDataBuilder, SkeletonData};
use crate::cache::cache_tree;
use crate::context::RenderContext;
use crate::data::{BackupNode, DifferentialData, FhirNodeData, SnapshotData};
use crate::error::{Error, Result};
use crate::event::RendererEventType;
use crate::path::NodePath;
use crate::resolve::{resolve_backup_nodes, BackupResolution};
use crate::tree::{NodeId, Tree};
use crate::tree_builder::TreeDataBuilder;
use crate::tree_data::FhirTreeData;
use crate::validate::validate_mappings;
use crate::wrap::WrappedElement;
use ferrum_models::{ElementDefinition, FhirVersion, StructureDefinition};
use std::sync::Arc;

pub struct StructureDefinitionTreeDataProvider<'a> {
    structure_definition: &'a StructureDefinition,
    version: FhirVersion,
}

impl<'a> StructureDefinitionTreeDataProvider<'a> {
    pub fn new(structure_definition: &'a StructureDefinition) -> Result<Self> {
        let version = structure_definition.implicit_fhir_version()?;
        Ok(Self {
            structure_definition,
            version,
        })
    }

    pub fn version(&self) -> FhirVersion {
        self.version
    }

    pub fn structure_definition(&self) -> &'a StructureDefinition {
        self.structure_definition
    }

    /// The fully expanded element tree, indexed and cached
    pub fn snapshot_tree_data(&self, ctx: &RenderContext<'_>) -> Result<Arc<FhirTreeData>> {
        let snapshot = self
            .structure_definition
            .snapshot
            .as_ref()
            .ok_or_else(|| Error::MissingSnapshot(self.structure_definition.url.clone()))?;

        let mut builder = TreeDataBuilder::new();
        for element in &snapshot.element {
            let wrapped = WrappedElement::new(element, self.version);
            let data = FhirTreeNodeDataBuilder::new(&wrapped, ctx).with_definition_details()?;
            if data.min.is_none() || data.max.is_none() {
                ctx.event(
                    RendererEventType::MissingCardinality,
                    format!("Snapshot node {} is missing cardinality", data.path),
                )?;
            }
            let path = data.path.clone();
            builder.add_node(FhirNodeData::Snapshot(SnapshotData::new(data)), path)?;
        }

        let mut tree_data = FhirTreeData::new(builder.into_tree()?, None)?;
        complete(&mut tree_data, ctx)?;
        Ok(Arc::new(tree_data))
    }

    /// The profile's own elements, each paired with the snapshot node it constrains
    pub fn differential_tree_data(
        &self,
        snapshot: Arc<FhirTreeData>,
        ctx: &RenderContext<'_>,
    ) -> Result<FhirTreeData> {
        let differential = self
            .structure_definition
            .differential
            .as_ref()
            .ok_or_else(|| Error::MissingDifferential(self.structure_definition.url.clone()))?;
        let elements = &differential.element;

        let skeleton = self.skeleton_tree(elements, ctx)?;
        let resolutions = resolve_backup_nodes(&skeleton, &snapshot, ctx)?;

        let mut tree: Option<Tree<FhirNodeData>> = None;
        let mut placed: Vec<Option<NodeId>> = vec![None; skeleton.len()];
        let mut skipped = Vec::new();

        for node in skeleton.nodes() {
            let backup_id = match resolutions[node.id().index()] {
                BackupResolution::Matched(backup_id) => backup_id,
                BackupResolution::Skipped => {
                    let parent_placed = node
                        .parent()
                        .map_or(true, |p| placed[p.id().index()].is_some());
                    // report the top of a dropped subtree only
                    if parent_placed {
                        ctx.event(
                            RendererEventType::UnmatchedDifferentialElement,
                            format!(
                                "No snapshot node matches differential element {}",
                                node.path()
                            ),
                        )?;
                        skipped.push(node.path().clone());
                    }
                    continue;
                }
            };

            let backup = BackupNode {
                id: backup_id,
                data: snapshot.snapshot_data(backup_id)?,
            };
            let data = match node.data().source() {
                Some(index) => {
                    let element = elements.get(index).ok_or_else(|| {
                        Error::Inconsistent(format!("no differential element {}", index))
                    })?;
                    let wrapped = WrappedElement::new(element, self.version);
                    let element_data =
                        FhirTreeNodeDataBuilder::new(&wrapped, ctx).with_definition_details()?;
                    DifferentialData::new(element_data, backup, ctx)?
                }
                None => DifferentialData::placeholder(node.path().clone(), backup),
            };

            let id = attach(&mut tree, &placed, node.parent().map(|p| p.id()), data, node.path())?;
            placed[node.id().index()] = Some(id);
        }

        let tree = tree.ok_or_else(|| Error::BackupResolution {
            path: skeleton.root_node().path().to_string(),
            reason: "differential root has no snapshot counterpart".into(),
        })?;
        let mut tree_data = FhirTreeData::new(tree, Some(snapshot))?;
        tree_data.set_skipped(skipped);
        complete(&mut tree_data, ctx)?;
        Ok(tree_data)
    }

    /// Differential elements as a tree, with gaps filled for skipped-over parents
    fn skeleton_tree(
        &self,
        elements: &[ElementDefinition],
        ctx: &RenderContext<'_>,
    ) -> Result<Tree<SkeletonData>> {
        let mut builder = TreeDataBuilder::with_empty_node_factory(Box::new(SkeletonData::gap));
        for (index, element) in elements.iter().enumerate() {
            let wrapped = WrappedElement::new(element, self.version);
            let skeleton = FhirTreeNodeDataBuilder::new(&wrapped, ctx)
                .with_skeleton_details()?
                .with_source(index);
            let path = skeleton.path().clone();
            builder.add_node(skeleton, path)?;
        }
        builder.into_tree()
    }
}

fn attach(
    tree: &mut Option<Tree<FhirNodeData>>,
    placed: &[Option<NodeId>],
    skeleton_parent: Option<NodeId>,
    data: DifferentialData,
    path: &NodePath,
) -> Result<NodeId> {
    let data = FhirNodeData::Differential(data);
    match (tree.as_mut(), skeleton_parent) {
        (None, None) => {
            let new_tree = Tree::new(data, path.clone());
            let root = new_tree.root();
            *tree = Some(new_tree);
            Ok(root)
        }
        (Some(tree), Some(parent)) => {
            let parent = placed
                .get(parent.index())
                .copied()
                .flatten()
                .ok_or_else(|| Error::Inconsistent(format!("parent of {} was not placed", path)))?;
            Ok(tree.add_child(parent, data, path.clone()))
        }
        _ => Err(Error::Inconsistent(format!(
            "differential node {} placed out of order",
            path
        ))),
    }
}

/// Caching passes, mapping checks, then the display key index
fn complete(tree_data: &mut FhirTreeData, ctx: &RenderContext<'_>) -> Result<()> {
    cache_tree(tree_data, ctx)?;
    for node in tree_data.nodes() {
        validate_mappings(node.element().mappings(), node.path(), ctx)?;
    }
    tree_data.index_contents()
}
