//! Read-only node handle over a [`FhirTreeData`].

use crate::context::RenderContext;
use crate::data::{BindingInfo, ElementData, FhirNodeData, SlicingInfo};
use crate::error::{Error, Result};
use crate::event::RendererEventType;
use crate::links::{LinkData, LinkDatas, CHOICE_SUFFIXES};
use crate::path::{NodePath, PathSegments};
use crate::slicing;
use crate::tree::{NodeId, NodeRef};
use crate::tree_data::FhirTreeData;

/// Path names whose missing type link can be filled in
const FIXABLE_TYPE_LINK_NAMES: [&str; 1] = ["extension"];

#[derive(Clone, Copy)]
pub struct FhirNode<'a> {
    tree: &'a FhirTreeData,
    id: NodeId,
}

impl PartialEq for FhirNode<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.id == other.id
    }
}

impl std::fmt::Debug for FhirNode<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FhirNode")
            .field("id", &self.id)
            .field("path", self.path())
            .finish()
    }
}

impl<'a> FhirNode<'a> {
    pub(crate) fn new(tree: &'a FhirTreeData, id: NodeId) -> Self {
        Self { tree, id }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tree_data(&self) -> &'a FhirTreeData {
        self.tree
    }

    pub fn node_ref(&self) -> NodeRef<'a, FhirNodeData> {
        self.tree.tree().node(self.id)
    }

    pub fn data(&self) -> &'a FhirNodeData {
        self.tree.tree().data(self.id)
    }

    pub fn element(&self) -> &'a ElementData {
        self.data().element()
    }

    pub fn path(&self) -> &'a NodePath {
        self.node_ref().path()
    }

    pub fn path_name(&self) -> &'a str {
        self.path().path_name()
    }

    pub fn is_root(&self) -> bool {
        self.node_ref().parent().is_none()
    }

    fn wrap(&self, node: NodeRef<'a, FhirNodeData>) -> FhirNode<'a> {
        FhirNode::new(self.tree, node.id())
    }

    pub fn parent(&self) -> Option<FhirNode<'a>> {
        self.node_ref().parent().map(|p| self.wrap(p))
    }

    pub fn children(&self) -> impl Iterator<Item = FhirNode<'a>> + 'a {
        let tree = self.tree;
        self.node_ref()
            .children()
            .map(move |c| FhirNode::new(tree, c.id()))
    }

    pub fn siblings(&self) -> Vec<FhirNode<'a>> {
        self.node_ref()
            .siblings()
            .into_iter()
            .map(|s| self.wrap(s))
            .collect()
    }

    pub fn ancestors(&self) -> impl Iterator<Item = FhirNode<'a>> + 'a {
        let tree = self.tree;
        self.node_ref()
            .ancestors()
            .map(move |a| FhirNode::new(tree, a.id()))
    }

    /// This node and everything below it
    pub fn descendants(&self) -> impl Iterator<Item = FhirNode<'a>> + 'a {
        let tree = self.tree;
        self.node_ref()
            .descendants()
            .map(move |d| FhirNode::new(tree, d.id()))
    }

    pub fn find_unique_descendant_matching_path(
        &self,
        relative_path: &str,
    ) -> Result<Option<FhirNode<'a>>> {
        Ok(self
            .node_ref()
            .find_unique_descendant_matching_path(relative_path)?
            .map(|d| self.wrap(d)))
    }

    /// The matched snapshot node of a differential node
    pub fn backup_node(&self) -> Option<FhirNode<'a>> {
        let backup = self.data().backup()?;
        let tree = self.tree.backup_tree()?;
        Some(FhirNode::new(tree, backup.id))
    }

    /// This node's counterpart in the snapshot tree: itself, or its backup
    pub fn snapshot_node(&self) -> FhirNode<'a> {
        self.backup_node().unwrap_or(*self)
    }

    pub fn has_slicing_info(&self) -> bool {
        self.data().has_slicing_info()
    }

    pub fn slicing_info(&self) -> Option<&'a SlicingInfo> {
        self.data().slicing_info()
    }

    pub fn fixed_value(&self) -> Option<&'a str> {
        self.data().fixed_value()
    }

    pub fn binding(&self, ctx: &RenderContext<'_>) -> Result<Option<BindingInfo>> {
        self.data().binding(ctx)
    }

    /// The sibling with the same path that declares how this path is sliced.
    ///
    /// For differential nodes the sibling must be the backup's slicing sibling.
    pub fn slicing_sibling(&self) -> Result<Option<FhirNode<'a>>> {
        let direct = slicing::slicing_sibling(self.node_ref())?.map(|s| self.wrap(s));
        let (Some(sibling), Some(backup)) = (direct, self.backup_node()) else {
            return Ok(direct);
        };

        let backup_sibling = backup.slicing_sibling()?;
        match (sibling.backup_node(), backup_sibling) {
            (_, None) => Err(Error::SlicingSiblingMismatch {
                path: self.path().to_string(),
                reason: "backup node has no slicing sibling".into(),
            }),
            (Some(found), Some(expected)) if found.id() == expected.id() => Ok(Some(sibling)),
            _ => Err(Error::SlicingSiblingMismatch {
                path: self.path().to_string(),
                reason: "slicing sibling's backup differs from the backup's slicing sibling".into(),
            }),
        }
    }

    pub fn discriminator_value(&self) -> Option<&'a str> {
        self.tree.links().discriminator(self.id)
    }

    /// The content reference target, always a node of the snapshot tree
    pub fn linked_node(&self) -> Result<Option<FhirNode<'a>>> {
        if let Some(target) = self.tree.links().linked_node(self.id) {
            return Ok(Some(FhirNode::new(self.tree.snapshot_side(), target)));
        }
        let element = self.element();
        if element.has_linked_node() {
            return Err(Error::LinkNotResolved {
                path: self.path().to_string(),
                link: element
                    .linked_node_id()
                    .or(element.linked_node_name())
                    .unwrap_or_default()
                    .to_string(),
            });
        }
        match self.backup_node() {
            Some(backup) => backup.linked_node(),
            None => Ok(None),
        }
    }

    /// `max` is `0` here or on any ancestor
    pub fn is_removed_by_profile(&self) -> bool {
        self.data().is_removed() || self.ancestors().any(|a| a.data().is_removed())
    }

    /// Path name, with the slice alias when the node sits under slicing
    pub fn key_segment(&self) -> String {
        let discriminator = self
            .discriminator_value()
            .or_else(|| self.backup_node().and_then(|b| b.discriminator_value()));
        match discriminator {
            Some(value) => {
                let data = self.data();
                let alias = data
                    .slice_name()
                    .or_else(|| data.name())
                    .unwrap_or(value);
                format!("{}({})", self.path_name(), alias)
            }
            None => self.path_name().to_string(),
        }
    }

    /// Unique key of this node for cross-referencing, e.g. `Patient.identifier(NHS).system`
    pub fn node_key(&self) -> String {
        let mut segments: Vec<String> = self.ancestors().map(|a| a.key_segment()).collect();
        segments.reverse();
        segments.push(self.key_segment());
        segments.join(".")
    }

    /// Profile URLs under this extension node's `Extension` type link
    pub fn extension_url_discriminators(&self) -> Vec<String> {
        if self.path_name() != "extension" {
            return Vec::new();
        }
        self.data()
            .declared_type_links()
            .nested_links("Extension")
            .into_iter()
            .filter(|link| !link.is_generic_extension())
            .map(|link| link.url.clone())
            .collect()
    }

    /// Declared type links, with fallbacks for nodes that declare none
    pub fn type_links(&self, ctx: &RenderContext<'_>) -> Result<LinkDatas> {
        let data = self.data();
        let version = data.element().version();
        let mut links = data.element().declared_type_links().clone();

        if links.is_empty() && !data.element().has_linked_node() {
            if let Some(backup) = self.backup_node() {
                return backup.type_links(ctx);
            }
        }

        if links.is_empty() {
            if let Some(linked) = self.linked_node()? {
                let key = linked.node_key();
                links = LinkDatas::single(LinkData::new(
                    format!("details.html#{}", key),
                    format!("see {}", key),
                ));
            }
        }

        if links.is_empty() && FIXABLE_TYPE_LINK_NAMES.contains(&self.path_name()) {
            ctx.event(
                RendererEventType::FixMissingTypeLink,
                format!("Filled in missing Extension type link for {}", self.path()),
            )?;
            links = LinkDatas::single(LinkData::generic_extension(version));
        }

        if links.is_empty() && !self.is_root() {
            ctx.event(
                RendererEventType::MissingTypeLink,
                format!("Missing type link for {}", self.path()),
            )?;
        }

        if self.path_name().ends_with("[x]") && covers_all_choice_types(&links) {
            return Ok(LinkDatas::single(LinkData::open_type(version)));
        }
        Ok(links)
    }
}

fn covers_all_choice_types(links: &LinkDatas) -> bool {
    CHOICE_SUFFIXES.iter().all(|suffix| {
        links
            .outer_links()
            .any(|link| link.text.eq_ignore_ascii_case(suffix))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{BackupNode, DifferentialData};
    use crate::event::EventAccumulator;
    use crate::provider::StructureDefinitionTreeDataProvider;
    use crate::tree::Tree;
    use ferrum_models::StructureDefinition;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn snapshot_tree(elements: Vec<Value>) -> Arc<FhirTreeData> {
        let sd = StructureDefinition::from_value(&json!({
            "resourceType": "StructureDefinition",
            "url": "http://example.org/fhir/StructureDefinition/node-test",
            "name": "NodeTest",
            "fhirVersion": "3.0.1",
            "kind": "resource",
            "snapshot": { "element": elements },
            "differential": { "element": [] }
        }))
        .unwrap();
        let events = EventAccumulator::default();
        StructureDefinitionTreeDataProvider::new(&sd)
            .unwrap()
            .snapshot_tree_data(&RenderContext::new(&events))
            .unwrap()
    }

    fn by_id<'a>(tree: &'a FhirTreeData, id: &str) -> FhirNode<'a> {
        tree.nodes_with_id(id).next().unwrap()
    }

    /// Differential data for `element`, backed by snapshot node `backup`
    fn differential(
        snapshot: &FhirTreeData,
        element: ElementData,
        backup: NodeId,
        ctx: &RenderContext<'_>,
    ) -> FhirNodeData {
        let backup = BackupNode {
            id: backup,
            data: snapshot.snapshot_data(backup).unwrap(),
        };
        FhirNodeData::Differential(DifferentialData::new(element, backup, ctx).unwrap())
    }

    fn sliced_identifiers() -> Vec<Value> {
        vec![
            json!({ "id": "Patient", "path": "Patient", "min": 0, "max": "*" }),
            json!({
                "id": "Patient.identifier",
                "path": "Patient.identifier",
                "min": 0,
                "max": "*",
                "type": [{ "code": "Identifier" }],
                "slicing": { "discriminator": [{ "type": "value", "path": "system" }] }
            }),
            json!({
                "id": "Patient.identifier:NHS",
                "path": "Patient.identifier",
                "sliceName": "NHS",
                "type": [{ "code": "Identifier" }]
            }),
            json!({
                "id": "Patient.identifier:Local",
                "path": "Patient.identifier",
                "sliceName": "Local",
                "type": [{ "code": "Identifier" }]
            }),
        ]
    }

    #[test]
    fn missing_type_links_are_reported_below_the_root() {
        let snapshot = snapshot_tree(vec![
            json!({ "id": "Patient", "path": "Patient", "min": 0, "max": "*" }),
            json!({ "id": "Patient.active", "path": "Patient.active", "min": 0, "max": "1" }),
        ]);
        let events = EventAccumulator::default();
        let ctx = RenderContext::new(&events);

        assert!(snapshot.root().type_links(&ctx).unwrap().is_empty());
        assert!(events.kinds().is_empty());

        let active = by_id(&snapshot, "Patient.active");
        assert!(active.type_links(&ctx).unwrap().is_empty());
        assert_eq!(events.kinds(), vec![RendererEventType::MissingTypeLink]);
    }

    #[test]
    fn untyped_extension_gets_generic_extension_link() {
        let snapshot = snapshot_tree(vec![
            json!({ "id": "Patient", "path": "Patient", "min": 0, "max": "*" }),
            json!({ "id": "Patient.extension", "path": "Patient.extension", "min": 0, "max": "*" }),
        ]);
        let events = EventAccumulator::default();
        let ctx = RenderContext::new(&events);

        let links = by_id(&snapshot, "Patient.extension").type_links(&ctx).unwrap();

        assert_eq!(links.texts(), vec!["Extension"]);
        assert!(links.outer_links().all(LinkData::is_generic_extension));
        assert_eq!(events.kinds(), vec![RendererEventType::FixMissingTypeLink]);
    }

    #[test]
    fn choice_covering_every_type_collapses_to_open_type() {
        let all: Vec<Value> = CHOICE_SUFFIXES
            .iter()
            .map(|code| json!({ "code": code }))
            .collect();
        let some = vec![json!({ "code": "Quantity" }), json!({ "code": "string" })];
        let snapshot = snapshot_tree(vec![
            json!({ "id": "Observation", "path": "Observation", "min": 0, "max": "*" }),
            json!({ "id": "Observation.value[x]", "path": "Observation.value[x]", "type": all }),
            json!({
                "id": "Observation.effective[x]",
                "path": "Observation.effective[x]",
                "type": some
            }),
        ]);
        let events = EventAccumulator::default();
        let ctx = RenderContext::new(&events);

        let open = by_id(&snapshot, "Observation.value[x]").type_links(&ctx).unwrap();
        assert_eq!(open.texts(), vec!["*"]);
        assert!(open.outer_links().all(|l| l.url.ends_with("datatypes.html#open")));

        let partial = by_id(&snapshot, "Observation.effective[x]")
            .type_links(&ctx)
            .unwrap();
        assert_eq!(partial.texts(), vec!["Quantity", "string"]);
    }

    #[test]
    fn slicing_sibling_requires_backup_slicing_sibling() {
        let snapshot = snapshot_tree(vec![
            json!({ "id": "Patient", "path": "Patient", "min": 0, "max": "*" }),
            json!({
                "id": "Patient.identifier",
                "path": "Patient.identifier",
                "min": 0,
                "max": "*",
                "type": [{ "code": "Identifier" }]
            }),
        ]);
        let events = EventAccumulator::default();
        let ctx = RenderContext::new(&events);
        let root = snapshot.root();
        let identifier = by_id(&snapshot, "Patient.identifier");
        let sliced = by_id(&snapshot_tree(sliced_identifiers()), "Patient.identifier")
            .element()
            .slicing
            .clone();

        let mut entry = identifier.element().clone();
        entry.slicing = sliced;
        let mut tree = Tree::new(
            differential(&snapshot, root.element().clone(), root.id(), &ctx),
            root.path().clone(),
        );
        let parent = tree.root();
        tree.add_child(
            parent,
            differential(&snapshot, entry, identifier.id(), &ctx),
            identifier.path().clone(),
        );
        let slice = tree.add_child(
            parent,
            differential(&snapshot, identifier.element().clone(), identifier.id(), &ctx),
            identifier.path().clone(),
        );
        let tree_data = FhirTreeData::new(tree, Some(Arc::clone(&snapshot))).unwrap();

        let err = tree_data.node(slice).slicing_sibling().unwrap_err();

        assert!(matches!(
            err,
            Error::SlicingSiblingMismatch { reason, .. } if reason.contains("no slicing sibling")
        ));
    }

    #[test]
    fn slicing_sibling_must_match_backup_slicing_sibling() {
        let snapshot = snapshot_tree(sliced_identifiers());
        let events = EventAccumulator::default();
        let ctx = RenderContext::new(&events);
        let root = snapshot.root();
        let entry = by_id(&snapshot, "Patient.identifier");
        let nhs = by_id(&snapshot, "Patient.identifier:NHS");
        let local = by_id(&snapshot, "Patient.identifier:Local");

        // the slicing entry is wrongly backed by the NHS slice
        let mut misplaced = nhs.element().clone();
        misplaced.slicing = entry.element().slicing.clone();
        let mut tree = Tree::new(
            differential(&snapshot, root.element().clone(), root.id(), &ctx),
            root.path().clone(),
        );
        let parent = tree.root();
        tree.add_child(
            parent,
            differential(&snapshot, misplaced, nhs.id(), &ctx),
            entry.path().clone(),
        );
        let slice = tree.add_child(
            parent,
            differential(&snapshot, local.element().clone(), local.id(), &ctx),
            local.path().clone(),
        );
        let tree_data = FhirTreeData::new(tree, Some(Arc::clone(&snapshot))).unwrap();

        let err = tree_data.node(slice).slicing_sibling().unwrap_err();

        assert!(matches!(
            err,
            Error::SlicingSiblingMismatch { reason, .. } if reason.contains("backup differs")
        ));
    }

    #[test]
    fn slicing_sibling_agrees_with_backup() {
        let snapshot = snapshot_tree(sliced_identifiers());
        let local = by_id(&snapshot, "Patient.identifier:Local");

        let sibling = local.slicing_sibling().unwrap().unwrap();

        assert_eq!(sibling, by_id(&snapshot, "Patient.identifier"));
        assert_eq!(local.node_key(), "Patient.identifier(Local)");
    }
}
