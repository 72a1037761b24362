//! Version-independent facts about one element, as shown in a rendered tree.
//!
//! [`SnapshotData`] is complete on its own. [`DifferentialData`] only carries what a
//! profile overrides and answers everything else from its backup snapshot node.

use crate::context::RenderContext;
use crate::error::{Error, Result};
use crate::event::RendererEventType;
use crate::links::{is_primitive_type, LinkDatas};
use crate::path::{NodePath, PathSegments};
use crate::tree::NodeId;
use ferrum_models::FhirVersion;
use indexmap::IndexSet;
use serde::Serialize;
use std::ops::Deref;
use std::sync::Arc;

/// Shown when neither a binding nor its backup says anything about the value set
pub const BINDING_STAND_IN_DESCRIPTION: &str = "No description or value set provided";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum FhirElementDataType {
    Primitive,
    Complex,
    Resource,
    Reference,
    Extension,
    Xhtml,
    /// Several types on a `[x]` element
    Choice,
    /// No declared type; answered by a linked or backup node
    Delegated,
}

impl FhirElementDataType {
    pub fn from_type_code(code: &str) -> Self {
        match code {
            "xhtml" => FhirElementDataType::Xhtml,
            "Extension" => FhirElementDataType::Extension,
            "Reference" => FhirElementDataType::Reference,
            "Resource" | "DomainResource" => FhirElementDataType::Resource,
            c if is_primitive_type(c) => FhirElementDataType::Primitive,
            c if crate::links::is_datatype_name(c) => FhirElementDataType::Complex,
            c if c.starts_with(|ch: char| ch.is_ascii_uppercase()) => {
                FhirElementDataType::Resource
            }
            _ => FhirElementDataType::Complex,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResourceFlags {
    pub summary: bool,
    pub modifier: bool,
    pub constrained: bool,
    pub must_support: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExtensionType {
    Simple,
    Complex,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConstraintInfo {
    pub key: String,
    pub description: String,
    pub severity: Option<String>,
    pub requirements: Option<String>,
    pub expression: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementMapping {
    pub identity: String,
    pub map: String,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SlicingInfo {
    pub description: Option<String>,
    pub discriminator_paths: IndexSet<String>,
    pub ordered: Option<bool>,
    pub rules: Option<String>,
}

impl SlicingInfo {
    /// One-line summary, e.g. `Discriminators: system; Ordered; closed`
    pub fn summary(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(description) = &self.description {
            parts.push(description.clone());
        }
        if !self.discriminator_paths.is_empty() {
            let paths: Vec<&str> = self.discriminator_paths.iter().map(String::as_str).collect();
            parts.push(format!("Discriminators: {}", paths.join(", ")));
        }
        if self.ordered == Some(true) {
            parts.push("Ordered".to_string());
        }
        if let Some(rules) = &self.rules {
            parts.push(rules.clone());
        }
        (!parts.is_empty()).then(|| parts.join("; "))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BindingInfo {
    pub description: Option<String>,
    pub url: Option<String>,
    pub strength: Option<String>,
}

impl BindingInfo {
    /// Fills fields the differential binding omits from the backup binding
    pub fn resolve_with_backup(
        binding: &BindingInfo,
        backup: &BindingInfo,
        ctx: &RenderContext<'_>,
    ) -> Result<BindingInfo> {
        let mut description = binding
            .description
            .clone()
            .or_else(|| backup.description.clone());
        let url = binding.url.clone().or_else(|| backup.url.clone());
        let strength = binding.strength.clone().or_else(|| backup.strength.clone());

        if description.is_none() && url.is_none() {
            ctx.event(
                RendererEventType::BindingWithoutDescOrUrl,
                "Description or URL must be present",
            )?;
            description = Some(BINDING_STAND_IN_DESCRIPTION.to_string());
        }

        Ok(BindingInfo {
            description,
            url,
            strength,
        })
    }
}

/// Everything extracted from one element definition
#[derive(Debug, Clone)]
pub struct ElementData {
    pub(crate) path: NodePath,
    pub(crate) version: FhirVersion,
    pub(crate) id: Option<String>,
    pub(crate) name: Option<String>,
    pub(crate) slice_name: Option<String>,
    pub(crate) information: Option<String>,
    pub(crate) min: Option<u32>,
    pub(crate) max: Option<String>,
    pub(crate) data_type: FhirElementDataType,
    pub(crate) flags: ResourceFlags,
    pub(crate) type_links: LinkDatas,
    pub(crate) constraints: Vec<ConstraintInfo>,
    pub(crate) definition: Option<String>,
    pub(crate) requirements: Option<String>,
    pub(crate) comments: Option<String>,
    pub(crate) aliases: Vec<String>,
    pub(crate) slicing: Option<SlicingInfo>,
    pub(crate) fixed_value: Option<String>,
    pub(crate) examples: Vec<String>,
    pub(crate) default_value: Option<String>,
    pub(crate) binding: Option<BindingInfo>,
    pub(crate) linked_node_name: Option<String>,
    pub(crate) linked_node_id: Option<String>,
    pub(crate) mappings: Vec<ElementMapping>,
    pub(crate) extension_type: Option<ExtensionType>,
    pub(crate) linked_structure_definition_url: Option<String>,
}

impl ElementData {
    /// An element with only a path; used for placeholders
    pub fn new(path: NodePath, version: FhirVersion) -> Self {
        Self {
            path,
            version,
            id: None,
            name: None,
            slice_name: None,
            information: None,
            min: None,
            max: None,
            data_type: FhirElementDataType::Delegated,
            flags: ResourceFlags::default(),
            type_links: LinkDatas::new(),
            constraints: Vec::new(),
            definition: None,
            requirements: None,
            comments: None,
            aliases: Vec::new(),
            slicing: None,
            fixed_value: None,
            examples: Vec::new(),
            default_value: None,
            binding: None,
            linked_node_name: None,
            linked_node_id: None,
            mappings: Vec::new(),
            extension_type: None,
            linked_structure_definition_url: None,
        }
    }

    pub fn path(&self) -> &NodePath {
        &self.path
    }

    pub fn path_name(&self) -> &str {
        self.path.path_name()
    }

    pub fn version(&self) -> FhirVersion {
        self.version
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn slice_name(&self) -> Option<&str> {
        self.slice_name.as_deref()
    }

    pub fn information(&self) -> Option<&str> {
        self.information.as_deref()
    }

    pub fn flags(&self) -> ResourceFlags {
        self.flags
    }

    pub fn constraints(&self) -> &[ConstraintInfo] {
        &self.constraints
    }

    pub fn requirements(&self) -> Option<&str> {
        self.requirements.as_deref()
    }

    pub fn comments(&self) -> Option<&str> {
        self.comments.as_deref()
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn fixed_value(&self) -> Option<&str> {
        self.fixed_value.as_deref()
    }

    pub fn examples(&self) -> &[String] {
        &self.examples
    }

    pub fn default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }

    pub fn linked_node_name(&self) -> Option<&str> {
        self.linked_node_name.as_deref()
    }

    pub fn linked_node_id(&self) -> Option<&str> {
        self.linked_node_id.as_deref()
    }

    pub fn has_linked_node(&self) -> bool {
        self.linked_node_name.is_some() || self.linked_node_id.is_some()
    }

    pub fn mappings(&self) -> &[ElementMapping] {
        &self.mappings
    }

    pub fn extension_type(&self) -> Option<ExtensionType> {
        self.extension_type
    }

    pub fn linked_structure_definition_url(&self) -> Option<&str> {
        self.linked_structure_definition_url.as_deref()
    }

    /// Type links exactly as declared, without any fallback
    pub fn declared_type_links(&self) -> &LinkDatas {
        &self.type_links
    }

    /// `pathName (sliceName)`, or whichever of the two exists
    pub fn display_name(&self) -> Result<String> {
        let path_name = self.path_name();
        match self.slice_name.as_deref().filter(|s| !s.is_empty()) {
            Some(slice) if !path_name.is_empty() && slice != path_name => {
                Ok(format!("{} ({})", path_name, slice))
            }
            _ if !path_name.is_empty() => Ok(path_name.to_string()),
            Some(slice) => Ok(slice.to_string()),
            None => Err(Error::Inconsistent("No name or path information".into())),
        }
    }

    /// Path names ending `[x]` denote choice elements
    pub fn is_choice(&self) -> bool {
        self.path_name().ends_with("[x]")
    }
}

/// Snapshot element data, shared with every differential node that falls back to it
#[derive(Debug, Clone)]
pub struct SnapshotData(Arc<ElementData>);

impl SnapshotData {
    pub fn new(element: ElementData) -> Self {
        Self(Arc::new(element))
    }
}

impl Deref for SnapshotData {
    type Target = ElementData;

    fn deref(&self) -> &ElementData {
        &self.0
    }
}

/// The matched snapshot node of a differential node
#[derive(Debug, Clone)]
pub struct BackupNode {
    pub id: NodeId,
    pub data: SnapshotData,
}

#[derive(Debug, Clone)]
pub struct DifferentialData {
    element: ElementData,
    backup: BackupNode,
    placeholder: bool,
}

impl DifferentialData {
    /// Pairs a differential element with its backup, checking the element ids agree
    pub fn new(element: ElementData, backup: BackupNode, ctx: &RenderContext<'_>) -> Result<Self> {
        match (element.id.as_deref(), backup.data.id.as_deref()) {
            (own, theirs) if own == theirs => {}
            (None, _) => ctx.event(
                RendererEventType::DifferentialNodeMissingId,
                format!("Differential node {} has no id", element.path),
            )?,
            (Some(own), Some(theirs)) if theirs.contains("[x]") => ctx.event(
                RendererEventType::DifferentialChoiceNodeWrongId,
                format!(
                    "Differential choice node {} id ({}) doesn't match backup node id ({})",
                    element.path, own, theirs
                ),
            )?,
            (Some(own), theirs) => {
                return Err(Error::IdMismatch {
                    path: element.path.to_string(),
                    id: own.to_string(),
                    backup_id: theirs.unwrap_or("<none>").to_string(),
                })
            }
        }

        Ok(Self {
            element,
            backup,
            placeholder: false,
        })
    }

    /// Stand-in for an ancestor the differential skipped over
    pub fn placeholder(path: NodePath, backup: BackupNode) -> Self {
        let version = backup.data.version;
        Self {
            element: ElementData::new(path, version),
            backup,
            placeholder: true,
        }
    }

    pub fn element(&self) -> &ElementData {
        &self.element
    }

    pub fn backup(&self) -> &BackupNode {
        &self.backup
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    pub fn use_backup_cardinality(&self) -> bool {
        self.element.min.is_none() && self.element.max.is_none()
    }

    pub fn min(&self) -> Option<u32> {
        self.element.min.or(self.backup.data.min)
    }

    pub fn max(&self) -> Option<&str> {
        self.element
            .max
            .as_deref()
            .or(self.backup.data.max.as_deref())
    }

    pub fn data_type(&self) -> FhirElementDataType {
        match self.element.data_type {
            FhirElementDataType::Delegated => self.backup.data.data_type,
            own => own,
        }
    }

    pub fn definition(&self) -> Option<&str> {
        self.element
            .definition
            .as_deref()
            .or(self.backup.data.definition.as_deref())
    }

    pub fn binding(&self, ctx: &RenderContext<'_>) -> Result<Option<BindingInfo>> {
        match (&self.element.binding, &self.backup.data.binding) {
            (Some(own), Some(backup)) => {
                BindingInfo::resolve_with_backup(own, backup, ctx).map(Some)
            }
            (Some(own), None) => Ok(Some(own.clone())),
            (None, backup) => Ok(backup.clone()),
        }
    }

    pub fn slicing_info(&self) -> Option<&SlicingInfo> {
        self.element
            .slicing
            .as_ref()
            .or(self.backup.data.slicing.as_ref())
    }
}

/// Node payload of a rendered tree
#[derive(Debug, Clone)]
pub enum FhirNodeData {
    Snapshot(SnapshotData),
    Differential(DifferentialData),
}

impl FhirNodeData {
    /// The node's own element facts, without fallback
    pub fn element(&self) -> &ElementData {
        match self {
            FhirNodeData::Snapshot(data) => &**data,
            FhirNodeData::Differential(data) => &data.element,
        }
    }

    pub fn as_differential(&self) -> Option<&DifferentialData> {
        match self {
            FhirNodeData::Differential(data) => Some(data),
            FhirNodeData::Snapshot(_) => None,
        }
    }

    pub fn as_snapshot(&self) -> Option<&SnapshotData> {
        match self {
            FhirNodeData::Snapshot(data) => Some(data),
            FhirNodeData::Differential(_) => None,
        }
    }

    pub fn backup(&self) -> Option<&BackupNode> {
        self.as_differential().map(DifferentialData::backup)
    }

    /// The element, else the backup element, for fields without dedicated merge rules
    fn fallback<'a, T: ?Sized>(
        &'a self,
        field: impl Fn(&'a ElementData) -> Option<&'a T>,
    ) -> Option<&'a T> {
        match self {
            FhirNodeData::Snapshot(data) => field(&**data),
            FhirNodeData::Differential(data) => {
                field(&data.element).or_else(|| field(&*data.backup.data))
            }
        }
    }

    pub fn slice_name(&self) -> Option<&str> {
        self.fallback(ElementData::slice_name)
    }

    pub fn name(&self) -> Option<&str> {
        self.fallback(ElementData::name)
    }

    pub fn fixed_value(&self) -> Option<&str> {
        self.fallback(ElementData::fixed_value)
    }

    /// Declared type links; a differential without its own uses the backup's
    pub fn declared_type_links(&self) -> &LinkDatas {
        match self {
            FhirNodeData::Differential(data) if data.element.type_links.is_empty() => {
                &data.backup.data.type_links
            }
            other => &other.element().type_links,
        }
    }

    pub fn min(&self) -> Option<u32> {
        match self {
            FhirNodeData::Snapshot(data) => data.min,
            FhirNodeData::Differential(data) => data.min(),
        }
    }

    pub fn max(&self) -> Option<&str> {
        match self {
            FhirNodeData::Snapshot(data) => data.max.as_deref(),
            FhirNodeData::Differential(data) => data.max(),
        }
    }

    /// `max` is the literal `0`
    pub fn is_removed(&self) -> bool {
        self.max() == Some("0")
    }

    /// `min..max`, with `?` for an unknown bound
    pub fn cardinality(&self) -> String {
        let min = self.min().map(|m| m.to_string());
        format!(
            "{}..{}",
            min.as_deref().unwrap_or("?"),
            self.max().unwrap_or("?")
        )
    }

    pub fn use_backup_cardinality(&self) -> bool {
        self.as_differential()
            .is_some_and(DifferentialData::use_backup_cardinality)
    }

    pub fn data_type(&self) -> FhirElementDataType {
        match self {
            FhirNodeData::Snapshot(data) => data.data_type,
            FhirNodeData::Differential(data) => data.data_type(),
        }
    }

    pub fn definition(&self) -> Option<&str> {
        match self {
            FhirNodeData::Snapshot(data) => data.definition.as_deref(),
            FhirNodeData::Differential(data) => data.definition(),
        }
    }

    pub fn binding(&self, ctx: &RenderContext<'_>) -> Result<Option<BindingInfo>> {
        match self {
            FhirNodeData::Snapshot(data) => Ok(data.binding.clone()),
            FhirNodeData::Differential(data) => data.binding(ctx),
        }
    }

    pub fn slicing_info(&self) -> Option<&SlicingInfo> {
        match self {
            FhirNodeData::Snapshot(data) => data.slicing.as_ref(),
            FhirNodeData::Differential(data) => data.slicing_info(),
        }
    }

    pub fn has_slicing_info(&self) -> bool {
        self.slicing_info().is_some()
    }

    pub fn display_name(&self) -> Result<String> {
        self.element().display_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventAccumulator;

    fn element(path: &str) -> ElementData {
        ElementData::new(NodePath::parse(path), FhirVersion::Stu3)
    }

    fn backup(element: ElementData) -> BackupNode {
        BackupNode {
            id: crate::tree::Tree::new((), element.path.clone()).root(),
            data: SnapshotData::new(element),
        }
    }

    #[test]
    fn display_name_combines_path_and_slice() {
        let mut data = element("Patient.identifier");
        assert_eq!(data.display_name().unwrap(), "identifier");

        data.slice_name = Some("NHS".into());
        assert_eq!(data.display_name().unwrap(), "identifier (NHS)");

        data.slice_name = Some("identifier".into());
        assert_eq!(data.display_name().unwrap(), "identifier");

        assert!(ElementData::new(NodePath::default(), FhirVersion::R4)
            .display_name()
            .is_err());
    }

    #[test]
    fn cardinality_falls_back_until_set() {
        let events = EventAccumulator::default();
        let ctx = RenderContext::new(&events);
        let mut snapshot = element("Patient.name");
        snapshot.min = Some(0);
        snapshot.max = Some("*".into());
        let backup = backup(snapshot);

        let diff = DifferentialData::new(element("Patient.name"), backup.clone(), &ctx).unwrap();
        assert!(diff.use_backup_cardinality());
        assert_eq!((diff.min(), diff.max()), (Some(0), Some("*")));

        let mut own = element("Patient.name");
        own.min = Some(1);
        own.max = Some("1".into());
        let diff = DifferentialData::new(own, backup, &ctx).unwrap();
        assert!(!diff.use_backup_cardinality());
        assert_eq!((diff.min(), diff.max()), (Some(1), Some("1")));
    }

    #[test]
    fn delegated_type_and_definition_use_backup() {
        let events = EventAccumulator::default();
        let ctx = RenderContext::new(&events);
        let mut snapshot = element("Patient.gender");
        snapshot.data_type = FhirElementDataType::Primitive;
        snapshot.definition = Some("Administrative gender".into());

        let diff =
            DifferentialData::new(element("Patient.gender"), backup(snapshot), &ctx).unwrap();
        assert_eq!(diff.data_type(), FhirElementDataType::Primitive);
        assert_eq!(diff.definition(), Some("Administrative gender"));
    }

    #[test]
    fn id_check_tolerates_known_quirks_only() {
        let events = EventAccumulator::default();
        let ctx = RenderContext::new(&events);

        let mut snapshot = element("Observation.value[x]");
        snapshot.id = Some("Observation.value[x]".into());
        let mut own = element("Observation.value[x]");
        own.id = Some("Observation.valueQuantity".into());
        DifferentialData::new(own, backup(snapshot.clone()), &ctx).unwrap();

        DifferentialData::new(element("Observation.value[x]"), backup(snapshot), &ctx).unwrap();
        assert_eq!(
            events.kinds(),
            vec![
                RendererEventType::DifferentialChoiceNodeWrongId,
                RendererEventType::DifferentialNodeMissingId
            ]
        );

        let mut snapshot = element("Patient.name");
        snapshot.id = Some("Patient.name".into());
        let mut own = element("Patient.name");
        own.id = Some("Patient.name:official".into());
        let err = DifferentialData::new(own, backup(snapshot), &ctx).unwrap_err();
        assert!(matches!(err, Error::IdMismatch { .. }));
    }

    #[test]
    fn binding_merge_fills_gaps_and_stands_in() {
        let events = EventAccumulator::recording_all();
        let ctx = RenderContext::new(&events);

        let own = BindingInfo {
            strength: Some("required".into()),
            ..Default::default()
        };
        let backup = BindingInfo {
            url: Some("http://hl7.org/fhir/ValueSet/administrative-gender".into()),
            strength: Some("preferred".into()),
            ..Default::default()
        };
        let merged = BindingInfo::resolve_with_backup(&own, &backup, &ctx).unwrap();
        assert_eq!(merged.strength.as_deref(), Some("required"));
        assert_eq!(merged.url, backup.url);
        assert!(events.events().is_empty());

        let merged =
            BindingInfo::resolve_with_backup(&own, &BindingInfo::default(), &ctx).unwrap();
        assert_eq!(merged.description.as_deref(), Some(BINDING_STAND_IN_DESCRIPTION));
        assert_eq!(events.kinds(), vec![RendererEventType::BindingWithoutDescOrUrl]);
    }

    #[test]
    fn slicing_summary() {
        let mut slicing = SlicingInfo {
            ordered: Some(true),
            rules: Some("closed".into()),
            ..Default::default()
        };
        slicing.discriminator_paths.insert("system".into());
        assert_eq!(
            slicing.summary().as_deref(),
            Some("Discriminators: system; Ordered; closed")
        );
        assert_eq!(SlicingInfo::default().summary(), None);
    }

    #[test]
    fn classifies_type_codes() {
        assert_eq!(
            FhirElementDataType::from_type_code("dateTime"),
            FhirElementDataType::Primitive
        );
        assert_eq!(
            FhirElementDataType::from_type_code("CodeableConcept"),
            FhirElementDataType::Complex
        );
        assert_eq!(
            FhirElementDataType::from_type_code("Patient"),
            FhirElementDataType::Resource
        );
        assert_eq!(
            FhirElementDataType::from_type_code("Reference"),
            FhirElementDataType::Reference
        );
    }
}
