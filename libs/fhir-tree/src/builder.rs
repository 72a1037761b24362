//! Turns wrapped element definitions into version-independent node data.

use crate::context::RenderContext;
use crate::data::{ElementData, FhirElementDataType, SlicingInfo};
use crate::error::{Error, Result};
use crate::event::RendererEventType;
use crate::path::{NodePath, PathSegments};
use crate::validate::validate_constraints;
use crate::wrap::WrappedElementDefinition;

/// The few facts backup resolution needs about a differential element
#[derive(Debug, Clone)]
pub struct SkeletonData {
    pub(crate) source: Option<usize>,
    pub(crate) id: Option<String>,
    pub(crate) path: NodePath,
    pub(crate) slicing: Option<SlicingInfo>,
    pub(crate) slice_name: Option<String>,
    pub(crate) fixed_value: Option<String>,
    pub(crate) extension_urls: Vec<String>,
}

impl SkeletonData {
    /// Stand-in for a path the differential skips over
    pub fn gap(path: &NodePath) -> Self {
        Self {
            source: None,
            id: None,
            path: path.clone(),
            slicing: None,
            slice_name: None,
            fixed_value: None,
            extension_urls: Vec::new(),
        }
    }

    pub fn with_source(mut self, index: usize) -> Self {
        self.source = Some(index);
        self
    }

    /// Index of the differential element this was built from; `None` for gaps
    pub fn source(&self) -> Option<usize> {
        self.source
    }

    pub fn is_gap(&self) -> bool {
        self.source.is_none()
    }

    pub fn path(&self) -> &NodePath {
        &self.path
    }

    /// The declared slice name, else the one encoded in an id like `Patient.identifier:NHS`
    pub fn slice_name(&self) -> Option<&str> {
        if let Some(name) = self.slice_name.as_deref() {
            return Some(name);
        }
        let path = self.path.to_string();
        self.id
            .as_deref()?
            .strip_prefix(path.as_str())?
            .strip_prefix(':')
            .filter(|name| !name.is_empty())
    }

    pub fn fixed_value(&self) -> Option<&str> {
        self.fixed_value.as_deref()
    }

    pub fn slicing(&self) -> Option<&SlicingInfo> {
        self.slicing.as_ref()
    }

    pub fn extension_urls(&self) -> &[String] {
        &self.extension_urls
    }
}

pub struct FhirTreeNodeDataBuilder<'w, 'c, W: WrappedElementDefinition + ?Sized> {
    element: &'w W,
    ctx: &'w RenderContext<'c>,
}

impl<'w, 'c, W: WrappedElementDefinition + ?Sized> FhirTreeNodeDataBuilder<'w, 'c, W> {
    pub fn new(element: &'w W, ctx: &'w RenderContext<'c>) -> Self {
        Self { element, ctx }
    }

    /// Complete node data, as used for snapshot and differential nodes
    pub fn with_definition_details(&self) -> Result<ElementData> {
        let element = self.element;
        let path = element.path();

        let constraints = element.constraints();
        validate_constraints(&constraints, &path, self.ctx)?;

        let mut data = ElementData::new(path, element.version());
        data.id = element.id();
        data.name = element.name();
        data.slice_name = element.slice_name();
        data.information = element.short();
        data.min = element.min();
        data.max = element.max();
        data.data_type = data_type(element)?;
        data.flags = element.resource_flags();
        data.type_links = element.type_links(self.ctx)?;
        data.constraints = constraints;
        data.definition = element.definition();
        data.requirements = element.requirements();
        data.comments = element.comments();
        data.aliases = element.aliases();
        data.slicing = self.slicing()?;
        data.fixed_value = element.fixed_value();
        data.examples = element.examples();
        data.default_value = element.default_value();
        data.binding = element.binding();
        data.linked_node_name = element.linked_node_name();
        data.linked_node_id = element.linked_node_path()?;
        data.mappings = element.mappings();
        data.extension_type = element.extension_type(self.ctx)?;
        data.linked_structure_definition_url = element.linked_structure_definition_url();
        Ok(data)
    }

    /// Just enough to match the element against the snapshot
    pub fn with_skeleton_details(&self) -> Result<SkeletonData> {
        let element = self.element;
        Ok(SkeletonData {
            source: None,
            id: element.id(),
            path: element.path(),
            slicing: self.slicing()?,
            slice_name: element.slice_name(),
            fixed_value: element.fixed_value(),
            extension_urls: element.profile_urls("Extension"),
        })
    }

    fn slicing(&self) -> Result<Option<SlicingInfo>> {
        let slicing = self.element.slicing();
        if let Some(info) = &slicing {
            if info.discriminator_paths.is_empty() {
                self.ctx.event(
                    RendererEventType::SlicingWithoutDiscriminator,
                    format!("Slicing without discriminator at {}", self.element.path()),
                )?;
            }
        }
        Ok(slicing)
    }
}

/// Classifies an element by its declared types
pub fn data_type<W: WrappedElementDefinition + ?Sized>(element: &W) -> Result<FhirElementDataType> {
    let codes = element.type_codes();
    match codes.len() {
        0 => Ok(FhirElementDataType::Delegated),
        1 => Ok(codes
            .first()
            .map(|code| FhirElementDataType::from_type_code(code))
            .unwrap_or(FhirElementDataType::Delegated)),
        _ if element.path().path_name().ends_with("[x]") => Ok(FhirElementDataType::Choice),
        count => Err(Error::MultipleDataTypes {
            path: element.path().to_string(),
            count,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventAccumulator;
    use crate::wrap::WrappedElement;
    use ferrum_models::{ElementDefinition, FhirVersion};
    use serde_json::json;

    fn element(value: serde_json::Value) -> ElementDefinition {
        serde_json::from_value(value).unwrap()
    }

    fn classify(value: serde_json::Value) -> Result<FhirElementDataType> {
        let e = element(value);
        data_type(&WrappedElement::new(&e, FhirVersion::R4))
    }

    #[test]
    fn data_type_classification() {
        assert_eq!(
            classify(json!({"path": "Patient.link"})).unwrap(),
            FhirElementDataType::Delegated
        );
        assert_eq!(
            classify(json!({"path": "Patient.active", "type": [{"code": "boolean"}]})).unwrap(),
            FhirElementDataType::Primitive
        );
        assert_eq!(
            classify(json!({
                "path": "Observation.value[x]",
                "type": [{"code": "Quantity"}, {"code": "string"}]
            }))
            .unwrap(),
            FhirElementDataType::Choice
        );

        let err = classify(json!({
            "path": "Observation.value",
            "type": [{"code": "Quantity"}, {"code": "string"}]
        }))
        .unwrap_err();
        assert!(matches!(err, Error::MultipleDataTypes { count: 2, .. }));
    }

    #[test]
    fn full_details() {
        let events = EventAccumulator::recording_all();
        let ctx = RenderContext::new(&events);
        let e = element(json!({
            "id": "Patient.identifier",
            "path": "Patient.identifier",
            "short": "An identifier for this patient",
            "min": 0,
            "max": "*",
            "type": [{"code": "Identifier"}],
            "isSummary": true,
            "slicing": {"rules": "open"},
            "constraint": [{"key": "ele-1", "severity": "error", "human": "All FHIR elements must have a @value or children"}]
        }));
        let wrapped = WrappedElement::new(&e, FhirVersion::R4);
        let data = FhirTreeNodeDataBuilder::new(&wrapped, &ctx)
            .with_definition_details()
            .unwrap();

        assert_eq!(data.id(), Some("Patient.identifier"));
        assert_eq!(data.information(), Some("An identifier for this patient"));
        assert!(data.flags().summary);
        assert!(data.flags().constrained);
        assert_eq!(data.constraints()[0].key, "ele-1");
        assert_eq!(
            events.kinds(),
            vec![RendererEventType::SlicingWithoutDiscriminator]
        );
    }

    #[test]
    fn skeleton_details() {
        let events = EventAccumulator::default();
        let ctx = RenderContext::new(&events);
        let e = element(json!({
            "path": "Patient.extension",
            "sliceName": "ethnicity",
            "type": [{"code": "Extension", "profile": ["http://example.org/ethnicity"]}]
        }));
        let wrapped = WrappedElement::new(&e, FhirVersion::R4);
        let skeleton = FhirTreeNodeDataBuilder::new(&wrapped, &ctx)
            .with_skeleton_details()
            .unwrap()
            .with_source(3);

        assert_eq!(skeleton.slice_name(), Some("ethnicity"));
        assert_eq!(skeleton.extension_urls(), ["http://example.org/ethnicity".to_string()]);
        assert_eq!(skeleton.source(), Some(3));
        assert!(SkeletonData::gap(&NodePath::parse("Patient.contact")).is_gap());
    }

    #[test]
    fn skeleton_slice_name_falls_back_to_id() {
        let events = EventAccumulator::default();
        let ctx = RenderContext::new(&events);
        let skeleton = |value| {
            let e = element(value);
            let wrapped = WrappedElement::new(&e, FhirVersion::R4);
            FhirTreeNodeDataBuilder::new(&wrapped, &ctx)
                .with_skeleton_details()
                .unwrap()
        };

        let sliced = skeleton(json!({
            "id": "Patient.identifier:NHS",
            "path": "Patient.identifier"
        }));
        assert_eq!(sliced.slice_name(), Some("NHS"));

        let child = skeleton(json!({
            "id": "Patient.identifier:NHS.system",
            "path": "Patient.identifier.system"
        }));
        assert_eq!(child.slice_name(), None);

        let declared = skeleton(json!({
            "id": "Patient.identifier:NHS",
            "path": "Patient.identifier",
            "sliceName": "Local"
        }));
        assert_eq!(declared.slice_name(), Some("Local"));
    }

    #[test]
    fn constraints_without_text_are_rejected() {
        let events = EventAccumulator::default();
        let ctx = RenderContext::new(&events);
        let e = element(json!({
            "path": "Patient.name",
            "constraint": [{"key": "pat-1", "severity": "error"}]
        }));
        let wrapped = WrappedElement::new(&e, FhirVersion::R4);
        let err = FhirTreeNodeDataBuilder::new(&wrapped, &ctx)
            .with_definition_details()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidElement { .. }));
    }
}
