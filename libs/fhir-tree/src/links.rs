//! Type links: one outer link per declared type, optionally with nested profile links
//! (`Reference(Patient | Practitioner)`, `Extension(http://...)`).

use crate::error::{Error, Result};
use ferrum_models::FhirVersion;
use indexmap::IndexMap;
use phf::phf_set;
use serde::Serialize;

static PRIMITIVE_TYPES: phf::Set<&'static str> = phf_set! {
    "base64Binary", "boolean", "canonical", "code", "date", "dateTime", "decimal", "id",
    "instant", "integer", "integer64", "markdown", "oid", "positiveInt", "string", "time",
    "unsignedInt", "uri", "url", "uuid", "xhtml",
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct LinkData {
    pub url: String,
    pub text: String,
}

impl LinkData {
    pub fn new(url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            text: text.into(),
        }
    }

    /// Documentation link for a type code in the given FHIR release
    pub fn for_type_code(code: &str, version: FhirVersion) -> Self {
        let base = version.docs_base();
        let url = match code {
            "Extension" => format!("{}/extensibility.html#Extension", base),
            "Reference" => format!("{}/references.html#Reference", base),
            "Resource" | "DomainResource" => format!("{}/resource.html", base),
            c if PRIMITIVE_TYPES.contains(c) => format!("{}/datatypes.html#{}", base, c),
            c if is_datatype_name(c) => format!("{}/datatypes.html#{}", base, c),
            c => format!("{}/{}.html", base, c.to_ascii_lowercase()),
        };
        Self::new(url, code)
    }

    /// The generic Extension documentation page, which names no specific extension
    pub fn generic_extension(version: FhirVersion) -> Self {
        Self::new(
            format!("{}/extensibility.html#Extension", version.docs_base()),
            "Extension",
        )
    }

    pub fn open_type(version: FhirVersion) -> Self {
        Self::new(format!("{}/datatypes.html#open", version.docs_base()), "*")
    }

    pub fn is_generic_extension(&self) -> bool {
        self.url.ends_with("/extensibility.html#Extension")
    }
}

/// Type name suffixes of choice elements, e.g. `valueQuantity`
pub const CHOICE_SUFFIXES: [&str; 25] = [
    "Integer",
    "Decimal",
    "DateTime",
    "Date",
    "Instant",
    "String",
    "Uri",
    "Boolean",
    "Code",
    "Markdown",
    "Base64Binary",
    "Coding",
    "CodeableConcept",
    "Attachment",
    "Identifier",
    "Quantity",
    "Range",
    "Period",
    "Ratio",
    "HumanName",
    "Address",
    "ContactPoint",
    "Timing",
    "Signature",
    "Reference",
];

pub fn is_primitive_type(code: &str) -> bool {
    PRIMITIVE_TYPES.contains(code)
}

static DATATYPES: phf::Set<&'static str> = phf_set! {
    "Address", "Age", "Annotation", "Attachment", "BackboneElement", "CodeableConcept",
    "Coding", "ContactDetail", "ContactPoint", "Count", "Distance", "Duration", "Element",
    "HumanName", "Identifier", "Meta", "Money", "Narrative", "Period", "Quantity", "Range",
    "Ratio", "SampledData", "Signature", "SimpleQuantity", "Timing", "UsageContext",
};

pub fn is_datatype_name(code: &str) -> bool {
    DATATYPES.contains(code)
}

/// Ordered outer links, each with its (possibly empty) nested links
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkDatas {
    links: IndexMap<LinkData, Vec<LinkData>>,
}

impl LinkDatas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(link: LinkData) -> Self {
        let mut links = Self::new();
        links.links.insert(link, Vec::new());
        links
    }

    pub fn add_simple_link(&mut self, link: LinkData) -> Result<()> {
        if self.links.contains_key(&link) {
            return Err(Error::Inconsistent(format!(
                "type link {} added twice",
                link.text
            )));
        }
        self.links.insert(link, Vec::new());
        Ok(())
    }

    /// Adds `nested` under `outer`, creating `outer` on first use
    pub fn add_nested_link(&mut self, outer: LinkData, nested: LinkData) {
        let nested_links = self.links.entry(outer).or_default();
        if !nested_links.contains(&nested) {
            nested_links.push(nested);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LinkData, &[LinkData])> {
        self.links.iter().map(|(outer, nested)| (outer, nested.as_slice()))
    }

    pub fn outer_links(&self) -> impl Iterator<Item = &LinkData> {
        self.links.keys()
    }

    pub fn nested_links(&self, outer_text: &str) -> Vec<&LinkData> {
        self.links
            .iter()
            .filter(|(outer, _)| outer.text == outer_text)
            .flat_map(|(_, nested)| nested.iter())
            .collect()
    }

    /// Display form, e.g. `Reference(Patient | Organization)`
    pub fn texts(&self) -> Vec<String> {
        self.iter()
            .map(|(outer, nested)| {
                if nested.is_empty() {
                    outer.text.clone()
                } else {
                    let inner: Vec<&str> = nested.iter().map(|l| l.text.as_str()).collect();
                    format!("{}({})", outer.text, inner.join(" | "))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_code_links_follow_release() {
        let link = LinkData::for_type_code("dateTime", FhirVersion::Stu3);
        assert_eq!(link.url, "http://hl7.org/fhir/STU3/datatypes.html#dateTime");

        let link = LinkData::for_type_code("Patient", FhirVersion::R4);
        assert_eq!(link.url, "http://hl7.org/fhir/R4/patient.html");
        assert!(LinkData::for_type_code("Extension", FhirVersion::Dstu2).is_generic_extension());
    }

    #[test]
    fn nested_links_group_under_outer() {
        let mut links = LinkDatas::new();
        let reference = LinkData::for_type_code("Reference", FhirVersion::Stu3);
        links.add_nested_link(reference.clone(), LinkData::new("http://p", "Patient"));
        links.add_nested_link(reference, LinkData::new("http://o", "Organization"));
        links
            .add_simple_link(LinkData::for_type_code("string", FhirVersion::Stu3))
            .unwrap();

        assert_eq!(
            links.texts(),
            vec!["Reference(Patient | Organization)".to_string(), "string".to_string()]
        );
        assert_eq!(links.nested_links("Reference").len(), 2);
        assert!(links
            .add_simple_link(LinkData::for_type_code("string", FhirVersion::Stu3))
            .is_err());
    }
}
