//! FHIR ElementDefinition model
//!
//! Version-tolerant model for ElementDefinition as it appears in StructureDefinition
//! snapshots and differentials. DSTU2, STU3 and R4 shapes deserialize into the same
//! struct; choice-typed properties (`fixed[x]`, `pattern[x]`, `defaultValue[x]`, DSTU2
//! `example[x]`) are kept in `extensions` and exposed through accessors.

use super::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// FHIR ElementDefinition - defines an element in a resource or data type structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementDefinition {
    /// Unique id for inter-element referencing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Path of the element in the hierarchy (e.g., "Patient.name")
    pub path: String,

    /// DSTU2: element name, doubling as slice name and `nameReference` target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// STU3+: name for element to display with or prompt for element
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// STU3+: name for this particular element (in a slice)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slice_name: Option<String>,

    /// Short label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short: Option<String>,

    /// Full formal definition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,

    /// Comments about the use of this element (`comments` in DSTU2)
    #[serde(alias = "comments", skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Why this element has been created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<String>,

    /// Other names
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<Vec<String>>,

    /// Minimum cardinality
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,

    /// Maximum cardinality (can be "*")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<String>,

    /// STU3+: reference to definition of content for the element (`#id` or `url#id`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_reference: Option<String>,

    /// DSTU2: name of another element whose content is reused
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_reference: Option<String>,

    /// Data type and profile for this element
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<ElementDefinitionType>>,

    /// STU3+: example values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Vec<ElementDefinitionExample>>,

    /// Reference to invariant about presence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Vec<String>>,

    /// Condition that must evaluate to true
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint: Option<Vec<ElementDefinitionConstraint>>,

    /// If this modifies the meaning of other elements
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_modifier: Option<bool>,

    /// Include when in summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_summary: Option<bool>,

    /// ValueSet details if this is coded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding: Option<ElementDefinitionBinding>,

    /// Map element to another set of definitions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping: Option<Vec<ElementDefinitionMapping>>,

    /// This element is sliced - slices follow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slicing: Option<ElementDefinitionSlicing>,

    /// If this element must be supported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub must_support: Option<bool>,

    /// Additional content beyond core fields, including choice-typed values
    #[serde(flatten)]
    pub extensions: BTreeMap<String, Value>,
}

/// Data type for an element
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementDefinitionType {
    /// Data type code (absent on some STU3 root elements)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Profiles that apply; a single string in STU3, a list in DSTU2 and R4
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub profile: Vec<String>,

    /// Target profiles for Reference types; a single string in STU3
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub target_profile: Vec<String>,

    /// Aggregation modes for references (contained | referenced | bundled)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<Vec<String>>,

    /// Versioning rule for references (either | independent | specific)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub versioning: Option<String>,
}

/// Example value for an element (STU3+ shape)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementDefinitionExample {
    /// Describes the purpose of this example
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// `value[x]`
    #[serde(flatten)]
    pub value: BTreeMap<String, Value>,
}

/// Constraint on an element
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ElementDefinitionConstraint {
    /// Target of 'condition' reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Why this constraint is necessary or appropriate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<String>,

    /// Severity (error | warning)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,

    /// Human description of constraint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human: Option<String>,

    /// FHIRPath expression of constraint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,

    /// XPath expression of constraint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
}

/// ValueSet binding for a coded element
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementDefinitionBinding {
    /// Binding strength (required | extensible | preferred | example)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<String>,

    /// Human explanation of the value set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// R4: canonical of the value set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_set: Option<String>,

    /// DSTU2/STU3: value set as a plain URI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_set_uri: Option<String>,

    /// DSTU2/STU3: value set as a Reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_set_reference: Option<ResourceReference>,
}

/// Minimal Reference datatype
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceReference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// Mapping to another standard
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ElementDefinitionMapping {
    /// Reference to mapping declaration
    pub identity: String,

    /// Computable language of mapping
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Details of the mapping
    pub map: String,

    /// Comments about the mapping
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Slicing information for an element
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ElementDefinitionSlicing {
    /// Element values that are used to distinguish slices
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<Vec<ElementDefinitionDiscriminator>>,

    /// Text description of how slicing works
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// If elements must be in same order as slices
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordered: Option<bool>,

    /// Slicing rules (closed | open | openAtEnd)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<SlicingRules>,
}

/// Discriminator for slicing. DSTU2 declares bare paths, STU3+ typed entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ElementDefinitionDiscriminator {
    Path(String),
    Typed {
        #[serde(rename = "type")]
        discriminator_type: DiscriminatorType,
        path: String,
    },
}

impl ElementDefinitionDiscriminator {
    pub fn path(&self) -> &str {
        match self {
            ElementDefinitionDiscriminator::Path(path) => path,
            ElementDefinitionDiscriminator::Typed { path, .. } => path,
        }
    }
}

/// Type of slicing discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscriminatorType {
    Value,
    Exists,
    Pattern,
    Type,
    Profile,
}

/// Slicing rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SlicingRules {
    Closed,
    Open,
    OpenAtEnd,
}

impl SlicingRules {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlicingRules::Closed => "closed",
            SlicingRules::Open => "open",
            SlicingRules::OpenAtEnd => "openAtEnd",
        }
    }
}

/// Snapshot - a set of elements that define the structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub element: Vec<ElementDefinition>,
}

/// Differential - a set of elements that define changes from the base
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Differential {
    pub element: Vec<ElementDefinition>,
}

impl Snapshot {
    /// Parse from JSON Value
    pub fn from_value(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone()).map_err(Error::from)
    }
}

impl Differential {
    /// Parse from JSON Value
    pub fn from_value(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone()).map_err(Error::from)
    }
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
    })
}

/// A choice-typed property value, e.g. `fixedUri` -> (`Uri`, value)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChoiceValue<'a> {
    pub type_suffix: &'a str,
    pub value: &'a Value,
}

impl<'a> ChoiceValue<'a> {
    /// Render primitive values as plain text and complex values as compact JSON
    pub fn to_display_string(&self) -> String {
        match self.value {
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            other => other.to_string(),
        }
    }
}

impl ElementDefinition {
    /// Create an element with only a path set
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Get the key for this element (path:sliceName for slices, just path otherwise)
    pub fn key(&self) -> String {
        if let Some(ref slice_name) = self.slice_name {
            format!("{}:{}", self.path, slice_name)
        } else {
            self.path.clone()
        }
    }

    /// Check if this is a choice type element (ends with [x])
    pub fn is_choice_type(&self) -> bool {
        self.path.ends_with("[x]")
    }

    /// Get type codes for this element
    pub fn type_codes(&self) -> Vec<&str> {
        self.types
            .iter()
            .flatten()
            .filter_map(|t| t.code.as_deref())
            .collect()
    }

    /// Get the cardinality as a string (e.g., "0..1", "1..*")
    pub fn cardinality_string(&self) -> String {
        let min = self.min.unwrap_or(0);
        let max = self.max.as_deref().unwrap_or("*");
        format!("{}..{}", min, max)
    }

    /// First choice-typed property starting with `prefix` (e.g. "fixed")
    pub fn choice_value(&self, prefix: &str) -> Option<ChoiceValue<'_>> {
        self.extensions.iter().find_map(|(key, value)| {
            let suffix = key.strip_prefix(prefix)?;
            suffix
                .starts_with(|c: char| c.is_ascii_uppercase())
                .then_some(ChoiceValue {
                    type_suffix: suffix,
                    value,
                })
        })
    }

    /// `fixed[x]`, falling back to `pattern[x]`
    pub fn fixed_value(&self) -> Option<ChoiceValue<'_>> {
        self.choice_value("fixed")
            .or_else(|| self.choice_value("pattern"))
    }

    pub fn default_value(&self) -> Option<ChoiceValue<'_>> {
        self.choice_value("defaultValue")
    }

    /// Example values in either the STU3+ list form or the DSTU2 `example[x]` form
    pub fn example_values(&self) -> Vec<ChoiceValue<'_>> {
        if let Some(examples) = &self.example {
            return examples
                .iter()
                .flat_map(|example| {
                    example.value.iter().filter_map(|(key, value)| {
                        key.strip_prefix("value").map(|suffix| ChoiceValue {
                            type_suffix: suffix,
                            value,
                        })
                    })
                })
                .collect();
        }
        self.choice_value("example").into_iter().collect()
    }
}

impl ElementDefinitionBinding {
    /// The bound value set, whichever property carries it
    pub fn value_set_url(&self) -> Option<&str> {
        self.value_set
            .as_deref()
            .or(self.value_set_uri.as_deref())
            .or_else(|| {
                self.value_set_reference
                    .as_ref()
                    .and_then(|r| r.reference.as_deref())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_element_key() {
        let mut elem = ElementDefinition::with_path("Patient.name");
        elem.slice_name = Some("official".to_string());

        assert_eq!(elem.key(), "Patient.name:official");
    }

    #[test]
    fn test_is_choice_type() {
        let mut elem = ElementDefinition::with_path("Observation.value[x]");
        assert!(elem.is_choice_type());

        elem.path = "Observation.value".to_string();
        assert!(!elem.is_choice_type());
    }

    #[test]
    fn test_cardinality_string() {
        let mut elem = ElementDefinition::with_path("Patient.name");
        elem.min = Some(1);
        elem.max = Some("*".to_string());

        assert_eq!(elem.cardinality_string(), "1..*");
    }

    #[test]
    fn fixed_value_prefers_fixed_over_pattern() {
        let elem: ElementDefinition = serde_json::from_value(json!({
            "path": "Patient.identifier.system",
            "fixedUri": "https://fhir.nhs.uk/Id/nhs-number",
            "patternUri": "http://example.org/other"
        }))
        .unwrap();

        let fixed = elem.fixed_value().unwrap();
        assert_eq!(fixed.type_suffix, "Uri");
        assert_eq!(fixed.to_display_string(), "https://fhir.nhs.uk/Id/nhs-number");
    }

    #[test]
    fn accepts_single_and_repeated_profiles() {
        let stu3: ElementDefinitionType = serde_json::from_value(json!({
            "code": "Extension",
            "profile": "http://example.org/StructureDefinition/ext"
        }))
        .unwrap();
        let r4: ElementDefinitionType = serde_json::from_value(json!({
            "code": "Reference",
            "targetProfile": ["http://a", "http://b"]
        }))
        .unwrap();

        assert_eq!(stu3.profile, vec!["http://example.org/StructureDefinition/ext"]);
        assert_eq!(r4.target_profile.len(), 2);
        assert!(r4.profile.is_empty());
    }

    #[test]
    fn parses_dstu2_and_stu3_discriminators() {
        let slicing: ElementDefinitionSlicing = serde_json::from_value(json!({
            "discriminator": ["system", {"type": "value", "path": "code"}],
            "rules": "openAtEnd"
        }))
        .unwrap();

        let paths: Vec<&str> = slicing
            .discriminator
            .iter()
            .flatten()
            .map(|d| d.path())
            .collect();
        assert_eq!(paths, vec!["system", "code"]);
        assert_eq!(slicing.rules, Some(SlicingRules::OpenAtEnd));
    }

    #[test]
    fn reads_examples_in_both_shapes() {
        let stu3: ElementDefinition = serde_json::from_value(json!({
            "path": "Patient.gender",
            "example": [{"label": "General", "valueCode": "female"}]
        }))
        .unwrap();
        let dstu2: ElementDefinition = serde_json::from_value(json!({
            "path": "Patient.gender",
            "exampleCode": "male"
        }))
        .unwrap();

        assert_eq!(stu3.example_values()[0].to_display_string(), "female");
        assert_eq!(dstu2.example_values()[0].to_display_string(), "male");
    }

    #[test]
    fn binding_value_set_from_any_shape() {
        let binding: ElementDefinitionBinding = serde_json::from_value(json!({
            "strength": "required",
            "valueSetReference": {"reference": "http://hl7.org/fhir/ValueSet/gender"}
        }))
        .unwrap();

        assert_eq!(
            binding.value_set_url(),
            Some("http://hl7.org/fhir/ValueSet/gender")
        );
    }
}
