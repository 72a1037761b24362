//! FHIR StructureDefinition model
//!
//! Only the parts needed to rebuild element trees are modelled strictly; everything
//! else round-trips through `extensions`.

use super::element_definition::{Differential, Snapshot};
use super::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// FHIR StructureDefinition resource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StructureDefinition {
    pub resource_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<StructureDefinitionKind>,

    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub is_abstract: Option<bool>,

    /// FHIR version this definition targets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fhir_version: Option<String>,

    /// STU3+: type constrained by this structure
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    /// DSTU2: type constrained by this structure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constrained_type: Option<String>,

    /// STU3+: definition this profile derives from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_definition: Option<String>,

    /// DSTU2: definition this profile derives from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,

    /// specialization | constraint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derivation: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub differential: Option<Differential>,

    /// Additional content beyond core fields
    #[serde(flatten)]
    pub extensions: BTreeMap<String, Value>,
}

/// Kind of structure being defined. DSTU2 spells the type kinds `datatype`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StructureDefinitionKind {
    PrimitiveType,
    ComplexType,
    Datatype,
    Resource,
    Logical,
}

/// FHIR releases this crate understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FhirVersion {
    Dstu2,
    Stu3,
    R4,
    R4B,
    R5,
}

impl FhirVersion {
    /// Parse a `fhirVersion` value such as "3.0.1" or a release label such as "STU3"
    pub fn parse(version: &str) -> Result<Self> {
        let v = version.trim();
        match v.to_ascii_uppercase().as_str() {
            "DSTU2" => return Ok(FhirVersion::Dstu2),
            "STU3" => return Ok(FhirVersion::Stu3),
            "R4" => return Ok(FhirVersion::R4),
            "R4B" => return Ok(FhirVersion::R4B),
            "R5" => return Ok(FhirVersion::R5),
            _ => {}
        }

        if v.starts_with("1.0") || v.starts_with("1.4") || v.starts_with("0.") {
            Ok(FhirVersion::Dstu2)
        } else if v.starts_with("1.") || v.starts_with("3.") {
            Ok(FhirVersion::Stu3)
        } else if v.starts_with("4.3") {
            Ok(FhirVersion::R4B)
        } else if v.starts_with("4.") {
            Ok(FhirVersion::R4)
        } else if v.starts_with("5.") {
            Ok(FhirVersion::R5)
        } else {
            Err(Error::InvalidFieldValue(format!("fhirVersion '{}'", version)))
        }
    }

    /// Root URL of the published specification for this release
    pub fn docs_base(&self) -> &'static str {
        match self {
            FhirVersion::Dstu2 => "http://hl7.org/fhir/DSTU2",
            FhirVersion::Stu3 => "http://hl7.org/fhir/STU3",
            FhirVersion::R4 => "http://hl7.org/fhir/R4",
            FhirVersion::R4B => "http://hl7.org/fhir/R4B",
            FhirVersion::R5 => "http://hl7.org/fhir/R5",
        }
    }

    /// DSTU2 reuses `name` for slice names and uses `nameReference` links
    pub fn uses_element_names_for_slices(&self) -> bool {
        matches!(self, FhirVersion::Dstu2)
    }
}

impl fmt::Display for FhirVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FhirVersion::Dstu2 => "DSTU2",
            FhirVersion::Stu3 => "STU3",
            FhirVersion::R4 => "R4",
            FhirVersion::R4B => "R4B",
            FhirVersion::R5 => "R5",
        };
        f.write_str(label)
    }
}

impl StructureDefinition {
    /// Parse from JSON Value
    pub fn from_value(value: &Value) -> Result<Self> {
        let sd: Self = serde_json::from_value(value.clone())?;
        if sd.resource_type != "StructureDefinition" {
            return Err(Error::InvalidResource(format!(
                "expected StructureDefinition, found {}",
                sd.resource_type
            )));
        }
        Ok(sd)
    }

    /// The declared FHIR version, or a guess from version-specific properties
    pub fn implicit_fhir_version(&self) -> Result<FhirVersion> {
        if let Some(version) = &self.fhir_version {
            return FhirVersion::parse(version);
        }
        if self.constrained_type.is_some() || self.base.is_some() {
            return Ok(FhirVersion::Dstu2);
        }
        let uses_slice_names = self
            .snapshot
            .iter()
            .flat_map(|s| s.element.iter())
            .any(|e| e.slice_name.is_some());
        if uses_slice_names || self.base_definition.is_some() {
            return Ok(FhirVersion::Stu3);
        }
        Ok(FhirVersion::R4)
    }

    /// The constrained type, whichever property carries it
    pub fn constrained_type(&self) -> Option<&str> {
        self.type_.as_deref().or(self.constrained_type.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_fhir_versions() {
        assert_eq!(FhirVersion::parse("1.0.2").unwrap(), FhirVersion::Dstu2);
        assert_eq!(FhirVersion::parse("3.0.1").unwrap(), FhirVersion::Stu3);
        assert_eq!(FhirVersion::parse("4.0.1").unwrap(), FhirVersion::R4);
        assert_eq!(FhirVersion::parse("4.3.0").unwrap(), FhirVersion::R4B);
        assert_eq!(FhirVersion::parse("stu3").unwrap(), FhirVersion::Stu3);
        assert!(FhirVersion::parse("banana").is_err());
    }

    #[test]
    fn infers_dstu2_from_constrained_type() {
        let sd = StructureDefinition::from_value(&json!({
            "resourceType": "StructureDefinition",
            "url": "http://example.org/StructureDefinition/p",
            "name": "p",
            "constrainedType": "Patient",
            "kind": "resource"
        }))
        .unwrap();

        assert_eq!(sd.implicit_fhir_version().unwrap(), FhirVersion::Dstu2);
        assert_eq!(sd.constrained_type(), Some("Patient"));
    }

    #[test]
    fn rejects_other_resource_types() {
        let err = StructureDefinition::from_value(&json!({
            "resourceType": "ValueSet",
            "url": "http://example.org/ValueSet/v",
            "name": "v"
        }))
        .unwrap_err();

        assert!(matches!(err, Error::InvalidResource(_)));
    }
}
