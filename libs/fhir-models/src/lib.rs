//! FHIR conformance models
//!
//! This crate provides strongly-typed Rust structures for the FHIR resources that
//! describe other resources: `StructureDefinition` and its `ElementDefinition`s.
//!
//! # Module Organization
//!
//! - `common`: Version-tolerant models that accept DSTU2, STU3 and R4 JSON
//!
//! # Design Philosophy
//!
//! - **Version-tolerant core**: fields whose shape changed between releases are
//!   normalised on read (single or repeated `profile`, typed or bare discriminators)
//! - **Extensible**: `extensions` captures choice-typed and unmodelled properties
//! - **Compatible**: Works with existing `serde_json::Value`-based code
//!
//! # Example
//!
//! ```rust
//! use ferrum_models::common::{FhirVersion, StructureDefinition, StructureDefinitionKind};
//! use serde_json::json;
//!
//! let sd_json = json!({
//!     "resourceType": "StructureDefinition",
//!     "url": "http://example.org/StructureDefinition/my-patient",
//!     "name": "MyPatient",
//!     "fhirVersion": "3.0.1",
//!     "kind": "resource",
//!     "type": "Patient",
//!     "differential": {"element": [{"path": "Patient.birthDate", "min": 1}]}
//! });
//!
//! let sd = StructureDefinition::from_value(&sd_json).unwrap();
//! assert_eq!(sd.name, "MyPatient");
//! assert_eq!(sd.kind, Some(StructureDefinitionKind::Resource));
//! assert_eq!(sd.implicit_fhir_version().unwrap(), FhirVersion::Stu3);
//! ```

pub mod common;

// Re-export commonly used types
pub use common::*;
