//! Read-only lookup of StructureDefinitions by canonical URL and FHIR version

use ferrum_models::{FhirVersion, StructureDefinition};
use std::collections::HashMap;

pub trait StructureDefinitionRepository {
    fn structure_definition(&self, url: &str, version: FhirVersion)
        -> Option<&StructureDefinition>;
}

/// Definitions loaded up front, e.g. every file of a rendering batch
#[derive(Debug, Default)]
pub struct InMemoryStructureDefinitions {
    by_url: HashMap<(FhirVersion, String), StructureDefinition>,
}

impl InMemoryStructureDefinitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, version: FhirVersion, sd: StructureDefinition) {
        self.by_url.insert((version, sd.url.clone()), sd);
    }

    pub fn len(&self) -> usize {
        self.by_url.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_url.is_empty()
    }
}

impl StructureDefinitionRepository for InMemoryStructureDefinitions {
    fn structure_definition(
        &self,
        url: &str,
        version: FhirVersion,
    ) -> Option<&StructureDefinition> {
        if let Some(sd) = self.by_url.get(&(version, url.to_string())) {
            return Some(sd);
        }
        // Profiles are often referenced by a differently-cased URL than they declare
        let wanted = url.rsplit('/').next()?.to_ascii_lowercase();
        self.by_url.iter().find_map(|((v, known), sd)| {
            (*v == version
                && known
                    .rsplit('/')
                    .next()
                    .is_some_and(|tail| tail.to_ascii_lowercase() == wanted))
            .then_some(sd)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extension(url: &str) -> StructureDefinition {
        StructureDefinition::from_value(&json!({
            "resourceType": "StructureDefinition",
            "url": url,
            "name": "ext",
            "kind": "complex-type"
        }))
        .unwrap()
    }

    #[test]
    fn finds_by_exact_url_and_tail() {
        let mut repo = InMemoryStructureDefinitions::new();
        repo.insert(
            FhirVersion::Stu3,
            extension("https://fhir.example.org/StructureDefinition/Extension-Ethnicity"),
        );

        assert!(repo
            .structure_definition(
                "https://fhir.example.org/StructureDefinition/Extension-Ethnicity",
                FhirVersion::Stu3
            )
            .is_some());
        assert!(repo
            .structure_definition(
                "https://fhir.example.org/StructureDefinition/extension-ethnicity",
                FhirVersion::Stu3
            )
            .is_some());
        assert!(repo
            .structure_definition(
                "https://fhir.example.org/StructureDefinition/Extension-Ethnicity",
                FhirVersion::R4
            )
            .is_none());
    }
}
