//! Version-independent view over a parsed `ElementDefinition`.
//!
//! Tree building only talks to [`WrappedElementDefinition`]; [`WrappedElement`] is the
//! adapter for `ferrum_models` JSON elements of any supported release.

use crate::context::RenderContext;
use crate::data::{
    BindingInfo, ConstraintInfo, ElementMapping, ExtensionType, ResourceFlags, SlicingInfo,
};
use crate::error::{Error, Result};
use crate::event::RendererEventType;
use crate::links::{LinkData, LinkDatas};
use crate::path::NodePath;
use ferrum_models::{ElementDefinition, FhirVersion, StructureDefinition};
use indexmap::IndexSet;

pub trait WrappedElementDefinition {
    fn path(&self) -> NodePath;
    fn version(&self) -> FhirVersion;
    fn id(&self) -> Option<String>;
    fn name(&self) -> Option<String>;
    fn slice_name(&self) -> Option<String>;
    fn short(&self) -> Option<String>;
    fn min(&self) -> Option<u32>;
    fn max(&self) -> Option<String>;
    /// Distinct declared type codes, in declaration order
    fn type_codes(&self) -> IndexSet<String>;
    fn type_links(&self, ctx: &RenderContext<'_>) -> Result<LinkDatas>;
    /// Profile and target profile URLs declared on types with this code
    fn profile_urls(&self, type_code: &str) -> Vec<String>;
    fn constraints(&self) -> Vec<ConstraintInfo>;
    fn resource_flags(&self) -> ResourceFlags;
    fn slicing(&self) -> Option<SlicingInfo>;
    fn fixed_value(&self) -> Option<String>;
    fn examples(&self) -> Vec<String>;
    fn default_value(&self) -> Option<String>;
    fn binding(&self) -> Option<BindingInfo>;
    fn definition(&self) -> Option<String>;
    fn requirements(&self) -> Option<String>;
    fn comments(&self) -> Option<String>;
    fn aliases(&self) -> Vec<String>;
    /// Target of a DSTU2 `nameReference`
    fn linked_node_name(&self) -> Option<String>;
    /// Element id targeted by a `contentReference`
    fn linked_node_path(&self) -> Result<Option<String>>;
    fn mappings(&self) -> Vec<ElementMapping>;
    fn extension_type(&self, ctx: &RenderContext<'_>) -> Result<Option<ExtensionType>>;
    fn linked_structure_definition_url(&self) -> Option<String>;
}

pub struct WrappedElement<'a> {
    element: &'a ElementDefinition,
    version: FhirVersion,
}

impl<'a> WrappedElement<'a> {
    pub fn new(element: &'a ElementDefinition, version: FhirVersion) -> Self {
        Self { element, version }
    }

    fn extension_profile(&self) -> Option<&'a str> {
        self.element
            .types
            .iter()
            .flatten()
            .filter(|t| t.code.as_deref() == Some("Extension"))
            .flat_map(|t| t.profile.iter())
            .map(String::as_str)
            .next()
    }

    fn declares_extension_type(&self) -> bool {
        self.element
            .types
            .iter()
            .flatten()
            .any(|t| t.code.as_deref() == Some("Extension"))
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}

/// Display text for a profile URL: its last path segment
fn profile_text(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// Complex extensions define their own `Extension.extension` slices
pub fn classify_extension(sd: &StructureDefinition) -> ExtensionType {
    let elements = sd
        .snapshot
        .iter()
        .flat_map(|s| s.element.iter())
        .chain(sd.differential.iter().flat_map(|d| d.element.iter()));
    let mut has_child_slices = false;
    for element in elements {
        if element.path == "Extension.extension"
            && (element.slice_name.is_some() || element.name.is_some())
            && element.max.as_deref() != Some("0")
        {
            has_child_slices = true;
            break;
        }
    }
    if has_child_slices {
        ExtensionType::Complex
    } else {
        ExtensionType::Simple
    }
}

impl WrappedElementDefinition for WrappedElement<'_> {
    fn path(&self) -> NodePath {
        NodePath::parse(&self.element.path)
    }

    fn version(&self) -> FhirVersion {
        self.version
    }

    fn id(&self) -> Option<String> {
        non_empty(self.element.id.as_ref())
    }

    fn name(&self) -> Option<String> {
        if self.version.uses_element_names_for_slices() {
            non_empty(self.element.name.as_ref())
        } else {
            non_empty(self.element.label.as_ref())
        }
    }

    fn slice_name(&self) -> Option<String> {
        if self.version.uses_element_names_for_slices() {
            non_empty(self.element.name.as_ref())
        } else {
            non_empty(self.element.slice_name.as_ref())
        }
    }

    fn short(&self) -> Option<String> {
        non_empty(self.element.short.as_ref())
    }

    fn min(&self) -> Option<u32> {
        self.element.min
    }

    fn max(&self) -> Option<String> {
        non_empty(self.element.max.as_ref())
    }

    fn type_codes(&self) -> IndexSet<String> {
        self.element
            .type_codes()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    fn type_links(&self, ctx: &RenderContext<'_>) -> Result<LinkDatas> {
        let mut links = LinkDatas::new();
        for element_type in self.element.types.iter().flatten() {
            let Some(code) = element_type.code.as_deref() else {
                continue;
            };
            let outer = LinkData::for_type_code(code, self.version);
            let profiles: Vec<&String> = element_type
                .profile
                .iter()
                .chain(element_type.target_profile.iter())
                .collect();

            if code == "string" && !profiles.is_empty() {
                ctx.event(
                    RendererEventType::TypelinkStringWithProfile,
                    format!("Type string with profile at {}", self.element.path),
                )?;
            } else if !profiles.is_empty() {
                for profile in profiles {
                    links.add_nested_link(
                        outer.clone(),
                        LinkData::new(profile.as_str(), profile_text(profile)),
                    );
                }
                continue;
            }

            // repeated codes (DSTU2 lists Reference once per target) collapse to one link
            if !links.outer_links().any(|existing| existing == &outer) {
                links.add_simple_link(outer)?;
            }
        }
        Ok(links)
    }

    fn profile_urls(&self, type_code: &str) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        for element_type in self.element.types.iter().flatten() {
            if element_type.code.as_deref() != Some(type_code) {
                continue;
            }
            for url in element_type.profile.iter().chain(element_type.target_profile.iter()) {
                if !urls.contains(url) {
                    urls.push(url.clone());
                }
            }
        }
        urls
    }

    fn constraints(&self) -> Vec<ConstraintInfo> {
        self.element
            .constraint
            .iter()
            .flatten()
            .map(|c| ConstraintInfo {
                key: c.key.clone().unwrap_or_default(),
                description: c.human.clone().unwrap_or_default(),
                severity: c.severity.clone(),
                requirements: c.requirements.clone(),
                expression: c.expression.clone().or_else(|| c.xpath.clone()),
            })
            .collect()
    }

    fn resource_flags(&self) -> ResourceFlags {
        ResourceFlags {
            summary: self.element.is_summary.unwrap_or(false),
            modifier: self.element.is_modifier.unwrap_or(false),
            constrained: self
                .element
                .constraint
                .as_ref()
                .is_some_and(|c| !c.is_empty()),
            must_support: self.element.must_support.unwrap_or(false),
        }
    }

    fn slicing(&self) -> Option<SlicingInfo> {
        let slicing = self.element.slicing.as_ref()?;
        Some(SlicingInfo {
            description: non_empty(slicing.description.as_ref()),
            discriminator_paths: slicing
                .discriminator
                .iter()
                .flatten()
                .map(|d| d.path().to_string())
                .collect(),
            ordered: slicing.ordered,
            rules: slicing.rules.map(|r| r.as_str().to_string()),
        })
    }

    fn fixed_value(&self) -> Option<String> {
        self.element.fixed_value().map(|v| v.to_display_string())
    }

    fn examples(&self) -> Vec<String> {
        self.element
            .example_values()
            .iter()
            .map(|v| v.to_display_string())
            .collect()
    }

    fn default_value(&self) -> Option<String> {
        self.element.default_value().map(|v| v.to_display_string())
    }

    fn binding(&self) -> Option<BindingInfo> {
        self.element.binding.as_ref().map(|b| BindingInfo {
            description: non_empty(b.description.as_ref()),
            url: b.value_set_url().filter(|u| !u.is_empty()).map(str::to_string),
            strength: non_empty(b.strength.as_ref()),
        })
    }

    fn definition(&self) -> Option<String> {
        non_empty(self.element.definition.as_ref())
    }

    fn requirements(&self) -> Option<String> {
        non_empty(self.element.requirements.as_ref())
    }

    fn comments(&self) -> Option<String> {
        non_empty(self.element.comment.as_ref())
    }

    fn aliases(&self) -> Vec<String> {
        self.element.alias.clone().unwrap_or_default()
    }

    fn linked_node_name(&self) -> Option<String> {
        non_empty(self.element.name_reference.as_ref())
    }

    fn linked_node_path(&self) -> Result<Option<String>> {
        let Some(reference) = non_empty(self.element.content_reference.as_ref()) else {
            return Ok(None);
        };
        match reference.split_once('#') {
            Some((_, id)) if !id.is_empty() => Ok(Some(id.to_string())),
            _ => Err(Error::InvalidElement {
                path: self.element.path.clone(),
                reason: format!("content reference '{}' has no '#' fragment", reference),
            }),
        }
    }

    fn mappings(&self) -> Vec<ElementMapping> {
        self.element
            .mapping
            .iter()
            .flatten()
            .map(|m| ElementMapping {
                identity: m.identity.clone(),
                map: m.map.clone(),
                language: m.language.clone(),
            })
            .collect()
    }

    fn extension_type(&self, ctx: &RenderContext<'_>) -> Result<Option<ExtensionType>> {
        if !self.declares_extension_type() || self.element.slicing.is_some() {
            return Ok(None);
        }
        let Some(url) = self.extension_profile() else {
            return Ok(Some(ExtensionType::Simple));
        };

        let Some(repository) = ctx.structure_definitions() else {
            ctx.event(
                RendererEventType::DefaultToSimpleExtension,
                format!("No definitions available to classify extension {}", url),
            )?;
            return Ok(Some(ExtensionType::Simple));
        };

        match repository.structure_definition(url, self.version) {
            Some(sd) => Ok(Some(classify_extension(sd))),
            None if ctx.is_permitted_missing_extension(url) => {
                ctx.event(
                    RendererEventType::DefaultToSimpleExtension,
                    format!("Permitted missing extension {}, treating as simple", url),
                )?;
                Ok(Some(ExtensionType::Simple))
            }
            None => {
                ctx.event(
                    RendererEventType::ExtensionFileNotFound,
                    format!("Extension {} referenced at {} not found", url, self.element.path),
                )?;
                Ok(Some(ExtensionType::Simple))
            }
        }
    }

    fn linked_structure_definition_url(&self) -> Option<String> {
        self.extension_profile().map(str::to_string)
    }
}
