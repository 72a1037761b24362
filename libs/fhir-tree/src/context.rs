use crate::error::Result;
use crate::event::{EventHandler, RendererEventType};
use crate::repository::StructureDefinitionRepository;

/// Collaborators threaded through tree building and resolution for one resource
#[derive(Clone, Copy)]
pub struct RenderContext<'a> {
    events: &'a dyn EventHandler,
    structure_definitions: Option<&'a dyn StructureDefinitionRepository>,
    permitted_missing_extension_prefixes: &'a [String],
}

impl<'a> RenderContext<'a> {
    pub fn new(events: &'a dyn EventHandler) -> Self {
        Self {
            events,
            structure_definitions: None,
            permitted_missing_extension_prefixes: &[],
        }
    }

    pub fn with_structure_definitions(
        mut self,
        repository: &'a dyn StructureDefinitionRepository,
    ) -> Self {
        self.structure_definitions = Some(repository);
        self
    }

    /// Extension URLs under these prefixes may be absent from the repository
    pub fn with_permitted_missing_extension_prefixes(mut self, prefixes: &'a [String]) -> Self {
        self.permitted_missing_extension_prefixes = prefixes;
        self
    }

    pub fn events(&self) -> &'a dyn EventHandler {
        self.events
    }

    pub fn structure_definitions(&self) -> Option<&'a dyn StructureDefinitionRepository> {
        self.structure_definitions
    }

    pub fn is_permitted_missing_extension(&self, url: &str) -> bool {
        self.permitted_missing_extension_prefixes
            .iter()
            .any(|prefix| url.starts_with(prefix.as_str()))
    }

    pub fn event(&self, kind: RendererEventType, message: impl Into<String>) -> Result<()> {
        self.events.event(kind, message.into())
    }
}
