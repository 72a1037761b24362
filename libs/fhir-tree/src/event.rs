//! Diagnostic events raised while building and resolving trees
//!
//! The tree code never logs. Every diagnostic goes through an [`EventHandler`], which
//! decides from a [`RendererEventConfig`] whether to drop it, record it, or turn it
//! into an error.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RendererEventType {
    MisnamedSnapshotChoiceNode,
    DifferentialNodeMissingId,
    DifferentialChoiceNodeWrongId,
    UnmatchedDifferentialElement,
    MissingTypeLink,
    FixMissingTypeLink,
    TypelinkStringWithProfile,
    SlicingWithoutDiscriminator,
    NoDiscriminatorsFound,
    UnresolvedDiscriminator,
    BindingWithoutDescOrUrl,
    LinkReferencesItself,
    #[serde(rename = "FIXEDVALUE_WITH_LINKED_NODE")]
    FixedValueWithLinkedNode,
    MissingReferencedNode,
    IgnorableMappingId,
    MultipleMappingsSameKey,
    MultipleMappingsSameKeyIgnorable,
    DuplicateConstraintKeys,
    DefaultToSimpleExtension,
    ExtensionFileNotFound,
    MissingCardinality,
}

impl RendererEventType {
    pub const ALL: [RendererEventType; 21] = [
        RendererEventType::MisnamedSnapshotChoiceNode,
        RendererEventType::DifferentialNodeMissingId,
        RendererEventType::DifferentialChoiceNodeWrongId,
        RendererEventType::UnmatchedDifferentialElement,
        RendererEventType::MissingTypeLink,
        RendererEventType::FixMissingTypeLink,
        RendererEventType::TypelinkStringWithProfile,
        RendererEventType::SlicingWithoutDiscriminator,
        RendererEventType::NoDiscriminatorsFound,
        RendererEventType::UnresolvedDiscriminator,
        RendererEventType::BindingWithoutDescOrUrl,
        RendererEventType::LinkReferencesItself,
        RendererEventType::FixedValueWithLinkedNode,
        RendererEventType::MissingReferencedNode,
        RendererEventType::IgnorableMappingId,
        RendererEventType::MultipleMappingsSameKey,
        RendererEventType::MultipleMappingsSameKeyIgnorable,
        RendererEventType::DuplicateConstraintKeys,
        RendererEventType::DefaultToSimpleExtension,
        RendererEventType::ExtensionFileNotFound,
        RendererEventType::MissingCardinality,
    ];

    pub fn default_response(self) -> EventResponse {
        use RendererEventType::*;
        match self {
            LinkReferencesItself | MissingReferencedNode | ExtensionFileNotFound => {
                EventResponse::Throw
            }
            MisnamedSnapshotChoiceNode
            | DuplicateConstraintKeys
            | IgnorableMappingId
            | MultipleMappingsSameKey
            | MultipleMappingsSameKeyIgnorable
            | BindingWithoutDescOrUrl => EventResponse::Ignore,
            _ => EventResponse::LogWarning,
        }
    }
}

impl fmt::Display for RendererEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // serde names double as display names
        match serde_json::to_value(self) {
            Ok(serde_json::Value::String(name)) => f.write_str(&name),
            _ => write!(f, "{:?}", self),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventResponse {
    Ignore,
    LogWarning,
    Throw,
}

/// Per-event-type responses. Unlisted types use their default response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererEventConfig {
    /// Escalate every event to an error
    pub strict: bool,
    pub responses: HashMap<RendererEventType, EventResponse>,
}

impl RendererEventConfig {
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    pub fn with_response(mut self, kind: RendererEventType, response: EventResponse) -> Self {
        self.responses.insert(kind, response);
        self
    }

    pub fn response_for(&self, kind: RendererEventType) -> EventResponse {
        if self.strict {
            return EventResponse::Throw;
        }
        self.responses
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.default_response())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RendererEvent {
    pub kind: RendererEventType,
    pub message: String,
}

impl RendererEvent {
    pub fn new(kind: RendererEventType, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn escalate(self) -> Error {
        Error::EscalatedEvent {
            kind: self.kind,
            message: self.message,
        }
    }
}

/// Receives every diagnostic. Returning an error aborts the current resource.
pub trait EventHandler {
    fn handle(&self, event: RendererEvent) -> Result<()>;

    fn event(&self, kind: RendererEventType, message: String) -> Result<()> {
        self.handle(RendererEvent::new(kind, message))
    }
}

/// Records non-ignored events for later inspection
#[derive(Debug, Default)]
pub struct EventAccumulator {
    config: RendererEventConfig,
    events: Mutex<Vec<RendererEvent>>,
}

impl EventAccumulator {
    pub fn new(config: RendererEventConfig) -> Self {
        Self {
            config,
            events: Mutex::new(Vec::new()),
        }
    }

    /// Records everything and never escalates
    pub fn recording_all() -> Self {
        let mut config = RendererEventConfig::default();
        for kind in RendererEventType::ALL {
            config.responses.insert(kind, EventResponse::LogWarning);
        }
        Self::new(config)
    }

    pub fn events(&self) -> Vec<RendererEvent> {
        self.lock().clone()
    }

    pub fn kinds(&self) -> Vec<RendererEventType> {
        self.lock().iter().map(|e| e.kind).collect()
    }

    pub fn take(&self) -> Vec<RendererEvent> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RendererEvent>> {
        // a poisoned list is still a valid list
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EventHandler for EventAccumulator {
    fn handle(&self, event: RendererEvent) -> Result<()> {
        match self.config.response_for(event.kind) {
            EventResponse::Ignore => Ok(()),
            EventResponse::LogWarning => {
                self.lock().push(event);
                Ok(())
            }
            EventResponse::Throw => Err(event.escalate()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_responses() {
        let config = RendererEventConfig::default();
        assert_eq!(
            config.response_for(RendererEventType::MissingReferencedNode),
            EventResponse::Throw
        );
        assert_eq!(
            config.response_for(RendererEventType::IgnorableMappingId),
            EventResponse::Ignore
        );
        assert_eq!(
            config.response_for(RendererEventType::MissingTypeLink),
            EventResponse::LogWarning
        );
    }

    #[test]
    fn strict_mode_escalates_everything() {
        let handler = EventAccumulator::new(RendererEventConfig::strict());
        let err = handler
            .event(RendererEventType::IgnorableMappingId, "n/a".into())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::EscalatedEvent {
                kind: RendererEventType::IgnorableMappingId,
                ..
            }
        ));
    }

    #[test]
    fn accumulator_records_warnings_only() {
        let handler = EventAccumulator::default();
        handler
            .event(RendererEventType::MissingTypeLink, "a".into())
            .unwrap();
        handler
            .event(RendererEventType::DuplicateConstraintKeys, "b".into())
            .unwrap();

        assert_eq!(handler.kinds(), vec![RendererEventType::MissingTypeLink]);
    }

    #[test]
    fn config_overrides_from_json() {
        let config: RendererEventConfig = serde_json::from_value(serde_json::json!({
            "responses": {"EXTENSION_FILE_NOT_FOUND": "log_warning"}
        }))
        .unwrap();

        assert!(!config.strict);
        assert_eq!(
            config.response_for(RendererEventType::ExtensionFileNotFound),
            EventResponse::LogWarning
        );
        assert_eq!(
            RendererEventType::FixedValueWithLinkedNode.to_string(),
            "FIXEDVALUE_WITH_LINKED_NODE"
        );
    }
}
