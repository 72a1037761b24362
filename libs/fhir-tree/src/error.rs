//! Error types for element tree construction and resolution

use crate::event::RendererEventType;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Tree construction error: {0}")]
    TreeConstruction(String),

    #[error("Inconsistent tree: {0}")]
    Inconsistent(String),

    #[error("Invalid element definition at {path}: {reason}")]
    InvalidElement { path: String, reason: String },

    #[error("Found {count} slicing siblings for {path}")]
    AmbiguousSlicingSiblings { path: String, count: usize },

    #[error("Found {count} nodes matching {path} below {element}")]
    NonUniqueDescendant {
        element: String,
        path: String,
        count: usize,
    },

    #[error("Found {count} data types for non-choice node {path}")]
    MultipleDataTypes { path: String, count: usize },

    #[error("Differential node {path} id ({id}) doesn't match backup node id ({backup_id})")]
    IdMismatch {
        path: String,
        id: String,
        backup_id: String,
    },

    #[error("Could not resolve backup node for {path}: {reason}")]
    BackupResolution { path: String, reason: String },

    #[error("Duplicate node key: {0}")]
    DuplicateNodeKey(String),

    #[error("Haven't recorded a node with key {0}")]
    MissingNodeKey(String),

    #[error("Display key index requested before it was built")]
    ContentsNotIndexed,

    #[error("Failed to resolve linked node {link} for {path}")]
    UnresolvedLink { path: String, link: String },

    #[error("Linked node {link} for {path} requested before it was resolved")]
    LinkNotResolved { path: String, link: String },

    #[error("{what} already cached for node {path}")]
    AlreadyCached { what: &'static str, path: String },

    #[error("Differential slicing sibling for {path}: {reason}")]
    SlicingSiblingMismatch { path: String, reason: String },

    #[error("{kind} escalated: {message}")]
    EscalatedEvent {
        kind: RendererEventType,
        message: String,
    },

    #[error("StructureDefinition {0} has no snapshot")]
    MissingSnapshot(String),

    #[error("StructureDefinition {0} has no differential")]
    MissingDifferential(String),

    #[error("FHIR model error: {0}")]
    Models(#[from] ferrum_models::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
