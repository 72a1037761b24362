//! FHIR StructureDefinition Element Trees
//!
//! This crate turns the flat element lists of a StructureDefinition into trees.
//! The snapshot tree holds every element. The differential tree holds the
//! profile's own elements, each backed by the snapshot node it constrains.
//!
//! # Example
//!
//! ```rust,no_run
//! use ferrum_tree::{EventAccumulator, RenderContext, StructureDefinitionTreeDataProvider};
//! use ferrum_models::StructureDefinition;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let json = "{}";
//! let sd: StructureDefinition = serde_json::from_str(json)?;
//! let events = EventAccumulator::default();
//! let ctx = RenderContext::new(&events);
//!
//! let provider = StructureDefinitionTreeDataProvider::new(&sd)?;
//! let snapshot = provider.snapshot_tree_data(&ctx)?;
//! let differential = provider.differential_tree_data(snapshot, &ctx)?;
//!
//! for node in differential.nodes() {
//!     println!("{} {}", node.node_key(), node.data().cardinality());
//! }
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod cache;
pub mod context;
pub mod data;
pub mod error;
pub mod event;
pub mod links;
pub mod lookup;
pub mod node;
pub mod path;
pub mod provider;
pub mod repository;
pub mod resolve;
pub mod slicing;
pub mod tree;
pub mod tree_builder;
pub mod tree_data;
pub mod validate;
pub mod wrap;

pub use builder::{FhirTreeNodeDataBuilder, SkeletonData};
pub use cache::{
    cache_tree, IdLinkedNodeResolver, NameLinkedNodeResolver, SlicingDiscriminatorCacher,
    MISSING_DISCRIMINATOR,
};
pub use context::RenderContext;
pub use data::{
    BackupNode, BindingInfo, DifferentialData, ElementData, FhirElementDataType, FhirNodeData,
    SlicingInfo, SnapshotData,
};
pub use error::{Error, Result};
pub use event::{
    EventAccumulator, EventHandler, EventResponse, RendererEvent, RendererEventConfig,
    RendererEventType,
};
pub use links::{LinkData, LinkDatas};
pub use lookup::{FhirTreeContentsLookup, FhirTreeIdLookup, FhirTreePathLookup};
pub use node::FhirNode;
pub use path::{MutableNodePath, NodePath, PathSegments};
pub use provider::StructureDefinitionTreeDataProvider;
pub use repository::{InMemoryStructureDefinitions, StructureDefinitionRepository};
pub use resolve::{resolve_backup_nodes, BackupResolution};
pub use tree::{NodeId, NodeRef, Tree, TreeNode};
pub use tree_builder::TreeDataBuilder;
pub use tree_data::{FhirTreeData, ResolvedLinks};
pub use wrap::{WrappedElement, WrappedElementDefinition};

pub use ferrum_models::{ElementDefinition, FhirVersion, StructureDefinition};
