//! Slicing queries shared by snapshot, skeleton and differential trees
//!
//! - Finding the slicing sibling that declares how a repeated path is split
//! - Finding the nearest ancestor under slicing, which bounds where backup
//!   resolution looks for a differential node's counterpart

use crate::builder::SkeletonData;
use crate::data::FhirNodeData;
use crate::error::{Error, Result};
use crate::resolve::BackupResolution;
use crate::tree::{NodeId, NodeRef};
use crate::tree_data::FhirTreeData;

pub trait HasSlicingInfo {
    fn has_slicing_info(&self) -> bool;
}

impl HasSlicingInfo for FhirNodeData {
    fn has_slicing_info(&self) -> bool {
        self.slicing_info().is_some()
    }
}

impl HasSlicingInfo for SkeletonData {
    fn has_slicing_info(&self) -> bool {
        self.slicing.is_some()
    }
}

/// The one sibling with the same path that carries slicing info.
///
/// Several such siblings make the slicing ambiguous, which is fatal.
pub fn slicing_sibling<'a, D: HasSlicingInfo>(
    node: NodeRef<'a, D>,
) -> Result<Option<NodeRef<'a, D>>> {
    let mut found: Vec<NodeRef<'a, D>> = node
        .siblings()
        .into_iter()
        .filter(|s| s.path() == node.path() && s.data().has_slicing_info())
        .collect();
    match found.len() {
        0 => Ok(None),
        1 => Ok(found.pop()),
        count => Err(Error::AmbiguousSlicingSiblings {
            path: node.path().to_string(),
            count,
        }),
    }
}

/// Narrows backup searches to the subtree of the nearest sliced ancestor
pub(crate) struct SlicingResolver<'a> {
    snapshot: &'a FhirTreeData,
}

impl<'a> SlicingResolver<'a> {
    pub(crate) fn new(snapshot: &'a FhirTreeData) -> Self {
        Self { snapshot }
    }

    /// Snapshot node under which to look for `node`'s backup. Ancestors must already be resolved.
    pub(crate) fn search_root(
        &self,
        node: NodeRef<'_, SkeletonData>,
        resolved: &[Option<BackupResolution>],
    ) -> Result<NodeId> {
        match self.first_sliced_ancestor(node, resolved)? {
            Some((_, backup)) => Ok(backup),
            None => Ok(self.snapshot.root().id()),
        }
    }

    /// Nearest ancestor, with its backup, that is sliced or is itself a slice
    pub(crate) fn first_sliced_ancestor<'s>(
        &self,
        node: NodeRef<'s, SkeletonData>,
        resolved: &[Option<BackupResolution>],
    ) -> Result<Option<(NodeRef<'s, SkeletonData>, NodeId)>> {
        for ancestor in node.ancestors() {
            let backup = match resolved.get(ancestor.id().index()).copied().flatten() {
                Some(BackupResolution::Matched(backup)) => backup,
                Some(BackupResolution::Skipped) => {
                    return Err(Error::BackupResolution {
                        path: node.path().to_string(),
                        reason: format!("ancestor {} was skipped", ancestor.path()),
                    })
                }
                None => {
                    return Err(Error::Inconsistent(format!(
                        "ancestor {} of {} resolved out of order",
                        ancestor.path(),
                        node.path()
                    )))
                }
            };
            if self.is_affected_by_slicing(ancestor, backup)? {
                return Ok(Some((ancestor, backup)));
            }
        }
        Ok(None)
    }

    fn is_affected_by_slicing(
        &self,
        ancestor: NodeRef<'_, SkeletonData>,
        backup: NodeId,
    ) -> Result<bool> {
        if ancestor.data().has_slicing_info() || slicing_sibling(ancestor)?.is_some() {
            return Ok(true);
        }
        let backup = self.snapshot.node(backup);
        Ok(backup.has_slicing_info() || backup.slicing_sibling()?.is_some())
    }
}
