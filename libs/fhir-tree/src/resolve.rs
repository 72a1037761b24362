//! Matches every differential element to the snapshot node it constrains.
//!
//! Nodes are resolved top-down over the differential skeleton. A node under slicing
//! is only searched for below its sliced ancestor's backup. Among the snapshot nodes
//! sharing its path, a node is told apart by slicing info, then slice name, then
//! slice discriminators. Elements whose path matches nothing are skipped with their subtree.

use crate::builder::SkeletonData;
use crate::context::RenderContext;
use crate::error::{Error, Result};
use crate::event::RendererEventType;
use crate::links::CHOICE_SUFFIXES;
use crate::node::FhirNode;
use crate::path::{NodePath, PathSegments};
use crate::slicing::SlicingResolver;
use crate::tree::{NodeId, NodeRef, Tree};
use crate::tree_data::FhirTreeData;

const NESTED_EXTENSION_PATH: &str = "Extension.extension";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupResolution {
    /// Snapshot node the differential node falls back to
    Matched(NodeId),
    /// No snapshot node matches; the element is left out of the differential tree
    Skipped,
}

/// Resolves every skeleton node, indexed by skeleton node id
pub fn resolve_backup_nodes(
    skeleton: &Tree<SkeletonData>,
    snapshot: &FhirTreeData,
    ctx: &RenderContext<'_>,
) -> Result<Vec<BackupResolution>> {
    let locator = BackupNodeLocator::new(snapshot, ctx);
    let mut resolved: Vec<Option<BackupResolution>> = vec![None; skeleton.len()];

    for node in skeleton.nodes() {
        let parent_skipped = node.parent().is_some_and(|parent| {
            resolved[parent.id().index()] == Some(BackupResolution::Skipped)
        });
        let resolution = if parent_skipped {
            BackupResolution::Skipped
        } else {
            locator.find_backup_node(node, &resolved)?
        };
        resolved[node.id().index()] = Some(resolution);
    }

    resolved
        .into_iter()
        .enumerate()
        .map(|(index, resolution)| {
            resolution.ok_or_else(|| {
                Error::Inconsistent(format!("skeleton node {} was never resolved", index))
            })
        })
        .collect()
}

pub(crate) struct BackupNodeLocator<'a, 'c> {
    snapshot: &'a FhirTreeData,
    slicing: SlicingResolver<'a>,
    ctx: &'a RenderContext<'c>,
}

impl<'a, 'c> BackupNodeLocator<'a, 'c> {
    pub(crate) fn new(snapshot: &'a FhirTreeData, ctx: &'a RenderContext<'c>) -> Self {
        Self {
            snapshot,
            slicing: SlicingResolver::new(snapshot),
            ctx,
        }
    }

    pub(crate) fn find_backup_node(
        &self,
        node: NodeRef<'_, SkeletonData>,
        resolved: &[Option<BackupResolution>],
    ) -> Result<BackupResolution> {
        let search_root = self.snapshot.node(self.slicing.search_root(node, resolved)?);
        let matches: Vec<FhirNode<'a>> = search_root
            .descendants()
            .filter(|candidate| candidate.path() == node.path())
            .collect();

        match matches.as_slice() {
            [] => self.recover_or_skip(node, search_root),
            [only] => Ok(BackupResolution::Matched(only.id())),
            [first, ..] if first.has_slicing_info() => self.match_slice(node, &matches),
            _ if is_nested_extension(node.path()) => {
                self.match_nested_extension_by_name(node, &matches)
            }
            _ => Err(Error::BackupResolution {
                path: node.path().to_string(),
                reason: format!(
                    "{} snapshot nodes share the path but none declares slicing",
                    matches.len()
                ),
            }),
        }
    }

    /// Picks among a slicing node and its slices
    fn match_slice(
        &self,
        node: NodeRef<'_, SkeletonData>,
        matches: &[FhirNode<'a>],
    ) -> Result<BackupResolution> {
        let data = node.data();
        if data.slicing().is_some() {
            return Ok(BackupResolution::Matched(matches[0].id()));
        }

        let slices: Vec<FhirNode<'a>> = matches
            .iter()
            .filter(|candidate| !candidate.has_slicing_info())
            .copied()
            .collect();
        if slices.is_empty() {
            if is_nested_extension(node.path()) {
                return self.match_nested_extension_by_name(node, matches);
            }
            return Err(Error::BackupResolution {
                path: node.path().to_string(),
                reason: format!("no slice candidates among {} slicing nodes", matches.len()),
            });
        }

        let candidates = match data.slice_name() {
            Some(name) => {
                let named: Vec<FhirNode<'a>> = slices
                    .iter()
                    .filter(|slice| slice.element().slice_name() == Some(name))
                    .copied()
                    .collect();
                if named.is_empty() {
                    return Err(Error::BackupResolution {
                        path: node.path().to_string(),
                        reason: format!("no snapshot slice is named {}", name),
                    });
                }
                named
            }
            None => slices,
        };

        if let [only] = candidates.as_slice() {
            return Ok(BackupResolution::Matched(only.id()));
        }
        self.match_discriminators(node, matches[0], &candidates)
            .map(BackupResolution::Matched)
    }

    /// The single candidate agreeing with `node` on every discriminator of the slicing
    fn match_discriminators(
        &self,
        node: NodeRef<'_, SkeletonData>,
        slicing_node: FhirNode<'a>,
        candidates: &[FhirNode<'a>],
    ) -> Result<NodeId> {
        let discriminators: Vec<&str> = slicing_node
            .slicing_info()
            .map(|info| info.discriminator_paths.iter().map(String::as_str).collect())
            .unwrap_or_default();

        let mut accepted = Vec::new();
        for candidate in candidates {
            let mut all_match = true;
            for discriminator in &discriminators {
                if !self.discriminator_matches(node, *candidate, discriminator)? {
                    all_match = false;
                    break;
                }
            }
            if all_match {
                accepted.push(candidate.id());
            }
        }

        match accepted.as_slice() {
            [only] => Ok(*only),
            _ => Err(Error::BackupResolution {
                path: node.path().to_string(),
                reason: format!(
                    "{} of {} slices match discriminators [{}]",
                    accepted.len(),
                    candidates.len(),
                    discriminators.join(", ")
                ),
            }),
        }
    }

    fn discriminator_matches(
        &self,
        node: NodeRef<'_, SkeletonData>,
        candidate: FhirNode<'a>,
        discriminator: &str,
    ) -> Result<bool> {
        if discriminator == "url" && node.path().path_name() == "extension" {
            let theirs = candidate.extension_url_discriminators();
            if node
                .data()
                .extension_urls()
                .iter()
                .any(|url| theirs.contains(url))
            {
                return Ok(true);
            }
        }

        let (own, theirs) = if discriminator == "$this" {
            (node.data().fixed_value(), candidate.fixed_value())
        } else {
            let own = node.find_unique_descendant_matching_path(discriminator)?;
            let theirs = candidate.find_unique_descendant_matching_path(discriminator)?;
            // both sides must constrain the discriminator element
            let (Some(own), Some(theirs)) = (own, theirs) else {
                return Ok(false);
            };
            (own.data().fixed_value(), theirs.fixed_value())
        };

        Ok(match (own, theirs) {
            (Some(own), Some(theirs)) => own == theirs,
            (None, None) => true,
            _ => false,
        })
    }

    /// Nested extension children are told apart by slice name alone
    fn match_nested_extension_by_name(
        &self,
        node: NodeRef<'_, SkeletonData>,
        matches: &[FhirNode<'a>],
    ) -> Result<BackupResolution> {
        let name = node.data().slice_name();
        let named: Vec<&FhirNode<'a>> = matches
            .iter()
            .filter(|candidate| name.is_some() && candidate.element().slice_name() == name)
            .collect();
        match named.as_slice() {
            [only] => Ok(BackupResolution::Matched(only.id())),
            _ => Err(Error::BackupResolution {
                path: node.path().to_string(),
                reason: format!(
                    "{} nested extensions named {}",
                    named.len(),
                    name.unwrap_or("<none>")
                ),
            }),
        }
    }

    fn recover_or_skip(
        &self,
        node: NodeRef<'_, SkeletonData>,
        search_root: FhirNode<'a>,
    ) -> Result<BackupResolution> {
        match recover_choice_node(node.path(), search_root) {
            Some(recovered) => {
                self.ctx.event(
                    RendererEventType::MisnamedSnapshotChoiceNode,
                    format!(
                        "Matched {} to choice node {}",
                        node.path(),
                        recovered.path()
                    ),
                )?;
                Ok(BackupResolution::Matched(recovered.id()))
            }
            None => Ok(BackupResolution::Skipped),
        }
    }
}

fn is_nested_extension(path: &NodePath) -> bool {
    path.to_string() == NESTED_EXTENSION_PATH
}

/// Finds the `[x]` node for a path naming a concrete choice type, e.g. `Observation.valueQuantity`
fn recover_choice_node<'a>(path: &NodePath, search_root: FhirNode<'a>) -> Option<FhirNode<'a>> {
    let parts = path.parts();
    for (index, segment) in parts.iter().enumerate() {
        for suffix in CHOICE_SUFFIXES {
            let Some(stem) = segment.strip_suffix(suffix) else {
                continue;
            };
            if stem.is_empty() {
                continue;
            }
            let mut recovered = parts.to_vec();
            recovered[index] = format!("{}[x]", stem);
            let recovered = NodePath::from_parts(recovered);
            if let Some(found) = search_root
                .descendants()
                .find(|candidate| candidate.path() == &recovered)
            {
                return Some(found);
            }
        }
    }
    None
}
