//! Passes over a fully built tree that wire up cross references.
//!
//! They run in a fixed order: name links, then id links, then slice discriminators.
//! Each pass reads the tree, then records its results in the tree's write-once
//! [`ResolvedLinks`](crate::tree_data::ResolvedLinks).

use crate::context::RenderContext;
use crate::error::{Error, Result};
use crate::event::RendererEventType;
use crate::node::FhirNode;
use crate::path::NodePath;
use crate::tree::NodeId;
use crate::tree_data::FhirTreeData;

/// Discriminator value recorded when none can be worked out
pub const MISSING_DISCRIMINATOR: &str = "<missing>";

/// Runs every caching pass, in order
pub fn cache_tree(tree_data: &mut FhirTreeData, ctx: &RenderContext<'_>) -> Result<()> {
    NameLinkedNodeResolver::resolve(tree_data, ctx)?;
    IdLinkedNodeResolver::resolve(tree_data, ctx)?;
    SlicingDiscriminatorCacher::cache(tree_data, ctx)?;
    Ok(())
}

/// Resolves DSTU2 `nameReference` links against element names
pub struct NameLinkedNodeResolver;

impl NameLinkedNodeResolver {
    pub fn resolve(tree_data: &mut FhirTreeData, ctx: &RenderContext<'_>) -> Result<()> {
        let mut resolved = Vec::new();
        for node in tree_data.nodes() {
            let Some(name) = node.element().linked_node_name() else {
                continue;
            };
            let target = resolve_link(node, name, ctx, find_by_name)?;
            resolved.push((node.id(), target, node.path().clone()));
        }
        record_links(tree_data, resolved)
    }
}

/// Resolves `contentReference` links against element ids, then paths
pub struct IdLinkedNodeResolver;

impl IdLinkedNodeResolver {
    pub fn resolve(tree_data: &mut FhirTreeData, ctx: &RenderContext<'_>) -> Result<()> {
        let mut resolved = Vec::new();
        for node in tree_data.nodes() {
            let Some(id) = node.element().linked_node_id() else {
                continue;
            };
            let target = resolve_link(node, id, ctx, find_by_id)?;
            resolved.push((node.id(), target, node.path().clone()));
        }
        record_links(tree_data, resolved)
    }
}

fn record_links(
    tree_data: &mut FhirTreeData,
    resolved: Vec<(NodeId, NodeId, NodePath)>,
) -> Result<()> {
    let links = tree_data.links_mut();
    for (node, target, path) in resolved {
        links.cache_linked_node(node, target, &path)?;
    }
    Ok(())
}

fn find_by_name(tree_data: &FhirTreeData, name: &str) -> Result<Option<NodeId>> {
    let named: Vec<NodeId> = tree_data
        .nodes()
        .filter(|node| node.element().name() == Some(name))
        .map(|node| node.id())
        .collect();
    match named.as_slice() {
        [] => Ok(None),
        [only] => Ok(Some(*only)),
        _ => Err(Error::Inconsistent(format!(
            "{} nodes are named {}",
            named.len(),
            name
        ))),
    }
}

fn find_by_id(tree_data: &FhirTreeData, id: &str) -> Result<Option<NodeId>> {
    if let Some(node) = tree_data.nodes_with_id(id).next() {
        return Ok(Some(node.id()));
    }
    Ok(tree_data
        .nodes_with_path(&NodePath::parse(id))
        .next()
        .map(|node| node.id()))
}

/// Finds the snapshot node `link` refers to.
///
/// Differential nodes look in their own tree first and use the match's backup,
/// then fall back to the snapshot tree.
fn resolve_link(
    node: FhirNode<'_>,
    link: &str,
    ctx: &RenderContext<'_>,
    find: fn(&FhirTreeData, &str) -> Result<Option<NodeId>>,
) -> Result<NodeId> {
    let tree_data = node.tree_data();
    let own_match = match find(tree_data, link)? {
        Some(found) => Some(tree_data.node(found).snapshot_node().id()),
        None => None,
    };
    let target = match (own_match, tree_data.backup_tree()) {
        (Some(target), _) => Some(target),
        (None, Some(snapshot)) => find(snapshot, link)?,
        (None, None) => None,
    };

    let Some(target) = target else {
        ctx.event(
            RendererEventType::MissingReferencedNode,
            format!("Couldn't find node {} linked from {}", link, node.path()),
        )?;
        return Err(Error::UnresolvedLink {
            path: node.path().to_string(),
            link: link.to_string(),
        });
    };

    if target == node.snapshot_node().id() {
        ctx.event(
            RendererEventType::LinkReferencesItself,
            format!("Link from {} references itself", node.path()),
        )?;
    }
    if node.element().fixed_value().is_some() {
        ctx.event(
            RendererEventType::FixedValueWithLinkedNode,
            format!("Node {} has a fixed value and a linked node", node.path()),
        )?;
    }
    Ok(target)
}

/// Works out the value that tells each slice apart from its siblings
pub struct SlicingDiscriminatorCacher;

impl SlicingDiscriminatorCacher {
    pub fn cache(tree_data: &mut FhirTreeData, ctx: &RenderContext<'_>) -> Result<()> {
        let mut values = Vec::new();
        for node in tree_data.nodes() {
            let Some(sibling) = node.slicing_sibling()? else {
                continue;
            };
            let value = Self::discriminator_value(node, sibling, ctx)?;
            values.push((node.id(), value, node.path().clone()));
        }

        let links = tree_data.links_mut();
        for (node, value, path) in values {
            links.cache_discriminator(node, value, &path)?;
        }
        Ok(())
    }

    fn discriminator_value(
        node: FhirNode<'_>,
        slicing_sibling: FhirNode<'_>,
        ctx: &RenderContext<'_>,
    ) -> Result<String> {
        let discriminators: Vec<&str> = slicing_sibling
            .slicing_info()
            .map(|info| info.discriminator_paths.iter().map(String::as_str).collect())
            .unwrap_or_default();
        if discriminators.is_empty() {
            ctx.event(
                RendererEventType::NoDiscriminatorsFound,
                format!("No discriminators found for {}", node.path()),
            )?;
            return Ok(MISSING_DISCRIMINATOR.to_string());
        }

        let mut values = Vec::with_capacity(discriminators.len());
        for discriminator in discriminators {
            match Self::value_for(node, discriminator, ctx)? {
                Some(value) => values.push(value),
                None => {
                    let backup_value = node.backup_node().and_then(|b| b.discriminator_value());
                    if let Some(cached) = backup_value {
                        return Ok(cached.to_string());
                    }
                    ctx.event(
                        RendererEventType::UnresolvedDiscriminator,
                        format!(
                            "Couldn't resolve discriminator {} for {}",
                            discriminator,
                            node.path()
                        ),
                    )?;
                    return Ok(MISSING_DISCRIMINATOR.to_string());
                }
            }
        }
        Ok(values.join(", "))
    }

    fn value_for(
        node: FhirNode<'_>,
        discriminator: &str,
        ctx: &RenderContext<'_>,
    ) -> Result<Option<String>> {
        match discriminator {
            "$this" => Self::value_of(node, ctx),
            "@type" => {
                let texts = node.type_links(ctx)?.texts();
                Ok((!texts.is_empty()).then(|| texts.join(" | ")))
            }
            "url" if node.path_name() == "extension" => {
                let urls = node.extension_url_discriminators();
                if !urls.is_empty() {
                    return Ok(Some(urls.join(" | ")));
                }
                Self::descendant_value(node, discriminator, ctx)
            }
            _ => Self::descendant_value(node, discriminator, ctx),
        }
    }

    fn descendant_value(
        node: FhirNode<'_>,
        discriminator: &str,
        ctx: &RenderContext<'_>,
    ) -> Result<Option<String>> {
        match node.find_unique_descendant_matching_path(discriminator)? {
            Some(descendant) => Self::value_of(descendant, ctx),
            None => Ok(None),
        }
    }

    /// Fixed value, else the bound value set, else the binding description
    fn value_of(node: FhirNode<'_>, ctx: &RenderContext<'_>) -> Result<Option<String>> {
        if let Some(fixed) = node.fixed_value() {
            return Ok(Some(fixed.to_string()));
        }
        Ok(node
            .binding(ctx)?
            .and_then(|binding| binding.url.or(binding.description)))
    }
}
