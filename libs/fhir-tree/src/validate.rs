//! Checks on constraint and mapping records that the renderer relies on.

use crate::context::RenderContext;
use crate::data::{ConstraintInfo, ElementMapping};
use crate::error::{Error, Result};
use crate::event::RendererEventType;
use crate::path::NodePath;
use indexmap::IndexMap;
use std::collections::HashSet;

const IGNORABLE_MAPPINGS: [&str; 2] = ["n/a", "N/A"];

/// Every constraint needs a key and human-readable text; keys should be unique
pub fn validate_constraints(
    constraints: &[ConstraintInfo],
    path: &NodePath,
    ctx: &RenderContext<'_>,
) -> Result<()> {
    let mut keys = HashSet::new();
    let mut duplicates = Vec::new();

    for constraint in constraints {
        if constraint.key.is_empty() {
            return Err(Error::InvalidElement {
                path: path.to_string(),
                reason: "constraint without key".into(),
            });
        }
        if constraint.description.is_empty() {
            return Err(Error::InvalidElement {
                path: path.to_string(),
                reason: format!("constraint {} has no human description", constraint.key),
            });
        }
        if !keys.insert(constraint.key.as_str()) {
            duplicates.push(constraint.key.as_str());
        }
    }

    if !duplicates.is_empty() {
        ctx.event(
            RendererEventType::DuplicateConstraintKeys,
            format!(
                "Duplicate constraint keys at {}: {}",
                path,
                duplicates.join(", ")
            ),
        )?;
    }
    Ok(())
}

/// Reports placeholder and repeated mapping entries per identity
pub fn validate_mappings(
    mappings: &[ElementMapping],
    path: &NodePath,
    ctx: &RenderContext<'_>,
) -> Result<()> {
    let mut by_identity: IndexMap<&str, Vec<&str>> = IndexMap::new();
    for mapping in mappings {
        by_identity
            .entry(mapping.identity.as_str())
            .or_default()
            .push(mapping.map.as_str());
    }

    for (identity, maps) in by_identity {
        let meaningful = maps
            .iter()
            .filter(|map| !IGNORABLE_MAPPINGS.contains(*map))
            .count();
        if meaningful < maps.len() {
            ctx.event(
                RendererEventType::IgnorableMappingId,
                format!("Ignorable mapping for {} at {}", identity, path),
            )?;
        }

        if meaningful > 1 {
            ctx.event(
                RendererEventType::MultipleMappingsSameKey,
                format!(
                    "{} mappings for {} at {}: {}",
                    meaningful,
                    identity,
                    path,
                    maps.join(" | ")
                ),
            )?;
        } else if maps.len() > 1 {
            ctx.event(
                RendererEventType::MultipleMappingsSameKeyIgnorable,
                format!("Repeated (ignorable) mappings for {} at {}", identity, path),
            )?;
        }
    }
    Ok(())
}
