//! Dotted element paths (`Patient.identifier.system`)
//!
//! [`NodePath`] is the immutable key type used by lookups; [`MutableNodePath`] is the
//! stack used while walking a flat element list. Equality and hashing depend only on
//! the segments, so the two flavours compare equal when their segments do.

use smallvec::SmallVec;
use std::fmt;
use std::hash::{Hash, Hasher};

type Segments = SmallVec<[String; 6]>;

/// Read access shared by both path flavours
pub trait PathSegments {
    fn parts(&self) -> &[String];

    fn size(&self) -> usize {
        self.parts().len()
    }

    fn part(&self, index: usize) -> Option<&str> {
        self.parts().get(index).map(String::as_str)
    }

    /// True if `ancestor` is a prefix of (or equal to) this path
    fn is_subpath<P: PathSegments + ?Sized>(&self, ancestor: &P) -> bool {
        let ancestor = ancestor.parts();
        let own = self.parts();
        ancestor.len() <= own.len() && own.iter().zip(ancestor).all(|(a, b)| a == b)
    }

    /// Last segment, or "" for an empty path
    fn path_name(&self) -> &str {
        self.parts().last().map(String::as_str).unwrap_or("")
    }

    fn is_root(&self) -> bool {
        self.parts().len() == 1
    }

    fn to_dotted(&self) -> String {
        self.parts().join(".")
    }
}

/// Immutable dotted path
#[derive(Debug, Clone, Default, Eq, PartialOrd, Ord)]
pub struct NodePath {
    parts: Segments,
}

impl NodePath {
    pub fn parse(path: &str) -> Self {
        Self {
            parts: split(path),
        }
    }

    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parts: parts.into_iter().map(Into::into).collect(),
        }
    }

    pub fn mutable_copy(&self) -> MutableNodePath {
        MutableNodePath {
            parts: self.parts.clone(),
        }
    }

    /// This path followed by a dotted relative path
    pub fn join(&self, relative: &str) -> NodePath {
        let mut parts = self.parts.clone();
        parts.extend(split(relative));
        NodePath { parts }
    }

    /// The path one segment up, or `None` for a root or empty path
    pub fn parent(&self) -> Option<NodePath> {
        (self.parts.len() > 1).then(|| NodePath {
            parts: self.parts[..self.parts.len() - 1].iter().cloned().collect(),
        })
    }
}

/// Push/pop path used while stepping through a flat element list
#[derive(Debug, Clone, Default, Eq)]
pub struct MutableNodePath {
    parts: Segments,
}

impl MutableNodePath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(path: &str) -> Self {
        Self {
            parts: split(path),
        }
    }

    pub fn step_into(&mut self, segment: impl Into<String>) {
        self.parts.push(segment.into());
    }

    /// Pops the last segment. Stepping out of an empty path is a caller bug.
    pub fn step_out(&mut self) -> String {
        self.parts.pop().unwrap_or_default()
    }

    pub fn immutable_copy(&self) -> NodePath {
        NodePath {
            parts: self.parts.clone(),
        }
    }
}

fn split(path: &str) -> Segments {
    if path.is_empty() {
        return Segments::new();
    }
    path.split('.').map(str::to_string).collect()
}

impl PathSegments for NodePath {
    fn parts(&self) -> &[String] {
        &self.parts
    }
}

impl PathSegments for MutableNodePath {
    fn parts(&self) -> &[String] {
        &self.parts
    }
}

impl PartialEq for NodePath {
    fn eq(&self, other: &Self) -> bool {
        self.parts == other.parts
    }
}

impl PartialEq for MutableNodePath {
    fn eq(&self, other: &Self) -> bool {
        self.parts == other.parts
    }
}

impl PartialEq<MutableNodePath> for NodePath {
    fn eq(&self, other: &MutableNodePath) -> bool {
        self.parts() == other.parts()
    }
}

impl PartialEq<NodePath> for MutableNodePath {
    fn eq(&self, other: &NodePath) -> bool {
        self.parts() == other.parts()
    }
}

impl Hash for NodePath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.parts().hash(state);
    }
}

impl Hash for MutableNodePath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.parts().hash(state);
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_dotted())
    }
}

impl fmt::Display for MutableNodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_dotted())
    }
}

impl From<&str> for NodePath {
    fn from(path: &str) -> Self {
        NodePath::parse(path)
    }
}
