//! Target address values and the wire grammar.

use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;

use crate::domain::errors::ParseError;

/// Directory holding packaged build artifacts; only paths passing through it
/// can be decoded back to an address.
const ARTIFACT_DIR: &str = "bloop-jars";
const SOURCES_SUFFIX: &str = "-sources.jar!";
const JAR_SUFFIX: &str = ".jar!";

/// How much of a directory an address covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AddressKind {
    /// One named target in the directory.
    Single,
    /// Every target directly in the directory (`path:`).
    AllFlat,
    /// Every target in the directory and below (`path::`).
    AllDeep,
}

/// An importable build target or target group.
///
/// The path is a slash-separated directory identifier relative to the
/// workspace root; the target name is present exactly when the kind is
/// [`AddressKind::Single`]. Addresses are plain values with structural
/// equality, suitable as set elements.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    path: String,
    kind: AddressKind,
    target: Option<String>,
}

impl Address {
    pub fn single(path: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: AddressKind::Single,
            target: Some(target.into()),
        }
    }

    pub fn all_flat(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: AddressKind::AllFlat,
            target: None,
        }
    }

    pub fn all_deep(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: AddressKind::AllDeep,
            target: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> AddressKind {
        self.kind
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Parse an address string.
    ///
    /// The grammar is anchored on the trailing colon(s): `path::` selects
    /// recursively, `path:` selects the directory, and `path:target` names a
    /// single target. Paths must not themselves contain `:`.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        if let Some(path) = input.strip_suffix("::") {
            if path.contains(':') {
                return Err(ParseError::new(input));
            }
            return Ok(Self::all_deep(path));
        }
        if let Some(path) = input.strip_suffix(':') {
            if path.contains(':') {
                return Err(ParseError::new(input));
            }
            return Ok(Self::all_flat(path));
        }
        match input.split_once(':') {
            Some((path, target)) if !target.is_empty() && !target.contains(':') => {
                Ok(Self::single(path, target))
            }
            _ => Err(ParseError::new(input)),
        }
    }

    /// Map a packaged-artifact file path back to the address it was built
    /// from. Best effort: paths that do not look like packaged artifacts
    /// yield `None`, never an error.
    pub fn decode_artifact_path(path: &Path) -> Option<Self> {
        let segments: Vec<&str> = path
            .components()
            .filter_map(|component| match component {
                Component::Normal(segment) => segment.to_str(),
                _ => None,
            })
            .collect();

        if !segments.iter().any(|segment| *segment == ARTIFACT_DIR) {
            return None;
        }

        // The archive name is the deepest segment ending in `.jar!`.
        let archive = segments
            .iter()
            .rev()
            .find(|segment| segment.ends_with(JAR_SUFFIX))?;
        let stem = archive
            .strip_suffix(SOURCES_SUFFIX)
            .or_else(|| archive.strip_suffix(JAR_SUFFIX))?;

        let (dir, target) = match stem.rsplit_once('.') {
            Some((dir, target)) => (dir.replace('.', "/"), target),
            None => (String::new(), stem),
        };
        if target.is_empty() {
            return None;
        }
        Some(Self::single(dir, target))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AddressKind::Single => {
                write!(f, "{}:{}", self.path, self.target.as_deref().unwrap_or(""))
            }
            AddressKind::AllFlat => write!(f, "{}:", self.path),
            AddressKind::AllDeep => write!(f, "{}::", self.path),
        }
    }
}

impl FromStr for Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// True when `ancestor` is a strict, segment-wise ancestor of `dir`.
///
/// The empty path is the workspace root and is an ancestor of every
/// non-empty path; no path is its own ancestor.
pub fn is_strict_ancestor(ancestor: &str, dir: &str) -> bool {
    if dir == ancestor {
        return false;
    }
    if ancestor.is_empty() {
        return !dir.is_empty();
    }
    dir.strip_prefix(ancestor)
        .is_some_and(|rest| rest.starts_with('/'))
}
