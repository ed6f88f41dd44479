use git2::Oid;

use crate::domain::VersionSpec;

/// Name of the synthetic baseline tag created when no tag qualifies
pub const BASELINE_TAG: &str = "v0.0";

/// A git tag as seen by the normalization pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRef {
    pub name: String,
    /// Commit the tag resolves to
    pub target: Oid,
    /// Position of `target` in a newest-first walk from the current commit.
    ///
    /// `Some(0)` means the current commit itself; `None` means the commit is
    /// not reachable from the current commit.
    pub recency: Option<usize>,
}

impl TagRef {
    pub fn new(name: impl Into<String>, target: Oid, recency: Option<usize>) -> Self {
        TagRef {
            name: name.into(),
            target,
            recency,
        }
    }

    /// Version found in the tag name, if any
    pub fn version_spec(&self) -> Option<VersionSpec> {
        VersionSpec::find(&self.name)
    }
}

/// The single normalized version tag guaranteed to exist per repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalTag {
    pub name: String,
    pub target: Oid,
}

impl CanonicalTag {
    /// Canonical tag for a parsed version
    pub fn for_spec(spec: &VersionSpec, target: Oid) -> Self {
        CanonicalTag {
            name: spec.canonical_name(),
            target,
        }
    }

    /// Synthetic `v0.0` baseline
    pub fn baseline(target: Oid) -> Self {
        CanonicalTag {
            name: BASELINE_TAG.to_string(),
            target,
        }
    }
}
