//! Version-tag normalization
//!
//! One strict sequential pipeline per source repository:
//!
//! 1. [selector] picks the baseline among the repository's tags
//! 2. [rewriter] makes sure the canonical tag exists
//! 3. [resolver] describes the current commit against it
//!
//! Re-running the pipeline on the same repository never creates duplicate or
//! conflicting canonical tags.

pub mod resolver;
pub mod rewriter;
pub mod selector;

pub use rewriter::RewriteOutcome;
pub use selector::Baseline;

use crate::domain::VersionString;
use crate::error::Result;
use crate::git::Repository;

/// Everything the pipeline decided for one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalization {
    /// Existing tag the version was anchored on, `None` for the `v0.0` baseline
    pub baseline: Option<Baseline>,
    pub outcome: RewriteOutcome,
    pub version: VersionString,
}

/// Run the whole pipeline and report each step's result
pub fn normalize<R: Repository + ?Sized>(repo: &R) -> Result<Normalization> {
    let tags = repo.list_tags()?;
    let baseline = selector::select_baseline(&tags);
    let outcome = rewriter::rewrite_tags(repo, baseline.as_ref())?;
    let version = resolver::resolve(repo, outcome.canonical())?;

    Ok(Normalization {
        baseline,
        outcome,
        version,
    })
}

/// Compute the package version for a source repository.
///
/// Creates the canonical tag when needed. Fatal errors (`TagConflict`,
/// `RepositoryState`) mean the repository cannot produce a reproducible
/// version.
pub fn resolve_version<R: Repository + ?Sized>(repo: &R) -> Result<VersionString> {
    normalize(repo).map(|normalization| normalization.version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BASELINE_TAG;
    use crate::error::PrepareError;
    use crate::git::mock::{mock_oid, MockRepository};

    #[test]
    fn test_untagged_repository_at_root() {
        let repo = MockRepository::linear(1);

        assert_eq!(resolve_version(&repo).unwrap().as_str(), "v0.0");
        assert_eq!(repo.find_tag(BASELINE_TAG).unwrap(), Some(mock_oid(1)));
    }

    #[test]
    fn test_untagged_repository_past_root() {
        let repo = MockRepository::linear(3);

        assert_eq!(resolve_version(&repo).unwrap().as_str(), "v0.0_2_g0303030");
    }

    #[test]
    fn test_dialect_tag_is_canonicalized() {
        let mut repo = MockRepository::linear(4);
        repo.add_tag("bar", mock_oid(4));
        repo.add_tag("foo-1.2", mock_oid(3));

        let normalization = normalize(&repo).unwrap();

        assert_eq!(normalization.baseline.unwrap().tag.name, "foo-1.2");
        assert_eq!(normalization.outcome.canonical().name, "v1.2");
        assert_eq!(normalization.version.as_str(), "v1.2_1_g0404040");
    }

    #[test]
    fn test_rerun_gives_same_version() {
        let mut repo = MockRepository::linear(3);
        repo.add_tag("pkg_2_1-rc2", mock_oid(2));

        let first = resolve_version(&repo).unwrap();
        let second = resolve_version(&repo).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.as_str(), "v2.1_rc2_1_g0303030");
        assert_eq!(repo.tags().unwrap().len(), 2);
    }

    #[test]
    fn test_conflict_is_surfaced() {
        let mut repo = MockRepository::linear(3);
        repo.add_tag("v1.2", mock_oid(1));
        repo.add_tag("release-1.2", mock_oid(3));

        let err = resolve_version(&repo).unwrap_err();
        assert!(matches!(err, PrepareError::TagConflict { .. }));
        assert!(err.is_fatal_for_versioning());
    }

    #[test]
    fn test_works_through_trait_object() {
        let repo: Box<dyn Repository> = Box::new(MockRepository::linear(1));
        assert_eq!(resolve_version(repo.as_ref()).unwrap().as_str(), "v0.0");
    }
}
