use crate::domain::CanonicalTag;
use crate::error::{PrepareError, Result};
use crate::git::Repository;
use crate::tagging::selector::Baseline;
use tracing::{debug, info};

/// What the rewriter did to the repository's tag store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// A new canonical tag was written
    Created(CanonicalTag),
    /// The canonical tag already pointed at the right commit
    AlreadyPresent(CanonicalTag),
}

impl RewriteOutcome {
    pub fn canonical(&self) -> &CanonicalTag {
        match self {
            RewriteOutcome::Created(tag) | RewriteOutcome::AlreadyPresent(tag) => tag,
        }
    }

    pub fn created(&self) -> bool {
        matches!(self, RewriteOutcome::Created(_))
    }
}

/// Guarantee the canonical baseline tag exists.
///
/// With a baseline, the canonical tag is placed on the baseline's commit; the
/// original tag is left alone. Without one, `v0.0` is placed on the oldest
/// commit reachable from the current commit.
///
/// # Returns
/// * `Ok(RewriteOutcome)` - The canonical tag and whether it was created
/// * `Err(TagConflict)` - If the canonical name is taken by another commit
/// * `Err(RepositoryState)` - If the root commit cannot be found
pub fn rewrite_tags<R: Repository + ?Sized>(
    repo: &R,
    baseline: Option<&Baseline>,
) -> Result<RewriteOutcome> {
    let canonical = match baseline {
        Some(baseline) => {
            debug!(
                "canonicalizing '{}' as '{}'",
                baseline.tag.name,
                baseline.spec.canonical_name()
            );
            CanonicalTag::for_spec(&baseline.spec, baseline.tag.target)
        }
        None => {
            debug!("no version tag reachable, creating a baseline on the root commit");
            CanonicalTag::baseline(repo.find_oldest_commit()?)
        }
    };

    ensure_tag(repo, canonical)
}

fn ensure_tag<R: Repository + ?Sized>(repo: &R, canonical: CanonicalTag) -> Result<RewriteOutcome> {
    match repo.find_tag(&canonical.name)? {
        Some(existing) if existing == canonical.target => {
            debug!("tag '{}' already in place", canonical.name);
            Ok(RewriteOutcome::AlreadyPresent(canonical))
        }
        Some(existing) => Err(PrepareError::TagConflict {
            tag: canonical.name,
            existing,
            requested: canonical.target,
        }),
        None => {
            repo.create_tag(&canonical.name, canonical.target)?;
            info!("tagged {} as '{}'", canonical.target, canonical.name);
            Ok(RewriteOutcome::Created(canonical))
        }
    }
}
