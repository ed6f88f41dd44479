use crate::domain::{CanonicalTag, VersionString};
use crate::error::{PrepareError, Result};
use crate::git::Repository;
use tracing::debug;

/// Derive the package version from the current commit's position relative
/// to the canonical tag.
///
/// Must run after [crate::tagging::rewriter::rewrite_tags]; a canonical tag
/// that is missing or points elsewhere fails with `NoCanonicalTag`.
pub fn resolve<R: Repository + ?Sized>(repo: &R, canonical: &CanonicalTag) -> Result<VersionString> {
    match repo.find_tag(&canonical.name)? {
        Some(target) if target == canonical.target => {}
        Some(target) => {
            return Err(PrepareError::no_canonical_tag(format!(
                "'{}' points at {} instead of {}",
                canonical.name, target, canonical.target
            )));
        }
        None => {
            return Err(PrepareError::no_canonical_tag(format!(
                "'{}' must be created before resolving the version",
                canonical.name
            )));
        }
    }

    let head = repo.current_commit()?;
    let descriptor = repo.describe(head, &canonical.name)?;
    debug!("described {} as '{}'", head, descriptor);

    Ok(VersionString::from_descriptor(&descriptor))
}
