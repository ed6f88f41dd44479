use crate::domain::{TagRef, VersionSpec};
use std::cmp::Ordering;
use tracing::{debug, trace};

/// The existing tag chosen to anchor version computation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Baseline {
    pub tag: TagRef,
    pub spec: VersionSpec,
}

/// Pick the baseline tag among all tags of a repository.
///
/// Only tags whose name holds a version and whose commit is reachable from
/// the current commit qualify. The order is total:
/// 1. smallest recency (closest to the current commit)
/// 2. higher version
/// 3. lexicographically smaller name
///
/// Returns `None` when nothing qualifies.
pub fn select_baseline(tags: &[TagRef]) -> Option<Baseline> {
    tags.iter()
        .filter_map(|tag| {
            let spec = match tag.version_spec() {
                Some(spec) => spec,
                None => {
                    trace!("tag '{}' holds no version", tag.name);
                    return None;
                }
            };
            if tag.recency.is_none() {
                debug!("tag '{}' is not reachable from the current commit", tag.name);
                return None;
            }
            Some(Baseline {
                tag: tag.clone(),
                spec,
            })
        })
        .min_by(compare_candidates)
}

fn compare_candidates(a: &Baseline, b: &Baseline) -> Ordering {
    a.tag
        .recency
        .cmp(&b.tag.recency)
        .then_with(|| b.spec.cmp(&a.spec))
        .then_with(|| a.tag.name.cmp(&b.tag.name))
}
