//! Domain logic - pure types independent of git operations

pub mod descriptor;
pub mod tag;
pub mod version_spec;

pub use descriptor::{Descriptor, VersionString};
pub use tag::{CanonicalTag, TagRef, BASELINE_TAG};
pub use version_spec::VersionSpec;
