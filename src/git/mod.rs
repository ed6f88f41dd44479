//! Git operations abstraction layer
//!
//! This module provides a trait-based abstraction over the handful of git
//! operations the tag normalization pipeline needs, so that every side effect
//! on a repository's tag store goes through one narrow interface.
//!
//! # Overview
//!
//! The primary abstraction is the [Repository] trait. The concrete
//! implementations include:
//!
//! - [repository::Git2Repository]: A real implementation using the `git2` crate
//! - [mock::MockRepository]: An in-memory commit graph for testing
//!
//! # Usage
//!
//! ```rust
//! # use conda_build_prepare::git::Repository;
//! # fn example<R: Repository>(repo: &R) -> Result<(), Box<dyn std::error::Error>> {
//! let head = repo.current_commit()?;
//! for tag in repo.list_tags()? {
//!     println!("{} -> {} (recency {:?})", tag.name, tag.target, tag.recency);
//! }
//! # let _ = head;
//! # Ok(())
//! # }
//! ```

pub mod mock;
pub mod repository;

pub use mock::MockRepository;
pub use repository::Git2Repository;

use crate::domain::{Descriptor, TagRef};
use crate::error::Result;
use git2::Oid;

/// Git operations consumed by the tag normalization pipeline
///
/// ## Thread Safety
///
/// Implementors must be `Send` so that separate repositories can be prepared
/// on separate threads. A single repository is never shared between threads.
///
/// ## Error Handling
///
/// All methods return [crate::error::Result<T>]. Implementations map missing
/// or unreadable history to [crate::error::PrepareError::RepositoryState] and
/// an already-taken tag name to [crate::error::PrepareError::TagConflict].
pub trait Repository: Send {
    /// Get every tag in the repository
    ///
    /// Each entry carries the commit the tag resolves to and its recency
    /// relative to the current commit (see [TagRef::recency]).
    fn list_tags(&self) -> Result<Vec<TagRef>>;

    /// Find a tag by name and get the commit it points at
    ///
    /// # Returns
    /// * `Ok(Some(Oid))` - Commit the tag resolves to
    /// * `Ok(None)` - If the tag doesn't exist
    fn find_tag(&self, name: &str) -> Result<Option<Oid>>;

    /// Create a tag pointing at the given commit
    ///
    /// # Returns
    /// * `Ok(())` - Success
    /// * `Err(TagConflict)` - If a tag with this name already exists
    fn create_tag(&self, name: &str, commit: Oid) -> Result<()>;

    /// Find the oldest commit reachable from the current commit
    ///
    /// Walks the full history down to the root commit. Fails with
    /// `RepositoryState` when the history is shallow or empty.
    fn find_oldest_commit(&self) -> Result<Oid>;

    /// Describe `commit` relative to the tag named `anchor`
    ///
    /// # Returns
    /// * `Descriptor::Exact` - If `commit` is the tagged commit
    /// * `Descriptor::Ahead` - Distance and abbreviated id otherwise
    fn describe(&self, commit: Oid, anchor: &str) -> Result<Descriptor>;

    /// Get the currently checked-out commit
    fn current_commit(&self) -> Result<Oid>;

    /// Resolve a revision (commit id, abbreviated id, tag or branch) to a commit
    fn resolve_commit(&self, revision: &str) -> Result<Oid>;
}
