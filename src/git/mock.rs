use crate::domain::{Descriptor, TagRef};
use crate::error::{PrepareError, Result};
use crate::git::Repository;
use git2::Oid;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// Mock repository for testing without actual git operations
///
/// Holds a commit graph in memory. Commits are expected to be added parents
/// first; insertion order doubles as commit time.
pub struct MockRepository {
    parents: HashMap<Oid, Vec<Oid>>,
    order: Vec<Oid>,
    tags: Mutex<BTreeMap<String, Oid>>,
    head: Option<Oid>,
    shallow: bool,
}

impl MockRepository {
    /// Create a new empty mock repository
    pub fn new() -> Self {
        MockRepository {
            parents: HashMap::new(),
            order: Vec::new(),
            tags: Mutex::new(BTreeMap::new()),
            head: None,
            shallow: false,
        }
    }

    /// Build a linear history of `count` commits and check out the last one.
    ///
    /// Commit ids are `[1; 20]`, `[2; 20]`, ... in order.
    pub fn linear(count: u8) -> Self {
        let mut repo = MockRepository::new();
        let mut previous = None;

        for n in 1..=count {
            let oid = mock_oid(n);
            let parents: Vec<Oid> = previous.into_iter().collect();
            repo.add_commit(oid, &parents);
            previous = Some(oid);
        }
        if let Some(head) = previous {
            repo.set_head(head);
        }

        repo
    }

    /// Add a commit to the mock repository
    pub fn add_commit(&mut self, oid: Oid, parents: &[Oid]) {
        if self.parents.insert(oid, parents.to_vec()).is_none() {
            self.order.push(oid);
        }
    }

    /// Add a tag pointing to an OID, replacing any tag of the same name
    pub fn add_tag(&mut self, name: impl Into<String>, oid: Oid) {
        self.tags
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name.into(), oid);
    }

    /// Check out a commit
    pub fn set_head(&mut self, oid: Oid) {
        self.head = Some(oid);
    }

    /// Pretend the history was fetched with a limited depth
    pub fn set_shallow(&mut self, shallow: bool) {
        self.shallow = shallow;
    }

    /// Snapshot of all tags
    pub fn tags(&self) -> Result<BTreeMap<String, Oid>> {
        Ok(self.tag_store()?.clone())
    }

    fn tag_store(&self) -> Result<MutexGuard<'_, BTreeMap<String, Oid>>> {
        self.tags
            .lock()
            .map_err(|_| PrepareError::repository_state("Mock tag store is poisoned"))
    }

    fn head(&self) -> Result<Oid> {
        self.head
            .ok_or_else(|| PrepareError::repository_state("HEAD does not point at any commit yet"))
    }

    fn reachable_from(&self, start: Oid) -> HashSet<Oid> {
        let mut seen = HashSet::new();
        let mut pending = vec![start];

        while let Some(oid) = pending.pop() {
            if seen.insert(oid) {
                if let Some(parents) = self.parents.get(&oid) {
                    pending.extend(parents.iter().copied());
                }
            }
        }

        seen
    }

    /// Commits reachable from HEAD, newest first
    fn history(&self) -> Result<Vec<Oid>> {
        let reachable = self.reachable_from(self.head()?);

        Ok(self
            .order
            .iter()
            .rev()
            .filter(|oid| reachable.contains(oid))
            .copied()
            .collect())
    }
}

impl Default for MockRepository {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic commit id for tests: twenty copies of `n`
pub fn mock_oid(n: u8) -> Oid {
    Oid::from_bytes(&[n; 20]).unwrap_or_else(|_| Oid::zero())
}

impl Repository for MockRepository {
    fn list_tags(&self) -> Result<Vec<TagRef>> {
        let history = self.history()?;
        let tags = self.tag_store()?;

        Ok(tags
            .iter()
            .map(|(name, &target)| {
                let recency = history.iter().position(|&oid| oid == target);
                TagRef::new(name.clone(), target, recency)
            })
            .collect())
    }

    fn find_tag(&self, name: &str) -> Result<Option<Oid>> {
        Ok(self.tag_store()?.get(name).copied())
    }

    fn create_tag(&self, name: &str, commit: Oid) -> Result<()> {
        let mut tags = self.tag_store()?;

        if let Some(&existing) = tags.get(name) {
            return Err(PrepareError::TagConflict {
                tag: name.to_string(),
                existing,
                requested: commit,
            });
        }
        if !self.parents.contains_key(&commit) {
            return Err(PrepareError::repository_state(format!(
                "Cannot find commit: {}",
                commit
            )));
        }

        tags.insert(name.to_string(), commit);
        Ok(())
    }

    fn find_oldest_commit(&self) -> Result<Oid> {
        if self.shallow {
            return Err(PrepareError::repository_state(
                "Repository is a shallow clone; the root commit is not available",
            ));
        }

        self.history()?
            .into_iter()
            .rev()
            .find(|oid| self.parents.get(oid).map_or(true, Vec::is_empty))
            .ok_or_else(|| PrepareError::repository_state("No root commit reachable from HEAD"))
    }

    fn describe(&self, commit: Oid, anchor: &str) -> Result<Descriptor> {
        let tagged = self.find_tag(anchor)?.ok_or_else(|| {
            PrepareError::no_canonical_tag(format!("Tag '{}' does not exist", anchor))
        })?;

        if tagged == commit {
            return Ok(Descriptor::Exact {
                tag: anchor.to_string(),
            });
        }

        let hidden = self.reachable_from(tagged);
        let distance = self
            .reachable_from(commit)
            .difference(&hidden)
            .count();

        Ok(Descriptor::Ahead {
            tag: anchor.to_string(),
            distance,
            short_id: commit.to_string()[..7].to_string(),
        })
    }

    fn current_commit(&self) -> Result<Oid> {
        self.head()
    }

    fn resolve_commit(&self, revision: &str) -> Result<Oid> {
        if let Some(oid) = self.find_tag(revision)? {
            return Ok(oid);
        }

        self.order
            .iter()
            .find(|oid| oid.to_string().starts_with(revision) && !revision.is_empty())
            .copied()
            .ok_or_else(|| {
                PrepareError::Git(git2::Error::from_str(&format!(
                    "revspec '{}' not found",
                    revision
                )))
            })
    }
}
