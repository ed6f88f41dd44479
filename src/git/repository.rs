use crate::domain::{Descriptor, TagRef};
use crate::error::{PrepareError, Result};
use chrono::{DateTime, TimeZone, Utc};
use git2::build::CheckoutBuilder;
use git2::{
    Commit, DescribeFormatOptions, DescribeOptions, ErrorCode, ObjectType, Oid, Repository as Git2Repo, Revwalk,
    Signature, Sort,
};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Identity recorded on annotated tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tagger {
    pub name: String,
    pub email: String,
}

/// Wrapper around git2::Repository with our trait interface
pub struct Git2Repository {
    repo: Git2Repo,
    tagger: Option<Tagger>,
}

impl Git2Repository {
    /// Open or discover a git repository
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let repo = Git2Repo::discover(path)?;

        Ok(Git2Repository { repo, tagger: None })
    }

    /// Clone `url` into `path`
    pub fn clone_from<P: AsRef<Path>>(url: &str, path: P) -> Result<Self> {
        let repo = Git2Repo::clone(url, path.as_ref()).map_err(|e| {
            PrepareError::source(format!(
                "Cannot clone '{}' into '{}': {}",
                url,
                path.as_ref().display(),
                e
            ))
        })?;

        Ok(Git2Repository { repo, tagger: None })
    }

    /// Create annotated tags signed by `tagger` instead of lightweight ones
    pub fn with_tagger(mut self, tagger: Tagger) -> Self {
        self.tagger = Some(tagger);
        self
    }

    /// Check out `revision` with a detached HEAD
    pub fn checkout(&self, revision: &str) -> Result<()> {
        let object = self.repo.revparse_single(revision).map_err(|e| {
            PrepareError::source(format!("Cannot find revision '{}': {}", revision, e))
        })?;
        let commit = object.peel_to_commit()?;

        self.repo
            .checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))?;
        self.repo.set_head_detached(commit.id())?;

        Ok(())
    }

    /// Commit time of HEAD in UTC
    pub fn head_time(&self) -> Result<DateTime<Utc>> {
        let seconds = self.head_commit()?.time().seconds();

        Utc.timestamp_opt(seconds, 0).single().ok_or_else(|| {
            PrepareError::repository_state(format!("HEAD has an invalid commit time: {}", seconds))
        })
    }

    /// URL of the remote called `name`
    pub fn remote_url(&self, name: &str) -> Result<String> {
        let remote = self.repo.find_remote(name)?;
        remote
            .url()
            .map(str::to_string)
            .ok_or_else(|| PrepareError::repository_state(format!("Remote '{}' has no UTF-8 URL", name)))
    }

    /// Short name of the checked-out branch, `HEAD` when detached
    pub fn head_branch(&self) -> Result<String> {
        let head = self.repo.head()?;
        head.shorthand()
            .map(str::to_string)
            .ok_or_else(|| PrepareError::repository_state("HEAD name is not UTF-8"))
    }

    /// `git describe --long` of HEAD against annotated tags
    pub fn describe_head_long(&self) -> Result<String> {
        let describe = self.repo.describe(&DescribeOptions::new())?;
        let mut format = DescribeFormatOptions::new();
        format.always_use_long_format(true);

        Ok(describe.format(Some(&format))?)
    }

    fn head_commit(&self) -> Result<Commit<'_>> {
        let head = self.repo.head().map_err(|e| match e.code() {
            ErrorCode::UnbornBranch | ErrorCode::NotFound => {
                PrepareError::repository_state("HEAD does not point at any commit yet")
            }
            _ => PrepareError::repository_state(format!("Cannot read HEAD: {}", e)),
        })?;

        head.peel_to_commit()
            .map_err(|e| PrepareError::repository_state(format!("HEAD is not a commit: {}", e)))
    }

    /// Topological, newest-first walk from the current commit
    fn history(&self) -> Result<Revwalk<'_>> {
        let head = self.head_commit()?.id();

        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        revwalk.push(head)?;

        Ok(revwalk)
    }

    fn peel_tag(&self, name: &str) -> Result<Option<Oid>> {
        let reference_name = format!("refs/tags/{}", name);

        match self.repo.find_reference(&reference_name) {
            Ok(reference) => match reference.peel_to_commit() {
                Ok(commit) => Ok(Some(commit.id())),
                Err(e) => {
                    debug!("tag '{}' does not point at a commit: {}", name, e);
                    Ok(None)
                }
            },
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(PrepareError::repository_state(format!(
                "Cannot read tag '{}': {}",
                name, e
            ))),
        }
    }
}

fn unreadable_history(e: git2::Error) -> PrepareError {
    PrepareError::repository_state(format!("Cannot walk history: {}", e))
}

impl super::Repository for Git2Repository {
    fn list_tags(&self) -> Result<Vec<TagRef>> {
        let mut positions = HashMap::new();
        for (position, oid) in self.history()?.enumerate() {
            positions.insert(oid.map_err(unreadable_history)?, position);
        }

        let names = self.repo.tag_names(None)?;
        let mut tags = Vec::new();

        for name in names.iter().flatten() {
            if let Some(target) = self.peel_tag(name)? {
                tags.push(TagRef::new(name, target, positions.get(&target).copied()));
            }
        }

        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    fn find_tag(&self, name: &str) -> Result<Option<Oid>> {
        self.peel_tag(name)
    }

    fn create_tag(&self, name: &str, commit: Oid) -> Result<()> {
        if let Some(existing) = self.peel_tag(name)? {
            return Err(PrepareError::TagConflict {
                tag: name.to_string(),
                existing,
                requested: commit,
            });
        }

        let object = self
            .repo
            .find_object(commit, Some(ObjectType::Commit))
            .map_err(|e| PrepareError::repository_state(format!("Cannot find commit: {}", e)))?;

        let created = match &self.tagger {
            Some(tagger) => {
                let signature = Signature::now(&tagger.name, &tagger.email)?;
                self.repo.tag(name, &object, &signature, name, false)
            }
            None => self.repo.tag_lightweight(name, &object, false),
        };

        created.map_err(|e| {
            if e.code() == ErrorCode::Exists {
                // The name is taken by a tag that does not resolve to a commit
                PrepareError::TagConflict {
                    tag: name.to_string(),
                    existing: Oid::zero(),
                    requested: commit,
                }
            } else {
                PrepareError::Git(e)
            }
        })?;

        Ok(())
    }

    fn find_oldest_commit(&self) -> Result<Oid> {
        if self.repo.is_shallow() {
            return Err(PrepareError::repository_state(
                "Repository is a shallow clone; the root commit is not available",
            ));
        }

        let mut roots = Vec::new();
        for oid in self.history()? {
            let oid = oid.map_err(unreadable_history)?;
            let commit = self.repo.find_commit(oid).map_err(unreadable_history)?;

            if commit.parent_count() == 0 {
                roots.push((commit.time().seconds(), oid));
            }
        }

        roots
            .into_iter()
            .min()
            .map(|(_, oid)| oid)
            .ok_or_else(|| PrepareError::repository_state("No root commit reachable from HEAD"))
    }

    fn describe(&self, commit: Oid, anchor: &str) -> Result<Descriptor> {
        let tagged = self.peel_tag(anchor)?.ok_or_else(|| {
            PrepareError::no_canonical_tag(format!("Tag '{}' does not exist", anchor))
        })?;

        if tagged == commit {
            return Ok(Descriptor::Exact {
                tag: anchor.to_string(),
            });
        }

        let mut revwalk = self.repo.revwalk()?;
        revwalk.push(commit)?;
        revwalk.hide(tagged)?;

        let mut distance = 0;
        for oid in revwalk {
            oid.map_err(unreadable_history)?;
            distance += 1;
        }

        let short_id = self.repo.find_object(commit, None)?.short_id()?;
        let short_id = short_id
            .as_str()
            .ok_or_else(|| PrepareError::repository_state("Abbreviated commit id is not UTF-8"))?
            .to_string();

        Ok(Descriptor::Ahead {
            tag: anchor.to_string(),
            distance,
            short_id,
        })
    }

    fn current_commit(&self) -> Result<Oid> {
        Ok(self.head_commit()?.id())
    }

    fn resolve_commit(&self, revision: &str) -> Result<Oid> {
        let object = self.repo.revparse_single(revision)?;
        Ok(object.peel_to_commit()?.id())
    }
}
