//! Local clones of a recipe's git sources.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

use crate::error::{PrepareError, Result};
use crate::git::{Git2Repository, Repository};
use crate::recipe::GitSource;
use crate::warning::PrepareWarning;

static GITHUB_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"github\.com[:/](?P<user>[^/\n]+)(/(?P<repo>[^/.].*?))?(\.git|/|$)")
        .expect("Invalid GitHub URL regex")
});
static RELATIVE_SUBMODULE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"url\s*=\s*\.\./(\S+)").expect("Invalid submodule regex"));

/// A git source cloned into the workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedSource {
    pub source: GitSource,
    /// Absolute path of the clone
    pub path: PathBuf,
}

/// GitHub repository name of a repository URL
pub fn github_repo(url: &str) -> Option<&str> {
    GITHUB_REGEX
        .captures(url)
        .and_then(|captures| captures.name("repo"))
        .map(|m| m.as_str())
}

/// Directory name for a clone of `url`.
///
/// The GitHub repository name when available, otherwise the last path
/// segment without a `.git` suffix.
pub fn clone_dir_name(url: &str) -> Option<String> {
    if let Some(repo) = github_repo(url) {
        return Some(repo.to_string());
    }

    let last = url.trim_end_matches('/').rsplit(['/', ':']).next()?;
    let name = last.strip_suffix(".git").unwrap_or(last);

    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Submodule paths declared relative to the parent (`url = ../name`)
pub fn relative_submodules(gitmodules: &str) -> Vec<String> {
    RELATIVE_SUBMODULE_REGEX
        .captures_iter(gitmodules)
        .map(|captures| captures[1].to_string())
        .collect()
}

/// URL of a relative submodule, resolved against the parent repository URL
/// the same way a browser resolves a relative link.
pub fn submodule_url(parent_url: &str, relative: &str) -> Result<String> {
    match Url::parse(parent_url) {
        Ok(base) => base
            .join(relative)
            .map(String::from)
            .map_err(|e| {
                PrepareError::source(format!(
                    "Cannot resolve '{}' against '{}': {}",
                    relative, parent_url, e
                ))
            }),
        // scp-like remotes (git@host:org/repo.git) are not URLs
        Err(_) => match parent_url.rsplit_once('/') {
            Some((base, _)) => Ok(format!("{}/{}", base, relative)),
            None => match parent_url.rsplit_once(':') {
                Some((host, _)) => Ok(format!("{}:{}", host, relative)),
                None => Err(PrepareError::source(format!(
                    "Cannot resolve '{}' against '{}'",
                    relative, parent_url
                ))),
            },
        },
    }
}

/// Clone a source into `repos_dir`, check out its revision and clone its
/// relative submodules next to it.
pub fn prepare_source(repos_dir: &Path, source: &GitSource) -> Result<PreparedSource> {
    let name = clone_dir_name(&source.url).ok_or_else(|| {
        PrepareError::source(format!("Cannot derive a directory name from '{}'", source.url))
    })?;
    let path = repos_dir.join(&name);
    if path.exists() {
        return Err(PrepareError::source(format!(
            "'{}' already exists",
            path.display()
        )));
    }

    info!("cloning {} into {}", source.url, path.display());
    let repo = Git2Repository::clone_from(&source.url, &path)?;

    if let Some(rev) = &source.rev {
        debug!("checking out {}", rev);
        repo.checkout(rev)?;
    }

    clone_relative_submodules(&path, &source.url)?;

    Ok(PreparedSource {
        source: source.clone(),
        path: path.canonicalize()?,
    })
}

fn clone_relative_submodules(repo_path: &Path, repo_url: &str) -> Result<()> {
    let gitmodules = repo_path.join(".gitmodules");
    if !gitmodules.exists() {
        return Ok(());
    }

    let parent = repo_path.parent().ok_or_else(|| {
        PrepareError::source(format!("'{}' has no parent directory", repo_path.display()))
    })?;

    for relative in relative_submodules(&fs::read_to_string(&gitmodules)?) {
        // the submodule's own name keeps any .git suffix so its path matches
        let destination = parent.join(&relative);
        if destination.exists() {
            debug!("submodule {} already cloned", relative);
            continue;
        }

        let url = submodule_url(repo_url, &relative)?;
        info!("cloning relative submodule {} into {}", url, destination.display());
        Git2Repository::clone_from(&url, &destination)?;
    }

    Ok(())
}

/// One `<tag> <revision>` line of `extra.tags`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraTag {
    pub name: String,
    pub revision: String,
}

/// Parse `extra.tags`; blank lines are skipped, malformed ones reported.
pub fn parse_extra_tags(contents: &str) -> Vec<std::result::Result<ExtraTag, PrepareWarning>> {
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                [name, revision] => Ok(ExtraTag {
                    name: name.to_string(),
                    revision: revision.to_string(),
                }),
                _ => Err(PrepareWarning::MalformedExtraTag {
                    line: line.to_string(),
                }),
            }
        })
        .collect()
}

/// Add the tags listed in `extra.tags`.
///
/// Existing tags are never moved; a name already in use is reported like any
/// other failed line.
pub fn apply_extra_tags<R: Repository + ?Sized>(repo: &R, contents: &str) -> Vec<PrepareWarning> {
    let mut warnings = Vec::new();

    for entry in parse_extra_tags(contents) {
        let tag = match entry {
            Ok(tag) => tag,
            Err(warning) => {
                warnings.push(warning);
                continue;
            }
        };

        let applied = repo
            .resolve_commit(&tag.revision)
            .and_then(|commit| repo.create_tag(&tag.name, commit));

        match applied {
            Ok(()) => info!("added extra tag '{}' at {}", tag.name, tag.revision),
            Err(e) => warnings.push(PrepareWarning::ExtraTagFailed {
                line: format!("{} {}", tag.name, tag.revision),
                reason: e.to_string(),
            }),
        }
    }

    warnings
}
