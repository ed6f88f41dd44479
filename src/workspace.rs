//! Layout of a prepared build directory and recipe-side preparation.

use chrono::{DateTime, Utc};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{PrepareError, Result};
use crate::git::Git2Repository;
use crate::metadata;
use crate::warning::PrepareWarning;

pub const RECIPE_DIR: &str = "recipe";
pub const ENV_DIR: &str = "conda-env";
pub const REPOS_DIR: &str = "git-repos";

const DATE_NUM_FORMAT: &str = "%Y%m%d%H%M%S";
const DATE_STR_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Directories of a prepared build directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub root: PathBuf,
    pub recipe_dir: PathBuf,
    pub env_dir: PathBuf,
    pub repos_dir: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Workspace {
            recipe_dir: root.join(RECIPE_DIR),
            env_dir: root.join(ENV_DIR),
            repos_dir: root.join(REPOS_DIR),
            root,
        }
    }

    /// Create the workspace root; it must not exist yet.
    ///
    /// The recipe and environment directories are left for the steps that
    /// fill them.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if root.exists() {
            return Err(PrepareError::config(format!(
                "'{}' already exists",
                root.display()
            )));
        }

        fs::create_dir_all(&root)?;
        let workspace = Workspace::new(root.canonicalize()?);
        fs::create_dir(&workspace.repos_dir)?;

        Ok(workspace)
    }
}

/// Recursively copy `from` into a new directory `to`.
///
/// Symbolic links are followed, so linked directories are copied as
/// directories.
pub fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from).follow_links(true) {
        let entry = entry.map_err(|e| PrepareError::recipe(e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| PrepareError::recipe(e.to_string()))?;
        let destination = to.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&destination)?;
        } else {
            fs::copy(entry.path(), &destination)?;
        }
    }

    Ok(())
}

/// `DATE_NUM` and `DATE_STR` values for a commit time
pub fn date_vars(time: DateTime<Utc>) -> (String, String) {
    (
        time.format(DATE_NUM_FORMAT).to_string(),
        time.format(DATE_STR_FORMAT).to_string(),
    )
}

/// Export `DATE_NUM`/`DATE_STR` from the HEAD commit of the repository
/// holding `package_dir`, unless both are already set.
pub fn set_date_env_vars(package_dir: &Path) -> Option<PrepareWarning> {
    if env::var_os("DATE_NUM").is_some() && env::var_os("DATE_STR").is_some() {
        debug!("DATE_NUM and DATE_STR already set");
        return None;
    }

    let time = Git2Repository::open(package_dir).and_then(|repo| repo.head_time());
    match time {
        Ok(time) => {
            let (date_num, date_str) = date_vars(time);
            info!("setting DATE_NUM={} DATE_STR={}", date_num, date_str);
            env::set_var("DATE_NUM", date_num);
            env::set_var("DATE_STR", date_str);
            None
        }
        Err(e) => Some(PrepareWarning::DateVarsUnavailable {
            reason: e.to_string(),
        }),
    }
}

/// Name of the prescript for a toolchain architecture
pub fn prescript_name(toolchain_arch: Option<&str>) -> String {
    format!("prescript.{}.sh", toolchain_arch.unwrap_or(""))
}

/// Run the recipe's prescript with `bash` inside `recipe_dir`.
///
/// Returns whether a prescript was found.
pub fn run_prescript(recipe_dir: &Path, toolchain_arch: Option<&str>) -> Result<bool> {
    let name = prescript_name(toolchain_arch);
    if !recipe_dir.join(&name).exists() {
        debug!("no {} in the recipe", name);
        return Ok(false);
    }

    info!("running {}", name);
    let status = Command::new("bash")
        .arg(&name)
        .current_dir(recipe_dir)
        .status()
        .map_err(|e| PrepareError::tool(format!("Cannot run bash: {}", e)))?;

    if !status.success() {
        return Err(PrepareError::recipe(format!("{} failed: {}", name, status)));
    }

    Ok(true)
}

/// Copy the package directory into the workspace, run its prescript and
/// write `recipe_append.yaml`.
pub fn prepare_recipe_dir(package_dir: &Path, workspace: &Workspace) -> Result<Option<PrepareWarning>> {
    let warning = set_date_env_vars(package_dir);

    copy_dir(package_dir, &workspace.recipe_dir)?;

    let toolchain_arch = env::var("TOOLCHAIN_ARCH").ok();
    run_prescript(&workspace.recipe_dir, toolchain_arch.as_deref())?;

    metadata::write_recipe_append(package_dir, &workspace.recipe_dir)?;

    Ok(warning)
}
