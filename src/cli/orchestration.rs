//! Main workflow orchestration logic
//!
//! Keeps the preparation steps out of main.rs so the workflow can be driven
//! programmatically without depending on clap.

use std::path::{Path, PathBuf};
use tracing::info;

use crate::conda::{self, CondaCli};
use crate::config::Config;
use crate::error::{PrepareError, Result};
use crate::git::repository::Tagger;
use crate::git::Git2Repository;
use crate::recipe::{self, Recipe};
use crate::render;
use crate::sources::{self, PreparedSource};
use crate::tagging::{self, Normalization};
use crate::warning::PrepareWarning;
use crate::workspace::{self, Workspace};

/// Arguments for the prepare workflow
///
/// Mirrors the CLI Args in a form suitable for orchestration logic.
#[derive(Debug, Clone, PartialEq)]
pub struct PrepareWorkflowArgs {
    /// Package recipe directory
    pub package_dir: PathBuf,

    /// Build directory to create
    pub directory: PathBuf,

    /// Channels to put on top of the environment's channel list
    pub channels: Vec<String>,
}

/// Result of a successful prepare workflow
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowResult {
    pub workspace: Workspace,

    /// Version stamp of the first git source, if the recipe has one
    pub normalization: Option<Normalization>,

    /// Non-fatal issues met on the way
    pub warnings: Vec<PrepareWarning>,
}

/// Result of preparing a recipe's git sources
#[derive(Debug, Clone, PartialEq)]
pub struct SourcesResult {
    pub sources: Vec<PreparedSource>,
    pub normalization: Option<Normalization>,
    pub warnings: Vec<PrepareWarning>,
}

/// Main prepare workflow
///
/// 1. Create the build directory
/// 2. Copy the recipe, run its prescript and record its origin
/// 3. Create and configure the build environment
/// 4. Clone the git sources and stamp the package version
/// 5. Render the recipe and embed its `script_env` in the environment
///
/// # Arguments
///
/// * `args` - Workflow arguments (package directory, build directory, channels)
/// * `config` - Tool configuration
pub fn run_prepare_workflow(args: &PrepareWorkflowArgs, config: &Config) -> Result<WorkflowResult> {
    if !args.package_dir.is_dir() {
        return Err(PrepareError::config(format!(
            "'{}' is not a directory",
            args.package_dir.display()
        )));
    }

    let workspace = Workspace::create(&args.directory)?;
    let mut warnings = Vec::new();

    info!("preparing recipe in {}", workspace.recipe_dir.display());
    warnings.extend(workspace::prepare_recipe_dir(&args.package_dir, &workspace)?);

    let conda = CondaCli::new(&config.conda);
    conda::prepare_environment(&conda, &workspace, &config.environment, &args.channels)?;

    let recipe = Recipe::new(&workspace.recipe_dir);
    let original_manifest = recipe.read_manifest()?;
    let prepared = prepare_sources(&recipe, &workspace.repos_dir, &Tagger::from(&config.tagger))?;
    warnings.extend(prepared.warnings);

    warnings.extend(render::render_recipe(&conda, &workspace, &original_manifest)?);

    Ok(WorkflowResult {
        workspace,
        normalization: prepared.normalization,
        warnings,
    })
}

/// Clone the recipe's git sources into `repos_dir`, point the manifest at
/// the clones and stamp the version of the first one.
pub fn prepare_sources(recipe: &Recipe, repos_dir: &Path, tagger: &Tagger) -> Result<SourcesResult> {
    let mut manifest = recipe.read_manifest()?;
    let entries = recipe::source_entries(&manifest);
    let git_sources: Vec<_> = entries.iter().filter_map(|e| e.git.clone()).collect();

    let skipped = if git_sources.is_empty() {
        Some(PrepareWarning::NoGitSources)
    } else if entries[0].git.is_none() {
        Some(PrepareWarning::FirstSourceNotGit)
    } else {
        None
    };
    if let Some(warning) = skipped {
        return Ok(SourcesResult {
            sources: Vec::new(),
            normalization: None,
            warnings: vec![warning],
        });
    }

    let mut warnings = Vec::new();

    let mut prepared = Vec::new();
    for source in &git_sources {
        let clone = sources::prepare_source(repos_dir, source)?;
        manifest = recipe::set_git_url(&manifest, &source.url, &clone.path);
        prepared.push(clone);
    }

    let first = &prepared[0];
    let repo = Git2Repository::open(&first.path)?.with_tagger(tagger.clone());

    if let Some(extra_tags) = recipe.read_extra_tags()? {
        warnings.extend(sources::apply_extra_tags(&repo, &extra_tags));
    }

    let normalization = tagging::normalize(&repo)?;
    info!(
        "{} resolves to version {}",
        first.source.url, normalization.version
    );
    manifest = recipe::set_version(&manifest, normalization.version.as_str());
    recipe.write_manifest(&manifest)?;

    Ok(SourcesResult {
        sources: prepared,
        normalization: Some(normalization),
        warnings,
    })
}

/// Undo the configuration changes recorded by earlier runs
pub fn run_restore() -> Result<Vec<PrepareWarning>> {
    conda::restore_config_files(&conda::record_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_package_dir() {
        let temp_dir = TempDir::new().unwrap();
        let args = PrepareWorkflowArgs {
            package_dir: temp_dir.path().join("missing"),
            directory: temp_dir.path().join("out"),
            channels: Vec::new(),
        };

        let err = run_prepare_workflow(&args, &Config::default()).unwrap_err();
        assert!(matches!(err, PrepareError::Config(_)));
        assert!(!args.directory.exists());
    }

    #[test]
    fn test_existing_build_dir_is_refused() {
        let temp_dir = TempDir::new().unwrap();
        let package_dir = temp_dir.path().join("pkg");
        fs::create_dir(&package_dir).unwrap();

        let args = PrepareWorkflowArgs {
            package_dir,
            directory: temp_dir.path().to_path_buf(),
            channels: Vec::new(),
        };

        assert!(run_prepare_workflow(&args, &Config::default()).is_err());
    }

    #[test]
    fn test_recipe_without_git_sources() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("meta.yaml"),
            "package:\n  version: 1.0\nsource:\n  url: https://example.com/a.tar.gz\n",
        )
        .unwrap();

        let recipe = Recipe::new(temp_dir.path());
        let tagger = Tagger {
            name: "test".to_string(),
            email: "test@example.com".to_string(),
        };
        let result = prepare_sources(&recipe, temp_dir.path(), &tagger).unwrap();

        assert!(result.sources.is_empty());
        assert_eq!(result.normalization, None);
        assert_eq!(result.warnings, vec![PrepareWarning::NoGitSources]);
        assert!(recipe.read_manifest().unwrap().contains("version: 1.0"));
    }

    #[test]
    fn test_recipe_with_tarball_first() {
        let temp_dir = TempDir::new().unwrap();
        let manifest = "package:\n  version: 1.0\nsource:\n  - url: https://example.com/a.tar.gz\n  - git_url: https://example.com/unreachable.git\n";
        fs::write(temp_dir.path().join("meta.yaml"), manifest).unwrap();
        let repos_dir = temp_dir.path().join("git-repos");
        fs::create_dir(&repos_dir).unwrap();

        let recipe = Recipe::new(temp_dir.path());
        let tagger = Tagger {
            name: "test".to_string(),
            email: "test@example.com".to_string(),
        };
        let result = prepare_sources(&recipe, &repos_dir, &tagger).unwrap();

        assert!(result.sources.is_empty());
        assert_eq!(result.normalization, None);
        assert_eq!(result.warnings, vec![PrepareWarning::FirstSourceNotGit]);
        assert_eq!(fs::read_dir(&repos_dir).unwrap().count(), 0);
        assert_eq!(recipe.read_manifest().unwrap(), manifest);
    }
}
