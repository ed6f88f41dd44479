//! `recipe_append.yaml`: where the recipe came from and what built it.
//!
//! conda-build merges this file into the rendered recipe, so the values end
//! up under `extra` in the package's `info/recipe/meta.yaml`.

use chrono::Utc;
use serde::Serialize;
use serde_yaml::Value;
use std::env;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::error::Result;
use crate::git::{Git2Repository, Repository};
use crate::recipe::Recipe;

pub const RECIPE_APPEND_FILE: &str = "recipe_append.yaml";

const GIT_ERROR: &str = "GIT_ERROR";
const UNKNOWN: &str = "?";
const DATE_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipeAppend {
    pub extra: BuildMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildMetadata {
    pub build_type: BuildType,
    pub recipe_source: RecipeSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub travis: Option<TravisJob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_actions: Option<GithubActionsRun>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toolchain_arch: Option<String>,
    /// Parsed contents of the recipe's condarc
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condarc: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildType {
    Local,
    Travis,
    GithubActions,
}

/// Repository holding the recipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipeSource {
    pub repo: String,
    pub branch: String,
    pub commit: String,
    pub describe: String,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TravisJob {
    pub job_id: i64,
    pub job_num: String,
    pub event: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GithubActionsRun {
    pub action_id: Option<String>,
    pub run_id: Option<String>,
    pub run_num: Option<String>,
    pub event: Option<String>,
}

fn or_git_error(value: Result<String>) -> String {
    value.unwrap_or_else(|e| {
        debug!("recipe repository: {}", e);
        GIT_ERROR.to_string()
    })
}

impl RecipeSource {
    /// Details of the git repository holding `dir`.
    ///
    /// Anything that cannot be read is recorded as `GIT_ERROR`.
    pub fn from_repository(dir: &Path, date: String) -> Self {
        match Git2Repository::open(dir) {
            Ok(repo) => RecipeSource {
                repo: or_git_error(repo.remote_url("origin")),
                branch: or_git_error(repo.head_branch()),
                commit: or_git_error(repo.current_commit().map(|oid| oid.to_string())),
                describe: or_git_error(repo.describe_head_long()),
                date,
            },
            Err(e) => {
                debug!("{} is not in a git repository: {}", dir.display(), e);
                RecipeSource {
                    repo: GIT_ERROR.to_string(),
                    branch: GIT_ERROR.to_string(),
                    commit: GIT_ERROR.to_string(),
                    describe: GIT_ERROR.to_string(),
                    date,
                }
            }
        }
    }
}

/// Assemble the metadata, letting CI variables read through `var` override
/// what git reported.
pub fn build_metadata(
    recipe_source: RecipeSource,
    var: impl Fn(&str) -> Option<String>,
    condarc: Option<Value>,
) -> RecipeAppend {
    let is_true = |name: &str| var(name).as_deref() == Some("true");
    let or_unknown = |name: &str| var(name).unwrap_or_else(|| UNKNOWN.to_string());

    let mut extra = BuildMetadata {
        build_type: BuildType::Local,
        recipe_source,
        travis: None,
        github_actions: None,
        toolchain_arch: var("TOOLCHAIN_ARCH"),
        condarc,
    };

    if is_true("TRAVIS") {
        extra.build_type = BuildType::Travis;
        extra.travis = Some(TravisJob {
            job_id: var("TRAVIS_JOB_ID")
                .and_then(|id| id.parse().ok())
                .unwrap_or(-1),
            job_num: var("TRAVIS_JOB_NUMBER").unwrap_or_else(|| "-1".to_string()),
            event: var("TRAVIS_EVENT_TYPE"),
        });

        let slug = var("TRAVIS_REPO_SLUG")
            .filter(|slug| !slug.is_empty())
            .or_else(|| var("TRAVIS_PULL_REQUEST_SLUG"))
            .unwrap_or_default();
        extra.recipe_source.repo = format!("https://github.com/{}", slug);
        extra.recipe_source.branch = or_unknown("TRAVIS_BRANCH");
        extra.recipe_source.commit = or_unknown("TRAVIS_COMMIT");
    }

    if is_true("GITHUB_ACTIONS") {
        extra.build_type = BuildType::GithubActions;
        extra.github_actions = Some(GithubActionsRun {
            action_id: var("GITHUB_ACTION"),
            run_id: var("GITHUB_RUN_ID"),
            run_num: var("GITHUB_RUN_NUMBER"),
            event: var("GITHUB_EVENT_NAME"),
        });

        extra.recipe_source.repo = format!(
            "https://github.com/{}",
            var("GITHUB_REPOSITORY").unwrap_or_default()
        );
        extra.recipe_source.branch = or_unknown("GITHUB_REF");
        extra.recipe_source.commit = or_unknown("GITHUB_SHA");
    }

    RecipeAppend { extra }
}

/// Write `recipe_append.yaml` into `recipe_dir`, describing the repository
/// of `package_dir` and the current environment.
pub fn write_recipe_append(package_dir: &Path, recipe_dir: &Path) -> Result<()> {
    let date = Utc::now().format(DATE_FORMAT).to_string();
    let recipe_source = RecipeSource::from_repository(package_dir, date);

    let condarc = match Recipe::new(recipe_dir).condarc_path() {
        Some(path) => Some(serde_yaml::from_str(&fs::read_to_string(path)?)?),
        None => None,
    };

    let metadata = build_metadata(recipe_source, |name| env::var(name).ok(), condarc);
    let path = recipe_dir.join(RECIPE_APPEND_FILE);
    fs::write(&path, serde_yaml::to_string(&metadata)?)?;
    info!("wrote {}", path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn local_source() -> RecipeSource {
        RecipeSource {
            repo: "https://github.com/example/recipes.git".to_string(),
            branch: "main".to_string(),
            commit: "0123456789abcdef0123456789abcdef01234567".to_string(),
            describe: "v1.0-2-g0123456".to_string(),
            date: "20200304_050607".to_string(),
        }
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_local_build() {
        let metadata = build_metadata(local_source(), lookup(&[]), None);

        assert_eq!(metadata.extra.build_type, BuildType::Local);
        assert_eq!(metadata.extra.recipe_source, local_source());
        assert_eq!(metadata.extra.travis, None);
        assert_eq!(metadata.extra.toolchain_arch, None);

        let yaml = serde_yaml::to_string(&metadata).unwrap();
        assert!(yaml.starts_with("extra:\n  build_type: local\n"));
        assert!(!yaml.contains("travis"));
        assert!(!yaml.contains("condarc"));
    }

    #[test]
    fn test_travis_overrides_git_details() {
        let vars = lookup(&[
            ("TRAVIS", "true"),
            ("TRAVIS_JOB_ID", "4242"),
            ("TRAVIS_JOB_NUMBER", "17.3"),
            ("TRAVIS_EVENT_TYPE", "push"),
            ("TRAVIS_REPO_SLUG", "hdl/conda-eda"),
            ("TRAVIS_BRANCH", "master"),
        ]);
        let extra = build_metadata(local_source(), vars, None).extra;

        assert_eq!(extra.build_type, BuildType::Travis);
        assert_eq!(
            extra.travis,
            Some(TravisJob {
                job_id: 4242,
                job_num: "17.3".to_string(),
                event: Some("push".to_string()),
            })
        );
        assert_eq!(extra.recipe_source.repo, "https://github.com/hdl/conda-eda");
        assert_eq!(extra.recipe_source.branch, "master");
        assert_eq!(extra.recipe_source.commit, "?");
        assert_eq!(extra.recipe_source.describe, "v1.0-2-g0123456");
        assert_eq!(extra.recipe_source.date, "20200304_050607");
    }

    #[test]
    fn test_travis_job_defaults() {
        let vars = lookup(&[("TRAVIS", "true"), ("TRAVIS_JOB_ID", "not-a-number")]);
        let travis = build_metadata(local_source(), vars, None).extra.travis.unwrap();

        assert_eq!(travis.job_id, -1);
        assert_eq!(travis.job_num, "-1");
        assert_eq!(travis.event, None);
    }

    #[test]
    fn test_github_actions_build() {
        let vars = lookup(&[
            ("GITHUB_ACTIONS", "true"),
            ("GITHUB_ACTION", "build"),
            ("GITHUB_RUN_ID", "99"),
            ("GITHUB_RUN_NUMBER", "7"),
            ("GITHUB_EVENT_NAME", "pull_request"),
            ("GITHUB_REPOSITORY", "hdl/conda-eda"),
            ("GITHUB_REF", "refs/heads/main"),
            ("GITHUB_SHA", "abc123"),
            ("TOOLCHAIN_ARCH", "riscv32"),
        ]);
        let metadata = build_metadata(local_source(), vars, None);
        let extra = &metadata.extra;

        assert_eq!(extra.build_type, BuildType::GithubActions);
        assert_eq!(extra.github_actions.as_ref().unwrap().run_id.as_deref(), Some("99"));
        assert_eq!(extra.recipe_source.repo, "https://github.com/hdl/conda-eda");
        assert_eq!(extra.recipe_source.branch, "refs/heads/main");
        assert_eq!(extra.recipe_source.commit, "abc123");
        assert_eq!(extra.toolchain_arch.as_deref(), Some("riscv32"));

        let yaml = serde_yaml::to_string(&metadata).unwrap();
        assert!(yaml.contains("build_type: github_actions\n"));
    }

    #[test]
    fn test_source_outside_repository() {
        let temp_dir = TempDir::new().unwrap();
        let source = RecipeSource::from_repository(temp_dir.path(), "now".to_string());

        assert_eq!(source.repo, GIT_ERROR);
        assert_eq!(source.describe, GIT_ERROR);
        assert_eq!(source.date, "now");
    }

    #[test]
    fn test_source_without_origin_or_tags() {
        let temp_dir = TempDir::new().unwrap();
        let git = git2::Repository::init(temp_dir.path()).unwrap();
        let sig = git2::Signature::now("Test", "test@example.com").unwrap();
        let tree_id = git.index().unwrap().write_tree().unwrap();
        let tree = git.find_tree(tree_id).unwrap();
        let oid = git.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[]).unwrap();

        let source = RecipeSource::from_repository(temp_dir.path(), "now".to_string());
        assert_eq!(source.repo, GIT_ERROR);
        assert_eq!(source.commit, oid.to_string());
        assert_eq!(source.describe, GIT_ERROR);
        assert_ne!(source.branch, GIT_ERROR);
    }

    #[test]
    #[serial]
    fn test_write_recipe_append_embeds_condarc() {
        let temp_dir = TempDir::new().unwrap();
        let recipe_dir = temp_dir.path().join("recipe");
        fs::create_dir(&recipe_dir).unwrap();
        fs::write(
            recipe_dir.join("condarc"),
            "channels:\n  - litex-hub\n  - defaults\n",
        )
        .unwrap();

        write_recipe_append(temp_dir.path(), &recipe_dir).unwrap();

        let written = fs::read_to_string(recipe_dir.join(RECIPE_APPEND_FILE)).unwrap();
        let value: Value = serde_yaml::from_str(&written).unwrap();
        let extra = &value["extra"];
        assert_eq!(extra["condarc"]["channels"][0].as_str(), Some("litex-hub"));
        assert_eq!(extra["recipe_source"]["date"].as_str().unwrap().len(), 15);
    }
}
