//! Build environment creation through the `conda` command line.

use once_cell::sync::Lazy;
use regex::Regex;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

use crate::config::EnvironmentConfig;
use crate::error::{PrepareError, Result};
use crate::recipe::Recipe;
use crate::warning::PrepareWarning;
use crate::workspace::Workspace;

/// First line of every configuration file this tool comments out
pub const MODIFICATION_LINE: &str = "# Modified by the conda-build-prepare";

const RECORD_FILE: &str = "conda-build-prepare_srcs.txt";

static SOURCE_HEADER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^==> (.*) <==$").expect("Invalid config source regex"));
static CHANNELS_KEY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^channels:\s*$").expect("Invalid channels regex"));

/// Runs the `conda` executable
#[derive(Debug, Clone)]
pub struct CondaCli {
    exe: String,
}

impl CondaCli {
    pub fn new(exe: impl Into<String>) -> Self {
        CondaCli { exe: exe.into() }
    }

    /// Run `conda <args>` and return its standard output
    pub fn run(&self, args: &[&str]) -> Result<String> {
        debug!("running {} {}", self.exe, args.join(" "));

        let output = Command::new(&self.exe)
            .args(args)
            .output()
            .map_err(|e| PrepareError::tool(format!("Cannot run '{}': {}", self.exe, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            return Err(PrepareError::tool(format!(
                "'{} {}' failed with {}\nstdout:\n{}\nstderr:\n{}",
                self.exe,
                args.join(" "),
                output.status,
                stdout,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        Ok(stdout)
    }

    /// Run a `conda` subcommand inside the environment at `env_dir`
    pub fn run_in_env(&self, env_dir: &Path, args: &[&str]) -> Result<String> {
        let prefix = env_dir.display().to_string();
        let mut full = vec!["run", "-p", prefix.as_str()];
        full.extend_from_slice(args);
        self.run(&full)
    }

    pub fn create_env(&self, env_dir: &Path, packages: &[String]) -> Result<()> {
        let prefix = env_dir.display().to_string();
        let mut args = vec!["create", "--yes", "--no-default-packages", "-p", prefix.as_str()];
        args.extend(packages.iter().map(String::as_str));
        self.run(&args)?;
        Ok(())
    }

    /// Configuration files the environment would read
    pub fn config_sources(&self, env_dir: &Path) -> Result<Vec<PathBuf>> {
        let output = self.run_in_env(env_dir, &["conda", "config", "--show-sources"])?;
        Ok(parse_config_sources(&output))
    }

    /// `conda config --env --<action> <key> <value>`
    pub fn config_env(&self, env_dir: &Path, action: &str, key: &str, value: &str) -> Result<()> {
        let flag = format!("--{}", action);
        self.run_in_env(env_dir, &["conda", "config", "--env", flag.as_str(), key, value])?;
        Ok(())
    }
}

/// Paths listed by `conda config --show-sources`; non-file sources such as
/// `envvars` are skipped.
pub fn parse_config_sources(output: &str) -> Vec<PathBuf> {
    output
        .lines()
        .filter_map(|line| SOURCE_HEADER_REGEX.captures(line.trim_end()))
        .map(|captures| PathBuf::from(&captures[1]))
        .filter(|path| path.is_absolute())
        .collect()
}

/// Package list for the environment, with `conda-build` ensured
pub fn environment_packages(configured: &[String]) -> Vec<String> {
    let mut packages = configured.to_vec();
    let has_conda_build = packages.iter().any(|p| {
        p.strip_prefix("conda-build")
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(['=', '<', '>', ' ']))
    });
    if !has_conda_build {
        packages.push("conda-build".to_string());
    }
    packages
}

/// Comment out every line of a configuration file, marking it as modified
pub fn comment_out(contents: &str) -> String {
    let mut commented = format!("{}\n", MODIFICATION_LINE);
    for line in contents.lines() {
        commented.push('#');
        commented.push_str(line);
        commented.push('\n');
    }
    commented
}

/// Undo [`comment_out`], stripping one `#` from each line after the marker
pub fn uncomment(contents: &str) -> Option<String> {
    let mut lines = contents.lines();
    if lines.next() != Some(MODIFICATION_LINE) {
        return None;
    }

    let mut restored = String::new();
    for line in lines {
        restored.push_str(line.strip_prefix('#').unwrap_or(line));
        restored.push('\n');
    }
    Some(restored)
}

/// File listing the configuration files commented out so far
pub fn record_path() -> PathBuf {
    env::temp_dir().join(RECORD_FILE)
}

/// Comment out `path` and append it to the record
pub fn comment_config_file(path: &Path, record: &Path) -> Result<()> {
    let contents = fs::read_to_string(path)?;
    if contents.starts_with(MODIFICATION_LINE) {
        debug!("{} already commented out", path.display());
        return Ok(());
    }

    fs::write(path, comment_out(&contents))?;

    let mut recorded = if record.exists() {
        fs::read_to_string(record)?
    } else {
        String::new()
    };
    recorded.push_str(&format!("{}\n", path.display()));
    fs::write(record, recorded)?;

    info!("commented out {}", path.display());
    Ok(())
}

/// Restore every recorded configuration file and remove the record.
///
/// Files that were changed since, or can no longer be read, are reported
/// and left alone.
pub fn restore_config_files(record: &Path) -> Result<Vec<PrepareWarning>> {
    if !record.exists() {
        return Err(PrepareError::config(format!(
            "Nothing to restore: '{}' does not exist",
            record.display()
        )));
    }

    let mut warnings = Vec::new();
    for line in fs::read_to_string(record)?.lines().filter(|l| !l.trim().is_empty()) {
        let path = Path::new(line);
        match restore_one(path) {
            Ok(()) => info!("restored {}", path.display()),
            Err(reason) => warnings.push(PrepareWarning::RestoreFailed {
                path: line.to_string(),
                reason,
            }),
        }
    }

    fs::remove_file(record)?;
    Ok(warnings)
}

fn restore_one(path: &Path) -> std::result::Result<(), String> {
    let contents = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let restored = uncomment(&contents)
        .ok_or_else(|| "the file was not modified by conda-build-prepare".to_string())?;
    fs::write(path, restored).map_err(|e| e.to_string())
}

/// Place `channels` at the top of a condarc's `channels:` list, the last
/// given channel first. A `channels:` key is added when missing.
pub fn insert_channels(condarc: &str, channels: &[String]) -> String {
    if channels.is_empty() {
        return condarc.to_string();
    }

    let entries: String = channels
        .iter()
        .rev()
        .map(|channel| format!("  - {}\n", channel))
        .collect();

    let mut updated = String::new();
    let mut inserted = false;
    for line in condarc.lines() {
        updated.push_str(line);
        updated.push('\n');
        if !inserted && CHANNELS_KEY_REGEX.is_match(line) {
            updated.push_str(&entries);
            inserted = true;
        }
    }

    if !inserted {
        updated.push_str("channels:\n");
        updated.push_str(&entries);
    }
    updated
}

/// Copy the recipe's condarc into the environment prefix
pub fn install_condarc(recipe: &Recipe, env_dir: &Path, channels: &[String]) -> Result<bool> {
    let Some(source) = recipe.condarc_path() else {
        debug!("recipe has no condarc");
        return Ok(false);
    };

    let contents = fs::read_to_string(&source)?;
    fs::write(env_dir.join("condarc"), insert_channels(&contents, channels))?;
    info!("installed {}", source.display());

    Ok(true)
}

/// Create the build environment, isolate it from user configuration and
/// apply the configured settings.
pub fn prepare_environment(
    conda: &CondaCli,
    workspace: &Workspace,
    config: &EnvironmentConfig,
    channels: &[String],
) -> Result<()> {
    let env_dir = &workspace.env_dir;

    info!("creating environment in {}", env_dir.display());
    conda.create_env(env_dir, &environment_packages(&config.packages))?;

    let record = record_path();
    for source in conda.config_sources(env_dir)? {
        if source.is_file() {
            comment_config_file(&source, &record)?;
        }
    }

    for (action, keys) in &config.settings {
        for (key, value) in keys {
            for value in value.values() {
                conda.config_env(env_dir, action, key, value)?;
            }
        }
    }

    for channel in channels {
        conda.config_env(env_dir, "prepend", "channels", channel)?;
    }

    install_condarc(&Recipe::new(&workspace.recipe_dir), env_dir, channels)?;

    Ok(())
}
