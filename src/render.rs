//! Final recipe: `conda render` output with `script_env` embedded.
//!
//! After the sources are prepared the manifest is rendered inside the build
//! environment and replaced by the rendered metadata. The original text is
//! kept as a comment block at the end.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::env;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::conda::CondaCli;
use crate::error::{PrepareError, Result};
use crate::recipe::Recipe;
use crate::warning::PrepareWarning;
use crate::workspace::Workspace;

pub const RENDERED_METADATA_FILE: &str = "rendered_metadata.yaml";

const RENDERED_HEADER: &str = "# Rendered by conda-build-prepare\n\
                               # Original meta.yaml can be found at the end of this file\n\n";

static COMPILER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\{\{\s*compiler[('"\s]+([a-zA-Z]+)[)'"\s]+\}\}(.*)"#)
        .expect("Invalid compiler regex")
});

/// `build/script_env` names, split by whether they are set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptEnv {
    pub set: Vec<(String, String)>,
    pub unset: Vec<String>,
}

impl ScriptEnv {
    fn set_names(&self) -> Vec<Value> {
        self.set
            .iter()
            .map(|(name, _)| Value::String(name.clone()))
            .collect()
    }
}

fn key(name: &str) -> Value {
    Value::String(name.to_string())
}

/// Run `conda render` on `recipe_dir` inside the environment and parse the
/// result.
///
/// `conda build purge-all` runs afterwards whether rendering worked or not,
/// and the intermediate file is removed.
pub fn render_metadata(conda: &CondaCli, recipe_dir: &Path, env_dir: &Path) -> Result<Value> {
    let rendered_path = recipe_dir.join(RENDERED_METADATA_FILE);
    let output = rendered_path.display().to_string();
    let recipe = recipe_dir.display().to_string();

    info!("rendering package metadata");
    let rendered = conda
        .run_in_env(
            env_dir,
            &["conda", "render", "-f", output.as_str(), recipe.as_str()],
        )
        .and_then(|_| Ok(fs::read_to_string(&rendered_path)?));

    let purged = conda.run_in_env(env_dir, &["conda", "build", "purge-all"]);
    if rendered_path.exists() {
        fs::remove_file(&rendered_path)?;
    }

    let text = rendered?;
    purged?;

    Ok(serde_yaml::from_str(&text)?)
}

/// Split the rendered `build/script_env` list with `var` as the environment.
///
/// Returns `None` when the recipe has no `script_env`.
pub fn script_env(meta: &Value, var: impl Fn(&str) -> Option<String>) -> Result<Option<ScriptEnv>> {
    let Some(names) = meta.get("build").and_then(|build| build.get("script_env")) else {
        return Ok(None);
    };
    let names = names
        .as_sequence()
        .ok_or_else(|| PrepareError::recipe("build/script_env is not a list"))?;

    let mut split = ScriptEnv::default();
    for name in names {
        let name = name.as_str().ok_or_else(|| {
            PrepareError::recipe(format!("build/script_env entry is not a string: {:?}", name))
        })?;
        match var(name) {
            Some(value) => split.set.push((name.to_string(), value)),
            None => split.unset.push(name.to_string()),
        }
    }

    Ok(Some(split))
}

/// Store the set `script_env` variables in the environment and keep only
/// those in the metadata.
pub fn embed_script_env(
    conda: &CondaCli,
    env_dir: &Path,
    meta: &mut Value,
) -> Result<Vec<PrepareWarning>> {
    let Some(split) = script_env(meta, |name| env::var(name).ok())? else {
        debug!("recipe has no build/script_env");
        return Ok(Vec::new());
    };

    if !split.set.is_empty() {
        let assignments: Vec<String> = split
            .set
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        let mut args = vec!["conda", "env", "config", "vars", "set"];
        args.extend(assignments.iter().map(String::as_str));
        conda.run_in_env(env_dir, &args)?;
        info!("embedded {} script_env variables", assignments.len());
    }

    if let Some(build) = meta.get_mut("build").and_then(Value::as_mapping_mut) {
        build.insert(key("script_env"), Value::Sequence(split.set_names()));
    }

    Ok(split
        .unset
        .into_iter()
        .map(|name| PrepareWarning::ScriptEnvUnset { name })
        .collect())
}

/// `{{ compiler(...) }}` requirements of a manifest, normalized to double
/// quotes with selectors turned into comments
pub fn compiler_requirements(manifest: &str) -> Vec<String> {
    COMPILER_REGEX
        .captures_iter(manifest)
        .map(|captures| {
            format!(
                "{{{{ compiler(\"{}\") }}}}{}",
                &captures[1],
                captures[2].replace('[', "# [")
            )
        })
        .collect()
}

/// Append the manifest's compiler requirements to `requirements/build`.
///
/// Rendering replaces them with the resolved packages, but conda-build
/// still needs to see them.
pub fn restore_compilers(meta: &mut Value, manifest: &str) -> Result<()> {
    let compilers = compiler_requirements(manifest);
    if compilers.is_empty() {
        return Ok(());
    }

    let meta = meta
        .as_mapping_mut()
        .ok_or_else(|| PrepareError::recipe("Rendered metadata is not a mapping"))?;
    let requirements = meta
        .entry(key("requirements"))
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    if requirements.is_null() {
        *requirements = Value::Mapping(Mapping::new());
    }

    let build = requirements
        .as_mapping_mut()
        .ok_or_else(|| PrepareError::recipe("requirements is not a mapping"))?
        .entry(key("build"))
        .or_insert_with(|| Value::Sequence(Vec::new()));
    if build.is_null() {
        *build = Value::Sequence(Vec::new());
    }

    build
        .as_sequence_mut()
        .ok_or_else(|| PrepareError::recipe("requirements/build is not a list"))?
        .extend(compilers.into_iter().map(Value::String));

    Ok(())
}

/// Text of the rendered manifest, followed by `original` commented out
pub fn rendered_manifest(meta: &Value, original: &str) -> Result<String> {
    let mut rendered = String::from(RENDERED_HEADER);
    rendered.push_str(&serde_yaml::to_string(meta)?);

    rendered.push_str("\n# Original meta.yaml:\n#\n");
    for line in original.lines() {
        rendered.push_str(format!("# {}", line).trim_end());
        rendered.push('\n');
    }

    Ok(rendered)
}

/// Render the workspace recipe and replace its manifest with the result.
///
/// `original` is the manifest as it was before the sources were prepared.
pub fn render_recipe(
    conda: &CondaCli,
    workspace: &Workspace,
    original: &str,
) -> Result<Vec<PrepareWarning>> {
    let recipe = Recipe::new(&workspace.recipe_dir);

    let mut meta = render_metadata(conda, &workspace.recipe_dir, &workspace.env_dir)?;
    let warnings = embed_script_env(conda, &workspace.env_dir, &mut meta)?;
    restore_compilers(&mut meta, &recipe.read_manifest()?)?;
    recipe.write_manifest(&rendered_manifest(&meta, original)?)?;

    info!("wrote rendered {}", recipe.manifest_path().display());
    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn parse(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_script_env_split() {
        let meta = parse("build:\n  script_env:\n    - GITHUB_TOKEN\n    - DATE_NUM\n");
        let vars: HashMap<&str, &str> = [("DATE_NUM", "20200101")].into_iter().collect();

        let split = script_env(&meta, |name| vars.get(name).map(|v| v.to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(split.set, vec![("DATE_NUM".to_string(), "20200101".to_string())]);
        assert_eq!(split.unset, vec!["GITHUB_TOKEN".to_string()]);
    }

    #[test]
    fn test_script_env_absent_or_malformed() {
        assert_eq!(script_env(&parse("build:\n  number: 0\n"), |_| None).unwrap(), None);
        assert_eq!(script_env(&parse("package:\n  name: a\n"), |_| None).unwrap(), None);

        let err = script_env(&parse("build:\n  script_env: TOKEN\n"), |_| None).unwrap_err();
        assert!(matches!(err, PrepareError::Recipe(_)));
    }

    #[test]
    fn test_compiler_requirements() {
        let manifest = "requirements:\n  build:\n    - {{ compiler('c') }}\n    - {{compiler(\"cxx\")}} 4.0 [linux]\n    - make\n";
        assert_eq!(
            compiler_requirements(manifest),
            vec![
                "{{ compiler(\"c\") }}".to_string(),
                "{{ compiler(\"cxx\") }} 4.0 # [linux]".to_string(),
            ]
        );
    }

    #[test]
    fn test_restore_compilers_appends_to_build() {
        let mut meta = parse("requirements:\n  build:\n    - gcc_linux-64 9.3\n");
        restore_compilers(&mut meta, "    - {{ compiler('c') }}\n").unwrap();

        let build = meta["requirements"]["build"].as_sequence().unwrap();
        assert_eq!(build.len(), 2);
        assert_eq!(build[1].as_str(), Some("{{ compiler(\"c\") }}"));
    }

    #[test]
    fn test_restore_compilers_creates_missing_sections() {
        let mut meta = parse("package:\n  name: demo\n");
        restore_compilers(&mut meta, "- {{ compiler('cxx') }}  # [osx]\n").unwrap();
        assert_eq!(
            meta["requirements"]["build"][0].as_str(),
            Some("{{ compiler(\"cxx\") }}  # # [osx]")
        );

        let mut empty_build = parse("requirements:\n  build:\n");
        restore_compilers(&mut empty_build, "{{ compiler('c') }}").unwrap();
        assert_eq!(empty_build["requirements"]["build"].as_sequence().unwrap().len(), 1);
    }

    #[test]
    fn test_restore_without_compilers_leaves_meta() {
        let mut meta = parse("package:\n  name: demo\n");
        let before = meta.clone();
        restore_compilers(&mut meta, "requirements:\n  build:\n    - make\n").unwrap();
        assert_eq!(meta, before);
    }

    #[test]
    fn test_rendered_manifest_layout() {
        let meta = parse("package:\n  name: demo\n  version: v1.0_2_gabc1234\n");
        let original = "package:\n  name: demo\n\n  version: {{ GIT_DESCRIBE_TAG }}\n";

        let rendered = rendered_manifest(&meta, original).unwrap();
        assert!(rendered.starts_with(
            "# Rendered by conda-build-prepare\n# Original meta.yaml can be found at the end of this file\n\npackage:\n"
        ));
        assert!(rendered.ends_with(
            "\n# Original meta.yaml:\n#\n# package:\n#   name: demo\n#\n#   version: {{ GIT_DESCRIBE_TAG }}\n"
        ));

        let reparsed: Value = serde_yaml::from_str(&rendered).unwrap();
        assert_eq!(reparsed, meta);
    }

    #[cfg(unix)]
    fn fake_conda(dir: &Path, render_body: &str) -> CondaCli {
        use std::os::unix::fs::PermissionsExt;

        // invoked as: run -p <env> conda <subcommand> ...
        let script = format!(
            "#!/bin/sh\necho \"$5 $6\" >> \"$3.log\"\nif [ \"$5\" = render ]; then\n{}\nfi\n",
            render_body
        );
        let exe = dir.join("conda");
        fs::write(&exe, script).unwrap();
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();
        CondaCli::new(exe.display().to_string())
    }

    #[cfg(unix)]
    #[test]
    fn test_render_metadata_purges_and_cleans_up() {
        let temp_dir = TempDir::new().unwrap();
        let recipe_dir = temp_dir.path().join("recipe");
        fs::create_dir(&recipe_dir).unwrap();
        let env_dir = temp_dir.path().join("env");
        let conda = fake_conda(temp_dir.path(), "printf 'package:\\n  name: demo\\n' > \"$7\"");

        let meta = render_metadata(&conda, &recipe_dir, &env_dir).unwrap();

        assert_eq!(meta["package"]["name"].as_str(), Some("demo"));
        assert!(!recipe_dir.join(RENDERED_METADATA_FILE).exists());
        let log = fs::read_to_string(temp_dir.path().join("env.log")).unwrap();
        assert_eq!(log, "render -f\nbuild purge-all\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_render_still_purges() {
        let temp_dir = TempDir::new().unwrap();
        let recipe_dir = temp_dir.path().join("recipe");
        fs::create_dir(&recipe_dir).unwrap();
        let env_dir = temp_dir.path().join("env");
        let conda = fake_conda(temp_dir.path(), "touch \"$7\"; exit 1");

        let err = render_metadata(&conda, &recipe_dir, &env_dir).unwrap_err();

        assert!(matches!(err, PrepareError::Tool(_)));
        assert!(!recipe_dir.join(RENDERED_METADATA_FILE).exists());
        let log = fs::read_to_string(temp_dir.path().join("env.log")).unwrap();
        assert!(log.ends_with("build purge-all\n"));
    }
}
