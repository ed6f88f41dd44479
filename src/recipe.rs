//! Recipe directory access and `meta.yaml` text edits.
//!
//! The manifest is a Jinja-templated YAML file, so it is edited as text:
//! only `git_url`, `git_rev` and `version` lines are recognized.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PrepareError, Result};

pub const MANIFEST_FILE: &str = "meta.yaml";
pub const EXTRA_TAGS_FILE: &str = "extra.tags";

static LIST_ITEM_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)-\s").expect("Invalid list item regex"));
static TOP_LEVEL_KEY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s#-]").expect("Invalid top level key regex"));
static SOURCE_KEY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^source:\s*(#.*)?$").expect("Invalid source key regex"));
static GIT_URL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:-\s+)?git_url:\s*(\S+)").expect("Invalid git_url regex")
});
static GIT_REV_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:-\s+)?git_rev:\s*(\S+)").expect("Invalid git_rev regex")
});
static VERSION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([ \t]*version:)[ \t]*\S.*$").expect("Invalid version regex")
});

/// A git source entry of the recipe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSource {
    pub url: String,
    /// Revision to check out after cloning
    pub rev: Option<String>,
}

/// A package recipe directory
#[derive(Debug, Clone)]
pub struct Recipe {
    dir: PathBuf,
}

impl Recipe {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Recipe { dir: dir.into() }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    pub fn read_manifest(&self) -> Result<String> {
        let path = self.manifest_path();
        fs::read_to_string(&path)
            .map_err(|e| PrepareError::recipe(format!("Cannot read '{}': {}", path.display(), e)))
    }

    pub fn write_manifest(&self, contents: &str) -> Result<()> {
        fs::write(self.manifest_path(), contents)?;
        Ok(())
    }

    /// Contents of `extra.tags`, if the recipe has one
    pub fn read_extra_tags(&self) -> Result<Option<String>> {
        let path = self.dir.join(EXTRA_TAGS_FILE);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    /// The recipe's `condarc`, preferring `condarc_<os>` for the current OS
    pub fn condarc_path(&self) -> Option<PathBuf> {
        let generic = self.dir.join("condarc");
        let os_specific = current_os().map(|os| self.dir.join(format!("condarc_{}", os)));

        os_specific
            .into_iter()
            .chain(std::iter::once(generic))
            .find(|path| path.exists())
    }
}

fn current_os() -> Option<&'static str> {
    if cfg!(target_os = "linux") {
        Some("linux")
    } else if cfg!(target_os = "macos") {
        Some("macos")
    } else if cfg!(target_os = "windows") {
        Some("windows")
    } else {
        None
    }
}

fn unquote(value: &str) -> String {
    value.trim_matches(|c| c == '"' || c == '\'').to_string()
}

/// One entry of the manifest's `source` section
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceEntry {
    /// The git source, when the entry has a `git_url`
    pub git: Option<GitSource>,
}

#[derive(Default)]
struct EntryLines {
    url: Option<String>,
    rev: Option<String>,
}

impl EntryLines {
    fn read(&mut self, line: &str) {
        if let Some(captures) = GIT_URL_REGEX.captures(line) {
            self.url = Some(unquote(&captures[1]));
        } else if let Some(captures) = GIT_REV_REGEX.captures(line) {
            self.rev = Some(unquote(&captures[1]));
        }
    }

    fn finish(self) -> SourceEntry {
        SourceEntry {
            git: self.url.map(|url| GitSource { url, rev: self.rev }),
        }
    }
}

/// The entries of the top-level `source` section, in order.
///
/// The section is either a single mapping or a list of mappings; only list
/// items at the list's own indentation start a new entry, so nested lists
/// such as `patches` stay inside their entry.
pub fn source_entries(manifest: &str) -> Vec<SourceEntry> {
    let mut entries = Vec::new();
    let mut current: Option<EntryLines> = None;
    let mut in_source = false;
    let mut item_indent: Option<usize> = None;

    for line in manifest.lines() {
        if SOURCE_KEY_REGEX.is_match(line) {
            in_source = true;
            continue;
        }
        if !in_source {
            continue;
        }
        if TOP_LEVEL_KEY_REGEX.is_match(line) {
            break;
        }

        let content = line.trim_start();
        if content.is_empty() || content.starts_with('#') {
            continue;
        }

        if let Some(captures) = LIST_ITEM_REGEX.captures(line) {
            let indent = captures[1].len();
            if item_indent.is_none() && current.is_none() {
                item_indent = Some(indent);
            }
            if item_indent == Some(indent) {
                entries.extend(current.take().map(EntryLines::finish));
            }
        }

        current.get_or_insert_with(EntryLines::default).read(line);
    }
    entries.extend(current.map(EntryLines::finish));

    entries
}

/// The git sources of a manifest, in order
pub fn git_sources(manifest: &str) -> Vec<GitSource> {
    source_entries(manifest)
        .into_iter()
        .filter_map(|entry| entry.git)
        .collect()
}

/// Point every `git_url: <remote>` at a local clone
pub fn set_git_url(manifest: &str, remote: &str, local: &Path) -> String {
    manifest.replace(
        &format!("git_url: {}", remote),
        &format!("git_url: {}", local.display()),
    )
}

/// Replace the value of every `version:` key
pub fn set_version(manifest: &str, version: &str) -> String {
    VERSION_REGEX
        .replace_all(manifest, |captures: &regex::Captures| {
            format!("{} {}", &captures[1], version)
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTI_SOURCE: &str = r#"{% set name = "demo" %}
package:
  name: {{ name }}
  version: {{ GIT_DESCRIBE_TAG }}

source:
  - git_url: https://github.com/example/demo.git
    git_rev: v1.2
  - url: https://example.com/patches.tar.gz
  - git_rev: main
    git_url: "https://gitlab.com/group/extra"

build:
  number: 0
"#;

    #[test]
    fn test_git_sources_in_list() {
        let sources = git_sources(MULTI_SOURCE);
        assert_eq!(
            sources,
            vec![
                GitSource {
                    url: "https://github.com/example/demo.git".to_string(),
                    rev: Some("v1.2".to_string()),
                },
                GitSource {
                    url: "https://gitlab.com/group/extra".to_string(),
                    rev: Some("main".to_string()),
                },
            ]
        );
    }

    #[test]
    fn test_single_mapping_source() {
        let manifest = "source:\n  git_url: ../local/repo\n\nrequirements:\n  build:\n    - make\n";
        assert_eq!(
            git_sources(manifest),
            vec![GitSource {
                url: "../local/repo".to_string(),
                rev: None,
            }]
        );
    }

    #[test]
    fn test_rev_does_not_leak_between_entries() {
        let manifest = "source:\n  - url: foo.tar.gz\n    git_rev: stray\n  - git_url: https://host/a.git\n";
        assert_eq!(git_sources(manifest)[0].rev, None);
    }

    #[test]
    fn test_first_entry_kind() {
        let entries = source_entries(MULTI_SOURCE);
        assert_eq!(entries.len(), 3);
        assert!(entries[0].git.is_some());
        assert_eq!(entries[1].git, None);

        let tarball_first = "source:\n  - url: https://example.com/a.tar.gz\n  - git_url: https://host/b.git\n";
        let entries = source_entries(tarball_first);
        assert_eq!(entries[0].git, None);
        assert_eq!(entries[1].git.as_ref().unwrap().url, "https://host/b.git");
    }

    #[test]
    fn test_nested_lists_stay_in_their_entry() {
        let manifest = "source:\n  - git_url: https://host/a.git\n    patches:\n      - fix.patch\n    git_rev: v1\n  - url: b.tar.gz\n";
        let entries = source_entries(manifest);
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0].git,
            Some(GitSource {
                url: "https://host/a.git".to_string(),
                rev: Some("v1".to_string()),
            })
        );
    }

    #[test]
    fn test_git_url_outside_source_section_is_ignored() {
        let manifest = "source:\n  url: a.tar.gz\n\noutputs:\n  - name: sub\n    source:\n      git_url: https://host/c.git\n";
        assert!(git_sources(manifest).is_empty());
        assert_eq!(source_entries(manifest).len(), 1);
    }

    #[test]
    fn test_no_git_sources() {
        assert!(git_sources("source:\n  url: https://example.com/a.tar.gz\n").is_empty());
    }

    #[test]
    fn test_set_version_replaces_all_version_keys() {
        let updated = set_version(MULTI_SOURCE, "v1.2_3_gabcdef0");
        assert!(updated.contains("  version: v1.2_3_gabcdef0\n"));
        assert!(!updated.contains("GIT_DESCRIBE_TAG"));
        assert!(updated.contains("{% set name = \"demo\" %}"));
    }

    #[test]
    fn test_set_version_ignores_empty_value() {
        let manifest = "package:\n  version:\n";
        assert_eq!(set_version(manifest, "v0.0"), manifest);
    }

    #[test]
    fn test_set_git_url() {
        let updated = set_git_url(
            MULTI_SOURCE,
            "https://github.com/example/demo.git",
            Path::new("/tmp/out/git-repos/demo"),
        );
        assert!(updated.contains("git_url: /tmp/out/git-repos/demo\n"));
        assert!(updated.contains("https://gitlab.com/group/extra"));
    }
}
