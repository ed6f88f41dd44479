use std::fmt;

/// Non-fatal issues met while preparing a build directory.
/// These are reported to the user and preparation continues.
#[derive(Debug, Clone, PartialEq)]
pub enum PrepareWarning {
    /// `DATE_NUM`/`DATE_STR` could not be derived from the recipe repository
    DateVarsUnavailable { reason: String },
    /// The recipe has no `git_url` source, so no version is stamped
    NoGitSources,
    /// The first source is not a git repository, so no version is stamped
    FirstSourceNotGit,
    /// A `build/script_env` variable is not set and is dropped from the recipe
    ScriptEnvUnset { name: String },
    /// A line of `extra.tags` is not `<tag> <revision>`
    MalformedExtraTag { line: String },
    /// A well-formed `extra.tags` line could not be applied
    ExtraTagFailed { line: String, reason: String },
    /// A configuration file recorded for restoring could not be restored
    RestoreFailed { path: String, reason: String },
}

impl fmt::Display for PrepareWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrepareWarning::DateVarsUnavailable { reason } => {
                write!(
                    f,
                    "Failed to set default DATE_NUM and DATE_STR ({}). \
                     This is normal if the recipe isn't in a git repository",
                    reason
                )
            }
            PrepareWarning::NoGitSources => {
                write!(
                    f,
                    "No git repositories in the package recipe; tag rewriting will be skipped"
                )
            }
            PrepareWarning::FirstSourceNotGit => {
                write!(
                    f,
                    "First source isn't a git repository; tag rewriting will be skipped"
                )
            }
            PrepareWarning::ScriptEnvUnset { name } => {
                write!(
                    f,
                    "{} variable isn't set; won't be allowed during building",
                    name
                )
            }
            PrepareWarning::MalformedExtraTag { line } => {
                write!(f, "Malformed line in extra.tags: \"{}\"", line)
            }
            PrepareWarning::ExtraTagFailed { line, reason } => {
                write!(f, "Could not add extra.tags line \"{}\": {}", line, reason)
            }
            PrepareWarning::RestoreFailed { path, reason } => {
                write!(f, "Problem while restoring {}: {}", path, reason)
            }
        }
    }
}
