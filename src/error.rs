use git2::Oid;
use thiserror::Error;

/// Unified error type for conda-build-prepare operations
#[derive(Error, Debug)]
pub enum PrepareError {
    /// A canonical tag already exists but points at another commit
    #[error("Tag conflict: '{tag}' points at {existing}, refusing to retarget it to {requested}")]
    TagConflict {
        tag: String,
        existing: Oid,
        requested: Oid,
    },

    #[error("Repository state error: {0}")]
    RepositoryState(String),

    /// The version was resolved before the canonical tag was created
    #[error("No canonical tag: {0}")]
    NoCanonicalTag(String),

    #[error("Git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source preparation failed: {0}")]
    Source(String),

    #[error("Recipe error: {0}")]
    Recipe(String),

    #[error("External tool failed: {0}")]
    Tool(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Convenience type alias for Results in conda-build-prepare
pub type Result<T> = std::result::Result<T, PrepareError>;

impl PrepareError {
    /// Create a repository state error with context
    pub fn repository_state(msg: impl Into<String>) -> Self {
        PrepareError::RepositoryState(msg.into())
    }

    /// Create a missing canonical tag error with context
    pub fn no_canonical_tag(msg: impl Into<String>) -> Self {
        PrepareError::NoCanonicalTag(msg.into())
    }

    /// Create a configuration error with context
    pub fn config(msg: impl Into<String>) -> Self {
        PrepareError::Config(msg.into())
    }

    /// Create a source preparation error with context
    pub fn source(msg: impl Into<String>) -> Self {
        PrepareError::Source(msg.into())
    }

    /// Create a recipe error with context
    pub fn recipe(msg: impl Into<String>) -> Self {
        PrepareError::Recipe(msg.into())
    }

    /// Create an external tool error with context
    pub fn tool(msg: impl Into<String>) -> Self {
        PrepareError::Tool(msg.into())
    }

    /// Whether the error leaves the repository without a reproducible version.
    ///
    /// These abort preparation of the affected repository.
    pub fn is_fatal_for_versioning(&self) -> bool {
        matches!(
            self,
            PrepareError::TagConflict { .. }
                | PrepareError::RepositoryState(_)
                | PrepareError::NoCanonicalTag(_)
                | PrepareError::Git(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PrepareError::config("test config issue");
        assert_eq!(err.to_string(), "Configuration error: test config issue");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PrepareError = io_err.into();
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_error_from_yaml() {
        let yaml_err = serde_yaml::from_str::<serde_yaml::Value>("key: [unclosed").unwrap_err();
        let err: PrepareError = yaml_err.into();
        assert!(err.to_string().starts_with("YAML error"));
    }

    #[test]
    fn test_tag_conflict_display_names_both_commits() {
        let existing = Oid::from_bytes(&[1; 20]).unwrap();
        let requested = Oid::from_bytes(&[2; 20]).unwrap();
        let err = PrepareError::TagConflict {
            tag: "v1.2".to_string(),
            existing,
            requested,
        };

        let msg = err.to_string();
        assert!(msg.starts_with("Tag conflict: 'v1.2'"));
        assert!(msg.contains(&existing.to_string()));
        assert!(msg.contains(&requested.to_string()));
    }

    #[test]
    fn test_error_messages_are_descriptive() {
        let error_pairs = vec![
            (PrepareError::repository_state("x"), "Repository state error"),
            (PrepareError::no_canonical_tag("x"), "No canonical tag"),
            (PrepareError::config("x"), "Configuration error"),
            (PrepareError::source("x"), "Source preparation failed"),
            (PrepareError::recipe("x"), "Recipe error"),
            (PrepareError::tool("x"), "External tool failed"),
        ];

        for (err, expected_prefix) in error_pairs {
            let msg = err.to_string();
            assert!(
                msg.starts_with(expected_prefix),
                "Error message should start with '{}', but got '{}'",
                expected_prefix,
                msg
            );
        }
    }

    #[test]
    fn test_fatal_for_versioning() {
        assert!(PrepareError::repository_state("shallow").is_fatal_for_versioning());
        assert!(PrepareError::no_canonical_tag("v0.0").is_fatal_for_versioning());
        assert!(!PrepareError::recipe("bad line").is_fatal_for_versioning());
        assert!(!PrepareError::tool("conda").is_fatal_for_versioning());
    }
}
