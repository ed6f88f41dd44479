use std::fmt;

/// Position of a commit relative to an anchoring tag, as `git describe` reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Descriptor {
    /// The commit is exactly the tagged commit
    Exact { tag: String },
    /// The commit is `distance` commits past the tag
    Ahead {
        tag: String,
        distance: usize,
        short_id: String,
    },
}

impl Descriptor {
    pub fn tag(&self) -> &str {
        match self {
            Descriptor::Exact { tag } | Descriptor::Ahead { tag, .. } => tag,
        }
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Descriptor::Exact { tag } => write!(f, "{}", tag),
            Descriptor::Ahead {
                tag,
                distance,
                short_id,
            } => write!(f, "{}-{}-g{}", tag, distance, short_id),
        }
    }
}

/// Final value for the package's `version` field.
///
/// Package managers reject `-` in versions, so every dash is replaced with `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionString(String);

impl VersionString {
    pub fn from_descriptor(descriptor: &Descriptor) -> Self {
        Self::normalize(&descriptor.to_string())
    }

    /// Normalize a raw descriptor string
    pub fn normalize(raw: &str) -> Self {
        VersionString(raw.replace('-', "_"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<VersionString> for String {
    fn from(version: VersionString) -> Self {
        version.0
    }
}
