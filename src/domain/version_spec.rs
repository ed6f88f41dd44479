//! Version-like substrings in arbitrary tag names.
//!
//! Tag names in the wild use several punctuation dialects (`1.2.3`,
//! `release_1_2`, `0-78-91-rc5`). The grammar recognized here, anywhere in the
//! string, is:
//!
//! ```text
//! version   := integer sep integer [sep integer [sep integer]] [rc-suffix]
//! rc-suffix := sep* "rc" integer
//! sep       := '.' | '_' | '-'
//! ```
//!
//! Each separator is chosen independently, so `2_1-rc2` is as valid as
//! `2.1.rc2`. The leftmost match wins and optional groups are taken greedily.

use std::fmt;

/// Characters accepted between numeric groups
pub const SEPARATORS: [u8; 3] = [b'.', b'_', b'-'];

/// Parsed numeric version extracted from a tag name
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionSpec {
    pub major: u64,
    pub minor: u64,
    pub micro: Option<u64>,
    /// Only present when `micro` is
    pub extra: Option<u64>,
    /// Release candidate number
    pub rc: Option<u64>,
}

impl VersionSpec {
    /// Create a two-component version
    pub fn new(major: u64, minor: u64) -> Self {
        VersionSpec {
            major,
            minor,
            micro: None,
            extra: None,
            rc: None,
        }
    }

    pub fn with_micro(mut self, micro: u64) -> Self {
        self.micro = Some(micro);
        self
    }

    /// Set the fourth component; ignored unless a micro component is present
    pub fn with_extra(mut self, extra: u64) -> Self {
        if self.micro.is_some() {
            self.extra = Some(extra);
        }
        self
    }

    pub fn with_rc(mut self, rc: u64) -> Self {
        self.rc = Some(rc);
        self
    }

    /// Search a tag name for the first version-like substring.
    ///
    /// Returns `None` when the name holds no `integer sep integer` run.
    ///
    /// # Example
    /// ```
    /// # use conda_build_prepare::domain::VersionSpec;
    /// let spec = VersionSpec::find("2_1-rc2").unwrap();
    /// assert_eq!(spec, VersionSpec::new(2, 1).with_rc(2));
    /// assert_eq!(spec.canonical_name(), "v2.1-rc2");
    /// assert!(VersionSpec::find("release-5").is_none());
    /// ```
    pub fn find(tag: &str) -> Option<Self> {
        let bytes = tag.as_bytes();

        // A match can only begin where a digit run begins: starting in the
        // middle of a run leaves the same character after the run.
        (0..bytes.len())
            .filter(|&i| bytes[i].is_ascii_digit() && (i == 0 || !bytes[i - 1].is_ascii_digit()))
            .find_map(|start| Scanner::new(bytes, start).version())
    }

    /// The numeric components in order, two to four of them
    pub fn components(&self) -> Vec<u64> {
        let mut components = vec![self.major, self.minor];
        components.extend(self.micro);
        components.extend(self.extra);
        components
    }

    /// Name of the canonical tag for this version (e.g. `v1.2.3-rc1`)
    pub fn canonical_name(&self) -> String {
        format!("v{}", self)
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .components()
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(".");
        write!(f, "{}", joined)?;
        if let Some(rc) = self.rc {
            write!(f, "-rc{}", rc)?;
        }
        Ok(())
    }
}

/// Cursor over the bytes of a tag name.
///
/// Every optional step either consumes its whole production or leaves the
/// position untouched.
struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(bytes: &'a [u8], pos: usize) -> Self {
        Scanner { bytes, pos }
    }

    fn version(&mut self) -> Option<VersionSpec> {
        let major = self.integer()?;
        let minor = self.separated_integer()?;

        let mut spec = VersionSpec::new(major, minor);
        if let Some(micro) = self.separated_integer() {
            spec = spec.with_micro(micro);
            if let Some(extra) = self.separated_integer() {
                spec = spec.with_extra(extra);
            }
        }
        if let Some(rc) = self.rc_suffix() {
            spec = spec.with_rc(rc);
        }

        Some(spec)
    }

    /// A maximal run of ASCII digits that fits in a `u64`
    fn integer(&mut self) -> Option<u64> {
        let start = self.pos;
        let end = self.bytes[start..]
            .iter()
            .position(|b| !b.is_ascii_digit())
            .map_or(self.bytes.len(), |offset| start + offset);

        if end == start {
            return None;
        }

        let value = std::str::from_utf8(&self.bytes[start..end])
            .ok()?
            .parse::<u64>()
            .ok()?;
        self.pos = end;
        Some(value)
    }

    fn separator(&mut self) -> bool {
        match self.bytes.get(self.pos) {
            Some(b) if SEPARATORS.contains(b) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn separated_integer(&mut self) -> Option<u64> {
        let start = self.pos;
        if self.separator() {
            if let Some(value) = self.integer() {
                return Some(value);
            }
        }
        self.pos = start;
        None
    }

    fn rc_suffix(&mut self) -> Option<u64> {
        let start = self.pos;
        while self.separator() {}

        if self.bytes[self.pos..].starts_with(b"rc") {
            self.pos += 2;
            if let Some(rc) = self.integer() {
                return Some(rc);
            }
        }
        self.pos = start;
        None
    }
}
