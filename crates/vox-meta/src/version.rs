//! Four-component version numbers.
//!
//! Library packages carry `major.minor.patch.tweak` versions. Trailing
//! components may be omitted in the string form and default to zero, so
//! `"2"` parses to the same value as `"2.0.0.0"`. Ordering is lexicographic
//! by component.
//!
//! # Examples
//!
//! ```
//! use vox_meta::VersionNumber;
//!
//! let v: VersionNumber = "1.2".parse().unwrap();
//! assert_eq!(v, VersionNumber::new(1, 2, 0, 0));
//! assert!(v < "1.2.0.1".parse().unwrap());
//! assert_eq!(v.to_string(), "1.2");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// A `(major, minor, patch, tweak)` version value.
///
/// Ordered lexicographically by component; equality is component-wise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionNumber {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub tweak: u32,
}

impl VersionNumber {
    /// Create a version from its four components.
    pub const fn new(major: u32, minor: u32, patch: u32, tweak: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            tweak,
        }
    }

    /// The all-zero version, used when a manifest omits the field.
    pub const fn zero() -> Self {
        Self::new(0, 0, 0, 0)
    }

    /// Whether this is the all-zero version.
    pub fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    fn components(&self) -> [u32; 4] {
        [self.major, self.minor, self.patch, self.tweak]
    }
}

impl FromStr for VersionNumber {
    type Err = Error;

    /// Parse a dot-separated version string.
    ///
    /// One to four numeric components; missing trailing components default
    /// to zero. Anything else is an error.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::version(s, "empty version string"));
        }

        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() > 4 {
            return Err(Error::version(s, "more than four components"));
        }

        let mut components = [0u32; 4];
        for (i, part) in parts.iter().enumerate() {
            components[i] = part
                .parse::<u32>()
                .map_err(|_| Error::version(s, format!("invalid component '{part}'")))?;
        }

        let [major, minor, patch, tweak] = components;
        Ok(Self::new(major, minor, patch, tweak))
    }
}

impl fmt::Display for VersionNumber {
    /// Print the dot-separated form, trimming trailing zero components but
    /// always keeping `major.minor`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let components = self.components();
        let len = components
            .iter()
            .rposition(|&c| c != 0)
            .map_or(2, |idx| (idx + 1).max(2));

        let text = components[..len]
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(".");
        f.write_str(&text)
    }
}

impl Serialize for VersionNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VersionNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
