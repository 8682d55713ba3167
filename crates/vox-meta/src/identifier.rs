//! The `library[version]/id` identifier grammar.
//!
//! One string form addresses libraries and their extensions uniformly across
//! manifests, dependency declarations and user-facing commands:
//!
//! - `diffsinger` — a library with no version constraint
//! - `diffsinger[1.2]` — a library at a specific version
//! - `diffsinger[1.2]/acoustic` — an extension inside that library
//! - `acoustic` — a bare local id, resolved against some ambient library
//!
//! Tokens (library ids, local ids) are restricted to ASCII alphanumerics
//! plus `_`, `-` and `.`, must be non-empty and must not start with `.`.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::version::VersionNumber;

/// Check whether a string is a valid library or extension id token.
pub fn is_valid_id(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('.')
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// A parsed `library[version]/id` reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Identifier {
    library: Option<String>,
    version: Option<VersionNumber>,
    id: Option<String>,
}

impl Identifier {
    /// Reference a library, optionally pinned to a version.
    pub fn library(name: impl Into<String>, version: Option<VersionNumber>) -> Result<Self> {
        let name = name.into();
        if !is_valid_id(&name) {
            return Err(Error::identifier(&name, "invalid library id token"));
        }
        Ok(Self {
            library: Some(name),
            version,
            id: None,
        })
    }

    /// Reference an extension by bare local id, resolved against some
    /// ambient library (e.g. a sibling extension in the same manifest).
    pub fn local(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if !is_valid_id(&id) {
            return Err(Error::identifier(&id, "invalid extension id token"));
        }
        Ok(Self {
            library: None,
            version: None,
            id: Some(id),
        })
    }

    /// Reference an extension inside a library.
    pub fn extension(
        library: impl Into<String>,
        version: Option<VersionNumber>,
        id: impl Into<String>,
    ) -> Result<Self> {
        let mut identifier = Self::library(library, version)?;
        let id = id.into();
        if !is_valid_id(&id) {
            return Err(Error::identifier(&id, "invalid extension id token"));
        }
        identifier.id = Some(id);
        Ok(identifier)
    }

    /// The library name, if present.
    pub fn library_name(&self) -> Option<&str> {
        self.library.as_deref()
    }

    /// The pinned version, if present. Absent means "no version constraint".
    pub fn version(&self) -> Option<&VersionNumber> {
        self.version.as_ref()
    }

    /// The local extension id, if present.
    pub fn local_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Whether this reference names a library (with or without a local id).
    pub fn has_library(&self) -> bool {
        self.library.is_some()
    }
}

impl FromStr for Identifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::identifier(s, "empty identifier"));
        }

        let (head, local) = match s.split_once('/') {
            Some((head, local)) => {
                if local.contains('/') {
                    return Err(Error::identifier(s, "more than one '/' separator"));
                }
                (head, Some(local))
            }
            None => (s, None),
        };

        let (name, version) = parse_versioned(head).map_err(|reason| Error::identifier(s, reason))?;

        match local {
            Some(local) => Self::extension(name, version, local),
            None if version.is_some() => Self::library(name, version),
            None => {
                // A bare token is ambiguous between a library and a local id;
                // treat it as a library reference, which covers dependency
                // declarations. Callers needing a bare local id construct it
                // explicitly.
                Self::library(name, None)
            }
        }
    }
}

/// Split `name[version]` into its parts. Returns the reason on failure.
fn parse_versioned(s: &str) -> std::result::Result<(&str, Option<VersionNumber>), String> {
    match s.find('[') {
        Some(open) => {
            if !s.ends_with(']') {
                return Err("unterminated version bracket".to_string());
            }
            let name = &s[..open];
            let version_str = &s[open + 1..s.len() - 1];
            let version = version_str
                .parse::<VersionNumber>()
                .map_err(|e| e.to_string())?;
            Ok((name, Some(version)))
        }
        None => {
            if s.contains(']') {
                return Err("unmatched ']'".to_string());
            }
            Ok((s, None))
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(library) = &self.library {
            f.write_str(library)?;
            if let Some(version) = &self.version {
                write!(f, "[{version}]")?;
            }
            if let Some(id) = &self.id {
                write!(f, "/{id}")?;
            }
        } else if let Some(id) = &self.id {
            f.write_str(id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_is_valid_id() {
        assert!(is_valid_id("diffsinger"));
        assert!(is_valid_id("lib-1_2.x"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id(".hidden"));
        assert!(!is_valid_id("a/b"));
        assert!(!is_valid_id("a[1]"));
        assert!(!is_valid_id("sp ace"));
    }

    #[test]
    fn test_parse_bare_library() {
        let id: Identifier = "diffsinger".parse().unwrap();
        assert_eq!(id.library_name(), Some("diffsinger"));
        assert_eq!(id.version(), None);
        assert_eq!(id.local_id(), None);
    }

    #[test]
    fn test_parse_versioned_library() {
        let id: Identifier = "diffsinger[1.2]".parse().unwrap();
        assert_eq!(id.library_name(), Some("diffsinger"));
        assert_eq!(id.version(), Some(&VersionNumber::new(1, 2, 0, 0)));
    }

    #[test]
    fn test_parse_extension_reference() {
        let id: Identifier = "diffsinger[1.2.0.1]/acoustic".parse().unwrap();
        assert_eq!(id.library_name(), Some("diffsinger"));
        assert_eq!(id.version(), Some(&VersionNumber::new(1, 2, 0, 1)));
        assert_eq!(id.local_id(), Some("acoustic"));
    }

    #[test]
    fn test_parse_unversioned_extension_reference() {
        let id: Identifier = "diffsinger/acoustic".parse().unwrap();
        assert_eq!(id.library_name(), Some("diffsinger"));
        assert_eq!(id.version(), None);
        assert_eq!(id.local_id(), Some("acoustic"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("".parse::<Identifier>().is_err());
        assert!("lib[1.0".parse::<Identifier>().is_err());
        assert!("lib]1.0[".parse::<Identifier>().is_err());
        assert!("lib[abc]".parse::<Identifier>().is_err());
        assert!("a/b/c".parse::<Identifier>().is_err());
        assert!("[1.0]".parse::<Identifier>().is_err());
    }

    #[test]
    fn test_local_reference() {
        let id = Identifier::local("acoustic").unwrap();
        assert_eq!(id.library_name(), None);
        assert_eq!(id.local_id(), Some("acoustic"));
        assert!(!id.has_library());
        assert_eq!(id.to_string(), "acoustic");

        assert!(Identifier::local("a/b").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for text in ["diffsinger", "diffsinger[1.2]", "diffsinger[1.2]/acoustic"] {
            let id: Identifier = text.parse().unwrap();
            assert_eq!(id.to_string(), text);
        }
    }
}
