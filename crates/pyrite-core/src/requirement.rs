//! Package requirements: a normalized name plus version specifiers,
//! extras, an optional environment marker, and an optional index pin.
//!
//! Requirements parse from `requests[socks]>=2.0,<3.0; python_version >= "3.9"`
//! style strings or from the manifest's detailed TOML form, and are
//! immutable once created.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use pyrite_util::errors::PyriteError;

use crate::marker::{Environment, Marker};
use crate::specifier::SpecifierSet;

/// Normalize a package or extra name: lowercase, with runs of `-`, `_`
/// and `.` collapsed to a single `-`.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut dash_pending = false;
    for c in name.trim().chars() {
        if c == '-' || c == '_' || c == '.' {
            dash_pending = !out.is_empty();
        } else {
            if dash_pending {
                out.push('-');
                dash_pending = false;
            }
            out.push(c.to_ascii_lowercase());
        }
    }
    out
}

/// A normalized, case- and separator-insensitive package name.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PackageName(String);

impl PackageName {
    /// Normalize and validate a raw name.
    pub fn new(raw: &str) -> Result<Self, PyriteError> {
        let normalized = normalize_name(raw);
        if normalized.is_empty()
            || !normalized
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-')
        {
            return Err(PyriteError::MalformedSpecifier {
                input: raw.to_string(),
                reason: "invalid package name".to_string(),
            });
        }
        Ok(PackageName(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single declared dependency requirement.
#[derive(Debug, Clone)]
pub struct Requirement {
    pub name: PackageName,
    pub extras: BTreeSet<String>,
    pub specifiers: SpecifierSet,
    pub marker: Option<Marker>,
    /// Explicit index pin; `None` means any configured index.
    pub index: Option<String>,
}

impl Requirement {
    /// Parse a requirement string: `name[extra,...]<specifiers>; marker`.
    pub fn parse(input: &str) -> Result<Self, PyriteError> {
        let malformed = |reason: &str| PyriteError::MalformedSpecifier {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let s = input.trim();
        let (head, marker_str) = match s.split_once(';') {
            Some((head, marker)) => (head.trim(), Some(marker.trim())),
            None => (s, None),
        };

        // Name runs until `[`, `(`, an operator character, or whitespace.
        let name_end = head
            .find(|c: char| "[(<>=!~ ".contains(c))
            .unwrap_or(head.len());
        let name = PackageName::new(&head[..name_end])?;
        let mut rest = head[name_end..].trim_start();

        let mut extras = BTreeSet::new();
        if let Some(after) = rest.strip_prefix('[') {
            let close = after.find(']').ok_or_else(|| malformed("unclosed extras"))?;
            for extra in after[..close].split(',') {
                let extra = normalize_name(extra);
                if extra.is_empty() {
                    return Err(malformed("empty extra name"));
                }
                extras.insert(extra);
            }
            rest = after[close + 1..].trim_start();
        }

        // Specifiers may be parenthesized: `name (>=1.0)`.
        let spec_str = rest
            .strip_prefix('(')
            .map(|r| {
                r.strip_suffix(')')
                    .ok_or_else(|| malformed("unclosed parenthesis"))
            })
            .transpose()?
            .unwrap_or(rest);

        let specifiers = SpecifierSet::parse(spec_str)?;
        let marker = marker_str.map(Marker::parse).transpose()?;

        Ok(Requirement {
            name,
            extras,
            specifiers,
            marker,
            index: None,
        })
    }

    /// Build a requirement from a manifest entry.
    pub fn from_spec(name: &str, spec: &DependencySpec) -> Result<Self, PyriteError> {
        match spec {
            DependencySpec::Short(version) => Ok(Requirement {
                name: PackageName::new(name)?,
                extras: BTreeSet::new(),
                specifiers: SpecifierSet::parse(version)?,
                marker: None,
                index: None,
            }),
            DependencySpec::Detailed(detail) => {
                let mut extras = BTreeSet::new();
                for extra in &detail.extras {
                    let extra = normalize_name(extra);
                    if extra.is_empty() {
                        return Err(PyriteError::MalformedSpecifier {
                            input: name.to_string(),
                            reason: "empty extra name".to_string(),
                        });
                    }
                    extras.insert(extra);
                }
                Ok(Requirement {
                    name: PackageName::new(name)?,
                    extras,
                    specifiers: SpecifierSet::parse(&detail.version)?,
                    marker: detail.markers.as_deref().map(Marker::parse).transpose()?,
                    index: detail.index.clone(),
                })
            }
        }
    }

    /// Whether this requirement applies under the given environment and
    /// active extras. Requirements without a marker always apply.
    pub fn is_active(&self, env: &Environment, extras: &BTreeSet<String>) -> bool {
        match &self.marker {
            Some(marker) => marker.evaluate(env, extras),
            None => true,
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            let extras: Vec<&str> = self.extras.iter().map(String::as_str).collect();
            write!(f, "[{}]", extras.join(","))?;
        }
        if !self.specifiers.is_empty() {
            write!(f, "{}", self.specifiers)?;
        }
        if let Some(ref marker) = self.marker {
            write!(f, "; {marker}")?;
        }
        if let Some(ref index) = self.index {
            write!(f, " @index={index}")?;
        }
        Ok(())
    }
}

/// A dependency entry in `Pyrite.toml`.
///
/// Supports both the shorthand string form (`">=1.0,<2.0"`) and a
/// detailed table form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    Short(String),
    Detailed(DetailedDependency),
}

/// Detailed dependency form with extras, markers, and an index pin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedDependency {
    pub version: String,
    #[serde(default)]
    pub extras: Vec<String>,
    #[serde(default)]
    pub markers: Option<String>,
    #[serde(default)]
    pub index: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_normalization() {
        assert_eq!(normalize_name("Flask"), "flask");
        assert_eq!(normalize_name("typing_extensions"), "typing-extensions");
        assert_eq!(normalize_name("zope.interface"), "zope-interface");
        assert_eq!(normalize_name("My__Weird..Name"), "my-weird-name");
    }

    #[test]
    fn names_compare_normalized() {
        assert_eq!(
            PackageName::new("Typing_Extensions").unwrap(),
            PackageName::new("typing-extensions").unwrap()
        );
        assert!(PackageName::new("").is_err());
        assert!(PackageName::new("not a name").is_err());
    }
}
