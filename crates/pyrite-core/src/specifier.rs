//! Version specifiers and specifier sets.
//!
//! A specifier is one `(operator, version)` pair such as `>=1.0` or
//! `==2.1.*`; a specifier set joins several with AND. Combining two sets
//! for the same package is a pure intersection: the pairs are concatenated
//! and every one must hold.

use std::fmt;

use pyrite_util::errors::PyriteError;

use crate::version::Version;

/// Comparison operator of a version specifier.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Operator {
    /// `==`, including the `==1.2.*` wildcard form.
    Equal,
    /// `!=`, including the wildcard form.
    NotEqual,
    GreaterEq,
    LessEq,
    Greater,
    Less,
    /// `~=`: compatible release, `~=1.2` means `>=1.2, ==1.*`.
    Compatible,
    /// `===`: arbitrary string equality, used as an escape hatch.
    ArbitraryEq,
}

impl Operator {
    fn as_str(&self) -> &'static str {
        match self {
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::GreaterEq => ">=",
            Operator::LessEq => "<=",
            Operator::Greater => ">",
            Operator::Less => "<",
            Operator::Compatible => "~=",
            Operator::ArbitraryEq => "===",
        }
    }
}

/// A single version constraint.
#[derive(Debug, Clone)]
pub struct Specifier {
    pub op: Operator,
    version: Version,
    raw_version: String,
    wildcard: bool,
}

impl Specifier {
    /// Parse one specifier like `>=1.0` or `==2.*`.
    pub fn parse(input: &str) -> Result<Self, PyriteError> {
        let s = input.trim();
        let malformed = |reason: &str| PyriteError::MalformedSpecifier {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        // Longest operators first so `==` is not read as two tokens.
        let (op, rest) = if let Some(r) = s.strip_prefix("===") {
            (Operator::ArbitraryEq, r)
        } else if let Some(r) = s.strip_prefix("==") {
            (Operator::Equal, r)
        } else if let Some(r) = s.strip_prefix("!=") {
            (Operator::NotEqual, r)
        } else if let Some(r) = s.strip_prefix(">=") {
            (Operator::GreaterEq, r)
        } else if let Some(r) = s.strip_prefix("<=") {
            (Operator::LessEq, r)
        } else if let Some(r) = s.strip_prefix("~=") {
            (Operator::Compatible, r)
        } else if let Some(r) = s.strip_prefix('>') {
            (Operator::Greater, r)
        } else if let Some(r) = s.strip_prefix('<') {
            (Operator::Less, r)
        } else {
            return Err(malformed("missing comparison operator"));
        };

        let raw_version = rest.trim().to_string();
        if raw_version.is_empty() {
            return Err(malformed("missing version"));
        }

        let (version_part, wildcard) = match raw_version.strip_suffix(".*") {
            Some(prefix) => (prefix, true),
            None => (raw_version.as_str(), false),
        };
        if wildcard && !matches!(op, Operator::Equal | Operator::NotEqual) {
            return Err(malformed("wildcard is only valid with == or !="));
        }

        let version = if op == Operator::ArbitraryEq {
            // `===` compares the raw string; a placeholder key keeps the
            // struct uniform without requiring the text to parse.
            Version::parse(version_part).unwrap_or_else(|_| Version::parse("0").unwrap())
        } else {
            Version::parse(version_part)?
        };

        if op == Operator::Compatible && version.release.len() < 2 {
            return Err(malformed("~= requires at least two release segments"));
        }

        Ok(Specifier {
            op,
            version,
            raw_version,
            wildcard,
        })
    }

    /// Check whether a version satisfies this specifier.
    pub fn contains(&self, candidate: &Version) -> bool {
        match self.op {
            Operator::ArbitraryEq => candidate.to_string() == self.raw_version,
            Operator::Equal if self.wildcard => self.prefix_matches(candidate),
            Operator::NotEqual if self.wildcard => !self.prefix_matches(candidate),
            Operator::Equal => candidate == &self.version,
            Operator::NotEqual => candidate != &self.version,
            Operator::GreaterEq => candidate >= &self.version,
            Operator::LessEq => candidate <= &self.version,
            Operator::Greater => candidate > &self.version,
            Operator::Less => candidate < &self.version,
            Operator::Compatible => {
                let mut prefix = self.version.release.clone();
                prefix.pop();
                candidate >= &self.version && starts_with(&candidate.release, &prefix)
            }
        }
    }

    /// Whether this specifier explicitly names a pre-release, which opts
    /// the package into pre-release candidates.
    pub fn mentions_prerelease(&self) -> bool {
        self.version.is_prerelease()
    }

    fn prefix_matches(&self, candidate: &Version) -> bool {
        candidate.epoch == self.version.epoch
            && starts_with(&candidate.release, &self.version.release)
    }
}

fn starts_with(release: &[u64], prefix: &[u64]) -> bool {
    // Pad with zeros so `1.0` matches the prefix `1.0.0`.
    (0..prefix.len()).all(|i| release.get(i).copied().unwrap_or(0) == prefix[i])
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op.as_str(), self.raw_version)
    }
}

/// An AND-combined list of specifiers.
#[derive(Debug, Clone, Default)]
pub struct SpecifierSet {
    specs: Vec<Specifier>,
}

impl SpecifierSet {
    /// The unconstrained set, satisfied by every version.
    pub fn any() -> Self {
        Self::default()
    }

    /// Parse a comma-separated specifier list like `>=1.0,<2.0`.
    ///
    /// `*` and the empty string parse to the unconstrained set.
    pub fn parse(input: &str) -> Result<Self, PyriteError> {
        let s = input.trim();
        if s.is_empty() || s == "*" {
            return Ok(Self::any());
        }
        let mut specs = Vec::new();
        for part in s.split(',') {
            specs.push(Specifier::parse(part)?);
        }
        Ok(SpecifierSet { specs })
    }

    /// Intersect with another set. Pure AND: the result is satisfied only
    /// by versions satisfying both inputs.
    pub fn merge(&mut self, other: &SpecifierSet) {
        self.specs.extend(other.specs.iter().cloned());
    }

    pub fn contains(&self, version: &Version) -> bool {
        self.specs.iter().all(|s| s.contains(version))
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// True when any member names a pre-release explicitly.
    pub fn mentions_prerelease(&self) -> bool {
        self.specs.iter().any(|s| s.mentions_prerelease())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Specifier> {
        self.specs.iter()
    }
}

impl fmt::Display for SpecifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, spec) in self.specs.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{spec}")?;
        }
        Ok(())
    }
}
