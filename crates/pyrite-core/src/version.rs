//! Package version parsing, comparison, and precedence.
//!
//! Versions follow the Python packaging scheme:
//! `[epoch!]release[{a|b|rc}N][.postN][.devN][+local]`. Precedence within
//! one release number is `dev < a < b < rc < final < post`, the local
//! segment breaks ties last, and trailing zero release segments are
//! insignificant (`1.0` equals `1.0.0`). Equality is structural, never a
//! string comparison.

use std::cmp::Ordering;
use std::fmt;

use pyrite_util::errors::PyriteError;

/// A parsed, comparable package version.
#[derive(Debug, Clone)]
pub struct Version {
    original: String,
    pub epoch: u32,
    pub release: Vec<u64>,
    pub pre: Option<(PreKind, u64)>,
    pub post: Option<u64>,
    pub dev: Option<u64>,
    pub local: Vec<LocalSegment>,
}

/// Pre-release stage, in precedence order.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub enum PreKind {
    Alpha,
    Beta,
    Rc,
}

/// One dot-separated segment of the local version part.
///
/// Alphanumeric segments sort before numeric ones.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum LocalSegment {
    Text(String),
    Number(u64),
}

impl Version {
    /// Parse a version string, or fail with [`PyriteError::MalformedVersion`].
    pub fn parse(input: &str) -> Result<Self, PyriteError> {
        let malformed = || PyriteError::MalformedVersion {
            input: input.to_string(),
        };

        let mut s = input.trim().to_ascii_lowercase();
        if let Some(stripped) = s.strip_prefix('v') {
            s = stripped.to_string();
        }
        if s.is_empty() {
            return Err(malformed());
        }

        // Local segment comes after `+`.
        let (s, local_str) = match s.split_once('+') {
            Some((head, local)) => (head.to_string(), Some(local.to_string())),
            None => (s, None),
        };
        let mut local = Vec::new();
        if let Some(local_str) = local_str {
            for seg in local_str.split(['.', '-', '_']) {
                if seg.is_empty() || !seg.bytes().all(|b| b.is_ascii_alphanumeric()) {
                    return Err(malformed());
                }
                local.push(match seg.parse::<u64>() {
                    Ok(n) => LocalSegment::Number(n),
                    Err(_) => LocalSegment::Text(seg.to_string()),
                });
            }
        }

        // Optional epoch before `!`.
        let (epoch, s) = match s.split_once('!') {
            Some((e, rest)) => (e.parse::<u32>().map_err(|_| malformed())?, rest.to_string()),
            None => (0, s),
        };

        // Release: dot-separated numbers.
        let bytes = s.as_bytes();
        let mut release = Vec::new();
        let mut i = 0;
        loop {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if start == i {
                return Err(malformed());
            }
            release.push(s[start..i].parse::<u64>().map_err(|_| malformed())?);
            if i + 1 < bytes.len() && bytes[i] == b'.' && bytes[i + 1].is_ascii_digit() {
                i += 1;
                continue;
            }
            break;
        }

        // Remainder: pre-release, post-release, dev-release in any order.
        let rest = s[i..].replace(['-', '_'], ".");
        let mut pre = None;
        let mut post = None;
        let mut dev = None;

        let mut chars = rest.chars().peekable();
        while chars.peek().is_some() {
            if chars.peek() == Some(&'.') {
                chars.next();
            }
            let mut word = String::new();
            while chars.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
                word.push(chars.next().unwrap());
            }
            if chars.peek() == Some(&'.') && !word.is_empty() {
                chars.next();
            }
            let mut digits = String::new();
            while chars.peek().is_some_and(|c| c.is_ascii_digit()) {
                digits.push(chars.next().unwrap());
            }
            if word.is_empty() && digits.is_empty() {
                return Err(malformed());
            }
            let number = if digits.is_empty() {
                0
            } else {
                digits.parse::<u64>().map_err(|_| malformed())?
            };

            match word.as_str() {
                "a" | "alpha" => set_once(&mut pre, (PreKind::Alpha, number)).ok_or_else(malformed)?,
                "b" | "beta" => set_once(&mut pre, (PreKind::Beta, number)).ok_or_else(malformed)?,
                "c" | "rc" | "pre" | "preview" => {
                    set_once(&mut pre, (PreKind::Rc, number)).ok_or_else(malformed)?
                }
                "post" | "rev" | "r" => set_once(&mut post, number).ok_or_else(malformed)?,
                // Implicit post release: `1.0-1`.
                "" => set_once(&mut post, number).ok_or_else(malformed)?,
                "dev" => set_once(&mut dev, number).ok_or_else(malformed)?,
                _ => return Err(malformed()),
            }
        }

        Ok(Version {
            original: input.trim().to_string(),
            epoch,
            release,
            pre,
            post,
            dev,
            local,
        })
    }

    /// Whether this is a pre-release or dev-release (not a stable version).
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    pub fn has_local(&self) -> bool {
        !self.local.is_empty()
    }

    /// Release segments with insignificant trailing zeros removed.
    fn trimmed_release(&self) -> &[u64] {
        let mut len = self.release.len();
        while len > 1 && self.release[len - 1] == 0 {
            len -= 1;
        }
        &self.release[..len]
    }

    /// The full precedence key: pre sorts below final, post above, and a
    /// dev marker drags the whole version below its pre-release peers.
    fn cmp_key(&self) -> (u32, &[u64], PreKey, PostKey, DevKey, &[LocalSegment]) {
        let pre = match (self.pre, self.post, self.dev) {
            (None, None, Some(_)) => PreKey::DevFloor,
            (None, _, _) => PreKey::Final,
            (Some((kind, n)), _, _) => PreKey::Pre(kind, n),
        };
        let post = match self.post {
            Some(n) => PostKey::Post(n),
            None => PostKey::None,
        };
        let dev = match self.dev {
            Some(n) => DevKey::Dev(n),
            None => DevKey::Final,
        };
        (self.epoch, self.trimmed_release(), pre, post, dev, &self.local)
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T) -> Option<()> {
    if slot.is_some() {
        return None;
    }
    *slot = Some(value);
    Some(())
}

#[derive(Eq, PartialEq, Ord, PartialOrd)]
enum PreKey {
    DevFloor,
    Pre(PreKind, u64),
    Final,
}

#[derive(Eq, PartialEq, Ord, PartialOrd)]
enum PostKey {
    None,
    Post(u64),
}

#[derive(Eq, PartialEq, Ord, PartialOrd)]
enum DevKey {
    Dev(u64),
    Final,
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_key().cmp(&other.cmp_key())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}
