//! Conflict recording and human-readable explanation chains.

use std::fmt;

use pyrite_core::requirement::{PackageName, Requirement};
use pyrite_core::version::Version;

/// One requirement constraining a package, with its provenance.
///
/// `introduced_by` is `None` for top-level requirements, otherwise the
/// (package, version) whose dependency declared it.
#[derive(Debug, Clone)]
pub struct ConflictCause {
    pub requirement: Requirement,
    pub introduced_by: Option<(PackageName, Version)>,
}

/// Why no version could be chosen for one package.
#[derive(Debug, Clone)]
pub struct Conflict {
    pub package: PackageName,
    pub causes: Vec<ConflictCause>,
    /// Versions the provider actually had for the package.
    pub available: Vec<Version>,
}

/// The conflict chain carried out of a failed resolution.
///
/// At most one conflict is kept per package; a later record for the same
/// package replaces the earlier one, so the report reflects the deepest
/// failed branch.
#[derive(Debug, Clone, Default)]
pub struct ConflictReport {
    conflicts: Vec<Conflict>,
}

impl ConflictReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, conflict: Conflict) {
        self.conflicts.retain(|c| c.package != conflict.package);
        self.conflicts.push(conflict);
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Unable to choose a version for {}:", self.package)?;
        for cause in &self.causes {
            let constraint = if cause.requirement.specifiers.is_empty() {
                "any version".to_string()
            } else {
                cause.requirement.specifiers.to_string()
            };
            match &cause.introduced_by {
                Some((parent, version)) => writeln!(
                    f,
                    "  {parent} {version} requires {} ({constraint})",
                    self.package
                )?,
                None => writeln!(
                    f,
                    "  your project requires {} ({constraint})",
                    self.package
                )?,
            }
        }
        if self.available.is_empty() {
            writeln!(f, "  no versions of {} are available", self.package)?;
        } else {
            let shown: Vec<String> = self.available.iter().map(|v| v.to_string()).collect();
            writeln!(
                f,
                "  the available versions of {} are: {}",
                self.package,
                shown.join(", ")
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, conflict) in self.conflicts.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{conflict}")?;
        }
        Ok(())
    }
}
