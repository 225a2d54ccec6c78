//! Operation: resolve all dependencies and regenerate Pyrite.lock.

use std::collections::BTreeMap;
use std::path::Path;

use pyrite_core::lockfile::Lockfile;
use pyrite_core::requirement::{PackageName, Requirement};
use pyrite_core::version::Version;
use pyrite_resolver::resolver::ResolveOptions;
use pyrite_util::errors::PyriteError;
use pyrite_util::progress;
use tracing::debug;

use crate::load_project;

/// Options for `pyrite lock`.
#[derive(Default)]
pub struct LockOptions {
    /// Consider pre-release versions for every package.
    pub allow_prerelease: bool,
    /// Ignore the existing lockfile's pins and resolve from scratch.
    pub refresh: bool,
    pub verbose: bool,
}

/// Resolve the manifest's requirements and write `Pyrite.lock`.
///
/// When a compatible lockfile already exists and `refresh` is not set,
/// its pins are preferred so unrelated packages keep their versions.
pub async fn lock(project_root: &Path, opts: &LockOptions) -> miette::Result<()> {
    let ctx = load_project(project_root)?;

    let lockfile_path = project_root.join("Pyrite.lock");
    let existing = if lockfile_path.is_file() {
        Some(Lockfile::from_path(&lockfile_path)?)
    } else {
        None
    };

    let preferred = match (&existing, opts.refresh) {
        (Some(lock), false) => preferred_pins(lock),
        _ => BTreeMap::new(),
    };
    if !preferred.is_empty() {
        debug!(pins = preferred.len(), "preferring versions from existing lockfile");
    }

    let options = ResolveOptions {
        allow_prerelease: opts.allow_prerelease,
        preferred,
    };

    let resolution = super::ops_resolve::run_resolution(&ctx, &options).await?;
    let lockfile = resolution.to_lockfile(&ctx.roots);

    if let Some(previous) = &existing {
        if lock_unchanged(&lockfile, previous)? {
            progress::status("Unchanged", "Pyrite.lock is already up to date");
            return Ok(());
        }
    }

    lockfile.write_to(&lockfile_path)?;
    progress::status(
        "Locked",
        &format!(
            "{} packages in {}",
            lockfile.package.len(),
            lockfile_path.display()
        ),
    );
    if opts.verbose {
        for pkg in &lockfile.package {
            eprintln!("  {}=={}", pkg.name, pkg.version);
        }
    }

    Ok(())
}

/// Whether a fresh resolution serializes to the same bytes as the
/// existing lockfile. Serialization failures are errors, never a
/// silent "unchanged".
fn lock_unchanged(new: &Lockfile, old: &Lockfile) -> miette::Result<bool> {
    let render = |lock: &Lockfile| {
        lock.to_string_pretty().map_err(|e| PyriteError::Lockfile {
            message: format!("Failed to serialize lockfile: {e}"),
        })
    };
    Ok(render(new)? == render(old)?)
}

/// The (name, version) pins of an existing lockfile.
fn preferred_pins(lock: &Lockfile) -> BTreeMap<PackageName, Version> {
    lock.package
        .iter()
        .filter_map(|pkg| {
            let name = PackageName::new(&pkg.name).ok()?;
            let version = Version::parse(&pkg.version).ok()?;
            Some((name, version))
        })
        .collect()
}

/// Whether `Pyrite.lock` still reflects the manifest's requirements.
pub fn lock_is_current(lock: &Lockfile, roots: &[Requirement]) -> bool {
    let current: Vec<String> = roots.iter().map(|r| r.to_string()).collect();
    lock.matches_requirements(&current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyrite_core::lockfile::LockedPackage;

    fn locked(name: &str, version: &str) -> LockedPackage {
        LockedPackage {
            name: name.to_string(),
            version: version.to_string(),
            source: "https://pypi.org/pypi".to_string(),
            hashes: vec![format!("sha256:{}", "a".repeat(64))],
            dependencies: vec![],
            extras: vec![],
        }
    }

    #[test]
    fn pins_come_from_the_lockfile() {
        let lock = Lockfile::generate(
            vec!["foo>=1.0".to_string()],
            vec![locked("foo", "1.5"), locked("bar", "2.0")],
        );
        let pins = preferred_pins(&lock);
        assert_eq!(pins.len(), 2);
        assert_eq!(
            pins[&PackageName::new("foo").unwrap()],
            Version::parse("1.5").unwrap()
        );
    }

    #[test]
    fn unchanged_means_byte_identical() {
        let a = Lockfile::generate(vec!["foo>=1.0".to_string()], vec![locked("foo", "1.5")]);
        let b = Lockfile::generate(vec!["foo>=1.0".to_string()], vec![locked("foo", "1.5")]);
        let c = Lockfile::generate(vec!["foo>=1.0".to_string()], vec![locked("foo", "1.9")]);
        assert!(lock_unchanged(&a, &b).unwrap());
        assert!(!lock_unchanged(&a, &c).unwrap());
    }

    #[test]
    fn drift_is_detected() {
        let lock = Lockfile::generate(vec!["foo>=1.0".to_string()], vec![locked("foo", "1.5")]);
        let same = vec![Requirement::parse("foo>=1.0").unwrap()];
        let changed = vec![Requirement::parse("foo>=2.0").unwrap()];
        assert!(lock_is_current(&lock, &same));
        assert!(!lock_is_current(&lock, &changed));
    }
}
