use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for all Pyrite operations.
#[derive(Debug, Error, Diagnostic)]
pub enum PyriteError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or malformed manifest (e.g. Pyrite.toml).
    #[error("Manifest error: {message}")]
    #[diagnostic(help("Check your Pyrite.toml for syntax errors"))]
    Manifest { message: String },

    /// A version string that does not follow the versioning scheme.
    #[error("Malformed version: {input:?}")]
    #[diagnostic(help("Versions look like 1.2.3, 2.0rc1, 1.0.post2 or 1.0+local"))]
    MalformedVersion { input: String },

    /// A version specifier or requirement string that cannot be parsed.
    #[error("Malformed specifier: {input:?}: {reason}")]
    MalformedSpecifier { input: String, reason: String },

    /// The lockfile was produced by a newer, incompatible Pyrite.
    #[error("Lockfile schema version {found} is newer than supported ({supported})")]
    #[diagnostic(help("Upgrade pyrite, or delete Pyrite.lock and re-lock"))]
    IncompatibleLockFormat { found: u32, supported: u32 },

    /// A lockfile that parsed but violates its own invariants.
    #[error("Invalid lockfile: {message}")]
    Lockfile { message: String },

    /// Network request failed.
    #[error("Network error: {message}")]
    Network { message: String },

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}

/// Convenience alias for `miette::Result<T>`.
pub type PyriteResult<T> = miette::Result<T>;
