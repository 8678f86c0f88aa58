//! Build failures

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Error raised while bundling a single job
///
/// The first error aborts every job after it; bundles already written stay on disk.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("input '{name}' does not exist: {}", path.display())]
    MissingInput { name: String, path: PathBuf },

    #[error("could not resolve '{specifier}' from {importer}")]
    Unresolved { specifier: String, importer: String },

    #[error("'{name}' is not exported by {module}, imported by {importer}")]
    MissingExport {
        name: String,
        module: String,
        importer: String,
    },

    #[error("failed to transform {module}: {reason}")]
    Transform { module: String, reason: String },

    #[error("plugin '{plugin}' failed on {module}")]
    Plugin {
        plugin: String,
        module: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid glob pattern '{pattern}'")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl BuildError {
    pub fn transform(module: impl Into<String>, reason: impl Into<String>) -> Self {
        BuildError::Transform {
            module: module.into(),
            reason: reason.into(),
        }
    }
}
