//! Module resolution
//!
//! Handles resolving import specifiers to actual file paths.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

use crate::config::ResolveOptions;
use crate::transform::REQUIRE_FN;

/// Registry requires left in linked module code
static DEPENDENCY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"__distpack_require__\("([^"]+)"\)"#).unwrap()
});

/// Module resolver
#[derive(Debug, Clone)]
pub struct Resolver {
    /// Extensions tried for extension-less specifiers
    extensions: Vec<String>,

    /// package.json entry fields, in order
    main_fields: Vec<String>,

    /// Look inside directories for an `index` file
    directory_index: bool,

    /// Honor a string `browser` field
    browser: bool,
}

impl Resolver {
    /// Resolver configured from the `resolve` plugin options
    pub fn new(options: &ResolveOptions) -> Self {
        Self {
            extensions: options.extensions.clone(),
            main_fields: options.main_fields.clone(),
            directory_index: true,
            browser: options.browser,
        }
    }

    /// The bundler's own resolution of relative imports, used when no
    /// plugin resolves a specifier
    pub fn core() -> Self {
        Self {
            extensions: vec![".mjs".to_string(), ".js".to_string()],
            main_fields: Vec::new(),
            directory_index: false,
            browser: false,
        }
    }

    /// Extract registry dependencies from linked code, in first-use order
    pub fn extract_dependencies(code: &str) -> Vec<String> {
        let mut dependencies = Vec::new();

        for cap in DEPENDENCY_REGEX.captures_iter(code) {
            let specifier = cap[1].to_string();
            if !dependencies.contains(&specifier) {
                dependencies.push(specifier);
            }
        }

        debug!("Found {} dependencies", dependencies.len());

        dependencies
    }

    /// Point registry requires at resolved module ids
    pub fn rewrite_dependencies(code: &str, ids: &HashMap<String, String>) -> String {
        DEPENDENCY_REGEX
            .replace_all(code, |caps: &Captures<'_>| match ids.get(&caps[1]) {
                Some(id) => format!("{}({})", REQUIRE_FN, serde_json::Value::String(id.clone())),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// Whether a specifier is a relative or absolute path
    pub fn is_path_specifier(specifier: &str) -> bool {
        specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/')
            || specifier == "." || specifier == ".."
    }

    /// Resolve an import specifier to an absolute file path
    pub fn resolve(&self, specifier: &str, from: &Path) -> Result<Option<PathBuf>> {
        debug!("Resolving '{}' from '{}'", specifier, from.display());

        let resolved = if Self::is_path_specifier(specifier) {
            let base_dir = from.parent().unwrap_or(Path::new("."));
            self.resolve_relative(specifier, base_dir)
        } else {
            self.resolve_bare(specifier, from)?
        };

        debug!("Resolved to: {:?}", resolved);

        Ok(resolved)
    }

    /// Resolve a relative import
    pub fn resolve_relative(&self, specifier: &str, base_dir: &Path) -> Option<PathBuf> {
        let target = base_dir.join(specifier);

        // Try exact path first
        if target.is_file() {
            return Some(target);
        }

        // Try adding extensions
        for ext in &self.extensions {
            let with_ext = append_extension(&target, ext);
            if with_ext.is_file() {
                return Some(with_ext);
            }
        }

        // Try as directory with index file
        if self.directory_index && target.is_dir() {
            for ext in &self.extensions {
                let index = target.join(format!("index{}", ext));
                if index.is_file() {
                    return Some(index);
                }
            }
        }

        None
    }

    /// Resolve a bare import (from node_modules)
    fn resolve_bare(&self, specifier: &str, from: &Path) -> Result<Option<PathBuf>> {
        let mut current = from.parent().map(Path::to_path_buf).unwrap_or_default();

        // Walk up directory tree looking for node_modules
        loop {
            let node_modules = current.join("node_modules");

            if node_modules.is_dir() {
                if let Some(resolved) = self.resolve_in_node_modules(&node_modules, specifier)? {
                    return Ok(Some(resolved));
                }
            }

            if !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Resolve a module within a node_modules directory
    fn resolve_in_node_modules(&self, node_modules: &Path, specifier: &str) -> Result<Option<PathBuf>> {
        // Split specifier into package name and subpath
        let (package_name, subpath) = if specifier.starts_with('@') {
            // Scoped package: @scope/name or @scope/name/subpath
            let parts: Vec<&str> = specifier.splitn(3, '/').collect();
            if parts.len() < 2 {
                return Ok(None);
            }
            let name = format!("{}/{}", parts[0], parts[1]);
            let sub = parts.get(2).map(|s| s.to_string());
            (name, sub)
        } else {
            let parts: Vec<&str> = specifier.splitn(2, '/').collect();
            let name = parts[0].to_string();
            let sub = parts.get(1).map(|s| s.to_string());
            (name, sub)
        };

        let package_dir = node_modules.join(&package_name);

        if !package_dir.is_dir() {
            return Ok(None);
        }

        if let Some(sub) = subpath {
            return Ok(self.resolve_relative(&sub, &package_dir));
        }

        let package_json = package_dir.join("package.json");

        if package_json.is_file() {
            let content = fs::read_to_string(&package_json)
                .with_context(|| format!("Failed to read {}", package_json.display()))?;
            let pkg: serde_json::Value = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", package_json.display()))?;

            let mut fields: Vec<&str> = Vec::new();
            if self.browser {
                fields.push("browser");
            }
            fields.extend(self.main_fields.iter().map(String::as_str));

            for field in fields {
                if let Some(entry) = pkg.get(field).and_then(|v| v.as_str()) {
                    if let Some(resolved) = self.resolve_relative(entry, &package_dir) {
                        return Ok(Some(resolved));
                    }
                }
            }
        }

        Ok(self.resolve_relative("index", &package_dir))
    }
}

fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut os: OsString = path.as_os_str().to_owned();
    os.push(ext);
    PathBuf::from(os)
}
