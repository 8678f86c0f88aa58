//! Configuration schema definitions

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Project metadata configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Project version
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

/// Module format of a written bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// CommonJS: externals via `require`, entry exports on `module.exports`
    Cjs,
    /// ES module: externals via `import`, entry exports via `export`
    Esm,
    /// Self-executing function assigned to a global variable
    Iife,
    /// Universal module definition (CommonJS, AMD or global)
    Umd,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Cjs => "cjs",
            OutputFormat::Esm => "esm",
            OutputFormat::Iife => "iife",
            OutputFormat::Umd => "umd",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bundle profile applied to every input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleTypeConfig {
    /// Output module format
    pub format: OutputFormat,

    /// Transpile presets (`react-app`, `es2015-rollup`, ...)
    #[serde(default)]
    pub presets: Vec<String>,

    /// Plugins appended after the built-in replace and transpile steps
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
}

/// Plugin configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum PluginConfig {
    /// Node-style resolution of bare specifiers into `node_modules`
    Resolve(ResolveOptions),

    /// CommonJS module support
    Commonjs(CommonJsOptions),
}

/// Options for the `resolve` plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveOptions {
    /// Extensions tried, in order, for extension-less specifiers
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// package.json fields consulted for a package entry, in order
    #[serde(default = "default_main_fields")]
    pub main_fields: Vec<String>,

    /// Prefer the package.json `browser` field when it is a string
    #[serde(default)]
    pub browser: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            main_fields: default_main_fields(),
            browser: false,
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec![".js".to_string(), ".jsx".to_string()]
}

fn default_main_fields() -> Vec<String> {
    vec!["module".to_string(), "main".to_string()]
}

/// Options for the `commonjs` plugin
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommonJsOptions {
    /// Module id -> names that ES modules may import from it
    #[serde(default)]
    pub named_exports: BTreeMap<String, Vec<String>>,
}

/// Transpile step configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranspileConfig {
    /// Module id globs left untouched by the presets
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
}

impl Default for TranspileConfig {
    fn default() -> Self {
        Self {
            exclude: default_exclude(),
        }
    }
}

fn default_exclude() -> Vec<String> {
    vec![
        "**/node_modules/**".to_string(),
        "dist/**".to_string(),
        "**/coverage/**".to_string(),
        "**/styleguide/**".to_string(),
    ]
}

/// Bundle report configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Number of modules listed per bundle
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
        }
    }
}

fn default_limit() -> usize {
    10
}

/// Output configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Write `manifest.json` next to the bundles
    #[serde(default)]
    pub manifest: bool,

    /// Embed source maps as data URLs instead of writing `.map` files
    #[serde(default)]
    pub inline_sourcemap: bool,
}

/// Build mode selected by `NODE_ENV`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Production,
    Development,
}

impl Mode {
    /// An unset or empty value means `production`; any other value is a
    /// development build
    pub fn from_env_value(value: &str) -> Self {
        match value.trim() {
            "" | "production" => Mode::Production,
            _ => Mode::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Mode::Production)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Production => f.write_str("production"),
            Mode::Development => f.write_str("development"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_env_value() {
        assert_eq!(Mode::from_env_value("production"), Mode::Production);
        assert_eq!(Mode::from_env_value("development"), Mode::Development);
        assert_eq!(Mode::from_env_value("test"), Mode::Development);
        assert_eq!(Mode::from_env_value(""), Mode::Production);
        assert_eq!(Mode::from_env_value("  "), Mode::Production);
    }

    #[test]
    fn test_plugin_config_from_toml() {
        let source = r#"
            format = "umd"
            presets = ["react-app"]

            [[plugins]]
            name = "resolve"
            browser = true

            [[plugins]]
            name = "commonjs"

            [plugins.named_exports]
            "node_modules/lib/index.js" = ["a", "b"]
        "#;

        let bundle_type: BundleTypeConfig = toml::from_str(source).unwrap();
        assert_eq!(bundle_type.format, OutputFormat::Umd);
        assert_eq!(bundle_type.plugins.len(), 2);

        match &bundle_type.plugins[0] {
            PluginConfig::Resolve(options) => {
                assert!(options.browser);
                assert_eq!(options.extensions, vec![".js", ".jsx"]);
            }
            other => panic!("unexpected plugin {:?}", other),
        }
        match &bundle_type.plugins[1] {
            PluginConfig::Commonjs(options) => {
                assert_eq!(
                    options.named_exports["node_modules/lib/index.js"],
                    vec!["a", "b"]
                );
            }
            other => panic!("unexpected plugin {:?}", other),
        }
    }
}
