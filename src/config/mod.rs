//! Configuration handling for distpack
//!
//! Parses and manages distpack.toml configuration files.

mod schema;

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::transform::Preset;

pub use schema::*;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the entry points, relative to the root
    #[serde(default = "default_src_dir")]
    pub src_dir: String,

    /// Output directory, relative to the root
    #[serde(default = "default_out_dir")]
    pub out_dir: String,

    /// Entry point names; `ui/index` bundles `<src_dir>/ui/index.js`
    pub inputs: Vec<String>,

    /// Package ids that are never bundled
    #[serde(default = "default_external")]
    pub external: Vec<String>,

    /// Project metadata
    pub project: ProjectConfig,

    /// External id -> global variable name for `iife` and `umd` bundles
    #[serde(default = "default_globals")]
    pub globals: BTreeMap<String, String>,

    /// Token -> replacement text, applied to every module
    #[serde(default)]
    pub replace: BTreeMap<String, String>,

    /// Transpile step settings
    #[serde(default)]
    pub transpile: TranspileConfig,

    /// Bundle report settings
    #[serde(default)]
    pub analyzer: AnalyzerConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Bundle profiles; every input is built once per profile
    pub bundle_types: Vec<BundleTypeConfig>,

    /// Root directory (computed from config file location)
    #[serde(skip)]
    pub root: PathBuf,
}

fn default_src_dir() -> String {
    "src".to_string()
}

fn default_out_dir() -> String {
    "dist".to_string()
}

fn default_external() -> Vec<String> {
    vec!["react".to_string(), "prop-types".to_string()]
}

fn default_globals() -> BTreeMap<String, String> {
    [
        ("react", "React"),
        ("react-dom", "ReactDOM"),
        ("prop-types", "PropTypes"),
    ]
    .into_iter()
    .map(|(id, global)| (id.to_string(), global.to_string()))
    .collect()
}

impl Config {
    /// Load configuration from a file path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let canonical_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        let content = fs::read_to_string(&canonical_path)
            .with_context(|| format!("Failed to read config file: {}", canonical_path.display()))?;

        let mut config = Self::from_toml(&content)?;

        // Set root directory to the directory containing the config file
        config.root = canonical_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(config)
    }

    /// Parse and validate configuration text; `root` is left empty
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .with_context(|| "Failed to parse distpack.toml")?;

        config.validate()?;

        Ok(config)
    }

    /// The component library configuration written by `distpack init`
    pub fn default_config() -> Self {
        let inputs = [
            "index",
            "ui/index",
            "ui/Render/index",
            "ui/AsciiTable/index",
            "ui/Chart/index",
            "utils/index",
            "utils/Cypher/index",
            "utils/DriverProvider/index",
            "utils/DesktopIntegration/index",
        ];

        let named_exports: BTreeMap<String, Vec<String>> = [
            ("@vx/scale", &["scaleTime", "scaleLinear", "scaleOrdinal"][..]),
            ("@vx/curve", &["curveBasis", "curveMonotoneX"][..]),
            ("@vx/gradient", &["LinearGradient"][..]),
            ("@vx/group", &["Group"][..]),
            ("@vx/shape", &["AxisLeft", "AreaClosed", "LinePath"][..]),
            ("@vx/glyph", &["GlyphDot"][..]),
            ("@vx/axis", &["AxisLeft", "AxisBottom"][..]),
            ("@vx/legend", &["LegendOrdinal"][..]),
            (
                "@data-ui/xy-chart",
                &[
                    "XYChart",
                    "XAxis",
                    "YAxis",
                    "BarSeries",
                    "PointSeries",
                    "CrossHair",
                    "LineSeries",
                ][..],
            ),
            (
                "@data-ui/radial-chart",
                &["RadialChart", "ArcSeries", "ArcLabel"][..],
            ),
            ("@data-ui/theme", &["chartTheme"][..]),
        ]
        .into_iter()
        .map(|(package, names)| {
            (
                format!("node_modules/{}/build/index.js", package),
                names.iter().map(|n| n.to_string()).collect(),
            )
        })
        .collect();

        Self {
            src_dir: default_src_dir(),
            out_dir: default_out_dir(),
            inputs: inputs.iter().map(|i| i.to_string()).collect(),
            external: default_external(),
            project: ProjectConfig {
                name: "graph-app-kit".to_string(),
                version: "0.1.0".to_string(),
            },
            globals: default_globals(),
            replace: {
                let mut map = BTreeMap::new();
                map.insert(
                    "process.env.NODE_ENV".to_string(),
                    "\"production\"".to_string(),
                );
                map
            },
            transpile: TranspileConfig::default(),
            analyzer: AnalyzerConfig::default(),
            output: OutputConfig::default(),
            bundle_types: vec![BundleTypeConfig {
                format: OutputFormat::Cjs,
                presets: vec!["es2015-rollup".to_string(), "react-app".to_string()],
                plugins: vec![
                    PluginConfig::Resolve(ResolveOptions {
                        extensions: vec![".js".to_string(), ".jsx".to_string()],
                        main_fields: vec![
                            "jsnext:main".to_string(),
                            "module".to_string(),
                            "main".to_string(),
                        ],
                        browser: true,
                    }),
                    PluginConfig::Commonjs(CommonJsOptions { named_exports }),
                ],
            }],
            root: PathBuf::from("."),
        }
    }

    /// Validate the configuration
    ///
    /// Entry files are not checked here: a missing input fails its own job.
    fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            anyhow::bail!("At least one input must be specified in distpack.toml");
        }

        if self.bundle_types.is_empty() {
            anyhow::bail!("At least one bundle type must be specified in distpack.toml");
        }

        let mut seen = HashSet::new();
        for input in &self.inputs {
            if !seen.insert(input.as_str()) {
                anyhow::bail!("Input '{}' is listed more than once", input);
            }
        }

        for bundle_type in &self.bundle_types {
            for preset in &bundle_type.presets {
                if Preset::parse(preset).is_none() {
                    anyhow::bail!(
                        "Unknown preset '{}' in {} bundle type",
                        preset,
                        bundle_type.format
                    );
                }
            }
        }

        Ok(())
    }

    /// Get the absolute output directory path
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.out_dir)
    }

    /// Get the absolute source directory path
    pub fn source_dir(&self) -> PathBuf {
        self.root.join(&self.src_dir)
    }

    /// Get absolute path for an input name
    pub fn input_path(&self, input: &str) -> PathBuf {
        self.source_dir().join(format!("{}.js", input))
    }

    /// Whether a specifier names an external package
    pub fn is_external(&self, specifier: &str) -> bool {
        self.external.iter().any(|e| e == specifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_roundtrips_through_toml() {
        let config = Config::default_config();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed = Config::from_toml(&text).unwrap();

        assert_eq!(parsed.inputs.len(), 9);
        assert_eq!(parsed.external, vec!["react", "prop-types"]);
        assert_eq!(parsed.bundle_types.len(), 1);
        assert_eq!(parsed.bundle_types[0].plugins, config.bundle_types[0].plugins);
        assert_eq!(parsed.replace["process.env.NODE_ENV"], "\"production\"");
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_toml(
            r#"
            inputs = ["index"]

            [project]
            name = "lib"

            [[bundle_types]]
            format = "esm"
            "#,
        )
        .unwrap();

        assert_eq!(config.src_dir, "src");
        assert_eq!(config.out_dir, "dist");
        assert_eq!(config.analyzer.limit, 10);
        assert_eq!(config.globals["react"], "React");
        assert!(config.is_external("prop-types"));
        assert!(!config.is_external("prop-types/checkPropTypes"));
        assert_eq!(config.transpile.exclude.len(), 4);
    }

    #[test]
    fn test_rejects_empty_inputs() {
        let err = Config::from_toml(
            r#"
            inputs = []
            [project]
            name = "lib"
            [[bundle_types]]
            format = "cjs"
            "#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("At least one input"));
    }

    #[test]
    fn test_rejects_duplicate_input_and_unknown_preset() {
        let duplicate = Config::from_toml(
            r#"
            inputs = ["a", "a"]
            [project]
            name = "lib"
            [[bundle_types]]
            format = "cjs"
            "#,
        );
        assert!(duplicate.is_err());

        let preset = Config::from_toml(
            r#"
            inputs = ["a"]
            [project]
            name = "lib"
            [[bundle_types]]
            format = "cjs"
            presets = ["stage-0"]
            "#,
        )
        .unwrap_err();
        assert!(preset.to_string().contains("stage-0"));
    }

    #[test]
    fn test_input_path() {
        let mut config = Config::default_config();
        config.root = PathBuf::from("/project");

        assert_eq!(
            config.input_path("ui/Render/index"),
            PathBuf::from("/project/src/ui/Render/index.js")
        );
        assert_eq!(config.output_dir(), PathBuf::from("/project/dist"));
    }
}
