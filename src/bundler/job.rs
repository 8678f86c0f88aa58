//! Build job planning

use std::path::{Path, PathBuf};

use crate::config::{Config, Mode, OutputFormat, PluginConfig};

/// One (bundle type, input) pair
#[derive(Debug, Clone)]
pub struct BuildJob {
    /// Absolute path of the entry module
    pub input: PathBuf,

    /// Output module name, e.g. `ui/Render/index`
    pub module_name: String,

    /// Output module format
    pub format: OutputFormat,

    /// Transpile presets
    pub presets: Vec<String>,

    /// Bundle-type plugins, run after replace and transpile
    pub plugins: Vec<PluginConfig>,

    /// Emit a source map next to the bundle
    pub sourcemap: bool,
}

impl BuildJob {
    /// `<out_dir>/<module name>.js`; an empty module name writes `main.js`
    pub fn output_file(&self, out_dir: &Path) -> PathBuf {
        let name = if self.module_name.is_empty() {
            "main"
        } else {
            self.module_name.as_str()
        };
        out_dir.join(format!("{}.js", name))
    }
}

/// Every bundle type crossed with every input, bundle types first
pub fn plan_jobs(config: &Config, mode: Mode) -> Vec<BuildJob> {
    config
        .bundle_types
        .iter()
        .flat_map(|bundle_type| {
            config.inputs.iter().map(move |input| BuildJob {
                input: config.input_path(input),
                module_name: input.clone(),
                format: bundle_type.format,
                presets: bundle_type.presets.clone(),
                plugins: bundle_type.plugins.clone(),
                sourcemap: !mode.is_production(),
            })
        })
        .collect()
}
