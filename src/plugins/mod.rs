//! Plugin system for distpack
//!
//! A Rollup-style plugin API. Every job gets its own pipeline: `replace`,
//! `transpile`, then the plugins listed by the job's bundle type.

mod commonjs;
mod replace;
mod resolve;
mod transpile;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::bundler::{BuildError, BuildJob};
use crate::config::{Config, PluginConfig};

pub use commonjs::CommonJsPlugin;
pub use replace::ReplacePlugin;
pub use resolve::ResolvePlugin;
pub use transpile::TranspilePlugin;

/// Plugin hook context
#[derive(Debug, Clone)]
pub struct PluginContext {
    /// Project root directory
    pub root: PathBuf,
}

/// Result of a resolve hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveResult {
    /// Continue to next plugin
    Skip,
    /// Resolved path
    Resolved(PathBuf),
    /// Mark as external (don't bundle)
    External,
}

/// Result of a transform hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformResult {
    /// Continue to next plugin (no transformation)
    Skip,
    /// Transformed code
    Transformed(String),
}

/// Plugin trait - implement this to extend the build pipeline
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Plugin name for logging and debugging
    fn name(&self) -> &str;

    /// Called before the first module of a bundle is loaded
    async fn build_start(&self, _ctx: &PluginContext) -> Result<()> {
        Ok(())
    }

    /// Called once the module graph of a bundle is complete
    async fn build_end(&self, _ctx: &PluginContext) -> Result<()> {
        Ok(())
    }

    /// Resolve an import specifier to a path
    /// Return ResolveResult::Skip to let other plugins handle it
    async fn resolve_id(
        &self,
        _specifier: &str,
        _importer: &Path,
        _ctx: &PluginContext,
    ) -> Result<ResolveResult> {
        Ok(ResolveResult::Skip)
    }

    /// Transform the code of a module
    /// Return TransformResult::Skip to leave code unchanged
    async fn transform(
        &self,
        _code: &str,
        _id: &str,
        _ctx: &PluginContext,
    ) -> Result<TransformResult> {
        Ok(TransformResult::Skip)
    }

    /// Names ES modules may import from the CommonJS module `id`
    fn commonjs_exports(&self, _id: &str, _detected: &BTreeSet<String>) -> Option<BTreeSet<String>> {
        None
    }
}

/// Plugin manager
pub struct PluginManager {
    plugins: Vec<Arc<dyn Plugin>>,
    context: PluginContext,
}

impl PluginManager {
    /// Create a new plugin manager
    pub fn new(root: PathBuf) -> Self {
        Self {
            plugins: Vec::new(),
            context: PluginContext { root },
        }
    }

    /// The pipeline of one build job
    pub fn for_job(config: &Config, job: &BuildJob) -> Result<Self, BuildError> {
        let mut manager = Self::new(config.root.clone());

        if !config.replace.is_empty() {
            manager.register(Arc::new(ReplacePlugin::new(&config.replace)));
        }

        if !job.presets.is_empty() {
            manager.register(Arc::new(TranspilePlugin::new(
                &job.presets,
                &config.transpile.exclude,
            )?));
        }

        for plugin in &job.plugins {
            match plugin {
                PluginConfig::Resolve(options) => {
                    manager.register(Arc::new(ResolvePlugin::new(options)));
                }
                PluginConfig::Commonjs(options) => {
                    manager.register(Arc::new(CommonJsPlugin::new(options)));
                }
            }
        }

        Ok(manager)
    }

    /// Register a plugin
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        debug!("Registered plugin: {}", plugin.name());
        self.plugins.push(plugin);
    }

    /// Names of the registered plugins, in order
    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Run build_start hooks
    pub async fn run_build_start(&self) -> Result<(), BuildError> {
        for plugin in &self.plugins {
            plugin
                .build_start(&self.context)
                .await
                .map_err(|err| plugin_error(plugin.name(), "<build start>", err))?;
        }
        Ok(())
    }

    /// Run build_end hooks
    pub async fn run_build_end(&self) -> Result<(), BuildError> {
        for plugin in &self.plugins {
            plugin
                .build_end(&self.context)
                .await
                .map_err(|err| plugin_error(plugin.name(), "<build end>", err))?;
        }
        Ok(())
    }

    /// Run resolve_id hooks; the first non-skip answer wins
    pub async fn resolve_id(&self, specifier: &str, importer: &Path) -> Result<ResolveResult, BuildError> {
        for plugin in &self.plugins {
            let result = plugin
                .resolve_id(specifier, importer, &self.context)
                .await
                .map_err(|err| plugin_error(plugin.name(), &importer.display().to_string(), err))?;

            if result != ResolveResult::Skip {
                return Ok(result);
            }
        }
        Ok(ResolveResult::Skip)
    }

    /// Run transform hooks in sequence
    pub async fn transform(&self, code: &str, id: &str) -> Result<String, BuildError> {
        let mut current_code = code.to_string();

        for plugin in &self.plugins {
            match plugin
                .transform(&current_code, id, &self.context)
                .await
                .map_err(|err| plugin_error(plugin.name(), id, err))?
            {
                TransformResult::Skip => continue,
                TransformResult::Transformed(code) => current_code = code,
            }
        }

        Ok(current_code)
    }

    /// Importable names of a CommonJS module; empty without a commonjs plugin
    pub fn commonjs_exports(&self, id: &str, detected: &BTreeSet<String>) -> BTreeSet<String> {
        self.plugins
            .iter()
            .find_map(|plugin| plugin.commonjs_exports(id, detected))
            .unwrap_or_default()
    }
}

/// Keep typed build errors raised inside a plugin as they are
fn plugin_error(plugin: &str, module: &str, err: anyhow::Error) -> BuildError {
    match err.downcast::<BuildError>() {
        Ok(build_error) => build_error,
        Err(source) => BuildError::Plugin {
            plugin: plugin.to_string(),
            module: module.to_string(),
            source,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::plan_jobs;
    use crate::config::Mode;

    struct Upper;

    #[async_trait]
    impl Plugin for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        async fn transform(&self, code: &str, _id: &str, _ctx: &PluginContext) -> Result<TransformResult> {
            Ok(TransformResult::Transformed(code.to_uppercase()))
        }
    }

    struct Failing;

    #[async_trait]
    impl Plugin for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn build_start(&self, _ctx: &PluginContext) -> Result<()> {
            anyhow::bail!("no license file")
        }
    }

    #[tokio::test]
    async fn test_transform_hooks_run_in_order() {
        let mut manager = PluginManager::new(PathBuf::from("."));
        manager.register(Arc::new(ReplacePlugin::new(
            &[("__VERSION__".to_string(), "'1.0'".to_string())].into_iter().collect(),
        )));
        manager.register(Arc::new(Upper));

        let code = manager.transform("v = __VERSION__", "src/index.js").await.unwrap();
        assert_eq!(code, "V = '1.0'");
    }

    #[tokio::test]
    async fn test_plugin_errors_name_the_plugin() {
        let mut manager = PluginManager::new(PathBuf::from("."));
        manager.register(Arc::new(Failing));

        let err = manager.run_build_start().await.unwrap_err();
        assert!(err.to_string().contains("failing"));
    }

    #[test]
    fn test_job_pipeline_order() {
        let config = Config::default_config();
        let jobs = plan_jobs(&config, Mode::Production);
        let manager = PluginManager::for_job(&config, &jobs[0]).unwrap();

        assert_eq!(manager.names(), vec!["replace", "transpile", "resolve", "commonjs"]);
    }

    #[test]
    fn test_no_commonjs_plugin_means_no_names() {
        let manager = PluginManager::new(PathBuf::from("."));
        let detected: BTreeSet<String> = ["a".to_string()].into_iter().collect();
        assert!(manager.commonjs_exports("node_modules/x/index.js", &detected).is_empty());
    }
}
