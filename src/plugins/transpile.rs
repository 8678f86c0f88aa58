//! Preset-driven source transpilation

use anyhow::Result;
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::trace;

use super::{Plugin, PluginContext, TransformResult};
use crate::bundler::BuildError;
use crate::transform::Transformer;

/// Runs the job's presets over every module not matched by an exclude glob
pub struct TranspilePlugin {
    transformer: Transformer,
    exclude: GlobSet,
}

impl TranspilePlugin {
    pub fn new(presets: &[String], exclude: &[String]) -> Result<Self, BuildError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in exclude {
            let glob = Glob::new(pattern).map_err(|source| BuildError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
            builder.add(glob);
        }
        let exclude = builder.build().map_err(|source| BuildError::InvalidPattern {
            pattern: exclude.join(", "),
            source,
        })?;

        Ok(Self {
            transformer: Transformer::new(presets)?,
            exclude,
        })
    }

    pub fn is_excluded(&self, id: &str) -> bool {
        self.exclude.is_match(id)
    }
}

#[async_trait]
impl Plugin for TranspilePlugin {
    fn name(&self) -> &str {
        "transpile"
    }

    async fn transform(&self, code: &str, id: &str, _ctx: &PluginContext) -> Result<TransformResult> {
        if !self.transformer.has_presets() || self.is_excluded(id) {
            trace!("Not transpiling {}", id);
            return Ok(TransformResult::Skip);
        }

        let transformed = self.transformer.transform(code, id)?;
        if transformed == code {
            return Ok(TransformResult::Skip);
        }

        Ok(TransformResult::Transformed(transformed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TranspileConfig;
    use std::path::PathBuf;

    fn plugin() -> TranspilePlugin {
        TranspilePlugin::new(&["react-app".to_string()], &TranspileConfig::default().exclude).unwrap()
    }

    #[test]
    fn test_default_excludes() {
        let plugin = plugin();
        assert!(plugin.is_excluded("node_modules/@vx/scale/build/index.js"));
        assert!(plugin.is_excluded("src/vendor/node_modules/x.js"));
        assert!(plugin.is_excluded("dist/index.js"));
        assert!(plugin.is_excluded("src/coverage/report.js"));
        assert!(!plugin.is_excluded("src/ui/index.js"));
    }

    #[tokio::test]
    async fn test_transform_skips_excluded_modules() {
        let plugin = plugin();
        let ctx = PluginContext {
            root: PathBuf::from("."),
        };

        let excluded = plugin
            .transform("x = <b/>;", "node_modules/lib/index.js", &ctx)
            .await
            .unwrap();
        assert_eq!(excluded, TransformResult::Skip);

        let included = plugin.transform("x = <b/>;", "src/index.js", &ctx).await.unwrap();
        assert_eq!(
            included,
            TransformResult::Transformed("x = React.createElement(\"b\", null);".to_string())
        );
    }

    #[tokio::test]
    async fn test_transform_error_is_a_build_error() {
        let plugin = plugin();
        let ctx = PluginContext {
            root: PathBuf::from("."),
        };

        let err = plugin.transform("x = <b>", "src/a.js", &ctx).await.unwrap_err();
        assert!(err.downcast_ref::<BuildError>().is_some());
    }

    #[test]
    fn test_invalid_glob() {
        assert!(TranspilePlugin::new(&[], &["src/[".to_string()]).is_err());
    }
}
