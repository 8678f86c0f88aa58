//! Node-style resolution of bare imports

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use super::{Plugin, PluginContext, ResolveResult};
use crate::config::ResolveOptions;
use crate::resolver::Resolver;

/// Resolves relative imports with extensions and directory indexes, and bare
/// imports into `node_modules`
pub struct ResolvePlugin {
    resolver: Resolver,
}

impl ResolvePlugin {
    pub fn new(options: &ResolveOptions) -> Self {
        Self {
            resolver: Resolver::new(options),
        }
    }
}

#[async_trait]
impl Plugin for ResolvePlugin {
    fn name(&self) -> &str {
        "resolve"
    }

    async fn resolve_id(
        &self,
        specifier: &str,
        importer: &Path,
        _ctx: &PluginContext,
    ) -> Result<ResolveResult> {
        Ok(match self.resolver.resolve(specifier, importer)? {
            Some(path) => ResolveResult::Resolved(path),
            None => ResolveResult::Skip,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_resolves_into_node_modules() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("node_modules/@data-ui/theme/build")).unwrap();
        fs::write(root.join("src/index.js"), "").unwrap();
        fs::write(
            root.join("node_modules/@data-ui/theme/package.json"),
            r#"{"main": "build/index.js"}"#,
        )
        .unwrap();
        fs::write(root.join("node_modules/@data-ui/theme/build/index.js"), "").unwrap();

        let plugin = ResolvePlugin::new(&ResolveOptions::default());
        let ctx = PluginContext {
            root: root.to_path_buf(),
        };

        let result = plugin
            .resolve_id("@data-ui/theme", &root.join("src/index.js"), &ctx)
            .await
            .unwrap();
        assert_eq!(
            result,
            ResolveResult::Resolved(root.join("node_modules/@data-ui/theme/build/index.js"))
        );

        let missing = plugin
            .resolve_id("./nope", &root.join("src/index.js"), &ctx)
            .await
            .unwrap();
        assert_eq!(missing, ResolveResult::Skip);
    }
}
