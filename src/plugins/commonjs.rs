//! CommonJS module support

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::{Plugin, PluginContext, TransformResult};
use crate::config::CommonJsOptions;
use crate::transform::REQUIRE_FN;

static REQUIRE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(^|[^\w$.])require\s*\(\s*["']([^"'\n]+)["']\s*\)"#).unwrap()
});

/// Bundles `require("x")` dependencies and exposes CommonJS exports to
/// ES module importers
pub struct CommonJsPlugin {
    named_exports: BTreeMap<String, Vec<String>>,
}

impl CommonJsPlugin {
    pub fn new(options: &CommonJsOptions) -> Self {
        Self {
            named_exports: options.named_exports.clone(),
        }
    }

    fn rewrite_requires(code: &str) -> Option<String> {
        if !REQUIRE_REGEX.is_match(code) {
            return None;
        }

        let rewritten = REQUIRE_REGEX.replace_all(code, |caps: &Captures<'_>| {
            format!("{}{}(\"{}\")", &caps[1], REQUIRE_FN, &caps[2])
        });

        Some(rewritten.into_owned())
    }
}

#[async_trait]
impl Plugin for CommonJsPlugin {
    fn name(&self) -> &str {
        "commonjs"
    }

    async fn transform(&self, code: &str, _id: &str, _ctx: &PluginContext) -> Result<TransformResult> {
        Ok(match Self::rewrite_requires(code) {
            Some(rewritten) => TransformResult::Transformed(rewritten),
            None => TransformResult::Skip,
        })
    }

    fn commonjs_exports(&self, id: &str, detected: &BTreeSet<String>) -> Option<BTreeSet<String>> {
        let mut names = detected.clone();
        names.insert("default".to_string());
        if let Some(declared) = self.named_exports.get(id) {
            names.extend(declared.iter().cloned());
        }
        Some(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrites_requires() {
        let code = "var a = require('./a');\nvar b = require( \"b\" );\nx.require('c'); my_require('d');";
        assert_eq!(
            CommonJsPlugin::rewrite_requires(code).unwrap(),
            "var a = __distpack_require__(\"./a\");\nvar b = __distpack_require__(\"b\");\nx.require('c'); my_require('d');"
        );
        assert_eq!(CommonJsPlugin::rewrite_requires("var a = 1;"), None);
    }

    #[test]
    fn test_named_exports_extend_detected_names() {
        let mut named_exports = BTreeMap::new();
        named_exports.insert(
            "node_modules/@vx/scale/build/index.js".to_string(),
            vec!["scaleTime".to_string()],
        );
        let plugin = CommonJsPlugin::new(&CommonJsOptions { named_exports });

        let detected: BTreeSet<String> = ["helper".to_string()].into_iter().collect();
        let names = plugin
            .commonjs_exports("node_modules/@vx/scale/build/index.js", &detected)
            .unwrap();

        assert!(names.contains("scaleTime"));
        assert!(names.contains("helper"));
        assert!(names.contains("default"));
        assert!(!names.contains("scaleLinear"));
    }
}
