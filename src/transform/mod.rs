//! Code transformation
//!
//! Source presets (JSX) and the ES module linker.

mod jsx;
mod link;

use tracing::debug;

use crate::bundler::BuildError;

pub use link::{
    link, ExportInfo, ImportRecord, LinkedModule, DEFAULT_FN, ESM_FN, EXPORT_STAR_FN, REQUIRE_FN,
};

/// A transpile preset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// JSX to `React.createElement` calls
    React,
    /// Syntax target presets; sources already match the target
    Es2015,
}

impl Preset {
    /// Parse a preset name as written in distpack.toml
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "react" | "react-app" => Some(Preset::React),
            "es2015" | "es2015-rollup" | "env" => Some(Preset::Es2015),
            _ => None,
        }
    }
}

/// Applies presets to module sources
#[derive(Debug, Clone)]
pub struct Transformer {
    presets: Vec<Preset>,
    pragma: String,
    pragma_frag: String,
}

impl Transformer {
    /// Create a new transformer
    pub fn new(presets: &[String]) -> Result<Self, BuildError> {
        let presets = presets
            .iter()
            .map(|name| {
                Preset::parse(name)
                    .ok_or_else(|| BuildError::transform("<config>", format!("unknown preset '{}'", name)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            presets,
            pragma: "React.createElement".to_string(),
            pragma_frag: "React.Fragment".to_string(),
        })
    }

    pub fn has_presets(&self) -> bool {
        !self.presets.is_empty()
    }

    /// Transform source code of the module `id`
    pub fn transform(&self, source: &str, id: &str) -> Result<String, BuildError> {
        let mut code = source.to_string();

        for preset in &self.presets {
            match preset {
                Preset::React => {
                    debug!("Transforming JSX: {}", id);
                    code = jsx::transform_jsx(&code, &self.pragma, &self.pragma_frag)
                        .map_err(|reason| BuildError::transform(id, reason))?;
                }
                Preset::Es2015 => {}
            }
        }

        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_names() {
        assert_eq!(Preset::parse("react-app"), Some(Preset::React));
        assert_eq!(Preset::parse("es2015-rollup"), Some(Preset::Es2015));
        assert_eq!(Preset::parse("flow"), None);
    }

    #[test]
    fn test_transform_applies_react_preset() {
        let transformer =
            Transformer::new(&["es2015-rollup".to_string(), "react-app".to_string()]).unwrap();
        let out = transformer
            .transform("export default () => <Table rows={rows} />;", "src/ui/index.js")
            .unwrap();

        assert_eq!(
            out,
            "export default () => React.createElement(Table, {rows: rows});"
        );
    }

    #[test]
    fn test_transform_error_names_module() {
        let transformer = Transformer::new(&["react".to_string()]).unwrap();
        let err = transformer
            .transform("const x = <div>", "src/broken.js")
            .unwrap_err();

        assert!(err.to_string().contains("src/broken.js"));
    }

    #[test]
    fn test_unknown_preset_is_rejected() {
        assert!(Transformer::new(&["stage-0".to_string()]).is_err());
    }
}
