//! Source map v3 generation
//!
//! Mappings are line-granular: each generated line points at column 0 of
//! one original line.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;

use crate::utils::relative_path;

const BASE64_DIGITS: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// A serialized source map
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceMap {
    pub version: u8,
    pub file: String,
    pub sources: Vec<String>,
    #[serde(rename = "sourcesContent")]
    pub sources_content: Vec<String>,
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMap {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// `data:` URL for an inline `sourceMappingURL` comment
    pub fn to_data_url(&self) -> String {
        format!(
            "data:application/json;charset=utf-8;base64,{}",
            STANDARD.encode(self.to_json())
        )
    }
}

/// Collects line origins while a bundle is emitted
#[derive(Debug, Default)]
pub struct SourceMapBuilder {
    sources: Vec<PathBuf>,
    contents: Vec<String>,
    lines: Vec<Option<(usize, usize)>>,
}

impl SourceMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an original file, returning its source index
    pub fn add_source(&mut self, path: &Path, content: &str) -> usize {
        self.sources.push(path.to_path_buf());
        self.contents.push(content.to_string());
        self.sources.len() - 1
    }

    /// Map generated line `generated` to line `original` of `source`
    pub fn map_line(&mut self, generated: usize, source: usize, original: usize) {
        if self.lines.len() <= generated {
            self.lines.resize(generated + 1, None);
        }
        self.lines[generated] = Some((source, original));
    }

    /// Origin recorded for a generated line
    pub fn mapped_line(&self, generated: usize) -> Option<(usize, usize)> {
        self.lines.get(generated).copied().flatten()
    }

    /// Finish the map for `file`, with sources relative to `map_dir`
    pub fn build(&self, file: &str, map_dir: &Path) -> SourceMap {
        let sources = self
            .sources
            .iter()
            .map(|source| {
                relative_path(map_dir, source).unwrap_or_else(|| source.display().to_string())
            })
            .collect();

        SourceMap {
            version: 3,
            file: file.to_string(),
            sources,
            sources_content: self.contents.clone(),
            names: Vec::new(),
            mappings: self.mappings(),
        }
    }

    fn mappings(&self) -> String {
        let mut out = String::new();
        let mut previous_source = 0i64;
        let mut previous_line = 0i64;

        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                out.push(';');
            }
            if let Some((source, original)) = line {
                let (source, original) = (*source as i64, *original as i64);
                encode_vlq(0, &mut out);
                encode_vlq(source - previous_source, &mut out);
                encode_vlq(original - previous_line, &mut out);
                encode_vlq(0, &mut out);
                previous_source = source;
                previous_line = original;
            }
        }

        out
    }
}

/// Append one base64 VLQ value
pub fn encode_vlq(value: i64, out: &mut String) {
    let mut vlq = if value < 0 {
        (value.unsigned_abs() << 1) | 1
    } else {
        (value as u64) << 1
    };

    loop {
        let mut digit = (vlq & 0b11111) as usize;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 0b100000;
        }
        out.push(BASE64_DIGITS[digit] as char);
        if vlq == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vlq(value: i64) -> String {
        let mut out = String::new();
        encode_vlq(value, &mut out);
        out
    }

    #[test]
    fn test_encode_vlq() {
        assert_eq!(vlq(0), "A");
        assert_eq!(vlq(1), "C");
        assert_eq!(vlq(-1), "D");
        assert_eq!(vlq(15), "e");
        assert_eq!(vlq(16), "gB");
        assert_eq!(vlq(-17), "jB");
    }

    #[test]
    fn test_mappings_are_relative() {
        let mut builder = SourceMapBuilder::new();
        let a = builder.add_source(Path::new("/lib/src/a.js"), "a1\na2");
        let b = builder.add_source(Path::new("/lib/src/b.js"), "b1");

        builder.map_line(1, a, 0);
        builder.map_line(2, a, 1);
        builder.map_line(4, b, 0);

        let map = builder.build("index.js", Path::new("/lib/dist"));
        assert_eq!(map.mappings, ";AAAA;AACA;;ACDA");
        assert_eq!(map.sources, vec!["../src/a.js", "../src/b.js"]);
        assert_eq!(map.sources_content, vec!["a1\na2", "b1"]);
    }

    #[test]
    fn test_json_shape() {
        let map = SourceMapBuilder::new().build("index.js", Path::new("/"));
        let json: serde_json::Value = serde_json::from_str(&map.to_json()).unwrap();

        assert_eq!(json["version"], 3);
        assert_eq!(json["file"], "index.js");
        assert!(json["sourcesContent"].is_array());
        assert!(map.to_data_url().starts_with("data:application/json;charset=utf-8;base64,"));
    }
}
