//! ES module syntax to bundle-registry form
//!
//! Every `import`/`export` statement becomes plain script against the
//! module registry emitted by the bundler. Existing lines keep their line
//! numbers; export bindings are assigned on one extra trailing line.
//! Statements inside comments or inside string, template and regex
//! literals are left as they are.

use std::collections::BTreeSet;
use std::ops::Range;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::jsx::regex_can_start;

/// Registry lookup, `__distpack_require__("id")`
pub const REQUIRE_FN: &str = "__distpack_require__";
/// Default-import interop helper
pub const DEFAULT_FN: &str = "__distpack_default__";
/// Marks an exports object as coming from an ES module
pub const ESM_FN: &str = "__distpack_esm__";
/// Copies enumerable bindings for `export * from`
pub const EXPORT_STAR_FN: &str = "__distpack_export_star__";

static IMPORT_FROM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^([ \t]*)import\s+([\w$*{},\s]+?)\s+from\s*["']([^"'\n]+)["'][ \t]*;?"#)
        .unwrap()
});

static IMPORT_BARE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^([ \t]*)import\s*["']([^"'\n]+)["'][ \t]*;?"#).unwrap()
});

static EXPORT_FROM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^([ \t]*)export\s*\{([^}]*)\}\s*from\s*["']([^"'\n]+)["'][ \t]*;?"#)
        .unwrap()
});

static EXPORT_STAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^([ \t]*)export\s*\*\s*(?:as\s+([\w$]+)\s+)?from\s*["']([^"'\n]+)["'][ \t]*;?"#)
        .unwrap()
});

static EXPORT_LIST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([ \t]*)export\s*\{([^}]*)\}[ \t]*;?").unwrap()
});

static EXPORT_DEFAULT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([ \t]*)export\s+default\s+(?:(async\s+function\b(?:\s*\*)?|function\b(?:\s*\*)?|class\b)\s*([\w$]+)?)?")
        .unwrap()
});

static EXPORT_DESTRUCTURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([ \t]*)export\s+(const|let|var)\s*([{\[][^=]*)=").unwrap()
});

static EXPORT_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([ \t]*)export\s+((?:async\s+)?function\b(?:\s*\*)?|class\b|const\b|let\b|var\b)\s*([\w$]+)")
        .unwrap()
});

static COMMONJS_EXPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^\w$.])(?:module\.)?exports\.([\w$]+)\s*=[^=]").unwrap()
});

/// Names one module imports from a specifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRecord {
    pub specifier: String,

    /// Imported binding names; `default` for default imports.
    /// Namespace and side-effect imports leave this empty.
    pub names: Vec<String>,
}

/// What a module exposes to its importers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportInfo {
    /// Statically known export names
    pub names: BTreeSet<String>,

    /// Specifiers re-exported with `export * from`
    pub star_from: Vec<String>,

    /// No ES module syntax; names are `exports.x =` assignments
    pub commonjs: bool,
}

/// Output of [`link`]
#[derive(Debug, Clone)]
pub struct LinkedModule {
    pub code: String,
    pub imports: Vec<ImportRecord>,
    pub exports: ExportInfo,
}

/// Rewrite ES module syntax in `source`
///
/// Fails on an import or export list entry that is not `name` or
/// `name as alias`.
pub fn link(source: &str) -> Result<LinkedModule, String> {
    let mut imports = Vec::new();
    let mut exports = ExportInfo::default();
    let mut trailer: Vec<String> = Vec::new();
    let mut failure: Option<String> = None;
    let mut temp = 0usize;
    let mut esm = false;

    let mut next_temp = || {
        let name = format!("__distpack_m{}__", temp);
        temp += 1;
        name
    };

    let skipped = skipped_ranges(source);
    let code = EXPORT_FROM.replace_all(source, |caps: &Captures<'_>| {
        if starts_inside(&skipped, caps) {
            return caps[0].to_string();
        }
        let list = match specifier_list(&caps[2]) {
            Ok(list) => list,
            Err(reason) => {
                failure.get_or_insert(reason);
                return caps[0].to_string();
            }
        };
        esm = true;
        let specifier = caps[3].to_string();
        let module = next_temp();
        let mut names = Vec::new();
        let mut out = format!("{}var {} = {}(\"{}\");", &caps[1], module, REQUIRE_FN, specifier);
        for (imported, exported) in list {
            out.push_str(&format!(" exports.{} = {};", exported, member(&module, &imported)));
            exports.names.insert(exported);
            names.push(imported);
        }
        imports.push(ImportRecord { specifier, names });
        keep_lines(&caps[0], out)
    });

    let skipped = skipped_ranges(&code);
    let code = EXPORT_STAR.replace_all(&code, |caps: &Captures<'_>| {
        if starts_inside(&skipped, caps) {
            return caps[0].to_string();
        }
        esm = true;
        let specifier = caps[3].to_string();
        let required = format!("{}(\"{}\")", REQUIRE_FN, specifier);
        let out = match caps.get(2) {
            Some(namespace) => {
                exports.names.insert(namespace.as_str().to_string());
                format!("{}exports.{} = {};", &caps[1], namespace.as_str(), required)
            }
            None => {
                exports.star_from.push(specifier.clone());
                format!("{}{}(exports, {});", &caps[1], EXPORT_STAR_FN, required)
            }
        };
        imports.push(ImportRecord {
            specifier,
            names: Vec::new(),
        });
        keep_lines(&caps[0], out)
    });

    let skipped = skipped_ranges(&code);
    let code = EXPORT_LIST.replace_all(&code, |caps: &Captures<'_>| {
        if starts_inside(&skipped, caps) {
            return caps[0].to_string();
        }
        let list = match specifier_list(&caps[2]) {
            Ok(list) => list,
            Err(reason) => {
                failure.get_or_insert(reason);
                return caps[0].to_string();
            }
        };
        esm = true;
        for (local, exported) in list {
            trailer.push(format!("exports.{} = {};", exported, local));
            exports.names.insert(exported);
        }
        keep_lines(&caps[0], caps[1].to_string())
    });

    let skipped = skipped_ranges(&code);
    let code = IMPORT_FROM.replace_all(&code, |caps: &Captures<'_>| {
        if starts_inside(&skipped, caps) {
            return caps[0].to_string();
        }
        let specifier = caps[3].to_string();
        let module = next_temp();
        match import_clause(&caps[1], &caps[2], &specifier, &module) {
            Ok((out, names)) => {
                esm = true;
                imports.push(ImportRecord { specifier, names });
                keep_lines(&caps[0], out)
            }
            Err(reason) => {
                failure.get_or_insert(reason);
                caps[0].to_string()
            }
        }
    });

    let skipped = skipped_ranges(&code);
    let code = IMPORT_BARE.replace_all(&code, |caps: &Captures<'_>| {
        if starts_inside(&skipped, caps) {
            return caps[0].to_string();
        }
        esm = true;
        let specifier = caps[2].to_string();
        let out = format!("{}{}(\"{}\");", &caps[1], REQUIRE_FN, specifier);
        imports.push(ImportRecord {
            specifier,
            names: Vec::new(),
        });
        keep_lines(&caps[0], out)
    });

    let skipped = skipped_ranges(&code);
    let code = EXPORT_DEFAULT.replace_all(&code, |caps: &Captures<'_>| {
        if starts_inside(&skipped, caps) {
            return caps[0].to_string();
        }
        esm = true;
        exports.names.insert("default".to_string());
        let indent = &caps[1];
        let out = match (caps.get(2), caps.get(3)) {
            (Some(kind), Some(name)) if name.as_str() != "extends" => {
                trailer.push(format!("exports.default = {};", name.as_str()));
                format!("{}{} {}", indent, kind.as_str(), name.as_str())
            }
            (Some(kind), Some(_)) => format!("{}exports.default = {} extends", indent, kind.as_str()),
            (Some(kind), None) => format!("{}exports.default = {} ", indent, kind.as_str()),
            (None, _) => format!("{}exports.default = ", indent),
        };
        keep_lines(&caps[0], out)
    });

    let skipped = skipped_ranges(&code);
    let code = EXPORT_DESTRUCTURE.replace_all(&code, |caps: &Captures<'_>| {
        if starts_inside(&skipped, caps) {
            return caps[0].to_string();
        }
        esm = true;
        for name in pattern_bindings(&caps[3]) {
            trailer.push(format!("exports.{} = {};", name, name));
            exports.names.insert(name);
        }
        keep_lines(&caps[0], format!("{}{} {}=", &caps[1], &caps[2], &caps[3]))
    });

    let skipped = skipped_ranges(&code);
    let code = EXPORT_DECL.replace_all(&code, |caps: &Captures<'_>| {
        if starts_inside(&skipped, caps) {
            return caps[0].to_string();
        }
        esm = true;
        let name = caps[3].to_string();
        trailer.push(format!("exports.{} = {};", name, name));
        let out = format!("{}{} {}", &caps[1], &caps[2], name);
        exports.names.insert(name);
        keep_lines(&caps[0], out)
    });

    if let Some(reason) = failure {
        return Err(reason);
    }

    let mut code = code.into_owned();

    if esm {
        code.insert_str(0, &format!("{}(exports); ", ESM_FN));
        if !trailer.is_empty() {
            code.push('\n');
            code.push_str(&trailer.join(" "));
        }
    } else {
        exports.commonjs = true;
        let skipped = skipped_ranges(&code);
        for caps in COMMONJS_EXPORT.captures_iter(&code) {
            if !starts_inside(&skipped, &caps) {
                exports.names.insert(caps[1].to_string());
            }
        }
    }

    Ok(LinkedModule {
        code,
        imports,
        exports,
    })
}

/// Whether a match starts inside one of `ranges`
fn starts_inside(ranges: &[Range<usize>], caps: &Captures<'_>) -> bool {
    caps.get(0)
        .is_some_and(|m| ranges.iter().any(|range| range.contains(&m.start())))
}

/// Byte ranges of comments and of string, template and regex literals
fn skipped_ranges(code: &str) -> Vec<Range<usize>> {
    let bytes = code.as_bytes();
    let mut ranges = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let start = i;
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i = code[i..].find('\n').map_or(bytes.len(), |n| i + n);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = code[i + 2..].find("*/").map_or(bytes.len(), |n| i + n + 4);
            }
            b'"' | b'\'' => i = string_end(bytes, i),
            b'`' => i = template_end(bytes, i),
            b'/' if regex_can_start(&code[..i]) => i = regex_end(bytes, i),
            _ => {
                i += 1;
                continue;
            }
        }
        ranges.push(start..i);
    }

    ranges
}

/// End of the quoted string at `start`; an unterminated one ends at the newline
fn string_end(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while let Some(&b) = bytes.get(i) {
        match b {
            b'\\' => i += 2,
            b'\n' => return i,
            _ if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn template_end(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    while let Some(&b) = bytes.get(i) {
        match b {
            b'\\' => i += 2,
            b'`' => return i + 1,
            b'$' if bytes.get(i + 1) == Some(&b'{') => i = substitution_end(bytes, i + 2),
            _ => i += 1,
        }
    }
    bytes.len()
}

/// End of a `${...}` substitution whose body starts at `start`
fn substitution_end(bytes: &[u8], start: usize) -> usize {
    let mut depth = 1;
    let mut i = start;
    while let Some(&b) = bytes.get(i) {
        match b {
            b'"' | b'\'' => i = string_end(bytes, i),
            b'`' => i = template_end(bytes, i),
            b'{' => {
                depth += 1;
                i += 1;
            }
            b'}' => {
                depth -= 1;
                i += 1;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

fn regex_end(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    let mut in_class = false;
    while let Some(&b) = bytes.get(i) {
        match b {
            b'\\' => i += 2,
            b'\n' => return i,
            b'[' => {
                in_class = true;
                i += 1;
            }
            b']' => {
                in_class = false;
                i += 1;
            }
            b'/' if !in_class => {
                i += 1;
                while bytes.get(i).is_some_and(|b| b.is_ascii_alphanumeric()) {
                    i += 1;
                }
                return i;
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Pad `replacement` with the newlines `matched` spanned
fn keep_lines(matched: &str, mut replacement: String) -> String {
    let missing = matched
        .matches('\n')
        .count()
        .saturating_sub(replacement.matches('\n').count());
    replacement.push_str(&"\n".repeat(missing));
    replacement
}

fn member(object: &str, name: &str) -> String {
    if name == "default" {
        format!("{}({})", DEFAULT_FN, object)
    } else {
        format!("{}.{}", object, name)
    }
}

/// Parse `a, b as c` into `(a, a)`, `(b, c)`
fn specifier_list(list: &str) -> Result<Vec<(String, String)>, String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let parts: Vec<&str> = s.split_whitespace().collect();
            match parts.as_slice() {
                [name] if is_binding(name) => Ok((name.to_string(), name.to_string())),
                [name, "as", alias] if is_binding(name) && is_binding(alias) => {
                    Ok((name.to_string(), alias.to_string()))
                }
                _ => Err(format!("malformed import/export specifier '{}'", s)),
            }
        })
        .collect()
}

fn is_binding(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Rewrite an import clause such as `React, { Component as C }`
fn import_clause(
    indent: &str,
    clause: &str,
    specifier: &str,
    module: &str,
) -> Result<(String, Vec<String>), String> {
    let (outside, inside) = match (clause.find('{'), clause.rfind('}')) {
        (Some(open), Some(close)) if open < close => (
            format!("{} {}", &clause[..open], &clause[close + 1..]),
            Some(&clause[open + 1..close]),
        ),
        _ => (clause.to_string(), None),
    };

    let mut out = format!("{}var {} = {}(\"{}\");", indent, module, REQUIRE_FN, specifier);
    let mut names = Vec::new();

    for part in outside.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let words: Vec<&str> = part.split_whitespace().collect();
        match words.as_slice() {
            ["*", "as", local] if is_binding(local) => {
                out.push_str(&format!(" var {} = {};", local, module));
            }
            [local] if is_binding(local) => {
                out.push_str(&format!(" var {} = {}({});", local, DEFAULT_FN, module));
                names.push("default".to_string());
            }
            _ => return Err(format!("malformed import clause '{}'", clause.trim())),
        }
    }

    if let Some(inside) = inside {
        for (imported, local) in specifier_list(inside)? {
            out.push_str(&format!(" var {} = {};", local, member(module, &imported)));
            names.push(imported);
        }
    }

    Ok((out, names))
}

/// Binding names of a destructuring pattern such as `{ a, b: c, ...d }`
fn pattern_bindings(pattern: &str) -> Vec<String> {
    pattern
        .trim()
        .trim_start_matches(['{', '['])
        .trim_end_matches(['}', ']'])
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let s = s.trim_start_matches("...");
            match s.split_once(':') {
                Some((_, local)) => local.trim().to_string(),
                None => s.to_string(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_and_named_imports() {
        let linked = link("import React, { Component, Fragment as F } from 'react';\nrun();").unwrap();

        assert_eq!(
            linked.code,
            "__distpack_esm__(exports); var __distpack_m0__ = __distpack_require__(\"react\"); \
             var React = __distpack_default__(__distpack_m0__); \
             var Component = __distpack_m0__.Component; var F = __distpack_m0__.Fragment;\nrun();"
        );
        assert_eq!(
            linked.imports,
            vec![ImportRecord {
                specifier: "react".to_string(),
                names: vec!["default".to_string(), "Component".to_string(), "Fragment".to_string()],
            }]
        );
        assert!(!linked.exports.commonjs);
    }

    #[test]
    fn test_multiline_import_keeps_lines() {
        let source = "import {\n  a,\n  b\n} from \"./lib\";\nuse(a, b);";
        let linked = link(source).unwrap();

        assert_eq!(linked.code.lines().count(), source.lines().count());
        assert!(linked.code.ends_with("\nuse(a, b);"));
        assert_eq!(linked.imports[0].names, vec!["a", "b"]);
    }

    #[test]
    fn test_namespace_and_side_effect_imports() {
        let linked = link("import * as utils from './utils';\nimport './styles';").unwrap();

        assert!(linked.code.contains("var utils = __distpack_m0__;"));
        assert!(linked.code.contains("__distpack_require__(\"./styles\");"));
        assert_eq!(linked.imports.len(), 2);
        assert!(linked.imports.iter().all(|i| i.names.is_empty()));
    }

    #[test]
    fn test_export_declarations() {
        let source = "export const size = 3;\nexport function render() {}\nexport class Table {}";
        let linked = link(source).unwrap();

        let lines: Vec<&str> = linked.code.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "__distpack_esm__(exports); const size = 3;");
        assert_eq!(lines[1], "function render() {}");
        assert_eq!(lines[2], "class Table {}");
        assert_eq!(
            lines[3],
            "exports.size = size; exports.render = render; exports.Table = Table;"
        );
        assert_eq!(
            linked.exports.names.iter().cloned().collect::<Vec<_>>(),
            vec!["Table", "render", "size"]
        );
    }

    #[test]
    fn test_export_default_forms() {
        let named = link("export default function Chart() {}").unwrap();
        assert!(named.code.contains("function Chart() {}"));
        assert!(named.code.ends_with("exports.default = Chart;"));

        let anonymous = link("export default class extends Base {}").unwrap();
        assert!(anonymous.code.contains("exports.default = class extends Base {}"));

        let expression = link("export default { a: 1 };").unwrap();
        assert!(expression.code.contains("exports.default = { a: 1 };"));
        assert!(expression.exports.names.contains("default"));
    }

    #[test]
    fn test_export_lists_and_reexports() {
        let source = "const a = 1;\nexport { a, a as b };\nexport { x as y } from './x';\nexport * from './all';";
        let linked = link(source).unwrap();

        assert!(linked.code.contains("exports.y = __distpack_m0__.x;"));
        assert!(linked.code.contains("__distpack_export_star__(exports, __distpack_require__(\"./all\"));"));
        assert!(linked.code.ends_with("exports.a = a; exports.b = a;"));
        assert_eq!(linked.exports.star_from, vec!["./all"]);
        assert!(linked.exports.names.contains("y"));
        assert!(linked.exports.names.contains("b"));
    }

    #[test]
    fn test_destructured_export() {
        let linked = link("export const { a, b: c, ...rest } = obj;").unwrap();
        assert!(linked.code.contains("const { a, b: c, ...rest } = obj;"));
        assert!(linked.exports.names.contains("c"));
        assert!(linked.exports.names.contains("rest"));
    }

    #[test]
    fn test_commonjs_module_is_left_alone() {
        let source = "var x = require('./x');\nexports.scaleTime = x;\nmodule.exports.other = 1;";
        let linked = link(source).unwrap();

        assert_eq!(linked.code, source);
        assert!(linked.exports.commonjs);
        assert!(linked.exports.names.contains("scaleTime"));
        assert!(linked.exports.names.contains("other"));
        assert!(linked.imports.is_empty());
    }

    #[test]
    fn test_malformed_specifiers_are_rejected() {
        let err = link("import { a b } from './x';").unwrap_err();
        assert!(err.contains("'a b'"), "{}", err);

        assert!(link("export { a as } from './x';").is_err());
        assert!(link("import React Component from 'react';").is_err());
        assert!(link("const a = 1;\nexport { a, };").is_ok());
    }

    #[test]
    fn test_statements_in_templates_and_comments_are_left_alone() {
        let source = "const doc = `\nimport x from './x';\nexport const y = 1;\n`;\n/*\nexport default foo;\n*/\nexport const z = 2;";
        let linked = link(source).unwrap();

        assert!(linked.imports.is_empty());
        assert_eq!(linked.exports.names.iter().cloned().collect::<Vec<_>>(), vec!["z"]);
        assert!(linked.code.contains("`\nimport x from './x';\nexport const y = 1;\n`;"));
        assert!(linked.code.contains("/*\nexport default foo;\n*/"));
        assert!(linked.code.ends_with("\nexports.z = z;"));
    }

    #[test]
    fn test_quotes_in_regex_literals_do_not_hide_statements() {
        let source = "const quote = /'/g;\nexport const tick = /`/;\nexport const z = 2;";
        let linked = link(source).unwrap();

        assert!(linked.exports.names.contains("tick"));
        assert!(linked.exports.names.contains("z"));
    }
}
