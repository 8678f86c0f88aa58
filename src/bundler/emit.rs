//! Bundle code generation
//!
//! A bundle is a small module registry: one wrapper function per module,
//! keyed by module id, plus the runtime below. The output format decides how
//! externals come in and how the entry module's exports go out.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use super::graph::{ModuleGraph, ModuleId};
use super::sourcemap::SourceMapBuilder;
use crate::config::OutputFormat;
use crate::transform::REQUIRE_FN;
use crate::utils::to_identifier;

const MODULES: &str = "__distpack_modules__";
const EXTERNALS: &str = "__distpack_externals__";
const ENTRY: &str = "__distpack_entry__";

const RUNTIME: &str = r#"var __distpack_modules__ = {};
var __distpack_cache__ = {};
function __distpack_require__(id) {
  if (Object.prototype.hasOwnProperty.call(__distpack_externals__, id)) {
    return __distpack_externals__[id];
  }
  var cached = __distpack_cache__[id];
  if (cached) {
    return cached.exports;
  }
  var module = __distpack_cache__[id] = { exports: {} };
  __distpack_modules__[id](module, module.exports);
  return module.exports;
}
function __distpack_esm__(exports) {
  Object.defineProperty(exports, "__esModule", { value: true });
}
function __distpack_default__(m) {
  return m && (m.__esModule || m[Symbol.toStringTag] === "Module") ? m["default"] : m;
}
function __distpack_export_star__(target, source) {
  Object.keys(source).forEach(function (key) {
    if (key !== "default" && !Object.prototype.hasOwnProperty.call(target, key)) {
      target[key] = source[key];
    }
  });
}"#;

/// How one bundle is wrapped
#[derive(Debug, Clone)]
pub struct EmitOptions<'a> {
    pub format: OutputFormat,

    /// Module name; `iife` and `umd` turn it into the global variable
    pub name: &'a str,

    /// External id -> global variable, for `iife` and `umd`
    pub globals: &'a BTreeMap<String, String>,

    /// Record line mappings
    pub sourcemap: bool,
}

/// Generated bundle code
#[derive(Debug)]
pub struct EmittedBundle {
    pub code: String,

    /// Line mappings, when requested
    pub map: Option<SourceMapBuilder>,

    /// Rendered size of every module wrapper, in emit order
    pub rendered: Vec<(ModuleId, usize)>,
}

/// Tracks the generated line number while text is appended
#[derive(Debug, Default)]
struct Writer {
    code: String,
    line: usize,
}

impl Writer {
    fn line(&mut self, text: &str) {
        self.code.push_str(text);
        self.code.push('\n');
        self.line += text.matches('\n').count() + 1;
    }
}

/// Render the modules in `order` into one bundle whose exports are those of `entry`
pub fn emit(
    graph: &ModuleGraph,
    order: &[ModuleId],
    entry: ModuleId,
    entry_exports: &BTreeSet<String>,
    options: &EmitOptions<'_>,
) -> EmittedBundle {
    let externals = graph.externals(order);
    let params: Vec<String> = (0..externals.len()).map(external_param).collect();
    let entry_id = graph
        .get_module(entry)
        .map(|module| json_string(&module.id))
        .unwrap_or_default();
    let entry_is_commonjs = graph
        .get_module(entry)
        .map(|module| module.exports.commonjs)
        .unwrap_or(false);

    let mut out = Writer::default();
    let mut map = options.sourcemap.then(SourceMapBuilder::new);
    let mut rendered = Vec::with_capacity(order.len());

    let factory_name = to_identifier(options.name);
    let require_entry = format!("{}({})", REQUIRE_FN, entry_id);

    match options.format {
        OutputFormat::Cjs => {
            out.line("'use strict';");
            out.line("");
            for (param, external) in params.iter().zip(&externals) {
                out.line(&format!("var {} = require({});", param, json_string(external)));
            }
        }
        OutputFormat::Esm => {
            for (param, external) in params.iter().zip(&externals) {
                out.line(&format!("import * as {} from {};", param, json_string(external)));
            }
        }
        OutputFormat::Iife => {
            out.line(&format!(
                "var {} = (function ({}) {{",
                factory_name,
                params.join(", ")
            ));
            out.line("'use strict';");
        }
        OutputFormat::Umd => {
            let globals: Vec<String> = externals
                .iter()
                .map(|external| format!("global.{}", global_name(external, options.globals)))
                .collect();
            let requires: Vec<String> = externals
                .iter()
                .map(|external| format!("require({})", json_string(external)))
                .collect();
            let amd: Vec<String> = externals.iter().map(|e| json_string(e)).collect();

            out.line("(function (global, factory) {");
            out.line(&format!(
                "  typeof exports === 'object' && typeof module !== 'undefined' ? module.exports = factory({}) :",
                requires.join(", ")
            ));
            out.line(&format!(
                "  typeof define === 'function' && define.amd ? define([{}], factory) :",
                amd.join(", ")
            ));
            out.line(&format!(
                "  (global = global || self, global.{} = factory({}));",
                factory_name,
                globals.join(", ")
            ));
            out.line(&format!("}}(this, function ({}) {{", params.join(", ")));
            out.line("'use strict';");
        }
    }

    out.line("");
    out.line(RUNTIME);
    let table: Vec<String> = params
        .iter()
        .zip(&externals)
        .map(|(param, external)| format!("{}: {}", json_string(external), param))
        .collect();
    out.line(&format!("var {} = {{{}}};", EXTERNALS, table.join(", ")));

    for &id in order {
        let Some(module) = graph.get_module(id) else {
            continue;
        };

        let start = out.code.len();
        out.line("");
        out.line(&format!(
            "{}[{}] = function (module, exports) {{",
            MODULES,
            json_string(&module.id)
        ));

        let source_index = map
            .as_mut()
            .map(|map| map.add_source(&module.path, &module.source));
        let last_original = module.source.split('\n').count().saturating_sub(1);

        for (i, line) in module.code.split('\n').enumerate() {
            if let (Some(map), Some(source)) = (map.as_mut(), source_index) {
                map.map_line(out.line, source, i.min(last_original));
            }
            out.line(line);
        }

        out.line("};");
        rendered.push((id, out.code.len() - start));
    }

    out.line("");
    match options.format {
        OutputFormat::Cjs => {
            out.line(&format!("module.exports = {};", require_entry));
        }
        OutputFormat::Esm => {
            out.line(&format!("var {} = {};", ENTRY, require_entry));
            if entry_is_commonjs {
                out.line(&format!("export default {};", ENTRY));
            } else if entry_exports.contains("default") {
                out.line(&format!("export default {}[\"default\"];", ENTRY));
            }
            for name in entry_exports.iter().filter(|name| *name != "default") {
                out.line(&format!("export var {} = {}.{};", name, ENTRY, name));
            }
        }
        OutputFormat::Iife => {
            out.line(&format!("return {};", require_entry));
            let globals: Vec<String> = externals
                .iter()
                .map(|external| global_name(external, options.globals))
                .collect();
            out.line(&format!("}})({});", globals.join(", ")));
        }
        OutputFormat::Umd => {
            out.line(&format!("return {};", require_entry));
            out.line("}));");
        }
    }

    EmittedBundle {
        code: out.code,
        map,
        rendered,
    }
}

fn external_param(index: usize) -> String {
    format!("__distpack_ext_{}__", index)
}

fn json_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Configured global for an external, or a guess with a warning
fn global_name(external: &str, globals: &BTreeMap<String, String>) -> String {
    match globals.get(external) {
        Some(global) => global.clone(),
        None => {
            let guess = guess_global(external);
            warn!(
                "No global name given for external module '{}', guessing '{}'",
                external, guess
            );
            guess
        }
    }
}

/// `react-dom` -> `reactDom`, `@vx/scale` -> `vxScale`
pub fn guess_global(external: &str) -> String {
    let mut guess = String::new();
    for (i, part) in external
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .enumerate()
    {
        if i == 0 {
            guess.push_str(part);
        } else {
            let mut chars = part.chars();
            if let Some(first) = chars.next() {
                guess.extend(first.to_uppercase());
                guess.push_str(chars.as_str());
            }
        }
    }
    to_identifier(&guess)
}
