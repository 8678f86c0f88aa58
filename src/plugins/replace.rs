//! Token replacement (`process.env.NODE_ENV` and friends)

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;

use super::{Plugin, PluginContext, TransformResult};
use crate::utils::is_ident_char;

/// Replaces configured tokens wherever they stand alone
pub struct ReplacePlugin {
    pattern: Option<Regex>,
    values: HashMap<String, String>,
}

impl ReplacePlugin {
    pub fn new(values: &BTreeMap<String, String>) -> Self {
        // Longest key first so `a.b.c` wins over `a.b`
        let mut keys: Vec<&String> = values.keys().filter(|k| !k.is_empty()).collect();
        keys.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));

        let pattern = if keys.is_empty() {
            None
        } else {
            let alternation = keys
                .iter()
                .map(|k| regex::escape(k))
                .collect::<Vec<_>>()
                .join("|");
            Regex::new(&alternation).ok()
        };

        Self {
            pattern,
            values: values.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }

    fn replace(&self, code: &str) -> Option<String> {
        let pattern = self.pattern.as_ref()?;
        let mut out = String::with_capacity(code.len());
        let mut last = 0;

        for m in pattern.find_iter(code) {
            let before = code[..m.start()].chars().next_back();
            let after = code[m.end()..].chars().next();
            let glued = before.is_some_and(|c| is_ident_char(c) || c == '.')
                || after.is_some_and(is_ident_char);
            if glued {
                continue;
            }

            if let Some(value) = self.values.get(m.as_str()) {
                out.push_str(&code[last..m.start()]);
                out.push_str(value);
                last = m.end();
            }
        }

        if last == 0 {
            return None;
        }

        out.push_str(&code[last..]);
        Some(out)
    }
}

#[async_trait]
impl Plugin for ReplacePlugin {
    fn name(&self) -> &str {
        "replace"
    }

    async fn transform(&self, code: &str, _id: &str, _ctx: &PluginContext) -> Result<TransformResult> {
        Ok(match self.replace(code) {
            Some(replaced) => TransformResult::Transformed(replaced),
            None => TransformResult::Skip,
        })
    }
}
