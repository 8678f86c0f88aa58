//! Bundle composition report
//!
//! Printed after every non-production bundle: how much of the output each
//! module accounts for and who imports it.

use std::fmt::Write;

use crate::utils::format_size;

const BAR_WIDTH: f64 = 50.0;
const RULE: &str = "-----------------------------";

/// Size figures for one bundled module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleStats {
    /// Module id, e.g. `src/ui/index.js`
    pub id: String,

    /// Bytes of the module wrapper in the bundle
    pub rendered: usize,

    /// Bytes of the original source file
    pub original: usize,

    /// Ids of the modules importing this one
    pub dependents: Vec<String>,
}

/// Composition of one bundle
#[derive(Debug, Clone)]
pub struct BundleAnalysis {
    /// Total bundle size in bytes
    pub bundle_size: usize,

    /// Modules, largest rendered size first
    pub modules: Vec<ModuleStats>,
}

impl BundleAnalysis {
    pub fn new(bundle_size: usize, mut modules: Vec<ModuleStats>) -> Self {
        modules.sort_by(|a, b| b.rendered.cmp(&a.rendered).then_with(|| a.id.cmp(&b.id)));
        Self {
            bundle_size,
            modules,
        }
    }

    /// Sum of all original module sizes
    pub fn original_size(&self) -> usize {
        self.modules.iter().map(|m| m.original).sum()
    }

    /// Percentage saved relative to the original sources; negative when the bundle grew
    pub fn code_reduction(&self) -> f64 {
        reduction(self.bundle_size, self.original_size())
    }

    /// Human-readable report listing at most `limit` modules
    pub fn formatted(&self, limit: usize) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "{}", RULE);
        let _ = writeln!(out, "Bundle Analysis");
        let _ = writeln!(out, "{}", RULE);
        let _ = writeln!(out, "bundle size:    {}", format_size(self.bundle_size));
        let _ = writeln!(out, "original size:  {}", format_size(self.original_size()));
        let _ = writeln!(out, "code reduction: {:.2} %", self.code_reduction());
        let _ = writeln!(out, "module count:   {}", self.modules.len());

        for module in self.modules.iter().take(limit) {
            let share = percent(module.rendered, self.bundle_size);
            let bar = "█".repeat((share / 100.0 * BAR_WIDTH).round() as usize);

            let _ = writeln!(out);
            let _ = writeln!(out, "{}", module.id);
            let _ = writeln!(out, "{} {:.2} %", bar, share);
            let _ = writeln!(out, "rendered size:  {}", format_size(module.rendered));
            let _ = writeln!(out, "original size:  {}", format_size(module.original));
            let _ = writeln!(
                out,
                "code reduction: {:.2} %",
                reduction(module.rendered, module.original)
            );
            let _ = writeln!(out, "dependents:     {}", module.dependents.len());
            for dependent in &module.dependents {
                let _ = writeln!(out, "  - {}", dependent);
            }
        }

        out
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn reduction(size: usize, original: usize) -> f64 {
    if original == 0 {
        0.0
    } else {
        100.0 - percent(size, original)
    }
}
