//! Core bundler implementation
//!
//! Handles the module graph, dependency resolution, and bundle generation.
//! Jobs run one after another; the first failure stops the run.

mod emit;
mod error;
mod graph;
mod job;
mod sourcemap;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::analyzer::{BundleAnalysis, ModuleStats};
use crate::cli::BuildOptions;
use crate::config::Config;
use crate::plugins::{PluginManager, ResolveResult};
use crate::resolver::Resolver;
use crate::transform::link;
use crate::utils::{hash_content, module_id, relative_path};

pub use emit::{emit, guess_global, EmitOptions, EmittedBundle};
pub use error::BuildError;
pub use graph::{Module, ModuleGraph, ModuleId, Resolution};
pub use job::{plan_jobs, BuildJob};
pub use sourcemap::{encode_vlq, SourceMap, SourceMapBuilder};

/// Result of a build operation
#[derive(Debug)]
pub struct BuildResult {
    /// Generated bundles, in job order
    pub bundles: Vec<BundleInfo>,

    /// Path of `manifest.json`, when enabled
    pub manifest_path: Option<PathBuf>,
}

/// Information about a generated bundle
#[derive(Debug)]
pub struct BundleInfo {
    /// Module name of the job
    pub name: String,

    /// Output file path
    pub output_path: PathBuf,

    /// Bundle size in bytes
    pub size: usize,

    /// Source map path (if generated)
    pub sourcemap_path: Option<PathBuf>,

    /// Content hash of the bundle
    pub hash: String,
}

/// A bundle held in memory, before it is written
#[derive(Debug)]
pub struct Bundle {
    pub code: String,

    /// Line mappings when the job asks for a source map
    pub map: Option<SourceMapBuilder>,

    pub analysis: BundleAnalysis,
}

#[derive(Debug, Serialize)]
struct ManifestEntry<'a> {
    file: String,
    hash: &'a str,
}

/// Where a specifier points before its module is loaded
enum Target {
    Path(PathBuf),
    External(String),
}

/// State of one job's graph walk
struct JobContext {
    plugins: PluginManager,
    graph: Arc<RwLock<ModuleGraph>>,
    root: PathBuf,
}

/// The main bundler
pub struct Bundler {
    /// Project configuration
    config: Arc<Config>,

    /// Build options
    options: BuildOptions,
}

impl Bundler {
    /// Create a new bundler instance
    pub fn new(config: Config, options: BuildOptions) -> Self {
        Self {
            config: Arc::new(config),
            options,
        }
    }

    /// Directory bundles are written to
    pub fn output_dir(&self) -> PathBuf {
        self.options
            .outdir
            .clone()
            .unwrap_or_else(|| self.config.output_dir())
    }

    /// Clean the output directory, then run every job in order
    pub async fn build(&self) -> Result<BuildResult> {
        let start = Instant::now();
        let output_dir = self.output_dir();

        info!("Cleaning {}", output_dir.display());
        clean_dir(&output_dir)?;

        let jobs = plan_jobs(&self.config, self.options.mode);
        info!("Building {} bundle(s) in {} mode", jobs.len(), self.options.mode);

        let progress = ProgressBar::new(jobs.len() as u64);
        progress.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );

        let mut bundles = Vec::with_capacity(jobs.len());
        for job in &jobs {
            progress.set_message(format!("{} ({})", job.module_name, job.format));

            let info = self
                .run_job(job, &output_dir, &progress)
                .await
                .with_context(|| format!("Failed to build {} ({})", job.module_name, job.format));

            match info {
                Ok(info) => bundles.push(info),
                Err(err) => {
                    progress.abandon();
                    return Err(err);
                }
            }
            progress.inc(1);
        }
        progress.finish_and_clear();

        let manifest_path = if self.config.output.manifest {
            Some(write_manifest(&output_dir, &bundles)?)
        } else {
            None
        };

        debug!("Build completed in {:?}", start.elapsed());

        Ok(BuildResult {
            bundles,
            manifest_path,
        })
    }

    /// Bundle one job and write its files
    async fn run_job(
        &self,
        job: &BuildJob,
        output_dir: &Path,
        progress: &ProgressBar,
    ) -> Result<BundleInfo> {
        let bundle = self.bundle(job).await?;

        let output_path = job.output_file(output_dir);
        let map_dir = output_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| output_dir.to_path_buf());
        fs::create_dir_all(&map_dir).map_err(|source| BuildError::Write {
            path: map_dir.clone(),
            source,
        })?;

        let file_name = output_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut code = bundle.code;
        let mut sourcemap_path = None;

        if let Some(builder) = &bundle.map {
            let sources_base = fs::canonicalize(&map_dir).unwrap_or_else(|_| map_dir.clone());
            let map = builder.build(&file_name, &sources_base);
            if self.config.output.inline_sourcemap {
                code.push_str(&format!("//# sourceMappingURL={}\n", map.to_data_url()));
            } else {
                let map_path = map_dir.join(format!("{}.map", file_name));
                fs::write(&map_path, map.to_json()).map_err(|source| BuildError::Write {
                    path: map_path.clone(),
                    source,
                })?;
                code.push_str(&format!("//# sourceMappingURL={}.map\n", file_name));
                sourcemap_path = Some(map_path);
            }
        }

        fs::write(&output_path, &code).map_err(|source| BuildError::Write {
            path: output_path.clone(),
            source,
        })?;
        info!("Wrote {}", output_path.display());

        if !self.options.mode.is_production() {
            let report = bundle.analysis.formatted(self.config.analyzer.limit);
            progress.suspend(|| println!("{}", report));
        }

        Ok(BundleInfo {
            name: job.module_name.clone(),
            size: code.len(),
            hash: hash_content(code.as_bytes()),
            output_path,
            sourcemap_path,
        })
    }

    /// Build the module graph of one job and render it
    pub async fn bundle(&self, job: &BuildJob) -> Result<Bundle, BuildError> {
        if !job.input.is_file() {
            return Err(BuildError::MissingInput {
                name: job.module_name.clone(),
                path: job.input.clone(),
            });
        }

        let root = fs::canonicalize(&self.config.root).unwrap_or_else(|_| self.config.root.clone());
        let ctx = JobContext {
            plugins: PluginManager::for_job(&self.config, job)?,
            graph: Arc::new(RwLock::new(ModuleGraph::new())),
            root,
        };
        debug!("Plugins for {}: {:?}", job.module_name, ctx.plugins.names());

        ctx.plugins.run_build_start().await?;
        let entry = self.process_module(&ctx, &job.input, true).await?;
        ctx.plugins.run_build_end().await?;

        let graph = ctx.graph.read();
        check_imports(&graph, &ctx.plugins)?;

        let order = graph.get_reachable_modules(entry);
        let (entry_exports, _) = exported_names(&graph, &ctx.plugins, entry, &mut HashSet::new());

        let emitted = emit(
            &graph,
            &order,
            entry,
            &entry_exports,
            &EmitOptions {
                format: job.format,
                name: &job.module_name,
                globals: &self.config.globals,
                sourcemap: job.sourcemap,
            },
        );

        let analysis = analyze(&graph, &emitted);
        debug!(
            "Bundled {} module(s) into {} ({} bytes)",
            order.len(),
            job.module_name,
            emitted.code.len()
        );

        Ok(Bundle {
            code: emitted.code,
            map: emitted.map,
            analysis,
        })
    }

    /// Process a single module and its dependencies
    ///
    /// Uses Box::pin for async recursion to avoid infinite type size issues
    async fn process_module(
        &self,
        ctx: &JobContext,
        path: &Path,
        is_entry: bool,
    ) -> Result<ModuleId, BuildError> {
        let canonical_path = fs::canonicalize(path).map_err(|source| BuildError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        // Check if already processed
        if let Some(id) = ctx.graph.read().get_module_id(&canonical_path) {
            return Ok(id);
        }

        let source = fs::read_to_string(&canonical_path).map_err(|source| BuildError::Read {
            path: canonical_path.clone(),
            source,
        })?;
        let id = module_id(&ctx.root, &canonical_path);
        debug!("Loading {}", id);

        let code = ctx.plugins.transform(&source, &id).await?;
        let linked = link(&code).map_err(|reason| BuildError::transform(&id, reason))?;
        let dependencies = Resolver::extract_dependencies(&linked.code);

        // Registered before its dependencies so cycles terminate
        let module_id = ctx.graph.write().add_module(Module {
            id: id.clone(),
            path: canonical_path.clone(),
            source,
            code: linked.code,
            is_entry,
            imports: linked.imports,
            exports: linked.exports,
            resolved: HashMap::new(),
        });

        let mut resolved = HashMap::new();
        let mut ids = HashMap::new();

        for specifier in dependencies {
            match self.resolve_specifier(ctx, &specifier, &canonical_path, &id).await? {
                Target::External(name) => {
                    ids.insert(specifier.clone(), name.clone());
                    resolved.insert(specifier, Resolution::External(name));
                }
                Target::Path(dep_path) => {
                    let dep_id = Box::pin(self.process_module(ctx, &dep_path, false)).await?;

                    let mut graph = ctx.graph.write();
                    graph.add_dependency(module_id, dep_id);
                    if let Some(dep) = graph.get_module(dep_id) {
                        ids.insert(specifier.clone(), dep.id.clone());
                    }
                    resolved.insert(specifier, Resolution::Module(dep_id));
                }
            }
        }

        let mut graph = ctx.graph.write();
        if let Some(module) = graph.get_module_mut(module_id) {
            module.code = Resolver::rewrite_dependencies(&module.code, &ids);
            module.resolved = resolved;
        }

        Ok(module_id)
    }

    /// Externals first, then plugins, then the core relative resolver
    async fn resolve_specifier(
        &self,
        ctx: &JobContext,
        specifier: &str,
        importer: &Path,
        importer_id: &str,
    ) -> Result<Target, BuildError> {
        if self.config.is_external(specifier) {
            return Ok(Target::External(specifier.to_string()));
        }

        match ctx.plugins.resolve_id(specifier, importer).await? {
            ResolveResult::Resolved(path) => Ok(Target::Path(path)),
            ResolveResult::External => Ok(Target::External(specifier.to_string())),
            ResolveResult::Skip if Resolver::is_path_specifier(specifier) => {
                let base_dir = importer.parent().unwrap_or(Path::new("."));
                Resolver::core()
                    .resolve_relative(specifier, base_dir)
                    .map(Target::Path)
                    .ok_or_else(|| BuildError::Unresolved {
                        specifier: specifier.to_string(),
                        importer: importer_id.to_string(),
                    })
            }
            ResolveResult::Skip => {
                warn!(
                    "'{}' is imported by {}, but could not be resolved; treating it as external",
                    specifier, importer_id
                );
                Ok(Target::External(specifier.to_string()))
            }
        }
    }
}

/// Every named import must be exported by the module it points at
fn check_imports(graph: &ModuleGraph, plugins: &PluginManager) -> Result<(), BuildError> {
    for id in graph.all_module_ids() {
        let Some(module) = graph.get_module(id) else {
            continue;
        };

        for import in module.imports.iter().filter(|import| !import.names.is_empty()) {
            let Some(Resolution::Module(target)) = module.resolved.get(&import.specifier) else {
                continue;
            };

            let (available, complete) = exported_names(graph, plugins, *target, &mut HashSet::new());
            if !complete {
                continue;
            }

            if let Some(name) = import.names.iter().find(|name| !available.contains(*name)) {
                let target_id = graph
                    .get_module(*target)
                    .map(|m| m.id.clone())
                    .unwrap_or_default();
                return Err(BuildError::MissingExport {
                    name: name.clone(),
                    module: target_id,
                    importer: module.id.clone(),
                });
            }
        }
    }

    Ok(())
}

/// Names importable from a module, and whether the list is known to be complete
///
/// `export * from` an external package makes the list incomplete.
fn exported_names(
    graph: &ModuleGraph,
    plugins: &PluginManager,
    id: ModuleId,
    visited: &mut HashSet<ModuleId>,
) -> (BTreeSet<String>, bool) {
    let Some(module) = graph.get_module(id) else {
        return (BTreeSet::new(), false);
    };
    if !visited.insert(id) {
        return (BTreeSet::new(), true);
    }

    if module.exports.commonjs {
        return (plugins.commonjs_exports(&module.id, &module.exports.names), true);
    }

    let mut names = module.exports.names.clone();
    let mut complete = true;

    for specifier in &module.exports.star_from {
        match module.resolved.get(specifier) {
            Some(Resolution::Module(target)) => {
                let (star, star_complete) = exported_names(graph, plugins, *target, visited);
                names.extend(star.into_iter().filter(|name| name != "default"));
                complete &= star_complete;
            }
            _ => complete = false,
        }
    }

    (names, complete)
}

fn analyze(graph: &ModuleGraph, emitted: &EmittedBundle) -> BundleAnalysis {
    let modules = emitted
        .rendered
        .iter()
        .filter_map(|&(id, rendered)| {
            let module = graph.get_module(id)?;
            let dependents = graph
                .get_dependents(id)
                .into_iter()
                .filter_map(|dependent| graph.get_module(dependent).map(|m| m.id.clone()))
                .collect();
            Some(ModuleStats {
                id: module.id.clone(),
                rendered,
                original: module.source.len(),
                dependents,
            })
        })
        .collect();

    BundleAnalysis::new(emitted.code.len(), modules)
}

/// Remove every entry directly under `dir`; a missing directory is fine
fn clean_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
        let path = entry.path();
        let removed = if entry.file_type().is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        removed.with_context(|| format!("Failed to remove {}", path.display()))?;
    }

    Ok(())
}

/// Write `manifest.json`: module name -> file and content hash
fn write_manifest(output_dir: &Path, bundles: &[BundleInfo]) -> Result<PathBuf> {
    let manifest: BTreeMap<&str, ManifestEntry<'_>> = bundles
        .iter()
        .map(|bundle| {
            let file = relative_path(output_dir, &bundle.output_path)
                .unwrap_or_else(|| bundle.output_path.display().to_string());
            (
                bundle.name.as_str(),
                ManifestEntry {
                    file,
                    hash: &bundle.hash,
                },
            )
        })
        .collect();

    let manifest_path = output_dir.join("manifest.json");
    fs::create_dir_all(output_dir).context("Failed to create output directory")?;
    let manifest_json = serde_json::to_string_pretty(&manifest)?;
    fs::write(&manifest_path, manifest_json).context("Failed to write manifest.json")?;

    Ok(manifest_path)
}
