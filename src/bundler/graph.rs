//! Module graph data structures

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use crate::transform::{ExportInfo, ImportRecord};

/// Unique identifier for a module
pub type ModuleId = usize;

/// Where an import specifier points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A bundled module
    Module(ModuleId),
    /// An external package, left to the output format
    External(String),
}

/// A module in the dependency graph
#[derive(Debug, Clone)]
pub struct Module {
    /// Root-relative id, e.g. `src/ui/index.js`
    pub id: String,

    /// Absolute path to the module
    pub path: PathBuf,

    /// Original source code
    pub source: String,

    /// Transformed and linked code, as written into the bundle
    pub code: String,

    /// Whether this is the entry point
    pub is_entry: bool,

    /// Bindings imported from other modules
    pub imports: Vec<ImportRecord>,

    /// Bindings this module exposes
    pub exports: ExportInfo,

    /// Specifier -> resolution
    pub resolved: HashMap<String, Resolution>,
}

/// The module dependency graph
#[derive(Debug, Default)]
pub struct ModuleGraph {
    /// All modules indexed by their ID
    modules: HashMap<ModuleId, Module>,

    /// Map from path to module ID
    path_to_id: HashMap<PathBuf, ModuleId>,

    /// Dependency edges: module ID -> set of dependency IDs
    edges: HashMap<ModuleId, BTreeSet<ModuleId>>,

    /// Next available module ID
    next_id: ModuleId,
}

impl ModuleGraph {
    /// Create a new empty module graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module to the graph
    pub fn add_module(&mut self, module: Module) -> ModuleId {
        let path = module.path.clone();

        // Check if already exists
        if let Some(&id) = self.path_to_id.get(&path) {
            return id;
        }

        let id = self.next_id;
        self.next_id += 1;

        self.path_to_id.insert(path, id);
        self.modules.insert(id, module);
        self.edges.insert(id, BTreeSet::new());

        id
    }

    /// Add a dependency edge between modules
    pub fn add_dependency(&mut self, from: ModuleId, to: ModuleId) {
        if let Some(deps) = self.edges.get_mut(&from) {
            deps.insert(to);
        }
    }

    /// Get module ID from path
    pub fn get_module_id(&self, path: &Path) -> Option<ModuleId> {
        self.path_to_id.get(path).copied()
    }

    /// Get a module by ID
    pub fn get_module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(&id)
    }

    /// Get a mutable reference to a module
    pub fn get_module_mut(&mut self, id: ModuleId) -> Option<&mut Module> {
        self.modules.get_mut(&id)
    }

    /// Get all module IDs, in insertion order
    pub fn all_module_ids(&self) -> Vec<ModuleId> {
        let mut ids: Vec<ModuleId> = self.modules.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Get all modules reachable from a given module (BFS)
    pub fn get_reachable_modules(&self, start: ModuleId) -> Vec<ModuleId> {
        let mut visited = HashSet::new();
        let mut result = Vec::new();
        let mut queue = VecDeque::new();

        queue.push_back(start);
        visited.insert(start);

        while let Some(id) = queue.pop_front() {
            result.push(id);

            if let Some(deps) = self.edges.get(&id) {
                for &dep_id in deps {
                    if visited.insert(dep_id) {
                        queue.push_back(dep_id);
                    }
                }
            }
        }

        result
    }

    /// Get direct dependencies of a module
    pub fn get_dependencies(&self, id: ModuleId) -> Vec<ModuleId> {
        self.edges
            .get(&id)
            .map(|deps| deps.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Modules that import `id`
    pub fn get_dependents(&self, id: ModuleId) -> Vec<ModuleId> {
        let mut dependents: Vec<ModuleId> = self
            .edges
            .iter()
            .filter(|(_, deps)| deps.contains(&id))
            .map(|(&from, _)| from)
            .collect();
        dependents.sort_unstable();
        dependents
    }

    /// External package ids in first-use order
    pub fn externals(&self, order: &[ModuleId]) -> Vec<String> {
        let mut externals: Vec<String> = Vec::new();

        for &id in order {
            let Some(module) = self.get_module(id) else {
                continue;
            };
            let mut names: Vec<&String> = module
                .resolved
                .values()
                .filter_map(|r| match r {
                    Resolution::External(name) => Some(name),
                    Resolution::Module(_) => None,
                })
                .collect();
            names.sort();
            for name in names {
                if !externals.contains(name) {
                    externals.push(name.clone());
                }
            }
        }

        externals
    }

    /// Total number of modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if graph is empty
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
