//! Module dependency graph.
//!
//! Built once from every known module's dependency list, the graph answers which
//! dependencies of a module are not yet done on a target and in which order modules may
//! run. Nodes live in an arena; the synthetic root (index 0) is the parent of every module
//! without dependencies and never appears in query results.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use metadata_db::ModuleProgress;

use crate::{
    error::{ConfigurationError, UnknownModule},
    manifest::ModuleManifest,
    module_id::ModuleId,
};

const ROOT: usize = 0;

/// A module in the dependency graph
#[derive(Debug, Clone)]
pub struct ModuleDepNode {
    name: String,
    depth: usize,
    parents: Vec<usize>,
    children: Vec<usize>,
    /// Latest progress row per progress name (`Name` or `Name:submodule`)
    progress: BTreeMap<String, ModuleProgress>,
}

impl ModuleDepNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Distance from the root: 1 for modules without dependencies, otherwise one more
    /// than the deepest dependency
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Progress rows currently attached to the node
    pub fn progress(&self) -> impl Iterator<Item = &ModuleProgress> {
        self.progress.values()
    }

    /// A node is done when it has progress rows and every one of them is done
    pub fn is_done(&self) -> bool {
        !self.progress.is_empty() && self.progress.values().all(ModuleProgress::is_done)
    }
}

/// Dependency DAG over all known modules
#[derive(Debug, Clone)]
pub struct ModuleDepGraph {
    nodes: Vec<ModuleDepNode>,
    index: HashMap<String, usize>,
}

impl ModuleDepGraph {
    /// Builds the graph from `(name, dependencies)` entries
    ///
    /// Entries are materialised in passes: an entry is added once all of its dependencies
    /// exist, linked as a child of each of them (or of the root if it has none). Fails if a
    /// name is declared twice, if an entry depends on itself, or if entries are left over
    /// because a dependency is missing or cyclic.
    pub fn from_dep_list<I, N, D>(entries: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = (N, D)>,
        N: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        let mut pending: Vec<(String, Vec<String>)> = Vec::new();
        let mut declared = BTreeSet::new();
        for (name, deps) in entries {
            let name = name.into();
            if !declared.insert(name.clone()) {
                return Err(ConfigurationError::DuplicateModule(name));
            }
            let mut unique_deps: Vec<String> = Vec::new();
            for dep in deps {
                let dep = dep.into();
                if dep == name {
                    return Err(ConfigurationError::SelfDependency(name));
                }
                if !unique_deps.contains(&dep) {
                    unique_deps.push(dep);
                }
            }
            pending.push((name, unique_deps));
        }

        let mut graph = Self {
            nodes: vec![ModuleDepNode {
                name: String::new(),
                depth: 0,
                parents: Vec::new(),
                children: Vec::new(),
                progress: BTreeMap::new(),
            }],
            index: HashMap::new(),
        };

        while !pending.is_empty() {
            // Readiness is decided against the nodes materialised by earlier passes only
            let (ready, blocked): (Vec<_>, Vec<_>) = pending
                .into_iter()
                .partition(|(_, deps)| deps.iter().all(|dep| graph.index.contains_key(dep)));
            if ready.is_empty() {
                return Err(leftover_error(&blocked, &declared));
            }
            for (name, deps) in &ready {
                graph.insert(name, deps);
            }
            pending = blocked;
        }

        Ok(graph)
    }

    /// Builds the graph from module manifests
    pub fn from_manifests<'a, I>(manifests: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = &'a ModuleManifest>,
    {
        Self::from_dep_list(
            manifests
                .into_iter()
                .map(|m| (m.name.clone(), m.dependencies.clone())),
        )
    }

    fn insert(&mut self, name: &str, deps: &[String]) {
        let id = self.nodes.len();
        let parents: Vec<usize> = if deps.is_empty() {
            vec![ROOT]
        } else {
            deps.iter().filter_map(|dep| self.index.get(dep).copied()).collect()
        };
        let depth = 1 + parents
            .iter()
            .map(|&p| self.nodes[p].depth)
            .max()
            .unwrap_or(0);
        for &parent in &parents {
            self.nodes[parent].children.push(id);
        }
        self.nodes.push(ModuleDepNode {
            name: name.to_string(),
            depth,
            parents,
            children: Vec::new(),
            progress: BTreeMap::new(),
        });
        self.index.insert(name.to_string(), id);
    }

    /// Number of modules in the graph
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Looks up a module node by name
    pub fn node(&self, name: &str) -> Result<&ModuleDepNode, UnknownModule> {
        self.node_id(name).map(|id| &self.nodes[id])
    }

    /// Names of the direct dependencies of a module, in declaration order
    pub fn parents(&self, name: &str) -> Result<Vec<&str>, UnknownModule> {
        let id = self.node_id(name)?;
        Ok(self.names(&self.nodes[id].parents))
    }

    /// Names of the modules that directly depend on a module
    pub fn children(&self, name: &str) -> Result<Vec<&str>, UnknownModule> {
        let id = self.node_id(name)?;
        Ok(self.names(&self.nodes[id].children))
    }

    /// Every module name, ordered by depth and then by insertion
    pub fn names_in_order(&self) -> Vec<&str> {
        let mut ids: Vec<usize> = (1..self.nodes.len()).collect();
        ids.sort_by_key(|&id| self.nodes[id].depth);
        self.names(&ids)
    }

    /// Replaces the progress state of every node with `rows`
    ///
    /// Each row is attached to the node matching the primary name of its module. Fails
    /// without touching the graph if a row names an unknown module.
    pub fn load_state<'a, I>(&mut self, rows: I) -> Result<(), UnknownModule>
    where
        I: IntoIterator<Item = &'a ModuleProgress>,
    {
        let resolved = self.resolve_rows(rows)?;
        for node in &mut self.nodes {
            node.progress.clear();
        }
        self.attach(resolved);
        Ok(())
    }

    /// Attaches `rows` on top of the current state
    ///
    /// A row replaces any row with the same progress name on the same node.
    pub fn update_state<'a, I>(&mut self, rows: I) -> Result<(), UnknownModule>
    where
        I: IntoIterator<Item = &'a ModuleProgress>,
    {
        let resolved = self.resolve_rows(rows)?;
        self.attach(resolved);
        Ok(())
    }

    /// Detaches `rows` from the current state
    pub fn remove_state<'a, I>(&mut self, rows: I) -> Result<(), UnknownModule>
    where
        I: IntoIterator<Item = &'a ModuleProgress>,
    {
        let resolved = self.resolve_rows(rows)?;
        for (id, row) in resolved {
            let node = &mut self.nodes[id];
            if node
                .progress
                .get(&row.module)
                .is_some_and(|attached| attached.id == row.id)
            {
                node.progress.remove(&row.module);
            }
        }
        Ok(())
    }

    fn resolve_rows<'a, I>(&self, rows: I) -> Result<Vec<(usize, &'a ModuleProgress)>, UnknownModule>
    where
        I: IntoIterator<Item = &'a ModuleProgress>,
    {
        rows.into_iter()
            .map(|row| {
                let name = row
                    .module
                    .parse::<ModuleId>()
                    .map(|id| id.name().to_string())
                    .map_err(|_| UnknownModule(row.module.clone()))?;
                Ok((self.node_id(&name)?, row))
            })
            .collect()
    }

    fn attach(&mut self, resolved: Vec<(usize, &ModuleProgress)>) {
        for (id, row) in resolved {
            self.nodes[id]
                .progress
                .insert(row.module.clone(), row.clone());
        }
    }

    /// Dependencies of `names` that are not done and not themselves among `names`
    ///
    /// Walks every transitive dependency of each named module. The result keeps the
    /// order of discovery and lists each name once.
    pub fn missing_dependencies<S>(&self, names: &[S]) -> Result<Vec<String>, UnknownModule>
    where
        S: AsRef<str>,
    {
        let requested = names
            .iter()
            .map(|name| self.node_id(name.as_ref()))
            .collect::<Result<BTreeSet<_>, _>>()?;

        let mut missing = Vec::new();
        let mut seen = BTreeSet::new();
        for name in names {
            let id = self.node_id(name.as_ref())?;
            for ancestor in self.ancestors(id) {
                if requested.contains(&ancestor) || !seen.insert(ancestor) {
                    continue;
                }
                if !self.nodes[ancestor].is_done() {
                    missing.push(self.nodes[ancestor].name.clone());
                }
            }
        }
        Ok(missing)
    }

    /// Whether every transitive dependency of `name` is done
    pub fn all_dependencies_done(&self, name: &str) -> Result<bool, UnknownModule> {
        let id = self.node_id(name)?;
        Ok(self
            .ancestors(id)
            .into_iter()
            .all(|ancestor| self.nodes[ancestor].is_done()))
    }

    /// Stable sort of `names` by depth, so that dependencies come before dependents
    pub fn order_by_depth<S>(&self, names: &[S]) -> Result<Vec<String>, UnknownModule>
    where
        S: AsRef<str>,
    {
        let mut keyed = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.node_id(name)
                    .map(|id| (self.nodes[id].depth, name.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        keyed.sort_by_key(|(depth, _)| *depth);
        Ok(keyed.into_iter().map(|(_, name)| name).collect())
    }

    fn node_id(&self, name: &str) -> Result<usize, UnknownModule> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| UnknownModule(name.to_string()))
    }

    fn names(&self, ids: &[usize]) -> Vec<&str> {
        ids.iter()
            .filter(|&&id| id != ROOT)
            .map(|&id| self.nodes[id].name.as_str())
            .collect()
    }

    /// Transitive parents of a node, excluding the root, in breadth-first order
    fn ancestors(&self, id: usize) -> Vec<usize> {
        let mut visited = BTreeSet::new();
        let mut order = Vec::new();
        let mut queue: std::collections::VecDeque<usize> =
            self.nodes[id].parents.iter().copied().collect();
        while let Some(parent) = queue.pop_front() {
            if parent == ROOT || !visited.insert(parent) {
                continue;
            }
            order.push(parent);
            queue.extend(self.nodes[parent].parents.iter().copied());
        }
        order
    }
}

/// Explains why the remaining entries could not be materialised
fn leftover_error(
    pending: &[(String, Vec<String>)],
    declared: &BTreeSet<String>,
) -> ConfigurationError {
    for (name, deps) in pending {
        if let Some(dep) = deps.iter().find(|dep| !declared.contains(*dep)) {
            return ConfigurationError::MissingDependency {
                module: name.clone(),
                dependency: dep.clone(),
            };
        }
    }

    // Every dependency is declared, so the leftovers contain a cycle. Follow the first
    // unresolved dependency from any leftover entry until a name repeats.
    let deps: BTreeMap<&str, &[String]> = pending
        .iter()
        .map(|(name, deps)| (name.as_str(), deps.as_slice()))
        .collect();
    let mut path: Vec<String> = Vec::new();
    let mut current = pending[0].0.as_str();
    loop {
        if let Some(pos) = path.iter().position(|n| n == current) {
            let mut cycle = path.split_off(pos);
            cycle.push(current.to_string());
            return ConfigurationError::DependencyCycle(cycle);
        }
        path.push(current.to_string());
        let next = deps
            .get(current)
            .and_then(|ds| ds.iter().find(|d| deps.contains_key(d.as_str())));
        match next {
            Some(next) => current = next.as_str(),
            None => return ConfigurationError::DependencyCycle(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use metadata_db::{ModuleProgress, ProgressState, Timestamp, WorkerId};

    use super::*;

    fn graph() -> ModuleDepGraph {
        // Genes -> Annotate -> Report
        //   \-> Proteins ------/
        ModuleDepGraph::from_dep_list([
            ("Report", vec!["Annotate", "Proteins"]),
            ("Annotate", vec!["Genes"]),
            ("Genes", vec![]),
            ("Proteins", vec!["Genes"]),
            ("Index", vec![]),
        ])
        .expect("Failed to build graph")
    }

    fn row(id: i64, module: &str, state: ProgressState) -> ModuleProgress {
        ModuleProgress {
            id,
            owner_worker_id: WorkerId::try_from(1).expect("Failed to create worker id"),
            genome_id: None,
            module: module.to_string(),
            state,
            redo: false,
            error_message: None,
            started_at: Timestamp::default(),
            updated_at: Timestamp::default(),
        }
    }

    #[test]
    fn depths_follow_the_deepest_dependency() {
        let graph = graph();
        assert_eq!(graph.node("Genes").expect("Genes").depth(), 1);
        assert_eq!(graph.node("Index").expect("Index").depth(), 1);
        assert_eq!(graph.node("Annotate").expect("Annotate").depth(), 2);
        assert_eq!(graph.node("Report").expect("Report").depth(), 3);
        assert_eq!(graph.len(), 5);
    }

    #[test]
    fn nodes_link_to_every_dependency() {
        let graph = graph();
        assert_eq!(
            graph.parents("Report").expect("Report"),
            vec!["Annotate", "Proteins"]
        );
        assert_eq!(
            graph.children("Genes").expect("Genes"),
            vec!["Annotate", "Proteins"]
        );
        assert!(graph.parents("Genes").expect("Genes").is_empty());
    }

    #[test]
    fn nodes_are_materialised_one_depth_per_pass() {
        // Proteins is declared after Genes but must not join the pass that creates Genes
        let graph = ModuleDepGraph::from_dep_list([
            ("Annotate", vec!["Genes"]),
            ("Genes", vec![]),
            ("Proteins", vec!["Genes"]),
            ("Index", vec![]),
        ])
        .expect("Failed to build graph");

        assert_eq!(
            graph.names_in_order(),
            vec!["Genes", "Index", "Annotate", "Proteins"]
        );
        assert_eq!(
            graph.children("Genes").expect("Genes"),
            vec!["Annotate", "Proteins"]
        );
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let result = ModuleDepGraph::from_dep_list([("Genes", vec![]), ("Genes", vec!["Index"])]);
        assert_eq!(
            result.map(|_| ()),
            Err(ConfigurationError::DuplicateModule("Genes".to_string()))
        );
    }

    #[test]
    fn self_dependency_is_rejected() {
        let result = ModuleDepGraph::from_dep_list([("Genes", vec!["Genes"])]);
        assert_eq!(
            result.map(|_| ()),
            Err(ConfigurationError::SelfDependency("Genes".to_string()))
        );
    }

    #[test]
    fn missing_dependency_is_rejected() {
        let result = ModuleDepGraph::from_dep_list([("Annotate", vec!["Genes"])]);
        assert_eq!(
            result.map(|_| ()),
            Err(ConfigurationError::MissingDependency {
                module: "Annotate".to_string(),
                dependency: "Genes".to_string(),
            })
        );
    }

    #[test]
    fn cycles_are_rejected_with_their_path() {
        let result = ModuleDepGraph::from_dep_list([
            ("Index", vec![]),
            ("A", vec!["B"]),
            ("B", vec!["C"]),
            ("C", vec!["A", "Index"]),
        ]);
        let Err(ConfigurationError::DependencyCycle(path)) = result else {
            panic!("expected a dependency cycle, got {result:?}");
        };
        assert_eq!(path.first(), path.last());
        assert_eq!(path.len(), 4);
    }

    #[test]
    fn missing_dependencies_skip_done_and_requested_modules() {
        let mut graph = graph();
        graph
            .load_state(&[row(1, "Genes", ProgressState::Done)])
            .expect("Failed to load state");

        let missing = graph
            .missing_dependencies(&["Report"])
            .expect("Failed to compute missing dependencies");
        assert_eq!(missing, vec!["Annotate", "Proteins"]);

        let missing = graph
            .missing_dependencies(&["Report", "Annotate"])
            .expect("Failed to compute missing dependencies");
        assert_eq!(missing, vec!["Proteins"]);
    }

    #[test]
    fn missing_dependencies_are_idempotent() {
        let graph = graph();
        let first = graph
            .missing_dependencies(&["Report", "Proteins"])
            .expect("Failed to compute missing dependencies");
        let second = graph
            .missing_dependencies(&["Report", "Proteins"])
            .expect("Failed to compute missing dependencies");
        assert_eq!(first, second);
        assert_eq!(first, vec!["Annotate", "Genes"]);
    }

    #[test]
    fn node_with_failed_submodule_is_not_done() {
        let mut graph = ModuleDepGraph::from_dep_list([("Annotate", vec![]), ("Report", vec!["Annotate"])])
            .expect("Failed to build graph");
        graph
            .load_state(&[
                row(1, "Annotate:pfam", ProgressState::Done),
                row(2, "Annotate:tigrfam", ProgressState::Error),
            ])
            .expect("Failed to load state");
        assert!(!graph.all_dependencies_done("Report").expect("Report"));

        graph
            .update_state(&[row(3, "Annotate:tigrfam", ProgressState::Done)])
            .expect("Failed to update state");
        assert!(graph.all_dependencies_done("Report").expect("Report"));
    }

    #[test]
    fn redo_rows_do_not_count_as_done() {
        let mut graph = graph();
        let mut genes = row(1, "Genes", ProgressState::Done);
        genes.redo = true;
        graph.load_state(&[genes]).expect("Failed to load state");
        assert!(!graph.all_dependencies_done("Annotate").expect("Annotate"));
    }

    #[test]
    fn load_state_clears_previous_rows_and_remove_state_detaches() {
        let mut graph = graph();
        let genes = row(1, "Genes", ProgressState::Done);
        graph.load_state(&[genes.clone()]).expect("Failed to load state");
        assert!(graph.all_dependencies_done("Annotate").expect("Annotate"));

        graph.remove_state(&[genes]).expect("Failed to remove state");
        assert!(!graph.all_dependencies_done("Annotate").expect("Annotate"));

        graph
            .update_state(&[row(2, "Genes", ProgressState::Done)])
            .expect("Failed to update state");
        graph
            .load_state(&[row(3, "Index", ProgressState::Done)])
            .expect("Failed to load state");
        assert!(!graph.node("Genes").expect("Genes").is_done());
        assert!(graph.node("Index").expect("Index").is_done());
    }

    #[test]
    fn unknown_modules_in_state_fail_without_changes() {
        let mut graph = graph();
        graph
            .load_state(&[row(1, "Genes", ProgressState::Done)])
            .expect("Failed to load state");

        let result = graph.load_state(&[
            row(2, "Index", ProgressState::Done),
            row(3, "Phylogeny", ProgressState::Done),
        ]);

        assert_eq!(result, Err(UnknownModule("Phylogeny".to_string())));
        assert!(graph.node("Genes").expect("Genes").is_done());
        assert!(!graph.node("Index").expect("Index").is_done());
    }

    #[test]
    fn order_by_depth_is_stable() {
        let graph = graph();
        let ordered = graph
            .order_by_depth(&["Report", "Index", "Annotate", "Genes", "Proteins"])
            .expect("Failed to order modules");
        assert_eq!(
            ordered,
            vec!["Index", "Genes", "Annotate", "Proteins", "Report"]
        );
    }

    #[test]
    fn unknown_names_are_reported() {
        let graph = graph();
        assert_eq!(
            graph.order_by_depth(&["Phylogeny"]),
            Err(UnknownModule("Phylogeny".to_string()))
        );
        assert!(graph.missing_dependencies(&["Phylogeny"]).is_err());
    }
}
