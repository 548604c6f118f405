//! Property tests of the module dependency graph over random DAGs

use std::collections::BTreeSet;

use metadata_db::{ModuleProgress, ProgressState, Timestamp, WorkerId};
use pipeline::ModuleDepGraph;
use proptest::prelude::*;

// Acyclic by construction: module N only depends on modules 0..N-1.
fn dep_list_strategy(max_modules: usize) -> impl Strategy<Value = Vec<(String, Vec<String>)>> {
    (1..=max_modules).prop_flat_map(|count| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), count).prop_map(
            |raw_deps| {
                raw_deps
                    .into_iter()
                    .enumerate()
                    .map(|(i, raw)| {
                        let deps: BTreeSet<usize> = if i == 0 {
                            BTreeSet::new()
                        } else {
                            raw.into_iter().map(|d| d % i).collect()
                        };
                        (
                            module_name(i),
                            deps.into_iter().map(module_name).collect(),
                        )
                    })
                    .collect()
            },
        )
    })
}

fn module_name(i: usize) -> String {
    format!("M{i}")
}

fn done_row(id: i64, module: &str) -> ModuleProgress {
    ModuleProgress {
        id,
        owner_worker_id: WorkerId::try_from(1_i64).expect("valid worker id"),
        genome_id: None,
        module: module.to_string(),
        state: ProgressState::Done,
        redo: false,
        error_message: None,
        started_at: Timestamp::default(),
        updated_at: Timestamp::default(),
    }
}

fn pick(names: &[String], indices: &[usize]) -> Vec<String> {
    let mut picked = Vec::new();
    for &i in indices {
        let name = &names[i % names.len()];
        if !picked.contains(name) {
            picked.push(name.clone());
        }
    }
    picked
}

/// Transitive dependencies of `name`, computed from the raw entries
fn transitive_deps(entries: &[(String, Vec<String>)], name: &str) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    let mut stack = vec![name.to_string()];
    while let Some(current) = stack.pop() {
        let deps = entries
            .iter()
            .find(|(entry, _)| *entry == current)
            .map(|(_, deps)| deps.clone())
            .unwrap_or_default();
        for dep in deps {
            if found.insert(dep.clone()) {
                stack.push(dep);
            }
        }
    }
    found
}

proptest! {
    #[test]
    fn depth_exceeds_every_parent_depth(entries in dep_list_strategy(12)) {
        let graph = ModuleDepGraph::from_dep_list(entries.clone()).expect("acyclic graph");

        prop_assert_eq!(graph.len(), entries.len());
        for (name, deps) in &entries {
            let depth = graph.node(name).expect("known module").depth();
            if deps.is_empty() {
                prop_assert_eq!(depth, 1);
            }
            for dep in deps {
                prop_assert!(graph.node(dep).expect("known module").depth() < depth);
            }
        }
    }

    #[test]
    fn order_by_depth_puts_dependencies_first(
        entries in dep_list_strategy(12),
        indices in proptest::collection::vec(any::<usize>(), 1..8),
    ) {
        let graph = ModuleDepGraph::from_dep_list(entries.clone()).expect("acyclic graph");
        let names: Vec<String> = entries.iter().map(|(name, _)| name.clone()).collect();
        let requested = pick(&names, &indices);

        let ordered = graph.order_by_depth(&requested).expect("known modules");

        prop_assert_eq!(
            ordered.iter().collect::<BTreeSet<_>>(),
            requested.iter().collect::<BTreeSet<_>>()
        );
        for (pos, name) in ordered.iter().enumerate() {
            let ancestors = transitive_deps(&entries, name);
            for later in &ordered[pos + 1..] {
                prop_assert!(
                    !ancestors.contains(later),
                    "{} depends on {} but comes first", name, later
                );
            }
        }
    }

    #[test]
    fn missing_dependencies_are_exact_and_idempotent(
        entries in dep_list_strategy(12),
        indices in proptest::collection::vec(any::<usize>(), 1..6),
        done_indices in proptest::collection::vec(any::<usize>(), 0..12),
    ) {
        let mut graph = ModuleDepGraph::from_dep_list(entries.clone()).expect("acyclic graph");
        let names: Vec<String> = entries.iter().map(|(name, _)| name.clone()).collect();
        let requested = pick(&names, &indices);
        let done: BTreeSet<String> = pick(&names, &done_indices).into_iter().collect();
        let rows: Vec<ModuleProgress> = done
            .iter()
            .enumerate()
            .map(|(i, name)| done_row(i as i64 + 1, name))
            .collect();
        graph.load_state(&rows).expect("rows of known modules");

        let missing = graph.missing_dependencies(&requested).expect("known modules");

        let mut expected = BTreeSet::new();
        for name in &requested {
            for dep in transitive_deps(&entries, name) {
                if !done.contains(&dep) && !requested.contains(&dep) {
                    expected.insert(dep);
                }
            }
        }
        prop_assert_eq!(missing.len(), expected.len(), "duplicates in {:?}", missing);
        prop_assert_eq!(missing.iter().cloned().collect::<BTreeSet<_>>(), expected);
        prop_assert_eq!(
            graph.missing_dependencies(&requested).expect("known modules"),
            missing.clone()
        );

        // Completing the missing modules leaves nothing missing
        let completed: Vec<ModuleProgress> = missing
            .iter()
            .enumerate()
            .map(|(i, name)| done_row(1000 + i as i64, name))
            .collect();
        graph.update_state(&completed).expect("rows of known modules");
        prop_assert!(graph.missing_dependencies(&requested).expect("known modules").is_empty());
    }

    #[test]
    fn unknown_dependency_yields_no_graph(entries in dep_list_strategy(8)) {
        let mut entries = entries;
        entries.push(("Orphan".to_string(), vec!["Nowhere".to_string()]));

        prop_assert!(ModuleDepGraph::from_dep_list(entries).is_err());
    }
}
