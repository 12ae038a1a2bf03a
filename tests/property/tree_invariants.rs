//! Property-based tests for tree aggregates under random edits

use proptest::prelude::*;
use shareindex::tree::{FileTree, Node, NodeId};
use shareindex::types::Tth;

#[derive(Debug, Clone)]
enum Op {
    AddDir { parent: usize, name: u8 },
    AddFile { parent: usize, name: u8, size: u32, hashed: bool },
    Remove { target: usize },
    Hash { target: usize, seed: u8 },
    Unhash { target: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<usize>(), 0u8..8).prop_map(|(parent, name)| Op::AddDir { parent, name }),
        (any::<usize>(), 0u8..8, any::<u32>(), any::<bool>()).prop_map(
            |(parent, name, size, hashed)| Op::AddFile {
                parent,
                name,
                size,
                hashed
            }
        ),
        any::<usize>().prop_map(|target| Op::Remove { target }),
        (any::<usize>(), any::<u8>()).prop_map(|(target, seed)| Op::Hash { target, seed }),
        any::<usize>().prop_map(|target| Op::Unhash { target }),
    ]
}

fn pick(nodes: &[NodeId], index: usize) -> NodeId {
    nodes[index % nodes.len()]
}

fn apply(tree: &mut FileTree, op: &Op) {
    let all = tree.walk(tree.root());
    let dirs: Vec<NodeId> = all
        .iter()
        .copied()
        .filter(|id| tree.get(*id).unwrap().is_dir())
        .collect();
    let files = tree.files_under(tree.root());

    // Edits that collide with an existing name are allowed to fail
    match op {
        Op::AddDir { parent, name } => {
            let _ = tree.insert(pick(&dirs, *parent), Node::directory(format!("d{}", name)));
        }
        Op::AddFile {
            parent,
            name,
            size,
            hashed,
        } => {
            let node = if *hashed {
                Node::hashed_file(format!("f{}", name), *size as u64, 1, Tth([*name; 24]))
            } else {
                Node::file(format!("f{}", name), *size as u64, 1)
            };
            let _ = tree.insert(pick(&dirs, *parent), node);
        }
        Op::Remove { target } => {
            let target = pick(&all, *target);
            if target != tree.root() {
                tree.remove(target).unwrap();
            }
        }
        Op::Hash { target, seed } if !files.is_empty() => {
            tree.set_hash(pick(&files, *target), Tth([*seed; 24]), 2)
                .unwrap();
        }
        Op::Unhash { target } if !files.is_empty() => {
            tree.clear_hash(pick(&files, *target)).unwrap();
        }
        _ => {}
    }
}

proptest! {
    #[test]
    fn prop_aggregates_stay_consistent(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let mut tree = FileTree::new();
        for op in &ops {
            apply(&mut tree, op);
            let problems = tree.validate();
            prop_assert!(problems.is_empty(), "after {:?}: {:?}", op, problems);
        }

        let total: u64 = tree
            .files_under(tree.root())
            .iter()
            .map(|id| tree.get(*id).unwrap().size())
            .sum();
        prop_assert_eq!(tree.root_node().size(), total);
    }

    #[test]
    fn prop_hash_index_matches_nodes(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let mut tree = FileTree::new();
        for op in &ops {
            apply(&mut tree, op);
        }
        for id in tree.files_under(tree.root()) {
            let node = tree.get(id).unwrap();
            if let Some(tth) = node.tth() {
                prop_assert!(tree.find_by_tth(&tth).contains(&id));
            }
            let path = tree.path_of(id).unwrap();
            prop_assert_eq!(tree.find_by_path(&path), Some(id));
        }
    }
}

/// Removing everything leaves an empty tree whose freed ids never resolve
#[test]
fn test_stale_ids_after_clearing() {
    let mut runner = proptest::test_runner::TestRunner::default();
    runner
        .run(&prop::collection::vec(0u8..20, 1..20), |names| {
            let mut tree = FileTree::new();
            let mut ids = Vec::new();
            for name in &names {
                if let Ok(id) = tree.insert(tree.root(), Node::file(format!("n{}", name), 1, 0)) {
                    ids.push(id);
                }
            }
            for id in &ids {
                tree.remove(*id).unwrap();
            }
            assert!(tree.is_empty());
            assert_eq!(tree.len(), 1);
            // Reused slots get a new epoch
            let fresh = tree.insert(tree.root(), Node::file("fresh", 1, 0)).unwrap();
            for id in &ids {
                assert!(tree.get(*id).is_none());
                assert_ne!(*id, fresh);
            }
            Ok(())
        })
        .unwrap();
}
